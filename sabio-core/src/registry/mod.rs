//! Knowledge-base registry and its storage contract.

pub mod catalog;
pub mod store;

pub use catalog::KbRegistry;
pub use store::{InMemoryKbStore, KbStore, StoreError};
