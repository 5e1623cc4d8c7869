//! Knowledge-base registry: listing, selection and CRUD over a [`KbStore`].

use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::store::KbStore;
use crate::error::{KbError, KbResult};
use crate::kb::{KnowledgeBase, Rule, Variable};
use crate::types::KbName;

/// Registry that owns knowledge-base lifecycle and edits.
///
/// Reads go straight to the store and hand out immutable snapshots. Edits are
/// serialized through a single lock and applied copy-on-write, so a snapshot
/// held by a running consultation never changes underneath it.
pub struct KbRegistry {
    store: Arc<dyn KbStore>,
    write_lock: Mutex<()>,
}

impl KbRegistry {
    /// Registry over the given store.
    pub fn new(store: Arc<dyn KbStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Registry backed by a fresh [`super::InMemoryKbStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(super::InMemoryKbStore::new()))
    }

    /// Knowledge-base names ordered alphabetically.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn list_kbs(&self) -> KbResult<Vec<KbName>> {
        let mut names = self.store.list()?;
        names.sort();
        Ok(names)
    }

    /// Read-only view of a knowledge base for one inference call or session.
    ///
    /// # Errors
    ///
    /// Returns [`KbError::UnknownKb`] when the name is not registered.
    pub fn snapshot(&self, kb: &KbName) -> KbResult<Arc<KnowledgeBase>> {
        self.store
            .load(kb)?
            .ok_or_else(|| KbError::UnknownKb { kb: kb.clone() })
    }

    /// Register an empty knowledge base.
    ///
    /// # Errors
    ///
    /// Returns [`KbError::KbAlreadyExists`] when the name is taken.
    pub async fn create_kb(&self, kb: &KbName) -> KbResult<Arc<KnowledgeBase>> {
        let _guard = self.write_lock.lock().await;
        if self.store.load(kb)?.is_some() {
            return Err(KbError::KbAlreadyExists { kb: kb.clone() });
        }
        let created = self.store.save(KnowledgeBase::new(kb.clone()))?;
        tracing::info!(kb = %kb, "created knowledge base");
        Ok(created)
    }

    /// Create any of `names` that do not exist yet.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn ensure_kbs<I>(&self, names: I) -> KbResult<()>
    where
        I: IntoIterator<Item = KbName>,
    {
        for name in names {
            match self.create_kb(&name).await {
                Ok(_) | Err(KbError::KbAlreadyExists { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Remove a knowledge base with all its variables and rules.
    ///
    /// # Errors
    ///
    /// Returns [`KbError::UnknownKb`] when the name is not registered.
    pub async fn delete_kb(&self, kb: &KbName) -> KbResult<()> {
        let _guard = self.write_lock.lock().await;
        if !self.store.delete(kb)? {
            return Err(KbError::UnknownKb { kb: kb.clone() });
        }
        tracing::info!(kb = %kb, "deleted knowledge base");
        Ok(())
    }

    /// Variables of a knowledge base ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`KbError::UnknownKb`] when the name is not registered.
    pub fn list_variables(&self, kb: &KbName) -> KbResult<Vec<Variable>> {
        Ok(self.snapshot(kb)?.variables().cloned().collect())
    }

    /// One variable by name.
    ///
    /// # Errors
    ///
    /// Returns [`KbError::UnknownKb`] or [`KbError::UnknownVariable`].
    pub fn get_variable(&self, kb: &KbName, name: &str) -> KbResult<Variable> {
        self.snapshot(kb)?
            .variable(name)
            .cloned()
            .ok_or_else(|| KbError::UnknownVariable {
                kb: kb.clone(),
                variable: name.to_string(),
            })
    }

    /// Declare a new variable.
    ///
    /// # Errors
    ///
    /// Fails on an unknown KB, a duplicate name or an invalid definition.
    pub async fn create_variable(&self, kb: &KbName, variable: Variable) -> KbResult<Variable> {
        let name = variable.name.clone();
        self.edit(kb, |draft| draft.add_variable(variable)).await?;
        tracing::info!(kb = %kb, variable = %name, "created variable");
        self.get_variable(kb, &name)
    }

    /// Replace a variable's definition; the name cannot change.
    ///
    /// # Errors
    ///
    /// Fails on an unknown KB or variable, a rename attempt, an invalid
    /// definition, or when a rule using the variable would stop validating.
    pub async fn update_variable(
        &self,
        kb: &KbName,
        name: &str,
        variable: Variable,
    ) -> KbResult<Variable> {
        self.edit(kb, |draft| draft.update_variable(name, variable))
            .await?;
        tracing::info!(kb = %kb, variable = %name, "updated variable");
        self.get_variable(kb, name)
    }

    /// Delete a variable no rule references.
    ///
    /// # Errors
    ///
    /// Fails on an unknown KB or variable, or [`KbError::VariableInUse`].
    pub async fn delete_variable(&self, kb: &KbName, name: &str) -> KbResult<()> {
        self.edit(kb, |draft| draft.remove_variable(name).map(drop))
            .await?;
        tracing::info!(kb = %kb, variable = %name, "deleted variable");
        Ok(())
    }

    /// Rules of a knowledge base in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`KbError::UnknownKb`] when the name is not registered.
    pub fn list_rules(&self, kb: &KbName) -> KbResult<Vec<Rule>> {
        Ok(self.snapshot(kb)?.rules().to_vec())
    }

    /// One rule by name.
    ///
    /// # Errors
    ///
    /// Returns [`KbError::UnknownKb`] or [`KbError::UnknownRule`].
    pub fn get_rule(&self, kb: &KbName, name: &str) -> KbResult<Rule> {
        self.snapshot(kb)?
            .rule(name)
            .cloned()
            .ok_or_else(|| KbError::UnknownRule {
                kb: kb.clone(),
                rule: name.to_string(),
            })
    }

    /// Append a rule to the declaration order.
    ///
    /// # Errors
    ///
    /// Fails on an unknown KB, a duplicate name or a rule that does not
    /// validate against the declared variables.
    pub async fn create_rule(&self, kb: &KbName, rule: Rule) -> KbResult<Rule> {
        let name = rule.name.clone();
        self.edit(kb, |draft| draft.add_rule(rule)).await?;
        tracing::info!(kb = %kb, rule = %name, "created rule");
        self.get_rule(kb, &name)
    }

    /// Replace a rule in place; renaming is allowed when the new name is free.
    ///
    /// # Errors
    ///
    /// Fails on an unknown KB or rule, a name collision, or an invalid rule.
    pub async fn update_rule(&self, kb: &KbName, name: &str, rule: Rule) -> KbResult<Rule> {
        let new_name = rule.name.clone();
        self.edit(kb, |draft| draft.update_rule(name, rule)).await?;
        tracing::info!(kb = %kb, rule = %name, renamed_to = %new_name, "updated rule");
        self.get_rule(kb, &new_name)
    }

    /// Delete a rule.
    ///
    /// # Errors
    ///
    /// Fails on an unknown KB or rule.
    pub async fn delete_rule(&self, kb: &KbName, name: &str) -> KbResult<()> {
        self.edit(kb, |draft| draft.remove_rule(name).map(drop))
            .await?;
        tracing::info!(kb = %kb, rule = %name, "deleted rule");
        Ok(())
    }

    async fn edit<F>(&self, kb: &KbName, apply: F) -> KbResult<()>
    where
        F: FnOnce(&mut KnowledgeBase) -> KbResult<()>,
    {
        let _guard = self.write_lock.lock().await;
        let mut draft = KnowledgeBase::clone(&*self.snapshot(kb)?);
        apply(&mut draft)?;
        self.store.save(draft)?;
        Ok(())
    }
}

impl fmt::Debug for KbRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KbRegistry").finish_non_exhaustive()
    }
}
