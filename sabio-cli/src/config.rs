//! Layered configuration: embedded defaults merged with the user file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use sabio_core::{InferenceConfig, KbName, UserFactPolicy};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Top-level CLI and server configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Knowledge-base selection and bootstrap.
    #[serde(default)]
    pub knowledge_bases: KnowledgeBasesConfig,
    /// Engine tunables shared by consultations and forward runs.
    #[serde(default)]
    pub inference: InferenceConfig,
    /// Consultation session handling.
    #[serde(default)]
    pub sessions: SessionsConfig,
}

impl CliConfig {
    /// Configuration shipped with the binary.
    ///
    /// # Errors
    ///
    /// Fails only if the embedded file is malformed.
    pub fn embedded() -> Result<Self> {
        toml::from_str(DEFAULT_CONFIG).context("embedded default config is invalid")
    }

    /// Overlay `other` (the user file) on top of `self`.
    pub fn merge(&mut self, other: &Self) {
        self.knowledge_bases.merge(&other.knowledge_bases);
        self.inference = other.inference;
        self.sessions.merge(&other.sessions);
    }
}

/// `[knowledge_bases]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeBasesConfig {
    /// Knowledge base used when a command omits `--kb`.
    pub default_kb: KbName,
    /// Knowledge bases created on server start.
    pub bootstrap_kbs: Vec<KbName>,
}

impl KnowledgeBasesConfig {
    fn merge(&mut self, other: &Self) {
        self.default_kb = other.default_kb.clone();
        if !other.bootstrap_kbs.is_empty() {
            self.bootstrap_kbs.clone_from(&other.bootstrap_kbs);
        }
    }
}

impl Default for KnowledgeBasesConfig {
    fn default() -> Self {
        Self {
            default_kb: KbName::default(),
            bootstrap_kbs: default_bootstrap_kbs(),
        }
    }
}

fn default_bootstrap_kbs() -> Vec<KbName> {
    vec![KbName::default()]
}

/// `[sessions]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Consultations untouched for this long are reclaimed.
    pub idle_timeout_secs: u64,
}

impl SessionsConfig {
    /// Idle timeout as a [`Duration`].
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    const fn merge(&mut self, other: &Self) {
        if other.idle_timeout_secs > 0 {
            self.idle_timeout_secs = other.idle_timeout_secs;
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 300,
        }
    }
}

/// Loads, edits and persists the user configuration file.
pub struct ConfigManager {
    path: PathBuf,
    config: CliConfig,
}

impl ConfigManager {
    /// Load from the platform config directory.
    ///
    /// # Errors
    ///
    /// Returns error if the directory is unknown or the file is invalid.
    pub fn load() -> Result<Self> {
        let path = default_config_path()?;
        Self::load_with_path(path)
    }

    /// Load from `path`, falling back to the embedded defaults when the file
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load_with_path<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let mut config = CliConfig::embedded()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read config at {}", path.display()))?;
            let user_config: CliConfig = toml::from_str(&contents)
                .with_context(|| format!("invalid config at {}", path.display()))?;
            config.merge(&user_config);
        }

        Ok(Self { path, config })
    }

    /// Effective configuration.
    #[must_use]
    pub const fn config(&self) -> &CliConfig {
        &self.config
    }

    /// Location of the user file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the configuration to [`Self::path`], creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory {}", parent.display())
            })?;
        }
        let toml = toml::to_string_pretty(&self.config)?;
        fs::write(&self.path, toml)
            .with_context(|| format!("failed to write config to {}", self.path.display()))?;
        Ok(())
    }

    /// Value of a dotted key such as `inference.max_passes`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        let config = &self.config;
        match key {
            "knowledge_bases.default_kb" => Some(config.knowledge_bases.default_kb.to_string()),
            "knowledge_bases.bootstrap_kbs" => Some(
                config
                    .knowledge_bases
                    .bootstrap_kbs
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            "inference.max_passes" => Some(config.inference.max_passes.to_string()),
            "inference.user_fact_policy" => Some(config.inference.user_fact_policy.to_string()),
            "inference.convergence_epsilon" => {
                Some(config.inference.convergence_epsilon.to_string())
            }
            "sessions.idle_timeout_secs" => Some(config.sessions.idle_timeout_secs.to_string()),
            _ => None,
        }
    }

    /// Set a dotted key from its text form.
    ///
    /// # Errors
    ///
    /// Returns error for unknown keys or values that do not parse or validate.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let config = &mut self.config;
        match key {
            "knowledge_bases.default_kb" => {
                config.knowledge_bases.default_kb = KbName::try_from(value)?;
            }
            "knowledge_bases.bootstrap_kbs" => {
                let kbs = value
                    .split(',')
                    .filter(|segment| !segment.trim().is_empty())
                    .map(|segment| KbName::try_from(segment.trim()))
                    .collect::<Result<Vec<_>, _>>()?;
                config.knowledge_bases.bootstrap_kbs = if kbs.is_empty() {
                    default_bootstrap_kbs()
                } else {
                    kbs
                };
            }
            "inference.max_passes" => {
                let passes: usize = value
                    .parse()
                    .with_context(|| format!("expected a pass count, received '{value}'"))?;
                if passes == 0 {
                    return Err(anyhow!("inference.max_passes must be at least 1"));
                }
                config.inference.max_passes = passes;
            }
            "inference.user_fact_policy" => {
                config.inference.user_fact_policy =
                    value.parse::<UserFactPolicy>().map_err(|err| anyhow!(err))?;
            }
            "inference.convergence_epsilon" => {
                let epsilon: f64 = value
                    .parse()
                    .with_context(|| format!("expected a decimal, received '{value}'"))?;
                if !(epsilon.is_finite() && epsilon > 0.0) {
                    return Err(anyhow!(
                        "inference.convergence_epsilon must be a positive number"
                    ));
                }
                config.inference.convergence_epsilon = epsilon;
            }
            "sessions.idle_timeout_secs" => {
                config.sessions.idle_timeout_secs = value
                    .parse()
                    .with_context(|| format!("expected seconds, received '{value}'"))?;
            }
            _ => return Err(anyhow!("unknown configuration key: {key}")),
        }
        Ok(())
    }
}

fn default_config_path() -> Result<PathBuf> {
    let base =
        dirs::config_dir().ok_or_else(|| anyhow!("unable to determine configuration directory"))?;
    Ok(base.join("sabio").join("config.toml"))
}

/// `key=value` lines of the `[knowledge_bases]` section.
#[must_use]
pub fn format_knowledge_bases(cfg: &KnowledgeBasesConfig) -> Vec<String> {
    let bootstrap = cfg
        .bootstrap_kbs
        .iter()
        .map(|kb| format!("\"{kb}\""))
        .collect::<Vec<_>>()
        .join(", ");
    vec![
        format!("default_kb=\"{}\"", cfg.default_kb),
        format!("bootstrap_kbs=[{bootstrap}]"),
    ]
}

/// `key=value` lines of the `[inference]` section.
#[must_use]
pub fn format_inference(cfg: &InferenceConfig) -> Vec<String> {
    vec![
        format!("max_passes={}", cfg.max_passes),
        format!("user_fact_policy=\"{}\"", cfg.user_fact_policy),
        format!("convergence_epsilon={:e}", cfg.convergence_epsilon),
    ]
}

/// `key=value` lines of the `[sessions]` section.
#[must_use]
pub fn format_sessions(cfg: &SessionsConfig) -> Vec<String> {
    vec![format!("idle_timeout_secs={}", cfg.idle_timeout_secs)]
}

/// Render one section, or all of them when `section` is `None`.
#[must_use]
pub fn format_sections(config: &CliConfig, section: Option<&str>) -> Vec<String> {
    let sections = [
        (
            "knowledge_bases",
            format_knowledge_bases(&config.knowledge_bases),
        ),
        ("inference", format_inference(&config.inference)),
        ("sessions", format_sessions(&config.sessions)),
    ];
    let mut lines = Vec::new();
    for (name, body) in sections {
        if section.is_some_and(|wanted| wanted != name) {
            continue;
        }
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push(format!("[{name}]"));
        lines.extend(body);
    }
    lines
}
