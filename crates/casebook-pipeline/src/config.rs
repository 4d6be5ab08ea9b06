//! Pipeline configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid:
//!
//! ```toml
//! deadline_secs = 600
//!
//! [solver]
//! max_states = 100000
//! parallel = true
//!
//! [[templates]]
//! id = "manor"
//! title = "Death at the Manor"
//! setting = "A country house"
//! ```

use std::path::Path;
use std::time::Duration;

use casebook_graph::SolverConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Template;

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Wall-clock budget of a whole run
    pub deadline_secs: u64,
    /// Optimal path search settings
    pub solver: SolverConfig,
    /// Templates picked from by date; empty asks the generation service
    pub templates: Vec<Template>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            deadline_secs: 900,
            solver: SolverConfig::default(),
            templates: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Create default config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the run deadline
    #[inline]
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_secs = deadline.as_secs();
        self
    }

    /// Set solver settings
    #[inline]
    #[must_use]
    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Set the template catalog
    #[inline]
    #[must_use]
    pub fn with_templates(mut self, templates: Vec<Template>) -> Self {
        self.templates = templates;
        self
    }

    /// Run deadline as a duration
    #[inline]
    #[must_use]
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// Parse and check a TOML document
    ///
    /// # Errors
    /// [`ConfigError::Parse`] for bad TOML, [`ConfigError::Invalid`] for
    /// out-of-range values.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and check a TOML file
    ///
    /// # Errors
    /// [`ConfigError::Read`] when the file cannot be read, otherwise as
    /// [`PipelineConfig::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deadline_secs == 0 {
            return Err(ConfigError::Invalid("deadline_secs must be positive".into()));
        }
        if self.solver.max_states == 0 {
            return Err(ConfigError::Invalid("solver.max_states must be positive".into()));
        }
        let mut ids = std::collections::HashSet::new();
        for t in &self.templates {
            if !ids.insert(t.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate template id \"{}\"", t.id)));
            }
        }
        Ok(())
    }
}
