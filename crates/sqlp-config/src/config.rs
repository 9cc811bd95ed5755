use std::{
    borrow::Cow,
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{ConfigError, Result},
    utils::parse_duration,
};

/// Positional token written into SQL text for every bound-parameter marker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Placeholder {
    /// `?` for every parameter (SQLite, MySQL).
    #[default]
    Question,

    /// `$1`, `$2`, ... numbered by token position (PostgreSQL).
    Dollar,
}

impl Placeholder {
    /// Returns the token for the parameter at zero-based `position`.
    pub fn token(&self, position: usize) -> Cow<'static, str> {
        match self {
            Placeholder::Question => Cow::Borrowed("?"),
            Placeholder::Dollar => Cow::Owned(format!("${}", position + 1)),
        }
    }
}

/// Mapper configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Template documents compiled into the mapper at startup.
    #[serde(default)]
    pub templates: Vec<String>,

    /// Token style used for bound parameters.
    /// Default: question
    pub placeholder: Option<Placeholder>,

    /// Fail rendering when a template references a missing variable.
    /// Default: false
    pub strict: Option<bool>,

    /// Log every expanded statement at debug level.
    /// Default: true
    pub log_statements: Option<bool>,

    /// Timeout applied to executors that are not given an explicit context.
    /// Default: none
    pub query_timeout: Option<String>,
}

pub const CONFIG_ENV: &str = "SQLP_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "sqlp.toml";

/// Location of the configuration file: `$SQLP_CONFIG` or `./sqlp.toml`.
pub fn config_path() -> PathBuf {
    match std::env::var(CONFIG_ENV) {
        Ok(path_str) => PathBuf::from(path_str),
        Err(_) => PathBuf::from(DEFAULT_CONFIG_FILE),
    }
}

impl Config {
    pub fn default_config() -> Self {
        Self {
            templates: Vec::new(),
            placeholder: Some(Placeholder::Question),
            strict: Some(false),
            log_statements: Some(true),
            query_timeout: None,
        }
    }

    /// Loads the configuration from [`config_path`].
    /// If the file does not exist, the default configuration is used.
    pub fn new() -> Result<Self> {
        let config_path = config_path();

        let mut config = match fs::read_to_string(&config_path) {
            Ok(content) => {
                info!("Loading sqlp configuration from {}", config_path.display());
                toml::from_str(&content)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(
                    "No configuration at {}, using defaults",
                    config_path.display()
                );
                Self::default_config()
            }
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.resolve()?;

        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.resolve()?;
        Ok(config)
    }

    pub fn resolve(&mut self) -> Result<()> {
        self.placeholder.get_or_insert(Placeholder::Question);
        self.strict.get_or_insert(false);
        self.log_statements.get_or_insert(true);

        if let Some(timeout) = &self.query_timeout {
            if parse_duration(timeout).is_none() {
                return Err(ConfigError::InvalidTimeout(timeout.clone()));
            }
        }

        let mut seen_templates = HashSet::new();
        for template in &self.templates {
            if template.trim().is_empty() {
                return Err(ConfigError::EmptyTemplatePath);
            }
            if !seen_templates.insert(template) {
                return Err(ConfigError::DuplicateTemplate(template.clone()));
            }
        }

        Ok(())
    }

    pub fn placeholder(&self) -> Placeholder {
        self.placeholder.unwrap_or_default()
    }

    pub fn is_strict(&self) -> bool {
        self.strict.unwrap_or(false)
    }

    pub fn logs_statements(&self) -> bool {
        self.log_statements.unwrap_or(true)
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        let millis = parse_duration(self.query_timeout.as_deref()?)?;
        Some(Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX)))
    }
}
