use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(sqlp_config::toml_deserialize),
        help("Check your sqlp.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("Invalid query timeout: {0}")]
    #[diagnostic(
        code(sqlp_config::invalid_timeout),
        help("Use a duration such as `30s`, `5m` or `1h30m`")
    )]
    InvalidTimeout(String),

    #[error("Duplicate template path: {0}")]
    #[diagnostic(
        code(sqlp_config::duplicate_template),
        help("Each template document must be listed only once")
    )]
    DuplicateTemplate(String),

    #[error("Template path cannot be empty")]
    #[diagnostic(
        code(sqlp_config::empty_template_path),
        help("Remove the empty entry from `templates`")
    )]
    EmptyTemplatePath,

    #[error("IO error: {0}")]
    #[diagnostic(code(sqlp_config::io))]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
