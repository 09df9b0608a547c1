use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building a matcher set.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("vocabulary is empty")]
    EmptyVocabulary,

    #[error("blank template name at vocabulary position {0}")]
    BlankName(usize),

    #[error("template {name:?} produced an invalid pattern: {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("grammar template is missing the `{0}` capture group")]
    MissingGroup(&'static str),
}

/// Errors raised while loading a vocabulary document.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse schema YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("category {0:?} lists no templates")]
    EmptyCategory(String),
}
