use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::script::ScriptError;

/// Errors produced while compiling or rendering templates.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to parse template `{name}`: {source}")]
    Parse {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("template `{0}` not found")]
    NotFound(String),

    #[error("failed to execute template `{name}`: {source}")]
    Execution {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("template `{name}` rendered invalid JSON: {source}\nrendered output: {output}")]
    InvalidJson {
        name: String,
        output: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A header name or value that cannot be put on the wire.
#[derive(Debug, Error)]
#[error("invalid header `{name}`: {reason}")]
pub struct InvalidHeader {
    pub name: String,
    pub reason: String,
}

/// Network-level failure reported by a [`Transport`](crate::http::Transport).
///
/// The message carries the full error chain so retry classification can
/// match on the innermost cause.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self { message }
    }
}

/// Failure of a single before/after hook invocation.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("hook type `{0}` cannot be built from a definition, register it in code")]
    Unsupported(String),

    #[error("unknown hook type `{0}`")]
    UnknownType(String),

    #[error("hook definition `{name}` has no {field}")]
    MissingField { name: String, field: &'static str },

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("failed to read script file `{path}`: {source}")]
    ScriptFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to start command `{command}`: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("command `{command}` failed ({status}), stderr: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("hook timed out after {0:?}")]
    Timeout(Duration),

    #[error("hook task ended without producing a result")]
    Aborted,

    #[error("invalid body: {0}")]
    Body(String),

    #[error(transparent)]
    Header(#[from] InvalidHeader),

    #[error("{0}")]
    Custom(String),
}

impl HookError {
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }
}

/// Errors produced while loading or saving a [`ClientConfig`](crate::config::ClientConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to write config file `{path}`: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Top-level error of a request execution. Each variant names the stage
/// of the pipeline that failed.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to parse template definition: {0}")]
    Definition(#[source] serde_json::Error),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("failed to build hook `{hook}`: {source}")]
    HookDefinition {
        hook: String,
        #[source]
        source: HookError,
    },

    #[error("before-request hook `{hook}` failed: {source}")]
    BeforeHook {
        hook: String,
        #[source]
        source: HookError,
    },

    #[error("after-response hook `{hook}` failed: {source}")]
    AfterHook {
        hook: String,
        #[source]
        source: HookError,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Header(#[from] InvalidHeader),

    #[error("failed to send HTTP request: {0}")]
    Transport(#[from] TransportError),

    #[error("max retries ({attempts}) exhausted: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse data file `{path}`: {source}")]
    Data {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Whether the failure was a hook (or subprocess) exceeding its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::BeforeHook {
                source: HookError::Timeout(_),
                ..
            } | Error::AfterHook {
                source: HookError::Timeout(_),
                ..
            }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
