//! Error types for the component operator
//!
//! Errors carry enough context (component name, dependent kind) to be
//! surfaced verbatim in `Component.status.message`.

use thiserror::Error;

/// Main error type for component operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for a Component spec
    #[error("component '{component}' {message}")]
    Validation {
        /// Name of the component with invalid configuration
        component: String,
        /// Description of what's invalid
        message: String,
    },

    /// A dependent resource could not be built or diffed
    #[error("failed to build {kind}: {message}")]
    Build {
        /// Dependent resource kind (e.g. "Deployment")
        kind: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Where the error occurred (e.g. "startup", "finalizer")
        context: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a validation error for the named component
    pub fn validation(component: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            component: component.into(),
            message: msg.into(),
        }
    }

    /// Create a build error for the given dependent kind
    pub fn build(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Build {
            kind: kind.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Whether retrying the same operation might succeed without a spec change
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                // 4xx (bad request, forbidden, invalid) won't fix themselves,
                // except conflicts and throttling
                match source {
                    kube::Error::Api(ae) => {
                        ae.code == 409 || ae.code == 429 || !(400..500).contains(&ae.code)
                    }
                    _ => true,
                }
            }
            Error::Validation { .. } => false,
            Error::Build { .. } => false,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}
