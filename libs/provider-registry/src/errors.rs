use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// Error a provider method rejects with.
#[derive(Debug)]
pub struct ProviderError {
    code: String,
    message: String,
    source: Option<anyhow::Error>,
}

impl ProviderError {
    /// Creates an error with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for argument validation failures.
    pub fn bad_arguments(message: impl Into<String>) -> Self {
        Self::new("bad_arguments", message)
    }

    /// Attaches a source error for debugging purposes.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Returns the machine-readable error code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Returns the descriptive error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl Error for ProviderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|err| &**err as &(dyn Error + 'static))
    }
}

impl From<anyhow::Error> for ProviderError {
    fn from(err: anyhow::Error) -> Self {
        ProviderError::new("internal_error", err.to_string()).with_source(err)
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::bad_arguments(err.to_string()).with_source(err)
    }
}

/// Failures raised by the catalog and the live registry.
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("provider type `{0}` already registered")]
    AlreadyRegistered(String),
    #[error("provider name must not be empty")]
    InvalidName,
    #[error("unknown provider type `{0}`")]
    UnknownProviderType(String),
    #[error("provider `{provider_type}` failed to construct: {source}")]
    Construction {
        provider_type: String,
        #[source]
        source: ProviderError,
    },
    #[error("unknown provider `{0}`")]
    UnknownProvider(String),
    #[error("provider `{provider}` has no method `{method}`")]
    UnknownMethod { provider: String, method: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        let err = ProviderError::new("storage_full", "no room left");
        assert_eq!(err.to_string(), "storage_full: no room left");
        assert!(err.source().is_none());
    }

    #[test]
    fn keeps_source_chain() {
        let io = std::io::Error::other("disk gone");
        let err = ProviderError::new("io", "write failed").with_source(io);
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("disk gone"));
    }

    #[test]
    fn construction_error_mentions_type() {
        let err = RegistryError::Construction {
            provider_type: "socket".into(),
            source: ProviderError::new("refused", "port closed"),
        };
        assert_eq!(
            err.to_string(),
            "provider `socket` failed to construct: refused: port closed"
        );
    }
}
