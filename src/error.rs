//! Error types for sclkit
//!
//! Hard failures abort the current operation and surface as [`Error`].
//! Per-item findings that must not stop a run are collected as
//! [`ReportItem`](crate::report::ReportItem)s instead.

use thiserror::Error;

/// Result type alias using sclkit Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sclkit operations
///
/// Every variant displays its message verbatim: callers and other tools
/// compare these strings literally.
#[derive(Error, Debug)]
pub enum Error {
    /// The document cannot satisfy the request (unknown node, missing
    /// mandatory information, corrupted template reference...)
    #[error("{0}")]
    Scd(String),

    /// Operation invoked on a node lacking the required capability
    #[error("{0}")]
    UnsupportedOperation(String),

    /// By-name lookup did not find anything
    #[error("{0}")]
    NotFound(String),

    /// XML reading or writing error at the document boundary
    #[error("{0}")]
    Xml(String),

    /// Settings table is missing or unusable
    #[error("{0}")]
    Settings(String),

    /// Settings ingestion error
    #[error("settings parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a document-level error
    pub fn scd(message: impl Into<String>) -> Self {
        Error::Scd(message.into())
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound(message.into())
    }

    /// Create an unsupported operation error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::UnsupportedOperation(message.into())
    }

    /// The bare message, without any variant decoration
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Xml(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_verbatim() {
        let err = Error::scd("Unknown LDevice (LD1) in IED (IED1)");
        assert_eq!(err.to_string(), "Unknown LDevice (LD1) in IED (IED1)");

        let err = Error::unsupported("DAI cannot contain a further DAI");
        assert_eq!(err.message(), "DAI cannot contain a further DAI");
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: std::result::Result<Vec<String>, _> = serde_json::from_str("not json");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));
        assert!(err.to_string().starts_with("settings parse error: "));
    }
}
