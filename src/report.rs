//! Report items returned by validating and mutating operations
//!
//! A report is an ordered list of findings. Each item carries a severity,
//! an XPath-like locator rooted at `/SCL` and a deterministic message.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a report item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The item could not be processed
    Error,
    /// Something looks wrong but processing went on normally
    Warning,
    /// The document is not usable as-is
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// One finding of a validating or mutating operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportItem {
    /// Severity of the finding
    pub severity: Severity,
    /// XPath-like location of the offending node
    pub locator: String,
    /// Human readable message
    pub message: String,
}

impl ReportItem {
    /// Create a new report item
    pub fn new(severity: Severity, locator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            locator: locator.into(),
            message: message.into(),
        }
    }

    /// Create an error item
    pub fn error(locator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, locator, message)
    }

    /// Create a warning item
    pub fn warning(locator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, locator, message)
    }

    /// Create a fatal item
    pub fn fatal(locator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, locator, message)
    }

    /// Turn a swallowed hard failure into an error item
    pub fn from_error(locator: impl Into<String>, err: &Error) -> Self {
        Self::error(locator, err.to_string())
    }

    /// Whether this item is an error or fatal finding
    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error | Severity::Fatal)
    }
}

impl fmt::Display for ReportItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.locator, self.message)
    }
}

/// Whether any item of the report is fatal
pub fn has_fatal(items: &[ReportItem]) -> bool {
    items.iter().any(|item| item.severity == Severity::Fatal)
}

/// Whether any item of the report is an error or a fatal finding
pub fn has_errors(items: &[ReportItem]) -> bool {
    items.iter().any(ReportItem::is_error)
}

/// Serialize a report as pretty JSON
pub fn to_json(items: &[ReportItem]) -> crate::Result<String> {
    Ok(serde_json::to_string_pretty(items)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let item = ReportItem::fatal("/SCL", "boom");
        assert_eq!(item.severity, Severity::Fatal);
        assert!(item.is_error());
        assert!(!ReportItem::warning("/SCL", "hmm").is_error());
    }

    #[test]
    fn test_report_predicates() {
        let items = vec![
            ReportItem::warning("/SCL", "w"),
            ReportItem::error("/SCL", "e"),
        ];
        assert!(has_errors(&items));
        assert!(!has_fatal(&items));
    }

    #[test]
    fn test_json_export() {
        let items = vec![ReportItem::error("/SCL/IED[@name=\"A\"]", "bad")];
        let json = to_json(&items).unwrap();
        assert!(json.contains("\"severity\": \"error\""));
        let back: Vec<ReportItem> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, items);
    }

    #[test]
    fn test_display() {
        let item = ReportItem::warning("/SCL", "careful");
        assert_eq!(item.to_string(), "[warning] /SCL: careful");
    }
}
