//! Dotted data references and string helpers
//!
//! `DO.sdo1.sdo2` and `DA.bda1.bda2` references are split into a head name
//! and an ordered list of structure names. This module also provides the
//! reference syntax checks used when validating ExtRef signals and the
//! blank-aware comparisons used throughout the model.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;

static DO_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Z][0-9A-Za-z]{0,11}(\.[a-z][0-9A-Za-z]*(\([0-9]+\))?)?").unwrap()
});

static DA_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[a-zA-Z][a-zA-Z0-9]*(\([0-9]+\))?(\.[a-zA-Z][a-zA-Z0-9]*(\([0-9]+\))?)*")
        .unwrap()
});

/// Whether the first match of `re` in `s` covers the whole of `s`
fn first_match_covers(re: &Regex, s: &str) -> bool {
    re.find(s)
        .map(|m| m.start() == 0 && m.end() == s.len())
        .unwrap_or(false)
}

/// Check a DO reference (`DO` or `DO.sdo`)
pub fn is_valid_do_ref(s: &str) -> bool {
    first_match_covers(&DO_REF, s)
}

/// Check a DA reference (`da`, `da.bda`, `da(1).bda`...)
pub fn is_valid_da_ref(s: &str) -> bool {
    first_match_covers(&DA_REF, s)
}

/// Null, empty or whitespace only
pub fn is_blank(s: Option<&str>) -> bool {
    s.map(|v| v.trim().is_empty()).unwrap_or(true)
}

/// Equal, or both blank
pub fn equals_or_both_blank(a: Option<&str>, b: Option<&str>) -> bool {
    a == b || (is_blank(a) && is_blank(b))
}

/// Blank values sort first and compare equal to each other
pub fn blanks_first_cmp(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (is_blank(a), is_blank(b)) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(&b),
    }
}

/// Map a blank value to `None`
pub fn non_blank(s: Option<&str>) -> Option<String> {
    if is_blank(s) {
        None
    } else {
        s.map(str::to_string)
    }
}

/// `@name="value"`, or `not(@name)` when the value is absent
pub fn xpath_attribute_filter(name: &str, value: Option<&str>) -> String {
    match value {
        Some(v) => format!("@{}=\"{}\"", name, v),
        None => format!("not(@{})", name),
    }
}

fn split_ref(reference: &str) -> (String, Vec<String>) {
    let mut parts = reference.split('.').map(str::to_string);
    let name = parts.next().unwrap_or_default();
    (name, parts.collect())
}

fn join_ref(name: &str, struct_names: &[String]) -> String {
    let mut out = name.to_string();
    for s in struct_names {
        out.push('.');
        out.push_str(s);
    }
    out
}

/// A data object reference: DO name followed by SDO names
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DoTypeName {
    /// Top level DO name
    pub name: String,
    /// Ordered SDO names
    pub struct_names: Vec<String>,
}

impl DoTypeName {
    /// Parse a dotted DO reference
    pub fn new(reference: &str) -> Self {
        let (name, struct_names) = split_ref(reference.trim());
        Self { name, struct_names }
    }

    /// Create from a head name and SDO names
    pub fn from_parts(name: impl Into<String>, struct_names: Vec<String>) -> Self {
        Self {
            name: name.into(),
            struct_names,
        }
    }

    /// The head name is set
    pub fn is_defined(&self) -> bool {
        !self.name.trim().is_empty()
    }

    /// Number of path levels, head included
    pub fn depth(&self) -> usize {
        1 + self.struct_names.len()
    }
}

impl fmt::Display for DoTypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_ref(&self.name, &self.struct_names))
    }
}

/// A data attribute reference: DA name followed by BDA names
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DaTypeName {
    /// Top level DA name
    pub name: String,
    /// Ordered BDA names
    pub struct_names: Vec<String>,
}

impl DaTypeName {
    /// Parse a dotted DA reference
    pub fn new(reference: &str) -> Self {
        let (name, struct_names) = split_ref(reference.trim());
        Self { name, struct_names }
    }

    /// Create from a head name and BDA names
    pub fn from_parts(name: impl Into<String>, struct_names: Vec<String>) -> Self {
        Self {
            name: name.into(),
            struct_names,
        }
    }

    /// The head name is set
    pub fn is_defined(&self) -> bool {
        !self.name.trim().is_empty()
    }

    /// Whether the attribute is reached through BDAs
    pub fn is_struct(&self) -> bool {
        !self.struct_names.is_empty()
    }
}

impl fmt::Display for DaTypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_ref(&self.name, &self.struct_names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_do_reference_parsing() {
        let name = DoTypeName::new("Do1.sdo1.sdo2");
        assert_eq!(name.name, "Do1");
        assert_eq!(name.struct_names, vec!["sdo1", "sdo2"]);
        assert_eq!(name.depth(), 3);
        assert_eq!(name.to_string(), "Do1.sdo1.sdo2");
    }

    #[test]
    fn test_da_reference_parsing() {
        let name = DaTypeName::new("da1");
        assert!(name.is_defined());
        assert!(!name.is_struct());
        assert!(!DaTypeName::new("  ").is_defined());
    }

    #[test]
    fn test_do_reference_syntax() {
        assert!(is_valid_do_ref("Do1"));
        assert!(is_valid_do_ref("Do1.sdo1"));
        assert!(is_valid_do_ref("Do1.sdo1(2)"));
        assert!(!is_valid_do_ref("Do1.sdo1.sdo2"));
        assert!(!is_valid_do_ref("do"));
        assert!(!is_valid_do_ref(""));
    }

    #[test]
    fn test_da_reference_syntax() {
        assert!(is_valid_da_ref("da"));
        assert!(is_valid_da_ref("da1.bda1.bda2"));
        assert!(is_valid_da_ref("cVal(1).mag"));
        assert!(!is_valid_da_ref("da1."));
        assert!(!is_valid_da_ref("1da"));
    }

    #[test]
    fn test_blank_helpers() {
        assert!(is_blank(None));
        assert!(is_blank(Some("  ")));
        assert!(equals_or_both_blank(None, Some("")));
        assert!(!equals_or_both_blank(Some("a"), Some("")));
        assert_eq!(blanks_first_cmp(None, Some("a")), Ordering::Less);
        assert_eq!(blanks_first_cmp(Some(" "), None), Ordering::Equal);
        assert_eq!(blanks_first_cmp(Some("b"), Some("a")), Ordering::Greater);
        assert_eq!(non_blank(Some(" ")), None);
    }

    #[test]
    fn test_xpath_attribute_filter() {
        assert_eq!(xpath_attribute_filter("name", Some("X")), "@name=\"X\"");
        assert_eq!(xpath_attribute_filter("prefix", None), "not(@prefix)");
    }
}
