//! Label sets and label schemas.
//!
//! A `LabelSet` is an ordered map so that two sets with the same pairs are
//! equal (and hash equally) regardless of insertion order. A `LabelSchema`
//! holds the label names a metric declared at registration and checks
//! observed sets against them: exactly the declared names, no subset, no
//! superset.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{MetricsError, Result};

/// Mapping from label name to label value identifying one series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Insert or overwrite a label. Returns the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), value.into())
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }

    /// Overlay `other` on top of `self`; keys from `other` win.
    pub fn merge(&mut self, other: LabelSet) {
        self.0.extend(other.0);
    }

    /// Render as the `{k="v",...}` body used by the text exposition format
    /// (without braces).
    pub fn render_pairs(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for LabelSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl<K, V> FromIterator<(K, V)> for LabelSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<'a> IntoIterator for &'a LabelSet {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.render_pairs())
    }
}

/// Escape a label value for the text exposition format.
pub(crate) fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// `[a-zA-Z_][a-zA-Z0-9_]*`, not starting with `__`.
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    !name.starts_with("__") && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Declared label names of a metric.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSchema {
    names: Vec<String>,
}

impl LabelSchema {
    /// Build a schema, rejecting malformed, duplicate and `reserved` names.
    pub fn new<I, S>(names: I, reserved: &[&str]) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if !is_valid_label_name(&name) {
                return Err(MetricsError::InvalidLabelName(name));
            }
            if reserved.contains(&name.as_str()) {
                return Err(MetricsError::ReservedLabel(name));
            }
            if out.contains(&name) {
                return Err(MetricsError::InvalidLabelName(format!("{name} (declared twice)")));
            }
            out.push(name);
        }
        Ok(Self { names: out })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Accept `labels` iff its names are exactly the declared names.
    pub fn validate(&self, labels: &LabelSet) -> Result<()> {
        let missing: Vec<&str> = self
            .names
            .iter()
            .filter(|n| !labels.contains(n))
            .map(String::as_str)
            .collect();
        let unexpected: Vec<&str> = labels.names().filter(|n| !self.contains(n)).collect();

        if missing.is_empty() && unexpected.is_empty() {
            return Ok(());
        }

        let mut msg = format!("expected labels {:?}", self.names);
        if !missing.is_empty() {
            msg.push_str(&format!(", missing {missing:?}"));
        }
        if !unexpected.is_empty() {
            msg.push_str(&format!(", unexpected {unexpected:?}"));
        }
        Err(MetricsError::InvalidLabelSet(msg))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn order_does_not_matter() {
        let a = LabelSet::from([("foo", "bar"), ("baz", "wombat")]);
        let b = LabelSet::new().with("baz", "wombat").with("foo", "bar");
        assert_eq!(a, b);
    }

    #[test]
    fn schema_requires_exact_names() {
        let schema = LabelSchema::new(["foo", "baz"], &[]).unwrap();
        assert!(schema.validate(&LabelSet::from([("foo", "a"), ("baz", "b")])).is_ok());
        assert!(schema.validate(&LabelSet::from([("foo", "a")])).is_err());
        assert!(schema
            .validate(&LabelSet::from([("foo", "a"), ("baz", "b"), ("lol", "c")]))
            .is_err());
        assert!(schema.validate(&LabelSet::from([("foo", "a"), ("bax", "b")])).is_err());
    }

    #[test]
    fn label_names() {
        assert!(is_valid_label_name("mode"));
        assert!(is_valid_label_name("_x1"));
        assert!(!is_valid_label_name("__reserved"));
        assert!(!is_valid_label_name("1abc"));
        assert!(!is_valid_label_name("a-b"));
        assert!(!is_valid_label_name(""));
    }

    #[test]
    fn reserved_and_duplicate_names_rejected() {
        let err = LabelSchema::new(["le"], &["le"]).unwrap_err();
        assert_eq!(err.kind().as_str(), "ReservedLabel");
        let err = LabelSchema::new(["a", "a"], &[]).unwrap_err();
        assert_eq!(err.kind().as_str(), "InvalidLabelName");
    }

    #[test]
    fn escapes_values() {
        let l = LabelSet::from([("p", "a\"b\\c\n")]);
        assert_eq!(l.render_pairs(), r#"p="a\"b\\c\n""#);
    }
}
