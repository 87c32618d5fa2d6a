//! Concrete parameter values for one corner.
//!
//! [`ResolvedParameters`] is what actually crosses into a native model:
//! a flat, ordered map from parameter path to value, rendered as the
//! nested s-expression text the AMI interface expects.

use crate::ami::AmiValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Path of a parameter below the root, e.g. `tx_taps.tap_0`.
///
/// Ordered segment by segment, so parameters of the same group sort
/// next to each other.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ParamPath(Vec<String>);

impl ParamPath {
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// Split a dot-joined path.
    pub fn from_dotted(path: &str) -> Self {
        Self(path.split('.').map(str::to_string).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// This path extended by one segment.
    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        Self(segments)
    }

    /// Last segment.
    pub fn leaf_name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ParamPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl From<String> for ParamPath {
    fn from(s: String) -> Self {
        Self::from_dotted(&s)
    }
}

impl From<ParamPath> for String {
    fn from(p: ParamPath) -> Self {
        p.to_string()
    }
}

impl From<&str> for ParamPath {
    fn from(s: &str) -> Self {
        Self::from_dotted(s)
    }
}

/// Flat path-to-value map produced for one (tree, corner) pair, or parsed
/// from the text a model hands back.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedParameters {
    root: String,
    values: BTreeMap<ParamPath, AmiValue>,
}

impl ResolvedParameters {
    /// An empty set under `root`.
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            values: BTreeMap::new(),
        }
    }

    /// Root name written as the head of the text form.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Insert a value, returning the previous one at that path.
    pub fn insert(&mut self, path: impl Into<ParamPath>, value: AmiValue) -> Option<AmiValue> {
        self.values.insert(path.into(), value)
    }

    /// Look up by dot-joined path.
    pub fn get(&self, path: &str) -> Option<&AmiValue> {
        self.values.get(&ParamPath::from_dotted(path))
    }

    /// Look up by leaf name anywhere in the map; first match in path order.
    pub fn find_leaf(&self, name: &str) -> Option<&AmiValue> {
        self.values
            .iter()
            .find(|(path, _)| path.leaf_name() == Some(name))
            .map(|(_, v)| v)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParamPath, &AmiValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// First path whose value has no text form (see
    /// [`AmiValue::has_unquotable_text`]).
    pub fn find_unquotable(&self) -> Option<&ParamPath> {
        self.values
            .iter()
            .find(|(_, v)| v.has_unquotable_text())
            .map(|(p, _)| p)
    }

    /// Render as `(root (a 1) (grp (b "x")))`.
    ///
    /// Groups are rebuilt from shared path prefixes; entries appear in
    /// path order, so the output depends only on the map's contents.
    pub fn to_ami_string(&self) -> String {
        let entries: Vec<(&[String], &AmiValue)> = self
            .values
            .iter()
            .map(|(p, v)| (p.segments(), v))
            .collect();
        let mut out = String::with_capacity(16 * entries.len() + self.root.len() + 2);
        out.push('(');
        out.push_str(&self.root);
        write_level(&entries, 0, &mut out);
        out.push(')');
        out
    }
}

fn write_level(entries: &[(&[String], &AmiValue)], depth: usize, out: &mut String) {
    let mut i = 0;
    while i < entries.len() {
        let (segments, value) = entries[i];
        let Some(name) = segments.get(depth) else {
            i += 1;
            continue;
        };
        out.push_str(" (");
        out.push_str(name);
        if segments.len() == depth + 1 {
            out.push(' ');
            out.push_str(&value.to_string());
            i += 1;
        } else {
            let end = entries[i..]
                .iter()
                .position(|(s, _)| s.len() <= depth + 1 || s[depth] != *name)
                .map_or(entries.len(), |n| i + n);
            write_level(&entries[i..end], depth + 1, out);
            i = end;
        }
        out.push(')');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_form_nests_groups() {
        let mut p = ResolvedParameters::new("example_tx");
        p.insert("tx_tap_units", AmiValue::Integer(27));
        p.insert("taps.pre", AmiValue::Float(-0.1));
        p.insert("taps.post", AmiValue::Float(0.0));
        p.insert("mode", AmiValue::String("auto".into()));
        p.insert("enable", AmiValue::Boolean(true));

        assert_eq!(
            p.to_ami_string(),
            "(example_tx (enable True) (mode \"auto\") \
             (taps (post 0.0) (pre -0.1)) (tx_tap_units 27))"
        );
    }

    #[test]
    fn test_empty_set() {
        let p = ResolvedParameters::new("root");
        assert_eq!(p.to_ami_string(), "(root)");
        assert!(p.is_empty());
    }

    #[test]
    fn test_lookup() {
        let mut p = ResolvedParameters::new("root");
        p.insert("a.b.c", AmiValue::Integer(3));
        assert_eq!(p.get("a.b.c"), Some(&AmiValue::Integer(3)));
        assert_eq!(p.find_leaf("c"), Some(&AmiValue::Integer(3)));
        assert!(!p.contains("a.b"));
    }

    #[test]
    fn test_unquotable_string_detected() {
        let mut p = ResolvedParameters::new("root");
        p.insert("ok", AmiValue::String("plain".into()));
        assert!(p.find_unquotable().is_none());
        p.insert("bad", AmiValue::String("say \"hi\"".into()));
        assert_eq!(p.find_unquotable().map(ToString::to_string), Some("bad".into()));
    }

    #[test]
    fn test_json_uses_dotted_keys() {
        let mut p = ResolvedParameters::new("root");
        p.insert("g.x", AmiValue::Integer(1));
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"g.x\""));
        let back: ResolvedParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
