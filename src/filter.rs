//! Filter compiler (C2): turns a metadata filter into an in-memory
//! predicate and, separately, a parameterized SQL fragment.
//!
//! Grounded on the teacher's `search.rs` keyword-candidate query building
//! (parameterized `?` placeholders, positional argument vectors) but the
//! compiler itself — producing both an in-memory closure and a SQL
//! fragment from one filter value — has no direct teacher analogue and is
//! built from spec §4.2 against that query-building idiom.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::models::{Metadata, MetadataValue};

/// The filter a caller supplies: metadata key → value to match.
pub type Filter = BTreeMap<String, MetadataValue>;

/// A compiled filter: an in-memory predicate plus an equivalent SQL
/// fragment with its positional parameters, in matching order.
pub struct CompiledFilter {
    entries: Vec<(String, MetadataValue)>,
}

impl CompiledFilter {
    /// Compiles `filter`, rejecting any key containing characters outside
    /// `[A-Za-z0-9_]`.
    pub fn compile(filter: &Filter) -> Result<Self> {
        for key in filter.keys() {
            if !is_valid_key(key) {
                return Err(Error::Validation(format!(
                    "filter key {key:?} contains characters outside [A-Za-z0-9_]"
                )));
            }
        }
        Ok(Self {
            entries: filter.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
    }

    /// True iff every filter entry matches the entries in `metadata`,
    /// using canonical-string comparison for scalars and canonical JSON
    /// for maps (spec §4.2, open question resolved in DESIGN.md).
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.entries.iter().all(|(key, expected)| match metadata.get(key) {
            Some(actual) => canonical_eq(expected, actual),
            None => false,
        })
    }

    /// An `AND`-joined SQL fragment of the form
    /// `json_extract(metadata, '$.<key>') = ?` per entry (empty string if
    /// the filter has no entries), plus the parameter values in the same
    /// order the `?` placeholders appear.
    pub fn sql_fragment(&self) -> (String, Vec<String>) {
        if self.entries.is_empty() {
            return (String::new(), Vec::new());
        }
        let mut clauses = Vec::with_capacity(self.entries.len());
        let mut params = Vec::with_capacity(self.entries.len());
        for (key, value) in &self.entries {
            match value {
                // json1 maps a JSON `null` to SQL NULL, which `= ?` can
                // never match regardless of the bound parameter.
                MetadataValue::Null => {
                    clauses.push(format!("json_extract(metadata, '$.{key}') IS NULL"));
                }
                _ => {
                    // CAST to TEXT: json_extract returns a typed SQLite value
                    // (INTEGER for a JSON number or boolean, REAL for a JSON
                    // float), which compares unequal to a bound TEXT
                    // parameter under SQLite's storage-class comparison
                    // rules unless both sides share an affinity. json1 also
                    // maps JSON true/false to SQL 1/0, so the bound
                    // parameter for a bool must follow suit rather than use
                    // `canonical_string`'s "true"/"false".
                    clauses.push(format!("CAST(json_extract(metadata, '$.{key}') AS TEXT) = ?"));
                    params.push(match value {
                        MetadataValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
                        _ => value.canonical_string(),
                    });
                }
            }
        }
        (clauses.join(" AND "), params)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn canonical_eq(expected: &MetadataValue, actual: &MetadataValue) -> bool {
    match (expected, actual) {
        (MetadataValue::Map(_), _) | (_, MetadataValue::Map(_)) => {
            expected.canonical_json() == actual.canonical_json()
        }
        _ => expected.canonical_string() == actual.canonical_string(),
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, MetadataValue)]) -> Metadata {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn empty_filter_matches_everything() {
        let compiled = CompiledFilter::compile(&Filter::new()).unwrap();
        assert!(compiled.is_empty());
        assert!(compiled.matches(&Metadata::new()));
        let (frag, params) = compiled.sql_fragment();
        assert_eq!(frag, "");
        assert!(params.is_empty());
    }

    #[test]
    fn rejects_invalid_key() {
        let mut filter = Filter::new();
        filter.insert("source-type".to_string(), MetadataValue::from("gist"));
        let err = CompiledFilter::compile(&filter).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn matches_scalar_equality() {
        let mut filter = Filter::new();
        filter.insert("sourceType".to_string(), MetadataValue::from("gist"));
        let compiled = CompiledFilter::compile(&filter).unwrap();

        let matching = meta(&[("sourceType", MetadataValue::from("gist"))]);
        let non_matching = meta(&[("sourceType", MetadataValue::from("github"))]);
        assert!(compiled.matches(&matching));
        assert!(!compiled.matches(&non_matching));
        assert!(!compiled.matches(&Metadata::new()));
    }

    #[test]
    fn multiple_entries_require_all_to_match() {
        let mut filter = Filter::new();
        filter.insert("sourceType".to_string(), MetadataValue::from("gist"));
        filter.insert("chunkIndex".to_string(), MetadataValue::Number(0.0));
        let compiled = CompiledFilter::compile(&filter).unwrap();

        let full = meta(&[
            ("sourceType", MetadataValue::from("gist")),
            ("chunkIndex", MetadataValue::Number(0.0)),
        ]);
        let partial = meta(&[("sourceType", MetadataValue::from("gist"))]);
        assert!(compiled.matches(&full));
        assert!(!compiled.matches(&partial));
    }

    #[test]
    fn sql_fragment_has_one_placeholder_per_entry_in_order() {
        let mut filter = Filter::new();
        filter.insert("sourceType".to_string(), MetadataValue::from("gist"));
        filter.insert("chunkIndex".to_string(), MetadataValue::Number(0.0));
        let compiled = CompiledFilter::compile(&filter).unwrap();
        let (frag, params) = compiled.sql_fragment();
        assert_eq!(frag.matches('?').count(), 2);
        // BTreeMap iterates keys in sorted order: "chunkIndex" < "sourceType".
        assert_eq!(params, vec!["0".to_string(), "gist".to_string()]);
    }

    #[test]
    fn sql_fragment_maps_bool_params_to_json1_integer_form() {
        let mut filter = Filter::new();
        filter.insert("flag".to_string(), MetadataValue::Bool(true));
        let compiled = CompiledFilter::compile(&filter).unwrap();
        let (frag, params) = compiled.sql_fragment();
        assert_eq!(frag.matches('?').count(), 1);
        // json1 maps a JSON `true` to SQL integer 1, not the text "true".
        assert_eq!(params, vec!["1".to_string()]);
    }

    #[test]
    fn sql_fragment_uses_is_null_for_null_values() {
        let mut filter = Filter::new();
        filter.insert("maybeAbsent".to_string(), MetadataValue::Null);
        let compiled = CompiledFilter::compile(&filter).unwrap();
        let (frag, params) = compiled.sql_fragment();
        assert!(frag.contains("IS NULL"));
        assert!(!frag.contains('?'));
        assert!(params.is_empty());
    }

    #[test]
    fn object_values_compare_by_canonical_json() {
        let mut inner_a = BTreeMap::new();
        inner_a.insert("x".to_string(), MetadataValue::Number(1.0));
        let mut inner_b = BTreeMap::new();
        inner_b.insert("x".to_string(), MetadataValue::Number(1.0));

        let mut filter = Filter::new();
        filter.insert("nested".to_string(), MetadataValue::Map(inner_a));
        let compiled = CompiledFilter::compile(&filter).unwrap();

        let matching = meta(&[("nested", MetadataValue::Map(inner_b))]);
        assert!(compiled.matches(&matching));
    }
}
