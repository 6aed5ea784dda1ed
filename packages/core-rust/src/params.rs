//! Inbound request parameters.
//!
//! Parameters arrive from the query string and from a form-encoded body and
//! are kept as an ordered list of `(key, value)` pairs. Lookups are
//! case-insensitive, matching how the dispatcher resolves operation names.

use serde::{Deserialize, Serialize};

/// Ordered, case-insensitive collection of request parameters.
///
/// Duplicate keys are preserved in arrival order. [`RequestParams::get`]
/// returns the first value; [`RequestParams::value`] joins all values for a key
/// with `,`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestParams {
    pairs: Vec<(String, String)>,
}

impl RequestParams {
    /// Creates an empty parameter collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter, keeping any earlier value for the same key.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Appends every pair from `other` after the existing ones.
    pub fn extend<I, K, V>(&mut self, other: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.pairs
            .extend(other.into_iter().map(|(k, v)| (k.into(), v.into())));
    }

    /// Returns the first value for `key`, compared case-insensitively.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the first value for `key` if it is present and not blank.
    #[must_use]
    pub fn get_non_blank(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    /// Returns every value for `key` in arrival order.
    #[must_use]
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Returns all values for `key` joined with `,`, or `None` when absent.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<String> {
        let values = self.get_all(key);
        if values.is_empty() {
            None
        } else {
            Some(values.join(","))
        }
    }

    /// Parses the first value for `key`, falling back to `default` when the
    /// key is absent or blank.
    ///
    /// # Errors
    ///
    /// Returns the raw value when it is present but does not parse as `T`.
    pub fn parse_or<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, String> {
        match self.get_non_blank(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| raw.to_string()),
        }
    }

    /// Returns the distinct keys in first-arrival order.
    ///
    /// Keys that differ only by ASCII case are reported once, using the
    /// spelling that arrived first.
    #[must_use]
    pub fn distinct_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for (k, _) in &self.pairs {
            if !keys.iter().any(|seen| seen.eq_ignore_ascii_case(k)) {
                keys.push(k.as_str());
            }
        }
        keys
    }

    /// Iterates over all pairs in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of pairs, counting duplicates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns `true` when no parameters were supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        params.extend(iter);
        params
    }
}
