//! Ordered key/value bag carried next to an operation's model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Auxiliary values rendered under `extras` in the response envelope.
///
/// Insertion order is preserved and keys are unique. Operations usually fill
/// it with paging metadata; the dispatcher later folds request extras in
/// without overwriting anything already present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Extras(Map<String, Value>);

impl Extras {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing an existing value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Inserts `value` under `key`, or under `key` followed by as many copies
    /// of `suffix` as needed to find a free slot. Returns the key used.
    ///
    /// An empty `suffix` falls back to `_` so the loop always terminates.
    pub fn insert_unique(&mut self, key: &str, suffix: &str, value: impl Into<Value>) -> String {
        let suffix = if suffix.is_empty() { "_" } else { suffix };
        let mut candidate = key.to_string();
        while self.0.contains_key(&candidate) {
            candidate.push_str(suffix);
        }
        self.0.insert(candidate.clone(), value.into());
        candidate
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn insert_preserves_order() {
        let mut extras = Extras::new();
        extras.insert("PageIndex", 2);
        extras.insert("PageSize", 8);
        extras.insert("TotalCount", 20);
        assert_eq!(
            extras.keys().collect::<Vec<_>>(),
            vec!["PageIndex", "PageSize", "TotalCount"]
        );
    }

    #[test]
    fn insert_unique_appends_suffix_until_free() {
        let mut extras = Extras::new();
        extras.insert("Foo", "X");
        assert_eq!(extras.insert_unique("Foo", "_", "bar"), "Foo_");
        assert_eq!(extras.insert_unique("Foo", "_", "baz"), "Foo__");
        assert_eq!(extras.get("Foo"), Some(&json!("X")));
        assert_eq!(extras.get("Foo_"), Some(&json!("bar")));
        assert_eq!(extras.get("Foo__"), Some(&json!("baz")));
    }

    #[test]
    fn insert_unique_with_empty_suffix_still_terminates() {
        let mut extras = Extras::new();
        extras.insert("Foo", 1);
        assert_eq!(extras.insert_unique("Foo", "", 2), "Foo_");
    }

    #[test]
    fn serializes_as_plain_object() {
        let mut extras = Extras::new();
        extras.insert("b", 1);
        extras.insert("a", "x");
        assert_eq!(serde_json::to_string(&extras).unwrap(), r#"{"b":1,"a":"x"}"#);
    }
}
