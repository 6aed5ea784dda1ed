//! Folding request parameters into response extras.

use dataservice_core::{Extras, RequestParams};
use serde_json::Value;

/// How request parameters become extras.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtrasRules {
    /// Marks a parameter as an extra; exactly one copy is stripped.
    pub prefix: String,
    /// Appended to a key until it no longer collides.
    pub collision_suffix: String,
    /// Also fold parameters without the prefix, under their own key.
    pub fold_unprefixed: bool,
    /// Parameter never folded when unprefixed (the operation selector).
    pub selector: String,
}

impl Default for ExtrasRules {
    fn default() -> Self {
        Self {
            prefix: "_".to_string(),
            collision_suffix: "_".to_string(),
            fold_unprefixed: true,
            selector: "op".to_string(),
        }
    }
}

impl ExtrasRules {
    /// Extras key for a request parameter, or `None` if it is not folded.
    fn target_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        if key.trim().is_empty() {
            return None;
        }
        let target = match key.strip_prefix(self.prefix.as_str()) {
            Some(stripped) if !self.prefix.is_empty() => stripped,
            _ if self.fold_unprefixed && !key.eq_ignore_ascii_case(&self.selector) => key,
            _ => return None,
        };
        if target.trim().is_empty() {
            None
        } else {
            Some(target)
        }
    }
}

/// Folds `params` into `extras`.
///
/// Each distinct parameter key is folded once, in first-arrival order, with
/// all of its values joined by `,`. Keys already present (set by the
/// operation or by an earlier fold) keep their value; the new entry gets the
/// collision suffix appended until it is unique.
pub fn merge_request_extras(extras: &mut Extras, params: &RequestParams, rules: &ExtrasRules) {
    for key in params.distinct_keys() {
        let Some(target) = rules.target_key(key) else {
            continue;
        };
        let Some(value) = params.value(key) else {
            continue;
        };
        extras.insert_unique(target, &rules.collision_suffix, Value::String(value));
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn params(pairs: &[(&str, &str)]) -> RequestParams {
        pairs.iter().copied().collect()
    }

    #[test]
    fn prefixed_params_join_operation_extras() {
        let mut extras = Extras::new();
        extras.insert("PageIndex", 2);
        merge_request_extras(&mut extras, &params(&[("_Foo", "bar")]), &ExtrasRules::default());
        assert_eq!(
            serde_json::to_value(&extras).unwrap(),
            json!({ "PageIndex": 2, "Foo": "bar" })
        );
    }

    #[test]
    fn operation_extras_keep_their_key() {
        let mut extras = Extras::new();
        extras.insert("Foo", "X");
        merge_request_extras(&mut extras, &params(&[("_Foo", "bar")]), &ExtrasRules::default());
        assert_eq!(extras.get("Foo"), Some(&json!("X")));
        assert_eq!(extras.get("Foo_"), Some(&json!("bar")));
    }

    #[test]
    fn only_one_prefix_is_stripped() {
        let mut extras = Extras::new();
        merge_request_extras(&mut extras, &params(&[("__Foo", "bar")]), &ExtrasRules::default());
        assert_eq!(extras.get("_Foo"), Some(&json!("bar")));
    }

    #[test]
    fn selector_and_blank_keys_are_never_folded() {
        let mut extras = Extras::new();
        let request = params(&[
            ("op", "Echo"),
            ("Name", "x"),
            ("_", "empty"),
            (" ", "blank"),
            ("_ ", "ws"),
        ]);
        merge_request_extras(&mut extras, &request, &ExtrasRules::default());
        assert_eq!(serde_json::to_value(&extras).unwrap(), json!({ "Name": "x" }));
    }

    #[test]
    fn request_value_for_operation_key_gets_suffix() {
        let mut extras = Extras::new();
        extras.insert("PageIndex", 2);
        merge_request_extras(
            &mut extras,
            &params(&[("op", "GetPaged"), ("PageIndex", "50")]),
            &ExtrasRules::default(),
        );
        assert_eq!(
            serde_json::to_value(&extras).unwrap(),
            json!({ "PageIndex": 2, "PageIndex_": "50" })
        );
    }

    #[test]
    fn prefix_only_mode_ignores_plain_params() {
        let rules = ExtrasRules {
            fold_unprefixed: false,
            ..ExtrasRules::default()
        };
        let mut extras = Extras::new();
        merge_request_extras(&mut extras, &params(&[("Name", "x"), ("_Tag", "t")]), &rules);
        assert_eq!(serde_json::to_value(&extras).unwrap(), json!({ "Tag": "t" }));
    }

    #[test]
    fn repeated_values_are_joined() {
        let mut extras = Extras::new();
        merge_request_extras(
            &mut extras,
            &params(&[("_Tag", "a"), ("_tag", "b"), ("_Tag", "c")]),
            &ExtrasRules::default(),
        );
        assert_eq!(extras.len(), 1);
        assert_eq!(extras.get("Tag"), Some(&json!("a,b,c")));
    }

    #[test]
    fn selector_match_is_case_insensitive() {
        let mut extras = Extras::new();
        let request = params(&[("OP", "Echo"), ("Name", "x"), ("_Name", "y")]);
        merge_request_extras(&mut extras, &request, &ExtrasRules::default());
        assert_eq!(
            serde_json::to_value(&extras).unwrap(),
            json!({ "Name": "x", "Name_": "y" })
        );
    }

    #[test]
    fn custom_prefix_and_suffix() {
        let rules = ExtrasRules {
            prefix: "x-".to_string(),
            collision_suffix: "#".to_string(),
            fold_unprefixed: false,
            ..ExtrasRules::default()
        };
        let mut extras = Extras::new();
        extras.insert("Foo", 1);
        extras.insert("Foo#", 2);
        merge_request_extras(&mut extras, &params(&[("x-Foo", "3"), ("_Bar", "4")]), &rules);
        assert_eq!(extras.get("Foo##"), Some(&json!("3")));
        assert!(!extras.contains_key("Bar"));
    }

    proptest! {
        #[test]
        fn merge_never_overwrites_and_adds_one_entry_per_key(
            existing in proptest::collection::btree_map("[A-Za-z]{1,4}", 0i64..100, 0..6),
            incoming in proptest::collection::vec(("[A-Za-z]{1,4}", "[a-z]{0,3}"), 0..8),
        ) {
            let mut extras = Extras::new();
            for (key, value) in &existing {
                extras.insert(key.clone(), *value);
            }
            let params: RequestParams = incoming
                .iter()
                .map(|(k, v)| (format!("_{k}"), v.clone()))
                .collect();

            merge_request_extras(&mut extras, &params, &ExtrasRules::default());

            for (key, value) in &existing {
                prop_assert_eq!(extras.get(key), Some(&json!(*value)));
            }
            prop_assert_eq!(extras.len(), existing.len() + params.distinct_keys().len());
        }
    }
}
