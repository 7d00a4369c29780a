use std::{collections::BTreeMap, fmt};

pub type Map = BTreeMap<String, String>;

/// A single `key=value` label that an object must carry exactly.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label {
    key: String,
    value: String,
}

// === impl Label ===

impl Label {
    pub fn new(key: impl ToString, value: impl ToString) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    /// Both the key and the value must match; a key with another value does
    /// not.
    pub fn matches(&self, labels: &Map) -> bool {
        labels.get(&self.key) == Some(&self.value)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    #[test]
    fn test_matches() {
        let label = Label::new("openpolicyagent.org/policy", "rego");
        for (labels, matches, msg) in [
            (Map::default(), false, "no labels"),
            (
                btreemap! { "openpolicyagent.org/policy".to_string() => "rego".to_string() },
                true,
                "exact label match",
            ),
            (
                btreemap! {
                    "openpolicyagent.org/policy".to_string() => "rego".to_string(),
                    "app".to_string() => "opa".to_string(),
                },
                true,
                "sufficient label match",
            ),
            (
                btreemap! { "openpolicyagent.org/policy".to_string() => "other".to_string() },
                false,
                "value mismatch",
            ),
            (
                btreemap! { "other".to_string() => "rego".to_string() },
                false,
                "key mismatch",
            ),
        ] {
            assert_eq!(label.matches(&labels), matches, "{msg}");
        }
    }

    #[test]
    fn displays_as_selector() {
        assert_eq!(
            Label::new("openpolicyagent.org/policy", "rego").to_string(),
            "openpolicyagent.org/policy=rego"
        );
    }
}
