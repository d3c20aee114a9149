//! Data-driven validation of the merged job document.
//!
//! The document is the JSON object produced by layering a task's override
//! on top of the seeded defaults. Each [`FieldRule`] names one field by path,
//! the kind of value it must hold, and what to do when it is absent.
//! Validation fills static defaults in place and collects every violation
//! rather than stopping at the first.

use serde_json::{Map, Value};

use crate::error::Violation;

/// What a field must contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// A string. Required strings must also be non-empty.
    String,
    /// An integer in `1..=u32::MAX`.
    PositiveInteger,
    Object,
    /// An object of boolean flags with at least one flag set.
    FlagSet,
}

/// Value inserted when a field is absent.
#[derive(Debug, Clone, Copy)]
pub enum Seed {
    Str(&'static str),
    Int(u64),
    /// A flag set with a single axis switched on.
    Flag(&'static str),
}

impl Seed {
    fn to_value(self) -> Value {
        match self {
            Seed::Str(s) => Value::String(s.to_string()),
            Seed::Int(n) => Value::from(n),
            Seed::Flag(name) => {
                let mut map = Map::new();
                map.insert(name.to_string(), Value::Bool(true));
                Value::Object(map)
            }
        }
    }
}

/// One entry of a schema.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub path: &'static [&'static str],
    pub kind: Kind,
    pub required: bool,
    pub default: Option<Seed>,
    pub max_chars: Option<usize>,
}

impl FieldRule {
    const fn required(path: &'static [&'static str], kind: Kind) -> Self {
        Self {
            path,
            kind,
            required: true,
            default: None,
            max_chars: None,
        }
    }

    const fn optional(path: &'static [&'static str], kind: Kind) -> Self {
        Self {
            path,
            kind,
            required: false,
            default: None,
            max_chars: None,
        }
    }

    const fn defaulted(path: &'static [&'static str], kind: Kind, seed: Seed) -> Self {
        Self {
            path,
            kind,
            required: true,
            default: Some(seed),
            max_chars: None,
        }
    }

    const fn limited(mut self, max_chars: usize) -> Self {
        self.max_chars = Some(max_chars);
        self
    }
}

/// Schema of the merged job document. Parents come before their children.
pub const JOB_SCHEMA: &[FieldRule] = &[
    FieldRule::required(&["build"], Kind::Object),
    FieldRule::required(&["build", "platform"], Kind::String),
    FieldRule::defaulted(&["build", "os_name"], Kind::String, Seed::Str("-")),
    FieldRule::defaulted(&["build", "architecture"], Kind::String, Seed::Str("-")),
    FieldRule::required(&["machine"], Kind::Object),
    FieldRule::required(&["machine", "platform"], Kind::String),
    FieldRule::defaulted(&["machine", "os_name"], Kind::String, Seed::Str("-")),
    FieldRule::defaulted(&["machine", "architecture"], Kind::String, Seed::Str("-")),
    FieldRule::required(&["symbol"], Kind::String).limited(25),
    FieldRule::optional(&["groupName"], Kind::String).limited(100),
    FieldRule::optional(&["groupSymbol"], Kind::String).limited(25),
    FieldRule::optional(&["productName"], Kind::String),
    FieldRule::defaulted(&["reason"], Kind::String, Seed::Str("scheduled")),
    FieldRule::defaulted(&["tier"], Kind::PositiveInteger, Seed::Int(1)),
    FieldRule::defaulted(&["collection"], Kind::FlagSet, Seed::Flag("optimized")),
    FieldRule::optional(&["revision"], Kind::String),
    FieldRule::optional(&["revisionHash"], Kind::String),
];

/// Validate `doc` against `rules`, inserting defaults for absent fields.
///
/// Children of a missing or malformed parent are skipped; the parent's own
/// violation already covers them. Explicit `null` counts as absent, and an
/// absent optional field is removed so it never surfaces as `null`.
pub fn validate(doc: &mut Value, rules: &[FieldRule]) -> Result<(), Vec<Violation>> {
    let mut violations = Vec::new();

    let Some(root) = doc.as_object_mut() else {
        return Err(vec![Violation::new("$", "must be an object")]);
    };

    for rule in rules {
        let (key, parents) = match rule.path.split_last() {
            Some(split) => split,
            None => continue,
        };
        let path = rule.path.join(".");

        let Some(parent) = descend(root, parents) else {
            continue;
        };

        let present = parent.get(*key).is_some_and(|v| !v.is_null());
        if !present {
            if let Some(seed) = rule.default {
                parent.insert((*key).to_string(), seed.to_value());
            } else if rule.required {
                parent.remove(*key);
                violations.push(Violation::new(path, "is required"));
            } else {
                parent.remove(*key);
            }
            continue;
        }

        if let Some(value) = parent.get(*key) {
            if let Some(reason) = check(rule, value) {
                violations.push(Violation::new(path, reason));
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn descend<'a>(
    root: &'a mut Map<String, Value>,
    parents: &[&str],
) -> Option<&'a mut Map<String, Value>> {
    let mut current = root;
    for segment in parents {
        current = current.get_mut(*segment)?.as_object_mut()?;
    }
    Some(current)
}

fn check(rule: &FieldRule, value: &Value) -> Option<String> {
    match rule.kind {
        Kind::String => {
            let s = match value.as_str() {
                Some(s) => s,
                None => return Some("must be a string".to_string()),
            };
            if rule.required && s.is_empty() {
                return Some("must not be empty".to_string());
            }
            match rule.max_chars {
                Some(max) if s.chars().count() > max => {
                    Some(format!("must be at most {max} characters"))
                }
                _ => None,
            }
        }
        Kind::PositiveInteger => match value.as_u64() {
            Some(n) if (1..=u64::from(u32::MAX)).contains(&n) => None,
            _ => Some("must be a positive integer".to_string()),
        },
        Kind::Object => {
            if value.is_object() {
                None
            } else {
                Some("must be an object".to_string())
            }
        }
        Kind::FlagSet => match value.as_object() {
            None => Some("must be an object of boolean flags".to_string()),
            Some(map) if map.is_empty() => Some("must set at least one flag".to_string()),
            Some(map) if map.values().any(|v| !v.is_boolean()) => {
                Some("flags must be booleans".to_string())
            }
            Some(map) if !map.values().any(|v| v.as_bool() == Some(true)) => {
                Some("must set at least one flag".to_string())
            }
            Some(_) => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "build": {"platform": "linux64"},
            "machine": {"platform": "linux64"},
            "symbol": "B",
        })
    }

    #[test]
    fn fills_defaults() {
        let mut doc = minimal();
        validate(&mut doc, JOB_SCHEMA).unwrap();

        assert_eq!(doc["build"]["os_name"], "-");
        assert_eq!(doc["machine"]["architecture"], "-");
        assert_eq!(doc["reason"], "scheduled");
        assert_eq!(doc["tier"], 1);
        assert_eq!(doc["collection"], json!({"optimized": true}));
    }

    #[test]
    fn absent_optionals_are_removed_not_nulled() {
        let mut doc = minimal();
        doc["groupName"] = Value::Null;
        validate(&mut doc, JOB_SCHEMA).unwrap();

        assert!(doc.get("groupName").is_none());
        assert!(doc.get("productName").is_none());
    }

    #[test]
    fn collects_every_violation() {
        let mut doc = json!({
            "build": {},
            "machine": "linux64",
            "symbol": 12,
            "tier": 0,
        });
        let violations = validate(&mut doc, JOB_SCHEMA).unwrap_err();
        let paths: Vec<&str> = violations.iter().map(|v| v.path.as_str()).collect();

        assert!(paths.contains(&"build.platform"));
        assert!(paths.contains(&"machine"));
        assert!(paths.contains(&"symbol"));
        assert!(paths.contains(&"tier"));
        // machine is not an object, so its children are not reported again
        assert!(!paths.contains(&"machine.platform"));
    }

    #[test]
    fn empty_flag_set_is_rejected() {
        let mut doc = minimal();
        doc["collection"] = json!({});
        let violations = validate(&mut doc, JOB_SCHEMA).unwrap_err();
        assert_eq!(violations[0].path, "collection");
    }

    #[test]
    fn all_false_flag_set_is_rejected() {
        let mut doc = minimal();
        doc["collection"] = json!({"opt": false, "debug": false});
        let violations = validate(&mut doc, JOB_SCHEMA).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "collection");
        assert_eq!(violations[0].reason, "must set at least one flag");

        doc["collection"] = json!({"opt": false, "debug": true});
        validate(&mut doc, JOB_SCHEMA).unwrap();
    }

    #[test]
    fn non_object_document_is_rejected() {
        let mut doc = json!([1, 2]);
        assert!(validate(&mut doc, JOB_SCHEMA).is_err());
    }
}
