//! Predicate matching over JSON requests.
//!
//! Supports: equals, deepEquals, contains, startsWith, endsWith, matches, exists, not, or, and
//!
//! Requests are plain JSON objects as protocol servers hand them over
//! (`{"method": "GET", "path": "/", "query": {...}, "body": "..."}`). Field
//! comparisons walk the expected value: objects match key by key, arrays
//! match when every expected element is found, and scalars are compared as
//! strings. String bodies holding JSON are parsed when the expected value is
//! structured.

use regex::RegexBuilder;
use serde_json::{Map, Value};
use tracing::warn;

/// Decides whether a stub's predicates accept a request
pub trait RequestMatcher: Send + Sync {
    /// All predicates must hold; an empty list matches everything
    fn matches(&self, predicates: &[Value], request: &Value) -> bool;
}

/// Mountebank-style predicate matcher over JSON requests
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPredicateMatcher;

impl RequestMatcher for JsonPredicateMatcher {
    fn matches(&self, predicates: &[Value], request: &Value) -> bool {
        predicates
            .iter()
            .all(|predicate| predicate_matches(predicate, request))
    }
}

/// Comparison options of one predicate
#[derive(Debug, Clone, Copy)]
struct Options<'a> {
    case_sensitive: bool,
    except: Option<&'a str>,
}

impl<'a> Options<'a> {
    fn from_predicate(predicate: &'a Map<String, Value>) -> Self {
        Self {
            case_sensitive: predicate
                .get("caseSensitive")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            except: predicate
                .get("except")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty()),
        }
    }

    /// Normalize an actual or expected string for comparison
    fn normalize(&self, value: &str, apply_except: bool) -> String {
        let mut value = value.to_string();
        if apply_except {
            if let Some(pattern) = self.except {
                match RegexBuilder::new(pattern)
                    .case_insensitive(!self.case_sensitive)
                    .build()
                {
                    Ok(re) => value = re.replace_all(&value, "").into_owned(),
                    Err(e) => warn!("Invalid except pattern {:?}: {}", pattern, e),
                }
            }
        }
        if self.case_sensitive {
            value
        } else {
            value.to_lowercase()
        }
    }

    fn key_matches(&self, expected: &str, actual: &str) -> bool {
        if self.case_sensitive {
            expected == actual
        } else {
            expected.eq_ignore_ascii_case(actual)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Equals,
    DeepEquals,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
}

impl Operator {
    const ALL: [(&'static str, Operator); 6] = [
        ("equals", Operator::Equals),
        ("deepEquals", Operator::DeepEquals),
        ("contains", Operator::Contains),
        ("startsWith", Operator::StartsWith),
        ("endsWith", Operator::EndsWith),
        ("matches", Operator::Matches),
    ];
}

/// Check a single predicate against a request
pub fn predicate_matches(predicate: &Value, request: &Value) -> bool {
    let Some(fields) = predicate.as_object() else {
        warn!("Ignoring predicate that is not an object: {}", predicate);
        return false;
    };
    let options = Options::from_predicate(fields);

    if let Some(inner) = fields.get("not") {
        return !predicate_matches(inner, request);
    }
    if let Some(children) = fields.get("or").and_then(Value::as_array) {
        return children.iter().any(|p| predicate_matches(p, request));
    }
    if let Some(children) = fields.get("and").and_then(Value::as_array) {
        return children.iter().all(|p| predicate_matches(p, request));
    }
    if let Some(expected) = fields.get("exists") {
        return exists_matches(expected, Some(request), &options);
    }

    for (key, operator) in Operator::ALL {
        if let Some(expected) = fields.get(key) {
            return match operator {
                Operator::DeepEquals => match (expected, request) {
                    (Value::Object(expected_fields), Value::Object(request_fields)) => {
                        expected_fields.iter().all(|(field, expected_value)| {
                            deep_equals(
                                expected_value,
                                get_field(request_fields, field, &options),
                                &options,
                            )
                        })
                    }
                    _ => false,
                },
                _ => field_matches(operator, expected, Some(request), &options),
            };
        }
    }

    warn!("Ignoring predicate without a known operator: {}", predicate);
    false
}

/// Look up a field, honoring key case sensitivity
fn get_field<'v>(object: &'v Map<String, Value>, key: &str, options: &Options) -> Option<&'v Value> {
    object.get(key).or_else(|| {
        object
            .iter()
            .find(|(actual, _)| options.key_matches(key, actual))
            .map(|(_, value)| value)
    })
}

/// Parse a JSON string so structured expectations can look inside it
fn as_structured(actual: &Value) -> Option<Value> {
    match actual {
        Value::Object(_) | Value::Array(_) => Some(actual.clone()),
        Value::String(s) => serde_json::from_str::<Value>(s)
            .ok()
            .filter(|parsed| parsed.is_object() || parsed.is_array()),
        _ => None,
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn compare_strings(operator: Operator, expected: &Value, actual: &Value, options: &Options) -> bool {
    let actual = options.normalize(&scalar_string(actual), true);

    if operator == Operator::Matches {
        let pattern = scalar_string(expected);
        return match RegexBuilder::new(&pattern)
            .case_insensitive(!options.case_sensitive)
            .build()
        {
            Ok(re) => re.is_match(&actual),
            Err(e) => {
                warn!("Invalid matches pattern {:?}: {}", pattern, e);
                false
            }
        };
    }

    let expected = options.normalize(&scalar_string(expected), false);
    match operator {
        Operator::Contains => actual.contains(&expected),
        Operator::StartsWith => actual.starts_with(&expected),
        Operator::EndsWith => actual.ends_with(&expected),
        _ => actual == expected,
    }
}

/// Subset comparison used by every operator except deepEquals
fn field_matches(operator: Operator, expected: &Value, actual: Option<&Value>, options: &Options) -> bool {
    let missing = Value::String(String::new());
    let actual = actual.unwrap_or(&missing);

    match expected {
        Value::Object(expected_fields) => {
            let Some(Value::Object(actual_fields)) = as_structured(actual) else {
                return false;
            };
            expected_fields.iter().all(|(key, expected_value)| {
                field_matches(
                    operator,
                    expected_value,
                    get_field(&actual_fields, key, options),
                    options,
                )
            })
        }
        Value::Array(expected_items) => {
            let Some(Value::Array(actual_items)) = as_structured(actual) else {
                return false;
            };
            expected_items.iter().all(|expected_item| {
                actual_items
                    .iter()
                    .any(|actual_item| field_matches(operator, expected_item, Some(actual_item), options))
            })
        }
        _ => match actual {
            // a scalar expectation matches any element of a multi-valued field
            Value::Array(items) => items
                .iter()
                .any(|item| compare_strings(operator, expected, item, options)),
            _ => compare_strings(operator, expected, actual, options),
        },
    }
}

/// Exact comparison: objects must carry the same keys, arrays the same
/// elements in any order
fn deep_equals(expected: &Value, actual: Option<&Value>, options: &Options) -> bool {
    let missing = Value::String(String::new());
    let actual = actual.unwrap_or(&missing);

    match expected {
        Value::Object(expected_fields) => {
            let Some(Value::Object(actual_fields)) = as_structured(actual) else {
                return false;
            };
            expected_fields.len() == actual_fields.len()
                && expected_fields.iter().all(|(key, expected_value)| {
                    get_field(&actual_fields, key, options)
                        .is_some_and(|actual_value| deep_equals(expected_value, Some(actual_value), options))
                })
        }
        Value::Array(expected_items) => {
            let Some(Value::Array(actual_items)) = as_structured(actual) else {
                return false;
            };
            expected_items.len() == actual_items.len()
                && expected_items.iter().all(|expected_item| {
                    actual_items
                        .iter()
                        .any(|actual_item| deep_equals(expected_item, Some(actual_item), options))
                })
        }
        _ => !actual.is_object() && !actual.is_array() && compare_strings(Operator::Equals, expected, actual, options),
    }
}

fn exists_matches(expected: &Value, actual: Option<&Value>, options: &Options) -> bool {
    match expected {
        Value::Object(expected_fields) => {
            let structured = actual.and_then(as_structured);
            let actual_fields = match &structured {
                Some(Value::Object(fields)) => Some(fields),
                _ => None,
            };
            expected_fields.iter().all(|(key, expected_value)| {
                let field = actual_fields.and_then(|fields| get_field(fields, key, options));
                exists_matches(expected_value, field, options)
            })
        }
        Value::Bool(should_exist) => {
            let present = match actual {
                None | Some(Value::Null) => false,
                Some(Value::String(s)) => !s.is_empty(),
                Some(_) => true,
            };
            present == *should_exist
        }
        other => {
            warn!("exists expects booleans, got {}", other);
            false
        }
    }
}
