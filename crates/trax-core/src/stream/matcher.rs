#![forbid(unsafe_code)]

//! Payload constraints for [`EventStream::await_event`](super::EventStream::await_event).

use regex::Regex;
use serde_json::Value as Json;

/// Constraint on a single payload field.
#[derive(Debug, Clone)]
pub enum FieldMatch {
    /// Field must be JSON-equal to this value.
    Equals(Json),
    /// Field must be a string matched by this expression.
    Regex(Regex),
}

impl FieldMatch {
    fn matches(&self, value: Option<&Json>) -> bool {
        match (self, value) {
            (Self::Equals(expected), Some(v)) => expected == v,
            (Self::Equals(expected), None) => expected.is_null(),
            (Self::Regex(re), Some(Json::String(s))) => re.is_match(s),
            (Self::Regex(_), _) => false,
        }
    }
}

/// Set of field constraints evaluated against an event's JSON payload.
///
/// All constraints must hold. An empty match accepts every event.
///
/// ```
/// use trax_core::stream::EventMatch;
///
/// let m = EventMatch::new()
///     .equals("processorId", "Store%Sum")
///     .pattern("name", "^!Comp")
///     .unwrap();
/// assert_eq!(m.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct EventMatch {
    fields: Vec<(String, FieldMatch)>,
}

impl EventMatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`.
    #[must_use]
    pub fn equals(mut self, field: impl Into<String>, value: impl Into<Json>) -> Self {
        self.fields
            .push((field.into(), FieldMatch::Equals(value.into())));
        self
    }

    /// Require `field` to be a string matched by `re`.
    #[must_use]
    pub fn regex(mut self, field: impl Into<String>, re: Regex) -> Self {
        self.fields.push((field.into(), FieldMatch::Regex(re)));
        self
    }

    /// Compile `pattern` and require `field` to match it.
    pub fn pattern(self, field: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(self.regex(field, Regex::new(pattern)?))
    }

    /// Number of constraints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Evaluate the constraints against an event payload.
    #[must_use]
    pub fn matches(&self, data: Option<&Json>) -> bool {
        if self.fields.is_empty() {
            return true;
        }
        let Some(Json::Object(map)) = data else {
            return false;
        };
        self.fields
            .iter()
            .all(|(field, constraint)| constraint.matches(map.get(field)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_match_accepts_anything() {
        assert!(EventMatch::new().matches(None));
        assert!(EventMatch::new().matches(Some(&json!(42))));
    }

    #[test]
    fn literal_and_regex_fields() {
        let m = EventMatch::new()
            .equals("index", 3)
            .pattern("name", r"^!Rec")
            .unwrap();
        assert!(m.matches(Some(&json!({"name": "!Reconciliation", "index": 3}))));
        assert!(!m.matches(Some(&json!({"name": "!Reconciliation", "index": 4}))));
        assert!(!m.matches(Some(&json!({"name": "!Compute", "index": 3}))));
        assert!(!m.matches(Some(&json!("!Reconciliation"))));
    }

    #[test]
    fn regex_requires_string_field() {
        let m = EventMatch::new().pattern("count", r"\d").unwrap();
        assert!(!m.matches(Some(&json!({"count": 1}))));
        assert!(m.matches(Some(&json!({"count": "1"}))));
    }
}
