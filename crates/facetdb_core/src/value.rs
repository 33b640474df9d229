//! Field kinds and values.
//!
//! Documents are dynamic maps, but every value is one of four kinds
//! declared by the entity schema. JSON coming from the API layer is coerced
//! into a [`FieldValue`] using the declared [`FieldKind`], so a value that
//! does not fit its field is rejected before anything is written.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value as Json};
use std::fmt;

/// The kind of value a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    /// A single string.
    String,
    /// An ordered set of strings without duplicates.
    StringSet,
    /// An integer or floating-point number.
    Number,
    /// An RFC 3339 timestamp.
    Date,
}

impl FieldKind {
    /// Returns the kind name used in schemas and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::StringSet => "string-set",
            Self::Number => "number",
            Self::Date => "date",
        }
    }

    /// Returns true for multi-valued kinds.
    #[must_use]
    pub const fn is_set(self) -> bool {
        matches!(self, Self::StringSet)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// A single string.
    Text(String),
    /// Set members in insertion order.
    TextSet(Vec<String>),
    /// A number, keeping the integer/float distinction of its source.
    Number(Number),
    /// A UTC timestamp.
    Date(DateTime<Utc>),
}

impl FieldValue {
    /// Builds a set value, dropping duplicate members.
    pub fn set<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for member in members {
            let member = member.into();
            if !out.contains(&member) {
                out.push(member);
            }
        }
        Self::TextSet(out)
    }

    /// Returns the kind of this value.
    #[must_use]
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Text(_) => FieldKind::String,
            Self::TextSet(_) => FieldKind::StringSet,
            Self::Number(_) => FieldKind::Number,
            Self::Date(_) => FieldKind::Date,
        }
    }

    /// Coerces a JSON value into a field of the given kind.
    ///
    /// Returns `Ok(None)` for JSON `null`, which means "not set".
    pub fn from_json(kind: FieldKind, json: &Json) -> Result<Option<Self>, String> {
        let value = match (kind, json) {
            (_, Json::Null) => return Ok(None),
            (FieldKind::String, Json::String(s)) => Self::Text(s.clone()),
            (FieldKind::StringSet, Json::Array(items)) => {
                let mut members = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Json::String(s) => members.push(s.clone()),
                        other => {
                            return Err(format!(
                                "expected an array of strings, found member {other}"
                            ))
                        }
                    }
                }
                Self::set(members)
            }
            (FieldKind::Number, Json::Number(n)) => Self::Number(n.clone()),
            (FieldKind::Date, Json::String(s)) => Self::Date(parse_date(s)?),
            (kind, other) => return Err(format!("expected {kind}, found {}", json_type(other))),
        };
        Ok(Some(value))
    }

    /// Parses a raw path segment (as used by the property routes).
    ///
    /// For a set-valued field the result is a one-member set.
    pub fn parse_segment(kind: FieldKind, raw: &str) -> Result<Self, String> {
        match kind {
            FieldKind::String => Ok(Self::Text(raw.to_string())),
            FieldKind::StringSet => Ok(Self::TextSet(vec![raw.to_string()])),
            FieldKind::Number => parse_number(raw).map(Self::Number),
            FieldKind::Date => parse_date(raw).map(Self::Date),
        }
    }

    /// Renders the value as JSON.
    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            Self::Text(s) => Json::String(s.clone()),
            Self::TextSet(members) => {
                Json::Array(members.iter().cloned().map(Json::String).collect())
            }
            Self::Number(n) => Json::Number(n.clone()),
            Self::Date(d) => Json::String(format_date(d)),
        }
    }

    /// Returns true for the empty string and the empty set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::TextSet(members) => members.is_empty(),
            Self::Number(_) | Self::Date(_) => false,
        }
    }

    /// Returns the keys this value contributes to a facet.
    ///
    /// Sets contribute one key per non-empty member; empty values contribute
    /// nothing.
    #[must_use]
    pub fn facet_keys(&self) -> Vec<String> {
        match self {
            Self::Text(s) if s.is_empty() => Vec::new(),
            Self::Text(s) => vec![s.clone()],
            Self::TextSet(members) => members.iter().filter(|m| !m.is_empty()).cloned().collect(),
            Self::Number(n) => vec![n.to_string()],
            Self::Date(d) => vec![format_date(d)],
        }
    }

    /// Checks whether this stored value matches a probe parsed from a path
    /// segment: equality for scalars, membership for sets.
    #[must_use]
    pub fn matches(&self, probe: &Self) -> bool {
        match (self, probe) {
            (Self::TextSet(members), Self::TextSet(wanted)) => {
                wanted.iter().all(|w| members.contains(w))
            }
            (Self::TextSet(members), Self::Text(wanted)) => members.contains(wanted),
            (Self::Number(a), Self::Number(b)) => a.as_f64() == b.as_f64(),
            (a, b) => a == b,
        }
    }

    /// Returns the string payload of a `Text` value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Formats a timestamp the way documents render it.
#[must_use]
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 date {raw:?}: {e}"))
}

fn parse_number(raw: &str) -> Result<Number, String> {
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(Number::from(i));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| format!("invalid number {raw:?}"))
}

fn json_type(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kinds_use_kebab_case() {
        assert_eq!(
            serde_json::to_string(&FieldKind::StringSet).unwrap(),
            "\"string-set\""
        );
        let kind: FieldKind = serde_json::from_str("\"date\"").unwrap();
        assert_eq!(kind, FieldKind::Date);
    }

    #[test]
    fn null_means_not_set() {
        assert_eq!(FieldValue::from_json(FieldKind::String, &Json::Null), Ok(None));
    }

    #[test]
    fn set_drops_duplicates_and_keeps_order() {
        let value = FieldValue::from_json(FieldKind::StringSet, &json!(["b", "a", "b"]))
            .unwrap()
            .unwrap();
        assert_eq!(value, FieldValue::TextSet(vec!["b".into(), "a".into()]));
    }

    #[test]
    fn wrong_kind_is_rejected() {
        assert!(FieldValue::from_json(FieldKind::String, &json!(3)).is_err());
        assert!(FieldValue::from_json(FieldKind::StringSet, &json!("team")).is_err());
        assert!(FieldValue::from_json(FieldKind::StringSet, &json!(["a", 1])).is_err());
        assert!(FieldValue::from_json(FieldKind::Number, &json!("3")).is_err());
        assert!(FieldValue::from_json(FieldKind::Date, &json!("yesterday")).is_err());
    }

    #[test]
    fn dates_render_with_millis() {
        let value = FieldValue::from_json(FieldKind::Date, &json!("2024-03-01T10:00:00+01:00"))
            .unwrap()
            .unwrap();
        assert_eq!(value.to_json(), json!("2024-03-01T09:00:00.000Z"));
    }

    #[test]
    fn numbers_keep_integer_form() {
        let value = FieldValue::parse_segment(FieldKind::Number, "42").unwrap();
        assert_eq!(value.to_json(), json!(42));
        let value = FieldValue::parse_segment(FieldKind::Number, "2.5").unwrap();
        assert_eq!(value.to_json(), json!(2.5));
        assert!(FieldValue::parse_segment(FieldKind::Number, "many").is_err());
    }

    #[test]
    fn facet_keys_skip_empty() {
        assert!(FieldValue::Text(String::new()).facet_keys().is_empty());
        assert_eq!(
            FieldValue::set(["Design", "", "Ops"]).facet_keys(),
            vec!["Design", "Ops"]
        );
        assert_eq!(FieldValue::Number(Number::from(7)).facet_keys(), vec!["7"]);
    }

    #[test]
    fn matching() {
        let team = FieldValue::set(["Technology", "Sales"]);
        let probe = FieldValue::parse_segment(FieldKind::StringSet, "Sales").unwrap();
        assert!(team.matches(&probe));
        let probe = FieldValue::parse_segment(FieldKind::StringSet, "Legal").unwrap();
        assert!(!team.matches(&probe));

        let age = FieldValue::Number(Number::from_f64(3.0).unwrap());
        assert!(age.matches(&FieldValue::parse_segment(FieldKind::Number, "3").unwrap()));

        let name = FieldValue::Text("John".into());
        assert!(name.matches(&FieldValue::Text("John".into())));
        assert!(!name.matches(&FieldValue::Text("john".into())));
    }
}
