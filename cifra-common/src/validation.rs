//! Request validation schemas
//!
//! Declarative field constraints shared by every operation. A schema is a
//! [`Schema`] implementation that reads its fields from a merged request
//! candidate (path, query and body values in one JSON object) through
//! [`Fields`]. Each reader yields a normalized value and records any
//! [`FieldInvalidity`] in a `semval` validation context; [`validate`] returns
//! the typed record only when the context is still valid.
//!
//! Numeric readers coerce their input the way query-string values need:
//! `"42"`, `42` and `" 42 "` all read as `42`.

use chrono::{DateTime, Utc};
use semval::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Merged request values, keyed by field name
pub type Candidate = Map<String, Value>;

/// Upper bound of name fields (title, artist, ...)
pub const NAME_MAX: usize = 200;

/// Upper bound of description fields
pub const DESCRIPTION_MAX: usize = 500;

/// Text outside its character bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextInvalidity {
    TooShort { min: usize },
    TooLong { max: usize },
}

/// Text with a character-count range; `max: None` leaves it unbounded
#[derive(Debug, Clone, Copy)]
pub struct BoundedText<'a> {
    pub text: &'a str,
    pub min: usize,
    pub max: Option<usize>,
}

impl Validate for BoundedText<'_> {
    type Invalidity = TextInvalidity;

    fn validate(&self) -> ValidationResult<Self::Invalidity> {
        let len = self.text.chars().count();
        let context = ValidationContext::new()
            .invalidate_if(len < self.min, TextInvalidity::TooShort { min: self.min });
        match self.max {
            Some(max) => context.invalidate_if(len > max, TextInvalidity::TooLong { max }),
            None => context,
        }
        .into()
    }
}

/// Integer outside the range a reader accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberInvalidity {
    NotInteger,
    OutOfRange,
    NotPositive,
    Negative,
    AboveOne,
}

/// Identifier that must be greater than zero
#[derive(Debug, Clone, Copy)]
pub struct PositiveId(pub i64);

impl Validate for PositiveId {
    type Invalidity = NumberInvalidity;

    fn validate(&self) -> ValidationResult<Self::Invalidity> {
        ValidationContext::new()
            .invalidate_if(self.0 <= 0, NumberInvalidity::NotPositive)
            .into()
    }
}

/// 0/1 flag
#[derive(Debug, Clone, Copy)]
pub struct Bit(pub i64);

impl Validate for Bit {
    type Invalidity = NumberInvalidity;

    fn validate(&self) -> ValidationResult<Self::Invalidity> {
        ValidationContext::new()
            .invalidate_if(self.0 < 0, NumberInvalidity::Negative)
            .invalidate_if(self.0 > 1, NumberInvalidity::AboveOne)
            .into()
    }
}

/// What went wrong with one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    Required,
    WrongType {
        expected: &'static str,
        received: &'static str,
    },
    Text(TextInvalidity),
    Number(NumberInvalidity),
    InvalidDatetime,
}

/// Invalidity collected by [`Fields`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInvalidity {
    pub field: String,
    pub constraint: Constraint,
}

impl FieldInvalidity {
    pub fn new(field: &str, constraint: Constraint) -> Self {
        Self {
            field: field.to_string(),
            constraint,
        }
    }
}

/// Kind of constraint a field violated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    InvalidType,
    TooSmall,
    TooBig,
    InvalidDatetime,
}

/// One offending field and the constraint it failed, as sent to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub code: IssueCode,
    pub message: String,
}

impl From<FieldInvalidity> for FieldIssue {
    fn from(invalidity: FieldInvalidity) -> Self {
        let (code, message) = match invalidity.constraint {
            Constraint::Required => (IssueCode::InvalidType, "Required".to_string()),
            Constraint::WrongType { expected, received } => (
                IssueCode::InvalidType,
                format!("Expected {}, received {}", expected, received),
            ),
            Constraint::Text(TextInvalidity::TooShort { min }) => (
                IssueCode::TooSmall,
                format!("String must contain at least {} character(s)", min),
            ),
            Constraint::Text(TextInvalidity::TooLong { max }) => (
                IssueCode::TooBig,
                format!("String must contain at most {} character(s)", max),
            ),
            Constraint::Number(NumberInvalidity::NotInteger) => (
                IssueCode::InvalidType,
                "Expected integer, received float".to_string(),
            ),
            Constraint::Number(NumberInvalidity::OutOfRange) => {
                (IssueCode::TooBig, "Number is out of range".to_string())
            }
            Constraint::Number(NumberInvalidity::NotPositive) => {
                (IssueCode::TooSmall, "Number must be greater than 0".to_string())
            }
            Constraint::Number(NumberInvalidity::Negative) => (
                IssueCode::TooSmall,
                "Number must be greater than or equal to 0".to_string(),
            ),
            Constraint::Number(NumberInvalidity::AboveOne) => (
                IssueCode::TooBig,
                "Number must be less than or equal to 1".to_string(),
            ),
            Constraint::InvalidDatetime => {
                (IssueCode::InvalidDatetime, "Invalid datetime".to_string())
            }
        };

        FieldIssue {
            field: invalidity.field,
            code,
            message,
        }
    }
}

/// Field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub issues: Vec<FieldIssue>,
}

impl ValidationErrors {
    /// Issues recorded for one field
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldIssue> + 'a {
        self.issues.iter().filter(move |issue| issue.field == field)
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.for_field(field).next().is_some()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Validation failed")?;
        for (i, issue) in self.issues.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}: {}", sep, issue.field, issue.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// A typed record that can be read out of a request candidate
pub trait Schema: Sized {
    fn parse(fields: &mut Fields<'_>) -> Self;
}

/// Validate a candidate against schema `T`
pub fn validate<T: Schema>(candidate: &Candidate) -> Result<T, ValidationErrors> {
    let mut fields = Fields::new(candidate);
    let value = T::parse(&mut fields);
    fields.finish(value)
}

/// Field reader over a validation context
///
/// Readers return a placeholder value when a field fails so that a schema can
/// read every field and report all invalidities at once.
pub struct Fields<'a> {
    candidate: &'a Candidate,
    context: ValidationContext<FieldInvalidity>,
}

impl<'a> Fields<'a> {
    pub fn new(candidate: &'a Candidate) -> Self {
        Self {
            candidate,
            context: ValidationContext::new(),
        }
    }

    /// Return `value` if no field failed
    pub fn finish<T>(self, value: T) -> Result<T, ValidationErrors> {
        let result: ValidationResult<FieldInvalidity> = self.context.into();
        result.map(|()| value).map_err(|err| ValidationErrors {
            issues: err.into_iter().map(FieldIssue::from).collect(),
        })
    }

    fn invalidate(&mut self, field: &str, constraint: Constraint) {
        let context = std::mem::replace(&mut self.context, ValidationContext::new());
        self.context = context.invalidate(FieldInvalidity::new(field, constraint));
    }

    fn validate_field<T>(&mut self, field: &str, target: &T, constraint: fn(T::Invalidity) -> Constraint)
    where
        T: Validate,
    {
        let context = std::mem::replace(&mut self.context, ValidationContext::new());
        self.context = context.validate_with(target, |invalidity| {
            FieldInvalidity::new(field, constraint(invalidity))
        });
    }

    fn wrong_type(&mut self, field: &str, expected: &'static str, value: &Value) {
        self.invalidate(
            field,
            Constraint::WrongType {
                expected,
                received: type_name(value),
            },
        );
    }

    fn present(&self, field: &str) -> Option<&'a Value> {
        match self.candidate.get(field) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value),
        }
    }

    /// Required string with `min..=max` characters
    pub fn string(&mut self, field: &str, min: usize, max: usize) -> String {
        let candidate = self.candidate;
        match candidate.get(field) {
            None => {
                self.invalidate(field, Constraint::Required);
                String::new()
            }
            Some(Value::String(s)) => {
                let text = BoundedText {
                    text: s,
                    min,
                    max: Some(max),
                };
                self.validate_field(field, &text, Constraint::Text);
                s.clone()
            }
            Some(other) => {
                self.wrong_type(field, "string", other);
                String::new()
            }
        }
    }

    /// Optional string; absent and `null` both read as `None`
    pub fn nullable_string(&mut self, field: &str, max: Option<usize>) -> Option<String> {
        match self.present(field) {
            None => None,
            Some(Value::String(s)) => {
                let text = BoundedText { text: s, min: 0, max };
                self.validate_field(field, &text, Constraint::Text);
                Some(s.clone())
            }
            Some(other) => {
                self.wrong_type(field, "string", other);
                None
            }
        }
    }

    /// Name field, 1 to 200 characters
    pub fn name(&mut self, field: &str) -> String {
        self.string(field, 1, NAME_MAX)
    }

    /// Optional description, at most 500 characters
    pub fn nullable_description(&mut self, field: &str) -> Option<String> {
        self.nullable_string(field, Some(DESCRIPTION_MAX))
    }

    fn integer(&mut self, field: &str, value: &Value) -> Option<i64> {
        match coerce_integer(value) {
            Ok(n) => Some(n),
            Err(constraint) => {
                self.invalidate(field, constraint);
                None
            }
        }
    }

    fn positive(&mut self, field: &str, value: &Value) -> Option<i64> {
        let id = PositiveId(self.integer(field, value)?);
        self.validate_field(field, &id, Constraint::Number);
        Some(id.0).filter(|n| *n > 0)
    }

    /// Required positive integer identifier (numeric strings are coerced)
    pub fn foreign_key(&mut self, field: &str) -> i64 {
        let candidate = self.candidate;
        match candidate.get(field) {
            None => {
                self.invalidate(field, Constraint::Required);
                0
            }
            Some(value) => self.positive(field, value).unwrap_or(0),
        }
    }

    /// Optional positive integer identifier
    pub fn nullable_foreign_key(&mut self, field: &str) -> Option<i64> {
        let value = self.present(field)?;
        self.positive(field, value)
    }

    /// 0/1 flag, coerced from numbers, numeric strings and booleans
    pub fn bit(&mut self, field: &str) -> bool {
        let candidate = self.candidate;
        let Some(value) = candidate.get(field) else {
            self.invalidate(field, Constraint::Required);
            return false;
        };
        let Some(n) = self.integer(field, value) else {
            return false;
        };
        let bit = Bit(n);
        self.validate_field(field, &bit, Constraint::Number);
        bit.0 == 1
    }

    /// ISO 8601 date-time string in UTC (`2024-01-31T12:00:00Z`)
    pub fn date_time(&mut self, field: &str) -> DateTime<Utc> {
        let candidate = self.candidate;
        match candidate.get(field) {
            None => {
                self.invalidate(field, Constraint::Required);
                DateTime::<Utc>::default()
            }
            Some(Value::String(s)) => match parse_utc_datetime(s) {
                Some(parsed) => parsed,
                None => {
                    self.invalidate(field, Constraint::InvalidDatetime);
                    DateTime::<Utc>::default()
                }
            },
            Some(other) => {
                self.wrong_type(field, "string", other);
                DateTime::<Utc>::default()
            }
        }
    }
}

/// Read a JSON value as an integer the way query strings need it
///
/// Strings are trimmed and parsed, the empty string, `null` and `false` read
/// as 0, `true` as 1. Whole floats are accepted.
fn coerce_integer(value: &Value) -> Result<i64, Constraint> {
    let nan = Constraint::WrongType {
        expected: "number",
        received: "nan",
    };
    let float = match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => return Ok(i),
            None => n.as_f64().ok_or(nan)?,
        },
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(0);
            }
            if let Ok(i) = trimmed.parse::<i64>() {
                return Ok(i);
            }
            trimmed.parse::<f64>().map_err(|_| nan)?
        }
        Value::Bool(b) => return Ok(i64::from(*b)),
        Value::Null => return Ok(0),
        Value::Array(_) | Value::Object(_) => return Err(nan),
    };

    if !float.is_finite() {
        return Err(Constraint::WrongType {
            expected: "number",
            received: "nan",
        });
    }
    if float.fract() != 0.0 {
        return Err(Constraint::Number(NumberInvalidity::NotInteger));
    }
    if float > i64::MAX as f64 || float < i64::MIN as f64 {
        return Err(Constraint::Number(NumberInvalidity::OutOfRange));
    }
    Ok(float as i64)
}

fn parse_utc_datetime(s: &str) -> Option<DateTime<Utc>> {
    if !s.ends_with('Z') {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate(value: Value) -> Candidate {
        match value {
            Value::Object(map) => map,
            _ => panic!("test candidate must be an object"),
        }
    }

    #[derive(Debug)]
    struct Profile {
        name: String,
        description: Option<String>,
        owner: i64,
        parent: Option<i64>,
        active: bool,
        since: DateTime<Utc>,
    }

    impl Schema for Profile {
        fn parse(fields: &mut Fields<'_>) -> Self {
            Self {
                name: fields.name("name"),
                description: fields.nullable_description("description"),
                owner: fields.foreign_key("owner"),
                parent: fields.nullable_foreign_key("parent"),
                active: fields.bit("active"),
                since: fields.date_time("since"),
            }
        }
    }

    #[test]
    fn test_valid_candidate_is_normalized() {
        let c = candidate(json!({
            "name": "Bossa",
            "description": null,
            "owner": "7",
            "parent": 3,
            "active": "1",
            "since": "2024-01-31T12:00:00Z",
            "ignored": [1, 2, 3]
        }));

        let profile: Profile = validate(&c).unwrap();
        assert_eq!(profile.name, "Bossa");
        assert_eq!(profile.description, None);
        assert_eq!(profile.owner, 7);
        assert_eq!(profile.parent, Some(3));
        assert!(profile.active);
        assert_eq!(profile.since.to_rfc3339(), "2024-01-31T12:00:00+00:00");
    }

    #[test]
    fn test_all_issues_are_reported() {
        let c = candidate(json!({
            "name": "",
            "description": "x".repeat(501),
            "owner": "-2",
            "parent": "abc",
            "active": 2,
            "since": "yesterday"
        }));

        let err = validate::<Profile>(&c).unwrap_err();
        assert_eq!(err.issues.len(), 6);
        assert_eq!(err.for_field("name").next().unwrap().code, IssueCode::TooSmall);
        assert_eq!(err.for_field("description").next().unwrap().code, IssueCode::TooBig);
        assert_eq!(err.for_field("owner").next().unwrap().code, IssueCode::TooSmall);
        assert_eq!(err.for_field("parent").next().unwrap().code, IssueCode::InvalidType);
        assert_eq!(err.for_field("active").next().unwrap().code, IssueCode::TooBig);
        assert_eq!(err.for_field("since").next().unwrap().code, IssueCode::InvalidDatetime);
    }

    #[test]
    fn test_missing_required_fields() {
        let err = validate::<Profile>(&Candidate::new()).unwrap_err();
        for field in ["name", "owner", "active", "since"] {
            let issue = err.for_field(field).next().unwrap();
            assert_eq!(issue.code, IssueCode::InvalidType);
            assert_eq!(issue.message, "Required");
        }
        assert!(!err.has_field("description"));
        assert!(!err.has_field("parent"));
    }

    #[test]
    fn test_name_bounds() {
        let mut ok = Candidate::new();
        ok.insert("n".into(), json!("a".repeat(200)));
        let mut fields = Fields::new(&ok);
        fields.name("n");
        assert!(fields.finish(()).is_ok());

        let mut too_long = Candidate::new();
        too_long.insert("n".into(), json!("a".repeat(201)));
        let mut fields = Fields::new(&too_long);
        fields.name("n");
        let err = fields.finish(()).unwrap_err();
        assert_eq!(err.issues[0].message, "String must contain at most 200 character(s)");
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let mut c = Candidate::new();
        c.insert("key".into(), json!("Fá#m7(b5)é"));
        let mut fields = Fields::new(&c);
        let value = fields.nullable_string("key", Some(10));
        assert_eq!(value.as_deref(), Some("Fá#m7(b5)é"));
        assert!(fields.finish(()).is_ok());
    }

    #[test]
    fn test_string_rejects_other_types() {
        let c = candidate(json!({ "title": 12 }));
        let mut fields = Fields::new(&c);
        fields.name("title");
        let err = fields.finish(()).unwrap_err();
        assert_eq!(err.issues[0].message, "Expected string, received number");
    }

    #[test]
    fn test_foreign_key_coercion() {
        for (raw, expected) in [(json!("12"), Some(12)), (json!(" 5 "), Some(5)), (json!(3.0), Some(3))] {
            let c = candidate(json!({ "id": raw }));
            let mut fields = Fields::new(&c);
            let id = fields.foreign_key("id");
            assert_eq!(fields.finish(id).ok(), expected);
        }

        for raw in [json!("0"), json!(""), json!("1.5"), json!("abc"), json!(-1), json!(null), json!([1])] {
            let c = candidate(json!({ "id": raw.clone() }));
            let mut fields = Fields::new(&c);
            fields.foreign_key("id");
            assert!(fields.finish(()).is_err(), "{} should be rejected", raw);
        }
    }

    #[test]
    fn test_bit_accepts_booleans() {
        let c = candidate(json!({ "a": true, "b": false, "c": 0 }));
        let mut fields = Fields::new(&c);
        assert!(fields.bit("a"));
        assert!(!fields.bit("b"));
        assert!(!fields.bit("c"));
        assert!(fields.finish(()).is_ok());
    }

    #[test]
    fn test_date_time_requires_utc_designator() {
        let c = candidate(json!({ "at": "2024-01-31T12:00:00+02:00" }));
        let mut fields = Fields::new(&c);
        fields.date_time("at");
        assert!(fields.finish(()).is_err());
    }

    #[test]
    fn test_display_lists_fields() {
        let err = ValidationErrors {
            issues: vec![
                FieldIssue {
                    field: "title".into(),
                    code: IssueCode::TooSmall,
                    message: "too short".into(),
                },
                FieldIssue {
                    field: "id".into(),
                    code: IssueCode::InvalidType,
                    message: "Required".into(),
                },
            ],
        };
        assert_eq!(err.to_string(), "Validation failed: title: too short; id: Required");
    }

    #[test]
    fn test_bounded_text_reports_each_bound() {
        let short = BoundedText { text: "", min: 1, max: Some(3) };
        let invalidities: Vec<_> = short.validate().unwrap_err().into_iter().collect();
        assert_eq!(invalidities, vec![TextInvalidity::TooShort { min: 1 }]);

        let long = BoundedText { text: "abcd", min: 1, max: Some(3) };
        let invalidities: Vec<_> = long.validate().unwrap_err().into_iter().collect();
        assert_eq!(invalidities, vec![TextInvalidity::TooLong { max: 3 }]);

        let unbounded = BoundedText { text: "abcd", min: 0, max: None };
        assert!(unbounded.validate().is_ok());
    }

    #[test]
    fn test_invalidity_maps_to_client_issue() {
        let issue = FieldIssue::from(FieldInvalidity::new(
            "id",
            Constraint::Number(NumberInvalidity::NotPositive),
        ));
        assert_eq!(issue.field, "id");
        assert_eq!(issue.code, IssueCode::TooSmall);
        assert_eq!(issue.message, "Number must be greater than 0");
    }
}
