//! Declarative input schemas for tools.
//!
//! Each tool owns an [`InputSchema`]: a validation/coercion function
//! (`validate`) and a protocol-facing description (`describe`) for
//! `tools/list`. The schema representation is first-class; nothing here
//! reaches into a validation library's internals.

use std::fmt;

use regex::Regex;
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
    /// Free-form value, accepted as-is.
    Any,
}

impl ParamKind {
    /// Protocol type tag. The mapping is total: free-form values carry
    /// no tag of their own and fall back to "string".
    fn protocol_name(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Array => "array",
            ParamKind::Object => "object",
            ParamKind::Any => "string",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Number => value.is_number(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Array => value.is_array(),
            ParamKind::Object => value.is_object(),
            ParamKind::Any => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PropertySpec {
    kind: ParamKind,
    description: Option<&'static str>,
    optional: bool,
    default: Option<Value>,
    enum_values: Option<Vec<&'static str>>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    pattern: Option<&'static str>,
}

impl PropertySpec {
    fn of(kind: ParamKind) -> Self {
        Self {
            kind,
            description: None,
            optional: false,
            default: None,
            enum_values: None,
            minimum: None,
            maximum: None,
            pattern: None,
        }
    }

    pub fn string() -> Self {
        Self::of(ParamKind::String)
    }

    pub fn number() -> Self {
        Self::of(ParamKind::Number)
    }

    pub fn boolean() -> Self {
        Self::of(ParamKind::Boolean)
    }

    pub fn array() -> Self {
        Self::of(ParamKind::Array)
    }

    pub fn object() -> Self {
        Self::of(ParamKind::Object)
    }

    pub fn any() -> Self {
        Self::of(ParamKind::Any)
    }

    pub fn describe(mut self, text: &'static str) -> Self {
        self.description = Some(text);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// A default implies the field is never required: omitting it means
    /// the default applies.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn one_of(mut self, values: &[&'static str]) -> Self {
        self.enum_values = Some(values.to_vec());
        self
    }

    pub fn range(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }

    pub fn matching(mut self, pattern: &'static str) -> Self {
        self.pattern = Some(pattern);
        self
    }

    fn is_required(&self) -> bool {
        !self.optional && self.default.is_none()
    }

    fn check_constraints(&self, field: &'static str, value: &Value) -> Option<FieldIssue> {
        if let (Some(allowed), Some(s)) = (&self.enum_values, value.as_str()) {
            if !allowed.contains(&s) {
                return Some(FieldIssue::constraint(
                    field,
                    format!("'{field}' must be one of {allowed:?}, got '{s}'"),
                ));
            }
        }
        if let Some(n) = value.as_f64() {
            if let Some(minimum) = self.minimum {
                if n < minimum {
                    return Some(FieldIssue::constraint(
                        field,
                        format!("'{field}' must be >= {minimum}"),
                    ));
                }
            }
            if let Some(maximum) = self.maximum {
                if n > maximum {
                    return Some(FieldIssue::constraint(
                        field,
                        format!("'{field}' must be <= {maximum}"),
                    ));
                }
            }
        }
        if let (Some(pattern), Some(s)) = (self.pattern, value.as_str()) {
            let matched = Regex::new(pattern)
                .map(|re| re.is_match(s))
                .unwrap_or(true);
            if !matched {
                return Some(FieldIssue::constraint(
                    field,
                    format!("'{field}' must match pattern {pattern}"),
                ));
            }
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    MissingRequiredField,
    WrongType,
    ConstraintViolation,
}

impl IssueKind {
    fn as_str(self) -> &'static str {
        match self {
            IssueKind::MissingRequiredField => "missing_required_field",
            IssueKind::WrongType => "wrong_type",
            IssueKind::ConstraintViolation => "constraint_violation",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldIssue {
    pub field: &'static str,
    pub kind: IssueKind,
    pub message: String,
}

impl FieldIssue {
    fn constraint(field: &'static str, message: String) -> Self {
        Self {
            field,
            kind: IssueKind::ConstraintViolation,
            message,
        }
    }
}

/// All offending fields from one validation pass.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    pub fn to_value(&self) -> Value {
        Value::Array(
            self.issues
                .iter()
                .map(|issue| {
                    json!({
                        "field": issue.field,
                        "kind": issue.kind.as_str(),
                        "message": issue.message,
                    })
                })
                .collect(),
        )
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.issues.iter().map(|i| i.message.as_str()).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// Ordered property list. An empty schema validates any object.
#[derive(Debug, Clone, Default)]
pub struct InputSchema {
    properties: Vec<(&'static str, PropertySpec)>,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property(mut self, name: &'static str, spec: PropertySpec) -> Self {
        self.properties.push((name, spec));
        self
    }

    /// Validate raw arguments against the schema.
    ///
    /// Defaults for omitted fields are applied before constraints are
    /// checked. Typing is strict: numeric strings are not coerced.
    /// Fields beyond the schema pass through untouched: the schema is a
    /// floor, not a ceiling.
    pub fn validate(&self, raw: &Map<String, Value>) -> Result<Map<String, Value>, ValidationError> {
        let mut validated = raw.clone();
        let mut issues = Vec::new();

        for (name, spec) in &self.properties {
            let name = *name;
            if !validated.contains_key(name) {
                if let Some(default) = &spec.default {
                    validated.insert(name.to_string(), default.clone());
                } else if spec.is_required() {
                    issues.push(FieldIssue {
                        field: name,
                        kind: IssueKind::MissingRequiredField,
                        message: format!("Missing required field '{name}'"),
                    });
                    continue;
                } else {
                    continue;
                }
            }

            let value = &validated[name];
            if !spec.kind.accepts(value) {
                issues.push(FieldIssue {
                    field: name,
                    kind: IssueKind::WrongType,
                    message: format!(
                        "'{name}' must be a {}",
                        spec.kind.protocol_name()
                    ),
                });
                continue;
            }
            if let Some(issue) = spec.check_constraints(name, value) {
                issues.push(issue);
            }
        }

        if issues.is_empty() {
            Ok(validated)
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Protocol-facing description for `tools/list`. Required means not
    /// optional and no default; a field with a default is never required,
    /// because the default is what would apply.
    pub fn describe(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for (name, spec) in &self.properties {
            let mut entry = json!({ "type": spec.kind.protocol_name() });
            if let Some(description) = spec.description {
                entry["description"] = json!(description);
            }
            if let Some(values) = &spec.enum_values {
                entry["enum"] = json!(values);
            }
            if let Some(default) = &spec.default {
                entry["default"] = default.clone();
            }
            properties.insert(name.to_string(), entry);
            if spec.is_required() {
                required.push(*name);
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn empty_schema_accepts_any_object() {
        let schema = InputSchema::new();
        assert!(schema.validate(&args(json!({}))).is_ok());
        assert!(schema.validate(&args(json!({"extra": 1}))).is_ok());
    }

    #[test]
    fn missing_required_field_is_reported_by_name() {
        let schema = InputSchema::new().property("site_url", PropertySpec::string());
        let err = schema.validate(&args(json!({}))).unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert_eq!(err.issues[0].kind, IssueKind::MissingRequiredField);
        assert!(err.to_string().contains("site_url"));
    }

    #[test]
    fn numeric_strings_are_not_coerced() {
        let schema = InputSchema::new().property("days", PropertySpec::number());
        let err = schema.validate(&args(json!({"days": "28"}))).unwrap_err();
        assert_eq!(err.issues[0].kind, IssueKind::WrongType);
    }

    #[test]
    fn defaults_apply_before_constraint_checks() {
        let schema = InputSchema::new().property(
            "limit",
            PropertySpec::number().default_value(json!(10)).range(1.0, 100.0),
        );
        let validated = schema.validate(&args(json!({}))).unwrap();
        assert_eq!(validated["limit"], json!(10));

        // An out-of-range explicit value still fails.
        let err = schema.validate(&args(json!({"limit": 500}))).unwrap_err();
        assert_eq!(err.issues[0].kind, IssueKind::ConstraintViolation);
    }

    #[test]
    fn enum_and_pattern_constraints_are_enforced() {
        let schema = InputSchema::new()
            .property("search_type", PropertySpec::string().one_of(&["web", "image", "video"]))
            .property(
                "start_date",
                PropertySpec::string().optional().matching(r"^\d{4}-\d{2}-\d{2}$"),
            );

        let err = schema
            .validate(&args(json!({"search_type": "news", "start_date": "yesterday"})))
            .unwrap_err();
        assert_eq!(err.issues.len(), 2);
        assert!(err.issues.iter().all(|i| i.kind == IssueKind::ConstraintViolation));

        assert!(
            schema
                .validate(&args(json!({"search_type": "web", "start_date": "2026-07-01"})))
                .is_ok()
        );
    }

    #[test]
    fn unknown_extra_fields_pass_through() {
        let schema = InputSchema::new().property("msg", PropertySpec::string());
        let validated = schema
            .validate(&args(json!({"msg": "hi", "trace": true})))
            .unwrap();
        assert_eq!(validated["trace"], json!(true));
    }

    #[test]
    fn describe_lists_types_defaults_and_required() {
        let schema = InputSchema::new()
            .property("site_url", PropertySpec::string().describe("Property URL"))
            .property("days", PropertySpec::number().default_value(json!(28)))
            .property("note", PropertySpec::any().optional());

        let described = schema.describe();
        assert_eq!(described["type"], json!("object"));
        assert_eq!(described["properties"]["site_url"]["type"], json!("string"));
        assert_eq!(described["properties"]["days"]["default"], json!(28));
        // Free-form values fall back to the "string" tag.
        assert_eq!(described["properties"]["note"]["type"], json!("string"));
        assert_eq!(described["required"], json!(["site_url"]));
    }
}
