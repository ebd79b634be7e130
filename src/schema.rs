//! Schema Validation - Rule/Policy Separation
//!
//! Rules produce structured violations.
//! Policy decides which violations reject a payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Structural contract for a component payload. A small subset of JSON
/// Schema: the same shape describes the root record and every property.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SchemaType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, DataSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<DataSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
}

impl DataSchema {
    pub fn property(&self, name: &str) -> Option<&DataSchema> {
        self.properties.get(name)
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
}

impl SchemaType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            SchemaType::Object => value.is_object(),
            SchemaType::Array => value.is_array(),
            SchemaType::String => value.is_string(),
            SchemaType::Number => value.is_number(),
            SchemaType::Integer => value.as_f64().map_or(false, |n| n.fract() == 0.0),
            SchemaType::Boolean => value.is_boolean(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            SchemaType::Object => "object",
            SchemaType::Array => "array",
            SchemaType::String => "string",
            SchemaType::Number => "number",
            SchemaType::Integer => "integer",
            SchemaType::Boolean => "boolean",
        }
    }
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

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    NotARecord,
    MissingField,
    Shape,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaViolation {
    pub rule: String,
    pub kind: ViolationKind,
    pub severity: ViolationSeverity,
    /// Top-level payload field the violation belongs to, if any.
    pub field: Option<String>,
    pub path: String,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub missing_fields: Vec<String>,
    pub violations: Vec<SchemaViolation>,
}

impl ValidationReport {
    pub fn has_errors(&self) -> bool {
        self.violations.iter().any(|v| v.severity == ViolationSeverity::Error)
    }

    /// Top-level fields that carry at least one shape violation.
    pub fn fields_with_shape_violations(&self) -> Vec<String> {
        let mut fields: Vec<String> = self
            .violations
            .iter()
            .filter(|v| v.kind == ViolationKind::Shape)
            .filter_map(|v| v.field.clone())
            .collect();
        fields.sort();
        fields.dedup();
        fields
    }

    pub fn summary(&self) -> String {
        self.violations
            .iter()
            .filter(|v| v.severity == ViolationSeverity::Error)
            .map(|v| format!("{}: {}", v.path, v.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validation rule trait - produces violations
pub trait SchemaRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, payload: &Value, schema: &DataSchema) -> Vec<SchemaViolation>;
}

// --- Concrete Rules ---

pub struct RecordRule;

impl SchemaRule for RecordRule {
    fn name(&self) -> &'static str { "record" }

    fn check(&self, payload: &Value, _schema: &DataSchema) -> Vec<SchemaViolation> {
        if payload.is_object() {
            return vec![];
        }
        vec![SchemaViolation {
            rule: self.name().to_string(),
            kind: ViolationKind::NotARecord,
            severity: ViolationSeverity::Error,
            field: None,
            path: "$".to_string(),
            message: "Payload must be a structured record".to_string(),
            expected: Some("object".to_string()),
            actual: Some(type_name(payload).to_string()),
        }]
    }
}

pub struct RequiredFieldsRule;

impl SchemaRule for RequiredFieldsRule {
    fn name(&self) -> &'static str { "required" }

    fn check(&self, payload: &Value, schema: &DataSchema) -> Vec<SchemaViolation> {
        let Some(record) = payload.as_object() else {
            return vec![];
        };
        schema
            .required
            .iter()
            .filter(|key| !record.contains_key(key.as_str()))
            .map(|key| SchemaViolation {
                rule: self.name().to_string(),
                kind: ViolationKind::MissingField,
                severity: ViolationSeverity::Error,
                field: Some(key.clone()),
                path: format!("$.{}", key),
                message: "Required field is missing".to_string(),
                expected: Some("present".to_string()),
                actual: Some("absent".to_string()),
            })
            .collect()
    }
}

pub struct PropertyShapeRule;

impl PropertyShapeRule {
    fn check_value(
        &self,
        value: &Value,
        schema: &DataSchema,
        field: &str,
        path: &str,
        out: &mut Vec<SchemaViolation>,
    ) {
        let violation = |message: String, expected: Option<String>, actual: Option<String>| SchemaViolation {
            rule: "shape".to_string(),
            kind: ViolationKind::Shape,
            severity: ViolationSeverity::Warning,
            field: Some(field.to_string()),
            path: path.to_string(),
            message,
            expected,
            actual,
        };

        if let Some(kind) = schema.kind {
            if !kind.matches(value) {
                out.push(violation(
                    "Type mismatch".to_string(),
                    Some(kind.name().to_string()),
                    Some(type_name(value).to_string()),
                ));
                return;
            }
        }

        match value {
            Value::Array(items) => {
                if let Some(min) = schema.min_items {
                    if items.len() < min {
                        out.push(violation(
                            "Too few items".to_string(),
                            Some(format!(">= {}", min)),
                            Some(items.len().to_string()),
                        ));
                    }
                }
                if let Some(max) = schema.max_items {
                    if items.len() > max {
                        out.push(violation(
                            "Too many items".to_string(),
                            Some(format!("<= {}", max)),
                            Some(items.len().to_string()),
                        ));
                    }
                }
                if let Some(item_schema) = &schema.items {
                    for (i, item) in items.iter().enumerate() {
                        self.check_value(item, item_schema, field, &format!("{}[{}]", path, i), out);
                    }
                }
            }
            Value::Object(record) => {
                for key in &schema.required {
                    if !record.contains_key(key.as_str()) {
                        out.push(violation(
                            "Nested required field is missing".to_string(),
                            Some(key.clone()),
                            None,
                        ));
                    }
                }
                for (key, prop) in &schema.properties {
                    if let Some(v) = record.get(key.as_str()) {
                        self.check_value(v, prop, field, &format!("{}.{}", path, key), out);
                    }
                }
            }
            _ => {}
        }
    }
}

impl SchemaRule for PropertyShapeRule {
    fn name(&self) -> &'static str { "shape" }

    fn check(&self, payload: &Value, schema: &DataSchema) -> Vec<SchemaViolation> {
        let Some(record) = payload.as_object() else {
            return vec![];
        };
        let mut out = vec![];
        for (key, prop) in &schema.properties {
            if let Some(value) = record.get(key.as_str()) {
                self.check_value(value, prop, key, &format!("$.{}", key), &mut out);
            }
        }
        out
    }
}

/// How shape violations are treated. Record-ness and required presence are
/// always hard failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    #[default]
    Lenient,
    Strict,
}

/// Validator orchestrates rules and applies policy
pub struct SchemaValidator {
    policy: ValidationPolicy,
    rules: Vec<Box<dyn SchemaRule>>,
}

impl SchemaValidator {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self {
            policy,
            rules: vec![
                Box::new(RecordRule),
                Box::new(RequiredFieldsRule),
                Box::new(PropertyShapeRule),
            ],
        }
    }

    pub fn lenient() -> Self {
        Self::new(ValidationPolicy::Lenient)
    }

    pub fn strict() -> Self {
        Self::new(ValidationPolicy::Strict)
    }

    pub fn policy(&self) -> ValidationPolicy {
        self.policy
    }

    pub fn validate(&self, payload: &Value, schema: &DataSchema) -> ValidationReport {
        let mut violations = vec![];
        for rule in &self.rules {
            violations.extend(rule.check(payload, schema));
        }

        if self.policy == ValidationPolicy::Strict {
            for v in violations.iter_mut().filter(|v| v.kind == ViolationKind::Shape) {
                v.severity = ViolationSeverity::Error;
            }
        }

        let missing_fields = violations
            .iter()
            .filter(|v| v.kind == ViolationKind::MissingField)
            .filter_map(|v| v.field.clone())
            .collect();
        let valid = !violations.iter().any(|v| v.severity == ViolationSeverity::Error);

        ValidationReport {
            valid,
            missing_fields,
            violations,
        }
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::lenient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stats_schema() -> DataSchema {
        serde_json::from_value(json!({
            "type": "object",
            "required": ["title", "stats"],
            "properties": {
                "title": { "type": "string" },
                "subtitle": { "type": "string" },
                "stats": {
                    "type": "array",
                    "minItems": 2,
                    "maxItems": 4,
                    "items": {
                        "type": "object",
                        "required": ["label", "value"],
                        "properties": { "label": { "type": "string" }, "value": { "type": "string" } }
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn missing_required_field_always_rejects() {
        let schema = stats_schema();
        for validator in [SchemaValidator::lenient(), SchemaValidator::strict()] {
            let report = validator.validate(&json!({ "title": "Q4" }), &schema);
            assert!(!report.valid);
            assert_eq!(report.missing_fields, vec!["stats".to_string()]);
        }
    }

    #[test]
    fn non_record_payload_rejects() {
        let schema = stats_schema();
        let validator = SchemaValidator::lenient();
        for payload in [json!(null), json!(3), json!("title"), json!([1, 2])] {
            let report = validator.validate(&payload, &schema);
            assert!(!report.valid, "{payload} should be rejected");
            assert_eq!(report.violations[0].kind, ViolationKind::NotARecord);
        }
    }

    #[test]
    fn shape_violations_only_reject_under_strict_policy() {
        let schema = stats_schema();
        let payload = json!({ "title": "Q4", "stats": [{ "label": "Revenue", "value": "$2M" }] });

        let lenient = SchemaValidator::lenient().validate(&payload, &schema);
        assert!(lenient.valid);
        assert_eq!(lenient.violations.len(), 1);
        assert_eq!(lenient.violations[0].severity, ViolationSeverity::Warning);

        let strict = SchemaValidator::strict().validate(&payload, &schema);
        assert!(!strict.valid);
        assert_eq!(strict.fields_with_shape_violations(), vec!["stats".to_string()]);
    }

    #[test]
    fn nested_item_shape_is_checked() {
        let schema = stats_schema();
        let payload = json!({
            "title": "Q4",
            "subtitle": 7,
            "stats": [{ "label": "A", "value": "1" }, { "label": "B" }]
        });
        let report = SchemaValidator::strict().validate(&payload, &schema);
        assert!(!report.valid);
        assert_eq!(
            report.fields_with_shape_violations(),
            vec!["stats".to_string(), "subtitle".to_string()]
        );
        assert!(report.violations.iter().any(|v| v.path == "$.stats[1]"));
    }

    #[test]
    fn integer_type_accepts_whole_floats() {
        let schema: DataSchema = serde_json::from_value(json!({
            "properties": { "count": { "type": "integer" } }
        }))
        .unwrap();
        let validator = SchemaValidator::strict();
        assert!(validator.validate(&json!({ "count": 3.0 }), &schema).valid);
        assert!(!validator.validate(&json!({ "count": 3.5 }), &schema).valid);
    }
}
