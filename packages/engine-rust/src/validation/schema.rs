//! Property-schema validator.
//!
//! Schemas are keyed by target type. Each type lists its properties either as
//! a map keyed by property name or as a list of objects carrying `name`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use batchwise_core::{Action, Payload, ValidationIssue, ValidationResult, Validator};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::suggest::{close_matches, property_suggestions};

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("Invalid email regex")
});

static DATETIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d{3})?Z?|\d{10}|\d{13})$")
        .expect("Invalid datetime regex")
});

/// Errors raised while loading schemas.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to read schema file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed schema document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("schema for '{target_type}' is invalid: {reason}")]
    Invalid { target_type: String, reason: String },
}

/// Declared value type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    #[default]
    String,
    Number,
    #[serde(alias = "boolean")]
    Bool,
    #[serde(alias = "date")]
    Datetime,
    Enumeration,
    /// Any other declared type; no value checks apply.
    #[serde(other)]
    Other,
}

impl PropertyType {
    fn expected(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Bool => "boolean",
            Self::Datetime => "datetime",
            Self::Enumeration => "enumeration",
            Self::Other => "value",
        }
    }
}

/// Schema of one property.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PropertySchema {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: PropertyType,
    #[serde(rename = "fieldType", default)]
    pub field_type: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, deserialize_with = "option_values")]
    pub options: Vec<String>,
}

/// Options arrive as `{"value": ..., "label": ...}` objects or bare scalars.
fn option_values<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Value>::deserialize(deserializer)?;
    Ok(raw
        .iter()
        .map(|option| option.get("value").unwrap_or(option))
        .map(scalar_text)
        .collect())
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawProperties {
    Map(BTreeMap<String, PropertySchema>),
    List(Vec<PropertySchema>),
}

#[derive(Deserialize)]
struct RawObjectSchema {
    properties: RawProperties,
}

/// Property schemas of one target type.
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    properties: BTreeMap<String, PropertySchema>,
}

impl ObjectSchema {
    fn from_raw(target_type: &str, raw: RawObjectSchema) -> Result<Self, SchemaError> {
        let properties = match raw.properties {
            RawProperties::Map(map) => map,
            RawProperties::List(list) => list
                .into_iter()
                .map(|schema| match schema.name.clone() {
                    Some(name) => Ok((name, schema)),
                    None => Err(SchemaError::Invalid {
                        target_type: target_type.to_string(),
                        reason: "property entry without a name".to_string(),
                    }),
                })
                .collect::<Result<_, _>>()?,
        };
        Ok(Self { properties })
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.get(name)
    }

    fn names(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }
}

/// [`Validator`] backed by per-target-type property schemas.
#[derive(Debug, Clone, Default)]
pub struct SchemaValidator {
    schemas: HashMap<String, ObjectSchema>,
}

impl SchemaValidator {
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the document is not valid schema JSON.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let raw: HashMap<String, RawObjectSchema> = serde_json::from_str(json)?;
        let schemas = raw
            .into_iter()
            .map(|(target_type, raw)| {
                let schema = ObjectSchema::from_raw(&target_type, raw)?;
                Ok((target_type, schema))
            })
            .collect::<Result<_, SchemaError>>()?;
        Ok(Self { schemas })
    }

    /// # Errors
    ///
    /// Returns [`SchemaError`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        let json = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    #[must_use]
    pub fn schema(&self, target_type: &str) -> Option<&ObjectSchema> {
        self.schemas.get(target_type)
    }

    #[must_use]
    pub fn target_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

fn check_value(name: &str, schema: &PropertySchema, value: &Value, issues: &mut Vec<ValidationIssue>) {
    // Blank values are a required-field concern, not a format one.
    if is_blank(Some(value)) {
        return;
    }

    let type_ok = match (schema.kind, value) {
        (PropertyType::String, v) => v.is_string(),
        (PropertyType::Number, Value::String(s)) => s.trim().parse::<f64>().is_ok(),
        (PropertyType::Number, v) => v.is_number(),
        (PropertyType::Bool, v) => v.is_boolean(),
        (PropertyType::Datetime, Value::String(s)) => {
            if !DATETIME.is_match(s) {
                issues.push(ValidationIssue::invalid_format(name, s, "datetime"));
            }
            true
        }
        (PropertyType::Datetime, v) => v.is_number(),
        (PropertyType::Enumeration | PropertyType::Other, _) => true,
    };
    if !type_ok {
        issues.push(ValidationIssue::type_mismatch(
            name,
            schema.kind.expected(),
            json_type(value),
        ));
    }

    if schema.field_type.as_deref() == Some("email") {
        if let Value::String(s) = value {
            if !EMAIL.is_match(s) {
                issues.push(ValidationIssue::invalid_format(name, s, "email address"));
            }
        }
    }

    if !schema.options.is_empty() {
        let text = scalar_text(value);
        if !schema.options.contains(&text) {
            let suggestions = close_matches(&text, &schema.options, 2, 0.6);
            issues.push(ValidationIssue::invalid_option(
                name,
                &text,
                &schema.options,
                suggestions,
            ));
        }
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

impl Validator for SchemaValidator {
    fn validate(&self, target_type: &str, action: Action, payload: &Payload) -> ValidationResult {
        // Deletes carry no properties to check.
        if action == Action::Delete {
            return ValidationResult::Valid;
        }
        let Some(schema) = self.schemas.get(target_type) else {
            return ValidationResult::from_issues(vec![ValidationIssue::schema_unavailable(
                target_type,
            )]);
        };

        let mut issues = Vec::new();
        let known = schema.names();
        for (name, value) in &payload.properties {
            match schema.property(name) {
                Some(property) => check_value(name, property, value, &mut issues),
                None => issues.push(ValidationIssue::unknown_field(
                    name.as_str(),
                    property_suggestions(name, &known),
                )),
            }
        }

        if action == Action::Create {
            for (name, property) in &schema.properties {
                if property.required && is_blank(payload.properties.get(name)) {
                    issues.push(ValidationIssue::missing_required(name.as_str()));
                }
            }
        }

        ValidationResult::from_issues(issues)
    }
}
