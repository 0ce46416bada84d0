//! Typed variable definitions and value coercion
//!
//! Values supplied at render time are JSON values. Each definition declares a
//! [`VariableType`]; values that do not already have that type are coerced
//! before substitution, and every value is rendered back to display text.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::validation::TemplateError;

/// Strings accepted as `true` when coercing to a boolean
const TRUTHY: [&str; 4] = ["true", "1", "yes", "on"];

/// Declared type of a template variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
    List,
    Dict,
}

impl VariableType {
    /// Exact runtime type check, no conversion
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_f64(),
            Self::Boolean => value.is_boolean(),
            Self::List => value.is_array(),
            Self::Dict => value.is_object(),
        }
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::Boolean => write!(f, "boolean"),
            Self::List => write!(f, "list"),
            Self::Dict => write!(f, "dict"),
        }
    }
}

/// One substitution slot of a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDefinition {
    name: String,
    #[serde(rename = "type", default)]
    var_type: VariableType,
    #[serde(default)]
    default_value: Option<Value>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "default_required")]
    required: bool,
}

fn default_required() -> bool {
    true
}

impl VariableDefinition {
    /// Create a required variable without a default
    pub fn new(name: impl Into<String>, var_type: VariableType) -> Self {
        Self {
            name: name.into(),
            var_type,
            default_value: None,
            description: None,
            required: true,
        }
    }

    /// Create a required string variable, as used for auto-detected markers
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, VariableType::String)
    }

    pub fn with_default(mut self, default_value: impl Into<Value>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn var_type(&self) -> VariableType {
        self.var_type
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Convert a value to this variable's declared type
    ///
    /// Values that already satisfy the type are returned unchanged. `null`
    /// passes through and renders as an empty string.
    pub fn coerce(&self, value: &Value) -> Result<Value, TemplateError> {
        if value.is_null() || self.var_type.matches(value) {
            return Ok(value.clone());
        }

        match self.var_type {
            VariableType::String => Ok(Value::String(render_value(value))),
            VariableType::Integer => self.coerce_integer(value),
            VariableType::Float => self.coerce_float(value),
            VariableType::Boolean => Ok(Value::Bool(coerce_boolean(value))),
            VariableType::List => self.coerce_list(value),
            VariableType::Dict => self.coerce_dict(value),
        }
    }

    fn coerce_integer(&self, value: &Value) -> Result<Value, TemplateError> {
        match value {
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| self.coercion_error(e.to_string())),
            Value::Number(n) => n
                .as_f64()
                .filter(|f| f.is_finite())
                .map(|f| Value::from(f.trunc() as i64))
                .ok_or_else(|| self.coercion_error(format!("{} is not a finite number", n))),
            Value::Bool(b) => Ok(Value::from(i64::from(*b))),
            other => Err(self.coercion_error(format!("unsupported value {}", other))),
        }
    }

    fn coerce_float(&self, value: &Value) -> Result<Value, TemplateError> {
        let parsed = match value {
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| self.coercion_error(e.to_string()))?,
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| self.coercion_error(format!("{} is out of range", n)))?,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            other => return Err(self.coercion_error(format!("unsupported value {}", other))),
        };

        Number::from_f64(parsed)
            .map(Value::Number)
            .ok_or_else(|| self.coercion_error(format!("{} is not a finite number", parsed)))
    }

    fn coerce_list(&self, value: &Value) -> Result<Value, TemplateError> {
        match value {
            Value::String(s) => Ok(Value::Array(
                s.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| Value::String(item.to_string()))
                    .collect(),
            )),
            other => Err(self.coercion_error(format!(
                "expected a list or comma-separated string, got {}",
                other
            ))),
        }
    }

    fn coerce_dict(&self, value: &Value) -> Result<Value, TemplateError> {
        let Value::String(s) = value else {
            return Err(self.coercion_error(format!(
                "expected a map or key=value string, got {}",
                value
            )));
        };

        let mut map = Map::new();

        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, val) = pair
                .split_once('=')
                .ok_or_else(|| self.coercion_error(format!("'{}' is not a key=value pair", pair)))?;
            let key = key.trim();

            if key.is_empty() {
                return Err(self.coercion_error(format!("'{}' has an empty key", pair)));
            }

            map.insert(key.to_string(), Value::String(val.trim().to_string()));
        }

        Ok(Value::Object(map))
    }

    fn coercion_error(&self, reason: impl Into<String>) -> TemplateError {
        TemplateError::Coercion {
            name: self.name.clone(),
            expected: self.var_type,
            reason: reason.into(),
        }
    }
}

fn coerce_boolean(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => TRUTHY.contains(&s.trim().to_lowercase().as_str()),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Render a (coerced) value as substitution text
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}={}", k, render_value(v)))
            .collect::<Vec<_>>()
            .join(", "),
    }
}
