//! # Capabilities
//!
//! A capability is a named, callable, introspectable unit of functionality.
//! Its shape (parameters, defaults, docs) is declared up front in a
//! [`CapabilityMeta`] rather than discovered by reflection, so the same
//! description drives `capability show`, the dispatcher prompt and argument
//! binding.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Declared type of a capability parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Int,
    Float,
    Bool,
    String,
    Array,
    Map,
    Any,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Bool => "bool",
            ParamType::String => "string",
            ParamType::Array => "array",
            ParamType::Map => "map",
            ParamType::Any => "any",
        }
    }

    /// Convert a string argument to this type; anything that does not fit is
    /// returned unchanged.
    pub fn coerce(&self, value: Value) -> Value {
        let Value::String(raw) = &value else {
            let widened = match (self, value.as_f64()) {
                (ParamType::Float, Some(f)) if !value.is_f64() => Some(Value::from(f)),
                _ => None,
            };
            return widened.unwrap_or(value);
        };
        let trimmed = raw.trim();
        let coerced = match self {
            ParamType::Int => trimmed.parse::<i64>().ok().map(Value::from),
            ParamType::Float => trimmed.parse::<f64>().ok().map(Value::from),
            ParamType::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(Value::Bool(true)),
                "false" | "no" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            ParamType::Array => serde_json::from_str::<Value>(trimmed)
                .ok()
                .filter(Value::is_array),
            ParamType::Map => serde_json::from_str::<Value>(trimmed)
                .ok()
                .filter(Value::is_object),
            ParamType::String | ParamType::Any => None,
        };
        coerced.unwrap_or(value)
    }
}

impl FromStr for ParamType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" | "i64" => Ok(ParamType::Int),
            "float" | "number" | "f64" => Ok(ParamType::Float),
            "bool" | "boolean" => Ok(ParamType::Bool),
            "string" | "str" => Ok(ParamType::String),
            "array" | "list" => Ok(ParamType::Array),
            "map" | "object" | "dict" => Ok(ParamType::Map),
            "any" | "dynamic" => Ok(ParamType::Any),
            other => Err(Error::invalid_argument(format!("unknown parameter type '{}'", other))),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Param {
    pub fn required(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            default: None,
            description: String::new(),
        }
    }

    pub fn optional(name: impl Into<String>, param_type: ParamType, default: Value) -> Self {
        Self {
            default: Some(default),
            ..Self::required(name, param_type)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// A parameter with a default may be omitted
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.param_type)?;
        if let Some(default) = &self.default {
            write!(f, " = {}", default)?;
        }
        Ok(())
    }
}

/// Ordered parameter list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub params: Vec<Param>,
}

impl Signature {
    pub fn new(params: Vec<Param>) -> Self {
        Self { params }
    }

    /// Bind positional and keyword arguments to a full positional list.
    ///
    /// Positionals fill parameters in order, keywords fill by name and
    /// omitted optional parameters take their default.
    pub fn bind(&self, positional: Vec<Value>, keyword: Map<String, Value>) -> Result<Vec<Value>> {
        if positional.len() > self.params.len() {
            return Err(Error::invalid_argument(format!(
                "takes {} argument(s) but {} were given",
                self.params.len(),
                positional.len()
            ))
            .with_operation("signature::bind"));
        }

        let mut slots: Vec<Option<Value>> = positional.into_iter().map(Some).collect();
        slots.resize(self.params.len(), None);

        for (key, value) in keyword {
            let index = self
                .params
                .iter()
                .position(|p| p.name == key)
                .ok_or_else(|| {
                    Error::invalid_argument(format!("unexpected keyword argument '{}'", key))
                        .with_operation("signature::bind")
                })?;
            if slots[index].is_some() {
                return Err(Error::invalid_argument(format!(
                    "got multiple values for argument '{}'",
                    key
                ))
                .with_operation("signature::bind"));
            }
            slots[index] = Some(value);
        }

        slots
            .into_iter()
            .zip(&self.params)
            .map(|(slot, param)| {
                slot.or_else(|| param.default.clone()).ok_or_else(|| {
                    Error::invalid_argument(format!(
                        "missing required argument '{}'",
                        param.name
                    ))
                    .with_operation("signature::bind")
                })
            })
            .collect()
    }

    /// Coerce bound arguments to the declared types
    pub fn coerce(&self, args: Vec<Value>) -> Vec<Value> {
        args.into_iter()
            .enumerate()
            .map(|(i, value)| match self.params.get(i) {
                Some(param) => param.param_type.coerce(value),
                None => value,
            })
            .collect()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        write!(f, "({})", params.join(", "))
    }
}

/// Where a capability came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Bundled with the binary
    Builtin,
    /// Produced by synthesis (this session or a persisted one)
    Synthesized,
}

/// Declared description of a capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityMeta {
    pub name: String,
    pub signature: Signature,
    pub documentation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub origin: Origin,
}

impl CapabilityMeta {
    /// First line of the documentation
    pub fn summary(&self) -> &str {
        self.documentation
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("")
    }

    /// `name(a: int, b: string = "x")`
    pub fn display_signature(&self) -> String {
        format!("{}{}", self.name, self.signature)
    }
}

/// A capability bound into the running process
#[async_trait]
pub trait Capability: Send + Sync {
    /// Declared metadata
    fn meta(&self) -> &CapabilityMeta;

    /// Invoke with arguments already bound to the signature
    async fn call(&self, args: Vec<Value>) -> Result<Value>;

    fn name(&self) -> &str {
        &self.meta().name
    }
}

/// Parse text as JSON, falling back to the original string
pub fn parse_lenient(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Identifier syntax: `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
