//! Concrete parameter values, configurations and fixed parameters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A concrete parameter value produced by a search strategy.
///
/// `Int` is listed before `Float` so that whole JSON numbers come back as
/// integers when an archive is reloaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Json(serde_json::Value),
}

impl ParameterValue {
    /// Normalize a JSON value: numbers become `Int`/`Float`, everything else
    /// stays `Json`.
    pub fn from_json(value: serde_json::Value) -> Self {
        match &value {
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Self::Float(f)
                } else {
                    Self::Json(value)
                }
            }
            _ => Self::Json(value),
        }
    }

    /// Numeric view used by refinement and encoding.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Json(v) => v.as_f64(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Self::Float(_) => None,
            Self::Json(v) => v.as_i64(),
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(serde_json::Value::String(s)) => write!(f, "{s}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        Self::Json(serde_json::Value::String(v.to_string()))
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        Self::Json(serde_json::Value::Bool(v))
    }
}

/// One concrete assignment of values to parameter names.
///
/// Ordered by name so equality, serialization and tabular columns are
/// deterministic.
pub type Configuration = BTreeMap<String, ParameterValue>;

/// Canonical key for value-equality lookups of a configuration.
pub fn config_key(config: &Configuration) -> String {
    let mut key = String::new();
    for (name, value) in config {
        key.push_str(name);
        key.push('=');
        match value {
            ParameterValue::Int(v) => key.push_str(&v.to_string()),
            ParameterValue::Float(v) if v.fract() == 0.0 && v.is_finite() => {
                key.push_str(&(*v as i64).to_string())
            }
            ParameterValue::Float(v) => key.push_str(&v.to_string()),
            ParameterValue::Json(v) => key.push_str(&v.to_string()),
        }
        key.push(';');
    }
    key
}

/// Constants merged into every proposal but excluded from sampling,
/// deduplication and refinement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixedParams {
    values: Configuration,
}

impl FixedParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Overlay the fixed values onto a raw configuration.
    pub fn merge(&self, mut config: Configuration) -> Configuration {
        for (name, value) in &self.values {
            config.insert(name.clone(), value.clone());
        }
        config
    }

    /// Copy of `config` without any fixed keys.
    pub fn strip(&self, config: &Configuration) -> Configuration {
        config
            .iter()
            .filter(|(name, _)| !self.values.contains_key(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

impl From<Configuration> for FixedParams {
    fn from(values: Configuration) -> Self {
        Self { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_numbers_reload_as_integers() {
        let value: ParameterValue = serde_json::from_str("3").unwrap();
        assert_eq!(value, ParameterValue::Int(3));
        let value: ParameterValue = serde_json::from_str("3.5").unwrap();
        assert_eq!(value, ParameterValue::Float(3.5));
        let value: ParameterValue = serde_json::from_str("\"adam\"").unwrap();
        assert_eq!(value, ParameterValue::from("adam"));
    }

    #[test]
    fn from_json_normalizes_numbers() {
        assert_eq!(
            ParameterValue::from_json(serde_json::json!(4)),
            ParameterValue::Int(4)
        );
        assert_eq!(
            ParameterValue::from_json(serde_json::json!(0.25)),
            ParameterValue::Float(0.25)
        );
        assert_eq!(
            ParameterValue::from_json(serde_json::json!(true)),
            ParameterValue::from(true)
        );
    }

    #[test]
    fn config_key_ignores_insertion_order() {
        let mut a = Configuration::new();
        a.insert("x".into(), ParameterValue::Int(1));
        a.insert("y".into(), ParameterValue::from("relu"));
        let mut b = Configuration::new();
        b.insert("y".into(), ParameterValue::from("relu"));
        b.insert("x".into(), ParameterValue::Int(1));
        assert_eq!(config_key(&a), config_key(&b));

        b.insert("x".into(), ParameterValue::Int(2));
        assert_ne!(config_key(&a), config_key(&b));
    }

    #[test]
    fn fixed_params_merge_and_strip() {
        let fixed = FixedParams::new().with("epochs", 10_i64).with("dataset", "mnist");
        let mut raw = Configuration::new();
        raw.insert("lrate".into(), ParameterValue::Float(0.01));

        let merged = fixed.merge(raw.clone());
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get("epochs"), Some(&ParameterValue::Int(10)));

        let stripped = fixed.strip(&merged);
        assert_eq!(stripped, raw);
    }

    #[test]
    fn display_strips_string_quotes() {
        assert_eq!(ParameterValue::from("sgd").to_string(), "sgd");
        assert_eq!(ParameterValue::Int(7).to_string(), "7");
    }
}
