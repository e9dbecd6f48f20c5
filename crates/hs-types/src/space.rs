//! Search space definitions: validation, sampling, grid discretization,
//! continuous encoding and refinement.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::errors::{HsError, HsResult};
use crate::space_error;
use crate::values::{Configuration, ParameterValue};

/// Declared sampling prior for numeric dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Prior {
    #[serde(rename = "uniform")]
    Uniform,
    #[serde(rename = "log-uniform")]
    LogUniform,
}

impl Prior {
    fn parse(parameter: &str, raw: &str) -> HsResult<Self> {
        match raw {
            "uniform" => Ok(Self::Uniform),
            "log-uniform" => Ok(Self::LogUniform),
            other => Err(space_error!(parameter, "unsupported prior '{other}'")),
        }
    }
}

/// Continuous range `[begin, end]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealSpec {
    pub begin: f64,
    pub end: f64,
    pub prior: Prior,
}

/// Integer range `[begin, end]` inclusive, optionally on a `spacing` grid
/// anchored at `begin`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegerSpec {
    pub begin: i64,
    pub end: i64,
    pub prior: Prior,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spacing: Option<i64>,
}

impl IntegerSpec {
    fn step(&self) -> i64 {
        self.spacing.unwrap_or(1)
    }

    /// Number of admissible values.
    pub fn count(&self) -> usize {
        ((self.end - self.begin) / self.step()) as usize + 1
    }

    pub fn value_at(&self, index: usize) -> i64 {
        self.begin + index as i64 * self.step()
    }

    /// Snap an arbitrary number onto the nearest admissible value.
    pub fn snap(&self, raw: f64) -> i64 {
        let index = ((raw - self.begin as f64) / self.step() as f64).round();
        let index = index.clamp(0.0, (self.count() - 1) as f64) as usize;
        self.value_at(index)
    }
}

/// One tunable dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterSpec {
    Real(RealSpec),
    Integer(IntegerSpec),
    Categorical { values: Vec<ParameterValue> },
}

impl ParameterSpec {
    fn validate(&self, name: &str) -> HsResult<()> {
        match self {
            ParameterSpec::Real(spec) => {
                if !spec.begin.is_finite() || !spec.end.is_finite() {
                    return Err(space_error!(name, "bounds must be finite"));
                }
                if spec.begin > spec.end {
                    return Err(space_error!(name, "begin {} > end {}", spec.begin, spec.end));
                }
                if spec.prior == Prior::LogUniform && spec.begin <= 0.0 {
                    return Err(space_error!(name, "log-uniform prior requires begin > 0"));
                }
            }
            ParameterSpec::Integer(spec) => {
                if spec.begin > spec.end {
                    return Err(space_error!(name, "begin {} > end {}", spec.begin, spec.end));
                }
                if spec.prior == Prior::LogUniform && spec.begin < 1 {
                    return Err(space_error!(name, "log-uniform prior requires begin >= 1"));
                }
                if let Some(spacing) = spec.spacing {
                    if spacing < 1 {
                        return Err(space_error!(name, "spacing must be >= 1, got {spacing}"));
                    }
                }
            }
            ParameterSpec::Categorical { values } => {
                if values.is_empty() {
                    return Err(space_error!(
                        name,
                        "categorical parameter needs at least one value"
                    ));
                }
            }
        }
        Ok(())
    }

    /// Draw one value independently of every other dimension.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> ParameterValue {
        match self {
            ParameterSpec::Real(spec) => match spec.prior {
                Prior::Uniform => ParameterValue::Float(rng.gen_range(spec.begin..=spec.end)),
                Prior::LogUniform => {
                    let log_val: f64 = rng.gen_range(spec.begin.ln()..=spec.end.ln());
                    ParameterValue::Float(log_val.exp().clamp(spec.begin, spec.end))
                }
            },
            ParameterSpec::Integer(spec) => match spec.prior {
                Prior::Uniform => {
                    let index = rng.gen_range(0..spec.count());
                    ParameterValue::Int(spec.value_at(index))
                }
                Prior::LogUniform => {
                    let upper = (spec.end as f64 + 1.0).ln();
                    let log_val: f64 = rng.gen_range((spec.begin as f64).ln()..=upper);
                    ParameterValue::Int(spec.snap(log_val.exp().floor()))
                }
            },
            ParameterSpec::Categorical { values } => values
                .choose(rng)
                .cloned()
                .unwrap_or(ParameterValue::Json(Value::Null)),
        }
    }

    /// Discretized axis for grid-style enumeration. Continuous dimensions
    /// use `real_steps` points (geometric for log-uniform).
    pub fn grid_values(&self, real_steps: usize) -> Vec<ParameterValue> {
        match self {
            ParameterSpec::Real(spec) => {
                if spec.begin == spec.end {
                    return vec![ParameterValue::Float(spec.begin)];
                }
                let steps = real_steps.max(2);
                let (low, high) = match spec.prior {
                    Prior::Uniform => (spec.begin, spec.end),
                    Prior::LogUniform => (spec.begin.ln(), spec.end.ln()),
                };
                (0..steps)
                    .map(|i| {
                        let t = i as f64 / (steps - 1) as f64;
                        let v = low + t * (high - low);
                        match spec.prior {
                            Prior::Uniform => ParameterValue::Float(v),
                            Prior::LogUniform => ParameterValue::Float(v.exp()),
                        }
                    })
                    .collect()
            }
            ParameterSpec::Integer(spec) => (0..spec.count())
                .map(|i| ParameterValue::Int(spec.value_at(i)))
                .collect(),
            ParameterSpec::Categorical { values } => values.clone(),
        }
    }

    /// Whether `value` lies inside this dimension.
    pub fn contains(&self, value: &ParameterValue) -> bool {
        match self {
            ParameterSpec::Real(spec) => value
                .as_f64()
                .is_some_and(|v| v >= spec.begin && v <= spec.end),
            ParameterSpec::Integer(spec) => value.as_i64().is_some_and(|v| {
                v >= spec.begin && v <= spec.end && (v - spec.begin) % spec.step() == 0
            }),
            ParameterSpec::Categorical { values } => {
                values.iter().any(|candidate| candidate == value)
            }
        }
    }

    fn encode(&self, name: &str, value: &ParameterValue) -> HsResult<f64> {
        match self {
            ParameterSpec::Real(RealSpec { prior, .. })
            | ParameterSpec::Integer(IntegerSpec { prior, .. }) => {
                let v = value
                    .as_f64()
                    .ok_or_else(|| space_error!(name, "expected a numeric value, got {value}"))?;
                Ok(match prior {
                    Prior::Uniform => v,
                    Prior::LogUniform => v.ln(),
                })
            }
            ParameterSpec::Categorical { values } => values
                .iter()
                .position(|candidate| candidate == value)
                .map(|i| i as f64)
                .ok_or_else(|| space_error!(name, "value {value} is not a declared choice")),
        }
    }

    fn decode(&self, raw: f64) -> ParameterValue {
        match self {
            ParameterSpec::Real(spec) => {
                let v = match spec.prior {
                    Prior::Uniform => raw,
                    Prior::LogUniform => raw.exp(),
                };
                ParameterValue::Float(v.clamp(spec.begin, spec.end))
            }
            ParameterSpec::Integer(spec) => {
                let v = match spec.prior {
                    Prior::Uniform => raw,
                    Prior::LogUniform => raw.exp(),
                };
                ParameterValue::Int(spec.snap(v))
            }
            ParameterSpec::Categorical { values } => {
                let index = raw.round().clamp(0.0, (values.len() - 1) as f64) as usize;
                values[index].clone()
            }
        }
    }

    fn encoded_bounds(&self) -> (f64, f64) {
        match self {
            ParameterSpec::Real(spec) => match spec.prior {
                Prior::Uniform => (spec.begin, spec.end),
                Prior::LogUniform => (spec.begin.ln(), spec.end.ln()),
            },
            ParameterSpec::Integer(spec) => match spec.prior {
                Prior::Uniform => (spec.begin as f64, spec.end as f64),
                Prior::LogUniform => ((spec.begin as f64).ln(), (spec.end as f64).ln()),
            },
            ParameterSpec::Categorical { values } => (0.0, (values.len() - 1) as f64),
        }
    }

    /// Narrowed copy covering exactly the observed `values`.
    fn narrowed(&self, observed: &[&ParameterValue]) -> ParameterSpec {
        if observed.is_empty() {
            return self.clone();
        }
        match self {
            ParameterSpec::Real(spec) => {
                let nums: Vec<f64> = observed.iter().filter_map(|v| v.as_f64()).collect();
                if nums.is_empty() {
                    return self.clone();
                }
                ParameterSpec::Real(RealSpec {
                    begin: nums.iter().copied().fold(f64::INFINITY, f64::min),
                    end: nums.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    prior: spec.prior,
                })
            }
            ParameterSpec::Integer(spec) => {
                let nums: Vec<i64> = observed.iter().filter_map(|v| v.as_i64()).collect();
                match (nums.iter().min(), nums.iter().max()) {
                    (Some(&begin), Some(&end)) => ParameterSpec::Integer(IntegerSpec {
                        begin,
                        end,
                        prior: spec.prior,
                        spacing: spec.spacing,
                    }),
                    _ => self.clone(),
                }
            }
            ParameterSpec::Categorical { .. } => {
                let mut values: Vec<ParameterValue> = Vec::new();
                for value in observed {
                    if !values.contains(*value) {
                        values.push((*value).clone());
                    }
                }
                ParameterSpec::Categorical { values }
            }
        }
    }
}

/// The full search space: parameter name to dimension. Immutable once
/// built; refinement produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    parameters: BTreeMap<String, ParameterSpec>,
}

impl SearchSpace {
    pub fn builder() -> SearchSpaceBuilder {
        SearchSpaceBuilder::default()
    }

    /// Validate JSON groups of the form
    /// `{"lrate": {"begin": 1e-4, "end": 1e-2, "prior": "log-uniform"}}` for
    /// `real`/`integer` and `{"optimizer": ["adam", "sgd"]}` for `categorical`.
    pub fn from_json(
        real: Option<&Map<String, Value>>,
        integer: Option<&Map<String, Value>>,
        categorical: Option<&Map<String, Value>>,
    ) -> HsResult<Self> {
        let mut builder = Self::builder();

        for (name, raw) in real.into_iter().flatten() {
            let fields = required_fields(name, raw)?;
            let begin = fields.number("begin")?;
            let end = fields.number("end")?;
            let prior = fields.prior()?;
            builder = builder.add(name, ParameterSpec::Real(RealSpec { begin, end, prior }));
        }

        for (name, raw) in integer.into_iter().flatten() {
            let fields = required_fields(name, raw)?;
            let begin = fields.whole("begin")?;
            let end = fields.whole("end")?;
            let prior = fields.prior()?;
            let spacing = match fields.map.get("spacing") {
                None | Some(Value::Null) => None,
                Some(_) => Some(fields.whole("spacing")?),
            };
            builder = builder.add(
                name,
                ParameterSpec::Integer(IntegerSpec { begin, end, prior, spacing }),
            );
        }

        for (name, raw) in categorical.into_iter().flatten() {
            let values = raw
                .as_array()
                .ok_or_else(|| space_error!(name, "categorical values must be a list"))?
                .iter()
                .cloned()
                .map(ParameterValue::from_json)
                .collect();
            builder = builder.add(name, ParameterSpec::Categorical { values });
        }

        builder.build()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.get(name)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    pub fn parameters(&self) -> impl Iterator<Item = (&str, &ParameterSpec)> {
        self.parameters.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    /// Dimension names in encoding order.
    pub fn names(&self) -> Vec<&str> {
        self.parameters.keys().map(String::as_str).collect()
    }

    /// Draw a raw configuration, one independent draw per dimension.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Configuration {
        self.parameters
            .iter()
            .map(|(name, spec)| (name.clone(), spec.sample(rng)))
            .collect()
    }

    /// Whether every dimension of the space has an in-range value in
    /// `config`. Extra keys are ignored.
    pub fn contains(&self, config: &Configuration) -> bool {
        self.parameters.iter().all(|(name, spec)| {
            config.get(name).is_some_and(|value| spec.contains(value))
        })
    }

    /// Total grid size, `None` on overflow.
    pub fn grid_size(&self, real_steps: usize) -> Option<usize> {
        let mut total: usize = 1;
        for spec in self.parameters.values() {
            total = total.checked_mul(spec.grid_values(real_steps).len())?;
        }
        Some(total)
    }

    /// Continuous bounds per dimension in encoding order.
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.parameters.values().map(ParameterSpec::encoded_bounds).collect()
    }

    /// Map a configuration onto a real vector: log priors in log-space,
    /// categoricals as choice index.
    pub fn encode(&self, config: &Configuration) -> HsResult<Vec<f64>> {
        self.parameters
            .iter()
            .map(|(name, spec)| {
                let value = config
                    .get(name)
                    .ok_or_else(|| space_error!(name, "missing from configuration"))?;
                spec.encode(name, value)
            })
            .collect()
    }

    /// Inverse of [`encode`](Self::encode). Out-of-range coordinates are
    /// clamped, integers and categoricals are rounded.
    pub fn decode(&self, point: &[f64]) -> HsResult<Configuration> {
        if point.len() != self.parameters.len() {
            return Err(HsError::BatchSizeMismatch {
                expected: self.parameters.len(),
                actual: point.len(),
            });
        }
        Ok(self
            .parameters
            .iter()
            .zip(point)
            .map(|((name, spec), &raw)| (name.clone(), spec.decode(raw)))
            .collect())
    }

    /// New space whose numeric bounds are the `[min, max]` of `top` and
    /// whose categoricals are the distinct values of `top`.
    pub fn refined(&self, top: &[Configuration]) -> SearchSpace {
        let parameters = self
            .parameters
            .iter()
            .map(|(name, spec)| {
                let observed: Vec<&ParameterValue> =
                    top.iter().filter_map(|config| config.get(name)).collect();
                (name.clone(), spec.narrowed(&observed))
            })
            .collect();
        SearchSpace { parameters }
    }
}

/// Collects dimensions and validates them in [`build`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct SearchSpaceBuilder {
    entries: Vec<(String, ParameterSpec)>,
}

impl SearchSpaceBuilder {
    pub fn add(mut self, name: impl Into<String>, spec: ParameterSpec) -> Self {
        self.entries.push((name.into(), spec));
        self
    }

    pub fn add_real(self, name: impl Into<String>, begin: f64, end: f64) -> Self {
        self.add(
            name,
            ParameterSpec::Real(RealSpec { begin, end, prior: Prior::Uniform }),
        )
    }

    pub fn add_log_real(self, name: impl Into<String>, begin: f64, end: f64) -> Self {
        self.add(
            name,
            ParameterSpec::Real(RealSpec { begin, end, prior: Prior::LogUniform }),
        )
    }

    pub fn add_integer(self, name: impl Into<String>, begin: i64, end: i64) -> Self {
        self.add(
            name,
            ParameterSpec::Integer(IntegerSpec {
                begin,
                end,
                prior: Prior::Uniform,
                spacing: None,
            }),
        )
    }

    pub fn add_spaced_integer(
        self,
        name: impl Into<String>,
        begin: i64,
        end: i64,
        spacing: i64,
    ) -> Self {
        self.add(
            name,
            ParameterSpec::Integer(IntegerSpec {
                begin,
                end,
                prior: Prior::Uniform,
                spacing: Some(spacing),
            }),
        )
    }

    pub fn add_categorical<V: Into<ParameterValue>>(
        self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.add(name, ParameterSpec::Categorical { values })
    }

    pub fn build(self) -> HsResult<SearchSpace> {
        let mut parameters = BTreeMap::new();
        for (name, spec) in self.entries {
            spec.validate(&name)?;
            if parameters.contains_key(&name) {
                return Err(space_error!(name, "parameter name declared more than once"));
            }
            parameters.insert(name, spec);
        }
        Ok(SearchSpace { parameters })
    }
}

/// Untyped space groups as they appear in configuration files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpaceDefinition {
    #[serde(default)]
    pub real: Option<Map<String, Value>>,
    #[serde(default)]
    pub integer: Option<Map<String, Value>>,
    #[serde(default)]
    pub categorical: Option<Map<String, Value>>,
}

impl SpaceDefinition {
    pub fn build(&self) -> HsResult<SearchSpace> {
        SearchSpace::from_json(
            self.real.as_ref(),
            self.integer.as_ref(),
            self.categorical.as_ref(),
        )
    }
}

struct Fields<'a> {
    name: &'a str,
    map: &'a Map<String, Value>,
}

fn required_fields<'a>(name: &'a str, raw: &'a Value) -> HsResult<Fields<'a>> {
    let map = raw
        .as_object()
        .ok_or_else(|| space_error!(name, "expected an object with begin/end/prior"))?;
    for key in ["begin", "end", "prior"] {
        if !map.contains_key(key) {
            return Err(space_error!(name, "missing required key '{key}'"));
        }
    }
    Ok(Fields { name, map })
}

impl Fields<'_> {
    fn number(&self, key: &str) -> HsResult<f64> {
        self.map
            .get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| space_error!(self.name, "'{key}' must be a number"))
    }

    fn whole(&self, key: &str) -> HsResult<i64> {
        self.map
            .get(key)
            .and_then(Value::as_i64)
            .ok_or_else(|| space_error!(self.name, "'{key}' must be a whole number"))
    }

    fn prior(&self) -> HsResult<Prior> {
        let raw = self
            .map
            .get("prior")
            .and_then(Value::as_str)
            .ok_or_else(|| space_error!(self.name, "'prior' must be a string"))?;
        Prior::parse(self.name, raw)
    }
}
