//! Search space definitions and named parameter sets.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::errors::BoResult;
use crate::validation_error;

/// A single continuous dimension of the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    /// Human-readable parameter name (e.g. "learning_rate").
    pub name: String,
    /// Inclusive lower bound.
    pub min: f64,
    /// Inclusive upper bound.
    pub max: f64,
}

impl ParameterRange {
    pub fn new(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            min,
            max,
        }
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// The full search space: an ordered list of parameter ranges.
///
/// The list order fixes the component order of every point derived from
/// this space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterRange>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn add_range(mut self, name: impl Into<String>, min: f64, max: f64) -> Self {
        self.parameters.push(ParameterRange::new(name, min, max));
        self
    }

    /// Number of dimensions.
    pub fn dimensions(&self) -> usize {
        self.parameters.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    /// Reject empty spaces, non-finite or inverted bounds, and duplicate names.
    pub fn validate(&self) -> BoResult<()> {
        if self.parameters.is_empty() {
            return Err(validation_error!("search space has no parameters"));
        }

        let mut seen = HashSet::new();
        for param in &self.parameters {
            if !param.min.is_finite() || !param.max.is_finite() {
                return Err(validation_error!(
                    "parameter '{}' has non-finite bounds [{}, {}]",
                    param.name,
                    param.min,
                    param.max
                ));
            }
            if param.min > param.max {
                return Err(validation_error!(
                    "parameter '{}' has min {} greater than max {}",
                    param.name,
                    param.min,
                    param.max
                ));
            }
            if !seen.insert(param.name.as_str()) {
                return Err(validation_error!("duplicate parameter '{}'", param.name));
            }
        }

        Ok(())
    }

    /// Draw one point, each coordinate uniform in its own `[min, max]`.
    ///
    /// The space is validated first; nothing is drawn from `rng` when it is
    /// invalid.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> BoResult<ParameterSet> {
        self.validate()?;
        let entries = self
            .parameters
            .iter()
            .map(|param| (param.name.clone(), rng.random_range(param.min..=param.max)))
            .collect();
        Ok(ParameterSet { entries })
    }

    /// Rebuild named parameters from a point in this space's order.
    pub fn to_parameters(&self, point: &[f64]) -> BoResult<ParameterSet> {
        if point.len() != self.parameters.len() {
            return Err(validation_error!(
                "point has {} coordinates but the search space has {} parameters",
                point.len(),
                self.parameters.len()
            ));
        }
        let entries = self
            .parameters
            .iter()
            .zip(point)
            .map(|(param, value)| (param.name.clone(), *value))
            .collect();
        Ok(ParameterSet { entries })
    }

    /// Order `params` by this space's parameter order and flatten to a point.
    pub fn to_point(&self, params: &ParameterSet) -> BoResult<Vec<f64>> {
        if params.len() != self.parameters.len() {
            return Err(validation_error!(
                "expected {} parameters, got {}",
                self.parameters.len(),
                params.len()
            ));
        }
        self.parameters
            .iter()
            .map(|param| {
                params
                    .get(&param.name)
                    .ok_or_else(|| validation_error!("missing parameter '{}'", param.name))
            })
            .collect()
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<ParameterRange> for SearchSpace {
    fn from_iter<I: IntoIterator<Item = ParameterRange>>(iter: I) -> Self {
        Self {
            parameters: iter.into_iter().collect(),
        }
    }
}

/// A concrete, ordered assignment of values to named parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParameterSet {
    entries: Vec<(String, f64)>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, overwriting an existing entry in place.
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    /// Values in insertion order.
    pub fn values(&self) -> Vec<f64> {
        self.entries.iter().map(|(_, v)| *v).collect()
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        write!(f, "}}")
    }
}
