//! The probability density interface and the scoped-parameter-mutation
//! contract proposers use to evaluate an interpolated density without
//! leaving it mutated afterwards.

use std::collections::HashMap;

/// A parameter value a [`Density`] exposes by name. Scalars cover most
/// physical densities; `Vector` exists for the rare parameter that isn't.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl ParamValue {
    pub fn as_scalar(&self) -> f64 {
        match self {
            ParamValue::Scalar(v) => *v,
            ParamValue::Vector(v) => v.first().copied().unwrap_or(0.0),
        }
    }

    /// Linear interpolation between two values of the same shape.
    pub fn lerp(a: &ParamValue, b: &ParamValue, l: f64) -> ParamValue {
        match (a, b) {
            (ParamValue::Scalar(x), ParamValue::Scalar(y)) => {
                ParamValue::Scalar((1.0 - l) * x + l * y)
            }
            (ParamValue::Vector(x), ParamValue::Vector(y)) => ParamValue::Vector(
                x.iter().zip(y.iter()).map(|(x, y)| (1.0 - l) * x + l * y).collect(),
            ),
            _ => a.clone(),
        }
    }
}

/// A target probability density. MD/HMC proposers additionally require
/// [`Density::gradient`]; the RE plain proposer needs only `log_prob`.
pub trait Density: Send + Sync {
    fn log_prob(&self, position: &[f64]) -> f64;

    /// The gradient of `log_prob` at `position`. `None` if unsupported;
    /// MD/HMC proposers error out rather than silently falling back.
    fn gradient(&self, _position: &[f64]) -> Option<Vec<f64>> {
        None
    }

    fn get_param(&self, name: &str) -> Option<ParamValue>;
    fn set_param(&mut self, name: &str, value: ParamValue);

    fn energy(&self, position: &[f64]) -> f64 {
        -self.log_prob(position)
    }

    /// Clones this density behind a fresh `Box`. MD/RENS proposers need a
    /// private copy to drive through [`crate::proposer::InterpolatingDensity`]
    /// without racing the replica's own resting density.
    fn clone_box(&self) -> Box<dyn Density>;
}

/// Temporarily overrides a set of named parameters on a density, restoring
/// the originals when dropped — including on an early return or a panic
/// unwinding through the guard's scope.
pub struct ScopedParams<'a> {
    density: &'a mut dyn Density,
    originals: HashMap<String, Option<ParamValue>>,
}

impl<'a> ScopedParams<'a> {
    pub fn new(density: &'a mut dyn Density, overrides: &HashMap<String, ParamValue>) -> Self {
        let mut originals = HashMap::with_capacity(overrides.len());
        for (name, value) in overrides {
            originals.insert(name.clone(), density.get_param(name));
            density.set_param(name, value.clone());
        }
        ScopedParams { density, originals }
    }

    pub fn density(&self) -> &dyn Density {
        self.density
    }
}

impl Drop for ScopedParams<'_> {
    fn drop(&mut self) {
        for (name, original) in self.originals.drain() {
            if let Some(value) = original {
                self.density.set_param(&name, value);
            }
        }
    }
}

/// Evaluates `log_prob` with `overrides` applied, guaranteed to restore the
/// density's parameters before returning.
pub fn with_params(
    density: &mut dyn Density,
    overrides: &HashMap<String, ParamValue>,
    position: &[f64],
) -> f64 {
    let scoped = ScopedParams::new(density, overrides);
    scoped.density().log_prob(position)
}
