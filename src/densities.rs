//! Reference densities used by this crate's own tests and demo. Not a
//! claim to cover any particular family of physical models.

use crate::density::{Density, ParamValue};

/// A univariate normal distribution, one component per coordinate,
/// parameterised by `mu` and `sigma`.
#[derive(Debug, Clone)]
pub struct Normal {
    mu: f64,
    sigma: f64,
}

impl Normal {
    pub fn new(mu: f64, sigma: f64) -> Self {
        Normal { mu, sigma }
    }

    pub fn standard() -> Self {
        Normal::new(0.0, 1.0)
    }
}

impl Density for Normal {
    fn log_prob(&self, position: &[f64]) -> f64 {
        -0.5 * position.iter().map(|x| (x - self.mu).powi(2)).sum::<f64>() / (self.sigma * self.sigma)
    }

    fn gradient(&self, position: &[f64]) -> Option<Vec<f64>> {
        Some(position.iter().map(|x| -(x - self.mu) / (self.sigma * self.sigma)).collect())
    }

    fn get_param(&self, name: &str) -> Option<ParamValue> {
        match name {
            "mu" => Some(ParamValue::Scalar(self.mu)),
            "sigma" => Some(ParamValue::Scalar(self.sigma)),
            _ => None,
        }
    }

    fn set_param(&mut self, name: &str, value: ParamValue) {
        match name {
            "mu" => self.mu = value.as_scalar(),
            "sigma" => self.sigma = value.as_scalar(),
            _ => {}
        }
    }

    fn clone_box(&self) -> Box<dyn crate::density::Density> {
        Box::new(self.clone())
    }
}
