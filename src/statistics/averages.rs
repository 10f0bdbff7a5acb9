//! Incremental running averages, per spec.md §4.9 and
//! `rexfw/statistics/averages.py`'s `AbstractAverage`.

use super::quantities::Value;

/// `v' = v*n/(n+1) + x/(n+1)`, the first contribution initialising `v`
/// directly. Shared by MCMC and RE acceptance-rate tracking.
pub(crate) struct RunningAverage {
    pub(crate) values: Vec<(u64, Value)>,
    n: u64,
}

impl RunningAverage {
    pub(crate) fn new() -> Self {
        RunningAverage { values: Vec::new(), n: 0 }
    }

    pub(crate) fn push(&mut self, step: u64, x: f64) {
        let new_value = match self.values.last() {
            None => x,
            Some((_, Value::Scalar(Some(v)))) => (v * self.n as f64) / (self.n as f64 + 1.0) + x / (self.n as f64 + 1.0),
            Some(_) => x,
        };
        self.n += 1;
        self.values.push((step, Value::Scalar(Some(new_value))));
    }
}
