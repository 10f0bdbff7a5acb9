//! Logged quantities: step-indexed values the statistics engine tracks and
//! writers later read back. Grounded on
//! `rexfw/statistics/logged_quantities.py` and `rexfw/statistics/averages.py`.

use crate::message::PeerId;
use crate::sampler::{NamedMap, SamplerStats};

/// A single swap outcome between two replicas, as reported by the master
/// after `_calculate_acceptance` (spec.md §4.8).
#[derive(Debug, Clone, Copy)]
pub struct SwapStats {
    pub accepted: bool,
    pub works: (f64, f64),
    pub heats: (f64, f64),
}

/// The update a [`LoggedQuantity`] is asked to absorb: either a replica's
/// batch of per-variable sampler stats, or one pair's swap outcome.
pub enum StatUpdate<'a> {
    Sampler(&'a NamedMap<SamplerStats>),
    Swap(&'a SwapStats),
}

/// A recorded value. `Scalar` covers acceptance rates and step sizes;
/// `Pair` covers works/heats, which the original always reports as a
/// forward/backward two-tuple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Scalar(Option<f64>),
    Pair(f64, f64),
}

impl Value {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => *v,
            Value::Pair(_, _) => None,
        }
    }
}

/// A quantity the statistics engine tracks: a name, the origin(s) (usually
/// replica names) it's scoped to, and an ordered step -> value history.
/// Insertion order is significant (steps are appended monotonically by the
/// master, so insertion order and step order coincide).
pub trait LoggedQuantity: Send {
    fn origins(&self) -> &[PeerId];
    fn name(&self) -> &str;
    fn variable_name(&self) -> Option<&str>;
    fn stats_fields(&self) -> &[&'static str];

    /// Absorbs an update if it matches this quantity's origins/variable;
    /// returns whether it did.
    fn update(&mut self, step: u64, update: &StatUpdate) -> bool;

    fn current_value(&self) -> Option<Value>;
    fn values(&self) -> &[(u64, Value)];
}

/// Raw (non-averaged) per-draw step size, one series per (replica,
/// variable).
pub struct SamplerStepsize {
    replica: PeerId,
    variable_name: String,
    values: Vec<(u64, Value)>,
}

impl SamplerStepsize {
    pub fn new(replica: impl Into<PeerId>, variable_name: impl Into<String>) -> Self {
        SamplerStepsize { replica: replica.into(), variable_name: variable_name.into(), values: Vec::new() }
    }
}

impl LoggedQuantity for SamplerStepsize {
    fn origins(&self) -> &[PeerId] {
        std::slice::from_ref(&self.replica)
    }

    fn name(&self) -> &str {
        "stepsize"
    }

    fn variable_name(&self) -> Option<&str> {
        Some(&self.variable_name)
    }

    fn stats_fields(&self) -> &[&'static str] {
        &["stepsize"]
    }

    fn update(&mut self, step: u64, update: &StatUpdate) -> bool {
        let StatUpdate::Sampler(stats) = update else { return false };
        let Some(s) = stats.get(&self.variable_name) else { return false };
        self.values.push((step, Value::Scalar(s.stepsize)));
        true
    }

    fn current_value(&self) -> Option<Value> {
        self.values.last().map(|(_, v)| *v)
    }

    fn values(&self) -> &[(u64, Value)] {
        &self.values
    }
}

use super::averages::RunningAverage;

/// MCMC acceptance rate, averaged over draws, per (replica, variable).
pub struct MCMCAcceptanceRateAverage {
    replica: PeerId,
    variable_name: String,
    average: RunningAverage,
}

impl MCMCAcceptanceRateAverage {
    pub fn new(replica: impl Into<PeerId>, variable_name: impl Into<String>) -> Self {
        MCMCAcceptanceRateAverage { replica: replica.into(), variable_name: variable_name.into(), average: RunningAverage::new() }
    }
}

impl LoggedQuantity for MCMCAcceptanceRateAverage {
    fn origins(&self) -> &[PeerId] {
        std::slice::from_ref(&self.replica)
    }

    fn name(&self) -> &str {
        "acceptance rate"
    }

    fn variable_name(&self) -> Option<&str> {
        Some(&self.variable_name)
    }

    fn stats_fields(&self) -> &[&'static str] {
        &["accepted"]
    }

    fn update(&mut self, step: u64, update: &StatUpdate) -> bool {
        let StatUpdate::Sampler(stats) = update else { return false };
        let Some(s) = stats.get(&self.variable_name) else { return false };
        self.average.push(step, if s.accepted { 1.0 } else { 0.0 });
        true
    }

    fn current_value(&self) -> Option<Value> {
        self.average.values.last().map(|(_, v)| *v)
    }

    fn values(&self) -> &[(u64, Value)] {
        &self.average.values
    }
}

/// Replica-exchange swap acceptance rate, averaged over attempts, per pair.
pub struct REAcceptanceRateAverage {
    replicas: [PeerId; 2],
    average: RunningAverage,
}

impl REAcceptanceRateAverage {
    pub fn new(replica_a: impl Into<PeerId>, replica_b: impl Into<PeerId>) -> Self {
        REAcceptanceRateAverage { replicas: [replica_a.into(), replica_b.into()], average: RunningAverage::new() }
    }

    pub fn pair(&self) -> (&PeerId, &PeerId) {
        (&self.replicas[0], &self.replicas[1])
    }
}

impl LoggedQuantity for REAcceptanceRateAverage {
    fn origins(&self) -> &[PeerId] {
        &self.replicas
    }

    fn name(&self) -> &str {
        "acceptance rate"
    }

    fn variable_name(&self) -> Option<&str> {
        None
    }

    fn stats_fields(&self) -> &[&'static str] {
        &["accepted"]
    }

    fn update(&mut self, step: u64, update: &StatUpdate) -> bool {
        let StatUpdate::Swap(swap) = update else { return false };
        self.average.push(step, if swap.accepted { 1.0 } else { 0.0 });
        true
    }

    fn current_value(&self) -> Option<Value> {
        self.average.values.last().map(|(_, v)| *v)
    }

    fn values(&self) -> &[(u64, Value)] {
        &self.average.values
    }
}

/// Works expended along a pair's swap trajectories: one `(forward,
/// backward)` pair per attempt.
pub struct REWorks {
    replicas: [PeerId; 2],
    values: Vec<(u64, Value)>,
}

/// Heats produced along a pair's swap trajectories, same shape as
/// [`REWorks`].
pub struct REHeats {
    replicas: [PeerId; 2],
    values: Vec<(u64, Value)>,
}

impl REWorks {
    pub fn new(replica_a: impl Into<PeerId>, replica_b: impl Into<PeerId>) -> Self {
        REWorks { replicas: [replica_a.into(), replica_b.into()], values: Vec::new() }
    }

    pub fn pair(&self) -> (&PeerId, &PeerId) {
        (&self.replicas[0], &self.replicas[1])
    }
}

impl REHeats {
    pub fn new(replica_a: impl Into<PeerId>, replica_b: impl Into<PeerId>) -> Self {
        REHeats { replicas: [replica_a.into(), replica_b.into()], values: Vec::new() }
    }

    pub fn pair(&self) -> (&PeerId, &PeerId) {
        (&self.replicas[0], &self.replicas[1])
    }
}

impl LoggedQuantity for REWorks {
    fn origins(&self) -> &[PeerId] {
        &self.replicas
    }

    fn name(&self) -> &str {
        "works"
    }

    fn variable_name(&self) -> Option<&str> {
        None
    }

    fn stats_fields(&self) -> &[&'static str] {
        &["works"]
    }

    fn update(&mut self, step: u64, update: &StatUpdate) -> bool {
        let StatUpdate::Swap(swap) = update else { return false };
        self.values.push((step, Value::Pair(swap.works.0, swap.works.1)));
        true
    }

    fn current_value(&self) -> Option<Value> {
        self.values.last().map(|(_, v)| *v)
    }

    fn values(&self) -> &[(u64, Value)] {
        &self.values
    }
}

impl LoggedQuantity for REHeats {
    fn origins(&self) -> &[PeerId] {
        &self.replicas
    }

    fn name(&self) -> &str {
        "heats"
    }

    fn variable_name(&self) -> Option<&str> {
        None
    }

    fn stats_fields(&self) -> &[&'static str] {
        &["heats"]
    }

    fn update(&mut self, step: u64, update: &StatUpdate) -> bool {
        let StatUpdate::Swap(swap) = update else { return false };
        self.values.push((step, Value::Pair(swap.heats.0, swap.heats.1)));
        true
    }

    fn current_value(&self) -> Option<Value> {
        self.values.last().map(|(_, v)| *v)
    }

    fn values(&self) -> &[(u64, Value)] {
        &self.values
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn running_average_equals_x_after_n_identical_updates() {
        let mut q = MCMCAcceptanceRateAverage::new("replica1", "x");
        let mut stats = NamedMap::default();
        stats.insert("x".to_string(), SamplerStats { accepted: true, stepsize: Some(0.1), extra: Default::default() });
        for step in 1..=10 {
            q.update(step, &StatUpdate::Sampler(&stats));
        }
        assert_eq!(q.current_value(), Some(Value::Scalar(Some(1.0))));
    }

    #[test]
    fn stepsize_tracks_raw_values_not_averaged() {
        let mut q = SamplerStepsize::new("replica1", "x");
        let mut stats = NamedMap::default();
        stats.insert("x".to_string(), SamplerStats { accepted: true, stepsize: Some(0.5), extra: Default::default() });
        q.update(1, &StatUpdate::Sampler(&stats));
        stats.insert("x".to_string(), SamplerStats { accepted: false, stepsize: Some(0.3), extra: Default::default() });
        q.update(2, &StatUpdate::Sampler(&stats));
        assert_eq!(q.current_value(), Some(Value::Scalar(Some(0.3))));
        assert_eq!(q.values().len(), 2);
    }
}
