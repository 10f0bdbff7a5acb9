//! The state a replica samples and exchanges.

use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

/// A sampled configuration. `momentum` is `None` for plain RE, and present
/// once an MD/RENS proposer has augmented the state for a trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub position: Vec<f64>,
    pub momentum: Option<Vec<f64>>,
}

impl State {
    pub fn new(position: Vec<f64>) -> Self {
        State { position, momentum: None }
    }

    /// Draws fresh standard-normal momentum matching `position`'s shape.
    /// The RE plain proposer never calls this; every MD/HMC proposer does,
    /// once, before building a trajectory.
    pub fn with_fresh_momentum(&self, rng: &mut impl rand::Rng) -> Self {
        let momentum: Vec<f64> =
            (0..self.position.len()).map(|_| StandardNormal.sample(rng)).collect();
        State { position: self.position.clone(), momentum: Some(momentum) }
    }

    pub fn kinetic_energy(&self) -> f64 {
        match &self.momentum {
            Some(p) => 0.5 * p.iter().map(|v| v * v).sum::<f64>(),
            None => 0.0,
        }
    }
}

/// A position/momentum pair mid-integration, used by [`crate::proposer::Propagator`]
/// implementations. Distinct from [`State`] because a propagator always
/// carries momentum, whereas a replica's resting state may not.
#[derive(Debug, Clone)]
pub struct PhaseState {
    pub position: Vec<f64>,
    pub momentum: Vec<f64>,
}

impl From<State> for PhaseState {
    fn from(s: State) -> Self {
        PhaseState {
            position: s.position,
            momentum: s.momentum.unwrap_or_default(),
        }
    }
}

impl From<PhaseState> for State {
    fn from(p: PhaseState) -> Self {
        State { position: p.position, momentum: Some(p.momentum) }
    }
}
