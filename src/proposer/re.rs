//! The plain Replica Exchange proposer: no trajectory, no momentum, no heat.

use crate::error::Result;
use crate::replica::Replica;
use crate::state::State;

use super::{Proposer, ProposerParams, Trajectory};

/// `work = E_local(partner_state) - partner_energy`. The classical
/// Metropolis-coupled RE acceptance expression; heat is always zero since
/// there is no non-equilibrium switching involved.
#[derive(Debug)]
pub struct REProposer {
    name: String,
}

impl REProposer {
    pub fn new(name: impl Into<String>) -> Self {
        REProposer { name: name.into() }
    }
}

impl Proposer for REProposer {
    fn name(&self) -> &str {
        &self.name
    }

    fn propose(
        &self,
        local: &Replica,
        partner_state: &State,
        partner_energy: f64,
        _params: &ProposerParams,
    ) -> Result<Trajectory> {
        let local_energy = local.density().energy(&partner_state.position);
        let work = local_energy - partner_energy;
        Ok(Trajectory {
            states: vec![partner_state.clone(), partner_state.clone()],
            work,
            heat: 0.0,
        })
    }
}
