//! Proposer interface and the RE / MD-RENS family of implementations.

mod interpolation;
mod propagator;
mod re;
mod rens;
mod steprens;

pub use interpolation::InterpolatingDensity;
pub use propagator::{AndersenPropagator, LangevinPropagator, LeapfrogPropagator, Propagator};
pub use re::REProposer;
pub use rens::{AMDRENSProposer, LMDRENSProposer, MicrocanonicalMDProposer};
pub use steprens::HMCStepRENSProposer;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::density::Density;
use crate::error::Result;
use crate::replica::Replica;
use crate::state::State;

/// A proposed trajectory from a partner's state to a candidate local state,
/// together with the work and heat accumulated along the way. `states` is
/// the sequence of intermediate states the original tracks for diagnostics;
/// for the plain RE proposer it is always `[partner_state, partner_state]`.
#[derive(Debug, Clone)]
pub struct Trajectory {
    pub states: Vec<State>,
    pub work: f64,
    pub heat: f64,
}

impl Trajectory {
    pub fn final_state(&self) -> &State {
        self.states.last().expect("trajectory is never empty")
    }
}

/// Parameters this exchange's proposers need, resolved per-proposer-name by
/// the master from the originating request. `proposers` is the ordered
/// list of proposer names acceptable for this exchange; a replica picks the
/// first one it owns (see [`crate::replica::Replica::pick_proposer`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeParams {
    pub proposers: Vec<String>,
    pub proposer_params: ProposerParams,
}

/// Per-proposer parameters. A closed enum rather than a trait object so it
/// can cross the wire via `serde`; every variant implements `reverse`,
/// which every RENS run needs to turn a forward half-trajectory into a
/// backward one for the partner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProposerParams {
    Re(REProposerParams),
    Lmdrens(LMDRENSProposerParams),
    Amdrens(AMDRENSProposerParams),
    HmcStepRens(HMCStepRENSProposerParams),
}

impl ProposerParams {
    /// Toggles the direction of this exchange's schedule in place. Used so
    /// the same parameters drive a forward trajectory on one replica and
    /// the time-reversed trajectory on its partner.
    pub fn reverse(&mut self) {
        match self {
            ProposerParams::Re(_) => {}
            ProposerParams::Lmdrens(p) => p.rens.reverse(),
            ProposerParams::Amdrens(p) => p.rens.reverse(),
            ProposerParams::HmcStepRens(p) => p.rens.reverse(),
        }
    }

    pub fn n_steps(&self) -> u32 {
        match self {
            ProposerParams::Re(_) => 0,
            ProposerParams::Lmdrens(p) => p.rens.n_steps,
            ProposerParams::Amdrens(p) => p.rens.n_steps,
            ProposerParams::HmcStepRens(p) => p.rens.n_steps,
        }
    }

    pub fn schedule(&self) -> &std::collections::HashMap<String, (f64, f64)> {
        static EMPTY: std::sync::OnceLock<std::collections::HashMap<String, (f64, f64)>> =
            std::sync::OnceLock::new();
        match self {
            ProposerParams::Re(_) => EMPTY.get_or_init(Default::default),
            ProposerParams::Lmdrens(p) => &p.rens.schedule,
            ProposerParams::Amdrens(p) => &p.rens.schedule,
            ProposerParams::HmcStepRens(p) => &p.rens.schedule,
        }
    }
}

/// The plain RE proposer carries no parameters beyond its name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct REProposerParams;

/// Parameters shared by every MD/RENS proposer: a parameter schedule
/// (`name -> (value at t=0, value at t=1)`) interpolated linearly over
/// `n_steps` intermediate steps, and the integration timestep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RensProposerParams {
    pub schedule: std::collections::HashMap<String, (f64, f64)>,
    pub n_steps: u32,
    pub timestep: f64,
}

impl RensProposerParams {
    /// Swaps each schedule endpoint, turning a forward trajectory's
    /// parameters into the backward trajectory's parameters.
    pub fn reverse(&mut self) {
        for (_, (a, b)) in self.schedule.iter_mut() {
            std::mem::swap(a, b);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LMDRENSProposerParams {
    pub rens: RensProposerParams,
    /// Langevin friction coefficient (gamma).
    pub gamma: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AMDRENSProposerParams {
    pub rens: RensProposerParams,
    /// Number of microcanonical MD steps between Andersen collisions.
    pub collision_interval: u32,
}

/// Step-wise HMC-RENS parameters. `hmc_traj_length` is the number of
/// integrator sub-steps per HMC move; `n_hmc_iterations` is the number of
/// HMC moves performed per intermediate step. These two are easy to
/// transpose (the original implementation conflated them); keep them
/// distinct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HMCStepRENSProposerParams {
    pub rens: RensProposerParams,
    pub hmc_traj_length: u32,
    pub n_hmc_iterations: u32,
}

/// Produces a swap trajectory from a partner's buffered state/energy.
/// `Send` so a `Replica` (and its registered proposers) can move onto its
/// own thread, the way every replica in a run does.
pub trait Proposer: fmt::Debug + Send {
    fn name(&self) -> &str;

    fn propose(
        &self,
        local: &Replica,
        partner_state: &State,
        partner_energy: f64,
        params: &ProposerParams,
    ) -> Result<Trajectory>;
}

pub(crate) fn hamiltonian(density: &dyn Density, state: &State) -> f64 {
    density.energy(&state.position) + state.kinetic_energy()
}
