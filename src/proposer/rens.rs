//! MD/RENS proposer family: non-equilibrium trajectories driven by a
//! [`Propagator`] through an [`InterpolatingDensity`].

use rand::SeedableRng;

use crate::error::{Error, Result};
use crate::replica::Replica;
use crate::state::State;

use super::{hamiltonian, AndersenPropagator, LangevinPropagator, LeapfrogPropagator, Proposer, ProposerParams, Trajectory};
use super::interpolation::InterpolatingDensity;

/// Shared trajectory-building logic for the MD/RENS family: augments the
/// partner's state with fresh momentum, drives it through `propagator`
/// over the interpolated density, and computes
/// `work = H_local_final - H_remote_initial - heat`.
fn run_trajectory(
    local: &Replica,
    partner_state: &State,
    partner_energy: f64,
    rens_params: &super::RensProposerParams,
    propagator: &dyn super::Propagator,
) -> Result<Trajectory> {
    let mut density = local.density().clone_box();
    let augmented = partner_state.with_fresh_momentum(&mut rand::rngs::StdRng::from_entropy());
    let h_remote_initial = partner_energy + augmented.kinetic_energy();

    let mut interp = InterpolatingDensity::new(density.as_mut(), &rens_params.schedule, rens_params.n_steps);
    let mut rng = rand::rngs::StdRng::from_entropy();
    let (final_phase, heat) =
        propagator.propagate(&mut interp, augmented.clone().into(), rens_params.n_steps, &mut rng);

    let final_state: State = final_phase.into();
    let h_local_final = hamiltonian(local.density(), &final_state);
    let work = h_local_final - h_remote_initial - heat;

    if !work.is_finite() {
        return Err(Error::NumericalFailure("work".into()));
    }

    Ok(Trajectory { states: vec![augmented, final_state], work, heat })
}

fn rens_params_of(params: &ProposerParams) -> &super::RensProposerParams {
    match params {
        ProposerParams::Lmdrens(p) => &p.rens,
        ProposerParams::Amdrens(p) => &p.rens,
        ProposerParams::Re(_) | ProposerParams::HmcStepRens(_) => {
            panic!("rens_params_of called with an incompatible ProposerParams variant")
        }
    }
}

/// Microcanonical MD: deterministic symplectic integration, no heat.
#[derive(Debug)]
pub struct MicrocanonicalMDProposer {
    name: String,
}

impl MicrocanonicalMDProposer {
    pub fn new(name: impl Into<String>) -> Self {
        MicrocanonicalMDProposer { name: name.into() }
    }
}

impl Proposer for MicrocanonicalMDProposer {
    fn name(&self) -> &str {
        &self.name
    }

    fn propose(&self, local: &Replica, partner_state: &State, partner_energy: f64, params: &ProposerParams) -> Result<Trajectory> {
        let rens = rens_params_of(params);
        let propagator = LeapfrogPropagator { timestep: rens.timestep };
        run_trajectory(local, partner_state, partner_energy, rens, &propagator)
    }
}

/// Langevin MD (LMDRENS): BAOAB integration; heat from friction/noise.
#[derive(Debug)]
pub struct LMDRENSProposer {
    name: String,
}

impl LMDRENSProposer {
    pub fn new(name: impl Into<String>) -> Self {
        LMDRENSProposer { name: name.into() }
    }
}

impl Proposer for LMDRENSProposer {
    fn name(&self) -> &str {
        &self.name
    }

    fn propose(&self, local: &Replica, partner_state: &State, partner_energy: f64, params: &ProposerParams) -> Result<Trajectory> {
        let ProposerParams::Lmdrens(p) = params else {
            return Err(Error::ProtocolViolation(format!("proposer {} needs LMDRENSProposerParams", self.name)));
        };
        let propagator = LangevinPropagator { timestep: p.rens.timestep, gamma: p.gamma };
        run_trajectory(local, partner_state, partner_energy, &p.rens, &propagator)
    }
}

/// Andersen-thermostatted MD (AMDRENS): periodic momentum resampling;
/// heat from each collision.
#[derive(Debug)]
pub struct AMDRENSProposer {
    name: String,
}

impl AMDRENSProposer {
    pub fn new(name: impl Into<String>) -> Self {
        AMDRENSProposer { name: name.into() }
    }
}

impl Proposer for AMDRENSProposer {
    fn name(&self) -> &str {
        &self.name
    }

    fn propose(&self, local: &Replica, partner_state: &State, partner_energy: f64, params: &ProposerParams) -> Result<Trajectory> {
        let ProposerParams::Amdrens(p) = params else {
            return Err(Error::ProtocolViolation(format!("proposer {} needs AMDRENSProposerParams", self.name)));
        };
        let propagator = AndersenPropagator { timestep: p.rens.timestep, collision_interval: p.collision_interval };
        run_trajectory(local, partner_state, partner_energy, &p.rens, &propagator)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::densities::Normal;
    use crate::samplers::RandomWalkMetropolis;
    use std::collections::HashMap;

    fn re_replica() -> Replica {
        let density = Normal::standard();
        let sampler = RandomWalkMetropolis::new(density.clone(), State::new(vec![0.0]), 0.5, 1);
        Replica::new("replica0", density, sampler, std::env::temp_dir().join("rexfw-rens-test"))
    }

    fn re_params(n_steps: u32) -> super::super::RensProposerParams {
        let mut schedule = HashMap::new();
        schedule.insert("sigma".to_string(), (1.0, 1.0));
        super::super::RensProposerParams { schedule, n_steps, timestep: 0.01 }
    }

    #[test]
    fn microcanonical_proposal_yields_finite_work_and_zero_heat() {
        let replica = re_replica();
        let rens = re_params(4);
        let params = ProposerParams::Lmdrens(super::super::LMDRENSProposerParams { rens: rens.clone(), gamma: 0.0 });
        let proposer = MicrocanonicalMDProposer::new("microcanonical");
        let trajectory = proposer.propose(&replica, &State::new(vec![0.2]), 0.1, &params).unwrap();
        assert!(trajectory.work.is_finite());
        assert_eq!(trajectory.heat, 0.0);
    }
}
