//! Integrators the MD/RENS proposer family drives through an
//! [`InterpolatingDensity`]. The crate ships simple reference
//! implementations so the family is runnable end-to-end in its own
//! tests; production use is expected to supply its own.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::state::PhaseState;

use super::InterpolatingDensity;

/// Advances a phase-space point `n_steps` intermediate steps through an
/// interpolating density, returning the final point and the heat
/// accumulated along the way (zero for purely deterministic integrators).
pub trait Propagator {
    fn propagate(
        &self,
        density: &mut InterpolatingDensity<'_>,
        start: PhaseState,
        n_steps: u32,
        rng: &mut dyn rand::RngCore,
    ) -> (PhaseState, f64);
}

/// Velocity-Verlet (leapfrog) integration of the interpolated gradient.
/// Deterministic and symplectic: no heat is generated.
pub struct LeapfrogPropagator {
    pub timestep: f64,
}

impl Propagator for LeapfrogPropagator {
    fn propagate(
        &self,
        density: &mut InterpolatingDensity<'_>,
        start: PhaseState,
        n_steps: u32,
        _rng: &mut dyn rand::RngCore,
    ) -> (PhaseState, f64) {
        let mut state = start;
        for t in 0..n_steps {
            state = leapfrog_step(density, state, t, self.timestep);
        }
        (state, 0.0)
    }
}

fn leapfrog_step(density: &mut InterpolatingDensity<'_>, mut state: PhaseState, t: u32, dt: f64) -> PhaseState {
    let grad = density.gradient(&state.position, t).unwrap_or_else(|| vec![0.0; state.position.len()]);
    for (p, g) in state.momentum.iter_mut().zip(grad.iter()) {
        *p += 0.5 * dt * g;
    }
    for (x, p) in state.position.iter_mut().zip(state.momentum.iter()) {
        *x += dt * p;
    }
    let grad = density.gradient(&state.position, t + 1).unwrap_or_else(|| vec![0.0; state.position.len()]);
    for (p, g) in state.momentum.iter_mut().zip(grad.iter()) {
        *p += 0.5 * dt * g;
    }
    state
}

/// BAOAB-style Langevin integration: a leapfrog half-step bracketing an
/// Ornstein-Uhlenbeck friction/noise update on the momentum. Heat
/// accumulates from the kinetic-energy change the friction/noise step
/// causes, matching the non-equilibrium-switching heat definition.
pub struct LangevinPropagator {
    pub timestep: f64,
    pub gamma: f64,
}

impl Propagator for LangevinPropagator {
    fn propagate(
        &self,
        density: &mut InterpolatingDensity<'_>,
        start: PhaseState,
        n_steps: u32,
        rng: &mut dyn rand::RngCore,
    ) -> (PhaseState, f64) {
        let mut state = start;
        let mut heat = 0.0;
        let c = (-self.gamma * self.timestep).exp();
        let noise_scale = (1.0 - c * c).sqrt();
        for t in 0..n_steps {
            state = leapfrog_step(density, state, t, self.timestep);
            let ke_before: f64 = 0.5 * state.momentum.iter().map(|p| p * p).sum::<f64>();
            for p in state.momentum.iter_mut() {
                let noise: f64 = StandardNormal.sample(rng);
                *p = c * *p + noise_scale * noise;
            }
            let ke_after: f64 = 0.5 * state.momentum.iter().map(|p| p * p).sum::<f64>();
            heat += ke_after - ke_before;
        }
        (state, heat)
    }
}

/// Microcanonical MD with periodic Andersen collisions: momentum is fully
/// resampled from the Maxwell-Boltzmann distribution every
/// `collision_interval` steps. Heat accumulates at each collision as the
/// kinetic-energy change the resampling causes.
pub struct AndersenPropagator {
    pub timestep: f64,
    pub collision_interval: u32,
}

impl Propagator for AndersenPropagator {
    fn propagate(
        &self,
        density: &mut InterpolatingDensity<'_>,
        start: PhaseState,
        n_steps: u32,
        rng: &mut dyn rand::RngCore,
    ) -> (PhaseState, f64) {
        let mut state = start;
        let mut heat = 0.0;
        let interval = self.collision_interval.max(1);
        for t in 0..n_steps {
            state = leapfrog_step(density, state, t, self.timestep);
            if (t + 1) % interval == 0 {
                let ke_before: f64 = 0.5 * state.momentum.iter().map(|p| p * p).sum::<f64>();
                for p in state.momentum.iter_mut() {
                    *p = rng.sample(StandardNormal);
                }
                let ke_after: f64 = 0.5 * state.momentum.iter().map(|p| p * p).sum::<f64>();
                heat += ke_after - ke_before;
            }
        }
        (state, heat)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::densities::Normal;
    use rand::SeedableRng;
    use std::collections::HashMap;

    #[test]
    fn leapfrog_generates_no_heat() {
        let mut density = Normal::standard();
        let schedule = HashMap::new();
        let mut interp = InterpolatingDensity::new(&mut density, &schedule, 4);
        let propagator = LeapfrogPropagator { timestep: 0.05 };
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let start = PhaseState { position: vec![0.5], momentum: vec![0.1] };
        let (_, heat) = propagator.propagate(&mut interp, start, 4, &mut rng);
        assert_eq!(heat, 0.0);
    }
}
