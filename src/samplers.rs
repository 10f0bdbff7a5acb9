//! Reference single-chain samplers satisfying [`crate::sampler::Sampler`].
//! Grounded on `rexfw/samplers/rwmc.py` and `samplers/hmc.py`, which are
//! thin compatibility wrappers around an external MCMC library; the kernels
//! themselves are out of scope for the coordinator (see spec.md §1), so
//! these exist only to make this crate's own tests and demo runnable.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::density::Density;
use crate::sampler::{NamedMap, Sampler, SamplerStats};
use crate::state::State;

/// Random-walk Metropolis-Hastings: proposes `x' = x + N(0, stepsize^2)`,
/// accepts with probability `min(1, exp(log_prob(x') - log_prob(x)))`.
pub struct RandomWalkMetropolis<D: Density> {
    density: D,
    state: State,
    stepsize: f64,
    rng: rand::rngs::StdRng,
    last_accepted: bool,
    variable_name: String,
}

impl<D: Density> RandomWalkMetropolis<D> {
    pub fn new(density: D, initial_state: State, stepsize: f64, seed: u64) -> Self {
        RandomWalkMetropolis {
            density,
            state: initial_state,
            stepsize,
            rng: rand::SeedableRng::seed_from_u64(seed),
            last_accepted: false,
            variable_name: "x".to_string(),
        }
    }
}

impl<D: Density> Sampler for RandomWalkMetropolis<D> {
    fn sample(&mut self) -> State {
        let current_lp = self.density.log_prob(&self.state.position);
        let proposal: Vec<f64> = self
            .state
            .position
            .iter()
            .map(|x| x + self.stepsize * self.rng.sample::<f64, _>(StandardNormal))
            .collect();
        let proposal_lp = self.density.log_prob(&proposal);

        let log_ratio = proposal_lp - current_lp;
        self.last_accepted = log_ratio >= 0.0 || self.rng.gen::<f64>().ln() < log_ratio;
        if self.last_accepted {
            self.state = State::new(proposal);
        }
        self.state.clone()
    }

    fn last_draw_stats(&self) -> NamedMap<SamplerStats> {
        let mut stats = NamedMap::default();
        stats.insert(
            self.variable_name.clone(),
            SamplerStats { accepted: self.last_accepted, stepsize: Some(self.stepsize), extra: Default::default() },
        );
        stats
    }

    fn current_state(&self) -> &State {
        &self.state
    }

    fn set_state(&mut self, state: State) {
        self.state = state;
    }
}

/// Hamiltonian Monte Carlo: `nsteps` leapfrog steps of length `timestep`
/// under fresh Gaussian momentum, accepted/rejected by the Hamiltonian
/// difference. `adapt_timestep`, if set, nudges the step size by 5% per
/// draw toward more/less acceptance, matching the original's adaptive mode.
pub struct Hmc<D: Density> {
    density: D,
    state: State,
    timestep: f64,
    nsteps: u32,
    adapt_timestep: bool,
    rng: rand::rngs::StdRng,
    last_accepted: bool,
    variable_name: String,
}

impl<D: Density> Hmc<D> {
    pub fn new(density: D, initial_state: State, timestep: f64, nsteps: u32, adapt_timestep: bool, seed: u64) -> Self {
        Hmc {
            density,
            state: initial_state,
            timestep,
            nsteps,
            adapt_timestep,
            rng: rand::SeedableRng::seed_from_u64(seed),
            last_accepted: false,
            variable_name: "x".to_string(),
        }
    }

    fn hamiltonian(&self, position: &[f64], momentum: &[f64]) -> f64 {
        self.density.energy(position) + 0.5 * momentum.iter().map(|p| p * p).sum::<f64>()
    }
}

impl<D: Density> Sampler for Hmc<D> {
    fn sample(&mut self) -> State {
        let dim = self.state.position.len();
        let momentum0: Vec<f64> = (0..dim).map(|_| self.rng.sample::<f64, _>(StandardNormal)).collect();
        let h0 = self.hamiltonian(&self.state.position, &momentum0);

        let mut position = self.state.position.clone();
        let mut momentum = momentum0;
        let grad = |p: &[f64]| self.density.gradient(p).unwrap_or_else(|| vec![0.0; p.len()]);
        let mut g = grad(&position);
        for _ in 0..self.nsteps {
            for (m, gi) in momentum.iter_mut().zip(g.iter()) {
                *m += 0.5 * self.timestep * gi;
            }
            for (x, m) in position.iter_mut().zip(momentum.iter()) {
                *x += self.timestep * m;
            }
            g = grad(&position);
            for (m, gi) in momentum.iter_mut().zip(g.iter()) {
                *m += 0.5 * self.timestep * gi;
            }
        }
        let h1 = self.hamiltonian(&position, &momentum);

        let log_ratio = h0 - h1;
        self.last_accepted = log_ratio >= 0.0 || self.rng.gen::<f64>().ln() < log_ratio;
        if self.last_accepted {
            self.state = State::new(position);
        }
        if self.adapt_timestep {
            self.timestep *= if self.last_accepted { 1.05 } else { 0.95 };
        }
        self.state.clone()
    }

    fn last_draw_stats(&self) -> NamedMap<SamplerStats> {
        let mut stats = NamedMap::default();
        stats.insert(
            self.variable_name.clone(),
            SamplerStats { accepted: self.last_accepted, stepsize: Some(self.timestep), extra: Default::default() },
        );
        stats
    }

    fn current_state(&self) -> &State {
        &self.state
    }

    fn set_state(&mut self, state: State) {
        self.state = state;
    }
}
