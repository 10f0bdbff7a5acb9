//! The single-chain sampler interface each replica drives between swaps.

use std::collections::HashMap;

/// A `HashMap` keyed by variable name, hashed with the same `ahash`
/// `RandomState` the teacher's `util::HashableHashMap` is built on.
pub type NamedMap<V> = HashMap<String, V, ahash::RandomState>;

/// Per-draw diagnostics a sampler reports back. `accepted`/`stepsize` are
/// the two fields every sampler kind carries; `extra` holds anything
/// kind-specific (e.g. an HMC trajectory length) without forcing every
/// sampler to agree on a wider fixed schema.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SamplerStats {
    pub accepted: bool,
    pub stepsize: Option<f64>,
    pub extra: HashMap<String, f64>,
}

/// A single-chain MCMC kernel a replica advances between exchange steps.
pub trait Sampler: Send {
    fn sample(&mut self) -> crate::state::State;
    fn last_draw_stats(&self) -> NamedMap<SamplerStats>;
    fn current_state(&self) -> &crate::state::State;

    /// Overwrites the chain's current position, used after an accepted
    /// exchange swaps in a partner's state.
    fn set_state(&mut self, state: crate::state::State);
}
