//! Swap-list generators: for a given swap step, the list of replica pairs
//! (plus exchange parameters) the master should attempt. Grounded on
//! `rexfw/slgenerators/__init__.py`.

use crate::message::PeerId;
use crate::proposer::ExchangeParams;

/// One pair the master will attempt to swap this step, with the exchange
/// parameters to hand to both replicas.
#[derive(Debug, Clone)]
pub struct SwapDescriptor {
    pub replica_a: PeerId,
    pub replica_b: PeerId,
    pub params: ExchangeParams,
}

/// Produces the swap list for a given step. Implementations are free to be
/// stateful (the standard generator toggles its pairing offset each call);
/// custom generators (e.g. convective RE) plug in via this same trait.
pub trait SwapListGenerator: Send {
    fn generate_swap_list(&mut self, step: u64) -> Vec<SwapDescriptor>;
}

/// The standard alternating nearest-neighbour scheme: `(1,2),(3,4),...` on
/// even invocations, `(2,3),(4,5),...` on odd ones. Two-replica systems
/// always use the `(1,2)` pairing (there is no `(2,3)` to alternate to).
pub struct StandardSwapListGenerator {
    replica_names: Vec<PeerId>,
    param_list: Vec<ExchangeParams>,
    which: usize,
}

impl StandardSwapListGenerator {
    pub fn new(replica_names: Vec<PeerId>, param_list: Vec<ExchangeParams>) -> Self {
        StandardSwapListGenerator { replica_names, param_list, which: 0 }
    }
}

impl SwapListGenerator for StandardSwapListGenerator {
    fn generate_swap_list(&mut self, _step: u64) -> Vec<SwapDescriptor> {
        if self.replica_names.len() == 2 {
            self.which = 0;
        }

        let names_a: Vec<&PeerId> = self.replica_names.iter().skip(self.which).step_by(2).collect();
        let names_b: Vec<&PeerId> = self.replica_names.iter().skip(self.which + 1).step_by(2).collect();
        let params: Vec<&ExchangeParams> = self.param_list.iter().skip(self.which).step_by(2).collect();

        let swap_list = names_a
            .into_iter()
            .zip(names_b)
            .zip(params)
            .map(|((a, b), p)| SwapDescriptor { replica_a: a.clone(), replica_b: b.clone(), params: p.clone() })
            .collect();

        self.which = 1 - self.which;
        swap_list
    }
}
