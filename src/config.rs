//! Process launch helpers: turning a replica count into the master/replica
//! naming convention the rest of the crate assumes, and assembling the
//! default swap-parameter list every replica runs with unless overridden.
//!
//! Grounded on the `'replica%d' % i` naming visible throughout
//! `rexfw/remasters/__init__.py` and `rexfw/replicas/__init__.py`; there is
//! no single original file to anchor this on since the original assembles
//! these names inline in launch scripts outside `original_source/`'s
//! retrieved index.

use crate::message::PeerId;
use crate::proposer::{ExchangeParams, ProposerParams, REProposerParams};

/// The fixed master name every communicator implementation in this crate
/// assumes (spec.md §6).
pub const MASTER_NAME: &str = "master0";

/// `replica1, replica2, ..., replicaN`, one-indexed to match the original.
pub fn replica_names(n_replicas: usize) -> Vec<PeerId> {
    (1..=n_replicas).map(|i| format!("replica{}", i)).collect()
}

/// Process-launch rank-to-name mapping, spec.md §6: rank 0 is the master,
/// rank `k >= 1` is `replica{k}`.
pub fn names_for_rank(rank: usize) -> PeerId {
    if rank == 0 {
        MASTER_NAME.to_string()
    } else {
        format!("replica{}", rank)
    }
}

/// `[master0, replica1, ..., replicaN]`, the full set of peer names a
/// transport must be able to route between.
pub fn all_peer_names(n_replicas: usize) -> Vec<PeerId> {
    let mut names = vec![MASTER_NAME.to_string()];
    names.extend(replica_names(n_replicas));
    names
}

/// Plain RE exchange parameters, one per replica (a swap list only ever
/// consumes half of these at a time, but the generator is built assuming
/// one slot per replica, matching the original's `swap_params` argument).
pub fn default_re_params(n_replicas: usize) -> Vec<ExchangeParams> {
    (0..n_replicas)
        .map(|_| ExchangeParams { proposers: vec!["re".to_string()], proposer_params: ProposerParams::Re(REProposerParams) })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn replica_names_are_one_indexed() {
        assert_eq!(replica_names(3), vec!["replica1", "replica2", "replica3"]);
    }

    #[test]
    fn all_peer_names_includes_master_first() {
        let names = all_peer_names(2);
        assert_eq!(names, vec!["master0", "replica1", "replica2"]);
    }

    #[test]
    fn names_for_rank_maps_rank_zero_to_master() {
        assert_eq!(names_for_rank(0), "master0");
        assert_eq!(names_for_rank(1), "replica1");
        assert_eq!(names_for_rank(3), "replica3");
    }
}
