//! Wire-level message types exchanged between master and replicas.

use serde::{Deserialize, Serialize};

use crate::proposer::ExchangeParams;
use crate::sampler::SamplerStats;
use crate::state::State;

/// A logical peer name: `"master"`, `"replica3"`, etc. Names are looked up
/// against a process's registered routes; there is no dynamic discovery.
pub type PeerId = String;

/// An envelope carrying a payload from one named peer to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parcel {
    pub sender: PeerId,
    pub receiver: PeerId,
    pub payload: Payload,
}

impl Parcel {
    pub fn new(sender: impl Into<PeerId>, receiver: impl Into<PeerId>, payload: Payload) -> Self {
        Parcel { sender: sender.into(), receiver: receiver.into(), payload }
    }
}

/// The closed set of payloads this protocol knows how to route. Extending
/// the protocol means adding a variant here and a `match` arm in
/// [`crate::replica::Replica::dispatch`] or [`crate::master::ExchangeMaster`],
/// never mutating a runtime dispatch table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Payload {
    // --- master -> replica ---
    /// Draw one sample; append to the local sample/energy log.
    SampleRequest,
    /// Run the named proposer(s) against `partner`'s buffered state/energy.
    ProposeRequest { partner: PeerId, params: ExchangeParams },
    /// Commit (`accept = true`) or discard the buffered proposal.
    AcceptBufferedProposalRequest { accept: bool },
    /// Ask `partner` (via a `GetStateAndEnergyRequest`) for its state+energy.
    SendGetStateAndEnergyRequest { partner: PeerId },
    /// Flush accumulated sampler stats back to the master.
    SendStatsRequest,
    /// Persist samples in `[s_min, s_max)`, subsampled by `dump_step`, with
    /// `offset` added to output file indices; then persist and truncate the
    /// energy trace.
    DumpSamplesRequest { s_min: u64, s_max: u64, offset: u64, dump_step: u64 },
    /// Terminate the serving loop.
    DieRequest,

    // --- replica -> replica ---
    /// Return state+energy to `sender`.
    GetStateAndEnergyRequest,
    /// Buffer the peer's state+energy as the swap partner's.
    StoreStateEnergyRequest { state: State, energy: f64 },

    // --- replica -> master ---
    /// Work and heat accumulated by a completed proposal.
    WorkHeat { work: f64, heat: f64 },
    /// Per-variable sampler stats for steps taken since the last flush:
    /// `(step, variable name, stats)`.
    Stats(Vec<(u64, String, SamplerStats)>),
    /// Synchronisation ack with no payload of its own. Used whenever the
    /// transport's FIFO-per-pair guarantee needs a receipt from a third
    /// party before the protocol can advance.
    DoNothingRequest,
}

impl Payload {
    /// A short tag for logging, distinct from the `Debug` dump of fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::SampleRequest => "SampleRequest",
            Payload::ProposeRequest { .. } => "ProposeRequest",
            Payload::AcceptBufferedProposalRequest { .. } => "AcceptBufferedProposalRequest",
            Payload::SendGetStateAndEnergyRequest { .. } => "SendGetStateAndEnergyRequest",
            Payload::SendStatsRequest => "SendStatsRequest",
            Payload::DumpSamplesRequest { .. } => "DumpSamplesRequest",
            Payload::DieRequest => "DieRequest",
            Payload::GetStateAndEnergyRequest => "GetStateAndEnergyRequest",
            Payload::StoreStateEnergyRequest { .. } => "StoreStateEnergyRequest",
            Payload::WorkHeat { .. } => "WorkHeat",
            Payload::Stats(_) => "Stats",
            Payload::DoNothingRequest => "DoNothingRequest",
        }
    }
}
