//! Point-to-point, name-addressed message passing between master and
//! replicas, per spec.md §4.1. `ChannelTransport` is an in-process
//! reference implementation built on `std::sync::mpsc`; the teacher's
//! original runs over raw UDP sockets (`actor/spawn.rs`), but nothing in
//! this crate needs cross-process delivery, so an in-process channel
//! fulfils the same FIFO-per-pair contract without the socket plumbing.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::error::{Error, Result};
use crate::message::{Parcel, PeerId};

/// `recv`'s source filter: a specific named peer, or the wildcard that
/// accepts the next parcel from anyone.
#[derive(Debug, Clone)]
pub enum Source {
    Named(PeerId),
    All,
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        if s == "all" {
            Source::All
        } else {
            Source::Named(s.to_string())
        }
    }
}

/// The contract every peer process talks to: blocking, name-addressed
/// send/receive with FIFO ordering per (sender, receiver) pair. No ordering
/// is guaranteed across distinct pairs (spec.md §4.1, §5).
pub trait Transport: Send {
    fn send(&self, parcel: Parcel) -> Result<()>;
    fn recv(&self, me: &PeerId, source: Source) -> Result<Parcel>;
}

/// One named peer's view of a [`ChannelTransport`]: knows its own name so
/// `recv(Source::All)` can select only parcels addressed to it.
pub struct TransportHandle {
    me: PeerId,
    transport: std::sync::Arc<ChannelTransport>,
}

impl TransportHandle {
    pub fn send(&self, parcel: Parcel) -> Result<()> {
        self.transport.send(parcel)
    }

    pub fn recv(&self, source: impl Into<Source>) -> Result<Parcel> {
        self.transport.recv(&self.me, source.into())
    }

    pub fn name(&self) -> &PeerId {
        &self.me
    }
}

/// An in-process transport: every ordered (sender, receiver) pair of
/// registered peers gets its own `mpsc::Sender`/`Receiver`, which gives
/// exact FIFO-per-pair delivery and nothing stronger, matching spec.md
/// §4.1's ordering guarantee.
pub struct ChannelTransport {
    senders: HashMap<(PeerId, PeerId), Sender<Parcel>>,
    receivers: parking_lot::Mutex<HashMap<PeerId, Vec<(PeerId, Receiver<Parcel>)>>>,
}

impl ChannelTransport {
    /// Builds a fully-connected transport among `peers`: every ordered pair
    /// `(a, b)` with `a != b` gets a channel.
    pub fn new(peers: &[PeerId]) -> std::sync::Arc<Self> {
        let mut senders = HashMap::new();
        let mut receivers: HashMap<PeerId, Vec<(PeerId, Receiver<Parcel>)>> = HashMap::new();
        for a in peers {
            for b in peers {
                if a == b {
                    continue;
                }
                let (tx, rx) = mpsc::channel();
                senders.insert((a.clone(), b.clone()), tx);
                receivers.entry(b.clone()).or_default().push((a.clone(), rx));
            }
        }
        std::sync::Arc::new(ChannelTransport { senders, receivers: parking_lot::Mutex::new(receivers) })
    }

    /// Returns the per-peer handle `name` should use to send/receive.
    pub fn handle(self: &std::sync::Arc<Self>, name: impl Into<PeerId>) -> TransportHandle {
        TransportHandle { me: name.into(), transport: self.clone() }
    }

    fn send(&self, parcel: Parcel) -> Result<()> {
        let key = (parcel.sender.clone(), parcel.receiver.clone());
        log::debug!("transport: {} -> {} [{}]", parcel.sender, parcel.receiver, parcel.payload.kind());
        self.senders
            .get(&key)
            .ok_or_else(|| Error::Routing(parcel.receiver.clone()))?
            .send(parcel)
            .map_err(|e| Error::Transport(e.0.receiver))
    }

    fn recv(&self, me: &PeerId, source: Source) -> Result<Parcel> {
        let receivers = self.receivers.lock();
        let pairs = receivers.get(me).ok_or_else(|| Error::Routing(me.clone()))?;
        match source {
            Source::Named(from) => {
                let (_, rx) = pairs
                    .iter()
                    .find(|(sender, _)| sender == &from)
                    .ok_or_else(|| Error::Routing(from.clone()))?;
                rx.recv().map_err(|_| Error::Transport(from))
            }
            Source::All => {
                // Blocking select over every inbound channel: poll each in
                // round-robin with a short timeout rather than spinning, since
                // `mpsc` has no native multi-receiver select.
                loop {
                    for (from, rx) in pairs.iter() {
                        match rx.try_recv() {
                            Ok(parcel) => return Ok(parcel),
                            Err(mpsc::TryRecvError::Empty) => continue,
                            Err(mpsc::TryRecvError::Disconnected) => {
                                return Err(Error::Transport(from.clone()))
                            }
                        }
                    }
                    std::thread::sleep(std::time::Duration::from_micros(200));
                }
            }
        }
    }
}
