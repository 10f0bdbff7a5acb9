//! The per-replica receive/dispatch loop. Grounded on
//! `rexfw/slaves/__init__.py`'s `Slave.listen`.

use crate::error::Result;
use crate::replica::{DispatchOutcome, Replica};
use crate::transport::{Source, TransportHandle};

/// Blocks on `transport.recv(Source::All)`, dispatches each parcel to
/// `replica`, forwards any parcels the dispatch produced, and returns once
/// a `DieRequest` is dispatched.
///
/// Errors from `dispatch` are logged and treated as fatal: a protocol
/// violation or numerical failure leaves the replica in a state the
/// master can no longer safely drive.
pub fn serve(replica: &mut Replica, transport: &TransportHandle) -> Result<()> {
    loop {
        let parcel = transport.recv(Source::All)?;
        let (outcome, out) = replica.dispatch(parcel)?;
        for reply in out {
            transport.send(reply)?;
        }
        if outcome == DispatchOutcome::Terminate {
            log::info!("replica {}: received DieRequest, exiting serve loop", replica.name);
            return Ok(());
        }
    }
}
