//! The exchange master: drives the N replicas through sampling steps and,
//! at `swap_interval`, a full swap phase. Grounded on
//! `rexfw/remasters/__init__.py`'s `ExchangeMaster`.

use rand::Rng;

use crate::error::Result;
use crate::message::{Parcel, Payload, PeerId};
use crate::proposer::ExchangeParams;
use crate::statistics::{REStatistics, Statistics, SwapStats};
use crate::swaplist::{SwapDescriptor, SwapListGenerator};
use crate::transport::TransportHandle;

/// Fixed cadence knobs for [`ExchangeMaster::run`], mirroring the
/// original's `run(...)` keyword arguments one for one.
#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    pub n_iterations: u64,
    pub swap_interval: u64,
    pub status_interval: u64,
    pub dump_interval: u64,
    pub offset: u64,
    pub dump_step: u64,
    pub statistics_update_interval: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            n_iterations: 1000,
            swap_interval: 5,
            status_interval: 100,
            dump_interval: 250,
            offset: 0,
            dump_step: 5,
            statistics_update_interval: 100,
        }
    }
}

/// One swap attempt's outcome, forwarded by `propose`/`work` round-trips
/// before the master decides to commit or discard it.
struct ExchangeResult {
    accepted: bool,
    works: (f64, f64),
    heats: (f64, f64),
}

/// Coordinates RE(NS) swaps across a fixed set of replicas. Owns no
/// sampling state itself; every replica runs its own chain and only
/// exchanges buffered state/energy and work/heat summaries with this
/// master.
pub struct ExchangeMaster {
    name: PeerId,
    replica_names: Vec<PeerId>,
    transport: TransportHandle,
    swap_list_generator: Box<dyn SwapListGenerator>,
    sampling_statistics: Statistics,
    swap_statistics: REStatistics,
    step: u64,
}

impl ExchangeMaster {
    pub fn new(
        name: impl Into<PeerId>,
        replica_names: Vec<PeerId>,
        transport: TransportHandle,
        swap_list_generator: Box<dyn SwapListGenerator>,
        sampling_statistics: Statistics,
        swap_statistics: REStatistics,
    ) -> Self {
        ExchangeMaster {
            name: name.into(),
            replica_names,
            transport,
            swap_list_generator,
            sampling_statistics,
            swap_statistics,
            step: 0,
        }
    }

    /// Runs `config.n_iterations` sampling steps, performing a swap phase
    /// every `swap_interval` steps and writing/updating statistics and
    /// sample dumps at their respective intervals.
    pub fn run(&mut self, config: RunConfig) -> Result<()> {
        for step in 0..config.n_iterations {
            if step % config.swap_interval == 0 && step > 0 {
                let swap_list = self.swap_list_generator.generate_swap_list(step);
                let results = self.perform_exchanges(&swap_list)?;
                self.update_swap_stats(&swap_list, &results, step);
                let no_ex_replicas = self.replicas_not_in(&swap_list);
                self.send_sample_requests(&no_ex_replicas)?;
            } else {
                let all = self.replica_names.clone();
                self.send_sample_requests(&all)?;
            }

            if step % config.dump_interval == 0 && step > 0 {
                self.send_dump_samples_request(step - config.dump_interval, step, config.offset, config.dump_step)?;
            }

            if step % config.status_interval == 0 && step > 0 {
                self.write_statistics(step)?;
            }

            if step % config.statistics_update_interval == 0 && step > 0 {
                self.update_sampling_statistics()?;
            }

            self.step += 1;
        }
        Ok(())
    }

    pub fn sampling_statistics(&self) -> &Statistics {
        &self.sampling_statistics
    }

    pub fn swap_statistics(&self) -> &REStatistics {
        &self.swap_statistics
    }

    /// Sends `DieRequest` to every replica, ending their serving loops.
    pub fn terminate_replicas(&self) -> Result<()> {
        for r in &self.replica_names {
            self.transport.send(Parcel::new(self.name.clone(), r.clone(), Payload::DieRequest))?;
        }
        Ok(())
    }

    fn send_sample_requests(&self, replicas: &[PeerId]) -> Result<()> {
        for r in replicas {
            self.transport.send(Parcel::new(self.name.clone(), r.clone(), Payload::SampleRequest))?;
        }
        Ok(())
    }

    fn send_dump_samples_request(&self, s_min: u64, s_max: u64, offset: u64, dump_step: u64) -> Result<()> {
        for r in &self.replica_names {
            self.transport.send(Parcel::new(
                self.name.clone(),
                r.clone(),
                Payload::DumpSamplesRequest { s_min, s_max, offset, dump_step },
            ))?;
        }
        Ok(())
    }

    fn update_sampling_statistics(&mut self) -> Result<()> {
        let replicas = self.replica_names.clone();
        for r in &replicas {
            self.transport.send(Parcel::new(self.name.clone(), r.clone(), Payload::SendStatsRequest))?;
        }
        for r in &replicas {
            let parcel = self.transport.recv(r.as_str())?;
            let Payload::Stats(entries) = parcel.payload else {
                return Err(crate::error::Error::ProtocolViolation(format!(
                    "master expected Stats from {} but got something else",
                    r
                )));
            };
            for (step, variable, stats) in entries {
                let mut batch = crate::sampler::NamedMap::default();
                batch.insert(variable, stats);
                self.sampling_statistics.update(r, step, &batch);
            }
        }
        Ok(())
    }

    fn write_statistics(&self, step: u64) -> Result<()> {
        self.sampling_statistics.write_last(step)?;
        self.swap_statistics.write_last(step)?;
        Ok(())
    }

    fn update_swap_stats(&mut self, swap_list: &[SwapDescriptor], results: &[ExchangeResult], step: u64) {
        for (d, r) in swap_list.iter().zip(results) {
            let swap = SwapStats { accepted: r.accepted, works: r.works, heats: r.heats };
            self.swap_statistics.update(&d.replica_a, &d.replica_b, step, &swap);
        }
    }

    fn replicas_not_in(&self, swap_list: &[SwapDescriptor]) -> Vec<PeerId> {
        self.replica_names
            .iter()
            .filter(|name| !swap_list.iter().any(|d| &d.replica_a == *name || &d.replica_b == *name))
            .cloned()
            .collect()
    }

    /// One full swap phase over every pair in `swap_list`: buffer-fetch,
    /// propose (both directions), decide, commit/discard. Returns one
    /// result per pair, in `swap_list` order.
    fn perform_exchanges(&self, swap_list: &[SwapDescriptor]) -> Result<Vec<ExchangeResult>> {
        self.trigger_proposal_calculation(swap_list)?;
        let (works, heats) = self.receive_works(swap_list)?;
        let accepted = self.calculate_acceptance(&works);
        self.trigger_exchanges(swap_list, &accepted)?;

        Ok((0..swap_list.len())
            .map(|i| ExchangeResult { accepted: accepted[i], works: works[i], heats: heats[i] })
            .collect())
    }

    /// Has each side of every pair fetch the other's buffered state and
    /// energy, waits for both to ack the buffering, then issues both
    /// directions' `ProposeRequest`s. The ack wait is load-bearing: the
    /// `StoreStateEnergyRequest` that fills a replica's buffer arrives on
    /// the peer-to-peer channel, a different (sender, receiver) pair than
    /// the master's own channel to that replica, so FIFO-per-pair alone
    /// does not order it ahead of a `ProposeRequest` sent right after.
    fn trigger_proposal_calculation(&self, swap_list: &[SwapDescriptor]) -> Result<()> {
        for d in swap_list {
            self.send_get_state_and_energy_request(&d.replica_a, &d.replica_b)?;
            self.send_get_state_and_energy_request(&d.replica_b, &d.replica_a)?;
            self.recv_do_nothing(&d.replica_a)?;
            self.recv_do_nothing(&d.replica_b)?;

            let mut forward = d.params.clone();
            self.send_propose_request(&d.replica_a, &d.replica_b, forward.clone())?;
            forward.proposer_params.reverse();
            self.send_propose_request(&d.replica_b, &d.replica_a, forward)?;
        }
        Ok(())
    }

    /// Orders `replica2` to push its state+energy at `replica1`. `replica2`
    /// replies directly to `replica1`, not to the master; the master waits
    /// for `replica1`'s `DoNothingRequest` ack (see `trigger_proposal_calculation`)
    /// before relying on the buffer it fills.
    fn send_get_state_and_energy_request(&self, replica1: &PeerId, replica2: &PeerId) -> Result<()> {
        self.transport.send(Parcel::new(
            self.name.clone(),
            replica2.clone(),
            Payload::SendGetStateAndEnergyRequest { partner: replica1.clone() },
        ))
    }

    fn send_propose_request(&self, replica1: &PeerId, replica2: &PeerId, params: ExchangeParams) -> Result<()> {
        self.transport.send(Parcel::new(
            self.name.clone(),
            replica1.clone(),
            Payload::ProposeRequest { partner: replica2.clone(), params },
        ))
    }

    fn receive_works(&self, swap_list: &[SwapDescriptor]) -> Result<(Vec<(f64, f64)>, Vec<(f64, f64)>)> {
        let mut works = Vec::with_capacity(swap_list.len());
        let mut heats = Vec::with_capacity(swap_list.len());
        for d in swap_list {
            let (w1, h1) = self.recv_work_heat(&d.replica_a)?;
            let (w2, h2) = self.recv_work_heat(&d.replica_b)?;
            works.push((w1, w2));
            heats.push((h1, h2));
        }
        Ok((works, heats))
    }

    fn recv_work_heat(&self, replica: &PeerId) -> Result<(f64, f64)> {
        let parcel = self.transport.recv(replica.as_str())?;
        match parcel.payload {
            Payload::WorkHeat { work, heat } => Ok((work, heat)),
            other => Err(crate::error::Error::ProtocolViolation(format!(
                "master expected WorkHeat from {} but got {}",
                replica,
                other.kind()
            ))),
        }
    }

    /// `exp(-(work_fwd + work_bwd)) > uniform(0, 1)`, the standard RE(NS)
    /// Metropolis criterion, per swap.
    fn calculate_acceptance(&self, works: &[(f64, f64)]) -> Vec<bool> {
        let mut rng = rand::thread_rng();
        works
            .iter()
            .map(|(w1, w2)| {
                let total = w1 + w2;
                if !total.is_finite() {
                    return false;
                }
                (-total).exp() > rng.gen::<f64>()
            })
            .collect()
    }

    fn trigger_exchanges(&self, swap_list: &[SwapDescriptor], accepted: &[bool]) -> Result<()> {
        for (d, &accept) in swap_list.iter().zip(accepted) {
            self.send_accept_or_reject(&d.replica_a, accept)?;
            self.send_accept_or_reject(&d.replica_b, accept)?;
            self.recv_do_nothing(&d.replica_a)?;
            self.recv_do_nothing(&d.replica_b)?;
        }
        Ok(())
    }

    fn send_accept_or_reject(&self, dest: &PeerId, accept: bool) -> Result<()> {
        self.transport.send(Parcel::new(self.name.clone(), dest.clone(), Payload::AcceptBufferedProposalRequest { accept }))
    }

    fn recv_do_nothing(&self, replica: &PeerId) -> Result<()> {
        let parcel = self.transport.recv(replica.as_str())?;
        match parcel.payload {
            Payload::DoNothingRequest => Ok(()),
            other => Err(crate::error::Error::ProtocolViolation(format!(
                "master expected DoNothingRequest from {} but got {}",
                replica,
                other.kind()
            ))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::proposer::{ProposerParams, REProposerParams};
    use crate::statistics::quantities::{MCMCAcceptanceRateAverage, REAcceptanceRateAverage};

    fn params() -> ExchangeParams {
        ExchangeParams { proposers: vec!["re".into()], proposer_params: ProposerParams::Re(REProposerParams) }
    }

    fn master_stub_with(transport: &std::sync::Arc<crate::transport::ChannelTransport>) -> ExchangeMaster {
        use crate::swaplist::StandardSwapListGenerator;

        let handle = transport.handle("master0");
        let names = vec!["replica1".to_string(), "replica2".to_string()];
        let gen = Box::new(StandardSwapListGenerator::new(names.clone(), vec![params(), params()]));
        let sampling = Statistics::new(
            vec![
                Box::new(MCMCAcceptanceRateAverage::new("replica1", "x")),
                Box::new(MCMCAcceptanceRateAverage::new("replica2", "x")),
            ],
            vec!["x".to_string()],
        );
        let swap = REStatistics::new(vec![Box::new(REAcceptanceRateAverage::new("replica1", "replica2"))], vec![], vec![]);
        ExchangeMaster::new("master0", names, handle, gen, sampling, swap)
    }

    fn test_peers() -> Vec<PeerId> {
        vec!["master0".into(), "replica1".into(), "replica2".into()]
    }

    #[test]
    fn calculate_acceptance_rejects_non_finite_work() {
        let transport = crate::transport::ChannelTransport::new(&test_peers());
        let master = master_stub_with(&transport);
        let accepted = master.calculate_acceptance(&[(f64::NAN, 0.0), (-10.0, -10.0)]);
        assert_eq!(accepted, vec![false, true]);
    }

    #[test]
    fn replicas_not_in_swap_list_excludes_swapping_pairs() {
        let transport = crate::transport::ChannelTransport::new(&test_peers());
        let master = master_stub_with(&transport);
        let swap_list = vec![SwapDescriptor { replica_a: "replica1".into(), replica_b: "replica2".into(), params: params() }];
        assert!(master.replicas_not_in(&swap_list).is_empty());
    }

    #[test]
    fn terminate_replicas_sends_die_request_to_each() {
        let transport = crate::transport::ChannelTransport::new(&test_peers());
        let master = master_stub_with(&transport);
        let r1 = transport.handle("replica1");
        master.terminate_replicas().unwrap();
        let parcel = r1.recv("master0").unwrap();
        assert!(matches!(parcel.payload, Payload::DieRequest));
    }

    /// Regression test for the `StateRequested`-phase sync bug: a master
    /// that fires both `ProposeRequest`s right after both
    /// `SendGetStateAndEnergyRequest`s, without waiting for the
    /// `DoNothingRequest` ack, would let `ProposeRequest` reach a replica
    /// whose partner-state buffer isn't filled yet. Simulates replica1
    /// acking slowly and checks replica2 never receives its
    /// `ProposeRequest` before replica1's ack was actually sent, since
    /// `trigger_proposal_calculation` waits on `replica_a`'s ack before
    /// `replica_b`'s.
    #[test]
    fn trigger_proposal_calculation_waits_for_both_acks_before_proposing() {
        let transport = crate::transport::ChannelTransport::new(&test_peers());
        let master = master_stub_with(&transport);

        let r1 = transport.handle("replica1");
        let r2 = transport.handle("replica2");
        let delay = std::time::Duration::from_millis(60);
        let start = std::time::Instant::now();

        let t1 = std::thread::spawn(move || {
            let req = r1.recv("master0").unwrap();
            assert!(matches!(req.payload, Payload::SendGetStateAndEnergyRequest { .. }));
            std::thread::sleep(delay);
            r1.send(Parcel::new("replica1", "master0", Payload::DoNothingRequest)).unwrap();
            let propose = r1.recv("master0").unwrap();
            assert!(matches!(propose.payload, Payload::ProposeRequest { .. }));
            start.elapsed()
        });

        let t2 = std::thread::spawn(move || {
            let req = r2.recv("master0").unwrap();
            assert!(matches!(req.payload, Payload::SendGetStateAndEnergyRequest { .. }));
            r2.send(Parcel::new("replica2", "master0", Payload::DoNothingRequest)).unwrap();
            let propose = r2.recv("master0").unwrap();
            assert!(matches!(propose.payload, Payload::ProposeRequest { .. }));
            start.elapsed()
        });

        let swap_list = vec![SwapDescriptor { replica_a: "replica1".into(), replica_b: "replica2".into(), params: params() }];
        master.trigger_proposal_calculation(&swap_list).unwrap();

        let elapsed_r1 = t1.join().unwrap();
        let elapsed_r2 = t2.join().unwrap();

        assert!(elapsed_r1 >= delay);
        assert!(
            elapsed_r2 >= delay,
            "replica2 received ProposeRequest before replica1's delayed ack arrived; the sync wait was skipped"
        );
    }
}
