//! The replica agent: owns a sampler and density, answers master/peer
//! requests, and runs proposers against buffered partner state.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::density::Density;
use crate::error::{Error, Result};
use crate::message::{Parcel, Payload, PeerId};
use crate::proposer::{Proposer, Trajectory};
use crate::sampler::{NamedMap, Sampler, SamplerStats};
use crate::state::State;

/// What the serving loop should do after a dispatched parcel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Continue,
    Terminate,
}

/// A buffered proposal awaiting `AcceptBufferedProposalRequest`.
struct BufferedProposal {
    proposer_name: String,
    trajectory: Trajectory,
}

/// One replica process's state, per spec.md §4.6.
pub struct Replica {
    pub name: PeerId,
    density: Box<dyn Density>,
    sampler: Box<dyn Sampler>,
    proposers: HashMap<String, Box<dyn Proposer>>,

    /// Name of the master currently orchestrating this replica. Set on the
    /// first request received from a master; every later request must
    /// match or the dispatch is a protocol violation.
    current_master: Option<PeerId>,

    buffered_partner_state: Option<State>,
    buffered_partner_energy: Option<f64>,
    buffered_proposal: Option<BufferedProposal>,

    output_dir: PathBuf,
    sample_log: Vec<(u64, State)>,
    energy_trace: Vec<(u64, f64)>,
    sampler_stats_log: Vec<(u64, String, SamplerStats)>,
    step: u64,

    rng: StdRng,
}

impl Replica {
    pub fn new(
        name: impl Into<PeerId>,
        density: impl Density + 'static,
        sampler: impl Sampler + 'static,
        output_dir: PathBuf,
    ) -> Self {
        Replica {
            name: name.into(),
            density: Box::new(density),
            sampler: Box::new(sampler),
            proposers: HashMap::new(),
            current_master: None,
            buffered_partner_state: None,
            buffered_partner_energy: None,
            buffered_proposal: None,
            output_dir,
            sample_log: Vec::new(),
            energy_trace: Vec::new(),
            sampler_stats_log: Vec::new(),
            step: 0,
            rng: StdRng::seed_from_u64(0),
        }
    }

    pub fn seed_rng(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn register_proposer(&mut self, proposer: Box<dyn Proposer>) {
        self.proposers.insert(proposer.name().to_string(), proposer);
    }

    pub fn density(&self) -> &dyn Density {
        self.density.as_ref()
    }

    pub fn current_position(&self) -> &[f64] {
        &self.sampler.current_state().position
    }

    pub fn current_energy(&self) -> f64 {
        self.density.energy(self.current_position())
    }

    /// The external, authoritative sample counter of spec.md §3: unlike
    /// `samples().len()`, this never shrinks when a dump prunes the sample
    /// log, since every append point (`handle_sample_request`,
    /// `handle_accept_buffered_proposal`) bumps it unconditionally.
    pub fn samples_drawn(&self) -> u64 {
        self.step
    }

    /// The in-memory sample log accumulated since the last dump.
    pub fn samples(&self) -> &[(u64, State)] {
        &self.sample_log
    }

    /// The in-memory energy trace accumulated since the last dump.
    pub fn energy_trace(&self) -> &[(u64, f64)] {
        &self.energy_trace
    }

    /// Picks the first proposer name in `names` that this replica owns.
    /// Replaces the original's unreliable set-intersection-last-element
    /// rule with a deterministic, order-respecting one.
    pub fn pick_proposer(&self, names: &[String]) -> Result<&dyn Proposer> {
        for name in names {
            if let Some(p) = self.proposers.get(name) {
                return Ok(p.as_ref());
            }
        }
        Err(Error::ProtocolViolation(format!(
            "replica {} owns none of the requested proposers {:?}",
            self.name, names
        )))
    }

    fn require_master(&mut self, sender: &PeerId) -> Result<()> {
        match &self.current_master {
            Some(m) if m == sender => Ok(()),
            Some(m) => Err(Error::ProtocolViolation(format!(
                "replica {} is owned by master {} but received a request from {}",
                self.name, m, sender
            ))),
            None => {
                self.current_master = Some(sender.clone());
                Ok(())
            }
        }
    }

    /// Routes one incoming parcel to its handler. Mirrors spec.md §4.6's
    /// dispatch table as a `match` over the closed `Payload` set.
    pub fn dispatch(&mut self, parcel: Parcel) -> Result<(DispatchOutcome, Vec<Parcel>)> {
        let Parcel { sender, payload, .. } = parcel;
        match payload {
            Payload::SampleRequest => {
                self.require_master(&sender)?;
                self.handle_sample_request()?;
                Ok((DispatchOutcome::Continue, vec![]))
            }
            Payload::ProposeRequest { partner, params } => {
                self.require_master(&sender)?;
                let out = self.handle_propose_request(&sender, partner, params)?;
                Ok((DispatchOutcome::Continue, out))
            }
            Payload::AcceptBufferedProposalRequest { accept } => {
                self.require_master(&sender)?;
                let out = self.handle_accept_buffered_proposal(&sender, accept)?;
                Ok((DispatchOutcome::Continue, out))
            }
            Payload::SendGetStateAndEnergyRequest { partner } => {
                self.require_master(&sender)?;
                let out = vec![Parcel::new(self.name.clone(), partner, Payload::GetStateAndEnergyRequest)];
                Ok((DispatchOutcome::Continue, out))
            }
            Payload::SendStatsRequest => {
                self.require_master(&sender)?;
                let stats = std::mem::take(&mut self.sampler_stats_log);
                let out = vec![Parcel::new(self.name.clone(), sender, Payload::Stats(stats))];
                Ok((DispatchOutcome::Continue, out))
            }
            Payload::DumpSamplesRequest { s_min, s_max, offset, dump_step } => {
                self.require_master(&sender)?;
                self.handle_dump_samples(s_min, s_max, offset, dump_step)?;
                Ok((DispatchOutcome::Continue, vec![]))
            }
            Payload::DieRequest => Ok((DispatchOutcome::Terminate, vec![])),

            Payload::GetStateAndEnergyRequest => {
                let state = State { position: self.current_position().to_vec(), momentum: None };
                let energy = self.current_energy();
                let out = vec![Parcel::new(
                    self.name.clone(),
                    sender,
                    Payload::StoreStateEnergyRequest { state, energy },
                )];
                Ok((DispatchOutcome::Continue, out))
            }
            Payload::StoreStateEnergyRequest { state, energy } => {
                self.buffered_partner_state = Some(state);
                self.buffered_partner_energy = Some(energy);
                // Ack the master that sent the originating
                // `SendGetStateAndEnergyRequest`: it must see this before
                // issuing a `ProposeRequest` that reads the buffer just
                // filled, since the transport only orders FIFO per
                // (sender, receiver) pair and this message arrived on the
                // peer-to-peer channel, not the master's.
                let out = match &self.current_master {
                    Some(master) => vec![Parcel::new(self.name.clone(), master.clone(), Payload::DoNothingRequest)],
                    None => {
                        return Err(Error::ProtocolViolation(format!(
                            "replica {} buffered partner state with no current master to ack",
                            self.name
                        )))
                    }
                };
                Ok((DispatchOutcome::Continue, out))
            }

            Payload::WorkHeat { .. } | Payload::Stats(_) | Payload::DoNothingRequest => {
                Err(Error::ProtocolViolation(format!(
                    "replica {} cannot receive a {} (that payload only flows replica->master)",
                    self.name,
                    "WorkHeat/Stats/DoNothingRequest"
                )))
            }
        }
    }

    /// Draws exactly one sample, appends exactly one sample+energy record.
    /// The original occasionally double-appended across code paths; this
    /// is the single append point.
    fn handle_sample_request(&mut self) -> Result<()> {
        let state = self.sampler.sample();
        let energy = self.density.energy(&state.position);
        self.step += 1;
        self.sample_log.push((self.step, state));
        self.energy_trace.push((self.step, energy));
        for (name, stats) in self.sampler.last_draw_stats() {
            self.sampler_stats_log.push((self.step, name, stats));
        }
        Ok(())
    }

    fn handle_propose_request(
        &mut self,
        master: &PeerId,
        _partner: PeerId,
        params: crate::proposer::ExchangeParams,
    ) -> Result<Vec<Parcel>> {
        let partner_state = self
            .buffered_partner_state
            .take()
            .ok_or_else(|| Error::ProtocolViolation(format!("replica {} has no buffered partner state", self.name)))?;
        let partner_energy = self
            .buffered_partner_energy
            .take()
            .ok_or_else(|| Error::ProtocolViolation(format!("replica {} has no buffered partner energy", self.name)))?;

        let proposer = self.pick_proposer(&params.proposers)?;
        let trajectory = proposer.propose(self, &partner_state, partner_energy, &params.proposer_params)?;

        if !trajectory.work.is_finite() {
            log::warn!("replica {}: proposer {} produced a non-finite work value", self.name, proposer.name());
            return Err(Error::NumericalFailure("work".into()));
        }

        let name = proposer.name().to_string();
        self.buffered_proposal = Some(BufferedProposal { proposer_name: name, trajectory: trajectory.clone() });

        let out = vec![Parcel::new(
            self.name.clone(),
            master.clone(),
            Payload::WorkHeat { work: trajectory.work, heat: trajectory.heat },
        )];
        Ok(out)
    }

    /// Either way (accept or reject), this is the swap step's single sample
    /// append: the accepted proposal or a duplicate of the unchanged current
    /// state, mirroring `handle_sample_request`'s single-append-point design
    /// so swap steps and sample steps both append exactly one record.
    fn handle_accept_buffered_proposal(&mut self, master: &PeerId, accept: bool) -> Result<Vec<Parcel>> {
        let proposal = self
            .buffered_proposal
            .take()
            .ok_or_else(|| Error::ProtocolViolation(format!("replica {} has no buffered proposal", self.name)))?;
        if accept {
            let mut new_state = proposal.trajectory.final_state().clone();
            new_state.momentum = None;
            self.sampler.set_state(new_state);
        }
        log::debug!(
            "replica {}: {} buffered proposal from {}",
            self.name,
            if accept { "accepted" } else { "discarded" },
            proposal.proposer_name
        );

        self.step += 1;
        let state = State { position: self.current_position().to_vec(), momentum: None };
        let energy = self.current_energy();
        self.sample_log.push((self.step, state));
        self.energy_trace.push((self.step, energy));

        // This request expects a synchronisation ack afterward, since the
        // transport only guarantees FIFO per (sender, receiver) pair and
        // the master must know every replica in the swap has settled
        // before moving the step forward.
        Ok(vec![Parcel::new(self.name.clone(), master.clone(), Payload::DoNothingRequest)])
    }

    /// Persists samples/energies under the filename convention fixed by
    /// spec.md §6: `samples_<replica>_<smin+offset>-<smax+offset>.<ext>` for
    /// the windowed sample dump, `<replica>.<ext>` for the energy trace
    /// (appended to across dumps, not windowed).
    fn handle_dump_samples(&mut self, s_min: u64, s_max: u64, offset: u64, dump_step: u64) -> Result<()> {
        fs::create_dir_all(self.output_dir.join("samples"))?;
        fs::create_dir_all(self.output_dir.join("energies"))?;

        let samples_path = self.output_dir.join("samples").join(format!(
            "samples_{}_{}-{}.json",
            self.name,
            s_min + offset,
            s_max + offset
        ));
        let mut samples_file = File::create(samples_path)?;
        let dump_step = dump_step.max(1);
        for (step, state) in self.sample_log.iter() {
            if *step >= s_min && *step < s_max && (*step - s_min) % dump_step == 0 {
                writeln!(samples_file, "{}", serde_json::to_string(state)?)?;
            }
        }

        let energies_path = self.output_dir.join("energies").join(format!("{}.json", self.name));
        let mut energies_file = fs::OpenOptions::new().create(true).append(true).open(energies_path)?;
        for (step, energy) in self.energy_trace.iter() {
            writeln!(energies_file, "{}", serde_json::to_string(&(step, energy))?)?;
        }

        self.sample_log.retain(|(step, _)| *step >= s_max);
        self.energy_trace.clear();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::densities::Normal;
    use crate::samplers::RandomWalkMetropolis;

    fn make_replica(name: &str) -> Replica {
        let density = Normal::standard();
        let sampler = RandomWalkMetropolis::new(density.clone(), State::new(vec![0.0]), 0.5, 1);
        Replica::new(name, density, sampler, std::env::temp_dir().join("rexfw-test"))
    }

    #[test]
    fn first_request_binds_the_master() {
        let mut replica = make_replica("replica0");
        let (outcome, out) = replica
            .dispatch(Parcel::new("master0", "replica0", Payload::SampleRequest))
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Continue);
        assert!(out.is_empty());
        assert_eq!(replica.current_master, Some("master0".to_string()));
    }

    #[test]
    fn request_from_a_different_master_is_rejected() {
        let mut replica = make_replica("replica0");
        replica.dispatch(Parcel::new("master0", "replica0", Payload::SampleRequest)).unwrap();
        let result = replica.dispatch(Parcel::new("master1", "replica0", Payload::SampleRequest));
        assert!(result.is_err());
    }

    #[test]
    fn die_request_terminates() {
        let mut replica = make_replica("replica0");
        let (outcome, _) = replica.dispatch(Parcel::new("master0", "replica0", Payload::DieRequest)).unwrap();
        assert_eq!(outcome, DispatchOutcome::Terminate);
    }

    #[test]
    fn get_state_and_energy_replies_with_store_request() {
        let mut replica = make_replica("replica1");
        let (_, out) = replica
            .dispatch(Parcel::new("replica0", "replica1", Payload::GetStateAndEnergyRequest))
            .unwrap();
        assert_eq!(out.len(), 1);
        match &out[0].payload {
            Payload::StoreStateEnergyRequest { .. } => {}
            other => panic!("expected StoreStateEnergyRequest, got {:?}", other),
        }
    }

    #[test]
    fn sample_request_appends_exactly_one_record() {
        let mut replica = make_replica("replica0");
        replica.dispatch(Parcel::new("master0", "replica0", Payload::SampleRequest)).unwrap();
        assert_eq!(replica.sample_log.len(), 1);
        assert_eq!(replica.energy_trace.len(), 1);
    }

    /// Drives a full buffer/propose/accept-or-reject round trip and checks
    /// the swap-step branch appends exactly one sample+energy record and
    /// bumps `step`, same as the sample-step branch above. Regression test
    /// for a bug where `AcceptBufferedProposalRequest` never appended at
    /// all, leaving swap participants with zero recorded samples that step.
    fn propose_and_buffer(replica: &mut Replica) {
        use crate::proposer::{ExchangeParams, ProposerParams, REProposerParams, REProposer};

        replica.register_proposer(Box::new(REProposer::new("re")));
        replica
            .dispatch(Parcel::new("master0", replica.name.clone(), Payload::SendGetStateAndEnergyRequest { partner: "replica2".into() }))
            .unwrap();
        replica
            .dispatch(Parcel::new("replica2", replica.name.clone(), Payload::StoreStateEnergyRequest { state: State::new(vec![1.0]), energy: 0.2 }))
            .unwrap();
        let params = ExchangeParams { proposers: vec!["re".into()], proposer_params: ProposerParams::Re(REProposerParams) };
        replica
            .dispatch(Parcel::new("master0", replica.name.clone(), Payload::ProposeRequest { partner: "replica2".into(), params }))
            .unwrap();
    }

    #[test]
    fn accepted_swap_appends_exactly_one_record_and_bumps_step() {
        let mut replica = make_replica("replica1");
        propose_and_buffer(&mut replica);

        let (_, out) = replica
            .dispatch(Parcel::new("master0", "replica1", Payload::AcceptBufferedProposalRequest { accept: true }))
            .unwrap();

        assert_eq!(replica.sample_log.len(), 1);
        assert_eq!(replica.energy_trace.len(), 1);
        assert_eq!(replica.step, 1);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0].payload, Payload::DoNothingRequest));
    }

    #[test]
    fn rejected_swap_still_appends_exactly_one_record_and_bumps_step() {
        let mut replica = make_replica("replica1");
        propose_and_buffer(&mut replica);

        replica
            .dispatch(Parcel::new("master0", "replica1", Payload::AcceptBufferedProposalRequest { accept: false }))
            .unwrap();

        assert_eq!(replica.sample_log.len(), 1);
        assert_eq!(replica.energy_trace.len(), 1);
        assert_eq!(replica.step, 1);
    }

    /// Dumps a window of a known run and checks the written sample file's
    /// line count against the same `s_min <= step < s_max && (step - s_min)
    /// % dump_step == 0` predicate `handle_dump_samples` filters on, rather
    /// than a hand-computed constant. Regression coverage for the dump
    /// windowing corruption the sample-append bug above caused: with
    /// `step` desynced from the master's iteration count, this predicate
    /// would have filtered the wrong steps entirely.
    #[test]
    fn dump_samples_writes_exactly_the_windowed_steps() {
        let dir = std::env::temp_dir().join(format!("rexfw-test-dump-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let density = crate::densities::Normal::standard();
        let sampler = crate::samplers::RandomWalkMetropolis::new(density.clone(), State::new(vec![0.0]), 0.5, 1);
        let mut replica = Replica::new("replica0", density, sampler, dir.clone());

        let n_steps = 20u64;
        for _ in 0..n_steps {
            replica.dispatch(Parcel::new("master0", "replica0", Payload::SampleRequest)).unwrap();
        }
        assert_eq!(replica.step, n_steps);

        let (s_min, s_max, offset, dump_step) = (0u64, 20u64, 0u64, 3u64);
        let expected = replica
            .sample_log
            .iter()
            .filter(|(step, _)| *step >= s_min && *step < s_max && (*step - s_min) % dump_step.max(1) == 0)
            .count();

        replica
            .dispatch(Parcel::new(
                "master0",
                "replica0",
                Payload::DumpSamplesRequest { s_min, s_max, offset, dump_step },
            ))
            .unwrap();

        let samples_path = dir.join("samples").join(format!("samples_replica0_{}-{}.json", s_min + offset, s_max + offset));
        let contents = fs::read_to_string(&samples_path).unwrap();
        let written_lines = contents.lines().count();

        assert_eq!(written_lines, expected);
        assert!(written_lines > 0 && written_lines < n_steps as usize);

        let _ = fs::remove_dir_all(&dir);
    }
}
