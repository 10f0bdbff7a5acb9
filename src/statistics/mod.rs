//! Running, step-indexed, per-origin statistics. Grounded on
//! `rexfw/statistics/__init__.py`'s `Statistics`/`REStatistics`.

pub mod averages;
pub mod quantities;
pub mod writers;

use std::collections::HashSet;

pub use quantities::{LoggedQuantity, StatUpdate, SwapStats, Value};

use crate::message::PeerId;
use crate::sampler::{NamedMap, SamplerStats};
use crate::error::Result;

/// Tracks MCMC sampling statistics (acceptance rates, step sizes) fed by
/// per-replica sampler-stats batches. Optional console/file writers flush
/// the current snapshot on `write_last`.
pub struct Statistics {
    elements: Vec<Box<dyn LoggedQuantity>>,
    variables: Vec<String>,
    console: Option<writers::ConsoleMcmcWriter>,
    file: Option<writers::FileMcmcWriter>,
}

impl Statistics {
    pub fn new(elements: Vec<Box<dyn LoggedQuantity>>, variables: Vec<String>) -> Self {
        Statistics { elements, variables, console: None, file: None }
    }

    pub fn with_console_writer(mut self) -> Self {
        self.console = Some(writers::ConsoleMcmcWriter);
        self
    }

    pub fn with_file_writer(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.file = Some(writers::FileMcmcWriter::new(path));
        self
    }

    /// Applies one replica's batch of per-variable sampler stats to every
    /// quantity scoped to that replica (step sizes, acceptance-rate
    /// averages alike; each quantity decides independently whether the
    /// update's variable matches it).
    pub fn update(&mut self, origin: &PeerId, step: u64, stats: &NamedMap<SamplerStats>) {
        let update = StatUpdate::Sampler(stats);
        for q in self.elements.iter_mut() {
            if q.origins() == [origin.clone()].as_slice() {
                q.update(step, &update);
            }
        }
    }

    pub fn write_last(&self, step: u64) -> Result<()> {
        if let Some(console) = &self.console {
            console.write(step, &self.variables, &self.elements);
        }
        if let Some(file) = &self.file {
            file.write(step, &self.variables, &self.elements)?;
        }
        Ok(())
    }

    pub fn elements(&self) -> &[Box<dyn LoggedQuantity>] {
        &self.elements
    }
}

/// Tracks replica-exchange swap statistics (acceptance rate per pair, plus
/// the full work/heat history each pair accumulates). Grounded on
/// `REStatistics` in the same original module.
pub struct REStatistics {
    acceptance: Vec<Box<dyn LoggedQuantity>>,
    works: Vec<Box<dyn LoggedQuantity>>,
    heats: Vec<Box<dyn LoggedQuantity>>,
    console: Option<writers::ConsoleReWriter>,
    file: Option<writers::FileReWriter>,
    works_heats: Option<writers::WorksHeatsWriter>,
}

impl REStatistics {
    pub fn new(acceptance: Vec<Box<dyn LoggedQuantity>>, works: Vec<Box<dyn LoggedQuantity>>, heats: Vec<Box<dyn LoggedQuantity>>) -> Self {
        REStatistics { acceptance, works, heats, console: None, file: None, works_heats: None }
    }

    pub fn with_console_writer(mut self) -> Self {
        self.console = Some(writers::ConsoleReWriter);
        self
    }

    pub fn with_file_writer(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.file = Some(writers::FileReWriter::new(path));
        self
    }

    pub fn with_works_heats_writer(mut self, out_dir: impl Into<std::path::PathBuf>) -> Self {
        self.works_heats = Some(writers::WorksHeatsWriter::new(out_dir));
        self
    }

    /// Applies one pair's swap outcome to the acceptance average and the
    /// works/heats history scoped to `[replica_a, replica_b]`.
    pub fn update(&mut self, replica_a: &PeerId, replica_b: &PeerId, step: u64, swap: &SwapStats) {
        let origin_set: HashSet<&PeerId> = [replica_a, replica_b].into_iter().collect();
        let update = StatUpdate::Swap(swap);
        for q in self.acceptance.iter_mut().chain(self.works.iter_mut()).chain(self.heats.iter_mut()) {
            let q_origins: HashSet<&PeerId> = q.origins().iter().collect();
            if q_origins == origin_set {
                q.update(step, &update);
            }
        }
    }

    pub fn write_last(&self, step: u64) -> Result<()> {
        if let Some(console) = &self.console {
            console.write(&self.acceptance);
        }
        if let Some(file) = &self.file {
            file.write(step, &self.acceptance)?;
        }
        if let Some(works_heats) = &self.works_heats {
            let works: Vec<&dyn LoggedQuantity> = self.works.iter().map(|q| q.as_ref()).collect();
            let heats: Vec<&dyn LoggedQuantity> = self.heats.iter().map(|q| q.as_ref()).collect();
            works_heats.write_works(&works)?;
            works_heats.write_heats(&heats)?;
        }
        Ok(())
    }

    pub fn acceptance_elements(&self) -> &[Box<dyn LoggedQuantity>] {
        &self.acceptance
    }

    pub fn works_elements(&self) -> &[Box<dyn LoggedQuantity>] {
        &self.works
    }

    pub fn heats_elements(&self) -> &[Box<dyn LoggedQuantity>] {
        &self.heats
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use quantities::{MCMCAcceptanceRateAverage, REAcceptanceRateAverage};

    #[test]
    fn statistics_update_only_touches_matching_origin() {
        let elements: Vec<Box<dyn LoggedQuantity>> = vec![
            Box::new(MCMCAcceptanceRateAverage::new("replica1", "x")),
            Box::new(MCMCAcceptanceRateAverage::new("replica2", "x")),
        ];
        let mut stats = Statistics::new(elements, vec!["x".to_string()]);
        let mut sampler_stats = NamedMap::default();
        sampler_stats.insert("x".to_string(), SamplerStats { accepted: true, stepsize: Some(0.1), extra: Default::default() });
        stats.update(&"replica1".to_string(), 1, &sampler_stats);

        assert_eq!(stats.elements()[0].current_value(), Some(Value::Scalar(Some(1.0))));
        assert_eq!(stats.elements()[1].current_value(), None);
    }

    #[test]
    fn re_statistics_update_matches_by_origin_set() {
        let acceptance: Vec<Box<dyn LoggedQuantity>> = vec![Box::new(REAcceptanceRateAverage::new("replica1", "replica2"))];
        let mut re_stats = REStatistics::new(acceptance, vec![], vec![]);
        let swap = SwapStats { accepted: true, works: (0.1, 0.2), heats: (0.0, 0.0) };
        re_stats.update(&"replica1".to_string(), &"replica2".to_string(), 5, &swap);
        assert_eq!(re_stats.acceptance_elements()[0].current_value(), Some(Value::Scalar(Some(1.0))));
    }
}
