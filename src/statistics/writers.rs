//! Pluggable statistics writers. Grounded on
//! `rexfw/statistics/writers/__init__.py`; the three required kinds from
//! spec.md §4.9 (console MCMC, file MCMC, file RE pairwise) plus the
//! per-pair works/heats artifact writer.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use crate::error::Result;
use crate::message::PeerId;

use super::quantities::{LoggedQuantity, Value};

/// Sorts quantities whose single origin is `replica<N>` by `N` ascending,
/// matching every writer's `_sort_quantities` in the original.
fn replica_index(name: &str) -> u32 {
    name.trim_start_matches("replica").parse().unwrap_or(0)
}

fn sort_by_single_origin<'a>(mut quantities: Vec<&'a dyn LoggedQuantity>) -> Vec<&'a dyn LoggedQuantity> {
    quantities.sort_by_key(|q| replica_index(&q.origins()[0]));
    quantities
}

fn sort_by_lowest_origin<'a>(mut quantities: Vec<&'a dyn LoggedQuantity>) -> Vec<&'a dyn LoggedQuantity> {
    quantities.sort_by_key(|q| q.origins().iter().map(|o| replica_index(o)).min().unwrap_or(0));
    quantities
}

fn format_scalar(name: &str, value: Option<Value>) -> String {
    match (name, value) {
        (_, None) => "n/a".to_string(),
        ("stepsize", Some(v)) => match v.as_scalar() {
            Some(v) => format!("{:.2e}", v),
            None => "n/a".to_string(),
        },
        (_, Some(v)) => match v.as_scalar() {
            Some(v) => format!("{:.3}", v),
            None => "n/a".to_string(),
        },
    }
}

/// Writes one console block per status step: a banner, then one line per
/// variable with the configured quantities, replicas sorted ascending.
pub struct ConsoleMcmcWriter;

impl ConsoleMcmcWriter {
    pub fn write(&self, step: u64, variables: &[String], quantities: &[Box<dyn LoggedQuantity>]) {
        println!("######### MC step: {} #########", step);
        for variable in variables {
            for name in ["acceptance rate", "stepsize"] {
                let matching: Vec<&dyn LoggedQuantity> = quantities
                    .iter()
                    .map(|q| q.as_ref())
                    .filter(|q| q.name() == name && q.variable_name() == Some(variable.as_str()))
                    .collect();
                if matching.is_empty() {
                    continue;
                }
                let sorted = sort_by_single_origin(matching);
                print!("{:<10} {:>16}: ", variable, name);
                for q in sorted {
                    print!("{} ", format_scalar(name, q.current_value()));
                }
                println!();
            }
        }
    }
}

/// Writes one line `RE acceptance rate: v12 v23 ...` per status step,
/// pairs sorted by their lowest replica index.
pub struct ConsoleReWriter;

impl ConsoleReWriter {
    pub fn write(&self, quantities: &[Box<dyn LoggedQuantity>]) {
        let matching: Vec<&dyn LoggedQuantity> =
            quantities.iter().map(|q| q.as_ref()).filter(|q| q.name() == "acceptance rate" && q.variable_name().is_none()).collect();
        let sorted = sort_by_lowest_origin(matching);
        print!("{:<10} {:>16}: ", "RE", "acceptance rate");
        for q in sorted {
            print!("{} ", format_scalar("acceptance rate", q.current_value()));
        }
        println!();
    }
}

/// TSV: one row per status step, `step\tvalue\t...`, replicas sorted
/// identically to the console writer.
pub struct FileMcmcWriter {
    path: PathBuf,
}

impl FileMcmcWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileMcmcWriter { path: path.into() }
    }

    pub fn write(&self, step: u64, variables: &[String], quantities: &[Box<dyn LoggedQuantity>]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        write!(file, "{}", step)?;
        for variable in variables {
            for name in ["acceptance rate", "stepsize"] {
                let matching: Vec<&dyn LoggedQuantity> = quantities
                    .iter()
                    .map(|q| q.as_ref())
                    .filter(|q| q.name() == name && q.variable_name() == Some(variable.as_str()))
                    .collect();
                for q in sort_by_single_origin(matching) {
                    write!(file, "\t{}", format_scalar(name, q.current_value()))?;
                }
            }
        }
        writeln!(file)?;
        Ok(())
    }
}

/// TSV of replica-exchange acceptance rates, pairs sorted by lowest
/// replica index.
pub struct FileReWriter {
    path: PathBuf,
}

impl FileReWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileReWriter { path: path.into() }
    }

    pub fn write(&self, step: u64, quantities: &[Box<dyn LoggedQuantity>]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let matching: Vec<&dyn LoggedQuantity> =
            quantities.iter().map(|q| q.as_ref()).filter(|q| q.name() == "acceptance rate" && q.variable_name().is_none()).collect();
        write!(file, "{}", step)?;
        for q in sort_by_lowest_origin(matching) {
            write!(file, "\t{}", format_scalar("acceptance rate", q.current_value()))?;
        }
        writeln!(file)?;
        Ok(())
    }
}

/// Persists each pair's full work/heat history to a pair-indexed artifact,
/// `works_{a}-{b}.json` / `heats_{a}-{b}.json` under `out_dir`.
pub struct WorksHeatsWriter {
    out_dir: PathBuf,
}

impl WorksHeatsWriter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        WorksHeatsWriter { out_dir: out_dir.into() }
    }

    pub fn write_works(&self, works: &[&dyn LoggedQuantity]) -> Result<()> {
        let dir = self.out_dir.join("works");
        fs::create_dir_all(&dir)?;
        for w in works {
            self.write_pair_series(&dir, "works", &w.origins()[0], &w.origins()[1], w.values())?;
        }
        Ok(())
    }

    pub fn write_heats(&self, heats: &[&dyn LoggedQuantity]) -> Result<()> {
        let dir = self.out_dir.join("heats");
        fs::create_dir_all(&dir)?;
        for h in heats {
            self.write_pair_series(&dir, "heats", &h.origins()[0], &h.origins()[1], h.values())?;
        }
        Ok(())
    }

    fn write_pair_series(&self, dir: &std::path::Path, kind: &str, a: &PeerId, b: &PeerId, values: &[(u64, Value)]) -> Result<()> {
        let path = dir.join(format!("{}_{}-{}.json", kind, a, b));
        let mut file = fs::File::create(path)?;
        for (step, value) in values {
            let (v0, v1) = match value {
                Value::Pair(x, y) => (*x, *y),
                Value::Scalar(_) => continue,
            };
            writeln!(file, "{}", serde_json::to_string(&(step, v0, v1))?)?;
        }
        Ok(())
    }
}
