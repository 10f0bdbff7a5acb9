//! Runs a local replica-exchange demo entirely in-process: one thread per
//! replica, a master on the main thread, all wired through a
//! `ChannelTransport`. Grounded on the teacher's `examples/linearizable-register.rs`
//! CLI texture (`pico-args` + `env_logger::init_from_env`).

use std::path::PathBuf;
use std::thread;

use rexfw::config::{all_peer_names, default_re_params, replica_names, MASTER_NAME};
use rexfw::densities::Normal;
use rexfw::master::{ExchangeMaster, RunConfig};
use rexfw::proposer::REProposer;
use rexfw::replica::Replica;
use rexfw::samplers::RandomWalkMetropolis;
use rexfw::serving;
use rexfw::state::State;
use rexfw::statistics::quantities::{MCMCAcceptanceRateAverage, REAcceptanceRateAverage, REHeats, REWorks, SamplerStepsize};
use rexfw::statistics::{LoggedQuantity, REStatistics, Statistics};
use rexfw::swaplist::StandardSwapListGenerator;
use rexfw::transport::ChannelTransport;

fn main() -> Result<(), pico_args::Error> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info")); // `RUST_LOG=${LEVEL}` env variable to override

    let mut args = pico_args::Arguments::from_env();
    let n_replicas: usize = args.opt_value_from_str("--replicas")?.unwrap_or(4);
    let n_iterations: u64 = args.opt_value_from_str("--iterations")?.unwrap_or(2000);
    let swap_interval: u64 = args.opt_value_from_str("--swap-interval")?.unwrap_or(5);
    let output_dir: PathBuf = args
        .opt_value_from_str("--output-dir")?
        .unwrap_or_else(|| std::env::temp_dir().join("rexfw-demo"));

    println!(
        "Running a local replica-exchange demo with {} replicas for {} iterations (output under {}).",
        n_replicas,
        n_iterations,
        output_dir.display()
    );

    let names = replica_names(n_replicas);
    let peers = all_peer_names(n_replicas);
    let transport = ChannelTransport::new(&peers);

    // A geometric temperature ladder: replica i samples a normal with
    // standard deviation 1.5^i, widest (hottest) at the highest index.
    let worker_handles: Vec<_> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let sigma = 1.5f64.powi(i as i32);
            let density = Normal::new(0.0, sigma);
            let sampler = RandomWalkMetropolis::new(density.clone(), State::new(vec![0.0]), 0.5 * sigma, i as u64 + 1);
            let mut replica = Replica::new(name.clone(), density, sampler, output_dir.join(name));
            replica.register_proposer(Box::new(REProposer::new("re")));
            let handle = transport.handle(name.clone());
            let replica_name = name.clone();
            thread::spawn(move || {
                if let Err(e) = serving::serve(&mut replica, &handle) {
                    log::error!("replica {} exited with error: {}", replica_name, e);
                }
            })
        })
        .collect();

    let master_handle = transport.handle(MASTER_NAME);
    let swap_params = default_re_params(n_replicas);
    let generator = Box::new(StandardSwapListGenerator::new(names.clone(), swap_params));

    let sampling_elements: Vec<Box<dyn LoggedQuantity>> = names
        .iter()
        .flat_map(|name| {
            [
                Box::new(MCMCAcceptanceRateAverage::new(name.clone(), "x")) as Box<dyn LoggedQuantity>,
                Box::new(SamplerStepsize::new(name.clone(), "x")) as Box<dyn LoggedQuantity>,
            ]
        })
        .collect();
    let sampling_statistics = Statistics::new(sampling_elements, vec!["x".to_string()])
        .with_console_writer()
        .with_file_writer(output_dir.join("sampling_statistics.tsv"));

    let mut acceptance: Vec<Box<dyn LoggedQuantity>> = Vec::new();
    let mut works: Vec<Box<dyn LoggedQuantity>> = Vec::new();
    let mut heats: Vec<Box<dyn LoggedQuantity>> = Vec::new();
    for pair in names.windows(2) {
        acceptance.push(Box::new(REAcceptanceRateAverage::new(pair[0].clone(), pair[1].clone())));
        works.push(Box::new(REWorks::new(pair[0].clone(), pair[1].clone())));
        heats.push(Box::new(REHeats::new(pair[0].clone(), pair[1].clone())));
    }
    let swap_statistics = REStatistics::new(acceptance, works, heats)
        .with_console_writer()
        .with_file_writer(output_dir.join("re_statistics.tsv"))
        .with_works_heats_writer(output_dir.join("swap-artifacts"));

    let mut master = ExchangeMaster::new(MASTER_NAME, names, master_handle, generator, sampling_statistics, swap_statistics);

    let config = RunConfig { n_iterations, swap_interval, ..RunConfig::default() };
    master.run(config).expect("replica exchange run failed");
    master.terminate_replicas().expect("failed to terminate replicas");

    for handle in worker_handles {
        let _ = handle.join();
    }

    println!("Demo run complete; output under {}", output_dir.display());
    Ok(())
}
