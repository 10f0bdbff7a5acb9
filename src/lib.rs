//! A distributed coordinator for replica exchange (RE) and replica exchange
//! with non-equilibrium switching (RENS) MCMC.
//!
//! A run is one master process and N replica processes, each sampling its
//! own Markov chain and periodically exchanging states with a neighbour
//! under a Metropolis-style acceptance rule. See [`master`], [`replica`],
//! and [`transport`] for the three halves of the protocol.

pub mod config;
pub mod density;
pub mod densities;
pub mod error;
#[cfg(test)]
mod integration_test;
pub mod master;
pub mod message;
pub mod proposer;
pub mod replica;
pub mod sampler;
pub mod samplers;
pub mod serving;
pub mod state;
pub mod statistics;
pub mod swaplist;
pub mod transport;
