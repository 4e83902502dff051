#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # mpfleet
//!
//! Converge a declared fleet of multipass virtual machines.
//!
//! The binary loads a fleet file, observes instance states (from a file or
//! by asking multipass), and runs one reconciliation pass through
//! [`mpfleet_reconciler`] with [`mpfleet_multipass`] as the executor.

pub mod cli;
pub mod commands;
pub mod config;
pub mod fleet_file;
pub mod output;

pub use mpfleet_multipass;
pub use mpfleet_reconciler;
