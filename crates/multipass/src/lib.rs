#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # mpfleet-multipass
//!
//! multipass bridge for mpfleet - run lifecycle operations and observe
//! instance states through the `multipass` CLI.
//!
//! ## Features
//!
//! - [`MultipassExecutor`] implements the reconciler's executor boundary
//! - Per-call timeouts with the child killed on expiry
//! - Discovery of observed states via `multipass list --format json`
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mpfleet_multipass::{MultipassConfig, MultipassExecutor, MultipassInventory};
//!
//! let config = MultipassConfig::from_env();
//! let observed = MultipassInventory::new(MultipassClient::with_config(config.clone()))
//!     .observe(&fleet)
//!     .await?;
//! let executor = Arc::new(MultipassExecutor::with_config(config));
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod inventory;

pub use client::MultipassClient;
pub use config::MultipassConfig;
pub use error::{Error, Result};
pub use executor::{MultipassExecutor, operation_args};
pub use inventory::{
    ListOutput, ListedInstance, MultipassInventory, observed_state_from_platform, parse_list,
    snapshot_for,
};
