//! Timestamp measurement campaigns.
//!
//! Sweeps one parameter axis (padding size, loss rate or RTT), runs a
//! sender/receiver timestamp exchange per value in a fresh two-endpoint
//! network, samples eight `(index, value)` pairs from each timing channel
//! and writes a per-axis text report.
//!
//! - **Axis registry** — fixed value sequences ([`axis`])
//! - **Trial runner** — environment lifecycle and remote execution ([`trial`], [`testbed`], [`netns`])
//! - **Parser / sampler / report** — [`parser`], [`sampler`], [`report`]
//! - **Orchestrator** — [`campaign`]

pub mod axis;
pub mod builder;
pub mod campaign;
pub mod config;
pub mod error;
pub mod netns;
pub mod parser;
pub mod prompt;
pub mod report;
pub mod sampler;
pub mod testbed;
pub mod trial;

pub mod test_util;

pub use error::{CampaignError, Result};
