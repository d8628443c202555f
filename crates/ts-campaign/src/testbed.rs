//! Seams between the trial runner and the network environment it drives.
//!
//! A [`Provisioner`] hands out [`Environment`] guards; dropping the guard
//! tears the environment down. Commands run on an [`Endpoint`] through a
//! [`RemoteExecutor`].

use std::fmt;
use std::net::Ipv4Addr;

use crate::error::Result;

/// The two sides of a measurement exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sends and timestamps outgoing messages.
    Sender,
    /// Timestamps arrivals.
    Receiver,
}

/// Shape of the environment a trial needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologySpec {
    pub hosts: usize,
    pub links: usize,
}

impl TopologySpec {
    /// Two endpoints joined by one link.
    pub fn pair() -> Self {
        Self { hosts: 2, links: 1 }
    }
}

/// A host inside a provisioned environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub name: String,
    /// Handle the executor uses to reach the host (a namespace name for
    /// the netns backend).
    pub handle: String,
    pub addr: Ipv4Addr,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.addr)
    }
}

/// Per-trial link condition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinkProperty {
    /// Random loss on the sender's side of the link, in percent.
    LossPercent(f64),
    /// One-way propagation delay on both sides of the link.
    DelayMs(u32),
}

/// A live environment. Dropping it tears it down.
pub trait Environment {
    fn endpoint(&self, role: Role) -> &Endpoint;

    fn configure_link(&mut self, property: LinkProperty) -> Result<()>;
}

pub trait Provisioner {
    type Env: Environment;

    fn provision(&self, spec: &TopologySpec) -> Result<Self::Env>;
}

/// Runs a shell command on an endpoint and captures its standard output.
pub trait RemoteExecutor {
    fn execute(&self, endpoint: &Endpoint, command: &str) -> Result<String>;
}
