//! Network environment toolkit for timestamp measurement trials.
//!
//! Provides Linux network namespace management, a two-endpoint veth
//! topology, and `tc netem` loss/delay impairment for the links between
//! them.

pub mod impairment;
pub mod topology;

pub mod test_util;
