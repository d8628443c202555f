//! Parsing of the measurement program's `DELTA,NORMALIZED` output.

use crate::error::{CampaignError, Result};

/// Which of the two per-message measurements a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Arrival time difference from the previous message.
    Deltas,
    /// Arrival time normalized against the first message.
    Normalized,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Deltas, Channel::Normalized];

    pub fn tag(self) -> &'static str {
        match self {
            Channel::Deltas => "Deltas",
            Channel::Normalized => "Normalized",
        }
    }
}

/// Paired per-message timings from one trial.
///
/// Both channels always have the same length; [`parse_output`] is the
/// only constructor outside of tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimingSeries {
    deltas: Vec<u64>,
    normalized: Vec<u64>,
}

impl TimingSeries {
    /// Builds a series from two channels, rejecting mismatched lengths.
    pub fn new(deltas: Vec<u64>, normalized: Vec<u64>) -> Result<Self> {
        if deltas.len() != normalized.len() {
            return Err(CampaignError::Parse(format!(
                "channel lengths differ: {} deltas, {} normalized",
                deltas.len(),
                normalized.len()
            )));
        }
        Ok(Self { deltas, normalized })
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn deltas(&self) -> &[u64] {
        &self.deltas
    }

    pub fn normalized(&self) -> &[u64] {
        &self.normalized
    }

    pub fn channel(&self, channel: Channel) -> &[u64] {
        match channel {
            Channel::Deltas => &self.deltas,
            Channel::Normalized => &self.normalized,
        }
    }
}

/// Parses raw measurement output into a [`TimingSeries`].
///
/// The first line is a column header and is discarded. Every following
/// non-empty line must hold exactly two comma separated non-negative
/// integers. Parsing is all-or-nothing: the first bad line fails the
/// whole output.
pub fn parse_output(raw: &str) -> Result<TimingSeries> {
    let mut lines = raw.lines();
    match lines.next() {
        Some(header) => tracing::trace!(header = header.trim(), "discarding header"),
        None => return Err(CampaignError::Parse("output is empty".into())),
    }

    let mut deltas = Vec::new();
    let mut normalized = Vec::new();

    // line numbers are 1-based and count the header
    for (line_no, line) in lines.enumerate().map(|(i, l)| (i + 2, l.trim())) {
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split(',');
        let (Some(delta), Some(norm), None) = (fields.next(), fields.next(), fields.next()) else {
            return Err(CampaignError::Parse(format!(
                "line {line_no}: expected two comma separated fields, got '{line}'"
            )));
        };

        deltas.push(parse_field(delta, line_no, line)?);
        normalized.push(parse_field(norm, line_no, line)?);
    }

    if deltas.is_empty() {
        return Err(CampaignError::Parse("no data lines after header".into()));
    }

    TimingSeries::new(deltas, normalized)
}

fn parse_field(field: &str, line_no: usize, line: &str) -> Result<u64> {
    field.trim().parse::<u64>().map_err(|e| {
        CampaignError::Parse(format!(
            "line {line_no}: '{}' is not a non-negative integer ({e}) in '{line}'",
            field.trim()
        ))
    })
}
