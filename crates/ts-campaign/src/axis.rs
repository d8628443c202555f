//! The three independent variables a campaign sweeps over.

use std::fmt;
use std::str::FromStr;

use crate::error::CampaignError;

/// A single trial parameter, tagged with its unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    /// Padding added to every message, in bytes.
    Bytes(u32),
    /// Packet loss rate, in percent.
    Percent(f64),
    /// Round-trip time, in milliseconds.
    Millis(u32),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bytes(b) => write!(f, "{b} byte"),
            ParamValue::Percent(p) => write!(f, "{p} %"),
            ParamValue::Millis(ms) => write!(f, "{ms} ms"),
        }
    }
}

const PADDING_VALUES: [ParamValue; 4] = [
    ParamValue::Bytes(2),
    ParamValue::Bytes(32),
    ParamValue::Bytes(512),
    ParamValue::Bytes(8192),
];

const LOSS_VALUES: [ParamValue; 4] = [
    ParamValue::Percent(0.1),
    ParamValue::Percent(0.2),
    ParamValue::Percent(0.3),
    ParamValue::Percent(5.0),
];

const RTT_VALUES: [ParamValue; 4] = [
    ParamValue::Millis(10),
    ParamValue::Millis(30),
    ParamValue::Millis(50),
    ParamValue::Millis(70),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterAxis {
    PaddingSize,
    LossRate,
    Rtt,
}

impl ParameterAxis {
    pub const ALL: [ParameterAxis; 3] = [
        ParameterAxis::PaddingSize,
        ParameterAxis::LossRate,
        ParameterAxis::Rtt,
    ];

    /// Identifier used on the command line and as the report header.
    pub fn id(self) -> &'static str {
        match self {
            ParameterAxis::PaddingSize => "padMsgSize",
            ParameterAxis::LossRate => "loss",
            ParameterAxis::Rtt => "RTT",
        }
    }

    /// The fixed, ordered values swept by a campaign on this axis.
    pub fn values(self) -> &'static [ParamValue] {
        match self {
            ParameterAxis::PaddingSize => &PADDING_VALUES,
            ParameterAxis::LossRate => &LOSS_VALUES,
            ParameterAxis::Rtt => &RTT_VALUES,
        }
    }

    /// `ts<Id>TestResult.txt`, with the first letter of the id upper-cased.
    pub fn report_file_name(self) -> String {
        let id = self.id();
        let mut chars = id.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
            None => String::new(),
        };
        format!("ts{capitalized}TestResult.txt")
    }

    /// Whether `value` carries the unit this axis sweeps.
    pub fn accepts(self, value: &ParamValue) -> bool {
        matches!(
            (self, value),
            (ParameterAxis::PaddingSize, ParamValue::Bytes(_))
                | (ParameterAxis::LossRate, ParamValue::Percent(_))
                | (ParameterAxis::Rtt, ParamValue::Millis(_))
        )
    }
}

impl fmt::Display for ParameterAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ParameterAxis {
    type Err = CampaignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ParameterAxis::ALL
            .into_iter()
            .find(|axis| axis.id().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                CampaignError::Validation(format!(
                    "unknown axis '{s}', expected one of padMsgSize, loss, RTT"
                ))
            })
    }
}
