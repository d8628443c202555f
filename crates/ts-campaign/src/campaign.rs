//! Sequencing of trials across one axis and hand-off to the report writer.

use std::path::PathBuf;

use rand::Rng;

use crate::axis::{ParamValue, ParameterAxis};
use crate::error::{CampaignError, Result};
use crate::parser::{parse_output, Channel, TimingSeries};
use crate::report::write_report;
use crate::sampler::{pick_sample, SampleSet};
use crate::testbed::{Provisioner, RemoteExecutor};
use crate::trial::{TrialRunner, TrialSpec};

/// Number of messages exchanged per trial unless configured otherwise.
pub const DEFAULT_MESSAGE_COUNT: u32 = 1024;

#[derive(Debug, Clone)]
pub struct CampaignSettings {
    pub message_count: u32,
    pub repetitions: u32,
    /// Directory the report is written into.
    pub report_dir: PathBuf,
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            message_count: DEFAULT_MESSAGE_COUNT,
            repetitions: 1,
            report_dir: PathBuf::from("."),
        }
    }
}

/// The parsed and sampled result of one trial.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutcome {
    pub value: ParamValue,
    pub series: TimingSeries,
    pub deltas: SampleSet,
    pub normalized: SampleSet,
}

impl TrialOutcome {
    /// Samples both channels of `series` independently.
    pub fn sample(value: ParamValue, series: TimingSeries, rng: &mut impl Rng) -> Result<Self> {
        let deltas = pick_sample(series.len(), rng)?;
        let normalized = pick_sample(series.len(), rng)?;
        Ok(Self {
            value,
            series,
            deltas,
            normalized,
        })
    }

    pub fn sample_set(&self, channel: Channel) -> &SampleSet {
        match channel {
            Channel::Deltas => &self.deltas,
            Channel::Normalized => &self.normalized,
        }
    }

    /// `(index, value)` pairs of the sampled channel.
    pub fn sampled(&self, channel: Channel) -> Result<Vec<(usize, u64)>> {
        self.sample_set(channel).pick(self.series.channel(channel))
    }
}

/// One outcome per axis value, in axis order.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignResult {
    pub axis: ParameterAxis,
    pub trials: Vec<TrialOutcome>,
}

impl CampaignResult {
    pub fn series(&self) -> impl Iterator<Item = &TimingSeries> {
        self.trials.iter().map(|t| &t.series)
    }
}

/// Drives a full sweep over one axis.
///
/// Trials run strictly one after another; each trial's environment is
/// gone before the next is provisioned. The first failure aborts the
/// campaign and no report is written.
pub struct Campaign<P, X> {
    runner: TrialRunner<P, X>,
    settings: CampaignSettings,
}

impl<P: Provisioner, X: RemoteExecutor> Campaign<P, X> {
    pub fn new(runner: TrialRunner<P, X>, settings: CampaignSettings) -> Self {
        Self { runner, settings }
    }

    pub fn settings(&self) -> &CampaignSettings {
        &self.settings
    }

    /// Runs every trial of `axis` and samples the results.
    pub fn collect(&self, axis: ParameterAxis, rng: &mut impl Rng) -> Result<CampaignResult> {
        let values = axis.values();
        let mut trials = Vec::with_capacity(values.len());

        for (idx, &value) in values.iter().enumerate() {
            let span = tracing::info_span!("trial", axis = %axis, value = %value);
            let _enter = span.enter();
            tracing::info!(trial = idx + 1, of = values.len(), "starting trial");

            let spec = TrialSpec {
                axis,
                value,
                message_count: self.settings.message_count,
                repetitions: self.settings.repetitions,
            };

            match self.trial(&spec, rng) {
                Ok(outcome) => {
                    tracing::info!(samples = outcome.series.len(), "trial complete");
                    trials.push(outcome);
                }
                Err(e) => {
                    tracing::error!(error = %e, "trial failed, aborting campaign");
                    return Err(e);
                }
            }
        }

        Ok(CampaignResult { axis, trials })
    }

    /// Runs the campaign and writes its report, returning the report path.
    pub fn run(&self, axis: ParameterAxis, rng: &mut impl Rng) -> Result<PathBuf> {
        let result = self.collect(axis, rng)?;
        let path = write_report(&self.settings.report_dir, &result)?;
        tracing::info!(axis = %axis, path = %path.display(), "report written");
        Ok(path)
    }

    fn trial(&self, spec: &TrialSpec, rng: &mut impl Rng) -> Result<TrialOutcome> {
        let raw = self.runner.run(spec)?;
        let series = self.check(&raw)?;
        TrialOutcome::sample(spec.value, series, rng)
    }

    fn check(&self, raw: &str) -> Result<TimingSeries> {
        let series = parse_output(raw)?;
        let expected = self.settings.message_count as usize;
        if series.len() != expected {
            return Err(CampaignError::Parse(format!(
                "expected {} samples, got {}",
                expected,
                series.len()
            )));
        }
        Ok(series)
    }
}
