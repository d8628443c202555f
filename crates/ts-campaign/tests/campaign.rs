//! Campaign orchestration over scripted environments.
//!
//! Covers trial ordering, abort-on-failure, sampling bounds and the
//! report layout end to end, without touching real namespaces.

use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use ts_campaign::axis::{ParamValue, ParameterAxis};
use ts_campaign::campaign::{Campaign, CampaignSettings};
use ts_campaign::parser::Channel;
use ts_campaign::sampler::SAMPLE_SIZE;
use ts_campaign::test_util::{
    synthetic_output, Event, EventLog, ScriptedExecutor, ScriptedProvisioner,
};
use ts_campaign::testbed::LinkProperty;
use ts_campaign::trial::{TrialRunner, TrialSettings};
use ts_campaign::CampaignError;

// ─── Shared harness ─────────────────────────────────────────────────

fn campaign(
    provisioner: ScriptedProvisioner,
    outputs: Vec<Result<String, String>>,
    message_count: u32,
    report_dir: &Path,
) -> (Campaign<ScriptedProvisioner, ScriptedExecutor>, EventLog) {
    let log = provisioner.log();
    let executor = ScriptedExecutor::new(log.clone(), outputs);
    let runner = TrialRunner::new(provisioner, executor, TrialSettings::default());
    let settings = CampaignSettings {
        message_count,
        repetitions: 1,
        report_dir: report_dir.to_path_buf(),
    };
    (Campaign::new(runner, settings), log)
}

fn outputs(n: usize, lines: usize) -> Vec<Result<String, String>> {
    (0..n).map(|_| Ok(synthetic_output(lines))).collect()
}

/// Extracts `(index, value)` pairs from one report row.
fn tokens(row: &str) -> Vec<(usize, u64)> {
    row.split('|')
        .skip(1)
        .filter(|t| !t.is_empty())
        .map(|t| {
            let inner = t
                .strip_prefix('[')
                .and_then(|t| t.strip_suffix(']'))
                .unwrap_or_else(|| panic!("bad token {t}"));
            let (idx, val) = inner.split_once(',').unwrap();
            (idx.parse().unwrap(), val.parse().unwrap())
        })
        .collect()
}

// ─── Ordering and lifecycle ─────────────────────────────────────────

#[test]
fn result_preserves_axis_order() {
    let dir = tempfile::tempdir().unwrap();
    let (campaign, log) = campaign(ScriptedProvisioner::new(), outputs(4, 64), 64, dir.path());
    let mut rng = StdRng::seed_from_u64(1);

    let result = campaign.collect(ParameterAxis::PaddingSize, &mut rng).unwrap();
    let values: Vec<ParamValue> = result.trials.iter().map(|t| t.value).collect();
    assert_eq!(
        values,
        [
            ParamValue::Bytes(2),
            ParamValue::Bytes(32),
            ParamValue::Bytes(512),
            ParamValue::Bytes(8192)
        ]
    );
    assert!(result.series().all(|s| s.len() == 64));

    let pads: Vec<String> = log
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Exec { command, .. } if command.contains(" | ") => Some(command),
            _ => None,
        })
        .collect();
    assert_eq!(pads.len(), 4);
    assert!(pads[0].starts_with("ts -s -b 2 "));
    assert!(pads[3].starts_with("ts -s -b 8192 "));
}

#[test]
fn each_trial_is_torn_down_before_the_next() {
    let dir = tempfile::tempdir().unwrap();
    let (campaign, log) = campaign(ScriptedProvisioner::new(), outputs(4, 16), 16, dir.path());

    campaign.run(ParameterAxis::Rtt, &mut rand::rng()).unwrap();

    let lifecycle: Vec<Event> = log
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::Provision | Event::Teardown))
        .collect();
    let expected: Vec<Event> = (0..4)
        .flat_map(|_| [Event::Provision, Event::Teardown])
        .collect();
    assert_eq!(lifecycle, expected);
    assert_eq!(
        log.configured(),
        [
            LinkProperty::DelayMs(5),
            LinkProperty::DelayMs(15),
            LinkProperty::DelayMs(25),
            LinkProperty::DelayMs(35)
        ]
    );
}

#[test]
fn loss_campaign_configures_each_rate() {
    let dir = tempfile::tempdir().unwrap();
    let (campaign, log) = campaign(ScriptedProvisioner::new(), outputs(4, 16), 16, dir.path());

    campaign
        .collect(ParameterAxis::LossRate, &mut rand::rng())
        .unwrap();
    assert_eq!(
        log.configured(),
        [
            LinkProperty::LossPercent(0.1),
            LinkProperty::LossPercent(0.2),
            LinkProperty::LossPercent(0.3),
            LinkProperty::LossPercent(5.0)
        ]
    );
}

// ─── End-to-end scenarios ───────────────────────────────────────────

#[test]
fn full_padding_campaign_report() {
    let dir = tempfile::tempdir().unwrap();
    let (campaign, _log) = campaign(
        ScriptedProvisioner::new(),
        outputs(4, 1024),
        1024,
        dir.path(),
    );

    let path = campaign
        .run(ParameterAxis::PaddingSize, &mut rand::rng())
        .unwrap();
    assert_eq!(path, dir.path().join("tsPadMsgSizeTestResult.txt"));

    let body = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "padMsgSize");
    assert!(lines[1].starts_with("Deltas|"));
    assert!(lines[2].starts_with("Normalized|"));

    for (row, offset) in [(lines[1], 5), (lines[2], 10)] {
        let pairs = tokens(row);
        assert_eq!(pairs.len(), 4 * SAMPLE_SIZE);
        for chunk in pairs.chunks(SAMPLE_SIZE) {
            assert!(chunk.windows(2).all(|w| w[0].0 < w[1].0));
            for &(idx, val) in chunk {
                assert!(idx < 1024);
                // synthetic rows are `5 + i, 10 + i`
                assert_eq!(val, idx as u64 + offset);
            }
        }
    }
}

#[test]
fn short_series_aborts_before_reporting() {
    let dir = tempfile::tempdir().unwrap();
    let (campaign, log) = campaign(ScriptedProvisioner::new(), outputs(4, 5), 5, dir.path());

    let err = campaign
        .run(ParameterAxis::PaddingSize, &mut rand::rng())
        .unwrap_err();
    assert!(matches!(err, CampaignError::Sampling(_)), "{err}");
    assert_eq!(log.measurements(), 1);
    assert!(!dir.path().join("tsPadMsgSizeTestResult.txt").exists());
}

#[test]
fn malformed_line_aborts_campaign() {
    let dir = tempfile::tempdir().unwrap();
    let mut raw = outputs(4, 16);
    raw[1] = Ok(format!("{}5,\n", synthetic_output(15)));
    let (campaign, log) = campaign(ScriptedProvisioner::new(), raw, 16, dir.path());

    let err = campaign
        .run(ParameterAxis::PaddingSize, &mut rand::rng())
        .unwrap_err();
    assert!(matches!(err, CampaignError::Parse(_)), "{err}");
    assert_eq!(log.measurements(), 2);
    assert_eq!(log.count(&Event::Provision), 2);
    assert_eq!(log.count(&Event::Teardown), 2);
    assert!(!dir.path().join("tsPadMsgSizeTestResult.txt").exists());
}

#[test]
fn wrong_sample_count_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let (campaign, _log) = campaign(ScriptedProvisioner::new(), outputs(4, 100), 1024, dir.path());

    let err = campaign
        .collect(ParameterAxis::Rtt, &mut rand::rng())
        .unwrap_err();
    assert!(matches!(err, CampaignError::Parse(_)), "{err}");
}

#[test]
fn execution_failure_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let mut raw = outputs(4, 16);
    raw[2] = Err("ssh: connect to host 10.0.0.2 port 22: Connection refused".into());
    let (campaign, log) = campaign(ScriptedProvisioner::new(), raw, 16, dir.path());

    let err = campaign
        .run(ParameterAxis::LossRate, &mut rand::rng())
        .unwrap_err();
    assert!(matches!(err, CampaignError::Execution(_)), "{err}");
    assert_eq!(log.measurements(), 3);
    assert_eq!(log.events().last(), Some(&Event::Teardown));
}

#[test]
fn provisioning_failure_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let (campaign, log) = campaign(
        ScriptedProvisioner::new().fail_provision(),
        outputs(4, 16),
        16,
        dir.path(),
    );

    assert!(matches!(
        campaign.run(ParameterAxis::Rtt, &mut rand::rng()),
        Err(CampaignError::Execution(_))
    ));
    assert_eq!(log.measurements(), 0);
}

// ─── Idempotence ────────────────────────────────────────────────────

#[test]
fn rerun_overwrites_with_identical_structure() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("tsRTTTestResult.txt");
    let mut shapes = Vec::new();

    for seed in [3u64, 4] {
        let (campaign, _log) =
            campaign(ScriptedProvisioner::new(), outputs(4, 256), 256, dir.path());
        campaign
            .run(ParameterAxis::Rtt, &mut StdRng::seed_from_u64(seed))
            .unwrap();

        let body = fs::read_to_string(&report).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        shapes.push((
            lines.len(),
            lines[0].to_string(),
            tokens(lines[1]).len(),
            tokens(lines[2]).len(),
        ));
    }

    assert_eq!(shapes[0], shapes[1]);
    assert_eq!(shapes[0], (3, "RTT".to_string(), 32, 32));
}

#[test]
fn channels_are_sampled_independently() {
    let dir = tempfile::tempdir().unwrap();
    let (campaign, _log) = campaign(ScriptedProvisioner::new(), outputs(4, 1024), 1024, dir.path());
    let result = campaign
        .collect(ParameterAxis::PaddingSize, &mut StdRng::seed_from_u64(11))
        .unwrap();

    for trial in &result.trials {
        for channel in Channel::ALL {
            let picked = trial.sampled(channel).unwrap();
            assert_eq!(picked.len(), SAMPLE_SIZE);
        }
    }
    // identical index sets for both channels of every trial are
    // vanishingly unlikely with 1024 candidates
    assert!(result.trials.iter().any(|t| t.deltas != t.normalized));
}
