//! One measurement exchange for a single axis value.

use crate::axis::{ParamValue, ParameterAxis};
use crate::error::{CampaignError, Result};
use crate::testbed::{
    Endpoint, Environment, LinkProperty, Provisioner, RemoteExecutor, Role, TopologySpec,
};

/// Fixed inputs shared by every trial of a run.
#[derive(Debug, Clone)]
pub struct TrialSettings {
    /// Measurement program, as found on `PATH` inside the endpoints.
    pub ts_binary: String,
    pub ssh_user: String,
    pub sshd_path: String,
    /// Wrap ssh in `sshpass -e`; the executor supplies `SSHPASS`.
    pub password_auth: bool,
    /// Ping the receiver once before measuring.
    pub connectivity_check: bool,
}

impl Default for TrialSettings {
    fn default() -> Self {
        Self {
            ts_binary: "ts".into(),
            ssh_user: "mininet".into(),
            sshd_path: "/usr/sbin/sshd".into(),
            password_auth: true,
            connectivity_check: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialSpec {
    pub axis: ParameterAxis,
    pub value: ParamValue,
    pub message_count: u32,
    /// Reserved. Values above one are accepted but a trial always yields
    /// exactly one measurement.
    pub repetitions: u32,
}

impl TrialSpec {
    pub fn validate(&self) -> Result<()> {
        if !self.axis.accepts(&self.value) {
            return Err(CampaignError::Validation(format!(
                "value {} does not belong to axis {}",
                self.value, self.axis
            )));
        }
        if let ParamValue::Percent(p) = self.value {
            if !p.is_finite() || !(0.0..=100.0).contains(&p) {
                return Err(CampaignError::Validation(format!(
                    "loss rate must be within 0..=100 percent, got {p}"
                )));
            }
        }
        if self.repetitions == 0 {
            return Err(CampaignError::Validation(
                "repetitions must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Link condition the environment must carry for this trial.
    pub fn link_property(&self) -> Option<LinkProperty> {
        match self.value {
            ParamValue::Bytes(_) => None,
            ParamValue::Percent(p) => Some(LinkProperty::LossPercent(p)),
            // one-way delay on each side adds up to the requested RTT
            ParamValue::Millis(rtt) => Some(LinkProperty::DelayMs(rtt / 2)),
        }
    }
}

/// Renders the sender | ssh receiver pipeline run on the sender endpoint.
pub fn measurement_command(settings: &TrialSettings, spec: &TrialSpec, receiver: &Endpoint) -> String {
    let args = match spec.value {
        ParamValue::Bytes(padding) => format!("-b {} -c {}", padding, spec.message_count),
        _ => format!("-c {}", spec.message_count),
    };
    let ssh = if settings.password_auth {
        "sshpass -e ssh"
    } else {
        "ssh"
    };
    format!(
        "{ts} -s {args} | {ssh} -oStrictHostKeyChecking=no {user}@{addr} {ts} -r {args}",
        ts = settings.ts_binary,
        user = settings.ssh_user,
        addr = receiver.addr,
    )
}

/// Provisions an environment per trial, runs the exchange and tears the
/// environment down again.
pub struct TrialRunner<P, X> {
    provisioner: P,
    executor: X,
    settings: TrialSettings,
}

impl<P: Provisioner, X: RemoteExecutor> TrialRunner<P, X> {
    pub fn new(provisioner: P, executor: X, settings: TrialSettings) -> Self {
        Self {
            provisioner,
            executor,
            settings,
        }
    }

    pub fn settings(&self) -> &TrialSettings {
        &self.settings
    }

    /// Runs one trial and returns the raw measurement output.
    ///
    /// The environment is torn down before this returns, on every path.
    pub fn run(&self, spec: &TrialSpec) -> Result<String> {
        spec.validate()?;
        if spec.repetitions > 1 {
            tracing::warn!(
                repetitions = spec.repetitions,
                "repetitions are reserved, running a single measurement"
            );
        }

        let mut env = self.provisioner.provision(&TopologySpec::pair())?;
        let sender = env.endpoint(Role::Sender).clone();
        let receiver = env.endpoint(Role::Receiver).clone();
        tracing::info!(sender = %sender, receiver = %receiver, "environment provisioned");

        if let Some(property) = spec.link_property() {
            tracing::debug!(?property, "configuring link");
            env.configure_link(property)?;
        }

        for endpoint in [&sender, &receiver] {
            self.executor.execute(endpoint, &self.settings.sshd_path)?;
        }

        if self.settings.connectivity_check {
            let ping = format!("ping -c 1 -W 2 {}", receiver.addr);
            self.executor.execute(&sender, &ping).map_err(|e| {
                CampaignError::Execution(format!("{} cannot reach {}: {}", sender, receiver, e))
            })?;
        }

        let command = measurement_command(&self.settings, spec, &receiver);
        tracing::info!(
            axis = %spec.axis,
            value = %spec.value,
            messages = spec.message_count,
            "measuring arrival times"
        );
        let raw = self.executor.execute(&sender, &command)?;

        drop(env);
        tracing::debug!("environment torn down");
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{Event, ScriptedExecutor, ScriptedProvisioner};

    fn spec(axis: ParameterAxis, value: ParamValue) -> TrialSpec {
        TrialSpec {
            axis,
            value,
            message_count: 16,
            repetitions: 1,
        }
    }

    fn runner(
        provisioner: ScriptedProvisioner,
        executor: ScriptedExecutor,
    ) -> TrialRunner<ScriptedProvisioner, ScriptedExecutor> {
        TrialRunner::new(provisioner, executor, TrialSettings::default())
    }

    #[test]
    fn padding_command_carries_padding_on_both_sides() {
        let receiver = Endpoint {
            name: "h2".into(),
            handle: "tsc_b".into(),
            addr: "10.77.0.2".parse().unwrap(),
        };
        let cmd = measurement_command(
            &TrialSettings::default(),
            &spec(ParameterAxis::PaddingSize, ParamValue::Bytes(512)),
            &receiver,
        );
        assert_eq!(
            cmd,
            "ts -s -b 512 -c 16 | sshpass -e ssh -oStrictHostKeyChecking=no mininet@10.77.0.2 ts -r -b 512 -c 16"
        );
    }

    #[test]
    fn key_auth_command_skips_sshpass() {
        let receiver = Endpoint {
            name: "h2".into(),
            handle: "tsc_b".into(),
            addr: "10.77.0.2".parse().unwrap(),
        };
        let settings = TrialSettings {
            password_auth: false,
            ..Default::default()
        };
        let cmd = measurement_command(
            &settings,
            &spec(ParameterAxis::Rtt, ParamValue::Millis(30)),
            &receiver,
        );
        assert_eq!(
            cmd,
            "ts -s -c 16 | ssh -oStrictHostKeyChecking=no mininet@10.77.0.2 ts -r -c 16"
        );
    }

    #[test]
    fn link_property_per_axis() {
        assert_eq!(
            spec(ParameterAxis::PaddingSize, ParamValue::Bytes(2)).link_property(),
            None
        );
        assert_eq!(
            spec(ParameterAxis::LossRate, ParamValue::Percent(0.2)).link_property(),
            Some(LinkProperty::LossPercent(0.2))
        );
        assert_eq!(
            spec(ParameterAxis::Rtt, ParamValue::Millis(70)).link_property(),
            Some(LinkProperty::DelayMs(35))
        );
    }

    #[test]
    fn invalid_spec_has_no_side_effects() {
        let provisioner = ScriptedProvisioner::new();
        let log = provisioner.log();
        let runner = runner(provisioner, ScriptedExecutor::new(log.clone(), vec![]));

        for bad in [
            spec(ParameterAxis::PaddingSize, ParamValue::Millis(10)),
            spec(ParameterAxis::LossRate, ParamValue::Percent(-0.1)),
            spec(ParameterAxis::LossRate, ParamValue::Percent(f64::NAN)),
            TrialSpec {
                repetitions: 0,
                ..spec(ParameterAxis::Rtt, ParamValue::Millis(10))
            },
        ] {
            assert!(matches!(runner.run(&bad), Err(CampaignError::Validation(_))));
        }
        assert!(log.events().is_empty());
    }

    #[test]
    fn loss_trial_sequence() {
        let provisioner = ScriptedProvisioner::new();
        let log = provisioner.log();
        let executor = ScriptedExecutor::new(log.clone(), vec![Ok("DELTA,NORMALIZED\n1,1\n".into())]);
        let runner = runner(provisioner, executor);

        let raw = runner
            .run(&spec(ParameterAxis::LossRate, ParamValue::Percent(0.3)))
            .unwrap();
        assert_eq!(raw, "DELTA,NORMALIZED\n1,1\n");

        let events = log.events();
        assert_eq!(events.first(), Some(&Event::Provision));
        assert_eq!(events[1], Event::Configure(LinkProperty::LossPercent(0.3)));
        assert!(matches!(&events[2], Event::Exec { endpoint, command }
            if endpoint == "h1" && command == "/usr/sbin/sshd"));
        assert!(matches!(&events[3], Event::Exec { endpoint, .. } if endpoint == "h2"));
        assert!(matches!(&events[4], Event::Exec { command, .. } if command.starts_with("ping")));
        assert!(matches!(&events[5], Event::Exec { command, .. } if command.starts_with("ts -s -c 16")));
        assert_eq!(events.last(), Some(&Event::Teardown));
    }

    #[test]
    fn failed_measurement_still_tears_down() {
        let provisioner = ScriptedProvisioner::new();
        let log = provisioner.log();
        let executor = ScriptedExecutor::new(log.clone(), vec![Err("ssh: connection refused".into())]);
        let runner = runner(provisioner, executor);

        let err = runner
            .run(&spec(ParameterAxis::PaddingSize, ParamValue::Bytes(2)))
            .unwrap_err();
        assert!(matches!(err, CampaignError::Execution(_)));
        assert_eq!(log.events().last(), Some(&Event::Teardown));
    }

    #[test]
    fn failed_link_configuration_tears_down() {
        let provisioner = ScriptedProvisioner::new().fail_configure();
        let log = provisioner.log();
        let runner = runner(provisioner, ScriptedExecutor::new(log.clone(), vec![]));

        assert!(runner
            .run(&spec(ParameterAxis::Rtt, ParamValue::Millis(10)))
            .is_err());
        assert_eq!(
            log.events(),
            vec![
                Event::Provision,
                Event::Configure(LinkProperty::DelayMs(5)),
                Event::Teardown
            ]
        );
    }

    #[test]
    fn extra_repetitions_run_once() {
        let provisioner = ScriptedProvisioner::new();
        let log = provisioner.log();
        let executor = ScriptedExecutor::new(log.clone(), vec![Ok("H\n1,2\n".into())]);
        let runner = runner(provisioner, executor);

        let trial = TrialSpec {
            repetitions: 5,
            ..spec(ParameterAxis::PaddingSize, ParamValue::Bytes(32))
        };
        runner.run(&trial).unwrap();
        assert_eq!(log.measurements(), 1);
        assert_eq!(log.count(&Event::Provision), 1);
    }
}
