//! In-memory provisioner and executor for exercising trials and campaigns
//! without network namespaces.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::{CampaignError, Result};
use crate::testbed::{
    Endpoint, Environment, LinkProperty, Provisioner, RemoteExecutor, Role, TopologySpec,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Provision,
    Configure(LinkProperty),
    Exec { endpoint: String, command: String },
    Teardown,
}

/// Shared, ordered record of everything the fakes were asked to do.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    fn push(&self, event: Event) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    /// Number of measurement pipelines executed.
    pub fn measurements(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Exec { command, .. } if is_measurement(command)))
            .count()
    }

    /// Link properties in the order they were configured.
    pub fn configured(&self) -> Vec<LinkProperty> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Configure(p) => Some(p),
                _ => None,
            })
            .collect()
    }
}

fn is_measurement(command: &str) -> bool {
    command.contains(" | ")
}

pub struct ScriptedProvisioner {
    log: EventLog,
    fail_provision: bool,
    fail_configure: bool,
}

impl Default for ScriptedProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvisioner {
    pub fn new() -> Self {
        Self {
            log: EventLog::default(),
            fail_provision: false,
            fail_configure: false,
        }
    }

    pub fn fail_provision(mut self) -> Self {
        self.fail_provision = true;
        self
    }

    pub fn fail_configure(mut self) -> Self {
        self.fail_configure = true;
        self
    }

    pub fn log(&self) -> EventLog {
        self.log.clone()
    }
}

pub struct ScriptedEnvironment {
    log: EventLog,
    sender: Endpoint,
    receiver: Endpoint,
    fail_configure: bool,
}

impl Environment for ScriptedEnvironment {
    fn endpoint(&self, role: Role) -> &Endpoint {
        match role {
            Role::Sender => &self.sender,
            Role::Receiver => &self.receiver,
        }
    }

    fn configure_link(&mut self, property: LinkProperty) -> Result<()> {
        self.log.push(Event::Configure(property));
        if self.fail_configure {
            return Err(CampaignError::Execution("netem unavailable".into()));
        }
        Ok(())
    }
}

impl Drop for ScriptedEnvironment {
    fn drop(&mut self) {
        self.log.push(Event::Teardown);
    }
}

impl Provisioner for ScriptedProvisioner {
    type Env = ScriptedEnvironment;

    fn provision(&self, spec: &TopologySpec) -> Result<ScriptedEnvironment> {
        if self.fail_provision {
            return Err(CampaignError::Execution("cannot create namespaces".into()));
        }
        if spec.hosts != 2 {
            return Err(CampaignError::Validation(format!(
                "only two-host topologies are supported, got {}",
                spec.hosts
            )));
        }
        self.log.push(Event::Provision);
        Ok(ScriptedEnvironment {
            log: self.log.clone(),
            sender: fake_endpoint("h1", 1),
            receiver: fake_endpoint("h2", 2),
            fail_configure: self.fail_configure,
        })
    }
}

fn fake_endpoint(name: &str, host: u8) -> Endpoint {
    Endpoint {
        name: name.into(),
        handle: format!("fake_{name}"),
        addr: [10, 0, 0, host].into(),
    }
}

/// Answers measurement pipelines from a queue of canned outputs; every
/// other command succeeds with empty output.
pub struct ScriptedExecutor {
    log: EventLog,
    outputs: Mutex<VecDeque<std::result::Result<String, String>>>,
}

impl ScriptedExecutor {
    pub fn new(log: EventLog, outputs: Vec<std::result::Result<String, String>>) -> Self {
        Self {
            log,
            outputs: Mutex::new(outputs.into()),
        }
    }
}

impl RemoteExecutor for ScriptedExecutor {
    fn execute(&self, endpoint: &Endpoint, command: &str) -> Result<String> {
        self.log.push(Event::Exec {
            endpoint: endpoint.name.clone(),
            command: command.to_string(),
        });
        if !is_measurement(command) {
            return Ok(String::new());
        }
        match self
            .outputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
        {
            Some(Ok(out)) => Ok(out),
            Some(Err(e)) => Err(CampaignError::Execution(e)),
            None => Err(CampaignError::Execution("no scripted output left".into())),
        }
    }
}

/// `DELTA,NORMALIZED` output with `lines` data rows.
pub fn synthetic_output(lines: usize) -> String {
    let mut out = String::from("DELTA,NORMALIZED\n");
    for i in 0..lines {
        out.push_str(&format!("{},{}\n", 5 + i, 10 + i));
    }
    out
}
