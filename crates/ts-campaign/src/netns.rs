//! Linux backend: namespaces joined by a veth pair, commands run through
//! `ip netns exec`.

use std::io;
use std::net::Ipv4Addr;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use ts_sim::impairment::{apply_impairment, ImpairmentConfig};
use ts_sim::topology::{kill_namespace_processes, netns_command, LinkedPair};

use crate::config::{NetworkConfig, SshCredentials};
use crate::error::{CampaignError, Result};
use crate::testbed::{
    Endpoint, Environment, LinkProperty, Provisioner, RemoteExecutor, Role, TopologySpec,
};

/// Queue limit installed alongside a loss rule so that netem never drops
/// on overflow, only at the configured rate.
pub const LOSS_QUEUE_LIMIT: u64 = 10_000_000_000;

const PASSWORD_ENV: &str = "SSHPASS";

pub struct NetnsProvisioner {
    prefix: String,
    subnet: Ipv4Addr,
}

impl NetnsProvisioner {
    pub fn new(network: &NetworkConfig) -> Self {
        Self {
            prefix: network.namespace_prefix.clone(),
            subnet: network.subnet,
        }
    }
}

impl Provisioner for NetnsProvisioner {
    type Env = NetnsEnvironment;

    fn provision(&self, spec: &TopologySpec) -> Result<NetnsEnvironment> {
        if spec.hosts != 2 || spec.links != 1 {
            return Err(CampaignError::Validation(format!(
                "netns backend supports two hosts on one link, got {} hosts and {} links",
                spec.hosts, spec.links
            )));
        }

        let pair = LinkedPair::new(&self.prefix, self.subnet)
            .map_err(|e| CampaignError::Execution(format!("provisioning failed: {e}")))?;
        let sender = Endpoint {
            name: "h1".into(),
            handle: pair.a.name.clone(),
            addr: pair.a_addr,
        };
        let receiver = Endpoint {
            name: "h2".into(),
            handle: pair.b.name.clone(),
            addr: pair.b_addr,
        };
        tracing::debug!(
            sender = %sender,
            sender_iface = %pair.a_iface,
            receiver = %receiver,
            receiver_iface = %pair.b_iface,
            "topology"
        );

        Ok(NetnsEnvironment {
            pair,
            sender,
            receiver,
        })
    }
}

/// Both namespaces are deleted when this is dropped, after every process
/// started inside them (sshd included) has been killed.
pub struct NetnsEnvironment {
    pair: LinkedPair,
    sender: Endpoint,
    receiver: Endpoint,
}

impl NetnsEnvironment {
    fn impair(&self, role: Role, config: &ImpairmentConfig) -> Result<()> {
        let (ns, iface) = match role {
            Role::Sender => (&self.pair.a, &self.pair.a_iface),
            Role::Receiver => (&self.pair.b, &self.pair.b_iface),
        };
        apply_impairment(ns, iface, config)
            .map_err(|e| CampaignError::Execution(format!("{}: {}", ns.name, e)))
    }
}

impl Environment for NetnsEnvironment {
    fn endpoint(&self, role: Role) -> &Endpoint {
        match role {
            Role::Sender => &self.sender,
            Role::Receiver => &self.receiver,
        }
    }

    fn configure_link(&mut self, property: LinkProperty) -> Result<()> {
        match property {
            LinkProperty::LossPercent(loss) => self.impair(
                Role::Sender,
                &ImpairmentConfig {
                    loss_percent: Some(loss),
                    netem_limit: Some(LOSS_QUEUE_LIMIT),
                    ..Default::default()
                },
            ),
            LinkProperty::DelayMs(delay) => {
                let config = ImpairmentConfig {
                    delay_ms: Some(delay),
                    ..Default::default()
                };
                self.impair(Role::Sender, &config)?;
                self.impair(Role::Receiver, &config)
            }
        }
    }
}

impl Drop for NetnsEnvironment {
    fn drop(&mut self) {
        tracing::debug!(a = %self.pair.a.name, b = %self.pair.b.name, "tearing down namespaces");
    }
}

/// Runs `sh -c <command>` inside an endpoint's namespace.
///
/// The SSH password, when present, travels in `SSHPASS` for `sshpass -e`
/// and never appears on a command line.
pub struct NetnsExecutor {
    runtime: tokio::runtime::Runtime,
    credentials: SshCredentials,
    timeout: Option<Duration>,
}

impl NetnsExecutor {
    pub fn new(credentials: SshCredentials, timeout: Option<Duration>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CampaignError::Execution(format!("cannot start runtime: {e}")))?;
        Ok(Self {
            runtime,
            credentials,
            timeout,
        })
    }

    async fn run(&self, endpoint: &Endpoint, command: &str) -> io::Result<Output> {
        let preserve: &[&str] = if self.credentials.password.is_some() {
            &[PASSWORD_ENV]
        } else {
            &[]
        };
        let mut cmd = netns_command(&endpoint.handle, preserve);
        cmd.args(["sh", "-c", command])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(password) = &self.credentials.password {
            cmd.env(PASSWORD_ENV, password);
        }

        let mut cmd = tokio::process::Command::from(cmd);
        cmd.kill_on_drop(true);
        let mut child = cmd.spawn()?;

        let Some(limit) = self.timeout else {
            return collect(&mut child).await;
        };
        let finished = tokio::time::timeout(limit, collect(&mut child)).await;
        if let Ok(output) = finished {
            return output;
        }

        // Killing the child only reaches sudo; the command itself lives in
        // the namespace.
        match kill_namespace_processes(&endpoint.handle) {
            Ok(n) => tracing::warn!(endpoint = %endpoint, killed = n, "command timed out"),
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, error = %e, "command timed out, namespace not cleared")
            }
        }
        let _ = child.start_kill();
        child.wait().await?;
        Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("no exit after {}s", limit.as_secs()),
        ))
    }
}

async fn collect(child: &mut Child) -> io::Result<Output> {
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let (status, stdout, stderr) = tokio::try_join!(
        child.wait(),
        read_pipe(stdout.as_mut()),
        read_pipe(stderr.as_mut()),
    )?;
    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<&mut R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

impl RemoteExecutor for NetnsExecutor {
    fn execute(&self, endpoint: &Endpoint, command: &str) -> Result<String> {
        tracing::debug!(endpoint = %endpoint, command, "executing");
        let output = self
            .runtime
            .block_on(self.run(endpoint, command))
            .map_err(|e| CampaignError::Execution(format!("{endpoint}: `{command}`: {e}")))?;

        if !output.status.success() {
            return Err(CampaignError::Execution(format!(
                "{endpoint}: `{command}` exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
