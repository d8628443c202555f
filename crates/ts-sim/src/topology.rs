use std::io;
use std::net::Ipv4Addr;
use std::process::{Command, Output};

/// Whether this process already has the privileges `ip netns` needs.
pub fn running_as_root() -> bool {
    // SAFETY: geteuid(2) has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

fn elevate(program: &str, preserve_env: &[&str], as_root: bool) -> Command {
    if as_root {
        return Command::new(program);
    }
    let mut cmd = Command::new("sudo");
    if !preserve_env.is_empty() {
        cmd.arg(format!("--preserve-env={}", preserve_env.join(",")));
    }
    cmd.arg(program);
    cmd
}

/// Builds a command for `program` that runs with root privileges.
///
/// As root the program is run directly; otherwise it goes through `sudo`,
/// and only the variables named in `preserve_env` survive that boundary.
pub fn privileged_command(program: &str, preserve_env: &[&str]) -> Command {
    elevate(program, preserve_env, running_as_root())
}

/// Builds an `ip netns exec <ns>` command prefix.
pub fn netns_command(ns: &str, preserve_env: &[&str]) -> Command {
    let mut cmd = privileged_command("ip", preserve_env);
    cmd.args(["netns", "exec", ns]);
    cmd
}

fn ip(args: &[&str]) -> io::Result<Output> {
    privileged_command("ip", &[]).args(args).output()
}

fn check(output: &Output, what: &str) -> io::Result<()> {
    if output.status.success() {
        return Ok(());
    }
    Err(io::Error::other(format!(
        "Failed to {}: {}",
        what,
        String::from_utf8_lossy(&output.stderr).trim()
    )))
}

/// Process ids currently running inside namespace `ns`.
pub fn namespace_pids(ns: &str) -> io::Result<Vec<u32>> {
    let output = ip(&["netns", "pids", ns])?;
    check(&output, "list namespace pids")?;
    Ok(String::from_utf8_lossy(&output.stdout)
        .split_whitespace()
        .filter_map(|pid| pid.parse().ok())
        .collect())
}

/// SIGKILLs every process inside namespace `ns` and returns how many were
/// signalled.
///
/// Deleting a namespace only drops its name; daemons started inside it
/// (sshd, a detached pipeline) keep the namespace and its links alive
/// until they are killed.
pub fn kill_namespace_processes(ns: &str) -> io::Result<usize> {
    let mut killed = 0;
    // processes may fork while being killed
    for _ in 0..3 {
        let pids = namespace_pids(ns)?;
        if pids.is_empty() {
            break;
        }
        let output = privileged_command("kill", &[])
            .arg("-KILL")
            .args(pids.iter().map(u32::to_string))
            .output()?;
        if !output.status.success() {
            tracing::debug!(
                ns,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "kill reported missing processes"
            );
        }
        killed += pids.len();
    }
    Ok(killed)
}

/// A Linux network namespace managed via `ip netns`.
///
/// Creates the namespace on construction and initializes loopback. On drop
/// every process left inside is killed before the namespace is deleted.
#[derive(Debug)]
pub struct Namespace {
    pub name: String,
}

impl Namespace {
    pub fn new(name: &str) -> io::Result<Self> {
        // cleanup any existing namespace with the same name
        let _ = ip(&["netns", "del", name]);

        check(&ip(&["netns", "add", name])?, "create netns")?;

        // Initialize loopback
        let _ = ip(&["netns", "exec", name, "ip", "link", "set", "lo", "up"]);

        Ok(Self {
            name: name.to_string(),
        })
    }

    pub fn exec(&self, cmd: &str, args: &[&str]) -> io::Result<Output> {
        netns_command(&self.name, &[]).arg(cmd).args(args).output()
    }

    /// Creates a veth pair between `self` and `other`, assigns the given
    /// CIDR addresses and brings both ends up.
    pub fn add_veth_link(
        &self,
        other: &Namespace,
        veth_name_local: &str,
        veth_name_peer: &str,
        ip_local: &str,
        ip_peer: &str,
    ) -> io::Result<()> {
        // Clean up potential leftovers in host
        let _ = ip(&["link", "del", veth_name_local]);

        check(
            &ip(&[
                "link",
                "add",
                veth_name_local,
                "type",
                "veth",
                "peer",
                "name",
                veth_name_peer,
            ])?,
            "create veth pair",
        )?;
        check(
            &ip(&["link", "set", veth_name_local, "netns", &self.name])?,
            "move local veth",
        )?;
        check(
            &ip(&["link", "set", veth_name_peer, "netns", &other.name])?,
            "move peer veth",
        )?;

        check(
            &self.exec("ip", &["addr", "add", ip_local, "dev", veth_name_local])?,
            "set local IP",
        )?;
        check(
            &self.exec("ip", &["link", "set", veth_name_local, "up"])?,
            "set local link up",
        )?;
        check(
            &other.exec("ip", &["addr", "add", ip_peer, "dev", veth_name_peer])?,
            "set peer IP",
        )?;
        check(
            &other.exec("ip", &["link", "set", veth_name_peer, "up"])?,
            "set peer link up",
        )?;

        Ok(())
    }
}

impl Drop for Namespace {
    fn drop(&mut self) {
        match kill_namespace_processes(&self.name) {
            Ok(0) => {}
            Ok(n) => tracing::debug!(ns = %self.name, processes = n, "killed namespace processes"),
            Err(e) => tracing::warn!(ns = %self.name, error = %e, "cannot list namespace processes"),
        }
        match ip(&["netns", "del", &self.name]).map(|o| o.status) {
            Ok(status) if status.success() => {
                tracing::debug!(ns = %self.name, "namespace deleted");
            }
            Ok(status) => {
                tracing::warn!(ns = %self.name, %status, "namespace deletion failed");
            }
            Err(e) => {
                tracing::warn!(ns = %self.name, error = %e, "namespace deletion failed");
            }
        }
    }
}

/// Two namespaces joined by a single veth link.
///
/// Endpoint A gets `base + 1`, endpoint B gets `base + 2`, both on a /24.
/// Dropping the pair deletes both namespaces, which also removes the veth
/// pair and any qdisc installed on it.
#[derive(Debug)]
pub struct LinkedPair {
    pub a: Namespace,
    pub b: Namespace,
    pub a_iface: String,
    pub b_iface: String,
    pub a_addr: Ipv4Addr,
    pub b_addr: Ipv4Addr,
}

impl LinkedPair {
    pub fn new(prefix: &str, base: Ipv4Addr) -> io::Result<Self> {
        let [o1, o2, o3, _] = base.octets();
        let a_addr = Ipv4Addr::new(o1, o2, o3, 1);
        let b_addr = Ipv4Addr::new(o1, o2, o3, 2);

        let a = Namespace::new(&format!("{prefix}_a"))?;
        let b = Namespace::new(&format!("{prefix}_b"))?;
        let a_iface = format!("{prefix}-a0");
        let b_iface = format!("{prefix}-b0");

        a.add_veth_link(
            &b,
            &a_iface,
            &b_iface,
            &format!("{a_addr}/24"),
            &format!("{b_addr}/24"),
        )?;

        Ok(Self {
            a,
            b,
            a_iface,
            b_iface,
            a_addr,
            b_addr,
        })
    }
}
