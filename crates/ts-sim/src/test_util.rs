//! Helpers for tests that need real namespaces.

use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::topology::{privileged_command, running_as_root};

static NEXT_ID: AtomicU32 = AtomicU32::new(0);

fn succeeds(cmd: &mut Command) -> bool {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

/// True when namespace tests can run here: `ip` is installed and either
/// this process is root or `sudo` works without a password prompt.
pub fn check_privileges() -> bool {
    if !running_as_root() && !succeeds(Command::new("sudo").args(["-n", "true"])) {
        return false;
    }
    succeeds(privileged_command("ip", &[]).args(["netns", "list"]))
}

/// Short, process-unique namespace prefix built from a stem of at most
/// four characters, so derived interface names (`<prefix>-a0`) stay under
/// the 15 byte limit.
pub fn unique_prefix(stem: &str) -> String {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed) & 0xfff;
    let pid = std::process::id() & 0xfff;
    let stem = &stem[..stem.len().min(4)];
    format!("{stem}{pid:03x}{id:x}")
}
