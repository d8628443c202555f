use crate::topology::Namespace;
use std::io;

/// Network impairment parameters applied via `tc netem`.
///
/// All fields are optional; only non-`None` parameters are passed to netem.
/// If all fields are `None`, any existing qdisc is removed (clearing impairments).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImpairmentConfig {
    /// One-way delay added on egress.
    pub delay_ms: Option<u32>,
    pub loss_percent: Option<f64>,
    /// Override the netem queue `limit` (in packets).
    pub netem_limit: Option<u64>,
}

impl ImpairmentConfig {
    pub fn is_empty(&self) -> bool {
        self.delay_ms.is_none() && self.loss_percent.is_none()
    }
}

/// Builds the argument list for `tc qdisc add dev <iface> root netem ...`.
pub fn netem_args(interface: &str, config: &ImpairmentConfig) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "qdisc".into(),
        "add".into(),
        "dev".into(),
        interface.into(),
        "root".into(),
        "netem".into(),
    ];

    if let Some(lim) = config.netem_limit {
        args.push("limit".into());
        args.push(lim.to_string());
    }

    if let Some(delay) = config.delay_ms {
        args.push("delay".into());
        args.push(format!("{}ms", delay));
    }

    if let Some(loss) = config.loss_percent {
        args.push("loss".into());
        args.push(format!("{}%", loss));
    }

    args
}

/// Applies network impairment to an interface inside a namespace using `tc netem`.
///
/// Removes any existing root qdisc first, then installs netem with the
/// specified delay and loss parameters.
pub fn apply_impairment(ns: &Namespace, interface: &str, config: &ImpairmentConfig) -> io::Result<()> {
    // Remove existing qdisc (best effort) to ensure clean state or update
    let _ = ns.exec("tc", &["qdisc", "del", "dev", interface, "root"]);

    if config.is_empty() {
        return Ok(());
    }

    let args_storage = netem_args(interface, config);
    let args: Vec<&str> = args_storage.iter().map(|s| s.as_str()).collect();
    let output = ns.exec("tc", &args)?;
    if !output.status.success() {
        return Err(io::Error::other(format!(
            "Failed to apply tc netem: {}\nCommand: tc {}",
            String::from_utf8_lossy(&output.stderr),
            args.join(" ")
        )));
    }

    tracing::debug!(ns = %ns.name, interface, command = %args.join(" "), "netem applied");
    Ok(())
}
