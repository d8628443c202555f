//! Timestamp campaign runner
//!
//! - Optionally rebuilds the `ts` measurement program (`--build`)
//! - Runs one campaign per selected axis over Linux network namespaces
//! - Writes `ts<Axis>TestResult.txt` reports

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ts_campaign::axis::ParameterAxis;
use ts_campaign::builder::local_hostname;
use ts_campaign::campaign::Campaign;
use ts_campaign::config::{parse_cmake_define, CampaignConfig, SshCredentials};
use ts_campaign::netns::{NetnsExecutor, NetnsProvisioner};
use ts_campaign::trial::TrialRunner;

/// Measure arrival time deltas and normalized arrival times under varying
/// padding size, loss rate and RTT.
#[derive(Parser, Debug)]
#[command(name = "ts-campaign", about = "Timestamp measurement campaign runner")]
struct Cli {
    /// Build the timestamp executable before measuring.
    #[arg(short, long, default_value_t = false)]
    build: bool,

    /// Source directory of the timestamp program (overrides the config file).
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// Extra cmake cache entry for --build as NAME=VALUE; may be repeated.
    #[arg(short = 'D', long = "cmake-define", value_name = "NAME=VALUE")]
    cmake_defines: Vec<String>,

    /// Axis to sweep; may be repeated (padMsgSize, loss, RTT).
    #[arg(short, long = "axis", default_value = "padMsgSize")]
    axes: Vec<ParameterAxis>,

    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Messages per trial (overrides the config file).
    #[arg(long)]
    message_count: Option<u32>,

    /// Directory reports are written into (overrides the config file).
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Read the SSH password from this file instead of the environment or
    /// an interactive prompt.
    #[arg(long)]
    password_file: Option<PathBuf>,

    /// Kill a remote command after this many seconds (0 waits forever).
    #[arg(long)]
    timeout_secs: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if !cfg!(unix) {
        anyhow::bail!("ts-campaign only runs on POSIX systems");
    }

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => CampaignConfig::from_file(path)?,
        None => CampaignConfig::default(),
    };
    if let Some(count) = cli.message_count {
        config.message_count = count;
    }
    if let Some(dir) = cli.report_dir {
        config.report_dir = dir;
    }
    if let Some(secs) = cli.timeout_secs {
        config.command_timeout = (secs > 0).then(|| std::time::Duration::from_secs(secs));
    }
    if let Some(dir) = cli.source_dir {
        config.build.source_dir = dir;
    }
    for define in &cli.cmake_defines {
        config.build.cmake_defines.push(parse_cmake_define(define)?);
    }

    tracing::info!(
        axes = ?cli.axes,
        message_count = config.message_count,
        report_dir = %config.report_dir.display(),
        "ts-campaign starting"
    );

    if cli.build {
        config
            .build_plan(&local_hostname())
            .run()
            .context("building the timestamp program")?;
    }

    let credentials = SshCredentials::load(
        &config.ssh,
        cli.password_file.as_deref(),
        ts_campaign::prompt::read_password,
    )?;
    if credentials.password.is_none() {
        tracing::warn!(
            env = %config.ssh.password_env,
            "no SSH password supplied, relying on key authentication"
        );
    }

    let runner = TrialRunner::new(
        NetnsProvisioner::new(&config.network),
        NetnsExecutor::new(credentials.clone(), config.command_timeout)?,
        config.trial_settings(&credentials),
    );
    let campaign = Campaign::new(runner, config.campaign_settings());

    let mut rng = rand::rng();
    for axis in cli.axes {
        let path = campaign
            .run(axis, &mut rng)
            .with_context(|| format!("campaign for {axis} failed"))?;
        println!("{}", path.display());
    }

    tracing::info!("ts-campaign finished");
    Ok(())
}
