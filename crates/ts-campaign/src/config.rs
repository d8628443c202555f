use std::fmt;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::builder::{host_defines, BuildPlan};
use crate::campaign::{CampaignSettings, DEFAULT_MESSAGE_COUNT};
use crate::error::{CampaignError, Result};
use crate::trial::TrialSettings;

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CampaignConfigInput {
    pub version: u32,
    pub message_count: Option<u32>,
    pub repetitions: Option<u32>,
    pub report_dir: Option<PathBuf>,
    pub ts_binary: Option<String>,
    pub command_timeout_secs: Option<u64>,
    pub connectivity_check: Option<bool>,
    pub ssh: SshConfigInput,
    pub network: NetworkConfigInput,
    pub build: BuildConfigInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SshConfigInput {
    pub user: Option<String>,
    pub sshd_path: Option<String>,
    pub password_env: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NetworkConfigInput {
    pub namespace_prefix: Option<String>,
    /// First three octets, e.g. `"10.77.0"`.
    pub subnet: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BuildConfigInput {
    pub source_dir: Option<PathBuf>,
    /// `NAME=VALUE` cache entries, passed to cmake as `-DNAME=VALUE`.
    pub cmake_defines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfig {
    pub user: String,
    pub sshd_path: String,
    /// Environment variable the SSH password is read from.
    pub password_env: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: "mininet".into(),
            sshd_path: "/usr/sbin/sshd".into(),
            password_env: "TS_SSH_PASSWORD".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Prefix for namespace and interface names; at most 10 characters.
    pub namespace_prefix: String,
    /// Network address of the /24 the two endpoints are addressed from.
    pub subnet: Ipv4Addr,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            namespace_prefix: "tsc".into(),
            subnet: Ipv4Addr::new(10, 77, 0, 0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    pub source_dir: PathBuf,
    /// `NAME=VALUE` pairs.
    pub cmake_defines: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("."),
            cmake_defines: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CampaignConfig {
    pub version: u32,
    pub message_count: u32,
    pub repetitions: u32,
    pub report_dir: PathBuf,
    pub ts_binary: String,
    /// `None` waits for the remote command indefinitely.
    pub command_timeout: Option<Duration>,
    pub connectivity_check: bool,
    pub ssh: SshConfig,
    pub network: NetworkConfig,
    pub build: BuildConfig,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            message_count: DEFAULT_MESSAGE_COUNT,
            repetitions: 1,
            report_dir: PathBuf::from("."),
            ts_binary: "ts".into(),
            command_timeout: None,
            connectivity_check: true,
            ssh: SshConfig::default(),
            network: NetworkConfig::default(),
            build: BuildConfig::default(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_subnet(subnet: &str) -> Result<Ipv4Addr> {
    let invalid = || {
        CampaignError::Validation(format!(
            "invalid subnet '{subnet}', expected three octets like 10.77.0"
        ))
    };
    let octets: Vec<u8> = subnet
        .split('.')
        .map(|o| o.parse::<u8>().map_err(|_| invalid()))
        .collect::<Result<_>>()?;
    match octets[..] {
        [a, b, c] => Ok(Ipv4Addr::new(a, b, c, 0)),
        _ => Err(invalid()),
    }
}

/// Accepts `NAME=VALUE` with or without a leading `-D`.
pub fn parse_cmake_define(define: &str) -> Result<String> {
    let define = define.trim();
    let define = define.strip_prefix("-D").unwrap_or(define);
    match define.split_once('=') {
        Some((name, _)) if !name.is_empty() && !name.contains(char::is_whitespace) => {
            Ok(define.to_string())
        }
        _ => Err(CampaignError::Validation(format!(
            "cmake define '{define}' must look like NAME=VALUE"
        ))),
    }
}

impl CampaignConfigInput {
    pub fn resolve(self) -> Result<CampaignConfig> {
        let defaults = CampaignConfig::default();
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(CampaignError::Validation(format!(
                "unsupported config version {}",
                version
            )));
        }

        let repetitions = self.repetitions.unwrap_or(defaults.repetitions);
        if repetitions == 0 {
            return Err(CampaignError::Validation(
                "repetitions must be at least 1".into(),
            ));
        }

        let namespace_prefix = non_empty(self.network.namespace_prefix)
            .unwrap_or(defaults.network.namespace_prefix);
        if namespace_prefix.len() > 10
            || !namespace_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric())
        {
            return Err(CampaignError::Validation(format!(
                "namespace prefix '{namespace_prefix}' must be at most 10 alphanumeric characters"
            )));
        }

        let subnet = match non_empty(self.network.subnet) {
            Some(subnet) => parse_subnet(&subnet)?,
            None => defaults.network.subnet,
        };

        let cmake_defines = self
            .build
            .cmake_defines
            .iter()
            .map(|d| parse_cmake_define(d))
            .collect::<Result<Vec<_>>>()?;

        Ok(CampaignConfig {
            version,
            message_count: self.message_count.unwrap_or(defaults.message_count),
            repetitions,
            report_dir: self.report_dir.unwrap_or(defaults.report_dir),
            ts_binary: non_empty(self.ts_binary).unwrap_or(defaults.ts_binary),
            command_timeout: self
                .command_timeout_secs
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs),
            connectivity_check: self
                .connectivity_check
                .unwrap_or(defaults.connectivity_check),
            ssh: SshConfig {
                user: non_empty(self.ssh.user).unwrap_or(defaults.ssh.user),
                sshd_path: non_empty(self.ssh.sshd_path).unwrap_or(defaults.ssh.sshd_path),
                password_env: non_empty(self.ssh.password_env)
                    .unwrap_or(defaults.ssh.password_env),
            },
            network: NetworkConfig {
                namespace_prefix,
                subnet,
            },
            build: BuildConfig {
                source_dir: self.build.source_dir.unwrap_or(defaults.build.source_dir),
                cmake_defines,
            },
        })
    }
}

impl CampaignConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Ok(CampaignConfig::default());
        }
        let parsed: CampaignConfigInput = toml::from_str(input)
            .map_err(|e| CampaignError::Validation(format!("invalid config TOML: {}", e)))?;
        parsed.resolve()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let input = std::fs::read_to_string(path).map_err(|e| {
            CampaignError::Validation(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&input)
    }

    pub fn campaign_settings(&self) -> CampaignSettings {
        CampaignSettings {
            message_count: self.message_count,
            repetitions: self.repetitions,
            report_dir: self.report_dir.clone(),
        }
    }

    /// Build plan for `--build`: host specific compiler defines first, then
    /// the configured ones, so configuration wins on conflicts.
    pub fn build_plan(&self, hostname: &str) -> BuildPlan {
        let mut plan = BuildPlan::new(&self.build.source_dir);
        plan.cmake_defines = host_defines(hostname);
        plan.cmake_defines
            .extend(self.build.cmake_defines.iter().cloned());
        plan
    }

    pub fn trial_settings(&self, credentials: &SshCredentials) -> TrialSettings {
        TrialSettings {
            ts_binary: self.ts_binary.clone(),
            ssh_user: credentials.user.clone(),
            sshd_path: self.ssh.sshd_path.clone(),
            password_auth: credentials.password.is_some(),
            connectivity_check: self.connectivity_check,
        }
    }
}

/// Authentication material handed to the remote executor.
///
/// Without a password the executor relies on key based ssh.
#[derive(Clone, PartialEq, Eq)]
pub struct SshCredentials {
    pub user: String,
    pub password: Option<String>,
}

impl fmt::Debug for SshCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshCredentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl SshCredentials {
    /// Reads the password from the environment variable named in `ssh`.
    pub fn from_env(ssh: &SshConfig) -> Self {
        Self {
            user: ssh.user.clone(),
            password: std::env::var(&ssh.password_env)
                .ok()
                .filter(|p| !p.is_empty()),
        }
    }

    /// Resolves credentials from, in order: `password_file`, the configured
    /// environment variable, then `ask`. An empty answer from `ask` selects
    /// key based authentication.
    pub fn load(
        ssh: &SshConfig,
        password_file: Option<&Path>,
        ask: impl FnOnce(&str) -> io::Result<String>,
    ) -> Result<Self> {
        if let Some(path) = password_file {
            return Self::from_file(ssh, path);
        }
        let from_env = Self::from_env(ssh);
        if from_env.password.is_some() {
            return Ok(from_env);
        }

        let prompt = format!("SSH password for {} on the measurement hosts: ", ssh.user);
        let answer = ask(&prompt)
            .map_err(|e| CampaignError::Validation(format!("cannot read SSH password: {e}")))?;
        Ok(Self {
            user: ssh.user.clone(),
            password: Some(answer).filter(|p| !p.is_empty()),
        })
    }

    /// Reads the password from the first line of `path`.
    pub fn from_file(ssh: &SshConfig, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CampaignError::Validation(format!(
                "cannot read password file {}: {}",
                path.display(),
                e
            ))
        })?;
        let password = content.lines().next().unwrap_or_default().to_string();
        if password.is_empty() {
            return Err(CampaignError::Validation(format!(
                "password file {} is empty",
                path.display()
            )));
        }
        Ok(Self {
            user: ssh.user.clone(),
            password: Some(password),
        })
    }
}
