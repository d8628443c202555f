//! Out-of-tree cmake build of the measurement program.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{CampaignError, Result};

#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub source_dir: PathBuf,
    pub build_dir: PathBuf,
    pub jobs: usize,
    /// `NAME=VALUE` cache entries, rendered as `-DNAME=VALUE`.
    pub cmake_defines: Vec<String>,
}

/// Compiler overrides for hosts whose default toolchain lacks C++11.
pub fn host_defines(hostname: &str) -> Vec<String> {
    match hostname {
        "mininet-vm" => vec![
            "CMAKE_C_COMPILER=/usr/bin/gcc-5".into(),
            "CMAKE_CXX_COMPILER=/usr/bin/g++-5".into(),
        ],
        _ => Vec::new(),
    }
}

/// Name of the machine this runs on, empty when it cannot be read.
pub fn local_hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|name| name.trim().to_string())
        .unwrap_or_default()
}

impl BuildPlan {
    /// `./build` next to the sources, one job more than there are CPUs.
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        let source_dir = source_dir.into();
        let jobs = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            + 1;
        Self {
            build_dir: source_dir.join("build"),
            source_dir,
            jobs,
            cmake_defines: Vec::new(),
        }
    }

    pub fn cmake_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("-B{}", self.build_dir.display()),
            format!("-H{}", self.source_dir.display()),
        ];
        args.extend(self.cmake_defines.iter().map(|d| format!("-D{d}")));
        args
    }

    pub fn make_args(&self) -> Vec<String> {
        vec![
            "-j".into(),
            self.jobs.to_string(),
            "-C".into(),
            self.build_dir.display().to_string(),
            "install".into(),
        ]
    }

    /// Creates an empty build directory, clearing out a previous build.
    pub fn prepare(&self) -> Result<()> {
        let dir = &self.build_dir;
        if !dir.exists() {
            return fs::create_dir_all(dir).map_err(|e| io_failure(dir, e));
        }
        if !dir.is_dir() {
            return Err(CampaignError::Validation(format!(
                "{} exists and is not a directory",
                dir.display()
            )));
        }
        for entry in fs::read_dir(dir).map_err(|e| io_failure(dir, e))? {
            let path = entry.map_err(|e| io_failure(dir, e))?.path();
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            removed.map_err(|e| io_failure(&path, e))?;
        }
        Ok(())
    }

    pub fn run(&self) -> Result<()> {
        self.prepare()?;
        tracing::info!(build_dir = %self.build_dir.display(), jobs = self.jobs, "building measurement program");
        run_step("cmake", &self.cmake_args())?;
        run_step("make", &self.make_args())?;
        Ok(())
    }
}

fn io_failure(path: &Path, e: std::io::Error) -> CampaignError {
    CampaignError::Execution(format!("{}: {}", path.display(), e))
}

fn run_step(program: &str, args: &[String]) -> Result<()> {
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| CampaignError::Execution(format!("cannot run {program}: {e}")))?;
    if !status.success() {
        return Err(CampaignError::Execution(format!(
            "{program} {} failed with {status}",
            args.join(" ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_lines() {
        let mut plan = BuildPlan::new("/src/ts");
        plan.jobs = 5;
        plan.cmake_defines.push("CMAKE_CXX_COMPILER=/usr/bin/g++-5".into());
        assert_eq!(
            plan.cmake_args(),
            ["-B/src/ts/build", "-H/src/ts", "-DCMAKE_CXX_COMPILER=/usr/bin/g++-5"]
        );
        assert_eq!(plan.make_args(), ["-j", "5", "-C", "/src/ts/build", "install"]);
    }

    #[test]
    fn only_the_mininet_vm_gets_compiler_overrides() {
        assert_eq!(
            host_defines("mininet-vm"),
            [
                "CMAKE_C_COMPILER=/usr/bin/gcc-5",
                "CMAKE_CXX_COMPILER=/usr/bin/g++-5"
            ]
        );
        assert!(host_defines("mininet").is_empty());
    }

    #[test]
    fn prepare_clears_previous_build() {
        let dir = tempfile::tempdir().unwrap();
        let plan = BuildPlan::new(dir.path());
        fs::create_dir_all(plan.build_dir.join("CMakeFiles")).unwrap();
        fs::write(plan.build_dir.join("Makefile"), "all:\n").unwrap();

        plan.prepare().unwrap();
        assert!(plan.build_dir.is_dir());
        assert_eq!(fs::read_dir(&plan.build_dir).unwrap().count(), 0);
    }

    #[test]
    fn prepare_refuses_file_in_the_way() {
        let dir = tempfile::tempdir().unwrap();
        let plan = BuildPlan::new(dir.path());
        fs::write(&plan.build_dir, "").unwrap();
        assert!(matches!(plan.prepare(), Err(CampaignError::Validation(_))));
    }
}
