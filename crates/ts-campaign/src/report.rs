//! Text report of a sampled campaign.
//!
//! Layout, one report per axis:
//!
//! ```text
//! padMsgSize
//! Deltas|[12,5]|[97,6]|...|
//! Normalized|[3,10]|[40,11]|...|
//! ```
//!
//! Each row carries eight `[index,value]|` tokens per axis value, in axis
//! order.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::campaign::CampaignResult;
use crate::error::{CampaignError, Result};
use crate::parser::Channel;

pub fn report_path(dir: &Path, result: &CampaignResult) -> PathBuf {
    dir.join(result.axis.report_file_name())
}

pub fn render_report(result: &CampaignResult) -> Result<String> {
    if result.trials.is_empty() {
        return Err(CampaignError::Validation(format!(
            "campaign for {} has no results to report",
            result.axis
        )));
    }

    let mut out = String::new();
    out.push_str(result.axis.id());
    out.push('\n');

    for channel in Channel::ALL {
        out.push_str(channel.tag());
        out.push('|');
        for trial in &result.trials {
            for (idx, value) in trial.sampled(channel)? {
                // writing into a String cannot fail
                let _ = write!(out, "[{idx},{value}]|");
            }
        }
        out.push('\n');
    }

    Ok(out)
}

/// Writes the report into `dir`, replacing any earlier report for the
/// same axis. Nothing is written if rendering fails.
pub fn write_report(dir: &Path, result: &CampaignResult) -> Result<PathBuf> {
    let body = render_report(result)?;
    let path = report_path(dir, result);

    fs::create_dir_all(dir).map_err(|source| CampaignError::ReportWrite {
        path: dir.to_path_buf(),
        source,
    })?;
    fs::write(&path, body).map_err(|source| CampaignError::ReportWrite {
        path: path.clone(),
        source,
    })?;

    Ok(path)
}
