//! Static HTML summary of a profiling run.
//!
//! The template directory is copied to `<data_dir>/summary` and placeholder tokens
//! in its `index.html` are replaced with strings computed from the status mapping,
//! the saved tuning and the plots directory. The page is rendered in memory before
//! anything is copied, so a failed report leaves no summary behind.

mod fragments;
mod plots;
mod template;

pub use template::tokens;

use crate::io::{atomic_write, copy_dir_new};
use crate::model::{RunStatus, TuningRecord, STATUS_FILE};
use anyhow::Result;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SUMMARY_DIR: &str = "summary";
pub const INDEX_FILE: &str = "index.html";
pub const OUTPUTS_DIR: &str = "outputs";
pub const PLOTS_DIR: &str = "plots";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report directory already exists: {0}")]
    DestinationExists(PathBuf),

    #[error("template directory not found: {0}")]
    MissingTemplate(PathBuf),

    #[error("status has no `{0}` step")]
    MissingStep(&'static str),

    #[error("tuning has no band {0}")]
    MissingBand(u32),

    #[error("`{step}` output is not {expected}")]
    UnexpectedOutput {
        step: &'static str,
        expected: &'static str,
    },

    #[error("no plot matching {pattern} in {dir}")]
    PlotNotFound { dir: PathBuf, pattern: String },

    #[error("plots matching {pattern} disagree on their name prefix: {candidates:?}")]
    AmbiguousPlot {
        pattern: String,
        candidates: Vec<String>,
    },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn step<'a>(
    status: &'a RunStatus,
    name: &'static str,
) -> Result<&'a crate::model::StepStatus, ReportError> {
    status.get(name).ok_or(ReportError::MissingStep(name))
}

/// Token/value pairs for the summary page, in substitution order.
pub fn substitutions(data_dir: &Path, status: &RunStatus) -> Result<Vec<(&'static str, String)>> {
    let band = status.band;
    let why = step(status, "why")?;
    let amplifier = step(status, "get_amplifier_bias")?;
    let full_band = step(status, "full_band_resp")?;
    let save_tune = step(status, "save_tune")?;

    let tune_path = save_tune
        .output
        .as_str()
        .map(PathBuf::from)
        .ok_or(ReportError::UnexpectedOutput {
            step: "save_tune",
            expected: "a tuning file path",
        })?;
    // A relative tuning path is taken relative to the run's data directory.
    let tune_path = data_dir.join(tune_path);
    let tuning = TuningRecord::load(&tune_path)?;
    let band_tuning = tuning
        .bands
        .get(&band)
        .ok_or(ReportError::MissingBand(band))?;

    let plots_dir = data_dir.join(PLOTS_DIR);
    let eta_prefix = plots::shared_prefix(&plots_dir, "eta", "res")?;
    let tracking_prefix = plots::shared_prefix(&plots_dir, "tracking", "_band")?;

    Ok(vec![
        (tokens::WHY, fragments::display_value(&why.output)),
        (tokens::DATETIME, fragments::date_string(why.start)?),
        (tokens::TIMING, fragments::timing_table(status)),
        (tokens::BAND, band.to_string()),
        (
            tokens::AMPLIFIER_BIAS,
            fragments::amplifier_table(&amplifier.output)?,
        ),
        (
            tokens::FULL_BAND_RESP,
            fragments::full_band_resp_path(&full_band.output, band)?,
        ),
        (tokens::FREQ_RESP_LIST, fragments::freq_resp_list(band_tuning)),
        (tokens::RES_DICT, fragments::res_dict(band_tuning)),
        (tokens::ETA_PATH, fragments::eta_path_expr(&eta_prefix)),
        (
            tokens::TRACKING_PATH,
            fragments::tracking_path_expr(&tracking_prefix, band),
        ),
    ])
}

/// Render the summary for the run stored in `data_dir` and return the page path.
///
/// Refuses to run when `<data_dir>/summary` already exists.
pub fn generate(data_dir: &Path, template_dir: &Path) -> Result<PathBuf> {
    let summary_dir = data_dir.join(SUMMARY_DIR);
    if summary_dir.exists() {
        return Err(ReportError::DestinationExists(summary_dir).into());
    }
    if !template_dir.is_dir() {
        return Err(ReportError::MissingTemplate(template_dir.to_path_buf()).into());
    }

    let status = RunStatus::load(&data_dir.join(OUTPUTS_DIR).join(STATUS_FILE))?;
    let subs = substitutions(data_dir, &status)?;

    let template_page = template_dir.join(INDEX_FILE);
    let page = std::fs::read_to_string(&template_page).map_err(|source| ReportError::Io {
        path: template_page.clone(),
        source,
    })?;
    let page = template::substitute(&page, &subs);

    copy_dir_new(template_dir, &summary_dir).map_err(|source| {
        if source.kind() == std::io::ErrorKind::AlreadyExists {
            ReportError::DestinationExists(summary_dir.clone())
        } else {
            ReportError::Io {
                path: summary_dir.clone(),
                source,
            }
        }
    })?;

    let index = summary_dir.join(INDEX_FILE);
    atomic_write(&index, page.as_bytes())?;

    tracing::info!(page = %index.display(), "summary report written");
    Ok(index)
}
