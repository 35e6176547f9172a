//! Status-capturing executor.
//!
//! Each step is bracketed by two control-library timestamps and the whole status
//! mapping is rewritten to disk once the step returns. A failing step is never
//! recorded, so the file always holds exactly the completed steps.

use crate::control::SmurfControl;
use crate::io::atomic_write;
use crate::model::{RunStatus, StepStatus};
use anyhow::{Context, Result};
use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct StatusRecorder {
    path: PathBuf,
    status: RunStatus,
}

impl StatusRecorder {
    pub fn new(path: PathBuf, band: u32) -> Self {
        Self {
            path,
            status: RunStatus::new(band),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    pub fn into_status(self) -> RunStatus {
        self.status
    }

    /// Record the subband list; it is written out with the next step.
    pub fn set_subband(&mut self, subband: Vec<u32>) {
        self.status.subband = Some(subband);
    }

    /// Run `op` under `label`, record its timing and output, then persist the mapping.
    pub async fn execute<C, F, Fut>(&mut self, control: &C, label: &str, op: F) -> Result<&StepStatus>
    where
        C: SmurfControl,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        tracing::info!(step = label, "starting");
        let start = control
            .timestamp()
            .await
            .with_context(|| format!("read start time for `{label}`"))?;
        let output = match op().await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(step = label, error = %format!("{e:#}"), "step failed");
                return Err(e.context(format!("step `{label}` failed")));
            }
        };
        let end = control
            .timestamp()
            .await
            .with_context(|| format!("read end time for `{label}`"))?;

        let elapsed = Duration::from_secs(u64::try_from(end - start).unwrap_or(0));
        tracing::info!(
            step = label,
            elapsed = %humantime::format_duration(elapsed),
            "finished"
        );

        self.status.record(StepStatus {
            name: label.to_owned(),
            start,
            end,
            output,
        });
        self.persist()?;

        self.status
            .get(label)
            .context("recorded step missing from status")
    }

    fn persist(&self) -> Result<()> {
        let data = serde_json::to_vec_pretty(&self.status).context("serialize status")?;
        atomic_write(&self.path, &data)
            .with_context(|| format!("write status {}", self.path.display()))
    }
}
