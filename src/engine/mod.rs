mod plan;
mod recorder;

pub use plan::{plan, subbands, Step};
pub use recorder::StatusRecorder;

use crate::control::{ControlOp, SmurfControl};
use crate::model::{RunConfig, RunStatus, STATUS_FILE};
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// What a completed run leaves behind.
#[derive(Debug)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub status_path: PathBuf,
    /// Parent of the control output directory; holds `outputs/` and `plots/`.
    pub data_dir: PathBuf,
}

/// Drives the control library through the profiling sequence.
pub struct ProfileEngine {
    cfg: RunConfig,
}

impl ProfileEngine {
    pub fn new(cfg: RunConfig) -> Self {
        Self { cfg }
    }

    /// Execute every planned step in order, stopping at the first failure.
    ///
    /// The status file under `output_dir` is rewritten after each step.
    pub async fn run<C: SmurfControl>(&self, control: &C, output_dir: &Path) -> Result<RunOutcome> {
        let data_dir = output_dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| anyhow!("output directory {} has no parent", output_dir.display()))?
            .to_path_buf();

        let steps = plan(&self.cfg);
        tracing::info!(band = self.cfg.band, steps = steps.len(), "profiling band");

        let mut recorder = StatusRecorder::new(output_dir.join(STATUS_FILE), self.cfg.band);
        for step in steps {
            let mut channels = Vec::new();
            match step {
                Step::FindFreq => recorder.set_subband(self.cfg.subbands.clone()),
                Step::TrackingSetup => channels = self.enabled_channels(control).await?,
                _ => {}
            }
            let op = step.op(&self.cfg, &channels);
            recorder
                .execute(control, step.label(), || control.call(&op))
                .await?;
        }

        let status_path = recorder.path().to_path_buf();
        tracing::info!(
            steps = recorder.status().steps.len(),
            status = %status_path.display(),
            "profiling complete"
        );
        Ok(RunOutcome {
            status: recorder.into_status(),
            status_path,
            data_dir,
        })
    }

    async fn enabled_channels<C: SmurfControl>(&self, control: &C) -> Result<Vec<i64>> {
        let v = control
            .call(&ControlOp::WhichOn {
                band: self.cfg.band,
            })
            .await
            .context("list enabled channels")?;
        let channels = match &v {
            Value::Array(items) => items.iter().map(Value::as_i64).collect::<Option<Vec<_>>>(),
            _ => None,
        };
        let channels =
            channels.ok_or_else(|| anyhow!("which_on returned a non-channel list: {v}"))?;
        tracing::debug!(count = channels.len(), "enabled channels");
        Ok(channels)
    }
}
