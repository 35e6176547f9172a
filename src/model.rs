use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name of the persisted status mapping inside the control output directory.
pub const STATUS_FILE: &str = "status.json";

/// Everything a profiling run needs, resolved from the command line and environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub epics_root: String,
    pub config_file: PathBuf,
    pub shelf_manager: String,
    pub band: u32,
    pub run_setup: bool,
    pub find_freq: bool,
    pub setup_notches: bool,
    /// Subbands handed to `find_freq`; recorded under `subband` when used.
    pub subbands: Vec<u32>,
    pub flux_ramp: FluxRamp,
    /// Program hosting the control library (see `control::bridge`).
    pub control_cmd: PathBuf,
    /// Leading arguments for `control_cmd`, e.g. the bridge script for an interpreter.
    #[serde(default)]
    pub control_args: Vec<String>,
    pub template_dir: PathBuf,
    pub make_report: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FluxRamp {
    pub reset_rate_khz: u32,
    pub n_phi0: f64,
}

/// One timed step: when it started, when it ended and what the control call returned.
#[derive(Debug, Clone, PartialEq)]
pub struct StepStatus {
    pub name: String,
    pub start: i64,
    pub end: i64,
    pub output: Value,
}

impl StepStatus {
    pub fn elapsed_secs(&self) -> i64 {
        self.end - self.start
    }
}

/// Status mapping for a run, persisted after every step.
///
/// On disk it is one JSON object: `band`, the optional `subband`, then one
/// `{"start", "end", "output"}` entry per step keyed by its label, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "StatusFile", try_from = "StatusFile")]
pub struct RunStatus {
    pub band: u32,
    pub subband: Option<Vec<u32>>,
    pub steps: Vec<StepStatus>,
}

#[derive(Serialize, Deserialize)]
struct StatusFile {
    band: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subband: Option<Vec<u32>>,
    #[serde(flatten)]
    steps: serde_json::Map<String, Value>,
}

#[derive(Serialize, Deserialize)]
struct StepRecord {
    start: i64,
    end: i64,
    #[serde(default)]
    output: Value,
}

impl From<RunStatus> for StatusFile {
    fn from(status: RunStatus) -> Self {
        let steps = status
            .steps
            .into_iter()
            .map(|s| {
                let record = serde_json::json!({
                    "start": s.start,
                    "end": s.end,
                    "output": s.output,
                });
                (s.name, record)
            })
            .collect();
        Self {
            band: status.band,
            subband: status.subband,
            steps,
        }
    }
}

impl TryFrom<StatusFile> for RunStatus {
    type Error = serde_json::Error;

    fn try_from(file: StatusFile) -> Result<Self, Self::Error> {
        let steps = file
            .steps
            .into_iter()
            .map(|(name, v)| {
                let r: StepRecord = serde_json::from_value(v)?;
                Ok(StepStatus {
                    name,
                    start: r.start,
                    end: r.end,
                    output: r.output,
                })
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()?;
        Ok(Self {
            band: file.band,
            subband: file.subband,
            steps,
        })
    }
}

impl RunStatus {
    pub fn new(band: u32) -> Self {
        Self {
            band,
            subband: None,
            steps: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&StepStatus> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Insert a step record. A label seen before keeps its position and takes the new record.
    pub fn record(&mut self, step: StepStatus) {
        match self.steps.iter_mut().find(|s| s.name == step.name) {
            Some(existing) => *existing = step,
            None => self.steps.push(step),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data =
            std::fs::read(path).with_context(|| format!("read status {}", path.display()))?;
        serde_json::from_slice(&data).with_context(|| format!("parse status {}", path.display()))
    }
}

/// Tuning result saved by the control library: band, then resonance index.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct TuningRecord {
    pub bands: BTreeMap<u32, BandTuning>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BandTuning {
    #[serde(default)]
    pub resonances: BTreeMap<u32, Resonance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Resonance {
    /// Resonance frequency in MHz.
    pub freq: f64,
    /// Assigned readout channel, negative when unassigned.
    pub channel: i64,
}

impl TuningRecord {
    pub fn load(path: &Path) -> Result<Self> {
        let data =
            std::fs::read(path).with_context(|| format!("read tuning {}", path.display()))?;
        serde_json::from_slice(&data).with_context(|| format!("parse tuning {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(name: &str, start: i64, end: i64) -> StepStatus {
        StepStatus {
            name: name.into(),
            start,
            end,
            output: Value::Null,
        }
    }

    #[test]
    fn record_keeps_execution_order() {
        let mut status = RunStatus::new(3);
        status.record(step("why", 10, 11));
        status.record(step("setup", 11, 20));
        status.record(step("why", 30, 31));

        let names: Vec<_> = status.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["why", "setup"]);
        assert_eq!(status.get("why").unwrap().start, 30);
        assert_eq!(status.get("setup").unwrap().elapsed_secs(), 9);
    }

    #[test]
    fn subband_is_omitted_until_set() {
        let status = RunStatus::new(2);
        let v = serde_json::to_value(&status).unwrap();
        assert_eq!(v, json!({"band": 2}));
    }

    #[test]
    fn status_file_is_keyed_by_step_label() {
        let mut status = RunStatus::new(2);
        status.subband = Some(vec![10, 11]);
        status.record(StepStatus {
            name: "why".into(),
            start: 1583352819,
            end: 1583352820,
            output: json!("cooldown"),
        });
        status.record(step("setup", 1583352820, 1583352884));

        let raw = serde_json::to_string(&status).unwrap();
        let v: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["band"], 2);
        assert_eq!(v["subband"], json!([10, 11]));
        assert_eq!(
            v["why"],
            json!({"start": 1583352819, "end": 1583352820, "output": "cooldown"})
        );
        assert_eq!(v["setup"]["end"], 1583352884);

        let keys: Vec<_> = v.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["band", "subband", "why", "setup"]);

        let back: RunStatus = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn malformed_step_entry_is_rejected() {
        let raw = json!({"band": 2, "why": {"start": "soon"}});
        assert!(serde_json::from_value::<RunStatus>(raw).is_err());
    }

    #[test]
    fn tuning_record_parses_string_keys() {
        let raw = json!({
            "3": {
                "resonances": {
                    "0": {"freq": 5012.25, "channel": 7, "drive": 12},
                    "12": {"freq": 5020.5, "channel": -1}
                },
                "lms_freq_hz": 12000.0
            }
        });
        let tn: TuningRecord = serde_json::from_value(raw).unwrap();
        let res = &tn.bands[&3].resonances;
        assert_eq!(res.len(), 2);
        assert_eq!(res[&0].channel, 7);
        assert_eq!(res[&12].channel, -1);
        assert!((res[&12].freq - 5020.5).abs() < f64::EPSILON);
    }
}
