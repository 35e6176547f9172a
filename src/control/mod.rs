//! Seam to the SMURF control library.
//!
//! The control library owns every hardware and physics operation. This crate only
//! names the operations ([`ControlOp`]), sends them through [`SmurfControl`] and keeps
//! whatever comes back as an opaque JSON value.

mod bridge;
#[cfg(test)]
pub(crate) mod fake;

pub use bridge::{BridgeControl, BridgeError};

use crate::model::FluxRamp;
use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

/// Operations understood by the control library, serialized as `{"op": .., "args": {..}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", content = "args", rename_all = "snake_case")]
pub enum ControlOp {
    Why,
    Setup,
    SetAmplifierBias {
        write_log: bool,
    },
    SetCryoCardPsEn {
        write_log: bool,
    },
    GetAmplifierBias,
    FullBandResp {
        band: u32,
        make_plot: bool,
        save_plot: bool,
        show_plot: bool,
        return_plot_path: bool,
    },
    FindFreq {
        band: u32,
        subband: Vec<u32>,
        make_plot: bool,
        save_plot: bool,
    },
    SetupNotches {
        band: u32,
        new_master_assignment: bool,
    },
    PlotTuneSummary {
        band: u32,
        eta_scan: bool,
        show_plot: bool,
        save_plot: bool,
    },
    RunSerialGradientDescent {
        band: u32,
    },
    RunSerialEtaScan {
        band: u32,
    },
    WhichOn {
        band: u32,
    },
    TrackingSetup(TrackingSetup),
    CheckLock {
        band: u32,
    },
    IdentifyBiasGroups {
        bias_groups: Vec<u32>,
        make_plot: bool,
        show_plot: bool,
        save_plot: bool,
        update_channel_assignment: bool,
    },
    SaveTune,
    GetTimestamp {
        as_int: bool,
    },
    OutputDir,
}

impl ControlOp {
    /// Wire name of the operation.
    pub fn name(&self) -> &'static str {
        match self {
            ControlOp::Why => "why",
            ControlOp::Setup => "setup",
            ControlOp::SetAmplifierBias { .. } => "set_amplifier_bias",
            ControlOp::SetCryoCardPsEn { .. } => "set_cryo_card_ps_en",
            ControlOp::GetAmplifierBias => "get_amplifier_bias",
            ControlOp::FullBandResp { .. } => "full_band_resp",
            ControlOp::FindFreq { .. } => "find_freq",
            ControlOp::SetupNotches { .. } => "setup_notches",
            ControlOp::PlotTuneSummary { .. } => "plot_tune_summary",
            ControlOp::RunSerialGradientDescent { .. } => "run_serial_gradient_descent",
            ControlOp::RunSerialEtaScan { .. } => "run_serial_eta_scan",
            ControlOp::WhichOn { .. } => "which_on",
            ControlOp::TrackingSetup(_) => "tracking_setup",
            ControlOp::CheckLock { .. } => "check_lock",
            ControlOp::IdentifyBiasGroups { .. } => "identify_bias_groups",
            ControlOp::SaveTune => "save_tune",
            ControlOp::GetTimestamp { .. } => "get_timestamp",
            ControlOp::OutputDir => "output_dir",
        }
    }
}

/// Arguments for flux-ramp tracking setup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingSetup {
    pub band: u32,
    pub channel: Vec<i64>,
    pub reset_rate_khz: u32,
    pub fraction_full_scale: f64,
    pub make_plot: bool,
    pub show_plot: bool,
    pub nsamp: u32,
    pub lms_gain: u32,
    pub lms_freq_hz: Option<f64>,
    pub meas_lms_freq: bool,
    pub meas_flux_ramp_amp: bool,
    pub n_phi0: f64,
    pub feedback_start_frac: f64,
    pub feedback_end_frac: f64,
}

impl TrackingSetup {
    /// Tracking parameters used when profiling a band.
    pub fn for_profile(band: u32, channel: Vec<i64>, flux_ramp: FluxRamp) -> Self {
        Self {
            band,
            channel,
            reset_rate_khz: flux_ramp.reset_rate_khz,
            fraction_full_scale: 0.5,
            make_plot: true,
            show_plot: false,
            nsamp: 1 << 18,
            lms_gain: 8,
            lms_freq_hz: None,
            meas_lms_freq: false,
            meas_flux_ramp_amp: true,
            n_phi0: flux_ramp.n_phi0,
            feedback_start_frac: 0.2,
            feedback_end_frac: 0.98,
        }
    }
}

/// A live control-library instance.
///
/// Calls are awaited one at a time; a call that never returns stalls the run.
pub trait SmurfControl {
    /// Run one operation and return its result untouched.
    async fn call(&self, op: &ControlOp) -> Result<Value>;

    /// Integer-second timestamp from the control library's clock.
    async fn timestamp(&self) -> Result<i64> {
        let v = self.call(&ControlOp::GetTimestamp { as_int: true }).await?;
        v.as_i64()
            .ok_or_else(|| anyhow!("get_timestamp returned a non-integer value: {v}"))
    }

    /// Directory the control library writes its outputs to.
    async fn output_dir(&self) -> Result<PathBuf> {
        let v = self.call(&ControlOp::OutputDir).await?;
        v.as_str()
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("output_dir returned a non-string value: {v}"))
    }
}
