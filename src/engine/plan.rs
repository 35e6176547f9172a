use crate::control::{ControlOp, TrackingSetup};
use crate::model::RunConfig;

/// Subbands searched by `find_freq` unless overridden.
pub const DEFAULT_SUBBANDS: std::ops::Range<u32> = 10..120;

/// Bias groups probed during identification.
pub const BIAS_GROUPS: std::ops::Range<u32> = 0..8;

/// A recorded step of the profiling run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Why,
    Setup,
    SetAmplifierBias,
    AmplifierEnable,
    GetAmplifierBias,
    FullBandResp,
    FindFreq,
    SetupNotches,
    PlotTuneSummary,
    SerialGradientDescent,
    SerialEtaScan,
    TrackingSetup,
    CheckLock,
    IdentifyBiasGroups,
    SaveTune,
}

impl Step {
    /// Key the step is recorded under in the status mapping.
    pub fn label(self) -> &'static str {
        match self {
            Step::Why => "why",
            Step::Setup => "setup",
            Step::SetAmplifierBias => "set_amplifier_bias",
            Step::AmplifierEnable => "amplifier_enable",
            Step::GetAmplifierBias => "get_amplifier_bias",
            Step::FullBandResp => "full_band_resp",
            Step::FindFreq => "find_freq",
            Step::SetupNotches => "setup_notches",
            Step::PlotTuneSummary => "plot_tune_summary",
            Step::SerialGradientDescent => "serial_gradient_descent",
            Step::SerialEtaScan => "serial_eta_scan",
            Step::TrackingSetup => "tracking_setup",
            Step::CheckLock => "check_lock",
            Step::IdentifyBiasGroups => "identify_bias_groups",
            Step::SaveTune => "save_tune",
        }
    }

    /// Control operation for this step. `channels` is only read by tracking setup.
    pub fn op(self, cfg: &RunConfig, channels: &[i64]) -> ControlOp {
        let band = cfg.band;
        match self {
            Step::Why => ControlOp::Why,
            Step::Setup => ControlOp::Setup,
            Step::SetAmplifierBias => ControlOp::SetAmplifierBias { write_log: true },
            Step::AmplifierEnable => ControlOp::SetCryoCardPsEn { write_log: true },
            Step::GetAmplifierBias => ControlOp::GetAmplifierBias,
            Step::FullBandResp => ControlOp::FullBandResp {
                band,
                make_plot: true,
                save_plot: true,
                show_plot: false,
                return_plot_path: true,
            },
            Step::FindFreq => ControlOp::FindFreq {
                band,
                subband: cfg.subbands.clone(),
                make_plot: true,
                save_plot: true,
            },
            Step::SetupNotches => ControlOp::SetupNotches {
                band,
                new_master_assignment: true,
            },
            Step::PlotTuneSummary => ControlOp::PlotTuneSummary {
                band,
                eta_scan: true,
                show_plot: false,
                save_plot: true,
            },
            Step::SerialGradientDescent => ControlOp::RunSerialGradientDescent { band },
            Step::SerialEtaScan => ControlOp::RunSerialEtaScan { band },
            Step::TrackingSetup => ControlOp::TrackingSetup(TrackingSetup::for_profile(
                band,
                channels.to_vec(),
                cfg.flux_ramp,
            )),
            Step::CheckLock => ControlOp::CheckLock { band },
            Step::IdentifyBiasGroups => ControlOp::IdentifyBiasGroups {
                bias_groups: BIAS_GROUPS.collect(),
                make_plot: true,
                show_plot: false,
                save_plot: true,
                update_channel_assignment: true,
            },
            Step::SaveTune => ControlOp::SaveTune,
        }
    }
}

/// The fixed step sequence, with optional steps decided by the run flags.
pub fn plan(cfg: &RunConfig) -> Vec<Step> {
    let mut steps = vec![Step::Why];
    if cfg.run_setup {
        steps.push(Step::Setup);
    }
    steps.extend([
        Step::SetAmplifierBias,
        Step::AmplifierEnable,
        Step::GetAmplifierBias,
        Step::FullBandResp,
    ]);
    if cfg.find_freq {
        steps.push(Step::FindFreq);
    }
    if cfg.setup_notches {
        steps.extend([Step::SetupNotches, Step::PlotTuneSummary]);
    }
    steps.extend([
        Step::SerialGradientDescent,
        Step::SerialEtaScan,
        Step::TrackingSetup,
        Step::CheckLock,
        Step::IdentifyBiasGroups,
        Step::SaveTune,
    ]);
    steps
}

/// Subband list for `find_freq`: `low..high` when both bounds are given.
pub fn subbands(low: Option<u32>, high: Option<u32>) -> Vec<u32> {
    match (low, high) {
        (Some(low), Some(high)) => (low..high).collect(),
        _ => DEFAULT_SUBBANDS.collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::test_config;

    fn labels(cfg: &RunConfig) -> Vec<&'static str> {
        plan(cfg).into_iter().map(Step::label).collect()
    }

    #[test]
    fn default_plan_runs_everything_but_setup() {
        let cfg = test_config("/tmp/unused".into());
        assert_eq!(
            labels(&cfg),
            [
                "why",
                "set_amplifier_bias",
                "amplifier_enable",
                "get_amplifier_bias",
                "full_band_resp",
                "find_freq",
                "setup_notches",
                "plot_tune_summary",
                "serial_gradient_descent",
                "serial_eta_scan",
                "tracking_setup",
                "check_lock",
                "identify_bias_groups",
                "save_tune",
            ]
        );
    }

    #[test]
    fn skip_flags_remove_steps() {
        let mut cfg = test_config("/tmp/unused".into());
        cfg.run_setup = true;
        cfg.find_freq = false;
        cfg.setup_notches = false;
        let labels = labels(&cfg);
        assert_eq!(labels[1], "setup");
        assert!(!labels.contains(&"find_freq"));
        assert!(!labels.contains(&"setup_notches"));
        assert!(!labels.contains(&"plot_tune_summary"));
        assert_eq!(labels.len(), 12);
    }

    #[test]
    fn subband_override_needs_both_bounds() {
        assert_eq!(subbands(Some(20), Some(24)), vec![20, 21, 22, 23]);
        let default = subbands(Some(20), None);
        assert_eq!(default.first(), Some(&10));
        assert_eq!(default.last(), Some(&119));
        assert_eq!(default.len(), 110);
    }

    #[test]
    fn full_band_sweep_uses_configured_band() {
        let mut cfg = test_config("/tmp/unused".into());
        cfg.band = 5;
        match Step::FullBandResp.op(&cfg, &[]) {
            ControlOp::FullBandResp {
                band,
                return_plot_path,
                ..
            } => {
                assert_eq!(band, 5);
                assert!(return_plot_path);
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn amplifier_enable_drives_cryo_card_supply() {
        let cfg = test_config("/tmp/unused".into());
        assert_eq!(
            Step::AmplifierEnable.op(&cfg, &[]),
            ControlOp::SetCryoCardPsEn { write_log: true }
        );
    }
}
