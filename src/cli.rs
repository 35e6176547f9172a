use crate::control::{BridgeControl, SmurfControl};
use crate::engine::{self, ProfileEngine};
use crate::model::{FluxRamp, RunConfig};
use crate::report;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser, Clone)]
#[command(
    name = "smurf-profile",
    version,
    about = "Profile one SMURF band: bias, sweep, tune, track, then write an HTML summary"
)]
pub struct Cli {
    /// The epics root of the SMURF server
    #[arg(long, required_unless_present = "report_only")]
    pub epics_root: Option<String>,

    /// The configuration file handed to the control library
    #[arg(long, required_unless_present = "report_only")]
    pub config_file: Option<PathBuf>,

    /// The shelf manager root
    #[arg(long, required_unless_present = "report_only")]
    pub shelf_manager: Option<String>,

    /// The band to run the analysis on
    #[arg(long, required_unless_present = "report_only")]
    pub band: Option<u32>,

    /// Run the control library's setup step first
    #[arg(long)]
    pub setup: bool,

    /// Flux ramp reset rate in kHz
    #[arg(long, default_value_t = 4)]
    pub reset_rate_khz: u32,

    /// Number of phi0 per flux ramp
    #[arg(long, default_value_t = 4.0)]
    pub n_phi0: f64,

    /// Skip the find_freq step
    #[arg(long)]
    pub no_find_freq: bool,

    /// Skip setup_notches and its tune summary plot
    #[arg(long)]
    pub no_setup_notches: bool,

    /// First subband searched by find_freq (needs --subband-high)
    #[arg(long)]
    pub subband_low: Option<u32>,

    /// End (exclusive) of the subbands searched by find_freq (needs --subband-low)
    #[arg(long)]
    pub subband_high: Option<u32>,

    /// Program hosting the control library
    #[arg(long, env = "SMURF_CONTROL_CMD", default_value = "smurf-control-bridge")]
    pub control_cmd: PathBuf,

    /// Leading argument for the control program (repeatable), e.g. a bridge script
    #[arg(long = "control-arg", value_name = "ARG")]
    pub control_args: Vec<String>,

    /// Summary page template directory
    #[arg(long, env = "SMURF_REPORT_TEMPLATE")]
    pub template_dir: Option<PathBuf>,

    /// Do not write the HTML summary after the run
    #[arg(long, conflicts_with = "report_only")]
    pub no_report: bool,

    /// Only render the summary for an existing run's data directory
    #[arg(long, value_name = "DATA_DIR")]
    pub report_only: Option<PathBuf>,

    /// Suppress all logging except errors
    #[arg(long)]
    pub silent: bool,
}

pub async fn run(args: Cli) -> Result<()> {
    if let Some(data_dir) = args.report_only.as_deref() {
        let template_dir = template_dir(&args)?;
        return write_report(data_dir, &template_dir);
    }

    let cfg = build_config(&args)?;
    tracing::debug!(?cfg, "run configuration");

    let control = BridgeControl::spawn(&cfg).context("failed to start the control library")?;
    let output_dir = control
        .output_dir()
        .await
        .context("failed to query the control output directory")?;
    println!("All outputs going to: {}", output_dir.display());

    let outcome = ProfileEngine::new(cfg.clone())
        .run(&control, &output_dir)
        .await
        .context("band profiling failed")?;
    println!(
        "Recorded {} steps in {}",
        outcome.status.steps.len(),
        outcome.status_path.display()
    );

    if cfg.make_report {
        write_report(&outcome.data_dir, &cfg.template_dir)?;
    }
    Ok(())
}

fn write_report(data_dir: &Path, template_dir: &Path) -> Result<()> {
    let page = report::generate(data_dir, template_dir)
        .with_context(|| format!("failed to write summary for {}", data_dir.display()))?;
    println!("Summary: {}", page.display());
    Ok(())
}

/// Default template location under the platform data directory.
fn default_template_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("no data directory on this platform")?;
    Ok(base.join("smurf-profile").join("page_template"))
}

fn template_dir(args: &Cli) -> Result<PathBuf> {
    match &args.template_dir {
        Some(p) => Ok(p.clone()),
        None => default_template_dir(),
    }
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> Result<RunConfig> {
    Ok(RunConfig {
        epics_root: args.epics_root.clone().context("--epics-root is required")?,
        config_file: args.config_file.clone().context("--config-file is required")?,
        shelf_manager: args
            .shelf_manager
            .clone()
            .context("--shelf-manager is required")?,
        band: args.band.context("--band is required")?,
        run_setup: args.setup,
        find_freq: !args.no_find_freq,
        setup_notches: !args.no_setup_notches,
        subbands: engine::subbands(args.subband_low, args.subband_high),
        flux_ramp: FluxRamp {
            reset_rate_khz: args.reset_rate_khz,
            n_phi0: args.n_phi0,
        },
        control_cmd: args.control_cmd.clone(),
        control_args: args.control_args.clone(),
        template_dir: template_dir(args)?,
        make_report: !args.no_report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Cli {
        let mut argv = vec![
            "smurf-profile",
            "--epics-root",
            "smurf_server_s5",
            "--config-file",
            "/usr/local/src/pysmurf/cfg_files/experiment_fp29.cfg",
            "--shelf-manager",
            "shm-smrf-sp01",
            "--band",
            "3",
            "--template-dir",
            "/data/smurf_data/page_template",
        ];
        argv.extend_from_slice(extra);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_run_the_full_sequence() {
        let cfg = build_config(&parse(&[])).unwrap();
        assert_eq!(cfg.band, 3);
        assert!(!cfg.run_setup);
        assert!(cfg.find_freq);
        assert!(cfg.setup_notches);
        assert!(cfg.make_report);
        assert_eq!(cfg.subbands.len(), 110);
        assert_eq!(
            cfg.flux_ramp,
            FluxRamp {
                reset_rate_khz: 4,
                n_phi0: 4.0
            }
        );
        assert_eq!(cfg.template_dir, PathBuf::from("/data/smurf_data/page_template"));
    }

    #[test]
    fn flags_map_onto_config() {
        let cfg = build_config(&parse(&[
            "--setup",
            "--no-find-freq",
            "--no-setup-notches",
            "--subband-low",
            "30",
            "--subband-high",
            "34",
            "--reset-rate-khz",
            "10",
            "--n-phi0",
            "5.5",
            "--control-cmd",
            "python3",
            "--control-arg",
            "bridge.py",
            "--no-report",
        ]))
        .unwrap();
        assert!(cfg.run_setup);
        assert!(!cfg.find_freq);
        assert!(!cfg.setup_notches);
        assert!(!cfg.make_report);
        assert_eq!(cfg.subbands, vec![30, 31, 32, 33]);
        assert_eq!(cfg.flux_ramp.reset_rate_khz, 10);
        assert_eq!(cfg.flux_ramp.n_phi0, 5.5);
        assert_eq!(cfg.control_cmd, PathBuf::from("python3"));
        assert_eq!(cfg.control_args, vec!["bridge.py".to_string()]);
    }

    #[test]
    fn run_arguments_are_required() {
        let err = Cli::try_parse_from(["smurf-profile", "--band", "3"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn report_only_needs_no_run_arguments() {
        let args =
            Cli::try_parse_from(["smurf-profile", "--report-only", "/data/1583352819"]).unwrap();
        assert_eq!(args.report_only, Some(PathBuf::from("/data/1583352819")));
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn no_report_conflicts_with_report_only() {
        let err = Cli::try_parse_from([
            "smurf-profile",
            "--report-only",
            "/data/1583352819",
            "--no-report",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }
}
