//! HTML and JavaScript snippets injected into the summary page.
//!
//! Every function here is a pure formatter over the status mapping or tuning record.

use super::ReportError;
use crate::model::{BandTuning, RunStatus};
use anyhow::{Context, Result};
use serde_json::Value;
use std::fmt::Write;
use std::path::Path;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

const TABLE_OPEN: &str = r#"<table style="width:30%" align="center" border="1">"#;

/// Strings render bare; anything else renders as JSON.
pub fn display_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Local calendar date (`YYYY-MM-DD`) of a unix timestamp.
pub fn date_string(ts: i64) -> Result<String> {
    let utc = OffsetDateTime::from_unix_timestamp(ts)
        .with_context(|| format!("timestamp {ts} out of range"))?;
    let offset = UtcOffset::local_offset_at(utc).unwrap_or(UtcOffset::UTC);
    utc.to_offset(offset)
        .format(format_description!("[year]-[month]-[day]"))
        .context("format date")
}

/// One row per recorded step with its wall time in seconds, in execution order.
pub fn timing_table(status: &RunStatus) -> String {
    let mut out = String::from(TABLE_OPEN);
    out.push_str("<tr><th>Function</th><th>Time [s]</th></tr>");
    for step in &status.steps {
        let _ = write!(
            out,
            "<tr><td>{}</td><td>{}</td></tr>",
            step.name,
            step.elapsed_secs()
        );
    }
    out.push_str("</table>");
    out
}

/// Key/value table of the amplifier bias readback.
pub fn amplifier_table(output: &Value) -> Result<String, ReportError> {
    let Value::Object(map) = output else {
        return Err(ReportError::UnexpectedOutput {
            step: "get_amplifier_bias",
            expected: "a mapping of amplifier settings",
        });
    };
    let mut out = String::from(TABLE_OPEN);
    for (k, v) in map {
        let _ = write!(out, "<tr><td>{}</td><td>{}</td></tr>", k, display_value(v));
    }
    out.push_str("</table>");
    Ok(out)
}

/// Page-relative path of the raw full-band response plot.
///
/// The step returns either the plot path itself or a per-band collection of paths.
pub fn full_band_resp_path(output: &Value, band: u32) -> Result<String, ReportError> {
    let path = match output {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get(&band.to_string()).and_then(Value::as_str),
        Value::Array(items) => items.get(band as usize).and_then(Value::as_str),
        _ => None,
    }
    .ok_or(ReportError::UnexpectedOutput {
        step: "full_band_resp",
        expected: "a plot path for the band",
    })?;

    let basename = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
        .replace(".png", "_raw.png");
    Ok(format!("../plots/{basename}"))
}

/// JavaScript list entries naming each resonance, e.g. `['000|000', '001|001', ]`.
pub fn freq_resp_list(tuning: &BandTuning) -> String {
    let mut out = String::from("[");
    for idx in tuning.resonances.keys() {
        let _ = write!(out, "'{idx:03}|{idx:03}', ");
    }
    out.push(']');
    out
}

/// JavaScript object entries mapping resonance index to channel, e.g. `"000":"016", `.
pub fn res_dict(tuning: &BandTuning) -> String {
    let mut out = String::new();
    for (idx, res) in &tuning.resonances {
        let _ = write!(out, "\"{idx:03}\":\"{:03}\", ", res.channel);
    }
    out
}

/// JavaScript expression building an eta-scan plot name from `p['res']`.
pub fn eta_path_expr(prefix: &str) -> String {
    format!("'{prefix}' + 'res' + p['res'] + '.png'")
}

/// JavaScript expression building a tracking plot name from `p['res']`.
pub fn tracking_path_expr(prefix: &str, band: u32) -> String {
    format!("'{prefix}' + '_band{band}_ch' + res_to_chan(p['res']) + '.png'")
}
