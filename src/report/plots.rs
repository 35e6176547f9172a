//! Locating plots written by the control library.
//!
//! The control library names per-resonance and per-channel plots after a common
//! prefix, e.g. `1583353080_eta_b3res012.png`. The page template only needs that
//! prefix, so every file matching `*needle*` must agree on it.

use super::ReportError;
use std::path::Path;

/// Prefix shared by all plots in `plots_dir` whose name contains `needle`.
///
/// The prefix is the part of the file name before the first `split_at`, or the whole
/// name when `split_at` does not occur. No match, or matches that disagree on the
/// prefix, is an error.
pub fn shared_prefix(plots_dir: &Path, needle: &str, split_at: &str) -> Result<String, ReportError> {
    let mut matches = matching_files(plots_dir, needle)?;
    if matches.is_empty() {
        return Err(ReportError::PlotNotFound {
            dir: plots_dir.to_path_buf(),
            pattern: format!("*{needle}*"),
        });
    }
    matches.sort();

    let mut prefixes: Vec<String> = matches
        .iter()
        .map(|name| name.split(split_at).next().unwrap_or(name).to_owned())
        .collect();
    prefixes.sort();
    prefixes.dedup();
    if prefixes.len() == 1 {
        return Ok(prefixes.remove(0));
    }
    Err(ReportError::AmbiguousPlot {
        pattern: format!("*{needle}*"),
        candidates: matches,
    })
}

fn matching_files(dir: &Path, needle: &str) -> Result<Vec<String>, ReportError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ReportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ReportError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let name = entry.file_name().to_string_lossy().into_owned();
        // Same rule as a shell glob: hidden files only match an explicit dot.
        if !name.starts_with('.') && name.contains(needle) {
            out.push(name);
        }
    }
    Ok(out)
}
