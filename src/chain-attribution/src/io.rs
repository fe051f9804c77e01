//! Reading the materialized event table and writing run outputs.

use std::path::{Path, PathBuf};

use anyhow::Context;
use attribution_core::types::RawEvent;
use attribution_reporting::write_chains;
use tracing::info;

use crate::pipeline::PipelineOutput;

pub const CHAINS_FILE: &str = "attribution_chains.jsonl";
pub const SUMMARY_FILE: &str = "run_summary.json";

/// Events are accepted either as one JSON array or as JSON Lines.
pub fn read_events(path: &Path) -> anyhow::Result<Vec<RawEvent>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read event table {}", path.display()))?;
    let events = parse_events(&raw)
        .with_context(|| format!("failed to parse event table {}", path.display()))?;
    info!(path = %path.display(), rows = events.len(), "Event table loaded");
    Ok(events)
}

pub fn parse_events(raw: &str) -> anyhow::Result<Vec<RawEvent>> {
    if raw.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(raw)?);
    }
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("invalid event on line {}", n + 1))
        })
        .collect()
}

/// Persist chains, the report sheets and the run summary under `dir`.
pub fn write_outputs(output: &PipelineOutput, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output dir {}", dir.display()))?;

    let chains_path = dir.join(CHAINS_FILE);
    write_chains(&chains_path, &output.chains).context("failed to persist chains")?;

    let mut written = vec![chains_path];
    written.extend(
        output
            .report
            .write_to(dir)
            .context("failed to write attribution report")?,
    );

    let summary_path = dir.join(SUMMARY_FILE);
    std::fs::write(&summary_path, serde_json::to_string_pretty(&output.summary)?)
        .with_context(|| format!("failed to write {}", summary_path.display()))?;
    written.push(summary_path);

    Ok(written)
}
