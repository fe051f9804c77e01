//! Report builder — assembles the perimeter summary, channel statistics and
//! solver output into named sheets, exports them as CSV and JSON, and
//! persists the final chain set.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use attribution_core::error::AttributionResult;
use attribution_core::types::{Chain, ChainRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::channel_stats::{ChannelStatistic, Ratio};
use crate::perimeter::PerimeterSummary;
use crate::solver::ChannelAttribution;

// ─── Types ──────────────────────────────────────────────────────────────────

/// One tabular sheet of the report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSheet {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// A channel present in the statistics, the solver output, or both.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelReportRow {
    pub channel_name: String,
    pub stats: Option<ChannelStatistic>,
    pub attribution: Option<ChannelAttribution>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttributionReport {
    pub report_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub solver: String,
    pub sheets: Vec<ReportSheet>,
}

// ─── Join ───────────────────────────────────────────────────────────────────

/// Outer join on channel name. Channels found on only one side are kept.
pub fn join_attribution(
    stats: &[ChannelStatistic],
    attribution: &[ChannelAttribution],
) -> Vec<ChannelReportRow> {
    let mut rows: BTreeMap<&str, ChannelReportRow> = BTreeMap::new();
    for s in stats {
        rows.entry(s.channel_name.as_str())
            .or_insert_with(|| empty_row(&s.channel_name))
            .stats = Some(s.clone());
    }
    for a in attribution {
        rows.entry(a.channel_name.as_str())
            .or_insert_with(|| empty_row(&a.channel_name))
            .attribution = Some(a.clone());
    }
    rows.into_values().collect()
}

fn empty_row(channel: &str) -> ChannelReportRow {
    ChannelReportRow {
        channel_name: channel.to_string(),
        stats: None,
        attribution: None,
    }
}

// ─── Report Builder ─────────────────────────────────────────────────────────

pub struct ReportBuilder {
    solver: String,
}

impl ReportBuilder {
    pub fn new(solver: &str) -> Self {
        Self {
            solver: solver.to_string(),
        }
    }

    pub fn build(
        &self,
        perimeter: &PerimeterSummary,
        stats: &[ChannelStatistic],
        attribution: &[ChannelAttribution],
    ) -> AttributionReport {
        let sheets = vec![
            self.perimeter_sheet(perimeter),
            self.channel_stats_sheet(&join_attribution(stats, attribution)),
            self.attribution_sheet(attribution),
        ];
        AttributionReport {
            report_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            solver: self.solver.clone(),
            sheets,
        }
    }

    fn perimeter_sheet(&self, perimeter: &PerimeterSummary) -> ReportSheet {
        ReportSheet {
            name: "Perimeter".into(),
            columns: vec!["info".into(), "value".into()],
            rows: perimeter
                .rows()
                .into_iter()
                .map(|(info, value)| vec![json!(info), value])
                .collect(),
        }
    }

    fn channel_stats_sheet(&self, joined: &[ChannelReportRow]) -> ReportSheet {
        let mut columns: Vec<String> = vec![
            "channel_name",
            "nr_appearances",
            "nr_chains",
            "nr_mono_touch_chains",
            "nr_first_touch_chains",
            "first_touch_chains_value",
            "nr_last_touch_chains",
            "last_touch_chains_value",
            "nr_assisted_chains",
            "assisted_chains_value",
            "mean_chain_len",
            "assisted/last_touch",
            "first/last_touch",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        columns.push(format!("{}_volume", self.solver));
        columns.push(format!("{}_value", self.solver));

        let rows = joined
            .iter()
            .map(|row| {
                let mut cells = vec![json!(row.channel_name)];
                match &row.stats {
                    Some(s) => cells.extend([
                        json!(s.nr_appearances),
                        json!(s.nr_chains),
                        json!(s.nr_mono_touch_chains),
                        json!(s.nr_first_touch_chains),
                        json!(s.first_touch_chains_value),
                        json!(s.nr_last_touch_chains),
                        json!(s.last_touch_chains_value),
                        json!(s.nr_assisted_chains),
                        json!(s.assisted_chains_value),
                        json!(s.mean_chain_len),
                        ratio_cell(s.assisted_last_touch),
                        ratio_cell(s.first_last_touch),
                    ]),
                    None => cells.extend(std::iter::repeat(Value::Null).take(12)),
                }
                match &row.attribution {
                    Some(a) => cells.extend([json!(a.attributed_volume), json!(a.attributed_value)]),
                    None => cells.extend([Value::Null, Value::Null]),
                }
                cells
            })
            .collect();

        ReportSheet {
            name: "Channel Stats".into(),
            columns,
            rows,
        }
    }

    fn attribution_sheet(&self, attribution: &[ChannelAttribution]) -> ReportSheet {
        ReportSheet {
            name: "Attribution".into(),
            columns: vec![
                "channel_name".into(),
                format!("{}_volume", self.solver),
                format!("{}_value", self.solver),
            ],
            rows: attribution
                .iter()
                .map(|a| {
                    vec![
                        json!(a.channel_name),
                        json!(a.attributed_volume),
                        json!(a.attributed_value),
                    ]
                })
                .collect(),
        }
    }
}

fn ratio_cell(ratio: Ratio) -> Value {
    match ratio {
        Ratio::Defined(v) => json!(v),
        Ratio::Undefined => json!("undefined"),
    }
}

// ─── Export ─────────────────────────────────────────────────────────────────

impl ReportSheet {
    pub fn to_csv(&self) -> String {
        let mut csv = self.columns.join(",");
        csv.push('\n');
        for row in &self.rows {
            let cells: Vec<String> = row
                .iter()
                .map(|v| match v {
                    Value::String(s) => format!("\"{}\"", s.replace('"', "\"\"")),
                    Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect();
            csv.push_str(&cells.join(","));
            csv.push('\n');
        }
        csv
    }

    fn file_stem(&self) -> String {
        self.name.to_lowercase().replace(' ', "_")
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

impl AttributionReport {
    pub fn sheet(&self, name: &str) -> Option<&ReportSheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn export_json(&self) -> AttributionResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write `<date>_attribution_results.json` plus one CSV per sheet.
    pub fn write_to(&self, dir: &Path) -> AttributionResult<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let prefix = self.generated_at.format("%Y%m%d");

        let mut written = Vec::with_capacity(self.sheets.len() + 1);
        let json_path = dir.join(format!("{prefix}_attribution_results.json"));
        std::fs::write(&json_path, self.export_json()?)?;
        written.push(json_path);

        for sheet in &self.sheets {
            let path = dir.join(format!("{prefix}_{}.csv", sheet.file_stem()));
            std::fs::write(&path, sheet.to_csv())?;
            written.push(path);
        }
        info!(files = written.len(), dir = %dir.display(), "Attribution report written");
        Ok(written)
    }
}

// ─── Chain persistence ──────────────────────────────────────────────────────

/// Persist the final chain set as JSON Lines, one `ChainRecord` per line.
pub fn write_chains(path: &Path, chains: &[Chain]) -> AttributionResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    for chain in chains {
        serde_json::to_writer(&mut writer, &ChainRecord::from(chain.clone()))?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    info!(chains = chains.len(), path = %path.display(), "Chains persisted");
    Ok(())
}

pub fn read_chains(path: &Path) -> AttributionResult<Vec<ChainRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}
