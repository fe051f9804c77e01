//! End-to-end attribution run: event table → chains → merge → concatenation
//! → channel statistics, perimeter summary and solver output → report.

use attribution_chains::{ChainBuilder, ChainConcatenator, ChainMerger, EventTable, InputProfile};
use attribution_core::config::AppConfig;
use attribution_core::error::AttributionResult;
use attribution_core::types::{Chain, RawEvent};
use attribution_reporting::{
    compute_channel_stats, compute_perimeter_summary, AttributionReport, AttributionSolver,
    ChannelAttribution, ChannelStatistic, PathTable, PerimeterSummary, ReportBuilder,
};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// Stage counts for one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub run_date: NaiveDate,
    pub input: InputProfile,
    pub built_chains: usize,
    pub merged_chains: usize,
    pub final_chains: usize,
    pub concatenated: bool,
    pub paths: usize,
    pub channels: usize,
    pub solver: String,
}

#[derive(Debug)]
pub struct PipelineOutput {
    pub summary: RunSummary,
    pub chains: Vec<Chain>,
    pub channel_stats: Vec<ChannelStatistic>,
    pub perimeter: PerimeterSummary,
    pub path_table: PathTable,
    pub attribution: Vec<ChannelAttribution>,
    pub report: AttributionReport,
}

pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn run(
        &self,
        rows: Vec<RawEvent>,
        solver: &dyn AttributionSolver,
        run_date: NaiveDate,
    ) -> AttributionResult<PipelineOutput> {
        let run_id = Uuid::new_v4();
        let chains_cfg = &self.config.chains;
        info!(%run_id, %run_date, rows = rows.len(), "Attribution run started");

        let table = EventTable::from_raw(rows)?;
        table.ensure_channels_separable(&self.config.report.path_separator)?;
        let input = table.profile();

        let built = ChainBuilder::new(chains_cfg.parallel).build(&table)?;
        let merged = ChainMerger::new(chains_cfg.merge_threshold_days, chains_cfg.parallel)
            .merge(&built)?;
        let merged_chains = merged.len();

        let chains: Vec<Chain> = if chains_cfg.concat_chains {
            ChainConcatenator::new(chains_cfg.concat_threshold_days, chains_cfg.parallel)
                .concatenate(&merged)?
                .into_iter()
                .map(|c| c.into_chain())
                .collect()
        } else {
            merged
        };

        let channel_stats = compute_channel_stats(&chains);
        let perimeter = compute_perimeter_summary(&chains, run_date);
        let path_table = PathTable::from_chains(&chains, &self.config.report.path_separator);
        let attribution = solver.solve(&path_table)?;
        let report = ReportBuilder::new(solver.name()).build(&perimeter, &channel_stats, &attribution);

        let summary = RunSummary {
            run_id,
            run_date,
            input,
            built_chains: built.len(),
            merged_chains,
            final_chains: chains.len(),
            concatenated: chains_cfg.concat_chains,
            paths: path_table.records.len(),
            channels: channel_stats.len(),
            solver: solver.name().to_string(),
        };
        info!(
            %run_id,
            built = summary.built_chains,
            merged = summary.merged_chains,
            paths = summary.paths,
            channels = summary.channels,
            solver = %summary.solver,
            "Attribution run finished"
        );

        Ok(PipelineOutput {
            summary,
            chains,
            channel_stats,
            perimeter,
            path_table,
            attribution,
            report,
        })
    }
}
