//! Perimeter summary — descriptive rollup of the final chain population,
//! once over all chains and once over multi-touchpoint chains.

use std::collections::HashSet;

use attribution_core::types::Chain;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulationSummary {
    pub nr_customers: usize,
    pub nr_conversions: usize,
    pub conversions_value: f64,
    pub mean_conversions_value: Option<f64>,
    pub median_conversions_value: Option<f64>,
    pub mean_chain_len: Option<f64>,
    pub median_chain_len: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerimeterSummary {
    pub events_start: Option<NaiveDate>,
    pub events_end: Option<NaiveDate>,
    pub conversions_start: Option<NaiveDate>,
    pub conversions_end: Option<NaiveDate>,
    pub all: PopulationSummary,
    pub multi_touch: PopulationSummary,
    pub run_date: NaiveDate,
}

pub fn compute_perimeter_summary(chains: &[Chain], run_date: NaiveDate) -> PerimeterSummary {
    let multi: Vec<&Chain> = chains.iter().filter(|c| c.is_multi_touch()).collect();
    let all: Vec<&Chain> = chains.iter().collect();

    PerimeterSummary {
        events_start: chains.iter().map(|c| c.first_event).min(),
        events_end: chains.iter().map(|c| c.first_event).max(),
        conversions_start: chains.iter().map(|c| c.conversion_timestamp.date_naive()).min(),
        conversions_end: chains.iter().map(|c| c.conversion_timestamp.date_naive()).max(),
        all: summarize(&all),
        multi_touch: summarize(&multi),
        run_date,
    }
}

fn summarize(chains: &[&Chain]) -> PopulationSummary {
    let values: Vec<f64> = chains.iter().map(|c| c.purchase_value).collect();
    let lengths: Vec<f64> = chains.iter().map(|c| c.chain_len() as f64).collect();

    PopulationSummary {
        nr_customers: chains
            .iter()
            .map(|c| c.customer_id.as_str())
            .collect::<HashSet<_>>()
            .len(),
        nr_conversions: chains
            .iter()
            .map(|c| c.conversion_id.as_str())
            .collect::<HashSet<_>>()
            .len(),
        conversions_value: values.iter().sum(),
        mean_conversions_value: mean(&values),
        median_conversions_value: median(&values),
        mean_chain_len: mean(&lengths).map(round2),
        median_chain_len: median(&lengths).map(round2),
    }
}

impl PerimeterSummary {
    /// `(info, value)` rows for the summary sheet.
    pub fn rows(&self) -> Vec<(String, Value)> {
        let date = |d: Option<NaiveDate>| {
            d.map(|d| json!(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null)
        };
        let mut rows = vec![
            ("Events start date".to_string(), date(self.events_start)),
            ("Events end date".to_string(), date(self.events_end)),
            ("Conversions start date".to_string(), date(self.conversions_start)),
            ("Conversions end date".to_string(), date(self.conversions_end)),
        ];
        for (prefix, summary) in [("", &self.all), ("Multi-TP ", &self.multi_touch)] {
            rows.extend([
                (format!("{prefix}Nr customers"), json!(summary.nr_customers)),
                (format!("{prefix}Nr conversions"), json!(summary.nr_conversions)),
                (format!("{prefix}Conversions value"), json!(summary.conversions_value)),
                (
                    format!("{prefix}Mean conversions value"),
                    json!(summary.mean_conversions_value),
                ),
                (
                    format!("{prefix}Median conversions value"),
                    json!(summary.median_conversions_value),
                ),
                (format!("{prefix}Mean chain len"), json!(summary.mean_chain_len)),
                (format!("{prefix}Median chain len"), json!(summary.median_chain_len)),
            ]);
        }
        rows.push((
            "Run date".to_string(),
            json!(self.run_date.format("%Y-%m-%d").to_string()),
        ));
        rows
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
