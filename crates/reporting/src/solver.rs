//! Attribution solvers — compact path table plus the solvers that turn it
//! into per-channel credit.

use std::collections::{BTreeMap, HashMap};

use attribution_core::config::{ReportConfig, SolverKind};
use attribution_core::error::{AttributionError, AttributionResult};
use attribution_core::types::Chain;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ─── Path table ─────────────────────────────────────────────────────────────

/// Chains sharing one touchpoint sequence. `path` is the separator-joined
/// form for export; solvers read `channels` and never re-split it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRecord {
    pub path: String,
    pub channels: Vec<String>,
    pub conversion_count: u64,
    pub total_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathTable {
    pub separator: String,
    pub records: Vec<PathRecord>,
}

impl PathTable {
    pub fn from_chains(chains: &[Chain], separator: &str) -> Self {
        let mut grouped: BTreeMap<&[String], (u64, f64)> = BTreeMap::new();
        for chain in chains {
            let entry = grouped.entry(chain.chain.as_slice()).or_default();
            entry.0 += 1;
            entry.1 += chain.purchase_value;
        }

        let records = grouped
            .into_iter()
            .map(|(channels, (conversion_count, total_value))| PathRecord {
                path: channels.join(separator),
                channels: channels.to_vec(),
                conversion_count,
                total_value,
            })
            .collect::<Vec<_>>();
        debug!(paths = records.len(), "Path table built");
        Self {
            separator: separator.to_string(),
            records,
        }
    }

    /// Channels of every record, rejecting malformed rows.
    fn parsed(&self) -> AttributionResult<Vec<(Vec<&str>, &PathRecord)>> {
        self.records
            .iter()
            .map(|record| {
                if record.channels.is_empty() || record.channels.iter().any(|c| c.is_empty()) {
                    return Err(AttributionError::Solver(format!(
                        "malformed path '{}'",
                        record.path
                    )));
                }
                if record.conversion_count == 0 || !(record.total_value >= 0.0) {
                    return Err(AttributionError::Solver(format!(
                        "path '{}' has invalid conversions {} / value {}",
                        record.path, record.conversion_count, record.total_value
                    )));
                }
                let channels = record.channels.iter().map(String::as_str).collect();
                Ok((channels, record))
            })
            .collect()
    }

    pub fn total_conversions(&self) -> u64 {
        self.records.iter().map(|r| r.conversion_count).sum()
    }

    pub fn total_value(&self) -> f64 {
        self.records.iter().map(|r| r.total_value).sum()
    }
}

// ─── Solver seam ────────────────────────────────────────────────────────────

/// Per-channel credit returned by a solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelAttribution {
    pub channel_name: String,
    pub attributed_volume: f64,
    pub attributed_value: f64,
}

pub trait AttributionSolver: Send + Sync {
    /// Column prefix in the report, e.g. `markov` for `markov_volume`.
    fn name(&self) -> &str;

    fn solve(&self, table: &PathTable) -> AttributionResult<Vec<ChannelAttribution>>;
}

pub fn solver_for(config: &ReportConfig) -> Box<dyn AttributionSolver> {
    match config.solver {
        SolverKind::Markov => Box::new(MarkovSolver::new(
            config.markov_max_iterations,
            config.markov_tolerance,
        )),
        SolverKind::FirstTouch => Box::new(HeuristicSolver::new(AttributionModel::FirstTouch)),
        SolverKind::LastTouch => Box::new(HeuristicSolver::new(AttributionModel::LastTouch)),
        SolverKind::Linear => Box::new(HeuristicSolver::new(AttributionModel::Linear)),
        SolverKind::PositionBased => {
            Box::new(HeuristicSolver::new(AttributionModel::PositionBased))
        }
        SolverKind::TimeDecay => Box::new(HeuristicSolver::new(AttributionModel::TimeDecay)),
    }
}

// ─── Heuristic models ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionModel {
    LastTouch,
    FirstTouch,
    Linear,
    TimeDecay,
    PositionBased,
}

impl AttributionModel {
    fn label(&self) -> &'static str {
        match self {
            AttributionModel::LastTouch => "last_touch",
            AttributionModel::FirstTouch => "first_touch",
            AttributionModel::Linear => "linear",
            AttributionModel::TimeDecay => "time_decay",
            AttributionModel::PositionBased => "position_based",
        }
    }

    /// Credit share for each position of an `n`-touch path; sums to 1.
    fn weights(&self, n: usize) -> Vec<f64> {
        let mut w = vec![0.0; n];
        if n == 0 {
            return w;
        }
        match self {
            AttributionModel::LastTouch => w[n - 1] = 1.0,
            AttributionModel::FirstTouch => w[0] = 1.0,
            AttributionModel::Linear => w.fill(1.0 / n as f64),
            AttributionModel::TimeDecay => {
                // Each step back from the conversion halves the credit.
                for (k, weight) in w.iter_mut().enumerate() {
                    *weight = 0.5f64.powi((n - 1 - k) as i32);
                }
                let total: f64 = w.iter().sum();
                w.iter_mut().for_each(|x| *x /= total);
            }
            AttributionModel::PositionBased => match n {
                1 => w[0] = 1.0,
                2 => w.fill(0.5),
                _ => {
                    let middle = 0.2 / (n - 2) as f64;
                    w.fill(middle);
                    w[0] = 0.4;
                    w[n - 1] = 0.4;
                }
            },
        }
        w
    }
}

pub struct HeuristicSolver {
    model: AttributionModel,
}

impl HeuristicSolver {
    pub fn new(model: AttributionModel) -> Self {
        Self { model }
    }
}

impl AttributionSolver for HeuristicSolver {
    fn name(&self) -> &str {
        self.model.label()
    }

    fn solve(&self, table: &PathTable) -> AttributionResult<Vec<ChannelAttribution>> {
        let mut credit: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
        let parsed = table.parsed()?;
        for (channels, record) in &parsed {
            let weights = self.model.weights(channels.len());
            for (&channel, weight) in channels.iter().zip(weights) {
                let entry = credit.entry(channel).or_default();
                entry.0 += weight * record.conversion_count as f64;
                entry.1 += weight * record.total_value;
            }
        }
        Ok(credit
            .into_iter()
            .map(|(channel, (volume, value))| ChannelAttribution {
                channel_name: channel.to_string(),
                attributed_volume: volume,
                attributed_value: value,
            })
            .collect())
    }
}

// ─── Markov removal effect ──────────────────────────────────────────────────

/// First-order Markov chain over `start → channels → conversion`. A
/// channel's credit is proportional to the drop in conversion probability
/// when it is removed from the graph.
pub struct MarkovSolver {
    max_iterations: usize,
    tolerance: f64,
}

const START: usize = 0;
const CONVERSION: usize = 1;
const FIRST_CHANNEL: usize = 2;

impl MarkovSolver {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
        }
    }

    /// Probability of reaching the conversion state from the start state,
    /// with `removed` (if any) absorbing into the null state.
    fn conversion_probability(
        &self,
        transitions: &[Vec<(usize, f64)>],
        removed: Option<usize>,
    ) -> AttributionResult<f64> {
        let mut p = vec![0.0; transitions.len()];
        p[CONVERSION] = 1.0;

        for _ in 0..self.max_iterations {
            let mut delta: f64 = 0.0;
            for state in (START..transitions.len()).filter(|&s| s != CONVERSION) {
                if Some(state) == removed {
                    continue;
                }
                let next: f64 = transitions[state].iter().map(|&(t, prob)| prob * p[t]).sum();
                delta = delta.max((next - p[state]).abs());
                p[state] = next;
            }
            if delta < self.tolerance {
                return Ok(p[START]);
            }
        }
        Err(AttributionError::Solver(format!(
            "markov model did not converge within {} iterations",
            self.max_iterations
        )))
    }
}

impl AttributionSolver for MarkovSolver {
    fn name(&self) -> &str {
        "markov"
    }

    fn solve(&self, table: &PathTable) -> AttributionResult<Vec<ChannelAttribution>> {
        let parsed = table.parsed()?;
        if parsed.is_empty() {
            return Ok(Vec::new());
        }

        let mut index: BTreeMap<&str, usize> = BTreeMap::new();
        for (channels, _) in &parsed {
            for &channel in channels {
                let next = FIRST_CHANNEL + index.len();
                index.entry(channel).or_insert(next);
            }
        }

        let states = FIRST_CHANNEL + index.len();
        let mut counts: Vec<HashMap<usize, f64>> = vec![HashMap::new(); states];
        for (channels, record) in &parsed {
            let weight = record.conversion_count as f64;
            let mut from = START;
            for &channel in channels {
                let to = index[channel];
                *counts[from].entry(to).or_default() += weight;
                from = to;
            }
            *counts[from].entry(CONVERSION).or_default() += weight;
        }

        let transitions: Vec<Vec<(usize, f64)>> = counts
            .into_iter()
            .map(|row| {
                let total: f64 = row.values().sum();
                let mut edges: Vec<(usize, f64)> =
                    row.into_iter().map(|(to, n)| (to, n / total)).collect();
                edges.sort_by_key(|&(to, _)| to);
                edges
            })
            .collect();

        let base = self.conversion_probability(&transitions, None)?;
        if base <= 0.0 {
            return Err(AttributionError::Solver(
                "markov model has zero conversion probability".to_string(),
            ));
        }

        let mut effects: Vec<(&str, f64)> = Vec::with_capacity(index.len());
        for (&channel, &state) in &index {
            let removed = self.conversion_probability(&transitions, Some(state))?;
            effects.push((channel, ((base - removed) / base).max(0.0)));
        }

        let total_effect: f64 = effects.iter().map(|(_, e)| e).sum();
        if total_effect <= 0.0 {
            return Err(AttributionError::Solver(
                "markov removal effects sum to zero".to_string(),
            ));
        }

        let total_conversions = table.total_conversions() as f64;
        let total_value = table.total_value();
        info!(
            channels = effects.len(),
            paths = parsed.len(),
            "Markov attribution solved"
        );
        Ok(effects
            .into_iter()
            .map(|(channel, effect)| {
                let share = effect / total_effect;
                ChannelAttribution {
                    channel_name: channel.to_string(),
                    attributed_volume: total_conversions * share,
                    attributed_value: total_value * share,
                }
            })
            .collect())
    }
}
