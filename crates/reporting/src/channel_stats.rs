//! Channel statistics — explodes chains into positional touchpoint rows and
//! aggregates first/last/assist counts and values per channel.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use attribution_core::types::Chain;
use serde::{Serialize, Serializer};
use tracing::{info, warn};

// ─── Types ──────────────────────────────────────────────────────────────────

/// A quotient whose denominator may be zero. Undefined ratios are kept
/// explicit instead of collapsing to zero or infinity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ratio {
    Defined(f64),
    Undefined,
}

impl Ratio {
    pub fn of(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 {
            Ratio::Undefined
        } else {
            Ratio::Defined(numerator / denominator)
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Ratio::Defined(v) => Some(*v),
            Ratio::Undefined => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Ratio::Undefined)
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ratio::Defined(v) => write!(f, "{v}"),
            Ratio::Undefined => f.write_str("undefined"),
        }
    }
}

impl Serialize for Ratio {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Ratio::Defined(v) => serializer.serialize_f64(*v),
            Ratio::Undefined => serializer.serialize_none(),
        }
    }
}

/// One exploded touchpoint with its position labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TouchpointRow {
    pub channel: String,
    pub conversion_id: String,
    /// 1-based position within the chain.
    pub order: usize,
    pub chain_len: usize,
    pub purchase_value: f64,
    pub first_channel: bool,
    pub last_channel: bool,
    pub assist_channel: bool,
    pub mono_touch: bool,
    pub first_touch_value: f64,
    pub last_touch_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStatistic {
    pub channel_name: String,
    pub nr_appearances: u64,
    pub nr_chains: u64,
    pub nr_mono_touch_chains: u64,
    pub nr_first_touch_chains: u64,
    pub first_touch_chains_value: f64,
    pub nr_last_touch_chains: u64,
    pub last_touch_chains_value: f64,
    pub nr_assisted_chains: u64,
    pub assisted_chains_value: f64,
    pub mean_chain_len: f64,
    #[serde(rename = "assisted/last_touch")]
    pub assisted_last_touch: Ratio,
    #[serde(rename = "first/last_touch")]
    pub first_last_touch: Ratio,
}

// ─── Explode ────────────────────────────────────────────────────────────────

/// One row per touchpoint, in chain order.
///
/// A single-touch chain's only touchpoint is last but never first, and
/// every non-final touchpoint is an assist.
pub fn explode(chains: &[Chain]) -> Vec<TouchpointRow> {
    chains
        .iter()
        .flat_map(|chain| {
            let chain_len = chain.chain_len();
            chain.chain.iter().enumerate().map(move |(idx, channel)| {
                let order = idx + 1;
                let first_channel = order == 1 && order < chain_len;
                let last_channel = order == chain_len;
                TouchpointRow {
                    channel: channel.clone(),
                    conversion_id: chain.conversion_id.clone(),
                    order,
                    chain_len,
                    purchase_value: chain.purchase_value,
                    first_channel,
                    last_channel,
                    assist_channel: order < chain_len,
                    mono_touch: chain_len == 1,
                    first_touch_value: if first_channel { chain.purchase_value } else { 0.0 },
                    last_touch_value: if last_channel { chain.purchase_value } else { 0.0 },
                }
            })
        })
        .collect()
}

// ─── Aggregate ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct TouchAggregate<'a> {
    appearances: u64,
    conversions: HashSet<&'a str>,
    mono_touch: u64,
    first_touch: u64,
    first_touch_value: f64,
    last_touch: u64,
    last_touch_value: f64,
}

#[derive(Default)]
struct AssistAggregate<'a> {
    conversions: HashSet<&'a str>,
    value: f64,
}

#[derive(Default)]
struct LengthAggregate {
    total: usize,
    count: usize,
}

/// Aggregate statistics keyed by channel label, sorted by channel name.
pub fn compute_channel_stats(chains: &[Chain]) -> Vec<ChannelStatistic> {
    let rows = explode(chains);

    let mut touches: BTreeMap<&str, TouchAggregate> = BTreeMap::new();
    for row in &rows {
        let agg = touches.entry(row.channel.as_str()).or_default();
        agg.appearances += 1;
        agg.conversions.insert(row.conversion_id.as_str());
        agg.mono_touch += u64::from(row.mono_touch);
        agg.first_touch += u64::from(row.first_channel);
        agg.first_touch_value += row.first_touch_value;
        agg.last_touch += u64::from(row.last_channel);
        agg.last_touch_value += row.last_touch_value;
    }

    // An assist repeated within one chain counts once.
    let mut assists: BTreeMap<&str, AssistAggregate> = BTreeMap::new();
    let mut seen_assists: HashSet<(&str, &str, u64)> = HashSet::new();
    for row in rows.iter().filter(|r| r.assist_channel) {
        let key = (
            row.channel.as_str(),
            row.conversion_id.as_str(),
            row.purchase_value.to_bits(),
        );
        if seen_assists.insert(key) {
            let agg = assists.entry(row.channel.as_str()).or_default();
            agg.conversions.insert(row.conversion_id.as_str());
            agg.value += row.purchase_value;
        }
    }

    let mut lengths: BTreeMap<&str, LengthAggregate> = BTreeMap::new();
    let mut seen_lengths: HashSet<(&str, &str, usize)> = HashSet::new();
    for row in &rows {
        if seen_lengths.insert((row.conversion_id.as_str(), row.channel.as_str(), row.chain_len)) {
            let agg = lengths.entry(row.channel.as_str()).or_default();
            agg.total += row.chain_len;
            agg.count += 1;
        }
    }

    let stats: Vec<ChannelStatistic> = touches
        .into_iter()
        .map(|(channel, t)| {
            let (nr_assisted, assisted_value) = assists
                .get(channel)
                .map(|a| (a.conversions.len() as u64, a.value))
                .unwrap_or((0, 0.0));
            let mean_chain_len = lengths
                .get(channel)
                .filter(|l| l.count > 0)
                .map(|l| l.total as f64 / l.count as f64)
                .unwrap_or(0.0);

            ChannelStatistic {
                channel_name: channel.to_string(),
                nr_appearances: t.appearances,
                nr_chains: t.conversions.len() as u64,
                nr_mono_touch_chains: t.mono_touch,
                nr_first_touch_chains: t.first_touch,
                first_touch_chains_value: t.first_touch_value,
                nr_last_touch_chains: t.last_touch,
                last_touch_chains_value: t.last_touch_value,
                nr_assisted_chains: nr_assisted,
                assisted_chains_value: assisted_value,
                mean_chain_len,
                assisted_last_touch: Ratio::of(nr_assisted as f64, t.last_touch as f64),
                first_last_touch: Ratio::of(t.first_touch as f64, t.last_touch as f64),
            }
        })
        .collect();

    let undefined = stats
        .iter()
        .filter(|s| s.assisted_last_touch.is_undefined())
        .count();
    if undefined > 0 {
        warn!(
            channels = undefined,
            "Channels with no last-touch conversions have undefined ratios"
        );
    }
    info!(channels = stats.len(), touchpoints = rows.len(), "Channel statistics computed");
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn chain(id: &str, channels: &[&str], value: f64) -> Chain {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        Chain {
            customer_id: "C".into(),
            conversion_id: id.into(),
            conversion_timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            chain: channels.iter().map(|c| c.to_string()).collect(),
            first_event: day,
            purchase_date: day,
            purchase_value: value,
            nr_conversions: 1,
        }
    }

    fn stat<'a>(stats: &'a [ChannelStatistic], name: &str) -> &'a ChannelStatistic {
        stats.iter().find(|s| s.channel_name == name).unwrap()
    }

    #[test]
    fn test_mono_touch_is_last_not_first() {
        let rows = explode(&[chain("A", &["Email"], 30.0)]);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert!(!row.first_channel);
        assert!(row.last_channel);
        assert!(!row.assist_channel);
        assert!(row.mono_touch);
        assert_eq!(row.first_touch_value, 0.0);
        assert_eq!(row.last_touch_value, 30.0);
    }

    #[test]
    fn test_explode_preserves_order() {
        let rows = explode(&[
            chain("A", &["Search", "Display", "Search", "Email"], 10.0),
            chain("B", &["Social", "Email"], 5.0),
        ]);
        let a: Vec<(usize, &str)> = rows
            .iter()
            .filter(|r| r.conversion_id == "A")
            .map(|r| (r.order, r.channel.as_str()))
            .collect();
        assert_eq!(
            a,
            vec![(1, "Search"), (2, "Display"), (3, "Search"), (4, "Email")]
        );
        let b_orders: Vec<usize> = rows
            .iter()
            .filter(|r| r.conversion_id == "B")
            .map(|r| r.order)
            .collect();
        assert_eq!(b_orders, vec![1, 2]);
    }

    #[test]
    fn test_positional_labels_multi_touch() {
        let rows = explode(&[chain("A", &["Search", "Display", "Email"], 90.0)]);
        assert!(rows[0].first_channel && rows[0].assist_channel && !rows[0].last_channel);
        assert!(!rows[1].first_channel && rows[1].assist_channel && !rows[1].last_channel);
        assert!(!rows[2].first_channel && !rows[2].assist_channel && rows[2].last_channel);
        assert_eq!(rows[0].first_touch_value, 90.0);
        assert_eq!(rows[2].last_touch_value, 90.0);
    }

    #[test]
    fn test_grouped_by_single_channel_not_path() {
        let stats = compute_channel_stats(&[chain("A", &["Search", "Display"], 10.0)]);
        let names: Vec<&str> = stats.iter().map(|s| s.channel_name.as_str()).collect();
        assert_eq!(names, vec!["Display", "Search"]);
        assert!(stats.iter().all(|s| !s.channel_name.contains('>')));
    }

    #[test]
    fn test_aggregates() {
        let stats = compute_channel_stats(&[
            chain("A", &["Search", "Display", "Email"], 100.0),
            chain("B", &["Email"], 50.0),
            chain("C", &["Search", "Email"], 20.0),
        ]);

        let search = stat(&stats, "Search");
        assert_eq!(search.nr_appearances, 2);
        assert_eq!(search.nr_chains, 2);
        assert_eq!(search.nr_first_touch_chains, 2);
        assert!((search.first_touch_chains_value - 120.0).abs() < f64::EPSILON);
        assert_eq!(search.nr_last_touch_chains, 0);
        assert_eq!(search.nr_assisted_chains, 2);
        assert!((search.mean_chain_len - 2.5).abs() < f64::EPSILON);

        let email = stat(&stats, "Email");
        assert_eq!(email.nr_last_touch_chains, 3);
        assert!((email.last_touch_chains_value - 170.0).abs() < f64::EPSILON);
        assert_eq!(email.nr_mono_touch_chains, 1);
        assert_eq!(email.nr_assisted_chains, 0);
        assert_eq!(email.assisted_last_touch, Ratio::Defined(0.0));
        assert!((email.mean_chain_len - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_repeated_assist_counted_once_per_chain() {
        let stats = compute_channel_stats(&[chain("A", &["Search", "Search", "Email"], 40.0)]);
        let search = stat(&stats, "Search");
        assert_eq!(search.nr_appearances, 2);
        assert_eq!(search.nr_chains, 1);
        assert_eq!(search.nr_assisted_chains, 1);
        assert!((search.assisted_chains_value - 40.0).abs() < f64::EPSILON);
        assert!((search.mean_chain_len - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_last_touch_ratio_is_undefined() {
        let stats = compute_channel_stats(&[chain("A", &["Display", "Email"], 10.0)]);
        let display = stat(&stats, "Display");
        assert_eq!(display.nr_last_touch_chains, 0);
        assert!(display.assisted_last_touch.is_undefined());
        assert!(display.first_last_touch.is_undefined());
        assert_eq!(display.assisted_last_touch.to_string(), "undefined");

        let json = serde_json::to_value(display).unwrap();
        assert!(json["assisted/last_touch"].is_null());
    }

    #[test]
    fn test_defined_ratios() {
        let stats = compute_channel_stats(&[
            chain("A", &["Search", "Email"], 10.0),
            chain("B", &["Email", "Search"], 10.0),
        ]);
        let search = stat(&stats, "Search");
        assert_eq!(search.assisted_last_touch.value(), Some(1.0));
        assert_eq!(search.first_last_touch.value(), Some(1.0));
    }

    #[test]
    fn test_empty_chain_set() {
        assert!(compute_channel_stats(&[]).is_empty());
    }
}
