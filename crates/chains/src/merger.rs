//! Chain merger — coalesces a customer's chains whose purchases fall within
//! a short day threshold of the previous purchase.

use attribution_core::error::AttributionResult;
use attribution_core::types::Chain;
use tracing::info;

use crate::builder::{mean_len, round1};
use crate::invariants;
use crate::partition::map_customers;

const STAGE: &str = "chain merge";

pub struct ChainMerger {
    threshold_days: i64,
    parallel: bool,
}

impl ChainMerger {
    pub fn new(threshold_days: i64, parallel: bool) -> Self {
        Self {
            threshold_days,
            parallel,
        }
    }

    /// Merge closely spaced chains. The result never has more chains than
    /// the input, and every input conversion is accounted for in exactly
    /// one output chain.
    pub fn merge(&self, chains: &[Chain]) -> AttributionResult<Vec<Chain>> {
        let mut sorted = chains.to_vec();
        sorted.sort_by(|a, b| {
            a.customer_id
                .cmp(&b.customer_id)
                .then(a.conversion_timestamp.cmp(&b.conversion_timestamp))
        });

        let merged = map_customers(
            &sorted,
            self.parallel,
            |c| c.customer_id.as_str(),
            |group| self.merge_customer(group),
        );

        invariants::ensure_unique_conversion_ids(
            STAGE,
            merged.iter().map(|c| c.conversion_id.as_str()),
        )?;
        let conversions_in: usize = chains.iter().map(|c| c.nr_conversions as usize).sum();
        let conversions_out: usize = merged.iter().map(|c| c.nr_conversions as usize).sum();
        invariants::ensure_conversion_count(STAGE, conversions_in, conversions_out)?;

        let removed = chains.len() - merged.len();
        let pct = if chains.is_empty() {
            0.0
        } else {
            removed as f64 * 100.0 / chains.len() as f64
        };
        info!(
            merged = removed,
            pct = round1(pct),
            chains = merged.len(),
            avg_len = round1(mean_len(&merged)),
            "Chain creation - step 2 - chains merged"
        );
        Ok(merged)
    }

    /// `group` holds one customer's chains sorted by conversion timestamp.
    /// A new merge group starts whenever the gap to the previous purchase
    /// exceeds the threshold.
    fn merge_customer(&self, group: &[Chain]) -> Vec<Chain> {
        let mut out: Vec<Chain> = Vec::new();
        let mut last_date = match group.first() {
            Some(first) => first.purchase_date,
            None => return out,
        };

        for chain in group {
            let gap = (chain.purchase_date - last_date).num_days();
            last_date = chain.purchase_date;

            match out.last_mut() {
                Some(current) if gap <= self.threshold_days => absorb(current, chain),
                _ => out.push(chain.clone()),
            }
        }
        out
    }
}

/// Fold a later chain into the running merge group.
fn absorb(current: &mut Chain, later: &Chain) {
    current.conversion_id = later.conversion_id.clone();
    current.conversion_timestamp = later.conversion_timestamp;
    current.first_event = current.first_event.min(later.first_event);
    current.purchase_date = current.purchase_date.max(later.purchase_date);
    current.purchase_value += later.purchase_value;
    current.chain.extend(later.chain.iter().cloned());
    current.nr_conversions += later.nr_conversions;
}
