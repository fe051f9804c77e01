//! Chain concatenator — prefixes the touchpoints of a customer's earlier
//! chains onto each later chain whose purchase falls within the threshold.
//! Purchases stay separate: every input chain yields exactly one output row.

use attribution_core::error::{AttributionError, AttributionResult};
use attribution_core::types::{Chain, ConcatenatedChain};
use tracing::info;

use crate::builder::round1;
use crate::invariants;
use crate::partition::map_customers;

const STAGE: &str = "chain concatenation";

pub struct ChainConcatenator {
    threshold_days: i64,
    parallel: bool,
}

impl ChainConcatenator {
    /// A negative threshold admits nothing, same as zero since same-day
    /// chains never contribute.
    pub fn new(threshold_days: i64, parallel: bool) -> Self {
        Self {
            threshold_days: threshold_days.max(0),
            parallel,
        }
    }

    /// Output is ordered by customer, then purchase date ascending.
    pub fn concatenate(&self, chains: &[Chain]) -> AttributionResult<Vec<ConcatenatedChain>> {
        let mut sorted = chains.to_vec();
        sorted.sort_by(|a, b| {
            a.customer_id
                .cmp(&b.customer_id)
                .then(a.purchase_date.cmp(&b.purchase_date))
                .then(a.conversion_timestamp.cmp(&b.conversion_timestamp))
        });

        let out = map_customers(
            &sorted,
            self.parallel,
            |c| c.customer_id.as_str(),
            |group| self.concatenate_customer(group),
        );

        if out.len() != chains.len() {
            return Err(AttributionError::RowCountChanged {
                stage: STAGE,
                before: chains.len(),
                after: out.len(),
            });
        }
        invariants::ensure_unique_conversion_ids(
            STAGE,
            out.iter().map(|c| c.chain.conversion_id.as_str()),
        )?;

        let n = out.len().max(1) as f64;
        let raw_len = out.iter().map(|c| c.chain.chain_len()).sum::<usize>() as f64 / n;
        let concat_len = out.iter().map(|c| c.concat_chain.len()).sum::<usize>() as f64 / n;
        info!(
            chains = out.len(),
            raw_avg_len = round1(raw_len),
            concat_avg_len = round1(concat_len),
            "Chain creation - step 3 - chains concatenated"
        );
        Ok(out)
    }

    /// Sliding window over one customer's chains sorted by purchase date.
    /// `lo` is the oldest chain still within the threshold of chain `i`;
    /// chains sharing `i`'s purchase date do not contribute.
    fn concatenate_customer(&self, group: &[Chain]) -> Vec<ConcatenatedChain> {
        let mut lo = 0;
        group
            .iter()
            .enumerate()
            .map(|(i, current)| {
                while (current.purchase_date - group[lo].purchase_date).num_days()
                    > self.threshold_days
                {
                    lo += 1;
                }
                let hi = lo
                    + group[lo..i].partition_point(|c| c.purchase_date < current.purchase_date);

                let concat_chain = group[lo..hi]
                    .iter()
                    .flat_map(|c| c.chain.iter().cloned())
                    .chain(current.chain.iter().cloned())
                    .collect();
                ConcatenatedChain {
                    chain: current.clone(),
                    concat_chain,
                }
            })
            .collect()
    }
}
