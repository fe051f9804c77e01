//! Chain builder — segments each customer's ordered touchpoints into
//! conversion chains, each terminated by a purchase.

use attribution_core::error::AttributionResult;
use attribution_core::types::{Chain, Event};
use chrono::NaiveDate;
use tracing::{debug, info};

use crate::events::EventTable;
use crate::invariants;
use crate::partition::map_customers;

const STAGE: &str = "chain creation";

pub struct ChainBuilder {
    parallel: bool,
}

/// Touchpoints accumulated since the customer's previous conversion.
#[derive(Default)]
struct OpenChain {
    touchpoints: Vec<String>,
    first_event: Option<NaiveDate>,
}

impl ChainBuilder {
    pub fn new(parallel: bool) -> Self {
        Self { parallel }
    }

    /// Build one chain per converting session. Fails if the number of
    /// chains differs from the number of converting sessions or if a
    /// conversion id is emitted twice.
    pub fn build(&self, table: &EventTable) -> AttributionResult<Vec<Chain>> {
        let chains = map_customers(
            table.events(),
            self.parallel,
            |e| e.customer_id.as_str(),
            build_customer_chains,
        );

        invariants::ensure_unique_conversion_ids(
            STAGE,
            chains.iter().map(|c| c.conversion_id.as_str()),
        )?;
        invariants::ensure_conversion_count(STAGE, table.converting_sessions(), chains.len())?;

        let customers = chains.chunk_by(|a, b| a.customer_id == b.customer_id).count();
        info!(
            chains = chains.len(),
            avg_len = round1(mean_len(&chains)),
            customers,
            "Chain creation - step 1 - chains built"
        );
        Ok(chains)
    }
}

/// Scan one customer's events in time order. A chain closes on the last
/// event of a purchasing session; trailing events that never convert are
/// dropped.
fn build_customer_chains(events: &[Event]) -> Vec<Chain> {
    let mut chains = Vec::new();
    let mut open = OpenChain::default();

    for (k, event) in events.iter().enumerate() {
        open.touchpoints.push(event.channel_group.clone());
        open.first_event
            .get_or_insert(event.first_event_timestamp.date_naive());

        let next_session = events.get(k + 1).map(|e| e.session_id.as_str());
        if event.f_purchased && next_session != Some(event.session_id.as_str()) {
            let closed = std::mem::take(&mut open);
            chains.push(Chain {
                customer_id: event.customer_id.clone(),
                conversion_id: event.conversion_id(),
                conversion_timestamp: event.last_event_timestamp,
                chain: closed.touchpoints,
                first_event: closed
                    .first_event
                    .unwrap_or(event.first_event_timestamp.date_naive()),
                purchase_date: event.last_event_timestamp.date_naive(),
                purchase_value: event.session_revenue,
                nr_conversions: 1,
            });
        }
    }

    if !open.touchpoints.is_empty() {
        debug!(
            customer_id = %events[0].customer_id,
            dropped = open.touchpoints.len(),
            "Discarding non-converting trailing touchpoints"
        );
    }
    chains
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub(crate) fn mean_len(chains: &[Chain]) -> f64 {
    if chains.is_empty() {
        return 0.0;
    }
    chains.iter().map(|c| c.chain_len()).sum::<usize>() as f64 / chains.len() as f64
}
