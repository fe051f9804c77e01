use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One touchpoint-session row as read from the materialized event table.
/// `channel_group` may be missing here; `EventTable` rejects such rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub customer_id: String,
    pub session_id: String,
    #[serde(default)]
    pub channel_group: Option<String>,
    pub first_event_timestamp: DateTime<Utc>,
    /// Timestamp of this row's event. Falls back to the session start.
    #[serde(default)]
    pub event_timestamp: Option<DateTime<Utc>>,
    pub last_event_timestamp: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_flag")]
    pub f_purchased: bool,
    #[serde(default)]
    pub session_revenue: f64,
}

/// A validated touchpoint-session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub customer_id: String,
    pub session_id: String,
    pub channel_group: String,
    pub first_event_timestamp: DateTime<Utc>,
    pub event_timestamp: DateTime<Utc>,
    pub last_event_timestamp: DateTime<Utc>,
    pub last_event_date: NaiveDate,
    pub f_purchased: bool,
    pub session_revenue: f64,
}

impl Event {
    /// Converts a raw row, returning `None` when the channel group is missing.
    pub fn from_raw(raw: RawEvent) -> Option<Self> {
        let channel_group = raw.channel_group?;
        Some(Self {
            customer_id: raw.customer_id,
            session_id: raw.session_id,
            channel_group,
            first_event_timestamp: raw.first_event_timestamp,
            event_timestamp: raw.event_timestamp.unwrap_or(raw.first_event_timestamp),
            last_event_date: raw.last_event_timestamp.date_naive(),
            last_event_timestamp: raw.last_event_timestamp,
            f_purchased: raw.f_purchased,
            session_revenue: raw.session_revenue,
        })
    }

    /// `session_id` suffixed with the purchase day, e.g. `s-42.20240131`.
    pub fn conversion_id(&self) -> String {
        format!(
            "{}.{}",
            self.session_id,
            self.last_event_date.format("%Y%m%d")
        )
    }
}

/// One conversion unit: the ordered touchpoints leading to a purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub customer_id: String,
    pub conversion_id: String,
    pub conversion_timestamp: DateTime<Utc>,
    pub chain: Vec<String>,
    pub first_event: NaiveDate,
    pub purchase_date: NaiveDate,
    pub purchase_value: f64,
    /// Conversions folded into this chain. 1 until merged.
    #[serde(default = "one")]
    pub nr_conversions: u32,
}

fn one() -> u32 {
    1
}

impl Chain {
    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    /// Whole days between the first touchpoint and the purchase.
    pub fn chain_duration(&self) -> i64 {
        (self.purchase_date - self.first_event).num_days()
    }

    pub fn is_multi_touch(&self) -> bool {
        self.chain.len() > 1
    }

    pub fn path(&self, separator: &str) -> String {
        self.chain.join(separator)
    }
}

/// A chain paired with the touchpoints of earlier qualifying chains
/// prefixed onto its own. The raw `chain` is left untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcatenatedChain {
    #[serde(flatten)]
    pub chain: Chain,
    pub concat_chain: Vec<String>,
}

impl ConcatenatedChain {
    /// The chain as consumed downstream: the concatenated sequence
    /// replaces the raw one.
    pub fn into_chain(self) -> Chain {
        Chain {
            chain: self.concat_chain,
            ..self.chain
        }
    }
}

/// Persisted row of the final chain set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainRecord {
    #[serde(flatten)]
    pub chain: Chain,
    pub chain_len: usize,
    pub chain_duration: i64,
}

impl From<Chain> for ChainRecord {
    fn from(chain: Chain) -> Self {
        Self {
            chain_len: chain.chain_len(),
            chain_duration: chain.chain_duration(),
            chain,
        }
    }
}

/// Accepts `true`/`false` as well as the `1`/`0` integer flags common in
/// warehouse exports.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(0) => Ok(false),
        Flag::Int(1) => Ok(true),
        Flag::Int(other) => Err(serde::de::Error::custom(format!(
            "purchase flag must be 0 or 1, got {other}"
        ))),
    }
}
