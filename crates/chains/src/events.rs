//! Event table — validates the materialized touchpoint table and puts it in
//! the order the chain builder scans it.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use attribution_core::error::{AttributionError, AttributionResult};
use attribution_core::types::{Event, RawEvent};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

/// Validated events sorted by `(customer_id, first_event_timestamp, session_id,
/// event_timestamp)`; sessions starting together stay contiguous.
/// Immutable for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct EventTable {
    events: Vec<Event>,
}

/// Descriptive counts logged when the table is loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputProfile {
    pub rows: usize,
    pub sessions: usize,
    pub converting_sessions: usize,
    pub customers: usize,
    pub events_start: Option<NaiveDate>,
    pub events_end: Option<NaiveDate>,
    pub conversions_start: Option<NaiveDate>,
    pub conversions_end: Option<NaiveDate>,
}

#[derive(Default)]
struct SessionCheck {
    last_event_dates: BTreeSet<NaiveDate>,
    purchase_flags: BTreeSet<bool>,
}

impl EventTable {
    /// Validate raw rows and sort them. Any session-level invariant
    /// violation aborts with the offending session ids.
    pub fn from_raw(rows: Vec<RawEvent>) -> AttributionResult<Self> {
        if rows.is_empty() {
            return Err(AttributionError::EmptyInput);
        }

        let missing: BTreeSet<String> = rows
            .iter()
            .filter(|r| r.channel_group.is_none())
            .map(|r| r.session_id.clone())
            .collect();
        if !missing.is_empty() {
            return Err(AttributionError::MissingChannelGroup {
                sessions: missing.into_iter().collect(),
            });
        }

        let blank: BTreeSet<String> = rows
            .iter()
            .filter(|r| r.channel_group.as_deref().is_some_and(|c| c.trim().is_empty()))
            .map(|r| r.session_id.clone())
            .collect();
        if !blank.is_empty() {
            return Err(AttributionError::InvalidChannelLabel {
                reason: "blank channel group".to_string(),
                sessions: blank.into_iter().collect(),
            });
        }

        // NaN fails the comparison too.
        let bad_revenue: BTreeSet<String> = rows
            .iter()
            .filter(|r| !(r.session_revenue >= 0.0 && r.session_revenue.is_finite()))
            .map(|r| r.session_id.clone())
            .collect();
        if !bad_revenue.is_empty() {
            return Err(AttributionError::InvalidRevenue {
                sessions: bad_revenue.into_iter().collect(),
            });
        }

        let mut events: Vec<Event> = rows.into_iter().filter_map(Event::from_raw).collect();

        let mut sessions: BTreeMap<&str, SessionCheck> = BTreeMap::new();
        for event in &events {
            let check = sessions.entry(event.session_id.as_str()).or_default();
            check.last_event_dates.insert(event.last_event_date);
            check.purchase_flags.insert(event.f_purchased);
        }

        let conflicting_dates: Vec<String> = sessions
            .iter()
            .filter(|(_, c)| c.last_event_dates.len() > 1)
            .map(|(s, _)| s.to_string())
            .collect();
        if !conflicting_dates.is_empty() {
            return Err(AttributionError::ConflictingLastEventDate {
                sessions: conflicting_dates,
            });
        }

        let conflicting_flags: Vec<String> = sessions
            .iter()
            .filter(|(_, c)| c.purchase_flags.len() > 1)
            .map(|(s, _)| s.to_string())
            .collect();
        if !conflicting_flags.is_empty() {
            return Err(AttributionError::ConflictingPurchaseFlag {
                sessions: conflicting_flags,
            });
        }

        events.sort_by(|a, b| {
            a.customer_id
                .cmp(&b.customer_id)
                .then(a.first_event_timestamp.cmp(&b.first_event_timestamp))
                .then(a.session_id.cmp(&b.session_id))
                .then(a.event_timestamp.cmp(&b.event_timestamp))
        });

        let table = Self { events };
        let profile = table.profile();
        info!(
            rows = profile.rows,
            sessions = profile.sessions,
            conversions = profile.converting_sessions,
            customers = profile.customers,
            "Input event table validated"
        );
        Ok(table)
    }

    /// Every channel label must survive a join on `separator`.
    pub fn ensure_channels_separable(&self, separator: &str) -> AttributionResult<()> {
        let sessions: BTreeSet<String> = self
            .events
            .iter()
            .filter(|e| e.channel_group.contains(separator))
            .map(|e| e.session_id.clone())
            .collect();
        if sessions.is_empty() {
            return Ok(());
        }
        Err(AttributionError::InvalidChannelLabel {
            reason: format!("channel group contains path separator '{separator}'"),
            sessions: sessions.into_iter().collect(),
        })
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Contiguous per-customer slices, in customer order.
    pub fn customers(&self) -> impl Iterator<Item = &[Event]> {
        self.events.chunk_by(|a, b| a.customer_id == b.customer_id)
    }

    /// Number of distinct sessions flagged as purchases.
    pub fn converting_sessions(&self) -> usize {
        self.events
            .iter()
            .filter(|e| e.f_purchased)
            .map(|e| e.session_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn profile(&self) -> InputProfile {
        let sessions: HashSet<&str> = self.events.iter().map(|e| e.session_id.as_str()).collect();
        let conversions: Vec<&Event> = self.events.iter().filter(|e| e.f_purchased).collect();

        InputProfile {
            rows: self.events.len(),
            sessions: sessions.len(),
            converting_sessions: self.converting_sessions(),
            customers: self.customers().count(),
            events_start: self
                .events
                .iter()
                .map(|e| e.first_event_timestamp.date_naive())
                .min(),
            events_end: self.events.iter().map(|e| e.last_event_date).max(),
            conversions_start: conversions.iter().map(|e| e.last_event_date).min(),
            conversions_end: conversions.iter().map(|e| e.last_event_date).max(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    pub(crate) fn at(day: i64, hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::days(day) + Duration::hours(hour)
    }

    /// One single-event session starting at `day`/`hour`.
    pub(crate) fn raw(
        customer: &str,
        session: &str,
        channel: &str,
        day: i64,
        hour: i64,
        purchased: bool,
        revenue: f64,
    ) -> RawEvent {
        RawEvent {
            customer_id: customer.into(),
            session_id: session.into(),
            channel_group: Some(channel.into()),
            first_event_timestamp: at(day, hour),
            event_timestamp: Some(at(day, hour)),
            last_event_timestamp: at(day, hour) + Duration::minutes(30),
            f_purchased: purchased,
            session_revenue: revenue,
        }
    }

    #[test]
    fn test_sorted_by_customer_then_time() {
        let table = EventTable::from_raw(vec![
            raw("c2", "s3", "Email", 1, 0, true, 10.0),
            raw("c1", "s2", "Display", 2, 0, true, 10.0),
            raw("c1", "s1", "Search", 0, 0, false, 0.0),
        ])
        .unwrap();

        let order: Vec<&str> = table.events().iter().map(|e| e.session_id.as_str()).collect();
        assert_eq!(order, vec!["s1", "s2", "s3"]);
        assert_eq!(table.customers().count(), 2);
    }

    #[test]
    fn test_missing_channel_group_is_fatal() {
        let mut bad = raw("c1", "s1", "Search", 0, 0, true, 5.0);
        bad.channel_group = None;
        let err = EventTable::from_raw(vec![bad, raw("c1", "s2", "Email", 1, 0, false, 0.0)])
            .unwrap_err();
        match err {
            AttributionError::MissingChannelGroup { sessions } => assert_eq!(sessions, vec!["s1"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_conflicting_last_event_date_is_fatal() {
        let first = raw("c1", "s1", "Search", 0, 0, true, 5.0);
        let mut second = raw("c1", "s1", "Search", 0, 1, true, 5.0);
        second.last_event_timestamp = at(3, 0);
        let err = EventTable::from_raw(vec![first, second]).unwrap_err();
        assert!(matches!(err, AttributionError::ConflictingLastEventDate { .. }));
    }

    #[test]
    fn test_conflicting_purchase_flag_is_fatal() {
        let first = raw("c1", "s1", "Search", 0, 0, true, 5.0);
        let second = raw("c1", "s1", "Search", 0, 1, false, 5.0);
        let err = EventTable::from_raw(vec![first, second]).unwrap_err();
        assert!(matches!(err, AttributionError::ConflictingPurchaseFlag { .. }));
    }

    #[test]
    fn test_empty_input_is_fatal() {
        assert!(matches!(
            EventTable::from_raw(vec![]),
            Err(AttributionError::EmptyInput)
        ));
    }

    #[test]
    fn test_profile_counts() {
        let table = EventTable::from_raw(vec![
            raw("c1", "s1", "Search", 0, 0, false, 0.0),
            raw("c1", "s2", "Display", 2, 0, true, 10.0),
            raw("c2", "s3", "Email", 5, 0, true, 10.0),
        ])
        .unwrap();

        let profile = table.profile();
        assert_eq!(profile.rows, 3);
        assert_eq!(profile.sessions, 3);
        assert_eq!(profile.converting_sessions, 2);
        assert_eq!(profile.customers, 2);
        assert_eq!(profile.events_start, Some(at(0, 0).date_naive()));
        assert_eq!(profile.conversions_start, Some(at(2, 0).date_naive()));
        assert_eq!(profile.conversions_end, Some(at(5, 0).date_naive()));
    }

    #[test]
    fn test_blank_channel_group_is_fatal() {
        let err = EventTable::from_raw(vec![
            raw("c1", "s1", "", 0, 0, false, 0.0),
            raw("c1", "s2", "Email", 1, 0, true, 10.0),
        ])
        .unwrap_err();
        match err {
            AttributionError::InvalidChannelLabel { sessions, .. } => {
                assert_eq!(sessions, vec!["s1"])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_negative_or_nan_revenue_is_fatal() {
        for revenue in [-10.0, f64::NAN] {
            let err = EventTable::from_raw(vec![raw("c1", "s1", "Search", 0, 0, true, revenue)])
                .unwrap_err();
            match err {
                AttributionError::InvalidRevenue { sessions } => assert_eq!(sessions, vec!["s1"]),
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_label_containing_separator_is_rejected() {
        let table = EventTable::from_raw(vec![
            raw("c1", "s1", "Social>Paid", 0, 0, false, 0.0),
            raw("c1", "s2", "Email", 1, 0, true, 10.0),
        ])
        .unwrap();
        assert!(table.ensure_channels_separable(" / ").is_ok());
        assert!(matches!(
            table.ensure_channels_separable(">"),
            Err(AttributionError::InvalidChannelLabel { .. })
        ));
    }

    #[test]
    fn test_sessions_starting_together_stay_contiguous() {
        let mut rows = Vec::new();
        for (session, minute) in [("s1", 0), ("s2", 5), ("s1", 10), ("s2", 15)] {
            let mut r = raw("c1", session, "Search", 0, 0, session == "s1", 10.0);
            r.event_timestamp = Some(at(0, 0) + Duration::minutes(minute));
            rows.push(r);
        }
        let table = EventTable::from_raw(rows).unwrap();

        let order: Vec<&str> = table.events().iter().map(|e| e.session_id.as_str()).collect();
        assert_eq!(order, vec!["s1", "s1", "s2", "s2"]);
    }
}
