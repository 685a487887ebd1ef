//! The two pipelines run over one hour of events: per-user aggregation and the 1:1
//! click projection. Both are pure functions of their input.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use shared::{Attributes, ClickEvent};

use crate::timestamp::{normalize_event_time, timestamp_string};

pub const CLICK_ID_DELIMITER: &str = "::";

/// A raw event with its canonical timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    pub event: ClickEvent,
    pub event_ts: Option<DateTime<Utc>>,
}

impl NormalizedEvent {
    pub fn new(event: ClickEvent) -> Self {
        let event_ts = normalize_event_time(event.event_time.as_deref());
        NormalizedEvent { event, event_ts }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDimension {
    pub user_id: Option<String>,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickFact {
    pub click_id: String,
    pub event_time: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub action: Option<String>,
    pub page_url: Option<String>,
    pub attrs: Option<Attributes>,
}

/// Position of an event in chronological order: timestamp (missing sorts first), then
/// input position.
type EventOrder = (Option<DateTime<Utc>>, usize);

#[derive(Default)]
struct UserAgg {
    first_seen: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
    user_agent: Option<(EventOrder, String)>,
    ip: Option<(EventOrder, String)>,
}

fn keep_latest(slot: &mut Option<(EventOrder, String)>, order: EventOrder, value: Option<&String>) {
    if let Some(value) = value {
        if slot.as_ref().map_or(true, |(current, _)| order > *current) {
            *slot = Some((order, value.clone()));
        }
    }
}

/// One row per distinct `user_id` (absent ids form their own group), sorted by id.
///
/// `user_agent` and `ip` each come from the chronologically latest event that carries
/// the field.
pub fn build_user_dimension(events: &[NormalizedEvent]) -> Vec<UserDimension> {
    let mut users = BTreeMap::<Option<&str>, UserAgg>::new();

    for (idx, e) in events.iter().enumerate() {
        let agg = users.entry(e.event.user_id.as_deref()).or_default();

        if let Some(ts) = e.event_ts {
            agg.first_seen = Some(agg.first_seen.map_or(ts, |first| first.min(ts)));
            agg.last_seen = Some(agg.last_seen.map_or(ts, |last| last.max(ts)));
        }

        let order = (e.event_ts, idx);
        keep_latest(&mut agg.user_agent, order, e.event.user_agent.as_ref());
        keep_latest(&mut agg.ip, order, e.event.ip.as_ref());
    }

    users
        .into_iter()
        .map(|(user_id, agg)| UserDimension {
            user_id: user_id.map(str::to_string),
            first_seen: agg.first_seen,
            last_seen: agg.last_seen,
            user_agent: agg.user_agent.map(|(_, v)| v),
            ip: agg.ip.map(|(_, v)| v),
        })
        .collect()
}

/// Deterministic id of a click: hex SHA-256 over the identifying fields joined with
/// `::`. Absent fields contribute an empty string but keep their position.
pub fn click_id(
    user_id: Option<&str>,
    session_id: Option<&str>,
    event_ts: Option<&DateTime<Utc>>,
    action: Option<&str>,
    page_url: Option<&str>,
) -> String {
    let ts = event_ts.map(timestamp_string);
    let parts = [user_id, session_id, ts.as_deref(), action, page_url];

    let mut hasher = Sha256::new();
    for (i, part) in parts.into_iter().enumerate() {
        if i > 0 {
            hasher.update(CLICK_ID_DELIMITER.as_bytes());
        }
        hasher.update(part.unwrap_or_default().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

pub fn build_click_facts(events: &[NormalizedEvent]) -> Vec<ClickFact> {
    events
        .iter()
        .map(|e| ClickFact {
            click_id: click_id(
                e.event.user_id.as_deref(),
                e.event.session_id.as_deref(),
                e.event_ts.as_ref(),
                e.event.action.as_deref(),
                e.event.page_url.as_deref(),
            ),
            event_time: e.event_ts,
            user_id: e.event.user_id.clone(),
            session_id: e.event.session_id.clone(),
            action: e.event.action.clone(),
            page_url: e.event.page_url.clone(),
            attrs: e.event.attributes.clone(),
        })
        .collect()
}

/// Output unit of a fact row, from the first byte of its click id.
pub fn output_unit(click_id: &str, units: usize) -> usize {
    let first_byte = click_id
        .get(..2)
        .and_then(|b| u8::from_str_radix(b, 16).ok())
        .unwrap_or(0);
    first_byte as usize % units.max(1)
}

/// Splits facts into `units` groups, keeping input order within each group.
pub fn split_into_units(facts: Vec<ClickFact>, units: usize) -> Vec<Vec<ClickFact>> {
    let units = units.max(1);
    let mut out = vec![vec![]; units];
    for fact in facts {
        let unit = output_unit(&fact.click_id, units);
        out[unit].push(fact);
    }
    out
}
