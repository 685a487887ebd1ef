use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PURCHASE_ACTION: &str = "purchase";

/// Alert payload for a purchase event. Fields are copied verbatim from the raw record
/// (`null` when absent); `raw` keeps the full record for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub user_id: Value,
    pub session_id: Value,
    pub event_time: Value,
    pub amount: Value,
    pub page_url: Value,
    pub raw: Value,
}

/// Returns an alert if the record is a purchase.
///
/// A record whose fields cannot be read (not an object, or `attributes` present but not
/// an object) yields no alert.
pub fn purchase_alert(record: &Value) -> Option<Alert> {
    let fields = record.as_object()?;
    if fields.get("action").and_then(Value::as_str) != Some(PURCHASE_ACTION) {
        return None;
    }

    let amount = match fields.get("attributes") {
        None => Value::Null,
        Some(Value::Object(attrs)) => attrs.get("amount").cloned().unwrap_or(Value::Null),
        Some(_) => return None,
    };
    let field = |name: &str| fields.get(name).cloned().unwrap_or(Value::Null);

    Some(Alert {
        user_id: field("user_id"),
        session_id: field("session_id"),
        event_time: field("event_time"),
        amount,
        page_url: field("page_url"),
        raw: record.clone(),
    })
}
