use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Attribute map of a click event. JSON nulls are kept as null values.
pub type Attributes = BTreeMap<String, Option<String>>;

/// A raw clickstream record as it lands in the raw bucket. Nothing is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickEvent {
    /// ISO-8601 timestamp or epoch seconds, still unparsed.
    pub event_time: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub action: Option<String>,
    pub page_url: Option<String>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub attributes: Option<Attributes>,
}

impl ClickEvent {
    /// Reads a record leniently, the way a schema-on-read JSON scan with string columns
    /// would: strings are taken as is, anything else but `null` keeps its JSON text.
    ///
    /// Returns `None` when the value is not a JSON object.
    pub fn from_value(value: &Value) -> Option<ClickEvent> {
        let fields = value.as_object()?;
        let text = |name: &str| fields.get(name).and_then(scalar_text);

        let attributes = match fields.get("attributes") {
            Some(Value::Object(attrs)) => Some(
                attrs
                    .iter()
                    .map(|(k, v)| (k.clone(), scalar_text(v)))
                    .collect::<Attributes>(),
            ),
            _ => None,
        };

        Some(ClickEvent {
            event_time: text("event_time"),
            user_id: text("user_id"),
            session_id: text("session_id"),
            action: text("action"),
            page_url: text("page_url"),
            user_agent: text("user_agent"),
            ip: text("ip"),
            attributes,
        })
    }

    /// Parses one NDJSON line. `None` for invalid JSON and for non-object values.
    pub fn from_line(line: &str) -> Option<ClickEvent> {
        let value = serde_json::from_str::<Value>(line).ok()?;
        ClickEvent::from_value(&value)
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
        Value::Null => None,
    }
}
