use anyhow::{anyhow, Result};

/// One hour of raw clickstream. Values are kept exactly as supplied (`"01"` stays `"01"`)
/// since they are also written out as the partition column values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionKey {
    pub year: String,
    pub month: String,
    pub day: String,
    pub hour: String,
}

impl PartitionKey {
    pub fn new(year: &str, month: &str, day: &str, hour: &str) -> Result<PartitionKey> {
        Ok(PartitionKey {
            year: parse_component(year)?,
            month: parse_component(month)?,
            day: parse_component(day)?,
            hour: parse_component(hour)?,
        })
    }

    /// `YYYY/MM/DD/HH/`, relative to the raw base.
    pub fn raw_path(&self) -> String {
        format!("{}/{}/{}/{}/", self.year, self.month, self.day, self.hour)
    }

    /// `year=YYYY/month=MM/day=DD/`, relative to a table root.
    pub fn date_path(&self) -> String {
        format!("year={}/month={}/day={}/", self.year, self.month, self.day)
    }
}

/// Partition components are non-empty runs of ASCII digits.
pub fn parse_component(s: &str) -> Result<String> {
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        Ok(s.to_string())
    } else {
        Err(anyhow!("expected digits, got '{}'", s))
    }
}
