//! Arrow layout of the output tables and their Parquet encoding.
use std::sync::Arc;

use anyhow::Result;
use arrow::array::{
    Array, ArrayRef, MapBuilder, StringArray, StringBuilder, TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::partition::PartitionKey;
use crate::transform::{ClickFact, UserDimension};

pub const DIM_USERS_TABLE: &str = "dim_users";
pub const FACT_CLICKS_TABLE: &str = "fact_clicks";

const UTC: &str = "UTC";

fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, Some(UTC.into()))
}

fn timestamp_array(values: impl Iterator<Item = Option<DateTime<Utc>>>) -> ArrayRef {
    let micros = values
        .map(|ts| ts.map(|ts| ts.timestamp_micros()))
        .collect::<Vec<_>>();
    Arc::new(TimestampMicrosecondArray::from(micros).with_timezone(UTC))
}

fn string_array<'a>(values: impl Iterator<Item = Option<&'a str>>) -> ArrayRef {
    Arc::new(values.collect::<StringArray>())
}

/// `year`, `month` and `day` columns, constant over the batch.
fn partition_columns(partition: &PartitionKey, rows: usize) -> Vec<(Field, ArrayRef)> {
    [
        ("year", &partition.year),
        ("month", &partition.month),
        ("day", &partition.day),
    ]
    .into_iter()
    .map(|(name, value)| {
        let array: ArrayRef = Arc::new(StringArray::from(vec![value.as_str(); rows]));
        (Field::new(name, DataType::Utf8, false), array)
    })
    .collect()
}

fn to_batch(columns: Vec<(Field, ArrayRef)>) -> Result<RecordBatch> {
    let (fields, arrays): (Vec<_>, Vec<_>) = columns.into_iter().unzip();
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

pub fn user_dimension_batch(rows: &[UserDimension], partition: &PartitionKey) -> Result<RecordBatch> {
    let mut columns = vec![
        (
            Field::new("user_id", DataType::Utf8, true),
            string_array(rows.iter().map(|r| r.user_id.as_deref())),
        ),
        (
            Field::new("first_seen", timestamp_type(), true),
            timestamp_array(rows.iter().map(|r| r.first_seen)),
        ),
        (
            Field::new("last_seen", timestamp_type(), true),
            timestamp_array(rows.iter().map(|r| r.last_seen)),
        ),
        (
            Field::new("user_agent", DataType::Utf8, true),
            string_array(rows.iter().map(|r| r.user_agent.as_deref())),
        ),
        (
            Field::new("ip", DataType::Utf8, true),
            string_array(rows.iter().map(|r| r.ip.as_deref())),
        ),
    ];
    columns.extend(partition_columns(partition, rows.len()));
    to_batch(columns)
}

pub fn click_fact_batch(rows: &[ClickFact], partition: &PartitionKey) -> Result<RecordBatch> {
    let mut attrs = MapBuilder::new(None, StringBuilder::new(), StringBuilder::new());
    for row in rows {
        match &row.attrs {
            Some(map) => {
                for (k, v) in map {
                    attrs.keys().append_value(k);
                    attrs.values().append_option(v.as_deref());
                }
                attrs.append(true)?;
            }
            None => attrs.append(false)?,
        }
    }
    let attrs: ArrayRef = Arc::new(attrs.finish());

    let mut columns = vec![
        (
            Field::new("click_id", DataType::Utf8, false),
            string_array(rows.iter().map(|r| Some(r.click_id.as_str()))),
        ),
        (
            Field::new("event_time", timestamp_type(), true),
            timestamp_array(rows.iter().map(|r| r.event_time)),
        ),
        (
            Field::new("user_id", DataType::Utf8, true),
            string_array(rows.iter().map(|r| r.user_id.as_deref())),
        ),
        (
            Field::new("session_id", DataType::Utf8, true),
            string_array(rows.iter().map(|r| r.session_id.as_deref())),
        ),
        (
            Field::new("action", DataType::Utf8, true),
            string_array(rows.iter().map(|r| r.action.as_deref())),
        ),
        (
            Field::new("page_url", DataType::Utf8, true),
            string_array(rows.iter().map(|r| r.page_url.as_deref())),
        ),
        (
            Field::new("attrs", attrs.data_type().clone(), true),
            attrs,
        ),
    ];
    columns.extend(partition_columns(partition, rows.len()));
    to_batch(columns)
}

/// Encodes a batch as a single Snappy-compressed Parquet file.
pub fn serialize_parquet(batch: &RecordBatch) -> Result<Vec<u8>> {
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(Vec::new(), batch.schema(), Some(props))?;
    writer.write(batch)?;
    Ok(writer.into_inner()?)
}

/// File name of output unit `n`.
pub fn part_file_name(n: usize) -> String {
    format!("part-{:05}.snappy.parquet", n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::AsArray;
    use arrow::datatypes::TimestampMicrosecondType;
    use bytes::Bytes;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::collections::BTreeMap;

    fn partition() -> PartitionKey {
        PartitionKey::new("2024", "01", "02", "03").unwrap()
    }

    fn read_back(bytes: Vec<u8>) -> RecordBatch {
        let reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(bytes))
            .unwrap()
            .build()
            .unwrap();
        let batches = reader.collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(batches.len(), 1);
        batches.into_iter().next().unwrap()
    }

    #[test]
    fn test_user_dimension_roundtrip() {
        let seen = DateTime::parse_from_rfc3339("2023-11-14T22:13:20Z")
            .unwrap()
            .with_timezone(&Utc);
        let rows = vec![
            UserDimension {
                user_id: None,
                first_seen: None,
                last_seen: None,
                user_agent: None,
                ip: Some("1.1.1.1".to_string()),
            },
            UserDimension {
                user_id: Some("u1".to_string()),
                first_seen: Some(seen),
                last_seen: Some(seen),
                user_agent: Some("ua".to_string()),
                ip: None,
            },
        ];
        let batch = user_dimension_batch(&rows, &partition()).unwrap();
        let batch = read_back(serialize_parquet(&batch).unwrap());

        assert_eq!(batch.num_rows(), 2);
        let user_id = batch.column_by_name("user_id").unwrap().as_string::<i32>();
        assert!(user_id.is_null(0));
        assert_eq!(user_id.value(1), "u1");

        let first_seen = batch
            .column_by_name("first_seen")
            .unwrap()
            .as_primitive::<TimestampMicrosecondType>();
        assert!(first_seen.is_null(0));
        assert_eq!(first_seen.value(1), 1_700_000_000_000_000);

        let month = batch.column_by_name("month").unwrap().as_string::<i32>();
        assert_eq!(month.value(0), "01");
        assert_eq!(month.value(1), "01");
    }

    #[test]
    fn test_click_fact_attrs() {
        let mut attrs = BTreeMap::new();
        attrs.insert("amount".to_string(), Some("9.99".to_string()));
        attrs.insert("coupon".to_string(), None);
        let rows = vec![
            ClickFact {
                click_id: "ab".repeat(32),
                event_time: None,
                user_id: Some("u1".to_string()),
                session_id: None,
                action: Some("purchase".to_string()),
                page_url: None,
                attrs: Some(attrs),
            },
            ClickFact {
                click_id: "cd".repeat(32),
                event_time: None,
                user_id: None,
                session_id: None,
                action: None,
                page_url: None,
                attrs: None,
            },
        ];
        let batch = click_fact_batch(&rows, &partition()).unwrap();
        assert_eq!(batch.num_columns(), 10);
        let batch = read_back(serialize_parquet(&batch).unwrap());

        let event_time = batch.column_by_name("event_time").unwrap();
        assert_eq!(event_time.null_count(), 2);

        let attrs = batch.column_by_name("attrs").unwrap().as_map();
        assert!(attrs.is_valid(0));
        assert!(attrs.is_null(1));
        let entries = attrs.value(0);
        let keys = entries.column(0).as_string::<i32>();
        let values = entries.column(1).as_string::<i32>();
        assert_eq!(keys.value(0), "amount");
        assert_eq!(values.value(0), "9.99");
        assert_eq!(keys.value(1), "coupon");
        assert!(values.is_null(1));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let rows = vec![UserDimension {
            user_id: Some("u1".to_string()),
            first_seen: None,
            last_seen: None,
            user_agent: None,
            ip: None,
        }];
        let a = serialize_parquet(&user_dimension_batch(&rows, &partition()).unwrap()).unwrap();
        let b = serialize_parquet(&user_dimension_batch(&rows, &partition()).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_part_file_name() {
        assert_eq!(part_file_name(0), "part-00000.snappy.parquet");
        assert_eq!(part_file_name(7), "part-00007.snappy.parquet");
    }
}
