use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::Deserialize;

/// A bucket plus a key prefix, e.g. `s3://company-raw/clickstream/`.
///
/// The prefix is either empty or ends with `/`, so keys can be appended directly.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct S3Uri {
    pub bucket: String,
    pub prefix: String,
}

impl S3Uri {
    /// Accepts `s3://bucket/prefix`, `bucket/prefix` or a bare `bucket`.
    pub fn parse(s: &str) -> Result<S3Uri> {
        let rest = s.trim().strip_prefix("s3://").unwrap_or(s.trim());
        let (bucket, prefix) = match rest.split_once('/') {
            Some((bucket, prefix)) => (bucket, prefix),
            None => (rest, ""),
        };
        if bucket.is_empty() {
            return Err(anyhow!("no bucket in S3 location '{}'", s));
        }

        let prefix = prefix.trim_matches('/');
        let prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", prefix)
        };

        Ok(S3Uri {
            bucket: bucket.to_string(),
            prefix,
        })
    }

    /// Full object key for a path relative to this location.
    pub fn key(&self, relative: &str) -> String {
        format!("{}{}", self.prefix, relative.trim_start_matches('/'))
    }

    /// The location of a sub-directory of this one.
    pub fn join(&self, relative: &str) -> S3Uri {
        let prefix = self.key(relative);
        let prefix = match prefix.trim_end_matches('/') {
            "" => String::new(),
            p => format!("{}/", p),
        };
        S3Uri {
            bucket: self.bucket.clone(),
            prefix,
        }
    }
}

impl FromStr for S3Uri {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        S3Uri::parse(s)
    }
}

impl TryFrom<String> for S3Uri {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self> {
        S3Uri::parse(&s)
    }
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_scheme() {
        let uri = S3Uri::parse("s3://company-raw/clickstream/").unwrap();
        assert_eq!(uri.bucket, "company-raw");
        assert_eq!(uri.prefix, "clickstream/");
        assert_eq!(uri.to_string(), "s3://company-raw/clickstream/");
    }

    #[test]
    fn test_parse_normalizes_prefix() {
        assert_eq!(S3Uri::parse("s3://b/a/b").unwrap().prefix, "a/b/");
        assert_eq!(S3Uri::parse("b//a//").unwrap().prefix, "a/");
        assert_eq!(S3Uri::parse("s3://company-alerts/").unwrap().prefix, "");
    }

    #[test]
    fn test_parse_bare_bucket() {
        let uri: S3Uri = "company-alerts".parse().unwrap();
        assert_eq!(uri.bucket, "company-alerts");
        assert_eq!(uri.prefix, "");
        assert_eq!(uri.key("purchases/x.json"), "purchases/x.json");
    }

    #[test]
    fn test_parse_rejects_missing_bucket() {
        assert!(S3Uri::parse("s3://").is_err());
        assert!(S3Uri::parse("/prefix").is_err());
        assert!(S3Uri::parse("").is_err());
    }

    #[test]
    fn test_join_and_key() {
        let base = S3Uri::parse("s3://company-processed/clickstream").unwrap();
        let table = base.join("dim_users/year=2024/month=01/day=02/");
        assert_eq!(table.bucket, "company-processed");
        assert_eq!(table.prefix, "clickstream/dim_users/year=2024/month=01/day=02/");
        assert_eq!(
            table.key("part-00000.snappy.parquet"),
            "clickstream/dim_users/year=2024/month=01/day=02/part-00000.snappy.parquet"
        );
    }
}
