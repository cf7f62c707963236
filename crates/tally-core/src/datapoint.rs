//! The unit moved through the ingestion channel and the send buffer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tags::TagSet;

/// Numeric value of a data point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(v) => write!(f, "{v}"),
            MetricValue::Float(v) => write!(f, "{v}"),
        }
    }
}

/// One observation in transit to the sink.
///
/// Serializes to the OpenTSDB `/api/put` object
/// `{"metric", "timestamp", "value", "tags"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub metric: String,
    /// Unix seconds.
    pub timestamp: i64,
    pub value: MetricValue,
    pub tags: TagSet,
}

impl DataPoint {
    pub fn new(
        metric: impl Into<String>,
        timestamp: i64,
        value: impl Into<MetricValue>,
        tags: TagSet,
    ) -> Self {
        Self {
            metric: metric.into(),
            timestamp,
            value: value.into(),
            tags,
        }
    }

    /// OpenTSDB telnet form: `put <metric> <timestamp> <value> k=v ...`.
    pub fn telnet(&self) -> String {
        let mut line = format!("put {} {} {}", self.metric, self.timestamp, self.value);
        for (k, v) in self.tags.iter() {
            line.push(' ');
            line.push_str(k);
            line.push('=');
            line.push_str(v);
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_wire_form() {
        let dp = DataPoint::new("app.requests", 1_700_000_000, 42i64, TagSet::new().with("host", "web01"));
        let json = serde_json::to_value(&dp).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "metric": "app.requests",
                "timestamp": 1_700_000_000,
                "value": 42,
                "tags": {"host": "web01"}
            })
        );
    }

    #[test]
    fn float_value_serializes_as_number() {
        let dp = DataPoint::new("app.load", 10, 0.5, TagSet::new());
        let json = serde_json::to_value(&dp).unwrap();
        assert_eq!(json["value"], serde_json::json!(0.5));
    }

    #[test]
    fn telnet_line() {
        let tags = TagSet::new().with("zone", "b").with("host", "web01");
        let dp = DataPoint::new("app.requests", 1000, 7i64, tags);
        assert_eq!(dp.telnet(), "put app.requests 1000 7 host=web01 zone=b");
    }
}
