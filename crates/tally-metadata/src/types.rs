//! Metadata keys, values and the shared vocabulary for describing series.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use tally_core::TagSet;

/// How a series should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateType {
    Gauge,
    Counter,
    Rate,
}

impl RateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateType::Gauge => "gauge",
            RateType::Counter => "counter",
            RateType::Rate => "rate",
        }
    }
}

impl fmt::Display for RateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of a series' values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    /// Dimensionless counts and events.
    None,
    Amps,
    Bool,
    Bytes,
    KBytes,
    BytesPerSecond,
    Celsius,
    Entropy,
    CentiHertz,
    ContextSwitch,
    Interrupt,
    Load,
    MegaHertz,
    /// 0 = ok, anything else = not ok.
    Ok,
    Page,
    /// Range 0 to 100.
    Percent,
    PerSecond,
    Process,
    Rpm,
    Second,
    MilliSecond,
    Socket,
    StatusCode,
    Volt,
    TenthVolt,
    Megabit,
    Operation,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::None => "",
            Unit::Amps => "A",
            Unit::Bool => "bool",
            Unit::Bytes => "bytes",
            Unit::KBytes => "kbytes",
            Unit::BytesPerSecond => "bytes per second",
            Unit::Celsius => "C",
            Unit::Entropy => "entropy",
            Unit::CentiHertz => "CentiHertz",
            Unit::ContextSwitch => "context switches",
            Unit::Interrupt => "interrupts",
            Unit::Load => "load",
            Unit::MegaHertz => "MHz",
            Unit::Ok => "ok",
            Unit::Page => "pages",
            Unit::Percent => "percent",
            Unit::PerSecond => "per second",
            Unit::Process => "processes",
            Unit::Rpm => "RPM",
            Unit::Second => "seconds",
            Unit::MilliSecond => "milliseconds",
            Unit::Socket => "sockets",
            Unit::StatusCode => "status code",
            Unit::Volt => "V",
            Unit::TenthVolt => "tenth-Volts",
            Unit::Megabit => "Mbit",
            Unit::Operation => "Operations",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metadata value.
///
/// Equality is structural, records included; it decides whether an
/// overwrite counts as a change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Int(i64),
    Float(f64),
    Str(String),
    Record(BTreeMap<String, MetaValue>),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Int(v) => write!(f, "{v}"),
            MetaValue::Float(v) => write!(f, "{v}"),
            MetaValue::Str(v) => f.write_str(v),
            MetaValue::Record(fields) => {
                f.write_str("{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Str(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Str(v)
    }
}

impl From<RateType> for MetaValue {
    fn from(v: RateType) -> Self {
        MetaValue::Str(v.as_str().to_string())
    }
}

impl From<Unit> for MetaValue {
    fn from(v: Unit) -> Self {
        MetaValue::Str(v.as_str().to_string())
    }
}

impl From<BTreeMap<String, MetaValue>> for MetaValue {
    fn from(v: BTreeMap<String, MetaValue>) -> Self {
        MetaValue::Record(v)
    }
}

/// Identity of one metadata entry. Ordered by metric, then tags, then name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetaKey {
    pub metric: String,
    pub tags: TagSet,
    pub name: String,
}

impl fmt::Display for MetaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.metric, self.tags.to_tags_string(), self.name)
    }
}

/// Wire form of one entry in a metadata flush.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetaSend<'a> {
    #[serde(skip_serializing_if = "str::is_empty")]
    pub metric: &'a str,
    #[serde(skip_serializing_if = "TagSet::is_empty")]
    pub tags: &'a TagSet,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub name: &'a str,
    pub value: &'a MetaValue,
}

impl<'a> MetaSend<'a> {
    pub fn new(key: &'a MetaKey, value: &'a MetaValue) -> Self {
        Self {
            metric: &key.metric,
            tags: &key.tags,
            name: &key.name,
            value,
        }
    }
}
