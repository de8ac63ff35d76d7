//! Notification latency diagnostics
//!
//! Extracts the `TimeInstant` attribute a context broker embeds in its
//! notifications and compares it with the moment the notification arrived.
//! Two payload shapes are understood, tried in the order of [`SHAPES`].

use crate::error::PayloadError;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

/// Name of the attribute carrying the send timestamp
pub const TIME_INSTANT: &str = "TimeInstant";

/// Known notification layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// `contextResponses[0].contextElement.attributes[] { name: "TimeInstant", value }`
    NgsiV1,
    /// `data[0].TimeInstant.value`
    NgsiV2,
}

/// Extraction order
pub const SHAPES: [PayloadShape; 2] = [PayloadShape::NgsiV1, PayloadShape::NgsiV2];

/// Outcome of matching one shape against a document
enum Extraction {
    /// The shape's container path does not exist
    NoMatch,
    /// The container exists but carries no string `TimeInstant` value
    NoTimestamp,
    Found(String),
}

/// Path of the v1 attribute list
const V1_ATTRIBUTES: &str = "/contextResponses/0/contextElement/attributes";

/// Path of the first v2 entity
const V2_ENTITY: &str = "/data/0";

/// One v1 attribute; `name` and `value` may be missing or of any type
#[derive(Deserialize)]
struct Attribute {
    #[serde(default)]
    name: Value,
    #[serde(default)]
    value: Value,
}

impl PayloadShape {
    pub fn name(&self) -> &'static str {
        match self {
            PayloadShape::NgsiV1 => "NGSIv1",
            PayloadShape::NgsiV2 => "NGSIv2",
        }
    }

    /// Only the shape's own path is inspected; siblings may hold anything
    fn extract(&self, document: &Value) -> Extraction {
        match self {
            PayloadShape::NgsiV1 => {
                let Some(attributes) = document.pointer(V1_ATTRIBUTES).and_then(Value::as_array)
                else {
                    return Extraction::NoMatch;
                };
                attributes
                    .iter()
                    .filter(|entry| entry.is_object())
                    .filter_map(|entry| Attribute::deserialize(entry).ok())
                    .filter(|attribute| attribute.name.as_str() == Some(TIME_INSTANT))
                    .find_map(|attribute| attribute.value.as_str().map(str::to_owned))
                    .map_or(Extraction::NoTimestamp, Extraction::Found)
            }
            PayloadShape::NgsiV2 => {
                let Some(entity) = document.pointer(V2_ENTITY).and_then(Value::as_object) else {
                    return Extraction::NoMatch;
                };
                entity
                    .get(TIME_INSTANT)
                    .and_then(|attribute| attribute.get("value"))
                    .and_then(Value::as_str)
                    .map_or(Extraction::NoTimestamp, |value| {
                        Extraction::Found(value.to_owned())
                    })
            }
        }
    }
}

/// Result of a successful analysis
#[derive(Debug, Clone, PartialEq)]
pub struct LatencyResult {
    pub shape: PayloadShape,
    /// Timestamp embedded by the sender
    pub sent: DateTime<FixedOffset>,
    /// Moment the analysis ran
    pub observed: DateTime<Utc>,
    /// `observed - sent` in milliseconds; negative when the sender's clock is ahead
    pub delta_millis: i64,
}

/// Analyzes a payload against the current wall clock
pub fn analyze(payload: &[u8]) -> Result<LatencyResult, PayloadError> {
    analyze_at(payload, Utc::now())
}

/// Analyzes a payload against an explicit observation time
pub fn analyze_at(payload: &[u8], observed: DateTime<Utc>) -> Result<LatencyResult, PayloadError> {
    let document: Value = serde_json::from_slice(payload)?;
    let (shape, raw) = find_timestamp(&document)?;
    let sent = parse_timestamp(&raw)?;
    let delta_millis = observed
        .signed_duration_since(sent.with_timezone(&Utc))
        .num_milliseconds();

    Ok(LatencyResult {
        shape,
        sent,
        observed,
        delta_millis,
    })
}

/// Runs [`analyze`] and logs the outcome. Never fails.
pub fn analyze_and_log(payload: &[u8]) -> Option<LatencyResult> {
    match analyze(payload) {
        Ok(result) => {
            info!(
                "# TimeInstant NOW: {} RECEIVED: {}",
                result.observed.to_rfc3339(),
                result.sent.to_rfc3339()
            );
            info!("# Diff: {} ms", result.delta_millis);
            Some(result)
        }
        Err(e) => {
            warn!("Latency analysis failed: {}", e);
            None
        }
    }
}

fn find_timestamp(document: &Value) -> Result<(PayloadShape, String), PayloadError> {
    let mut partial = None;
    for shape in SHAPES {
        match shape.extract(document) {
            Extraction::Found(value) => return Ok((shape, value)),
            Extraction::NoTimestamp => {
                partial.get_or_insert(shape);
            }
            Extraction::NoMatch => {}
        }
    }
    match partial {
        Some(shape) => Err(PayloadError::MissingTimestampField {
            shape: shape.name(),
        }),
        None => Err(PayloadError::UnrecognizedShape),
    }
}

/// Parses the timestamp formats context brokers emit
///
/// Accepts RFC 3339, ISO 8601 with a compact `+hhmm` offset, and values with
/// no offset at all, which are taken as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>, PayloadError> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed);
    }
    if let Ok(parsed) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Ok(parsed);
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc().fixed_offset())
        .map_err(|_| PayloadError::InvalidTimestamp {
            value: value.to_string(),
        })
}
