//! Messages exchanged with the host (the UI side).
//!
//! On the wire every message is a JSON array whose first element is a
//! numeric code:
//!
//! | code | message                | layout                                        |
//! |------|------------------------|-----------------------------------------------|
//! | 1    | SUBSCRIBE              | `[1, datasetId, channel]`                     |
//! | 2    | UNSUBSCRIBE            | `[2, datasetId, channel]`                     |
//! | 3    | SET_RANGE_OF_INTEREST  | `[3, datasetId, start, end, maxPoints]`       |
//! | 4    | REALTIME_DATA          | `[4, monitor, channel, [[ts], [value]]]`      |
//! | 5    | HISTORICAL_DATA        | `[5, monitor, channel, [timestamps, values]]` |
//! | 6    | SUBSCRIPTION_ERROR     | `[6, monitor, channel, message]`              |

use crate::error::{CacheError, Result};
use crate::types::SeriesBatch;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const MSG_SUBSCRIBE: u64 = 1;
pub const MSG_UNSUBSCRIBE: u64 = 2;
pub const MSG_SET_RANGE_OF_INTEREST: u64 = 3;
pub const MSG_REALTIME_DATA: u64 = 4;
pub const MSG_HISTORICAL_DATA: u64 = 5;
pub const MSG_SUBSCRIPTION_ERROR: u64 = 6;

/// Control messages from the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostRequest {
    Subscribe {
        dataset_id: String,
        channel: String,
    },
    Unsubscribe {
        dataset_id: String,
        channel: String,
    },
    SetRangeOfInterest {
        dataset_id: String,
        start: f64,
        end: f64,
        max_points: u64,
    },
}

impl HostRequest {
    /// The monitor this request addresses.
    pub fn dataset_id(&self) -> &str {
        match self {
            HostRequest::Subscribe { dataset_id, .. }
            | HostRequest::Unsubscribe { dataset_id, .. }
            | HostRequest::SetRangeOfInterest { dataset_id, .. } => dataset_id,
        }
    }

    /// Parse a `[code, ...]` array.
    pub fn from_wire(msg: &Value) -> Result<Self> {
        let items = msg
            .as_array()
            .ok_or_else(|| CacheError::InvalidMessage(format!("expected an array, got {}", msg)))?;
        let code = items
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| CacheError::InvalidMessage("missing message code".into()))?;

        match code {
            MSG_SUBSCRIBE | MSG_UNSUBSCRIBE => {
                let dataset_id = string_at(items, 1, "datasetId")?;
                let channel = string_at(items, 2, "channel")?;
                Ok(if code == MSG_SUBSCRIBE {
                    HostRequest::Subscribe {
                        dataset_id,
                        channel,
                    }
                } else {
                    HostRequest::Unsubscribe {
                        dataset_id,
                        channel,
                    }
                })
            }
            MSG_SET_RANGE_OF_INTEREST => Ok(HostRequest::SetRangeOfInterest {
                dataset_id: string_at(items, 1, "datasetId")?,
                start: number_at(items, 2, "start")?,
                end: number_at(items, 3, "end")?,
                max_points: count_at(items, 4, "maxPoints")?,
            }),
            other => Err(CacheError::InvalidMessage(format!(
                "unknown message code {}",
                other
            ))),
        }
    }

    pub fn to_wire(&self) -> Value {
        match self {
            HostRequest::Subscribe {
                dataset_id,
                channel,
            } => json!([MSG_SUBSCRIBE, dataset_id, channel]),
            HostRequest::Unsubscribe {
                dataset_id,
                channel,
            } => json!([MSG_UNSUBSCRIBE, dataset_id, channel]),
            HostRequest::SetRangeOfInterest {
                dataset_id,
                start,
                end,
                max_points,
            } => json!([MSG_SET_RANGE_OF_INTEREST, dataset_id, start, end, max_points]),
        }
    }
}

/// Messages delivered to the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// One live sample.
    RealtimeData {
        monitor: String,
        channel: String,
        data: SeriesBatch,
    },
    /// Everything cached in the monitor's range of interest.
    HistoricalData {
        monitor: String,
        channel: String,
        data: SeriesBatch,
    },
    /// The transport rejected a channel this monitor asked for.
    SubscriptionError {
        monitor: String,
        channel: String,
        error: String,
    },
}

impl HostMessage {
    pub fn monitor(&self) -> &str {
        match self {
            HostMessage::RealtimeData { monitor, .. }
            | HostMessage::HistoricalData { monitor, .. }
            | HostMessage::SubscriptionError { monitor, .. } => monitor,
        }
    }

    pub fn channel(&self) -> &str {
        match self {
            HostMessage::RealtimeData { channel, .. }
            | HostMessage::HistoricalData { channel, .. }
            | HostMessage::SubscriptionError { channel, .. } => channel,
        }
    }

    pub fn to_wire(&self) -> Value {
        match self {
            HostMessage::RealtimeData {
                monitor,
                channel,
                data,
            } => json!([MSG_REALTIME_DATA, monitor, channel, [data.timestamps, data.values]]),
            HostMessage::HistoricalData {
                monitor,
                channel,
                data,
            } => json!([
                MSG_HISTORICAL_DATA,
                monitor,
                channel,
                [data.timestamps, data.values]
            ]),
            HostMessage::SubscriptionError {
                monitor,
                channel,
                error,
            } => json!([MSG_SUBSCRIPTION_ERROR, monitor, channel, error]),
        }
    }
}

fn string_at(items: &[Value], idx: usize, field: &str) -> Result<String> {
    items
        .get(idx)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CacheError::InvalidMessage(format!("{} must be a string", field)))
}

fn number_at(items: &[Value], idx: usize, field: &str) -> Result<f64> {
    items
        .get(idx)
        .and_then(Value::as_f64)
        .ok_or_else(|| CacheError::InvalidMessage(format!("{} must be a number", field)))
}

fn count_at(items: &[Value], idx: usize, field: &str) -> Result<u64> {
    let value = items
        .get(idx)
        .ok_or_else(|| CacheError::InvalidMessage(format!("{} is missing", field)))?;
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    // Hosts written in JS send every number as a double.
    match value.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(f as u64),
        _ => Err(CacheError::InvalidMessage(format!(
            "{} must be a non-negative integer",
            field
        ))),
    }
}
