use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One observed content retrieval, decoded from a single access-log line.
/// Field names serialize in the camelCase form the collector expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalRecord {
    pub cid: String,
    pub file_path: String,
    pub client_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub local_time: String,
    pub num_bytes_sent: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    pub cache_hit: bool,
    pub referrer: String,
    pub request_duration: f64,
    pub request_id: String,
    pub user_agent: String,
}

/// A single decoded log field. Three keys always decode verbatim, the
/// cache-status key decodes to a boolean, the `args` key nests a
/// query-string map, and everything else is numeric-first with a string
/// fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Num(f64),
    Bool(bool),
    Args(HashMap<String, String>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_args(&self) -> Option<&HashMap<String, String>> {
        match self {
            FieldValue::Args(map) => Some(map),
            _ => None,
        }
    }
}

/// Maps the nginx log format's short keys to canonical field names.
/// Unknown keys pass through under their raw name.
pub fn canonical_key(short: &str) -> &str {
    match short {
        "addr" => "clientAddress",
        "b" => "numBytesSent",
        "lt" => "localTime",
        "r" => "request",
        "ref" => "referrer",
        "rid" => "requestId",
        "rt" => "requestDuration",
        "s" => "status",
        "ua" => "userAgent",
        "ucs" => "cacheHit",
        other => other,
    }
}
