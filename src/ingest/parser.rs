use crate::ingest::record::{canonical_key, FieldValue, RetrievalRecord};
use std::collections::HashMap;

/// Path prefix identifying content-retrieval requests.
const RETRIEVAL_PREFIX: &str = "/ipfs/";

/// Field delimiter between `key=value` pairs in a log line.
const FIELD_DELIMITER: &str = "&&";

/// Decodes raw access-log lines into retrieval records. Pure and total:
/// arbitrary input yields either one record or nothing, never a panic.
#[derive(Debug, Clone)]
pub struct LineParser {
    testing_cid: Option<String>,
}

impl LineParser {
    pub fn new(testing_cid: Option<String>) -> Self {
        Self { testing_cid }
    }

    /// Parse one line. Returns a record only for lines whose request path
    /// starts with the retrieval prefix and whose status is exactly 200;
    /// everything else (including the configured test cid) is discarded.
    pub fn parse_line(&self, line: &str) -> Option<RetrievalRecord> {
        let fields = decode_fields(line);

        let request = fields.get("request").and_then(FieldValue::as_str)?;
        let cid_path = request.strip_prefix(RETRIEVAL_PREFIX)?;

        if fields.get("status").and_then(FieldValue::as_f64) != Some(200.0) {
            return None;
        }

        let (cid, file_path) = match cid_path.split_once('/') {
            Some((cid, rest)) => (cid.to_string(), rest.to_string()),
            None => (cid_path.to_string(), String::new()),
        };

        if self.testing_cid.as_deref() == Some(cid.as_str()) {
            return None;
        }

        let client_id = fields
            .get("args")
            .and_then(FieldValue::as_args)
            .and_then(|args| args.get("clientId"))
            .cloned();

        Some(RetrievalRecord {
            cid,
            file_path,
            client_address: str_field(&fields, "clientAddress"),
            client_id,
            local_time: str_field(&fields, "localTime"),
            num_bytes_sent: fields
                .get("numBytesSent")
                .and_then(FieldValue::as_f64)
                .map(|n| n.max(0.0) as u64)
                .unwrap_or(0),
            range: fields
                .get("range")
                .and_then(FieldValue::as_str)
                .map(str::to_string),
            cache_hit: fields
                .get("cacheHit")
                .and_then(FieldValue::as_bool)
                .unwrap_or(false),
            referrer: str_field(&fields, "referrer"),
            request_duration: fields
                .get("requestDuration")
                .and_then(FieldValue::as_f64)
                .unwrap_or(0.0),
            request_id: str_field(&fields, "requestId"),
            user_agent: str_field(&fields, "userAgent"),
        })
    }
}

fn str_field(fields: &HashMap<String, FieldValue>, key: &str) -> String {
    match fields.get(key) {
        Some(FieldValue::Str(s)) => s.clone(),
        Some(FieldValue::Num(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Split a line into typed fields keyed by canonical name. Values may
/// themselves contain `=`; only the first one separates key from value.
fn decode_fields(line: &str) -> HashMap<String, FieldValue> {
    let mut fields = HashMap::new();

    for pair in line.split(FIELD_DELIMITER) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        fields.insert(canonical_key(key).to_string(), decode_value(key, value));
    }

    fields
}

fn decode_value(key: &str, raw: &str) -> FieldValue {
    match key {
        "args" => FieldValue::Args(decode_args(raw)),
        "lt" | "rid" | "addr" => FieldValue::Str(raw.to_string()),
        "ucs" => FieldValue::Bool(raw == "HIT"),
        _ => match raw.parse::<f64>() {
            Ok(n) if n.is_finite() => FieldValue::Num(n),
            _ => FieldValue::Str(raw.to_string()),
        },
    }
}

/// The `args` field nests a query-string-style map joined by `&`.
fn decode_args(raw: &str) -> HashMap<String, String> {
    let mut args = HashMap::new();

    for pair in raw.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        args.insert(key.to_string(), value.to_string());
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> LineParser {
        LineParser::new(Some("bafyTEST".to_string()))
    }

    #[test]
    fn test_valid_retrieval_line() {
        let line = "addr=1.2.3.4&&b=100&&r=/ipfs/bafyABC/foo.txt&&s=200&&ucs=HIT&&args=clientId=xyz";
        let record = parser().parse_line(line).unwrap();

        assert_eq!(record.cid, "bafyABC");
        assert_eq!(record.file_path, "foo.txt");
        assert_eq!(record.client_address, "1.2.3.4");
        assert_eq!(record.client_id.as_deref(), Some("xyz"));
        assert_eq!(record.num_bytes_sent, 100);
        assert!(record.cache_hit);
    }

    #[test]
    fn test_testing_cid_is_dropped() {
        let line = "addr=1.2.3.4&&b=100&&r=/ipfs/bafyTEST/foo.txt&&s=200&&ucs=HIT";
        assert!(parser().parse_line(line).is_none());
    }

    #[test]
    fn test_non_retrieval_path_is_dropped() {
        let line = "addr=1.2.3.4&&b=100&&r=/health&&s=200&&ucs=HIT";
        assert!(parser().parse_line(line).is_none());
    }

    #[test]
    fn test_non_success_status_is_dropped() {
        let line = "addr=1.2.3.4&&b=100&&r=/ipfs/bafyABC/foo.txt&&s=404&&ucs=MISS";
        assert!(parser().parse_line(line).is_none());
    }

    #[test]
    fn test_missing_status_is_dropped() {
        let line = "addr=1.2.3.4&&b=100&&r=/ipfs/bafyABC/foo.txt&&ucs=HIT";
        assert!(parser().parse_line(line).is_none());
    }

    #[test]
    fn test_cache_miss_decodes_false() {
        let line = "addr=1.2.3.4&&b=100&&r=/ipfs/bafyABC/foo.txt&&s=200&&ucs=MISS";
        let record = parser().parse_line(line).unwrap();
        assert!(!record.cache_hit);
    }

    #[test]
    fn test_cid_without_file_path() {
        let line = "addr=1.2.3.4&&b=100&&r=/ipfs/bafyABC&&s=200&&ucs=HIT";
        let record = parser().parse_line(line).unwrap();
        assert_eq!(record.cid, "bafyABC");
        assert_eq!(record.file_path, "");
    }

    #[test]
    fn test_nested_file_path() {
        let line = "addr=1.2.3.4&&b=100&&r=/ipfs/bafyABC/dir/sub/file.bin&&s=200&&ucs=HIT";
        let record = parser().parse_line(line).unwrap();
        assert_eq!(record.file_path, "dir/sub/file.bin");
    }

    #[test]
    fn test_value_containing_equals() {
        // Only the first '=' separates key from value.
        let line = "addr=1.2.3.4&&b=100&&r=/ipfs/bafyABC/a.txt&&s=200&&ucs=HIT&&args=clientId=a=b";
        let record = parser().parse_line(line).unwrap();
        assert_eq!(record.client_id.as_deref(), Some("a=b"));
    }

    #[test]
    fn test_malformed_numeric_degrades_to_string() {
        assert_eq!(
            decode_value("b", "not-a-number"),
            FieldValue::Str("not-a-number".to_string())
        );
        assert_eq!(decode_value("b", "100"), FieldValue::Num(100.0));
    }

    #[test]
    fn test_non_numeric_bytes_default_to_zero() {
        let line = "addr=1.2.3.4&&b=oops&&r=/ipfs/bafyABC/foo.txt&&s=200&&ucs=HIT";
        let record = parser().parse_line(line).unwrap();
        assert_eq!(record.num_bytes_sent, 0);
    }

    #[test]
    fn test_verbatim_string_fields() {
        // lt/rid/addr never attempt numeric decoding.
        assert_eq!(
            decode_value("addr", "1234"),
            FieldValue::Str("1234".to_string())
        );
        assert_eq!(
            decode_value("lt", "08/Jan/2026:10:00:00 +0000"),
            FieldValue::Str("08/Jan/2026:10:00:00 +0000".to_string())
        );
    }

    #[test]
    fn test_fractional_duration() {
        let line = "addr=1.2.3.4&&b=100&&r=/ipfs/bafyABC/foo.txt&&s=200&&ucs=HIT&&rt=0.437";
        let record = parser().parse_line(line).unwrap();
        assert!((record.request_duration - 0.437).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let fields = decode_fields("xyzzy=42&&r=/ipfs/bafyABC&&s=200");
        assert_eq!(fields.get("xyzzy"), Some(&FieldValue::Num(42.0)));
    }

    #[test]
    fn test_arbitrary_garbage_is_safe() {
        let p = parser();
        assert!(p.parse_line("").is_none());
        assert!(p.parse_line("&&&&&&").is_none());
        assert!(p.parse_line("====").is_none());
        assert!(p.parse_line("r=").is_none());
        assert!(p.parse_line("\u{0}\u{1}\u{2}").is_none());
        assert!(p.parse_line("r=/ipfs/").is_none());
    }

    #[test]
    fn test_empty_args_map() {
        let line = "addr=1.2.3.4&&b=100&&r=/ipfs/bafyABC/foo.txt&&s=200&&ucs=HIT&&args=";
        let record = parser().parse_line(line).unwrap();
        assert!(record.client_id.is_none());
    }

    #[test]
    fn test_no_testing_cid_configured() {
        let p = LineParser::new(None);
        let line = "addr=1.2.3.4&&b=100&&r=/ipfs/bafyTEST/foo.txt&&s=200&&ucs=HIT";
        // Without a configured sentinel nothing is filtered by cid.
        assert!(p.parse_line(line).is_some());
    }
}
