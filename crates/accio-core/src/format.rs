//! Text rendering of values, kinds, timestamps and pagination.

use chrono::{DateTime, Local, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::models::DataType;

/// Shown wherever a timestamp or duration is not available.
pub const PLACEHOLDER: &str = "—";

/// Compact rendering of an arbitrary payload: `{k=v, ...}` for objects,
/// `[a, b]` for arrays, bare text for scalars.
pub fn pretty_print(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let pairs: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}={}", k, pretty_print(v)))
                .collect();
            format!("{{{}}}", pairs.join(", "))
        }
        serde_json::Value::Array(items) => {
            let items: Vec<String> = items.iter().map(pretty_print).collect();
            format!("[{}]", items.join(", "))
        }
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn pretty_print_kind(kind: &DataType) -> String {
    let arg = |i: usize| kind.args.get(i).map(String::as_str).unwrap_or("?");
    match kind.base.as_str() {
        "list" | "set" => format!("{}({})", kind.base, arg(0)),
        "map" => format!("{}({}, {})", kind.base, arg(0), arg(1)),
        _ => kind.base.clone(),
    }
}

pub fn pretty_print_value(payload: &serde_json::Value, kind: &DataType) -> String {
    match kind.base.as_str() {
        "distance" => format!("{} meters", pretty_print(payload)),
        "duration" => format!("{} millis", pretty_print(payload)),
        "dataset" => payload
            .get("uri")
            .map(pretty_print)
            .unwrap_or_else(|| pretty_print(payload)),
        _ => pretty_print(payload),
    }
}

pub fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(ts) => ts
            .with_timezone(&Local)
            .format("%b %-d %Y, %I:%M%P")
            .to_string(),
        None => PLACEHOLDER.to_string(),
    }
}

pub fn progress_percent(progress: f64) -> u32 {
    (progress.clamp(0.0, 1.0) * 100.0).round() as u32
}

pub fn page_count(total_count: u64, per_page: u32) -> u64 {
    if per_page == 0 {
        return 0;
    }
    total_count.div_ceil(per_page as u64)
}

/// Everything but the unreserved characters of `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_uri_component(s: &str) -> String {
    utf8_percent_encode(s, URI_COMPONENT).to_string()
}
