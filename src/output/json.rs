//! `--format json` envelope
//!
//! Every JSON document printed by factrack has the shape
//! `{"data": ..., "meta": {"tool", "version", "generatedAt"}}` so scripts can
//! tell which build produced a file and when.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Envelope<'a, T: ?Sized> {
    data: &'a T,
    meta: Meta,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Meta {
    tool: &'static str,
    version: &'static str,
    generated_at: String,
}

impl Meta {
    fn at(now: DateTime<Utc>) -> Self {
        Self {
            tool: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            generated_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Pretty-print `data` inside the envelope
pub fn format_json<T: Serialize + ?Sized>(data: &T) -> Result<String, serde_json::Error> {
    render(data, Utc::now())
}

fn render<T: Serialize + ?Sized>(
    data: &T,
    now: DateTime<Utc>,
) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&Envelope {
        data,
        meta: Meta::at(now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{Value, json};

    #[test]
    fn test_envelope_carries_build_and_time() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let lines = json!([{"id": "l-1", "code": "L01"}]);

        let parsed: Value = serde_json::from_str(&render(&lines, now).unwrap()).unwrap();

        assert_eq!(parsed["data"][0]["code"], "L01");
        assert_eq!(parsed["meta"]["tool"], "factrack");
        assert_eq!(parsed["meta"]["generatedAt"], "2024-03-01T08:00:00Z");
    }

    #[test]
    fn test_empty_list_stays_a_list() {
        let lines: Vec<Value> = Vec::new();
        let parsed: Value = serde_json::from_str(&format_json(&lines).unwrap()).unwrap();
        assert_eq!(parsed["data"], json!([]));
    }
}
