//! Outbound frame construction.
//!
//! Two frame types go to consoles, each a JSON object followed by
//! [`FRAME_TERMINATOR`]:
//!
//! ```text
//! {"type":"advertise","readables":{"alt":"","throttle":""},"commands":["reset"]}
//! {"type":"update","data":{"alt":120.5,"throttle":0.25},"out":[{"msg":"...","type":"info","time":1700000000000}]}
//! ```
//!
//! Values in `data` are inserted as the codec rendered them, not re-encoded,
//! so objects are assembled by hand. Keys keep registration order.

use crate::constants::FRAME_TERMINATOR;
use crate::logbuf::LogEntry;
use crate::registry::Registry;

/// Quote `name` as a JSON string.
fn json_key(name: &str) -> String {
    serde_json::Value::String(name.to_string()).to_string()
}

fn terminate(body: String) -> Vec<u8> {
    let mut bytes = body.into_bytes();
    bytes.push(FRAME_TERMINATOR);
    bytes
}

/// Build the advertise frame describing every name a console can see or use.
pub fn advertise_frame(registry: &Registry) -> Vec<u8> {
    let readables = registry
        .value_names()
        .into_iter()
        .map(|name| format!("{}:\"\"", json_key(name)))
        .collect::<Vec<_>>()
        .join(",");
    let commands = registry
        .command_names()
        .into_iter()
        .map(json_key)
        .collect::<Vec<_>>()
        .join(",");

    terminate(format!(
        "{{\"type\":\"advertise\",\"readables\":{{{readables}}},\"commands\":[{commands}]}}"
    ))
}

/// Build an update frame from `(name, wire text)` pairs and pending entries.
///
/// The `out` array is omitted when `out` is empty.
pub fn update_frame(data: &[(String, String)], out: &[LogEntry]) -> Vec<u8> {
    let data = data
        .iter()
        .map(|(name, value)| format!("{}:{}", json_key(name), value))
        .collect::<Vec<_>>()
        .join(",");

    let mut body = format!("{{\"type\":\"update\",\"data\":{{{data}}}");
    if !out.is_empty() {
        let entries = serde_json::to_string(out).unwrap_or_else(|e| {
            log::warn!("[Bridge] Failed to serialize log entries: {}", e);
            String::from("[]")
        });
        body.push_str(",\"out\":");
        body.push_str(&entries);
    }
    body.push('}');
    terminate(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logbuf::Severity;
    use crate::registry::Shared;

    fn text(frame: &[u8]) -> &str {
        assert_eq!(frame.last(), Some(&FRAME_TERMINATOR));
        std::str::from_utf8(&frame[..frame.len() - 1]).unwrap()
    }

    #[test]
    fn test_advertise_lists_values_and_commands() {
        let mut registry = Registry::new();
        registry.bind_readable("ay", &Shared::new(0.0_f64));
        registry.bind_readable("ax", &Shared::new(0.0_f64));
        registry.bind_writable("throttle", &Shared::new(0.0_f64));
        registry.add_command("reset", |_| Ok(()));

        assert_eq!(
            text(&advertise_frame(&registry)),
            r#"{"type":"advertise","readables":{"ay":"","ax":"","throttle":""},"commands":["reset"]}"#
        );
    }

    #[test]
    fn test_advertise_with_empty_registry() {
        let registry = Registry::new();
        let frame = advertise_frame(&registry);
        let parsed: serde_json::Value = serde_json::from_str(text(&frame)).unwrap();
        assert_eq!(parsed["type"], "advertise");
        assert!(parsed["readables"].as_object().unwrap().is_empty());
        assert!(parsed["commands"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_update_without_entries_omits_out() {
        let data = vec![
            ("speed".to_string(), "1.5".to_string()),
            ("name".to_string(), "\"probe\"".to_string()),
            ("gains".to_string(), "[1,2]".to_string()),
        ];
        assert_eq!(
            text(&update_frame(&data, &[])),
            r#"{"type":"update","data":{"speed":1.5,"name":"probe","gains":[1,2]}}"#
        );
    }

    #[test]
    fn test_update_with_entries_is_valid_json() {
        let data = vec![("x".to_string(), "null".to_string())];
        let out = vec![LogEntry {
            msg: "quote \" and newline \n".to_string(),
            severity: Severity::Info,
            time: 42,
        }];

        let frame = update_frame(&data, &out);
        let parsed: serde_json::Value = serde_json::from_str(text(&frame)).unwrap();
        assert!(parsed["data"]["x"].is_null());
        assert_eq!(parsed["out"][0]["msg"], "quote \" and newline \n");
        assert_eq!(parsed["out"][0]["type"], "info");
        assert_eq!(parsed["out"][0]["time"], 42);
    }

    #[test]
    fn test_names_are_escaped() {
        let data = vec![("odd\"name".to_string(), "1".to_string())];
        let frame = update_frame(&data, &[]);
        let parsed: serde_json::Value = serde_json::from_str(text(&frame)).unwrap();
        assert_eq!(parsed["data"]["odd\"name"], 1);
    }

    #[test]
    fn test_keys_with_control_bytes_stay_distinct() {
        assert_eq!(json_key("tab\there"), r#""tab\there""#);
        assert_eq!(json_key("unit\x1fsep"), r#""unit\u001fsep""#);

        let data = vec![
            ("a\x1f".to_string(), "1".to_string()),
            ("a\\".to_string(), "2".to_string()),
        ];
        let frame = update_frame(&data, &[]);
        assert_eq!(frame.iter().filter(|&&b| b == FRAME_TERMINATOR).count(), 1);
        let parsed: serde_json::Value = serde_json::from_str(text(&frame)).unwrap();
        assert_eq!(parsed["data"].as_object().unwrap().len(), 2);
        assert_eq!(parsed["data"]["a\x1f"], 1);
        assert_eq!(parsed["data"]["a\\"], 2);
    }
}
