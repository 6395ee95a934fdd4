#![forbid(unsafe_code)]

//! Text renderings of an event log for assertions and debugging.
//!
//! Lines look like `0:3 !SET <0:1> - {"objectId":"S/root",...}`: event id,
//! type, parent context id when nested, then the payload.

use std::fmt::Write as _;

use serde_json::Value as Json;
use trax_core::{EventStream, StreamEvent};

/// One-line rendering of `event`.
#[must_use]
pub fn format_event(event: &StreamEvent) -> String {
    let mut line = format!("{} {}", event.id, event.kind);
    if let Some(parent) = &event.parent_id {
        let _ = write!(line, " <{parent}>");
    }
    if let Some(data) = &event.data {
        let _ = write!(line, " - {data}");
    }
    line
}

/// Buffered events whose type is in `kinds` (all events when empty).
#[must_use]
pub fn format_log(log: &EventStream, kinds: &[&str]) -> Vec<String> {
    let mut lines = Vec::new();
    log.scan(|event| {
        if kinds.is_empty() || kinds.contains(&event.kind.as_str()) {
            lines.push(format_event(event));
        }
        true
    });
    lines
}

/// Payloads of the buffered events of type `kind`.
#[must_use]
pub fn event_data(log: &EventStream, kind: &str) -> Vec<Json> {
    let mut out = Vec::new();
    log.scan(|event| {
        if event.kind == kind {
            out.push(event.data.clone().unwrap_or(Json::Null));
        }
        true
    });
    out
}

/// Messages of the buffered `!ERR` events.
#[must_use]
pub fn errors(log: &EventStream) -> Vec<String> {
    let mut out = Vec::new();
    log.scan(|event| {
        if event.kind == "!ERR" {
            out.push(event.message().unwrap_or_default().to_owned());
        }
        true
    });
    out
}

/// JSON Lines dump of the buffered events.
#[must_use]
pub fn to_jsonl(log: &EventStream) -> String {
    let mut out = String::new();
    log.scan(|event| {
        if let Ok(line) = serde_json::to_string(event) {
            out.push_str(&line);
            out.push('\n');
        }
        true
    });
    out
}

/// Emit the formatted log through `tracing` at debug level.
pub fn trace_log(log: &EventStream, kinds: &[&str]) {
    for line in format_log(log, kinds) {
        tracing::debug!(target: "trax::log", "{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trax_core::EventStreamConfig;

    #[test]
    fn lines_carry_parent_and_payload() {
        let log = EventStream::new(EventStreamConfig::default());
        let ctx = log.start_processing_context(json!({"name": "job"}));
        log.info("hello");
        ctx.end();
        assert_eq!(
            format_log(&log, &["!LOG"]),
            vec![format!("0:2 !LOG <{}> - \"hello\"", ctx.id())]
        );
        assert_eq!(errors(&log), Vec::<String>::new());
        assert_eq!(event_data(&log, "!PCS"), vec![json!({"name": "job"})]);
    }

    #[test]
    fn jsonl_has_one_line_per_event() {
        let log = EventStream::new(EventStreamConfig::default());
        log.event("custom", json!({"n": 1}));
        let dump = to_jsonl(&log);
        assert_eq!(dump.lines().count(), log.size());
        assert!(dump.contains(r#""type":"custom""#));
    }
}
