// Copyright 2025-Present cwl-forwarder contributors
// SPDX-License-Identifier: Apache-2.0

//! Newline-delimited bulk index payload assembly.
//!
//! Every event of a data batch becomes two lines: an index action routing the
//! document to a day-bucketed index, then the document itself.

use crate::batch::{LogBatch, LogEvent};
use crate::classifier::event_time;
use chrono::SecondsFormat;
use serde_json::{json, Map, Number, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexAction {
    pub index_name: String,
    pub document_type: String,
    pub document_id: String,
}

impl IndexAction {
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "index": {
                "_index": self.index_name,
                "_type": self.document_type,
                "_id": self.document_id,
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkItem {
    pub action: IndexAction,
    pub source: Map<String, Value>,
}

impl BulkItem {
    fn write_to(&self, body: &mut String) {
        body.push_str(&self.action.to_value().to_string());
        body.push('\n');
        body.push_str(&Value::Object(self.source.clone()).to_string());
        body.push('\n');
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkPayload {
    pub body: String,
    pub items: usize,
}

impl BulkPayload {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items == 0
    }
}

#[derive(Debug, Clone)]
pub struct BulkDocumentBuilder {
    index_prefix: String,
}

impl BulkDocumentBuilder {
    pub fn new(index_prefix: impl Into<String>) -> Self {
        Self {
            index_prefix: index_prefix.into(),
        }
    }

    /// Builds the payload for a batch. Control batches produce none.
    #[must_use]
    pub fn build(&self, batch: &LogBatch) -> Option<BulkPayload> {
        if batch.is_control() {
            return None;
        }

        let mut payload = BulkPayload::default();
        for event in &batch.log_events {
            self.item(event, batch).write_to(&mut payload.body);
            payload.items += 1;
        }
        Some(payload)
    }

    #[must_use]
    pub fn item(&self, event: &LogEvent, batch: &LogBatch) -> BulkItem {
        let mut source = build_source(&event.message, event.extracted_fields.as_ref());
        source.insert("@id".to_string(), Value::String(event.id.clone()));
        source.insert(
            "@timestamp".to_string(),
            Value::String(
                event_time(event.timestamp).to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
        );
        source.insert("@message".to_string(), Value::String(event.message.clone()));
        source.insert("@owner".to_string(), Value::String(batch.owner.clone()));
        source.insert(
            "@log_group".to_string(),
            Value::String(batch.log_group.clone()),
        );
        source.insert(
            "@log_stream".to_string(),
            Value::String(batch.log_stream.clone()),
        );

        BulkItem {
            action: IndexAction {
                index_name: index_name(&self.index_prefix, event.timestamp),
                document_type: batch.log_group.clone(),
                document_id: event.id.clone(),
            },
            source,
        }
    }
}

/// `<prefix>-YYYY.MM.DD` of the event's UTC date.
///
/// # Examples
///
/// ```
/// use cwl_forwarder::bulk::index_name;
///
/// // 2016-08-17T00:00:00Z
/// assert_eq!(index_name("cwl", 1_471_392_000_000), "cwl-2016.08.17");
/// ```
#[must_use]
pub fn index_name(prefix: &str, timestamp_millis: i64) -> String {
    format!(
        "{prefix}-{}",
        event_time(timestamp_millis).format("%Y.%m.%d")
    )
}

/// Document body before the `@` fields are overlaid.
///
/// With extracted fields, each non-empty field is copied; numeric strings become
/// numbers and strings holding an embedded JSON object also expose it under
/// `$<key>`. Without them, the embedded JSON object of the raw message is used.
#[must_use]
pub fn build_source(
    message: &str,
    extracted_fields: Option<&std::collections::BTreeMap<String, String>>,
) -> Map<String, Value> {
    let Some(fields) = extracted_fields else {
        return match extract_json(message) {
            Some(Value::Object(source)) => source,
            _ => Map::new(),
        };
    };

    let mut source = Map::new();
    for (key, value) in fields {
        if value.is_empty() {
            continue;
        }
        if let Some(number) = numeric_value(value) {
            source.insert(key.clone(), Value::Number(number));
            continue;
        }
        if let Some(embedded) = extract_json(value) {
            source.insert(format!("${key}"), embedded);
        }
        source.insert(key.clone(), Value::String(value.clone()));
    }
    source
}

/// Parses the text from the first `{` to the end, if that is valid JSON.
#[must_use]
pub fn extract_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    serde_json::from_str(&text[start..]).ok()
}

fn numeric_value(value: &str) -> Option<Number> {
    let trimmed = value.trim();
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Some(Number::from(integer));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::MessageType;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn batch(events: Vec<LogEvent>) -> LogBatch {
        LogBatch {
            message_type: MessageType::Data,
            owner: "123456789012".to_string(),
            log_group: "/aws/lambda/service-env-funcName".to_string(),
            log_stream: "2016/08/17/[76]afe5c000d5344c33b5d88be7a4c55816".to_string(),
            subscription_filters: vec![],
            log_events: events,
        }
    }

    fn event(id: &str, message: &str, fields: Option<BTreeMap<String, String>>) -> LogEvent {
        LogEvent {
            id: id.to_string(),
            timestamp: 1_471_392_000_000,
            message: message.to_string(),
            extracted_fields: fields,
        }
    }

    #[test]
    fn test_index_name() {
        assert_eq!(index_name("cwl", 1_471_392_000_000), "cwl-2016.08.17");
        assert_eq!(index_name("cwl", 1_471_391_999_999), "cwl-2016.08.16");
        assert_eq!(index_name("logs", 0), "logs-1970.01.01");
    }

    #[test]
    fn test_build_payload_lines() {
        let batch = batch(vec![
            event("1", "2016-08-17T00:00:00.000Z\tabc\thello\n", None),
            event("2", "END RequestId: abc\n", None),
        ]);
        let payload = BulkDocumentBuilder::new("cwl").build(&batch).unwrap();
        assert_eq!(payload.items, 2);
        assert!(payload.body.ends_with('\n'));

        let lines: Vec<Value> = payload
            .body
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            json!({"index": {
                "_index": "cwl-2016.08.17",
                "_type": "/aws/lambda/service-env-funcName",
                "_id": "1"
            }})
        );
        assert_eq!(lines[1]["@id"], json!("1"));
        assert_eq!(lines[1]["@timestamp"], json!("2016-08-17T00:00:00.000Z"));
        assert_eq!(lines[1]["@message"], json!("2016-08-17T00:00:00.000Z\tabc\thello\n"));
        assert_eq!(lines[1]["@owner"], json!("123456789012"));
        assert_eq!(lines[1]["@log_group"], json!("/aws/lambda/service-env-funcName"));
        assert_eq!(
            lines[1]["@log_stream"],
            json!("2016/08/17/[76]afe5c000d5344c33b5d88be7a4c55816")
        );
        assert_eq!(lines[2]["index"]["_id"], json!("2"));
    }

    #[test]
    fn test_control_batch_has_no_payload() {
        let mut control = batch(vec![event("1", "CWL CONTROL MESSAGE", None)]);
        control.message_type = MessageType::Control;
        assert!(BulkDocumentBuilder::new("cwl").build(&control).is_none());
    }

    #[test]
    fn test_empty_data_batch() {
        let payload = BulkDocumentBuilder::new("cwl").build(&batch(vec![])).unwrap();
        assert!(payload.is_empty());
        assert!(payload.body.is_empty());
    }

    #[test]
    fn test_source_from_message_json() {
        let source = build_source("2016-08-17T00:00:00.000Z\tabc\t{\"level\":\"info\",\"n\":1}\n", None);
        assert_eq!(source.get("level"), Some(&json!("info")));
        assert_eq!(source.get("n"), Some(&json!(1)));

        assert!(build_source("plain text", None).is_empty());
        assert!(build_source("broken {json", None).is_empty());
    }

    #[test]
    fn test_source_from_extracted_fields() {
        let fields = BTreeMap::from([
            ("count".to_string(), "12".to_string()),
            ("ratio".to_string(), "0.5".to_string()),
            ("empty".to_string(), String::new()),
            ("request_id".to_string(), "abc-123".to_string()),
            ("event".to_string(), "payload {\"order\":7}".to_string()),
        ]);
        let source = build_source("ignored {\"x\":1}", Some(&fields));

        assert_eq!(source.get("count"), Some(&json!(12)));
        assert_eq!(source.get("ratio"), Some(&json!(0.5)));
        assert!(!source.contains_key("empty"));
        assert_eq!(source.get("request_id"), Some(&json!("abc-123")));
        assert_eq!(source.get("event"), Some(&json!("payload {\"order\":7}")));
        assert_eq!(source.get("$event"), Some(&json!({"order": 7})));
        assert!(!source.contains_key("x"));
    }

    #[test]
    fn test_overlay_wins_over_source() {
        let batch = batch(vec![]);
        let item = BulkDocumentBuilder::new("cwl").item(
            &event("9", "{\"@id\":\"spoofed\"}", None),
            &batch,
        );
        assert_eq!(item.source.get("@id"), Some(&json!("9")));
    }

    proptest! {
        #[test]
        fn index_name_depends_only_on_utc_date(day in 0i64..50_000, offset in 0i64..86_400_000) {
            let midnight = day * 86_400_000;
            prop_assert_eq!(index_name("cwl", midnight + offset), index_name("cwl", midnight));
        }
    }
}
