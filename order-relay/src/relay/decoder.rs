//! Notification payload → [`RelayPayload`]
//!
//! Decoding never fails past this boundary: malformed payloads become a
//! [`DecodeFailure`] that is broadcast like any other event.

use shared::realtime::{ChangeEvent, DecodeFailure, RelayPayload};

/// Decode a raw channel payload
pub fn decode(raw: &str) -> RelayPayload {
    match serde_json::from_str::<ChangeEvent>(raw) {
        Ok(event) => {
            tracing::info!(
                operation = %event.operation,
                table = %event.table,
                row_id = ?event.row_id(),
                customer = ?event.row.get("customer_name"),
                "Parsed notification"
            );
            RelayPayload::Event(event)
        }
        Err(e) => {
            tracing::error!(raw_payload = %raw, "Notification parsing failed: {e}");
            RelayPayload::Failure(DecodeFailure::new(raw))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::realtime::ChangeOperation;

    fn expect_event(payload: RelayPayload) -> ChangeEvent {
        match payload {
            RelayPayload::Event(event) => event,
            RelayPayload::Failure(f) => panic!("expected event, got failure for {}", f.raw_payload),
        }
    }

    fn expect_failure(payload: RelayPayload) -> DecodeFailure {
        match payload {
            RelayPayload::Failure(f) => f,
            RelayPayload::Event(e) => panic!("expected failure, got {e:?}"),
        }
    }

    #[test]
    fn decodes_each_operation() {
        for (op, expected) in [
            ("insert", ChangeOperation::Insert),
            ("update", ChangeOperation::Update),
            ("delete", ChangeOperation::Delete),
        ] {
            let raw = json!({"operation": op, "table": "orders", "row": {"id": 1}}).to_string();
            assert_eq!(expect_event(decode(&raw)).operation, expected);
        }
    }

    #[test]
    fn reserializing_keeps_fields() {
        let original = json!({
            "operation": "insert",
            "table": "orders",
            "row": {
                "id": 7,
                "customer_name": "Ann",
                "product_name": "Desk",
                "status": "pending",
                "notes": null,
                "tags": ["a", "b"]
            }
        });

        let event = expect_event(decode(&original.to_string()));
        let wire = serde_json::to_value(RelayPayload::Event(event)).unwrap();
        assert_eq!(wire, original);
    }

    #[test]
    fn extra_top_level_fields_are_ignored() {
        let raw = r#"{"operation":"delete","table":"orders","row":{"id":2},"txid":99}"#;
        let event = expect_event(decode(raw));
        assert_eq!(event.table, "orders");
        assert_eq!(event.row_id(), Some(&json!(2)));
    }

    #[test]
    fn malformed_payloads_keep_raw_text() {
        let cases = [
            "",
            "not json",
            "{\"operation\":\"insert\"",
            r#"{"operation":"insert","table":"orders"}"#,
            r#"{"operation":"upsert","table":"orders","row":{}}"#,
            r#"{"operation":"insert","table":"orders","row":null}"#,
            r#"{"operation":"insert","table":"orders","row":[1,2]}"#,
            r#"{"table":"orders","row":{"id":1}}"#,
            "[1,2,3]",
        ];
        for raw in cases {
            let failure = expect_failure(decode(raw));
            assert_eq!(failure.raw_payload, raw);
        }
    }

    #[test]
    fn failure_wire_form() {
        let raw = "{broken";
        let wire = serde_json::to_value(decode(raw)).unwrap();
        assert_eq!(wire["error"], "Parse failed");
        assert_eq!(wire["raw_payload"], raw);
        assert!(wire["when"].is_string());
    }
}
