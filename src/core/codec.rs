//! Payload wire format.
//!
//! A payload blob holds two newline-terminated fields, each standard base64:
//!
//! ```text
//! <base64 of JSON object with the session items>\n
//! <base64 of the static-objects field, always empty>\n
//! ```
//!
//! Static objects are never persisted. Any attempt to write them, or to read
//! a payload that carries them, fails with `UnsupportedFeature`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::core::data::{SessionData, SessionItems, StaticObjects};
use crate::error::{Result, StoreError};

/// Field separator (and terminator) of the payload format.
pub const FIELD_TERMINATOR: u8 = b'\n';

/// Number of fields in a payload.
pub const FIELD_COUNT: usize = 2;

const STATICS_UNSUPPORTED: &str =
    "static objects are not supported because of hosting security constraints";

/// Reject static objects carried by the session or declared by the host.
pub fn ensure_no_static_objects(
    session_statics: &StaticObjects,
    application_statics: &StaticObjects,
) -> Result<()> {
    if !application_statics.is_empty() {
        return Err(StoreError::unsupported(format!(
            "{} (application declares {})",
            STATICS_UNSUPPORTED,
            application_statics.len()
        )));
    }
    if !session_statics.is_empty() {
        return Err(StoreError::unsupported(format!(
            "{} (session carries {})",
            STATICS_UNSUPPORTED,
            session_statics.len()
        )));
    }
    Ok(())
}

/// Serialize session contents into payload bytes.
pub fn encode(data: &SessionData, application_statics: &StaticObjects) -> Result<Vec<u8>> {
    ensure_no_static_objects(&data.static_objects, application_statics)?;

    let items = serde_json::to_vec(&data.items)?;

    let mut out = Vec::new();
    out.extend_from_slice(STANDARD.encode(items).as_bytes());
    out.push(FIELD_TERMINATOR);
    // Static-objects field: always empty.
    out.push(FIELD_TERMINATOR);
    Ok(out)
}

/// Deserialize payload bytes into session contents.
///
/// The timeout is not part of the payload; it comes from the metadata
/// record.
pub fn decode(
    bytes: &[u8],
    timeout_minutes: u32,
    application_statics: &StaticObjects,
) -> Result<SessionData> {
    let fields = split_fields(bytes)?;

    let items_raw = STANDARD
        .decode(fields[0])
        .map_err(|e| StoreError::serde(format!("items field is not base64: {}", e)))?;
    let statics_raw = STANDARD
        .decode(fields[1])
        .map_err(|e| StoreError::serde(format!("static objects field is not base64: {}", e)))?;

    if !statics_raw.is_empty() {
        return Err(StoreError::unsupported(format!(
            "{} (payload carries {} bytes)",
            STATICS_UNSUPPORTED,
            statics_raw.len()
        )));
    }
    ensure_no_static_objects(&StaticObjects::new(), application_statics)?;

    let items: SessionItems = if items_raw.is_empty() {
        SessionItems::new()
    } else {
        serde_json::from_slice(&items_raw)?
    };

    Ok(SessionData {
        items,
        static_objects: StaticObjects::new(),
        timeout_minutes,
    })
}

fn split_fields(bytes: &[u8]) -> Result<Vec<&[u8]>> {
    let body = bytes
        .strip_suffix(&[FIELD_TERMINATOR])
        .ok_or_else(|| StoreError::serde("payload is not newline terminated"))?;
    let fields: Vec<&[u8]> = body.split(|b| *b == FIELD_TERMINATOR).collect();
    if fields.len() != FIELD_COUNT {
        return Err(StoreError::serde(format!(
            "payload has {} fields, expected {}",
            fields.len(),
            FIELD_COUNT
        )));
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_statics() -> StaticObjects {
        StaticObjects::new()
    }

    #[test]
    fn test_encode_layout() {
        let data = SessionData::new(20).with_item("x", "1");
        let bytes = encode(&data, &no_statics()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            STANDARD.decode(lines[0]).unwrap(),
            br#"{"x":"1"}"#.to_vec()
        );
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "");
    }

    #[test]
    fn test_roundtrip_items() {
        let data = SessionData::new(20)
            .with_item("x", "1")
            .with_item("cart", "3 items")
            .with_item("unicode", "héllo\nworld");
        let bytes = encode(&data, &no_statics()).unwrap();
        let back = decode(&bytes, 20, &no_statics()).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_roundtrip_empty_yields_empty_collections() {
        let data = SessionData::new(0);
        let bytes = encode(&data, &no_statics()).unwrap();
        let back = decode(&bytes, 0, &no_statics()).unwrap();
        assert!(back.items.is_empty());
        assert!(back.static_objects.is_empty());
    }

    #[test]
    fn test_decode_takes_timeout_from_caller() {
        let bytes = encode(&SessionData::new(20), &no_statics()).unwrap();
        let back = decode(&bytes, 45, &no_statics()).unwrap();
        assert_eq!(back.timeout_minutes, 45);
    }

    #[test]
    fn test_encode_rejects_session_statics() {
        let mut data = SessionData::new(20);
        data.static_objects.insert("counter", "Counter");
        let err = encode(&data, &no_statics()).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedFeature { .. }));
    }

    #[test]
    fn test_encode_rejects_application_statics() {
        let mut app = StaticObjects::new();
        app.insert("catalog", "Catalog");
        let err = encode(&SessionData::new(20), &app).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedFeature { .. }));
    }

    #[test]
    fn test_decode_rejects_statics_field() {
        let payload = format!("{}\n{}\n", STANDARD.encode("{}"), STANDARD.encode("x"));
        let err = decode(payload.as_bytes(), 20, &no_statics()).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedFeature { .. }));
    }

    #[test]
    fn test_decode_rejects_application_statics() {
        let bytes = encode(&SessionData::new(20), &no_statics()).unwrap();
        let mut app = StaticObjects::new();
        app.insert("catalog", "Catalog");
        let err = decode(&bytes, 20, &app).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedFeature { .. }));
    }

    #[test]
    fn test_decode_malformed() {
        for payload in [&b""[..], b"abc", b"not base64!\n\n", b"e30=\n\n\n"] {
            let err = decode(payload, 20, &no_statics()).unwrap_err();
            assert!(matches!(err, StoreError::Serde { .. }), "{:?}", payload);
        }
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Property: decode is the inverse of encode for any flat item map
            #[test]
            fn prop_decode_inverts_encode(
                items in proptest::collection::btree_map(".{0,12}", ".{0,24}", 0..8),
                timeout in 0u32..10_000,
            ) {
                let data = SessionData {
                    items,
                    static_objects: StaticObjects::new(),
                    timeout_minutes: timeout,
                };
                let bytes = encode(&data, &StaticObjects::new()).unwrap();
                let back = decode(&bytes, timeout, &StaticObjects::new()).unwrap();
                prop_assert_eq!(back, data);
            }
        }
    }
}
