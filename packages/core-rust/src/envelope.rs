//! Request/response envelope exchanged over routing keys.
//!
//! One envelope type carries both directions. On the request path `action`
//! names the requested operation (or is empty); the responder overwrites it
//! with [`FINISHED_ACTION`] on success or [`FAILED_ACTION`] when the bound
//! operation could not produce a result. All structs use
//! `#[serde(rename_all = "camelCase")]` to match the JSON wire shape:
//!
//! ```json
//! { "action": "finished", "payload": {...}, "uuid": "...",
//!   "header": { "externalId": "...", "roles": [] } }
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::Principal;

/// Terminal marker written by a responder after a successful operation.
pub const FINISHED_ACTION: &str = "finished";

/// Terminal marker written by a responder when the operation failed.
///
/// `detailMessage` carries the failure text. Readers that only know
/// [`FINISHED_ACTION`] still decode the envelope, with an absent payload.
pub const FAILED_ACTION: &str = "failed";

// ---------------------------------------------------------------------------
// MessageHeader
// ---------------------------------------------------------------------------

/// Identity of the calling principal, attached by the client and echoed by
/// the responder.
///
/// Roles are informational inside the messaging layer; authorization is
/// decided by the domain handler.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHeader {
    /// Stable identity of the caller. `None` for system-internal calls.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl MessageHeader {
    /// Header for a call made without an authenticated principal.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Builds a header from the ambient principal, if any.
    #[must_use]
    pub fn from_principal(principal: Option<&Principal>) -> Self {
        principal.map_or_else(Self::anonymous, |p| Self {
            external_id: Some(p.id.clone()),
            roles: p.roles.clone(),
        })
    }

    /// Returns `true` when no caller identity is attached.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.external_id.as_deref().map_or(true, str::is_empty)
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Generic wrapper around an operation-specific payload.
///
/// The concrete `T` is bound to the routing key by convention; nothing on the
/// wire says which type a payload is. Use [`crate::routing::Route`] to name
/// the pair in one place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    /// Operation tag on requests, terminal marker on responses.
    #[serde(default)]
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
    /// Correlation id generated by the client for every call.
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub header: MessageHeader,
    /// Free-text diagnostic, set on failed responses.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub detail_message: Option<String>,
}

impl<T> Default for Envelope<T> {
    fn default() -> Self {
        Self {
            action: String::new(),
            payload: None,
            uuid: String::new(),
            header: MessageHeader::default(),
            detail_message: None,
        }
    }
}

impl<T> Envelope<T> {
    /// Builds a request envelope with a fresh correlation id.
    #[must_use]
    pub fn request(action: Option<String>, payload: Option<T>, header: MessageHeader) -> Self {
        Self {
            action: action.unwrap_or_default(),
            payload,
            uuid: Uuid::new_v4().to_string(),
            header,
            detail_message: None,
        }
    }

    /// Builds a successful response for the request identified by `uuid`.
    #[must_use]
    pub fn finished(uuid: impl Into<String>, payload: Option<T>, header: MessageHeader) -> Self {
        Self {
            action: FINISHED_ACTION.to_string(),
            payload,
            uuid: uuid.into(),
            header,
            detail_message: None,
        }
    }

    /// Builds a failure response carrying `detail` and no payload.
    #[must_use]
    pub fn failed(uuid: impl Into<String>, detail: impl Into<String>, header: MessageHeader) -> Self {
        Self {
            action: FAILED_ACTION.to_string(),
            payload: None,
            uuid: uuid.into(),
            header,
            detail_message: Some(detail.into()),
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.action == FINISHED_ACTION
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.action == FAILED_ACTION
    }

    /// Returns the operation tag, or `None` when the request carried none.
    #[must_use]
    pub fn operation(&self) -> Option<&str> {
        (!self.action.is_empty()).then_some(self.action.as_str())
    }

    /// Replaces the payload type while keeping the envelope metadata.
    pub fn map_payload<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            action: self.action,
            payload: self.payload.map(f),
            uuid: self.uuid,
            header: self.header,
            detail_message: self.detail_message,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        id: u32,
        name: String,
    }

    #[test]
    fn request_generates_fresh_correlation_ids() {
        let a: Envelope<()> = Envelope::request(None, None, MessageHeader::anonymous());
        let b: Envelope<()> = Envelope::request(None, None, MessageHeader::anonymous());
        assert!(!a.uuid.is_empty());
        assert_ne!(a.uuid, b.uuid);
        assert!(a.operation().is_none());
    }

    #[test]
    fn decodes_typed_payload_and_missing_payload() {
        // `Widget` has no `Default`; decoding must not require one.
        let env: Envelope<Widget> = serde_json::from_value(json!({
            "action": "finished",
            "payload": {"id": 7, "name": "Widget"},
            "uuid": "abc"
        }))
        .unwrap();
        assert_eq!(
            env.payload,
            Some(Widget {
                id: 7,
                name: "Widget".to_string()
            })
        );
        assert!(env.header.is_anonymous());

        let empty: Envelope<Widget> =
            serde_json::from_value(json!({"action": "failed", "uuid": "abc"})).unwrap();
        assert!(empty.payload.is_none());
        assert!(empty.is_failed());
    }

    #[test]
    fn wire_shape_uses_camel_case_and_omits_absent_fields() {
        let header = MessageHeader {
            external_id: Some("user-7".to_string()),
            roles: vec!["ADMIN".to_string()],
        };
        let env = Envelope::finished("abc", Some(json!({"id": 42})), header);
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(
            value,
            json!({
                "action": "finished",
                "payload": {"id": 42},
                "uuid": "abc",
                "header": {"externalId": "user-7", "roles": ["ADMIN"]}
            })
        );
    }

    #[test]
    fn empty_object_decodes_to_default_envelope() {
        let env: Envelope<Widget> = serde_json::from_str("{}").unwrap();
        assert_eq!(env, Envelope::default());
        assert!(env.header.is_anonymous());
    }

    #[test]
    fn null_payload_decodes_as_absent() {
        let env: Envelope<Widget> =
            serde_json::from_str(r#"{"action":"finished","payload":null,"uuid":"x"}"#).unwrap();
        assert!(env.is_finished());
        assert!(env.payload.is_none());
    }

    #[test]
    fn failed_envelope_carries_detail() {
        let env: Envelope<Widget> = Envelope::failed("id-1", "boom", MessageHeader::anonymous());
        assert!(env.is_failed());
        assert_eq!(env.detail_message.as_deref(), Some("boom"));
        let text = serde_json::to_string(&env).unwrap();
        assert!(text.contains("\"detailMessage\":\"boom\""));
        assert!(!text.contains("payload"));
    }

    #[test]
    fn header_from_principal_copies_identity() {
        let principal = Principal {
            id: "sub-1".to_string(),
            roles: vec!["USER".to_string()],
        };
        let header = MessageHeader::from_principal(Some(&principal));
        assert_eq!(header.external_id.as_deref(), Some("sub-1"));
        assert_eq!(header.roles, vec!["USER"]);
        assert!(MessageHeader::from_principal(None).is_anonymous());
    }

    #[test]
    fn map_payload_keeps_metadata() {
        let env = Envelope::request(Some("GENEFUNK".to_string()), Some(3_u32), MessageHeader::anonymous());
        let uuid = env.uuid.clone();
        let mapped = env.map_payload(|n| n.to_string());
        assert_eq!(mapped.payload.as_deref(), Some("3"));
        assert_eq!(mapped.uuid, uuid);
        assert_eq!(mapped.operation(), Some("GENEFUNK"));
    }

    proptest! {
        #[test]
        fn json_roundtrip_preserves_payload(id in any::<u32>(), name in ".*", external in proptest::option::of("[a-z0-9-]{1,16}")) {
            let header = MessageHeader { external_id: external, roles: vec![] };
            let env = Envelope::request(None, Some(Widget { id, name }), header);
            let text = serde_json::to_string(&env).unwrap();
            let back: Envelope<Widget> = serde_json::from_str(&text).unwrap();
            prop_assert_eq!(back, env);
        }
    }
}
