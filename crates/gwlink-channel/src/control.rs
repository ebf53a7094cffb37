use serde::{Deserialize, Serialize};

/// Control message type: authorization handshake request.
pub const CONTROL_AUTH_REQUEST: &str = "auth_request";
/// Control message type: authorization handshake response.
pub const CONTROL_AUTH_RESPONSE: &str = "auth_response";
/// Control message type: connection liveness probe.
pub const CONTROL_HEARTBEAT: &str = "heartbeat";

/// Authorization response status granting access.
pub const AUTH_STATUS_ACTIVE: &str = "active";
/// Authorization response status denying access.
pub const AUTH_STATUS_DENIED: &str = "denied";

/// JSON control-plane payload carried in the high priority band.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl ControlMessage {
    /// Create an authorization request for a device/operator pair.
    pub fn auth_request(device_id: &str, operator_id: &str) -> Self {
        Self {
            msg_type: CONTROL_AUTH_REQUEST.to_string(),
            payload: Some(serde_json::json!({
                "device_id": device_id,
                "operator_id": operator_id,
            })),
        }
    }

    /// Create a granting authorization response.
    pub fn auth_response_active(session_id: Option<&str>) -> Self {
        let mut payload = serde_json::json!({ "status": AUTH_STATUS_ACTIVE });
        if let (Some(map), Some(session_id)) = (payload.as_object_mut(), session_id) {
            map.insert(
                "session_id".to_string(),
                serde_json::Value::String(session_id.to_string()),
            );
        }
        Self {
            msg_type: CONTROL_AUTH_RESPONSE.to_string(),
            payload: Some(payload),
        }
    }

    /// Create a denying authorization response.
    pub fn auth_response_denied(reason: Option<&str>) -> Self {
        let mut payload = serde_json::json!({ "status": AUTH_STATUS_DENIED });
        if let (Some(map), Some(reason)) = (payload.as_object_mut(), reason) {
            map.insert(
                "reason".to_string(),
                serde_json::Value::String(reason.to_string()),
            );
        }
        Self {
            msg_type: CONTROL_AUTH_RESPONSE.to_string(),
            payload: Some(payload),
        }
    }

    /// Create a heartbeat probe.
    pub fn heartbeat(sequence: u64) -> Self {
        Self {
            msg_type: CONTROL_HEARTBEAT.to_string(),
            payload: Some(serde_json::json!({ "sequence": sequence })),
        }
    }

    /// Serialize for the wire.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Parse a control payload off the wire.
    pub fn parse(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Whether this is an authorization response with active status.
    pub fn grants_authorization(&self) -> bool {
        self.msg_type == CONTROL_AUTH_RESPONSE
            && self
                .payload
                .as_ref()
                .and_then(|payload| payload.get("status"))
                .and_then(|status| status.as_str())
                == Some(AUTH_STATUS_ACTIVE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_request_shape() {
        let msg = ControlMessage::auth_request("device-7", "op-3");
        let bytes = msg.to_bytes().expect("serialize");
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(value["type"], "auth_request");
        assert_eq!(value["payload"]["device_id"], "device-7");
        assert_eq!(value["payload"]["operator_id"], "op-3");
    }

    #[test]
    fn active_response_grants() {
        let msg = ControlMessage::auth_response_active(Some("sess-1"));
        assert!(msg.grants_authorization());
        let parsed = ControlMessage::parse(&msg.to_bytes().expect("serialize")).expect("parse");
        assert!(parsed.grants_authorization());
    }

    #[test]
    fn denied_response_does_not_grant() {
        let msg = ControlMessage::auth_response_denied(Some("bad operator"));
        assert!(!msg.grants_authorization());
    }

    #[test]
    fn heartbeat_is_not_a_grant() {
        assert!(!ControlMessage::heartbeat(9).grants_authorization());
    }
}
