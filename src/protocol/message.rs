//! Classification of inbound protocol lines.
//!
//! Categories overlap: a single line can be a motor update and a plain
//! response at the same time, and consumers apply every effect a line has.

use serde_json::{Map, Value};
use thiserror::Error;

use super::catalog::ToolDescriptor;
use super::codes;

/// A line that is not a protocol message. Logged, never correlated.
#[derive(Debug, Error)]
pub enum Noise {
    #[error("not JSON: {0}")]
    NotJson(#[from] serde_json::Error),
    #[error("JSON value is not an object")]
    NotObject,
}

/// Second-stage parse failure of a wrapped AUX payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolPayloadError {
    #[error("AUX wrapper has no message payload")]
    Missing,
    #[error("AUX payload is not valid JSON: {0}")]
    Malformed(String),
    #[error("AUX payload is not a JSON object")]
    NotObject,
}

/// Fields reported for one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct MotorUpdate {
    pub motor: String,
    pub fields: Map<String, Value>,
}

/// A classified protocol message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    body: Map<String, Value>,
    code: Option<i64>,
    motor: Option<String>,
    motor_updates: Vec<MotorUpdate>,
    tool_payload: Option<Result<Map<String, Value>, ToolPayloadError>>,
    catalog: Option<ToolDescriptor>,
    direct_tool: bool,
}

/// Parse and classify one complete line.
pub fn classify(line: &str) -> Result<Message, Noise> {
    match serde_json::from_str::<Value>(line)? {
        Value::Object(body) => Ok(Message::from_object(body)),
        _ => Err(Noise::NotObject),
    }
}

fn code_of(object: &Map<String, Value>) -> Option<i64> {
    let code = object.get("code")?;
    code.as_i64().or_else(|| {
        code.as_f64()
            .filter(|c| c.fract() == 0.0)
            .map(|c| c as i64)
    })
}

fn motor_of(object: &Map<String, Value>) -> Option<String> {
    object
        .get("motor")
        .or_else(|| object.get("motorName"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

fn parse_tool_payload(body: &Map<String, Value>) -> Result<Map<String, Value>, ToolPayloadError> {
    match body.get("message") {
        None | Some(Value::Null) => Err(ToolPayloadError::Missing),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(payload)) => Ok(payload),
            Ok(_) => Err(ToolPayloadError::NotObject),
            Err(e) => Err(ToolPayloadError::Malformed(e.to_string())),
        },
        Some(Value::Object(payload)) => Ok(payload.clone()),
        Some(_) => Err(ToolPayloadError::NotObject),
    }
}

impl Message {
    pub fn from_object(body: Map<String, Value>) -> Self {
        let code = code_of(&body);
        let motor = motor_of(&body);

        let mut motor_updates = Vec::new();
        if let Some(name) = &motor {
            motor_updates.push(MotorUpdate { motor: name.clone(), fields: body.clone() });
        }
        // Position reports for every axis arrive as one `motors` array.
        if let Some(entries) = body.get("motors").and_then(Value::as_array) {
            for entry in entries.iter().filter_map(Value::as_object) {
                if let Some(name) = motor_of(entry) {
                    motor_updates.push(MotorUpdate { motor: name, fields: entry.clone() });
                }
            }
        }

        let wrapped = body.get("type").and_then(Value::as_str) == Some(codes::AUX_TYPE);
        let tool_payload = wrapped.then(|| parse_tool_payload(&body));
        if let Some(Err(e)) = &tool_payload {
            tracing::warn!("Discarding AUX payload: {}", e);
        }

        let catalog_source = if body.contains_key("commands") {
            Some(&body)
        } else {
            tool_payload.as_ref().and_then(|payload| payload.as_ref().ok())
        };
        let catalog = catalog_source.and_then(ToolDescriptor::from_object);

        let direct_tool = !wrapped
            && motor.is_none()
            && code.is_some_and(|c| codes::TOOL_CODE_RANGE.contains(&c));

        Self {
            body,
            code,
            motor,
            motor_updates,
            tool_payload,
            catalog,
            direct_tool,
        }
    }

    /// Top-level status code.
    pub fn code(&self) -> Option<i64> {
        self.code
    }

    /// Axis named at the top level, from `motor` or `motorName`.
    pub fn motor(&self) -> Option<&str> {
        self.motor.as_deref()
    }

    pub fn is_motor_update(&self) -> bool {
        self.motor.is_some()
    }

    /// Every per-axis update this line carries.
    pub fn motor_updates(&self) -> &[MotorUpdate] {
        &self.motor_updates
    }

    /// Tagged `type: "AUX"`: a line bridged from the tool port.
    pub fn is_wrapped_tool(&self) -> bool {
        self.tool_payload.is_some()
    }

    /// The embedded tool payload of a wrapped message.
    pub fn tool_payload(&self) -> Option<&Result<Map<String, Value>, ToolPayloadError>> {
        self.tool_payload.as_ref()
    }

    /// Status code inside a wrapped tool payload.
    pub fn tool_code(&self) -> Option<i64> {
        self.tool_payload
            .as_ref()
            .and_then(|payload| payload.as_ref().ok())
            .and_then(code_of)
    }

    pub fn is_tool_catalog(&self) -> bool {
        self.catalog.is_some()
    }

    pub fn catalog(&self) -> Option<&ToolDescriptor> {
        self.catalog.as_ref()
    }

    /// An unwrapped reply from the tool: a code in the tool's range with no
    /// axis named.
    pub fn is_direct_tool(&self) -> bool {
        self.direct_tool
    }

    pub fn is_plain_response(&self) -> bool {
        self.code.is_some() && !self.is_wrapped_tool() && !self.direct_tool && self.catalog.is_none()
    }

    /// Human-readable `message` text, from the tool payload when wrapped.
    pub fn text(&self) -> String {
        let source = match &self.tool_payload {
            Some(Ok(payload)) => payload,
            _ => &self.body,
        };
        match source.get("message") {
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.body.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_json_lines_are_noise() {
        assert!(matches!(classify("=== Triple Motor Controller ==="), Err(Noise::NotJson(_))));
        assert!(matches!(classify("[1,2,3]"), Err(Noise::NotObject)));
        assert!(matches!(classify("42"), Err(Noise::NotObject)));
    }

    #[test]
    fn test_motor_update_is_also_plain_response() {
        let msg = classify(r#"{"type":"INFO","message":"Target reached!","motor":"Motor1","code":211}"#).unwrap();
        assert!(msg.is_motor_update());
        assert!(msg.is_plain_response());
        assert!(!msg.is_direct_tool());
        assert_eq!(msg.motor(), Some("Motor1"));
        assert_eq!(msg.code(), Some(211));
        assert_eq!(msg.text(), "Target reached!");
    }

    #[test]
    fn test_motor_name_field_is_an_identity() {
        let msg = classify(r#"{"motorName":"Motor2","position":120,"code":210}"#).unwrap();
        assert_eq!(msg.motor(), Some("Motor2"));
        assert_eq!(msg.motor_updates().len(), 1);
    }

    #[test]
    fn test_position_report_array_yields_updates_per_axis() {
        let msg = classify(
            r#"{"motors":[{"motorName":"Motor1","position":1},{"motorName":"Motor2","position":2},{"motorName":"Motor3","position":3}],"code":210}"#,
        )
        .unwrap();
        assert!(!msg.is_motor_update());
        let names: Vec<_> = msg.motor_updates().iter().map(|u| u.motor.as_str()).collect();
        assert_eq!(names, vec!["Motor1", "Motor2", "Motor3"]);
        assert_eq!(msg.motor_updates()[2].fields["position"], 3);
    }

    #[test]
    fn test_wrapped_string_payload_is_parsed() {
        let msg = classify(r#"{"type":"AUX","message":"{\"type\":\"SUCCESS\",\"code\":201}"}"#).unwrap();
        assert!(msg.is_wrapped_tool());
        assert_eq!(msg.code(), None);
        assert_eq!(msg.tool_code(), Some(201));
        assert!(!msg.is_plain_response());
        assert!(!msg.is_direct_tool());
    }

    #[test]
    fn test_wrapped_object_payload_is_used_as_is() {
        let msg = classify(r#"{"type":"AUX","message":{"code":200,"message":"done"},"code":301}"#).unwrap();
        assert_eq!(msg.code(), Some(301));
        assert_eq!(msg.tool_code(), Some(200));
        assert_eq!(msg.text(), "done");
    }

    #[test]
    fn test_malformed_wrapped_payload_keeps_outer_message() {
        let msg = classify(r#"{"type":"AUX","message":"{not json","code":301}"#).unwrap();
        assert!(msg.is_wrapped_tool());
        assert!(matches!(msg.tool_payload(), Some(Err(ToolPayloadError::Malformed(_)))));
        assert_eq!(msg.tool_code(), None);
        assert_eq!(msg.code(), Some(301));

        let msg = classify(r#"{"type":"AUX"}"#).unwrap();
        assert_eq!(msg.tool_payload(), Some(&Err(ToolPayloadError::Missing)));
    }

    #[test]
    fn test_catalog_detected_direct_and_wrapped() {
        let direct = classify(r#"{"type":"INFO","code":101,"name":"Gripper","commands":[{"cmd":"open"}]}"#).unwrap();
        assert!(direct.is_tool_catalog());
        assert!(direct.is_direct_tool());
        assert!(!direct.is_plain_response());
        assert_eq!(direct.catalog().unwrap().name, "Gripper");

        let wrapped = classify(
            r#"{"type":"AUX","message":{"type":"INFO","code":101,"name":"Gripper","commands":[]},"code":301}"#,
        )
        .unwrap();
        assert!(wrapped.is_tool_catalog());
        assert!(wrapped.catalog().unwrap().commands.is_empty());
    }

    #[test]
    fn test_direct_tool_requires_range_and_no_motor() {
        let tool = classify(r#"{"type":"SUCCESS","code":201}"#).unwrap();
        assert!(tool.is_direct_tool());

        let device_error = classify(r#"{"type":"ERROR","message":"Unknown command format","code":403}"#).unwrap();
        assert!(!device_error.is_direct_tool());
        assert!(device_error.is_plain_response());

        let status = classify(r#"{"motor":"Motor1","status":"IDLE","code":201}"#).unwrap();
        assert!(!status.is_direct_tool());
    }
}
