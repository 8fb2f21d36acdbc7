//! Last-known state of every axis and of the attached tool.

use std::fmt;

use serde_json::{Map, Value};

use crate::protocol::ToolDescriptor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MotorStatus {
    Unknown,
    Idle,
    Moving,
    Error,
    Other(String),
}

impl MotorStatus {
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_uppercase().as_str() {
            "IDLE" => MotorStatus::Idle,
            "MOVING" => MotorStatus::Moving,
            "ERROR" => MotorStatus::Error,
            "UNKNOWN" => MotorStatus::Unknown,
            _ => MotorStatus::Other(label.to_string()),
        }
    }
}

impl fmt::Display for MotorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotorStatus::Unknown => write!(f, "UNKNOWN"),
            MotorStatus::Idle => write!(f, "IDLE"),
            MotorStatus::Moving => write!(f, "MOVING"),
            MotorStatus::Error => write!(f, "ERROR"),
            MotorStatus::Other(label) => write!(f, "{}", label),
        }
    }
}

/// Snapshot of one axis. Telemetry fields persist until overwritten.
#[derive(Debug, Clone, PartialEq)]
pub struct MotorState {
    pub status: MotorStatus,
    pub fields: Map<String, Value>,
}

impl Default for MotorState {
    fn default() -> Self {
        Self {
            status: MotorStatus::Unknown,
            fields: Map::new(),
        }
    }
}

impl MotorState {
    pub fn position(&self) -> Option<f64> {
        self.fields.get("position").and_then(Value::as_f64)
    }

    pub fn is_idle(&self) -> bool {
        self.status == MotorStatus::Idle
    }
}

#[derive(Debug, Clone)]
pub struct StateStore {
    motors: Vec<(String, MotorState)>,
    tool: Option<ToolDescriptor>,
}

impl StateStore {
    /// One `Unknown` entry per axis name, in axis order.
    pub fn new(axes: &[String]) -> Self {
        Self {
            motors: axes
                .iter()
                .map(|name| (name.clone(), MotorState::default()))
                .collect(),
            tool: None,
        }
    }

    /// Merge `fields` into the named axis. Unknown axes are ignored.
    pub fn apply_motor_update(&mut self, motor: &str, fields: &Map<String, Value>) -> bool {
        let Some((_, state)) = self.motors.iter_mut().find(|(name, _)| name == motor) else {
            tracing::trace!("Ignoring update for unknown motor '{}'", motor);
            return false;
        };
        for (key, value) in fields {
            if key == "status" {
                if let Some(label) = value.as_str() {
                    state.status = MotorStatus::from_label(label);
                }
                continue;
            }
            state.fields.insert(key.clone(), value.clone());
        }
        true
    }

    /// Replace the tool descriptor. Returns `false` when it is unchanged.
    pub fn apply_tool_catalog(&mut self, descriptor: ToolDescriptor) -> bool {
        if self.tool.as_ref() == Some(&descriptor) {
            return false;
        }
        self.tool = Some(descriptor);
        true
    }

    pub fn motor(&self, name: &str) -> Option<&MotorState> {
        self.motors
            .iter()
            .find(|(motor, _)| motor == name)
            .map(|(_, state)| state)
    }

    pub fn motors(&self) -> impl Iterator<Item = (&str, &MotorState)> {
        self.motors.iter().map(|(name, state)| (name.as_str(), state))
    }

    pub fn axis_count(&self) -> usize {
        self.motors.len()
    }

    pub fn all_idle(&self) -> bool {
        self.motors.iter().all(|(_, state)| state.is_idle())
    }

    /// Positions in axis order, `None` where none has been reported.
    pub fn positions(&self) -> Vec<Option<f64>> {
        self.motors.iter().map(|(_, state)| state.position()).collect()
    }

    pub fn tool(&self) -> Option<&ToolDescriptor> {
        self.tool.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ToolCommand;
    use serde_json::json;

    fn store() -> StateStore {
        StateStore::new(&["Motor1".to_string(), "Motor2".to_string(), "Motor3".to_string()])
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_motors_start_unknown() {
        let store = store();
        assert_eq!(store.axis_count(), 3);
        assert!(store.motors().all(|(_, m)| m.status == MotorStatus::Unknown));
        assert!(!store.all_idle());
    }

    #[test]
    fn test_update_merges_without_dropping_fields() {
        let mut store = store();
        assert!(store.apply_motor_update("Motor1", &fields(json!({"position": 120, "status": "MOVING", "limitLeft": false}))));
        assert!(store.apply_motor_update("Motor1", &fields(json!({"status": "IDLE", "code": 201}))));

        let motor = store.motor("Motor1").unwrap();
        assert_eq!(motor.status, MotorStatus::Idle);
        assert_eq!(motor.position(), Some(120.0));
        assert_eq!(motor.fields["limitLeft"], false);
        assert_eq!(motor.fields["code"], 201);
    }

    #[test]
    fn test_unknown_motor_is_ignored() {
        let mut store = store();
        assert!(!store.apply_motor_update("Motor9", &fields(json!({"status": "IDLE"}))));
        assert!(store.motor("Motor9").is_none());
    }

    #[test]
    fn test_all_idle_requires_every_axis() {
        let mut store = store();
        for name in ["Motor1", "Motor2"] {
            store.apply_motor_update(name, &fields(json!({"status": "IDLE"})));
        }
        assert!(!store.all_idle());
        store.apply_motor_update("Motor3", &fields(json!({"status": "idle"})));
        assert!(store.all_idle());
    }

    #[test]
    fn test_tool_catalog_change_detection() {
        let mut store = store();
        let descriptor = ToolDescriptor {
            name: "Gripper".into(),
            commands: vec![ToolCommand { cmd: "open".into(), ..Default::default() }],
        };
        assert!(store.apply_tool_catalog(descriptor.clone()));
        assert!(!store.apply_tool_catalog(descriptor.clone()));

        let mut renamed = descriptor.clone();
        renamed.name = "Spindle".into();
        assert!(store.apply_tool_catalog(renamed.clone()));

        let mut extended = renamed.clone();
        extended.commands.push(ToolCommand { cmd: "close".into(), ..Default::default() });
        assert!(store.apply_tool_catalog(extended));
        assert_eq!(store.tool().unwrap().commands.len(), 2);
    }
}
