//! Tool catalog types: what the attached AUX tool says it can do.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name used when a catalog reply omits `name`.
pub const DEFAULT_TOOL_NAME: &str = "AUX Tool";

/// Placeholder replaced by the caller's value in a command template.
pub const VALUE_PLACEHOLDER: &str = "<val>";

/// Whether a tool command takes a value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InputKind {
    #[default]
    None,
    /// The tool's own input type label, e.g. `number` or `text`.
    Value(String),
}

impl From<String> for InputKind {
    fn from(label: String) -> Self {
        if label.is_empty() || label.eq_ignore_ascii_case("none") {
            InputKind::None
        } else {
            InputKind::Value(label)
        }
    }
}

impl From<InputKind> for String {
    fn from(kind: InputKind) -> Self {
        match kind {
            InputKind::None => "none".to_string(),
            InputKind::Value(label) => label,
        }
    }
}

/// One entry of the tool catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCommand {
    /// Invocation template, sent after the `m` prefix.
    #[serde(default)]
    pub cmd: String,
    #[serde(default)]
    pub input_type: InputKind,
    /// Must go through the command queue and wait for the tool's reply.
    #[serde(default)]
    pub is_queue: bool,
    /// Labels, descriptions and anything else the tool reports.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolCommand {
    pub fn requires_value(&self) -> bool {
        self.input_type != InputKind::None
    }

    /// Wire text for invoking this command, `m` prefix included.
    ///
    /// A value is substituted for `<val>` when the template has one and
    /// appended otherwise. Commands without input ignore `value`.
    pub fn render(&self, value: Option<&str>) -> String {
        let body = match value {
            Some(value) if self.requires_value() => {
                if self.cmd.contains(VALUE_PLACEHOLDER) {
                    self.cmd.replacen(VALUE_PLACEHOLDER, value, 1)
                } else {
                    format!("{}{}", self.cmd, value)
                }
            }
            _ => self.cmd.clone(),
        };
        format!("m{}", body)
    }
}

/// The discovered tool: its name and ordered command list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub commands: Vec<ToolCommand>,
}

impl ToolDescriptor {
    /// Build a descriptor from a JSON object carrying a `commands` array.
    /// Entries that are not valid commands are skipped with a warning.
    pub fn from_object(object: &Map<String, Value>) -> Option<Self> {
        let entries = object.get("commands")?.as_array()?;
        let name = object
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_TOOL_NAME)
            .to_string();
        let commands = entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                match serde_json::from_value::<ToolCommand>(entry.clone()) {
                    Ok(command) => Some(command),
                    Err(e) => {
                        tracing::warn!("Skipping tool command #{} of '{}': {}", index, name, e);
                        None
                    }
                }
            })
            .collect();
        Some(Self { name, commands })
    }

    pub fn is_available(&self) -> bool {
        !self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_catalog_parses_tool_fields() {
        let body = object(json!({
            "type": "INFO",
            "code": 101,
            "name": "Gripper",
            "commands": [
                {"cmd": "open", "inputType": "none", "isQueue": true, "label": "Open"},
                {"cmd": "w<val>", "inputType": "number", "isQueue": false}
            ]
        }));
        let descriptor = ToolDescriptor::from_object(&body).unwrap();
        assert_eq!(descriptor.name, "Gripper");
        assert_eq!(descriptor.commands.len(), 2);
        assert!(!descriptor.commands[0].requires_value());
        assert!(descriptor.commands[0].is_queue);
        assert_eq!(descriptor.commands[0].extra["label"], "Open");
        assert_eq!(descriptor.commands[1].input_type, InputKind::Value("number".into()));
    }

    #[test]
    fn test_catalog_without_name_uses_default() {
        let body = object(json!({"commands": []}));
        let descriptor = ToolDescriptor::from_object(&body).unwrap();
        assert_eq!(descriptor.name, DEFAULT_TOOL_NAME);
        assert!(!descriptor.is_available());
    }

    #[test]
    fn test_bad_entries_are_skipped() {
        let body = object(json!({
            "name": "Gripper",
            "commands": ["open", {"cmd": "close", "isQueue": true}, {"cmd": 7}, null]
        }));
        let descriptor = ToolDescriptor::from_object(&body).unwrap();
        assert_eq!(descriptor.commands.len(), 1);
        assert_eq!(descriptor.commands[0].cmd, "close");
    }

    #[test]
    fn test_object_without_commands_is_not_a_catalog() {
        assert!(ToolDescriptor::from_object(&object(json!({"code": 101}))).is_none());
        assert!(ToolDescriptor::from_object(&object(json!({"commands": "x"}))).is_none());
    }

    #[test]
    fn test_render_substitutes_or_appends_value() {
        let with_placeholder = ToolCommand {
            cmd: "w<val>s".into(),
            input_type: InputKind::Value("number".into()),
            ..Default::default()
        };
        assert_eq!(with_placeholder.render(Some("40")), "mw40s");

        let appended = ToolCommand {
            cmd: "speed".into(),
            input_type: InputKind::Value("number".into()),
            ..Default::default()
        };
        assert_eq!(appended.render(Some("3")), "mspeed3");
        assert_eq!(appended.render(None), "mspeed");

        let plain = ToolCommand { cmd: "open".into(), ..Default::default() };
        assert_eq!(plain.render(Some("ignored")), "mopen");
    }
}
