//! Outbound command grammar.
//!
//! ```text
//! command  := [axis ":"] body
//! body     := "s" | "e" | "h" | "on" | "off" | "d" | "p" | "l"
//!           | ("x" | "a" | "i") number
//!           | "m?" | "m" text
//!           | ("+" | "-") number        (relative, axis required)
//!           | number                    (absolute)
//!           | number ("," number)+      (combined, no axis)
//! ```

use thiserror::Error;

/// Which axes a command addresses.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// No selector: the controller applies it to every axis.
    All,
    /// `N:` selector, 1-based.
    Axis(usize),
    /// Comma-separated per-axis values.
    Combined(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Stop,
    EmergencyStop,
    Home,
    Enable,
    Disable,
    Status,
    Position,
    Limit,
    Speed(f64),
    Acceleration(f64),
    LimitCompensation(f64),
    MoveAbsolute(f64),
    MoveRelative(f64),
    MoveCombined(Vec<f64>),
    ToolQuery,
    Tool(String),
}

/// Completion class of a command, used to pick its reply codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Stop,
    EmergencyStop,
    Home,
    Enable,
    Disable,
    Speed,
    Acceleration,
    Config,
    Status,
    Position,
    Limit,
    Move,
    Aux,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,
    #[error("axis {axis} is out of range 1..={max}")]
    AxisOutOfRange { axis: usize, max: usize },
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("combined move takes 2..={max} values, got {got}")]
    BadValueCount { got: usize, max: usize },
    #[error("'{0}' cannot be sent to a single axis")]
    AxisNotAllowed(String),
    #[error("relative move '{0}' needs an axis selector")]
    AxisRequired(String),
    #[error("unrecognized command '{0}'")]
    Unrecognized(String),
    /// The catalog reply completes no queued command; discovery owns `m?`.
    #[error("'{0}' cannot be queued, use tool discovery")]
    NotQueueable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub target: Target,
    pub action: Action,
}

fn parse_number(text: &str) -> Result<f64, CommandParseError> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| CommandParseError::InvalidNumber(text.trim().to_string()))
}

fn split_axis(text: &str, axis_count: usize) -> Result<(Option<usize>, &str), CommandParseError> {
    let Some((prefix, rest)) = text.split_once(':') else {
        return Ok((None, text));
    };
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Ok((None, text));
    }
    let axis = prefix
        .parse::<usize>()
        .map_err(|_| CommandParseError::InvalidNumber(prefix.to_string()))?;
    if axis == 0 || axis > axis_count {
        return Err(CommandParseError::AxisOutOfRange { axis, max: axis_count });
    }
    Ok((Some(axis), rest.trim()))
}

/// Parse command text for a controller with `axis_count` axes.
pub fn parse_command(text: &str, axis_count: usize) -> Result<Command, CommandParseError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CommandParseError::Empty);
    }
    let (axis, body) = split_axis(text, axis_count)?;
    if body.is_empty() {
        return Err(CommandParseError::Empty);
    }
    let target = axis.map_or(Target::All, Target::Axis);

    let keyword = match body.to_ascii_lowercase().as_str() {
        "s" => Some(Action::Stop),
        "e" => Some(Action::EmergencyStop),
        "h" => Some(Action::Home),
        "on" => Some(Action::Enable),
        "off" => Some(Action::Disable),
        "d" => Some(Action::Status),
        "p" => Some(Action::Position),
        "l" => Some(Action::Limit),
        "m?" => Some(Action::ToolQuery),
        _ => None,
    };
    if let Some(action) = keyword {
        return Ok(Command { target, action });
    }

    let mut chars = body.chars();
    let first = chars.next().unwrap_or_default();
    let rest = chars.as_str();
    let action = match first.to_ascii_lowercase() {
        'm' if !rest.is_empty() => Action::Tool(rest.to_string()),
        'x' => Action::Speed(parse_number(rest)?),
        'a' => Action::Acceleration(parse_number(rest)?),
        'i' => Action::LimitCompensation(parse_number(rest)?),
        '+' | '-' if axis.is_some() => Action::MoveRelative(parse_number(body)?),
        '+' if axis.is_none() => return Err(CommandParseError::AxisRequired(body.to_string())),
        _ if body.contains(',') => {
            if axis.is_some() {
                return Err(CommandParseError::AxisNotAllowed(body.to_string()));
            }
            let values = body
                .split(',')
                .map(parse_number)
                .collect::<Result<Vec<_>, _>>()?;
            if values.len() < 2 || values.len() > axis_count {
                return Err(CommandParseError::BadValueCount { got: values.len(), max: axis_count });
            }
            return Ok(Command {
                target: Target::Combined(values.len()),
                action: Action::MoveCombined(values),
            });
        }
        c if c.is_ascii_digit() || c == '-' || c == '.' => Action::MoveAbsolute(parse_number(body)?),
        _ => return Err(CommandParseError::Unrecognized(body.to_string())),
    };
    Ok(Command { target, action })
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self.action {
            Action::Stop => CommandKind::Stop,
            Action::EmergencyStop => CommandKind::EmergencyStop,
            Action::Home => CommandKind::Home,
            Action::Enable => CommandKind::Enable,
            Action::Disable => CommandKind::Disable,
            Action::Status => CommandKind::Status,
            Action::Position => CommandKind::Position,
            Action::Limit => CommandKind::Limit,
            Action::Speed(_) => CommandKind::Speed,
            Action::Acceleration(_) => CommandKind::Acceleration,
            Action::LimitCompensation(_) => CommandKind::Config,
            Action::MoveAbsolute(_) | Action::MoveRelative(_) | Action::MoveCombined(_) => {
                CommandKind::Move
            }
            Action::ToolQuery | Action::Tool(_) => CommandKind::Aux,
        }
    }

    /// Stop-class commands preempt motion and flush the backlog.
    pub fn is_stop(&self) -> bool {
        matches!(self.action, Action::Stop | Action::EmergencyStop)
    }

    /// How many replies the controller sends for this command.
    pub fn occurrences(&self, axis_count: usize) -> usize {
        match self.kind() {
            // Global settings, position reports and tool traffic answer once.
            CommandKind::Config | CommandKind::Position | CommandKind::Aux => 1,
            _ => match self.target {
                Target::Axis(_) => 1,
                Target::Combined(fields) => fields,
                Target::All => axis_count,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Command {
        parse_command(text, 3).unwrap()
    }

    #[test]
    fn test_single_axis_move_counts_once() {
        let cmd = parse("1:500");
        assert_eq!(cmd.target, Target::Axis(1));
        assert_eq!(cmd.action, Action::MoveAbsolute(500.0));
        assert_eq!(cmd.kind(), CommandKind::Move);
        assert_eq!(cmd.occurrences(3), 1);
        assert_eq!(parse("3:-12.5").occurrences(3), 1);
    }

    #[test]
    fn test_combined_move_counts_fields() {
        let cmd = parse("100,-200,300");
        assert_eq!(cmd.action, Action::MoveCombined(vec![100.0, -200.0, 300.0]));
        assert_eq!(cmd.occurrences(3), 3);
        assert_eq!(parse("10,20").occurrences(3), 2);
    }

    #[test]
    fn test_unscoped_commands_fan_out_to_every_axis() {
        for text in ["h", "s", "e", "on", "off", "d", "l", "x2", "a0.5", "750"] {
            assert_eq!(parse(text).occurrences(3), 3, "{}", text);
            assert_eq!(parse_command(text, 5).unwrap().occurrences(5), 5, "{}", text);
        }
    }

    #[test]
    fn test_single_reply_kinds() {
        assert_eq!(parse("p").occurrences(3), 1);
        assert_eq!(parse("i0.8").kind(), CommandKind::Config);
        assert_eq!(parse("i0.8").occurrences(3), 1);
        assert_eq!(parse("m?").action, Action::ToolQuery);
        assert_eq!(parse("mopen").action, Action::Tool("open".into()));
        assert_eq!(parse("mopen").occurrences(3), 1);
    }

    #[test]
    fn test_relative_moves_need_axis() {
        assert_eq!(parse("2:+40").action, Action::MoveRelative(40.0));
        assert_eq!(parse("2:-40").action, Action::MoveRelative(-40.0));
        assert!(matches!(parse_command("+40", 3), Err(CommandParseError::AxisRequired(_))));
        // A bare signed value is an absolute move on every axis.
        assert_eq!(parse("-40").action, Action::MoveAbsolute(-40.0));
    }

    #[test]
    fn test_keywords_are_case_insensitive_and_scoped() {
        let cmd = parse("2:S");
        assert_eq!(cmd.action, Action::Stop);
        assert_eq!(cmd.target, Target::Axis(2));
        assert!(cmd.is_stop());
        assert!(parse("e").is_stop());
        assert!(!parse("h").is_stop());
        assert_eq!(parse(" 1:OFF ").action, Action::Disable);
    }

    #[test]
    fn test_speed_and_acceleration_values() {
        assert_eq!(parse("x3").action, Action::Speed(3.0));
        assert_eq!(parse("1:a0.5").action, Action::Acceleration(0.5));
        assert_eq!(parse("1:a0.5").occurrences(3), 1);
    }

    #[test]
    fn test_rejects_malformed_commands() {
        assert_eq!(parse_command("   ", 3), Err(CommandParseError::Empty));
        assert_eq!(parse_command("1:", 3), Err(CommandParseError::Empty));
        assert_eq!(
            parse_command("4:100", 3),
            Err(CommandParseError::AxisOutOfRange { axis: 4, max: 3 })
        );
        assert!(matches!(parse_command("xfast", 3), Err(CommandParseError::InvalidNumber(_))));
        assert!(matches!(parse_command("1:1,2", 3), Err(CommandParseError::AxisNotAllowed(_))));
        assert!(matches!(
            parse_command("1,2,3,4", 3),
            Err(CommandParseError::BadValueCount { got: 4, max: 3 })
        ));
        assert!(matches!(parse_command("z", 3), Err(CommandParseError::Unrecognized(_))));
        assert!(matches!(parse_command("m", 3), Err(CommandParseError::Unrecognized(_))));
        assert!(matches!(parse_command("1,nan", 3), Err(CommandParseError::InvalidNumber(_))));
    }
}
