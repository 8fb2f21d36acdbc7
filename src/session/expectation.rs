//! Correlation of inbound replies with the command in flight.
//!
//! Replies carry no request id, only a status code. Each queued command is
//! given an [`Expectation`] when it is enqueued and the reader task feeds
//! every classified line to [`Expectation::evaluate`] while it is current.

use crate::protocol::codes;
use crate::protocol::{Command, CommandKind, Message};

use super::SessionError;

const STOP_CODES: &[i64] = &[codes::STOPPED];
const ESTOP_CODES: &[i64] = &[codes::EMERGENCY_STOPPED];
const HOME_CODES: &[i64] = &[codes::HOME_SET];
const ENABLE_CODES: &[i64] = &[codes::ENABLED];
const DISABLE_CODES: &[i64] = &[codes::DISABLED];
const SPEED_CODES: &[i64] = &[codes::SPEED_SET];
const ACCEL_CODES: &[i64] = &[codes::ACCEL_SET];
const CONFIG_CODES: &[i64] = &[codes::CONFIG_SET];
const STATUS_CODES: &[i64] = &[
    codes::STATUS_IDLE_LIMIT,
    codes::STATUS_IDLE,
    codes::STATUS_MOVING_LIMIT,
    codes::STATUS_MOVING,
];
const POSITION_CODES: &[i64] = &[codes::POSITION_REPORT];
const LIMIT_CODES: &[i64] = &[codes::LIMITS_DISABLED, codes::LIMIT_STATUS];
const MOVE_CODES: &[i64] = &[codes::TARGET_REACHED];
const AUX_CODES: &[i64] = &[codes::TOOL_SUCCESS, codes::TOOL_TARGET_REACHED];

/// Reached target, stopped on command, stopped by a limit switch.
const MOVE_FINISH: &[i64] = &[
    codes::TARGET_REACHED,
    codes::STOPPED,
    codes::EMERGENCY_STOPPED,
];
const AUX_FINISH: &[i64] = &[codes::TOOL_SUCCESS, codes::TOOL_TARGET_REACHED];

fn acceptable_codes(kind: CommandKind) -> &'static [i64] {
    match kind {
        CommandKind::Stop => STOP_CODES,
        CommandKind::EmergencyStop => ESTOP_CODES,
        CommandKind::Home => HOME_CODES,
        CommandKind::Enable => ENABLE_CODES,
        CommandKind::Disable => DISABLE_CODES,
        CommandKind::Speed => SPEED_CODES,
        CommandKind::Acceleration => ACCEL_CODES,
        CommandKind::Config => CONFIG_CODES,
        CommandKind::Status => STATUS_CODES,
        CommandKind::Position => POSITION_CODES,
        CommandKind::Limit => LIMIT_CODES,
        CommandKind::Move => MOVE_CODES,
        CommandKind::Aux => AUX_CODES,
    }
}

fn finish_codes(kind: CommandKind) -> &'static [i64] {
    match kind {
        CommandKind::Move => MOVE_FINISH,
        CommandKind::Aux => AUX_FINISH,
        _ => &[],
    }
}

/// Outcome of feeding one message to the current expectation.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// Not a reply to this command.
    Ignored,
    /// Counted, more replies outstanding.
    Progress,
    /// Last reply arrived.
    Complete,
    Failed(SessionError),
}

/// Completion contract of a queued command.
#[derive(Debug, Clone, PartialEq)]
pub struct Expectation {
    pub kind: CommandKind,
    pub codes: &'static [i64],
    pub remaining: usize,
}

impl Expectation {
    pub fn new(kind: CommandKind, remaining: usize) -> Self {
        Self {
            kind,
            codes: acceptable_codes(kind),
            remaining: remaining.max(1),
        }
    }

    pub fn for_command(command: &Command, axis_count: usize) -> Self {
        Self::new(command.kind(), command.occurrences(axis_count))
    }

    /// The code this expectation should judge `message` by, if any.
    ///
    /// Tool commands read the code inside a wrapped payload and never
    /// complete on an axis report, which reuses the tool's success codes.
    fn effective_code(&self, message: &Message) -> Option<i64> {
        if self.kind != CommandKind::Aux {
            return message.code();
        }
        if message.is_wrapped_tool() {
            return message.tool_code();
        }
        if message.is_motor_update() {
            return None;
        }
        message.code()
    }

    pub fn evaluate(&mut self, message: &Message) -> Evaluation {
        let Some(code) = self.effective_code(message) else {
            return Evaluation::Ignored;
        };

        if codes::DEVICE_ERRORS.contains(&code) {
            return Evaluation::Failed(SessionError::Device {
                code,
                message: message.text(),
            });
        }
        if self.kind == CommandKind::Aux && codes::TOOL_ERRORS.contains(&code) {
            return Evaluation::Failed(SessionError::Tool {
                code,
                message: message.text(),
            });
        }

        if !finish_codes(self.kind).contains(&code) && !self.codes.contains(&code) {
            return Evaluation::Ignored;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            Evaluation::Complete
        } else {
            Evaluation::Progress
        }
    }
}

impl Command {
    pub fn expectation(&self, axis_count: usize) -> Expectation {
        Expectation::for_command(self, axis_count)
    }
}
