//! Status codes reported by the controller firmware and the AUX tool.

/// Tool catalog reply to `m?`.
pub const TOOL_INFO: i64 = 101;

/// Status report: idle with a limit switch pressed.
pub const STATUS_IDLE_LIMIT: i64 = 200;
/// Status report: idle. The tool reuses 200 as generic success.
pub const STATUS_IDLE: i64 = 201;
/// Status report: moving with a limit switch pressed.
pub const STATUS_MOVING_LIMIT: i64 = 202;
/// Status report: moving.
pub const STATUS_MOVING: i64 = 203;

pub const SPEED_SET: i64 = 205;
pub const HOME_SET: i64 = 206;
pub const ENABLED: i64 = 207;
pub const DISABLED: i64 = 208;
pub const ACCEL_SET: i64 = 209;
pub const POSITION_REPORT: i64 = 210;
/// Move finished normally.
pub const TARGET_REACHED: i64 = 211;
/// Axis stopped (decelerating) on command.
pub const STOPPED: i64 = 212;
/// Axis emergency stopped, on command or by a limit switch.
pub const EMERGENCY_STOPPED: i64 = 213;

/// Global configuration acknowledged, also used for "forwarded to AUX".
pub const CONFIG_SET: i64 = 300;
/// Wrapper code on lines bridged from the AUX port.
pub const AUX_FORWARDED: i64 = 301;

pub const LIMITS_DISABLED: i64 = 404;
pub const LIMIT_STATUS: i64 = 405;

pub const LEFT_LIMIT_TRIGGERED: i64 = 411;
pub const RIGHT_LIMIT_TRIGGERED: i64 = 412;

/// Tool reply: generic success.
pub const TOOL_SUCCESS: i64 = 200;
/// Tool reply: target reached.
pub const TOOL_TARGET_REACHED: i64 = 201;

/// Device-reported errors, fatal to any queued command.
pub const DEVICE_ERRORS: [i64; 3] = [403, 406, 407];
/// Tool-reported errors, fatal to queued tool commands.
pub const TOOL_ERRORS: [i64; 3] = [400, 401, 402];

/// Codes that may only come from the AUX tool when no motor is named.
pub const TOOL_CODE_RANGE: std::ops::RangeInclusive<i64> = 100..=402;

/// Tag in the `type` field marking a line bridged from the AUX port.
pub const AUX_TYPE: &str = "AUX";
