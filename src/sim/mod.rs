//! Simulated multi-axis controller.
//!
//! Speaks the controller's line protocol on the device end of an in-memory
//! transport. Axes move a fixed number of steps per tick, travel between two
//! limit switches and back off a switch after tripping it. An optional AUX
//! tool answers catalog queries and tool commands.

use std::time::Duration;

use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::protocol::codes;
use crate::protocol::{ToolCommand, ToolDescriptor};
use crate::protocol::catalog::VALUE_PLACEHOLDER;
use crate::transport::DeviceEnd;

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub axes: Vec<String>,
    /// Steps between the left switch (at 0) and the right switch.
    pub travel: i64,
    /// Physical start position of every axis.
    pub start: i64,
    pub steps_per_rev: i64,
    /// Initial speed in revolutions per second.
    pub speed: f64,
    /// Back-off after a limit trip, as a fraction of a revolution.
    pub limit_compensation: f64,
    pub limits_enabled: bool,
    pub tick: Duration,
    pub tool: Option<ToolDescriptor>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            axes: vec!["Motor1".into(), "Motor2".into(), "Motor3".into()],
            travel: 4000,
            start: 2000,
            steps_per_rev: 200,
            speed: 3.0,
            limit_compensation: 0.5,
            limits_enabled: true,
            tick: Duration::from_millis(10),
            tool: None,
        }
    }
}

impl SimConfig {
    /// Back-off distance in steps.
    pub fn bounce(&self) -> i64 {
        (self.steps_per_rev as f64 * self.limit_compensation).round() as i64
    }

    /// What a full calibration run should measure on every axis.
    pub fn expected_length(&self) -> i64 {
        self.travel - 2 * self.bounce()
    }
}

#[derive(Debug, Clone)]
struct SimAxis {
    name: String,
    position: i64,
    target: i64,
    home: i64,
    complete: bool,
    speed: f64,
}

impl SimAxis {
    fn is_running(&self) -> bool {
        self.position != self.target
    }

    fn reported(&self) -> i64 {
        self.position - self.home
    }
}

pub struct Simulator {
    config: SimConfig,
    axes: Vec<SimAxis>,
    compensation: f64,
}

fn info(message: &str, motor: Option<&str>, code: i64) -> String {
    report("INFO", message, motor, code)
}

fn error(message: &str, code: i64) -> String {
    report("ERROR", message, None, code)
}

fn report(kind: &str, message: &str, motor: Option<&str>, code: i64) -> String {
    let mut body = json!({"type": kind, "message": message, "code": code});
    if let Some(motor) = motor {
        body["motor"] = Value::String(motor.to_string());
    }
    body.to_string()
}

fn wrap_aux(payload: Value) -> String {
    json!({"type": codes::AUX_TYPE, "message": payload, "code": codes::AUX_FORWARDED}).to_string()
}

fn parse_steps(text: &str) -> Option<i64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v.round() as i64)
}

impl Simulator {
    pub fn new(config: SimConfig) -> Self {
        let axes = config
            .axes
            .iter()
            .map(|name| SimAxis {
                name: name.clone(),
                position: config.start,
                target: config.start,
                home: 0,
                complete: true,
                speed: config.speed,
            })
            .collect();
        let compensation = config.limit_compensation;
        Self {
            config,
            axes,
            compensation,
        }
    }

    /// Run on `device` until the host goes away.
    pub fn spawn(self, device: DeviceEnd) -> JoinHandle<()> {
        tokio::spawn(self.run(device))
    }

    pub async fn run(mut self, mut device: DeviceEnd) {
        let mut ticker = tokio::time::interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            let replies = tokio::select! {
                line = device.recv_line() => match line {
                    Some(line) => self.handle_command(&line),
                    None => break,
                },
                _ = ticker.tick(), if self.needs_tick() => self.tick(),
            };
            for reply in replies {
                if !device.send_line(&reply) {
                    return;
                }
            }
        }
        tracing::debug!("Simulator stopped: host closed the link");
    }

    fn any_running(&self) -> bool {
        self.axes.iter().any(SimAxis::is_running)
    }

    fn needs_tick(&self) -> bool {
        self.axes.iter().any(|axis| axis.is_running() || !axis.complete)
    }

    fn bounce(&self) -> i64 {
        (self.config.steps_per_rev as f64 * self.compensation).round() as i64
    }

    fn left_pressed(&self, axis: &SimAxis) -> bool {
        self.config.limits_enabled && axis.position <= 0
    }

    fn right_pressed(&self, axis: &SimAxis) -> bool {
        self.config.limits_enabled && axis.position >= self.config.travel
    }

    fn display(&self, index: usize) -> String {
        let axis = &self.axes[index];
        let moving = axis.is_running();
        let left = self.left_pressed(axis);
        let right = self.right_pressed(axis);
        let pressed = left || right;
        let code = match (moving, pressed) {
            (true, true) => codes::STATUS_MOVING_LIMIT,
            (true, false) => codes::STATUS_MOVING,
            (false, true) => codes::STATUS_IDLE_LIMIT,
            (false, false) => codes::STATUS_IDLE,
        };
        let position = axis.reported();
        let revolutions = (position as f64 / self.config.steps_per_rev as f64 * 100.0).round() / 100.0;
        let mut body = json!({
            "motor": axis.name,
            "position": position,
            "revolutions": revolutions,
            "status": if moving { "MOVING" } else { "IDLE" },
            "code": code,
        });
        if self.config.limits_enabled {
            body["limitLeft"] = Value::Bool(left);
            body["limitRight"] = Value::Bool(right);
        }
        body.to_string()
    }

    /// Advance every axis by one tick of motion.
    fn tick(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        let seconds = self.config.tick.as_secs_f64();
        let bounce = self.bounce();
        for index in 0..self.axes.len() {
            let travel = self.config.travel;
            let limits = self.config.limits_enabled;
            let steps_per_rev = self.config.steps_per_rev as f64;
            let axis = &mut self.axes[index];

            if !axis.is_running() {
                if !axis.complete {
                    axis.complete = true;
                    out.push(info("Target reached!", Some(&axis.name), codes::TARGET_REACHED));
                    out.push(self.display(index));
                }
                continue;
            }

            let step = ((axis.speed * steps_per_rev * seconds).round() as i64).max(1);
            let distance = axis.target - axis.position;
            let next = if distance.abs() <= step {
                axis.target
            } else {
                axis.position + step * distance.signum()
            };

            if limits && distance < 0 && next <= 0 {
                axis.position = 0;
                axis.target = bounce;
                out.push(info("Emergency stop executed", Some(&axis.name), codes::EMERGENCY_STOPPED));
                out.push(report(
                    "WARNING",
                    "LEFT LIMIT SWITCH TRIGGERED - STEPPING BACK",
                    Some(&axis.name),
                    codes::LEFT_LIMIT_TRIGGERED,
                ));
                out.push(self.display(index));
            } else if limits && distance > 0 && next >= travel {
                axis.position = travel;
                axis.target = travel - bounce;
                out.push(info("Emergency stop executed", Some(&axis.name), codes::EMERGENCY_STOPPED));
                out.push(report(
                    "WARNING",
                    "RIGHT LIMIT SWITCH TRIGGERED - STEPPING BACK",
                    Some(&axis.name),
                    codes::RIGHT_LIMIT_TRIGGERED,
                ));
                out.push(self.display(index));
            } else {
                axis.position = next;
            }
        }
        out
    }

    /// Execute one command line and return the immediate replies.
    pub fn handle_command(&mut self, line: &str) -> Vec<String> {
        let input = line.trim();
        let (target, command) = self.split_target(input);
        let targets: Vec<usize> = match target {
            Some(index) => vec![index],
            None => (0..self.axes.len()).collect(),
        };
        let running = self.any_running();
        let lower = command.to_ascii_lowercase();
        let mut out = Vec::new();

        match lower.as_str() {
            "s" => {
                if !running {
                    return vec![error("Nothing to stop, motors are idle.", 406)];
                }
                for &i in &targets {
                    let axis = &mut self.axes[i];
                    axis.target = axis.position;
                    out.push(info("Motor stopped (decelerating)", Some(&axis.name), codes::STOPPED));
                }
            }
            "e" => {
                if !running {
                    return vec![error("Nothing to emergency stop, motors are idle.", 407)];
                }
                for &i in &targets {
                    let axis = &mut self.axes[i];
                    axis.target = axis.position;
                    axis.complete = false;
                    out.push(info("Emergency stop executed", Some(&axis.name), codes::EMERGENCY_STOPPED));
                }
            }
            "h" => {
                if running {
                    return vec![error("Cannot set home while motors are running.", 406)];
                }
                for &i in &targets {
                    let axis = &mut self.axes[i];
                    axis.home = axis.position;
                    out.push(info("Home position set", Some(&axis.name), codes::HOME_SET));
                }
            }
            "p" => match target {
                Some(i) => {
                    let axis = &self.axes[i];
                    out.push(
                        json!({"motorName": axis.name, "position": axis.reported(), "code": codes::POSITION_REPORT})
                            .to_string(),
                    );
                }
                None => {
                    let motors: Vec<Value> = self
                        .axes
                        .iter()
                        .map(|axis| json!({"motorName": axis.name, "position": axis.reported()}))
                        .collect();
                    out.push(json!({"motors": motors, "code": codes::POSITION_REPORT}).to_string());
                }
            },
            "d" => out.extend(targets.iter().map(|&i| self.display(i))),
            "l" => {
                for &i in &targets {
                    let axis = &self.axes[i];
                    if !self.config.limits_enabled {
                        out.push(info("Limit switches disabled", Some(&axis.name), codes::LIMITS_DISABLED));
                        continue;
                    }
                    out.push(
                        json!({
                            "motor": axis.name,
                            "leftPressed": self.left_pressed(axis),
                            "rightPressed": self.right_pressed(axis),
                            "code": codes::LIMIT_STATUS,
                        })
                        .to_string(),
                    );
                }
            }
            "on" | "off" => {
                if running {
                    let message = if lower == "on" {
                        "Motors are already running."
                    } else {
                        "Cannot disable motors while they are running."
                    };
                    return vec![error(message, 406)];
                }
                let (message, code) = if lower == "on" {
                    ("Motor enabled", codes::ENABLED)
                } else {
                    ("Motor disabled", codes::DISABLED)
                };
                for &i in &targets {
                    out.push(info(message, Some(&self.axes[i].name), code));
                }
            }
            _ if command.starts_with('x') || command.starts_with('a') => {
                let is_speed = command.starts_with('x');
                if running {
                    let message = if is_speed {
                        "Cannot change speed while motors are running."
                    } else {
                        "Cannot change acceleration while motors are running."
                    };
                    return vec![error(message, 406)];
                }
                let value = command[1..].trim().parse::<f64>().unwrap_or(0.0);
                for &i in &targets {
                    let axis = &mut self.axes[i];
                    if is_speed {
                        axis.speed = value;
                        out.push(info(&format!("Max speed set to: {:.2}", value), Some(&axis.name), codes::SPEED_SET));
                    } else {
                        out.push(info(&format!("Acceleration set to: {:.2}", value), Some(&axis.name), codes::ACCEL_SET));
                    }
                }
            }
            _ if command.starts_with('m') => {
                let body = &command[1..];
                out.push(info(&format!("Forwarded command to AUX: {}", body), None, codes::CONFIG_SET));
                out.extend(self.tool_reply(body));
            }
            _ if command.starts_with('i') => {
                if running {
                    return vec![error(
                        "Error: Cannot change limit compensation ratio while motors are running.",
                        406,
                    )];
                }
                self.compensation = command[1..].trim().parse::<f64>().unwrap_or(0.0);
                out.push(info(
                    &format!("Limit Compensation Ratio set to: {:.2}", self.compensation),
                    None,
                    codes::CONFIG_SET,
                ));
            }
            _ if target.is_some() && !command.is_empty() => {
                if running {
                    return vec![error("Cannot move motors while they are running.", 406)];
                }
                let Some(index) = target else {
                    return out;
                };
                let relative = command.starts_with('+') || command.starts_with('-');
                let Some(steps) = parse_steps(command.trim_start_matches('+')) else {
                    return vec![error("Unknown command format", 403)];
                };
                let axis = &mut self.axes[index];
                axis.target = if relative {
                    axis.position + steps
                } else {
                    axis.home + steps
                };
                axis.complete = false;
            }
            _ if !command.is_empty() => {
                if running {
                    return vec![error("Cannot move motors while they are running.", 406)];
                }
                if !command.contains(',') {
                    return vec![error("Both motors command requires comma-separated values", 403)];
                }
                let Some(values) = command.split(',').map(parse_steps).collect::<Option<Vec<_>>>() else {
                    return vec![error("Unknown command format", 403)];
                };
                for (axis, steps) in self.axes.iter_mut().zip(values) {
                    axis.target = axis.home + steps;
                    axis.complete = false;
                }
            }
            _ => {}
        }
        out
    }

    fn split_target<'a>(&self, input: &'a str) -> (Option<usize>, &'a str) {
        if let Some((prefix, rest)) = input.split_once(':') {
            if let Ok(n) = prefix.parse::<usize>() {
                if (1..=self.axes.len()).contains(&n) {
                    return (Some(n - 1), rest);
                }
            }
        }
        (None, input)
    }

    fn tool_reply(&self, body: &str) -> Vec<String> {
        let Some(tool) = &self.config.tool else {
            return Vec::new();
        };
        if body == "?" {
            let mut catalog = json!({"type": "INFO", "code": codes::TOOL_INFO, "name": tool.name});
            catalog["commands"] = serde_json::to_value(&tool.commands).unwrap_or(Value::Array(Vec::new()));
            return vec![wrap_aux(catalog)];
        }
        let known = tool.commands.iter().any(|command| matches_template(command, body));
        let payload = if known {
            json!({"type": "SUCCESS", "message": format!("{} done", body), "code": codes::TOOL_SUCCESS})
        } else {
            json!({"type": "ERROR", "message": format!("Unknown tool command: {}", body), "code": 400})
        };
        vec![wrap_aux(payload)]
    }
}

fn matches_template(command: &ToolCommand, body: &str) -> bool {
    match command.cmd.split_once(VALUE_PLACEHOLDER) {
        Some((head, tail)) => body.starts_with(head) && body.ends_with(tail) && body.len() > head.len() + tail.len(),
        None if command.requires_value() => body.starts_with(&command.cmd) && body.len() > command.cmd.len(),
        None => body == command.cmd,
    }
}
