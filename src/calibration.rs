//! Travel calibration: drive every axis into both limit switches and record
//! how far apart they are.
//!
//! The controller backs off each switch by itself after tripping it, so the
//! measured length is the distance between the two backed-off positions.

use std::fmt;

use thiserror::Error;

use crate::config::CalibrationConfig;
use crate::protocol::Message;
use crate::session::{Session, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prepare,
    FindHome,
    SetHome,
    MeasureLength,
    ReadLengths,
    Center,
    Restore,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Prepare => "prepare",
            Phase::FindHome => "find home",
            Phase::SetHome => "set home",
            Phase::MeasureLength => "measure length",
            Phase::ReadLengths => "read lengths",
            Phase::Center => "center",
            Phase::Restore => "restore",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("calibration needs a connected session")]
    NotConnected,
    #[error("calibration phase '{phase}' failed: {source}")]
    Phase {
        phase: Phase,
        #[source]
        source: SessionError,
    },
    #[error("no position reported for axis '{0}'")]
    MissingPosition(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AxisLength {
    pub axis: String,
    pub length: f64,
}

fn at(phase: Phase) -> impl FnOnce(SessionError) -> CalibrationError {
    move |source| CalibrationError::Phase { phase, source }
}

/// One target per axis. A single axis has no combined form, and `1:-x` is a
/// relative move on the wire, which still ends at the switch when overshooting.
async fn move_every_axis(session: &Session, targets: &[f64]) -> Result<Message, SessionError> {
    match targets {
        [only] if *only < 0.0 => session.move_relative(1, *only).await,
        [only] => session.move_absolute(1, *only).await,
        _ => session.move_all(targets).await,
    }
}

pub async fn calibrate(
    session: &Session,
    config: &CalibrationConfig,
) -> Result<Vec<AxisLength>, CalibrationError> {
    if !session.is_connected().await {
        return Err(CalibrationError::NotConnected);
    }
    let axes = session.axis_names().to_vec();
    let overshoot = config.overshoot as f64;
    tracing::info!("Calibration started on {} axes", axes.len());

    session.set_speed(config.slow_speed).await.map_err(at(Phase::Prepare))?;
    session
        .set_acceleration(config.slow_acceleration)
        .await
        .map_err(at(Phase::Prepare))?;

    tracing::info!("Calibration: finding home");
    move_every_axis(session, &vec![-overshoot; axes.len()])
        .await
        .map_err(at(Phase::FindHome))?;
    session.wait_for_idle().await.map_err(at(Phase::FindHome))?;

    session.set_home(None).await.map_err(at(Phase::SetHome))?;

    tracing::info!("Calibration: measuring axis length");
    move_every_axis(session, &vec![overshoot; axes.len()])
        .await
        .map_err(at(Phase::MeasureLength))?;
    session.wait_for_idle().await.map_err(at(Phase::MeasureLength))?;

    session.positions(None).await.map_err(at(Phase::ReadLengths))?;
    let state = session.state().await;
    let lengths = axes
        .iter()
        .map(|axis| {
            state
                .motor(axis)
                .and_then(|motor| motor.position())
                .map(|length| AxisLength {
                    axis: axis.clone(),
                    length,
                })
                .ok_or_else(|| CalibrationError::MissingPosition(axis.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    for measured in &lengths {
        tracing::info!("Calibration: {} length {}", measured.axis, measured.length);
    }

    let midpoints: Vec<f64> = lengths.iter().map(|l| (l.length / 2.0).floor()).collect();
    tracing::info!("Calibration: moving to center {:?}", midpoints);
    move_every_axis(session, &midpoints)
        .await
        .map_err(at(Phase::Center))?;
    session.wait_for_idle().await.map_err(at(Phase::Center))?;

    session.set_speed(config.normal_speed).await.map_err(at(Phase::Restore))?;
    session
        .set_acceleration(config.normal_acceleration)
        .await
        .map_err(at(Phase::Restore))?;

    tracing::info!("Calibration done");
    Ok(lengths)
}
