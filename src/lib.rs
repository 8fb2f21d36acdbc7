// stepper-link: host session layer for a line-protocol stepper controller

pub mod calibration;
pub mod config;
pub mod protocol;
pub mod session;
pub mod sim;
pub mod transport;

pub use calibration::{AxisLength, CalibrationError, calibrate};
pub use config::{Config, ConfigError, load_config};
pub use session::{Session, SessionError, SessionEvent};
