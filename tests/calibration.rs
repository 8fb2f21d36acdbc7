use stepper_link::calibration::{CalibrationError, calibrate};
use stepper_link::config::Config;
use stepper_link::session::Session;
use stepper_link::sim::{SimConfig, Simulator};
use stepper_link::transport::memory_pair;
use tokio_test::assert_ok;

async fn simulated(config: &Config, sim: SimConfig) -> Session {
    let (transport, device) = memory_pair();
    Simulator::new(sim).spawn(device);
    let session = Session::new(config);
    assert_ok!(session.connect(&transport).await);
    session
}

#[tokio::test(start_paused = true)]
async fn calibration_measures_every_axis() {
    let config = Config::default();
    let sim = SimConfig::default();
    let expected = sim.expected_length() as f64;
    let session = simulated(&config, sim).await;

    let lengths = calibrate(&session, &config.calibration).await.unwrap();
    let names: Vec<_> = lengths.iter().map(|l| l.axis.as_str()).collect();
    assert_eq!(names, vec!["Motor1", "Motor2", "Motor3"]);
    assert!(lengths.iter().all(|l| l.length == expected));

    // Every axis is parked at the middle of its measured travel.
    let state = session.state().await;
    assert!(state.all_idle());
    assert_eq!(state.positions(), vec![Some((expected / 2.0).floor()); 3]);
    assert!(session.queue_snapshot().await.processing.is_none());
}

#[tokio::test(start_paused = true)]
async fn calibration_handles_single_axis() {
    let mut config = Config::default();
    config.motion.axes = vec!["Motor1".to_string()];
    let sim = SimConfig {
        axes: config.motion.axes.clone(),
        travel: 1000,
        start: 300,
        ..SimConfig::default()
    };
    let expected = sim.expected_length() as f64;
    let session = simulated(&config, sim).await;

    let lengths = calibrate(&session, &config.calibration).await.unwrap();
    assert_eq!(lengths.len(), 1);
    assert_eq!(lengths[0].length, expected);
}

#[tokio::test]
async fn calibration_requires_connection() {
    let config = Config::default();
    let session = Session::new(&config);
    let result = calibrate(&session, &config.calibration).await;
    assert!(matches!(result, Err(CalibrationError::NotConnected)));
}
