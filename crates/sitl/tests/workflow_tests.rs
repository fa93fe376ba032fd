//! End-to-end configuration workflow against the simulated flight controller.

use std::fs;
use std::sync::Arc;

use ardu_configurator::communication::mavlink::{ClientConfig, ProtocolClient};
use ardu_configurator::configuration::{
    ConfigurationStepEngine, HeadlessOperator, PluginRegistry, VehicleDirectory,
};
use ardu_configurator::core::Settings;
use ardu_configurator_core::configuration::{ResetRequirement, WorkflowState};
use ardu_configurator_core::parameters::Tolerance;
use ardu_configurator_core::traits::MockTime;
use ardu_configurator_sitl::SimulatedFlightController;

fn controller(time: &MockTime) -> SimulatedFlightController {
    let mut fc = SimulatedFlightController::new(time.clone());
    for (name, value, default) in [
        ("ATC_RAT_PIT_P", 0.135, 0.135),
        ("ATC_RAT_RLL_P", 0.135, 0.135),
        ("BRD_BOOT_DELAY", 0.0, 0.0),
        ("GPS_TYPE", 1.0, 1.0),
        ("INS_GYRO_FILTER", 20.0, 20.0),
        ("MOT_THST_HOVER", 0.35, 0.35),
    ] {
        fc.add_parameter(name, value, default).unwrap();
    }
    fc
}

fn vehicle_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("01_gps.param"),
        "GPS_TYPE,2  # u-blox\nBRD_BOOT_DELAY,2500\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("02_filter.param"),
        "INS_GYRO_FILTER,40  # 4 inch props\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("00_default.param"),
        "ATC_RAT_PIT_P,0.135\nATC_RAT_RLL_P,0.135\nGPS_TYPE,1\n",
    )
    .unwrap();
    dir
}

#[test]
fn test_full_cycle_over_parameter_list() {
    let time = MockTime::new();
    let mut fc = controller(&time);
    fc.set_file_transfer(false);
    let dir = vehicle_dir();

    let settings = Settings::default();
    let client = ProtocolClient::new(fc, time.clone(), ClientConfig::from(&settings));
    let mut engine = ConfigurationStepEngine::new(
        client,
        VehicleDirectory::open(dir.path()).unwrap(),
        Box::new(HeadlessOperator::new(true)),
        Arc::new(PluginRegistry::new()),
        &settings,
    );

    let mut last_progress = (0, 0);
    let count = engine
        .download_fc_parameters(&mut |current, total| last_progress = (current, total))
        .unwrap();
    assert_eq!(count, 6);
    assert_eq!(last_progress, (6, 6));
    // No packed file: defaults come from the vehicle directory
    assert_eq!(engine.fc_defaults().value("GPS_TYPE"), Some(1.0));

    assert_eq!(engine.resume_step().unwrap().as_deref(), Some("01_gps.param"));
    let selected = engine.parameters_to_upload();
    assert_eq!(selected, ["BRD_BOOT_DELAY", "GPS_TYPE"]);

    let slept_before = time.slept_us();
    let report = engine.upload(&selected, &mut |_, _| {}).unwrap();
    assert!(report.is_success(), "{:?}", report);
    // GPS_TYPE matches the _TYPE suffix; the headless operator agrees to reset
    assert_eq!(report.reset_requirement, ResetRequirement::Possible);
    assert!(report.reset_performed);
    assert_eq!(engine.client().transport().reboot_count(), 1);
    // Boot delay from the step file: ceil(2500 / 1000 + 1) seconds
    assert_eq!(time.slept_us() - slept_before, 4_000_000);
    assert_eq!(engine.client().transport().parameter("GPS_TYPE"), Some(2.0));
    assert_eq!(engine.vehicle().last_uploaded().as_deref(), Some("01_gps.param"));

    assert_eq!(engine.resume_step().unwrap().as_deref(), Some("02_filter.param"));
    engine.set_new_value("INS_GYRO_FILTER", 45.0).unwrap();
    assert_eq!(engine.state(), WorkflowState::Editing);
    let report = engine
        .upload(&["INS_GYRO_FILTER".to_string()], &mut |_, _| {})
        .unwrap();
    // The headless operator saved the edit before uploading
    assert!(report.is_success());
    assert_eq!(engine.state(), WorkflowState::StepLoaded);
    let saved = engine.vehicle().read_params("02_filter.param").unwrap();
    assert_eq!(saved.value("INS_GYRO_FILTER"), Some(45.0));
    assert_eq!(engine.client().transport().parameter("INS_GYRO_FILTER"), Some(45.0));

    assert_eq!(engine.next_step().unwrap(), None);
    assert_eq!(engine.state(), WorkflowState::Completed);

    let report_path = engine.vehicle().write_tuning_report().unwrap();
    let report = fs::read_to_string(report_path).unwrap();
    assert!(report.starts_with("param,"));
    assert!(report.contains("INS_GYRO_FILTER"));
}

#[test]
fn test_lossy_list_keeps_partial_result() {
    let time = MockTime::new();
    let mut fc = SimulatedFlightController::new(time.clone());
    for i in 0..50 {
        fc.add_parameter(&format!("SR0_P{:02}", i), i as f64, 0.0).unwrap();
    }
    fc.set_file_transfer(false);
    fc.set_packet_loss(0.3, 7).unwrap();

    let mut client = ProtocolClient::new(fc, time.clone(), ClientConfig::default());
    let (values, defaults) = client.download_all(true, &mut |_, _| {}).unwrap();
    assert!(!values.is_empty());
    assert!(values.len() < 50);
    assert!(defaults.is_empty());
    for (name, record) in values.iter() {
        let index: f64 = name[5..].parse().unwrap();
        assert_eq!(record.value, index);
    }
}

#[test]
fn test_bulk_download_reads_values_and_defaults() {
    let time = MockTime::new();
    let fc = controller(&time);
    let mut client = ProtocolClient::new(fc, time.clone(), ClientConfig::default());

    let (values, defaults) = client.download_all(true, &mut |_, _| {}).unwrap();
    assert_eq!(values.len(), 6);
    assert_eq!(defaults.len(), 6);
    // Values travel as f32
    let tolerance = Tolerance::default();
    assert!(tolerance.is_within(values.value("MOT_THST_HOVER").unwrap(), 0.35));
    assert!(tolerance.is_within(defaults.value("ATC_RAT_PIT_P").unwrap(), 0.135));
    assert_eq!(client.transport().sent_sets().len(), 0);
    assert_eq!(client.cache().len(), 6);
}

#[test]
fn test_fetch_after_set() {
    let time = MockTime::new();
    let fc = controller(&time);
    let mut client = ProtocolClient::new(fc, time.clone(), ClientConfig::default());

    client.set("GPS_TYPE", 5.0).unwrap();
    let value = client
        .fetch("GPS_TYPE", std::time::Duration::from_secs(1))
        .unwrap();
    assert_eq!(value, 5.0);
    assert_eq!(client.get("GPS_TYPE"), Some(5.0));
}

#[test]
fn test_fetch_after_two_sets_returns_latest_value() {
    let time = MockTime::new();
    let fc = controller(&time);
    let mut client = ProtocolClient::new(fc, time.clone(), ClientConfig::default());

    client.set("GPS_TYPE", 5.0).unwrap();
    client.set("GPS_TYPE", 7.0).unwrap();
    let value = client
        .fetch("GPS_TYPE", std::time::Duration::from_secs(1))
        .unwrap();
    assert_eq!(value, 7.0);
    assert_eq!(client.get("GPS_TYPE"), Some(7.0));
}

#[test]
fn test_empty_vehicle_directory_completes() {
    let time = MockTime::new();
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::default();
    let client = ProtocolClient::new(
        controller(&time),
        time.clone(),
        ClientConfig::from(&settings),
    );
    let mut engine = ConfigurationStepEngine::new(
        client,
        VehicleDirectory::open(dir.path()).unwrap(),
        Box::new(HeadlessOperator::new(true)),
        Arc::new(PluginRegistry::new()),
        &settings,
    );

    assert_eq!(engine.state(), WorkflowState::Idle);
    assert_eq!(engine.next_step().unwrap(), None);
    assert_eq!(engine.state(), WorkflowState::Completed);
    assert_eq!(engine.current_file(), None);
}
