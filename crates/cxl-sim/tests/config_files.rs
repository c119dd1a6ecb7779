//! Configuration file loading and the applied-knob record.

use cxl_sim::{SchedulerKind, SimConfig};

#[test]
fn json_file_overrides_and_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("knobs.json");
    std::fs::write(
        &path,
        r#"{
            "pcie_lanes": 16,
            "pcie_max_flit_wait_cycle": 0,
            "ndp_scheduler": "out_of_order",
            "ndp_ports": { "idiv": { "count": 2, "latency": 8 } }
        }"#,
    )
    .unwrap();

    let config = SimConfig::from_file(&path).unwrap();
    config.validate().unwrap();
    assert_eq!(config.pcie_lanes, 16);
    assert_eq!(config.ndp_scheduler, SchedulerKind::OutOfOrder);
    assert_eq!(config.ndp_ports.idiv.count, 2);
    assert_eq!(config.ndp_ports.idiv.latency, 8);
    // Untouched knobs keep their defaults.
    assert_eq!(config.pcie_flit_bits, 544);
    assert_eq!(config.ndp_ports.iadd.count, 2);

    // The applied record reloads to an identical configuration.
    let written = config.write_applied(dir.path()).unwrap();
    assert_eq!(written, dir.path().join("cxl_params.json"));
    let reloaded = SimConfig::from_file(&written).unwrap();
    assert_eq!(reloaded.pcie_lanes, 16);
    assert_eq!(reloaded.ndp_scheduler, SchedulerKind::OutOfOrder);
    assert_eq!(reloaded.ndp_ports.idiv.latency, 8);
}

#[test]
fn missing_config_file_is_an_error() {
    assert!(SimConfig::from_file(std::path::Path::new("/no/such/file.json")).is_err());
}
