use chrono::NaiveDate;
use ferment_core::linearize::FlowStatus;
use ferment_core::{FlowSample, LogState, Snapshot, ThermalOutput, VesselSnapshot};
use ferment_hardware::{DomainMode, FlowChannelStatus, HardwareStatus, SimReason};
use ferment_ui::render_panel;

fn vessel(name: &str) -> VesselSnapshot {
    VesselSnapshot {
        name: name.into(),
        temperature: 19.876,
        setpoint: 20.0,
        band: 0.5,
        output: ThermalOutput::Hot,
        manual: false,
        pump_running: false,
        manual_pump: false,
        dosing_remaining_s: 0.0,
        pump_frequency_hz: 8000.0,
        flow: None,
        flow_stats: None,
        flow_error: None,
        flow_period_s: 10.0,
        flow_due_in_s: 4.0,
        instrument_log: LogState::Running,
        flow_log: LogState::Stopped,
    }
}

fn snapshot() -> Snapshot {
    let ts = NaiveDate::from_ymd_opt(2025, 6, 10)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap();
    let mut f1 = vessel("F1");
    f1.pump_running = true;
    f1.dosing_remaining_s = 12.4;
    f1.flow = Some(FlowSample {
        timestamp: ts,
        flow: 25.0,
        rate: 0.589,
        current_ma: 12.0,
        voltage: 1.764,
        status: FlowStatus::Ok,
    });
    let mut f2 = vessel("F2");
    f2.manual = true;
    f2.output = ThermalOutput::Rest;
    f2.flow_error = Some("timeout waiting for sensor".into());
    Snapshot {
        taken_at: ts,
        tick: 42,
        vessels: vec![f1, f2],
        hardware: HardwareStatus {
            temperature: DomainMode::Real,
            actuators: DomainMode::Simulated {
                reason: SimReason::Forced,
            },
            flow: vec![FlowChannelStatus {
                name: "F2".into(),
                address: 0x48,
                channel: 2,
                gain: 1,
                mode: DomainMode::Simulated {
                    reason: SimReason::Fallback("no ack".into()),
                },
            }],
            probes: vec![],
        },
        last_rejection: Some("F1: manual mode is off; enable it before forcing outputs".into()),
        last_log_error: None,
    }
}

#[test]
fn panel_lists_every_vessel() {
    let text = render_panel(&snapshot());
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("tick 42  2025-06-10 09:00:00"));
    assert!(lines[0].contains("actuators: SIMULATOR (forced by environment)"));
    assert!(lines[1].starts_with("VESSEL"));

    let f1 = lines.iter().find(|l| l.starts_with("F1 ")).unwrap();
    assert!(f1.contains("19.88"));
    assert!(f1.contains("HOT"));
    assert!(f1.contains("on 13s"));
    assert!(f1.contains("25.00"));
    assert!(f1.contains("OK"));

    let f2 = lines.iter().find(|l| l.starts_with("F2 ")).unwrap();
    assert!(f2.contains("manual"));
    assert!(f2.contains("ERR timeout"));
}

#[test]
fn panel_reports_fallbacks_and_rejections() {
    let text = render_panel(&snapshot());
    assert!(text.contains("flow F2: SIMULATOR (fallback to simulator: no ack)"));
    assert!(text.contains("rejected: F1: manual mode is off"));
    assert!(!text.contains("log error"));
}
