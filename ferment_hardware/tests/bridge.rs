use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ferment_hardware::{Backend, BridgeConfig, DomainMode, HardwareBridge, SimReason};
use ferment_traits::{ActuatorBus, AnalogAddr, AnalogBus, BoxError, TemperatureBus};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

struct ScriptedProbes {
    replies: VecDeque<Result<f32, String>>,
}

impl TemperatureBus for ScriptedProbes {
    fn probe_count(&self) -> usize {
        1
    }

    fn probe_labels(&self) -> Vec<String> {
        vec!["28-test".into()]
    }

    fn read_celsius(&mut self, _index: usize, _timeout: Duration) -> Result<f32, BoxError> {
        match self.replies.pop_front() {
            Some(Ok(t)) => Ok(t),
            Some(Err(e)) => Err(e.into()),
            None => Err("exhausted".into()),
        }
    }
}

/// Probe 0 always reads; probe 1 reads only while `healthy` is set.
struct TwoProbes {
    healthy: Arc<AtomicBool>,
}

impl TemperatureBus for TwoProbes {
    fn probe_count(&self) -> usize {
        2
    }

    fn read_celsius(&mut self, index: usize, _timeout: Duration) -> Result<f32, BoxError> {
        match index {
            0 => Ok(19.0),
            _ if self.healthy.load(Ordering::SeqCst) => Ok(21.0),
            _ => Err("bad crc".into()),
        }
    }
}

struct WarnCounter(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[derive(Default, Clone)]
struct ActuatorLog {
    calls: Arc<Mutex<Vec<String>>>,
    releases: Arc<AtomicUsize>,
}

struct FakeActuators {
    log: ActuatorLog,
    fail_on: Option<&'static str>,
}

impl FakeActuators {
    fn record(&mut self, call: String, op: &str) -> Result<(), BoxError> {
        if self.fail_on == Some(op) {
            return Err(format!("{op} failed").into());
        }
        self.log.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl ActuatorBus for FakeActuators {
    fn setup_relay(&mut self, pin: u8) -> Result<(), BoxError> {
        self.record(format!("setup_relay {pin}"), "setup_relay")
    }
    fn set_relay(&mut self, pin: u8, on: bool) -> Result<(), BoxError> {
        self.record(format!("relay {pin} {on}"), "set_relay")
    }
    fn setup_pump(&mut self, name: &str, pul: u8, dir: u8) -> Result<(), BoxError> {
        self.record(format!("setup_pump {name} {pul} {dir}"), "setup_pump")
    }
    fn start_pump(&mut self, name: &str, hz: f32) -> Result<(), BoxError> {
        self.record(format!("start {name} {hz}"), "start_pump")
    }
    fn stop_pump(&mut self, name: &str) -> Result<(), BoxError> {
        self.record(format!("stop {name}"), "stop_pump")
    }
    fn release(&mut self) -> Result<(), BoxError> {
        self.log.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeAnalog {
    releases: Arc<AtomicUsize>,
    volts: f32,
}

impl AnalogBus for FakeAnalog {
    fn probe(&mut self, addr: AnalogAddr) -> Result<(), BoxError> {
        if addr.channel == 3 {
            return Err("no ack on channel 3".into());
        }
        Ok(())
    }
    fn read_voltage(&mut self, _addr: AnalogAddr, _timeout: Duration) -> Result<f32, BoxError> {
        Ok(self.volts)
    }
    fn release(&mut self) -> Result<(), BoxError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn cfg() -> BridgeConfig {
    BridgeConfig {
        seed: Some(11),
        ..BridgeConfig::default()
    }
}

fn addr(channel: u8) -> AnalogAddr {
    AnalogAddr {
        address: 0x48,
        channel,
        gain: 1,
    }
}

fn sim_actuators() -> Backend<Box<dyn ActuatorBus>> {
    Backend::Simulated(SimReason::Forced)
}

#[test]
fn temperature_falls_back_and_recovers() {
    let probes = ScriptedProbes {
        replies: VecDeque::from(vec![
            Ok(18.5),
            Err("bad crc".into()),
            Err("bad crc".into()),
            Ok(19.0),
        ]),
    };
    let mut bridge = HardwareBridge::from_parts(
        cfg(),
        Backend::Real(Box::new(probes)),
        sim_actuators(),
        None,
    );
    assert!(!bridge.temperature_simulated());
    assert_eq!(bridge.read_temperature(0), 18.5);
    assert_eq!(bridge.read_temperature(0), 20.0);
    assert_eq!(bridge.read_temperature(0), 20.0);
    assert_eq!(bridge.read_temperature(0), 19.0);
    assert_eq!(bridge.status().probes, vec!["28-test".to_string()]);
}

#[test]
fn failing_probe_warns_once_while_another_probe_reads() {
    let healthy = Arc::new(AtomicBool::new(false));
    let probes = TwoProbes {
        healthy: healthy.clone(),
    };
    let mut bridge = HardwareBridge::from_parts(
        cfg(),
        Backend::Real(Box::new(probes)),
        sim_actuators(),
        None,
    );
    let warnings = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(WarnCounter(warnings.clone()));
    tracing::subscriber::with_default(subscriber, || {
        for _ in 0..10 {
            assert_eq!(bridge.read_temperature(0), 19.0);
            assert_eq!(bridge.read_temperature(1), 20.0);
        }
        assert_eq!(warnings.load(Ordering::SeqCst), 1);

        healthy.store(true, Ordering::SeqCst);
        assert_eq!(bridge.read_temperature(1), 21.0);
        healthy.store(false, Ordering::SeqCst);
        for _ in 0..3 {
            assert_eq!(bridge.read_temperature(1), 20.0);
            assert_eq!(bridge.read_temperature(0), 19.0);
        }
    });
    assert_eq!(warnings.load(Ordering::SeqCst), 2);
}

#[test]
fn simulated_temperature_is_plausible() {
    let mut bridge = HardwareBridge::from_parts(
        cfg(),
        Backend::Simulated(SimReason::Forced),
        sim_actuators(),
        None,
    );
    for _ in 0..100 {
        let t = bridge.read_temperature(1);
        assert!((18.4..=21.6).contains(&t), "t={t}");
    }
}

#[test]
fn actuator_fault_demotes_domain_permanently() {
    let log = ActuatorLog::default();
    let act = FakeActuators {
        log: log.clone(),
        fail_on: Some("start_pump"),
    };
    let mut bridge = HardwareBridge::from_parts(
        cfg(),
        Backend::Simulated(SimReason::Forced),
        Backend::Real(Box::new(act)),
        None,
    );
    assert!(bridge.setup_relay(7));
    assert!(bridge.set_relay(7, true));
    assert!(!bridge.start_pump("F1", 8000.0));
    assert!(bridge.actuators_simulated());
    assert_eq!(log.releases.load(Ordering::SeqCst), 1);
    // later calls are no-ops that succeed
    assert!(bridge.set_relay(7, false));
    assert_eq!(
        *log.calls.lock().unwrap(),
        vec!["setup_relay 7".to_string(), "relay 7 true".to_string()]
    );
    match bridge.status().actuators {
        DomainMode::Simulated {
            reason: SimReason::Fallback(cause),
        } => assert!(cause.contains("start_pump failed")),
        other => panic!("unexpected mode {other:?}"),
    }
}

#[test]
fn analog_bus_opens_lazily_and_releases_once() {
    let opened = Arc::new(AtomicUsize::new(0));
    let releases = Arc::new(AtomicUsize::new(0));
    let (o, r) = (opened.clone(), releases.clone());
    let opener = Box::new(move || -> Result<Box<dyn AnalogBus>, BoxError> {
        o.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeAnalog {
            releases: r.clone(),
            volts: 1.47,
        }))
    });
    let mut bridge = HardwareBridge::from_parts(
        cfg(),
        Backend::Simulated(SimReason::Forced),
        sim_actuators(),
        Some(opener),
    );
    assert_eq!(opened.load(Ordering::SeqCst), 0);
    let now = Instant::now();
    let a = bridge.add_flow_channel("F1", addr(1), now);
    let b = bridge.add_flow_channel("F3", addr(3), now);
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert!(!bridge.flow_channel_simulated(a));
    assert!(bridge.flow_channel_simulated(b));
    let v = bridge.read_flow_voltage(a, now).unwrap();
    assert!((v - 1.47).abs() < 1e-6);

    bridge.release_all();
    bridge.release_all();
    drop(bridge);
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

#[test]
fn released_actuators_report_release_not_fallback() {
    let log = ActuatorLog::default();
    let act = FakeActuators {
        log: log.clone(),
        fail_on: None,
    };
    let mut bridge = HardwareBridge::from_parts(
        cfg(),
        Backend::Simulated(SimReason::Forced),
        Backend::Real(Box::new(act)),
        None,
    );
    assert_eq!(bridge.status().actuators, DomainMode::Real);
    bridge.release_all();
    let mode = bridge.status().actuators;
    assert_eq!(
        mode,
        DomainMode::Simulated {
            reason: SimReason::Released
        }
    );
    assert!(!mode.to_string().contains("fallback"));
    assert!(bridge.set_relay(7, true));
    assert_eq!(log.releases.load(Ordering::SeqCst), 1);
    assert!(log.calls.lock().unwrap().is_empty());
}

#[test]
fn failed_bus_open_simulates_every_channel() {
    let opener = Box::new(|| -> Result<Box<dyn AnalogBus>, BoxError> { Err("no /dev/i2c-1".into()) });
    let mut bridge = HardwareBridge::from_parts(
        cfg(),
        Backend::Simulated(SimReason::Forced),
        sim_actuators(),
        Some(opener),
    );
    let now = Instant::now();
    let a = bridge.add_flow_channel("F1", addr(1), now);
    assert!(bridge.flow_channel_simulated(a));
    let status = bridge.status();
    assert!(status.any_simulated());
    match &status.flow[0].mode {
        DomainMode::Simulated {
            reason: SimReason::Fallback(cause),
        } => assert!(cause.contains("/dev/i2c-1")),
        other => panic!("unexpected mode {other:?}"),
    }
    let v = bridge.read_flow_voltage(a, now + Duration::from_secs(3600)).unwrap();
    assert!((0.588..=2.941).contains(&v));
}

#[test]
fn forced_simulation_reports_forced_everywhere() {
    let mut bridge = HardwareBridge::init(BridgeConfig {
        force_sim: true,
        ..cfg()
    });
    bridge.add_flow_channel("F1", addr(0), Instant::now());
    let status = bridge.status();
    let forced = DomainMode::Simulated {
        reason: SimReason::Forced,
    };
    assert_eq!(status.temperature, forced);
    assert_eq!(status.actuators, forced);
    assert_eq!(status.flow[0].mode, forced);
    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["temperature"]["mode"], "simulated");
    assert_eq!(json["temperature"]["reason"]["kind"], "forced");
}

#[test]
fn unknown_flow_channel_is_an_error() {
    let mut bridge = HardwareBridge::from_parts(
        cfg(),
        Backend::Simulated(SimReason::Forced),
        sim_actuators(),
        None,
    );
    assert!(bridge.read_flow_voltage(9, Instant::now()).is_err());
}
