//! DS18B20 probes through the Linux 1-Wire sysfs interface.
//!
//! Each probe appears as `<root>/28-xxxxxxxxxxxx/w1_slave` with two lines:
//! the first ends in `YES` when the CRC matched, the second carries the
//! reading in millidegrees as `t=21437`.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel as xch;
use ferment_traits::{BoxError, TemperatureBus};
use tracing::debug;

use crate::error::{HwError, Result};

/// Family code prefix of DS18B20 devices.
const DS18B20_PREFIX: &str = "28-";

/// List DS18B20 device directories under `root`, sorted by name.
pub fn discover(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(DS18B20_PREFIX) {
            out.push(entry.path());
        }
    }
    out.sort();
    Ok(out)
}

/// Parse the contents of a `w1_slave` file into degrees Celsius.
pub fn parse_w1_slave(text: &str) -> Result<f32> {
    let mut lines = text.lines();
    let crc_line = lines
        .next()
        .ok_or_else(|| HwError::Packet("empty packet".into()))?;
    let data_line = lines
        .next()
        .ok_or_else(|| HwError::Packet("missing data line".into()))?;
    if !crc_line.trim_end().ends_with("YES") {
        return Err(HwError::Packet("invalid CRC".into()));
    }
    let raw = data_line
        .rsplit("t=")
        .next()
        .filter(|_| data_line.contains("t="))
        .ok_or_else(|| HwError::Packet("missing t= payload".into()))?
        .trim();
    let milli: i32 = raw
        .parse()
        .map_err(|_| HwError::Packet(format!("unparsable payload {raw:?}")))?;
    Ok(milli as f32 / 1000.0)
}

type PacketReader = Arc<dyn Fn(&Path) -> io::Result<String> + Send + Sync>;

/// Probe set discovered at startup.
///
/// A sysfs read blocks for the whole conversion (about 750 ms per probe), so
/// each read runs on a worker thread and is waited on for at most the
/// caller's timeout. A probe has at most one read in flight; a late result
/// is picked up by the next call for that probe, which starts the next
/// conversion.
pub struct W1Probes {
    devices: Vec<PathBuf>,
    pending: Vec<Option<xch::Receiver<io::Result<String>>>>,
    reader: PacketReader,
}

impl W1Probes {
    /// Discover probes under `root`; fails when none are present.
    pub fn open(root: &Path) -> Result<Self> {
        let devices = discover(root)?;
        if devices.is_empty() {
            return Err(HwError::NoDevice(format!(
                "no DS18B20 probes under {}",
                root.display()
            )));
        }
        debug!(count = devices.len(), "ds18b20 probes discovered");
        Ok(Self::with_reader(devices, Arc::new(|p: &Path| fs::read_to_string(p))))
    }

    fn with_reader(devices: Vec<PathBuf>, reader: PacketReader) -> Self {
        Self {
            pending: devices.iter().map(|_| None).collect(),
            devices,
            reader,
        }
    }

    /// Slot for `index`; indices past the last probe share the last probe.
    fn slot(&self, index: usize) -> usize {
        index.min(self.devices.len().saturating_sub(1))
    }

    fn spawn_read(&self, slot: usize) -> Result<xch::Receiver<io::Result<String>>> {
        let (tx, rx) = xch::bounded(1);
        let path = self.devices[slot].join("w1_slave");
        let reader = Arc::clone(&self.reader);
        std::thread::Builder::new()
            .name(format!("w1-probe-{slot}"))
            .spawn(move || {
                // receiver may be gone after shutdown
                let _ = tx.send(reader(&path));
            })?;
        Ok(rx)
    }
}

impl TemperatureBus for W1Probes {
    fn probe_count(&self) -> usize {
        self.devices.len()
    }

    fn probe_labels(&self) -> Vec<String> {
        self.devices
            .iter()
            .map(|p| p.display().to_string())
            .collect()
    }

    fn read_celsius(&mut self, index: usize, timeout: Duration) -> std::result::Result<f32, BoxError> {
        if self.devices.is_empty() {
            return Err(HwError::NoDevice(format!("probe index {index}")).into());
        }
        let slot = self.slot(index);
        let rx = match self.pending[slot].take() {
            Some(rx) => rx,
            None => self.spawn_read(slot)?,
        };
        match rx.recv_timeout(timeout) {
            Ok(text) => {
                // keep a conversion running so the next tick finds a fresh packet
                self.pending[slot] = self.spawn_read(slot).ok();
                Ok(parse_w1_slave(&text?)?)
            }
            Err(xch::RecvTimeoutError::Timeout) => {
                self.pending[slot] = Some(rx);
                Err(HwError::Timeout.into())
            }
            Err(xch::RecvTimeoutError::Disconnected) => {
                Err(HwError::NoDevice(format!("probe reader {slot} exited")).into())
            }
        }
    }
}
