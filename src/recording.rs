//! Recorded accel/gyro streams and a device that plays them back.

use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::DeviceError;
use crate::sensors::ImuDevice;
use crate::types::{ImuFrame, Vec3};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SensorTrack {
    pub name: String,
    pub frames: Vec<ImuFrame>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Recording {
    /// RFC 3339
    #[serde(default)]
    pub recorded_at: Option<String>,
    pub sensors: Vec<SensorTrack>,
}

fn is_gz(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

impl Recording {
    /// Reads `frames` accel/gyro pairs from every device.
    pub fn capture(devices: &mut [Box<dyn ImuDevice>], frames: usize) -> Result<Self, DeviceError> {
        let mut sensors = Vec::with_capacity(devices.len());
        for dev in devices.iter_mut() {
            let mut track = SensorTrack {
                name: dev.name().to_string(),
                frames: Vec::with_capacity(frames),
            };
            for _ in 0..frames {
                let accel = dev.read_accel()?;
                let gyro = dev.read_gyro_raw()?;
                track.frames.push(ImuFrame::new(accel, gyro));
            }
            sensors.push(track);
        }
        Ok(Self {
            recorded_at: Some(Utc::now().to_rfc3339()),
            sensors,
        })
    }

    /// Loads `*.json` or gzip-compressed `*.json.gz`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)?;
        if is_gz(path) {
            let reader = BufReader::new(GzDecoder::new(file));
            Ok(serde_json::from_reader(reader)?)
        } else {
            let reader = BufReader::new(file);
            Ok(serde_json::from_reader(reader)?)
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let file = File::create(path)?;
        if is_gz(path) {
            let mut encoder = GzEncoder::new(file, Compression::default());
            serde_json::to_writer(&mut encoder, self)?;
            encoder.finish()?;
        } else {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }
        Ok(())
    }

    /// One playback device per track, all sharing an exhaustion flag.
    pub fn devices(&self) -> (Vec<ReplayImu>, Arc<AtomicBool>) {
        let exhausted = Arc::new(AtomicBool::new(false));
        let devices = self
            .sensors
            .iter()
            .map(|t| ReplayImu {
                name: t.name.clone(),
                frames: t.frames.clone(),
                accel_cursor: 0,
                gyro_cursor: 0,
                exhausted: exhausted.clone(),
            })
            .collect();
        (devices, exhausted)
    }
}

/// Plays one recorded track. Accel and gyro advance independently; running
/// off either end reports `Disconnected` and raises the shared flag.
pub struct ReplayImu {
    name: String,
    frames: Vec<ImuFrame>,
    accel_cursor: usize,
    gyro_cursor: usize,
    exhausted: Arc<AtomicBool>,
}

impl ReplayImu {
    fn next(&mut self, gyro: bool) -> Result<Vec3, DeviceError> {
        let cursor = if gyro {
            &mut self.gyro_cursor
        } else {
            &mut self.accel_cursor
        };
        match self.frames.get(*cursor) {
            Some(f) => {
                *cursor += 1;
                Ok(if gyro { f.gyro_vec() } else { f.accel_vec() })
            }
            None => {
                self.exhausted.store(true, Ordering::Relaxed);
                Err(DeviceError::Disconnected)
            }
        }
    }
}

impl ImuDevice for ReplayImu {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_accel(&mut self) -> Result<Vec3, DeviceError> {
        self.next(false)
    }

    fn read_gyro_raw(&mut self) -> Result<Vec3, DeviceError> {
        self.next(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::{MotionProfile, SimulatedImu};

    fn recording(frames: usize) -> Recording {
        let mut devices: Vec<Box<dyn ImuDevice>> = vec![
            Box::new(SimulatedImu::new("neck", MotionProfile::default())),
            Box::new(SimulatedImu::new("lower", MotionProfile::default())),
        ];
        Recording::capture(&mut devices, frames).unwrap()
    }

    #[test]
    fn test_capture_shape() {
        let rec = recording(7);
        assert_eq!(rec.sensors.len(), 2);
        assert_eq!(rec.sensors[1].name, "lower");
        assert!(rec.sensors.iter().all(|t| t.frames.len() == 7));
    }

    #[test]
    fn test_playback_and_exhaustion() {
        let rec = recording(2);
        let (mut devices, exhausted) = rec.devices();
        let dev = &mut devices[0];

        assert_eq!(dev.read_accel().unwrap(), rec.sensors[0].frames[0].accel_vec());
        assert_eq!(dev.read_accel().unwrap(), rec.sensors[0].frames[1].accel_vec());
        // gyro has its own cursor
        assert_eq!(dev.read_gyro_raw().unwrap(), rec.sensors[0].frames[0].gyro_vec());
        assert!(!exhausted.load(Ordering::Relaxed));

        assert_eq!(dev.read_accel(), Err(DeviceError::Disconnected));
        assert!(exhausted.load(Ordering::Relaxed));
    }

    #[test]
    fn test_replay_through_controller() {
        use crate::classifier::ClassifierKind;
        use crate::config::MonitorConfig;
        use crate::controller::Controller;
        use crate::imu::Imu;
        use crate::indicator::LogIndicator;
        use crate::report::Reporter;

        let rec = recording(300);
        let (devices, exhausted) = rec.devices();
        let sensors: Vec<Imu> = devices.into_iter().map(|d| Imu::new(Box::new(d))).collect();

        let mut config = MonitorConfig::default();
        config.sensors = rec.sensors.iter().map(|t| t.name.clone()).collect();
        config.classifier = ClassifierKind::Ridge;
        config.ridge.model.terms.truncate(2);
        config.ridge.period_ms = 0;
        config.calibration.startup_iterations = 20;

        let mut c = Controller::new(config, sensors, Reporter::sink(), Box::new(LogIndicator::default())).unwrap();
        c.start().unwrap();
        c.sender().notify(b'P');

        let mut steps = 0;
        while !exhausted.load(Ordering::Relaxed) && steps < 1000 {
            c.step();
            steps += 1;
        }
        assert!(exhausted.load(Ordering::Relaxed));
        // gyro runs out first: 40 reads for calibration, one per tick after
        assert_eq!(c.stats().ticks, 260);
        assert_eq!(c.stats().skipped_ticks, 1);
    }

    #[test]
    fn test_gz_file_roundtrip() {
        let rec = recording(3);
        let path = std::env::temp_dir().join(format!("posture_rec_{}.json.gz", std::process::id()));
        rec.save(&path).unwrap();
        let loaded = Recording::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.sensors[0].frames, rec.sensors[0].frames);
        assert_eq!(loaded.recorded_at, rec.recorded_at);
    }
}
