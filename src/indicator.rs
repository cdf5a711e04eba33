use log::{error, info};

/// Status LED / health indicator on the device.
pub trait Indicator: Send {
    fn set_power(&mut self, on: bool);

    /// A sensor stopped answering. Called once per fault episode.
    fn signal_fault(&mut self, sensor: &str);
}

/// Indicator for hosts without one: state changes go to the log.
#[derive(Debug, Default)]
pub struct LogIndicator {
    on: bool,
}

impl LogIndicator {
    pub fn is_on(&self) -> bool {
        self.on
    }
}

impl Indicator for LogIndicator {
    fn set_power(&mut self, on: bool) {
        self.on = on;
        info!("indicator {}", if on { "on" } else { "off" });
    }

    fn signal_fault(&mut self, sensor: &str) {
        error!("indicator: fault on sensor {}", sensor);
    }
}
