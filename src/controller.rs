//! The control loop.
//!
//! One [`Controller`] owns the sensors, the consumer end of the request queue,
//! the periodic functions and the posture flag. Each [`Controller::step`]
//! drains pending requests in arrival order and then gives every enabled
//! periodic function whose period has elapsed exactly one tick.

use log::{debug, error, info, warn};
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::classifier::{
    ClassifierKind, PostureClassifier, RidgeClassifier, SpineClassifier, ThresholdClassifier,
    TickContext, Verdict,
};
use crate::command::{Command, LoopSignal};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::health_monitor::HealthMonitor;
use crate::imu::Imu;
use crate::indicator::Indicator;
use crate::queue::{RequestQueue, RequestSender};
use crate::report::Reporter;
use crate::telemetry::TelemetryStream;

/// Acknowledgement written after every sensor calibrated.
const CALIBRATION_ACK: char = 'C';
const CALIBRATION_ACK_COUNT: usize = 5;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ControllerStats {
    pub commands: u64,
    pub calibrations: u64,
    pub failed_calibrations: u64,
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub good_verdicts: u64,
    pub bad_verdicts: u64,
    pub telemetry_lines: u64,
}

enum PeriodicFunction {
    Classifier(PostureClassifier),
    Telemetry(TelemetryStream),
}

struct Registration {
    function: PeriodicFunction,
    enabled: bool,
    period: Duration,
    last_run: Option<Instant>,
}

impl Registration {
    fn new(function: PeriodicFunction, enabled: bool, period_ms: u64) -> Self {
        Self {
            function,
            enabled,
            period: Duration::from_millis(period_ms),
            last_run: None,
        }
    }

    fn due(&self, now: Instant) -> bool {
        self.enabled
            && self
                .last_run
                .map_or(true, |t| now.duration_since(t) >= self.period)
    }
}

pub struct Controller {
    config: MonitorConfig,
    sensors: Vec<Imu>,
    queue: RequestQueue,
    registrations: Vec<Registration>,
    posture_enabled: bool,
    power_on: bool,
    link: Reporter,
    indicator: Box<dyn Indicator>,
    health: HealthMonitor,
    stats: ControllerStats,
}

fn build_classifier(config: &MonitorConfig, sensor_count: usize) -> MonitorResult<PostureClassifier> {
    Ok(match config.classifier {
        ClassifierKind::Threshold => {
            PostureClassifier::Threshold(ThresholdClassifier::new(&config.threshold, sensor_count)?)
        }
        ClassifierKind::Ridge => PostureClassifier::Ridge(RidgeClassifier::new(&config.ridge, sensor_count)?),
        ClassifierKind::Spine => PostureClassifier::Spine(SpineClassifier::new(&config.spine, sensor_count)?),
    })
}

impl Controller {
    pub fn new(
        config: MonitorConfig,
        sensors: Vec<Imu>,
        link: Reporter,
        indicator: Box<dyn Indicator>,
    ) -> MonitorResult<Self> {
        config.validate()?;
        if sensors.is_empty() {
            return Err(MonitorError::Config("controller needs at least one sensor".to_string()));
        }

        let queue = RequestQueue::bounded(config.queue.capacity, config.queue.overflow)?;
        let classifier = build_classifier(&config, sensors.len())?;
        let registrations = vec![
            Registration::new(
                PeriodicFunction::Classifier(classifier),
                true,
                config.classifier_period_ms(),
            ),
            Registration::new(
                PeriodicFunction::Telemetry(TelemetryStream::new(&config.telemetry)),
                config.telemetry.enabled,
                config.telemetry.period_ms,
            ),
        ];
        let health = HealthMonitor::new(
            sensors.iter().map(|s| s.name()),
            config.health.failure_threshold,
        );

        info!(
            "controller: {} sensors, {} classifier, telemetry {}",
            sensors.len(),
            config.classifier,
            if config.telemetry.enabled { "on" } else { "off" }
        );

        Ok(Self {
            posture_enabled: config.posture_enabled,
            config,
            sensors,
            queue,
            registrations,
            power_on: false,
            link,
            indicator,
            health,
            stats: ControllerStats::default(),
        })
    }

    /// Producer handle for the input notification context.
    pub fn sender(&self) -> RequestSender {
        self.queue.sender()
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn sensors(&self) -> &[Imu] {
        &self.sensors
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    pub fn link(&self) -> &Reporter {
        &self.link
    }

    pub fn posture_enabled(&self) -> bool {
        self.posture_enabled
    }

    pub fn power_on(&self) -> bool {
        self.power_on
    }

    pub fn classifier_kind(&self) -> ClassifierKind {
        self.config.classifier
    }

    pub fn last_verdict(&self) -> Option<Verdict> {
        self.registrations.iter().find_map(|r| match &r.function {
            PeriodicFunction::Classifier(c) => c.last_verdict(),
            PeriodicFunction::Telemetry(_) => None,
        })
    }

    /// Power-up sequence: every sensor must answer, then all of them are
    /// calibrated with the startup iteration count.
    pub fn start(&mut self) -> MonitorResult<()> {
        let attempts = self.config.health.probe_attempts;
        let retry = Duration::from_millis(self.config.health.probe_retry_ms);

        for imu in &mut self.sensors {
            let mut answered = false;
            for attempt in 1..=attempts {
                match imu.read_accel() {
                    Ok(_) => {
                        answered = true;
                        break;
                    }
                    Err(e) => {
                        warn!("probe {}/{} failed: {}", attempt, attempts, e);
                        if attempt < attempts {
                            std::thread::sleep(retry);
                        }
                    }
                }
            }
            if !answered {
                self.indicator.signal_fault(imu.name());
                return Err(MonitorError::SensorUnavailable {
                    sensor: imu.name().to_string(),
                    attempts,
                });
            }
        }

        let iterations = self.config.calibration.startup_iterations;
        for imu in &mut self.sensors {
            if let Err(e) = imu.calibrate(iterations) {
                error!("startup calibration failed: {}", e);
                self.indicator.signal_fault(imu.name());
                return Err(e);
            }
        }
        info!("startup complete: {}", self.health.format_status());
        Ok(())
    }

    /// Runs one command handler.
    pub fn execute(&mut self, cmd: Command) -> LoopSignal {
        self.stats.commands += 1;
        debug!("executing {:?} ({:?})", cmd, cmd.byte() as char);

        match cmd {
            Command::PowerOn => self.set_power(true),
            Command::PowerOff => self.set_power(false),
            Command::PostureOn => {
                self.posture_enabled = true;
                info!("posture processing enabled");
            }
            Command::PostureOff => {
                self.posture_enabled = false;
                info!("posture processing disabled");
            }
            Command::Calibrate => self.calibrate_all(),
            Command::Exit => {
                info!("exit requested");
                return LoopSignal::Exit;
            }
        }
        LoopSignal::Continue
    }

    fn set_power(&mut self, on: bool) {
        if self.power_on == on {
            debug!("indicator already {}", if on { "on" } else { "off" });
            return;
        }
        self.power_on = on;
        self.indicator.set_power(on);
        info!("{}", if on { "On" } else { "Off" });
    }

    fn calibrate_all(&mut self) {
        info!("Calibration start");
        let iterations = self.config.calibration.iterations;
        let mut all_ok = true;

        for imu in &mut self.sensors {
            if let Err(e) = imu.calibrate(iterations) {
                error!("calibration failed: {}", e);
                self.health.record_failure(&e, self.indicator.as_mut());
                all_ok = false;
            }
        }

        if all_ok {
            self.stats.calibrations += 1;
            for _ in 0..CALIBRATION_ACK_COUNT {
                self.link.write_char(CALIBRATION_ACK);
            }
            info!("Calibration finished");
        } else {
            self.stats.failed_calibrations += 1;
        }

        // Next classifier tick reports and runs without waiting for its period.
        for r in &mut self.registrations {
            r.last_run = None;
            if let PeriodicFunction::Classifier(c) = &mut r.function {
                c.reset_reporting();
            }
        }
    }

    /// One loop iteration: drain requests, then tick every due function.
    pub fn step(&mut self) -> LoopSignal {
        self.step_inner().0
    }

    fn step_inner(&mut self) -> (LoopSignal, bool) {
        let mut worked = false;

        while let Some(cmd) = self.queue.pop() {
            worked = true;
            if self.execute(cmd) == LoopSignal::Exit {
                return (LoopSignal::Exit, true);
            }
        }

        let now = Instant::now();
        let terminator = self.config.report_terminator.as_str();
        for r in self.registrations.iter_mut().filter(|r| r.due(now)) {
            let before: Vec<u64> = self.sensors.iter().map(Imu::samples).collect();
            let mut ctx = TickContext {
                sensors: &mut self.sensors,
                link: &mut self.link,
                posture_enabled: self.posture_enabled,
                terminator,
            };
            let result = match &mut r.function {
                PeriodicFunction::Classifier(c) => c.tick(&mut ctx).map(|v| {
                    if let Some(v) = v {
                        match v {
                            Verdict::Good => self.stats.good_verdicts += 1,
                            Verdict::Bad => self.stats.bad_verdicts += 1,
                        }
                    }
                    v.is_some()
                }),
                PeriodicFunction::Telemetry(t) => t.tick(&mut ctx).map(|ran| {
                    if ran {
                        self.stats.telemetry_lines += 1;
                    }
                    ran
                }),
            };

            // Only sensors this tick actually sampled have answered.
            for (imu, n) in self.sensors.iter().zip(before) {
                if imu.samples() > n {
                    self.health.record_success(imu.name());
                }
            }

            match result {
                Ok(false) => {}
                Ok(true) => {
                    r.last_run = Some(now);
                    self.stats.ticks += 1;
                    worked = true;
                }
                Err(e) => {
                    r.last_run = Some(now);
                    self.stats.skipped_ticks += 1;
                    warn!("skipping tick: {}", e);
                    self.health.record_failure(&e, self.indicator.as_mut());
                    worked = true;
                }
            }
        }

        (LoopSignal::Continue, worked)
    }

    /// Steps until an exit request, sleeping briefly whenever a step found
    /// nothing to do.
    pub fn run(&mut self) {
        let idle = Duration::from_millis(self.config.idle_sleep_ms);
        info!("control loop running");
        loop {
            let (signal, worked) = self.step_inner();
            if signal == LoopSignal::Exit {
                break;
            }
            if !worked && !idle.is_zero() {
                std::thread::sleep(idle);
            }
        }
        info!(
            "control loop stopped: {} commands, {} ticks ({} skipped)",
            self.stats.commands, self.stats.ticks, self.stats.skipped_ticks
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::testing::{IndicatorEvent, RecordingIndicator};
    use crate::report::testing::SharedBuffer;
    use crate::sensors::testing::{ScriptHandle, ScriptedImu};
    use crate::types::Vec3;
    use std::io::Write;

    struct Rig {
        controller: Controller,
        handles: Vec<ScriptHandle>,
        out: SharedBuffer,
        indicator: RecordingIndicator,
    }

    fn test_config(kind: ClassifierKind) -> MonitorConfig {
        let mut config = MonitorConfig::default();
        config.classifier = kind;
        config.calibration.iterations = 5;
        config.calibration.startup_iterations = 5;
        config.threshold.period_ms = 0;
        config.ridge.period_ms = 0;
        config.spine.period_ms = 0;
        config.health.failure_threshold = 3;
        config.health.probe_retry_ms = 0;
        config.idle_sleep_ms = 0;
        config
    }

    fn rig_with(config: MonitorConfig) -> Rig {
        let (sensors, handles): (Vec<Imu>, Vec<ScriptHandle>) = (0..3)
            .map(|i| {
                let (dev, h) =
                    ScriptedImu::new(&format!("s{i}"), Vec3::new(0.0, 0.0, 1.0), Vec3::zeros());
                (Imu::new(Box::new(dev)), h)
            })
            .unzip();
        let out = SharedBuffer::default();
        let indicator = RecordingIndicator::default();
        let controller = Controller::new(
            config,
            sensors,
            Reporter::new(Box::new(out.clone())),
            Box::new(indicator.clone()),
        )
        .unwrap();
        Rig {
            controller,
            handles,
            out,
            indicator,
        }
    }

    fn started(kind: ClassifierKind) -> Rig {
        let mut rig = rig_with(test_config(kind));
        rig.controller.start().unwrap();
        rig
    }

    fn send(rig: &Rig, bytes: &[u8]) {
        let tx = rig.controller.sender();
        for b in bytes {
            tx.notify(*b);
        }
    }

    fn reads(rig: &Rig) -> usize {
        rig.handles.iter().map(|h| h.reads()).sum()
    }

    #[test]
    fn test_start_calibrates_every_sensor() {
        let rig = started(ClassifierKind::Threshold);
        assert!(rig.controller.sensors().iter().all(|s| s.is_calibrated()));
    }

    #[test]
    fn test_start_fails_on_absent_sensor() {
        let mut rig = rig_with(test_config(ClassifierKind::Threshold));
        rig.handles[1].fail_after(0);

        let err = rig.controller.start().unwrap_err();
        assert_eq!(
            err,
            MonitorError::SensorUnavailable {
                sensor: "s1".to_string(),
                attempts: 3
            }
        );
        assert_eq!(rig.indicator.events(), vec![IndicatorEvent::Fault("s1".to_string())]);
    }

    #[test]
    fn test_exit_stops_draining() {
        let mut rig = started(ClassifierKind::Threshold);
        send(&rig, b"P0D");

        assert_eq!(rig.controller.step(), LoopSignal::Exit);
        assert!(rig.controller.posture_enabled());
        assert_eq!(rig.controller.queue().len(), 1);
    }

    #[test]
    fn test_commands_run_in_arrival_order() {
        let mut rig = started(ClassifierKind::Threshold);
        send(&rig, b"DP");
        rig.controller.step();
        assert!(rig.controller.posture_enabled());

        send(&rig, b"PD");
        rig.controller.step();
        assert!(!rig.controller.posture_enabled());
    }

    /// Indicator that writes its calls into the link buffer, so handler
    /// order shows up in one stream.
    struct EchoIndicator(SharedBuffer);

    impl Indicator for EchoIndicator {
        fn set_power(&mut self, on: bool) {
            let tag: &[u8] = if on { b"[on]" } else { b"[off]" };
            self.0.write_all(tag).unwrap();
        }

        fn signal_fault(&mut self, sensor: &str) {
            write!(self.0, "[fault {sensor}]").unwrap();
        }
    }

    #[test]
    fn test_handlers_execute_in_arrival_order() {
        let (sensors, _handles): (Vec<Imu>, Vec<ScriptHandle>) = (0..3)
            .map(|i| {
                let (dev, h) =
                    ScriptedImu::new(&format!("s{i}"), Vec3::new(0.0, 0.0, 1.0), Vec3::zeros());
                (Imu::new(Box::new(dev)), h)
            })
            .unzip();
        let out = SharedBuffer::default();
        let mut c = Controller::new(
            test_config(ClassifierKind::Threshold),
            sensors,
            Reporter::new(Box::new(out.clone())),
            Box::new(EchoIndicator(out.clone())),
        )
        .unwrap();
        c.start().unwrap();

        let tx = c.sender();
        tx.notify(b'1');
        tx.notify(b'C');
        tx.notify(b'2');
        c.step();

        assert_eq!(out.contents(), "[on]CCCCC[off]");
        assert_eq!(c.stats().commands, 3);
    }

    #[test]
    fn test_dead_sensor_faults_when_classifier_skips_it() {
        let mut config = test_config(ClassifierKind::Ridge);
        config.ridge.model.terms.retain(|t| t.sensor < 2);
        config.telemetry.enabled = true;
        config.telemetry.period_ms = 0;
        let mut rig = rig_with(config);
        rig.controller.start().unwrap();

        rig.handles[2].fail_after(0);
        send(&rig, b"P");
        for _ in 0..50 {
            rig.controller.step();
        }

        let dead = &rig.controller.health().sensors()[2];
        assert_eq!(dead.consecutive_failures, 50);
        assert!(dead.faulted);
        assert_eq!(rig.indicator.events(), vec![IndicatorEvent::Fault("s2".to_string())]);
        assert!(rig.controller.health().sensors()[..2].iter().all(|s| s.is_healthy()));
        // the classifier kept running on the live sensors
        assert_eq!(rig.controller.stats().ticks, 50);
        assert_eq!(rig.controller.stats().skipped_ticks, 50);
    }

    #[test]
    fn test_power_toggles_only_on_change() {
        let mut rig = started(ClassifierKind::Threshold);
        send(&rig, b"11122");
        rig.controller.step();

        assert_eq!(
            rig.indicator.events(),
            vec![IndicatorEvent::Power(true), IndicatorEvent::Power(false)]
        );
        assert!(!rig.controller.power_on());
        assert_eq!(rig.controller.stats().commands, 5);
    }

    #[test]
    fn test_classifier_gated_by_posture_flag() {
        let mut rig = started(ClassifierKind::Threshold);
        let before = reads(&rig);

        for _ in 0..5 {
            rig.controller.step();
        }
        assert_eq!(reads(&rig), before);
        assert!(rig.out.contents().is_empty());

        send(&rig, b"P");
        rig.controller.step();
        assert!(reads(&rig) > before);
        assert_eq!(rig.out.contents(), "0\n");
        assert_eq!(rig.controller.stats().bad_verdicts, 1);
    }

    #[test]
    fn test_calibration_ack_and_report_rearm() {
        let mut rig = started(ClassifierKind::Ridge);
        send(&rig, b"P");
        rig.controller.step();
        rig.controller.step();
        assert_eq!(rig.out.contents(), "Good\n");

        send(&rig, b"C");
        rig.controller.step();
        assert_eq!(rig.out.contents(), "Good\nCCCCCGood\n");
        assert_eq!(rig.controller.stats().calibrations, 1);
    }

    #[test]
    fn test_failed_calibration_sends_no_ack() {
        let mut rig = started(ClassifierKind::Ridge);
        rig.handles[2].fail_after(3);
        send(&rig, b"C");
        rig.controller.step();

        assert!(!rig.out.contents().contains('C'));
        assert_eq!(rig.controller.stats().failed_calibrations, 1);
    }

    #[test]
    fn test_device_errors_skip_ticks() {
        let mut rig = started(ClassifierKind::Threshold);
        send(&rig, b"P");
        rig.handles[0].fail_after(0);

        for _ in 0..5 {
            assert_eq!(rig.controller.step(), LoopSignal::Continue);
        }
        assert_eq!(rig.controller.stats().skipped_ticks, 5);
        assert_eq!(rig.indicator.events(), vec![IndicatorEvent::Fault("s0".to_string())]);
        assert!(!rig.controller.health().all_healthy());

        rig.handles[0].heal();
        rig.controller.step();
        assert!(rig.controller.health().all_healthy());
        assert_eq!(rig.controller.stats().ticks, 1);
    }

    #[test]
    fn test_telemetry_runs_alongside_classifier() {
        let mut config = test_config(ClassifierKind::Ridge);
        config.telemetry.enabled = true;
        config.telemetry.period_ms = 0;
        let mut rig = rig_with(config);
        rig.controller.start().unwrap();

        send(&rig, b"P");
        rig.controller.step();
        let out = rig.out.contents();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Good");
        assert_eq!(lines[1].split(' ').count(), 18);
        assert_eq!(rig.controller.stats().telemetry_lines, 1);
    }

    #[test]
    fn test_period_throttles_ticks() {
        let mut config = test_config(ClassifierKind::Threshold);
        config.threshold.period_ms = 60_000;
        let mut rig = rig_with(config);
        rig.controller.start().unwrap();

        send(&rig, b"P");
        for _ in 0..10 {
            rig.controller.step();
        }
        assert_eq!(rig.controller.stats().ticks, 1);
    }

    #[test]
    fn test_run_until_exit() {
        let mut rig = started(ClassifierKind::Spine);
        send(&rig, b"PxC0");
        rig.controller.run();

        // exit is seen in the same drain, before any tick
        assert_eq!(rig.controller.queue().unknown_bytes(), 1);
        assert_eq!(rig.controller.stats().calibrations, 1);
        assert_eq!(rig.controller.stats().ticks, 0);
        assert_eq!(rig.out.contents(), "CCCCC");
        assert!(rig.controller.queue().is_empty());
    }
}
