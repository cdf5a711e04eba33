//! Wearable posture monitor: complementary-filter orientation tracking on a
//! small set of IMUs, posture classification and a cooperative control loop
//! driven by one-byte commands.

pub mod classifier;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod filters;
pub mod health_monitor;
pub mod imu;
pub mod indicator;
pub mod queue;
pub mod recording;
pub mod report;
pub mod sensors;
pub mod summary;
pub mod telemetry;
pub mod types;

pub use classifier::{ClassifierKind, PostureClassifier, Verdict};
pub use command::{Command, LoopSignal};
pub use config::MonitorConfig;
pub use controller::{Controller, ControllerStats};
pub use error::{DeviceError, MonitorError, MonitorResult};
pub use imu::Imu;
pub use queue::{OverflowPolicy, RequestQueue, RequestSender};
pub use report::Reporter;
