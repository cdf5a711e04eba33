pub mod complementary;

pub use complementary::{accel_tilt, complementary, FilterSchedule};
