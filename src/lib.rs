//! Firmware for the LilyGO T-Higrow plant sensor.
//!
//! Every wake: power the sensors, measure soil moisture and battery, and only
//! if something changed bring up wifi + MQTT to publish it (with Home
//! Assistant discovery on the first wake after power on). Then deep sleep.
//!
//! Hardware bits live behind traits so the cycle runs on the host against
//! [`sim`] as well as on the ESP32.

#[macro_use]
extern crate log;

pub mod conf;
pub mod cycle;
pub mod discovery;
pub mod error;
pub mod flag;
pub mod measure;
pub mod net;
#[cfg(target_os = "espidf")]
pub mod periph;
pub mod policy;
#[cfg(any(test, not(target_os = "espidf")))]
pub mod sim;
pub mod store;

pub use cycle::{Cycle, CycleReport, Power};
pub use error::CycleError;
pub use measure::{Channel, Measurement};
pub use store::CycleState;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const BUILD_GIT_REV: &str = env!("BUILD_GIT_REV");
pub const BUILD_DATETIME: &str = env!("BUILD_DATETIME");
