use std::time::Duration;

use crate::{measure::Channel, net::SessionState};

/// Failure to get a reading out of the analog front end.
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("failed to power the sensor rail")]
    Power(#[source] anyhow::Error),
    #[error("failed to calibrate / sample the {0} channel")]
    Calibration(Channel, #[source] anyhow::Error),
}

/// Failure to bring up (or keep up) the wifi + MQTT session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("wifi link failed to connect")]
    Link(#[source] anyhow::Error),
    #[error("wifi link did not come up within {0:?}")]
    LinkTimeout(Duration),
    #[error("MQTT broker session failed to start")]
    Broker(#[source] anyhow::Error),
    #[error("MQTT broker session did not connect within {0:?}")]
    BrokerTimeout(Duration),
    #[error("session controller already used (in state {0:?})")]
    AlreadyUsed(SessionState),
}

#[derive(Debug, thiserror::Error)]
#[error("failed to write the retained cycle state")]
pub struct StoreError(#[source] pub anyhow::Error);

/// Anything that ends a cycle early. All of these are fatal to the
/// current cycle only, the next wake starts over.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Sensor(#[from] SensorError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
