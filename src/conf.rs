//! Build-time credentials and the per-cycle tunables.
//!
//! Credentials are baked in from the build environment (`PLANTSENSOR_WIFI_SSID`,
//! `PLANTSENSOR_WIFI_PASS`, `PLANTSENSOR_MQTT_URI`, `PLANTSENSOR_MQTT_USER`,
//! `PLANTSENSOR_MQTT_PASS`). Anything left unset falls back to `example`, which
//! will build but never associate.

use std::time::Duration;

use crate::policy::PublishPolicy;

const fn or_example(value: Option<&'static str>) -> &'static str {
    match value {
        Some(v) => v,
        None => "example",
    }
}

pub const WIFI_SSID: &str = or_example(option_env!("PLANTSENSOR_WIFI_SSID"));
pub const WIFI_PASS: &str = or_example(option_env!("PLANTSENSOR_WIFI_PASS"));

pub const MQTT_URI: &str = match option_env!("PLANTSENSOR_MQTT_URI") {
    Some(uri) => uri,
    None => "mqtt://192.168.1.1:1883",
};
pub const MQTT_USER: &str = or_example(option_env!("PLANTSENSOR_MQTT_USER"));
pub const MQTT_PASS: &str = or_example(option_env!("PLANTSENSOR_MQTT_PASS"));

pub const MQTT_CLIENT_ID: &str = "plantsensor";

/// Settings for one wake cycle
#[derive(Debug, Clone)]
pub struct CycleConfig {
    /// time between powering the sensors and sampling them.
    /// reading straight after power-up gives garbage
    pub settle_delay: Duration,
    /// how long to deep sleep for, counted from sleep entry
    pub sleep_duration: Duration,
    pub publish_policy: PublishPolicy,
    /// `None` waits for the wifi link forever
    pub link_timeout: Option<Duration>,
    /// `None` waits for the broker session forever
    pub broker_timeout: Option<Duration>,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            sleep_duration: Duration::from_secs(60),
            publish_policy: PublishPolicy::default(),
            link_timeout: None,
            broker_timeout: None,
        }
    }
}

/// Where and as who to connect to the MQTT broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub uri: String,
    pub client_id: String,
    pub username: String,
    pub password: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            uri: MQTT_URI.into(),
            client_id: MQTT_CLIENT_ID.into(),
            username: MQTT_USER.into(),
            password: MQTT_PASS.into(),
        }
    }
}

/// WiFi station credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    pub ssid: String,
    pub password: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            ssid: WIFI_SSID.into(),
            password: WIFI_PASS.into(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::policy::PublishPolicy;

    #[test]
    fn defaults_match_the_deployed_firmware() {
        let cfg = CycleConfig::default();
        assert_eq!(cfg.settle_delay, Duration::from_millis(500));
        assert_eq!(cfg.sleep_duration, Duration::from_secs(60));
        assert_eq!(cfg.link_timeout, None);
        assert_eq!(cfg.broker_timeout, None);
        assert_eq!(
            cfg.publish_policy,
            PublishPolicy::ChangeDetection { threshold: 1.0 }
        );
        assert_eq!(BrokerConfig::default().client_id, "plantsensor");
    }
}
