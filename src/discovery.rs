//! Home Assistant MQTT discovery + state topics.
//!
//! Reference: https://www.home-assistant.io/integrations/mqtt/#mqtt-discovery
//!
//! Payloads use the abbreviated discovery keys (`dev_cla`, `stat_t`, ...) to
//! keep the messages small.

use serde::Serialize;

use crate::{measure::Channel, VERSION};

pub const DEVICE_NAME: &str = "plantsensor";
pub const DEVICE_IDS: &str = "1";
pub const DEVICE_MODEL: &str = "T-Higrow";
pub const DEVICE_MANUFACTURER: &str = "LilyGO";

/// Format: homeassistant/sensor/plantsensor/{id}/config
pub fn discovery_topic(channel: Channel) -> String {
    format!("homeassistant/sensor/{DEVICE_NAME}/{}/config", channel.id())
}

/// Format: plantsensor/sensor/{id}/state
pub fn state_topic(channel: Channel) -> String {
    format!("{DEVICE_NAME}/sensor/{}/state", channel.id())
}

/// Whole percent, no decimals
pub fn state_payload(percentage: f32) -> String {
    format!("{percentage:.0}")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryPayload {
    #[serde(rename = "dev_cla")]
    pub device_class: &'static str,
    #[serde(rename = "unit_of_meas")]
    pub unit: &'static str,
    #[serde(rename = "stat_cla")]
    pub state_class: &'static str,
    #[serde(rename = "name")]
    pub display_name: &'static str,
    #[serde(rename = "stat_t")]
    pub state_topic: String,
    #[serde(rename = "uniq_id")]
    pub unique_id: String,
    #[serde(rename = "dev")]
    pub device: DeviceInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub ids: &'static str,
    pub name: &'static str,
    #[serde(rename = "sw")]
    pub firmware_version: &'static str,
    pub model: &'static str,
    #[serde(rename = "mf")]
    pub manufacturer: &'static str,
}

impl DeviceInfo {
    pub fn this_device() -> Self {
        Self {
            ids: DEVICE_IDS,
            name: DEVICE_NAME,
            firmware_version: VERSION,
            model: DEVICE_MODEL,
            manufacturer: DEVICE_MANUFACTURER,
        }
    }
}

impl DiscoveryPayload {
    pub fn for_channel(channel: Channel) -> Self {
        let (device_class, display_name) = match channel {
            Channel::Battery => ("battery", "Battery"),
            Channel::Soil => ("moisture", "Soil"),
        };
        Self {
            device_class,
            unit: "%",
            state_class: "measurement",
            display_name,
            state_topic: state_topic(channel),
            unique_id: format!("ESPsensor{}", channel.id()),
            device: DeviceInfo::this_device(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
