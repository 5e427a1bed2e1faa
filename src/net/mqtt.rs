//! MQTT over the esp-idf client.

use anyhow::anyhow;
use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration, QoS};

use super::Broker;
use crate::{conf::BrokerConfig, flag::Notifier};

#[derive(Default)]
pub struct EspBroker {
    client: Option<EspMqttClient<'static>>,
}

impl EspBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Broker for EspBroker {
    fn connect(&mut self, config: &BrokerConfig, up: Notifier) -> anyhow::Result<()> {
        let conf = MqttClientConfiguration {
            client_id: Some(&config.client_id),
            username: Some(&config.username),
            password: Some(&config.password),
            ..Default::default()
        };
        let client = EspMqttClient::new_cb(&config.uri, &conf, move |event| {
            match event.payload() {
                EventPayload::Connected(_) => up.notify(),
                EventPayload::Disconnected => warn!("MQTT disconnected"),
                EventPayload::Error(e) => error!("MQTT error: {e:?}"),
                _ => {}
            }
        })?;
        self.client = Some(client);
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> anyhow::Result<()> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| anyhow!("MQTT session was never started"))?;
        client.publish(topic, QoS::AtMostOnce, false, payload)?;
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        // dropping stops and destroys the client
        drop(self.client.take());
        Ok(())
    }
}
