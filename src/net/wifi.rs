//! ESP32 station mode wifi.

use anyhow::{anyhow, Context};
use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::{
    eventloop::{EspSubscription, EspSystemEventLoop, System},
    netif::IpEvent,
    nvs::EspDefaultNvsPartition,
    wifi::EspWifi,
};

use super::Link;
use crate::{conf::LinkConfig, flag::Notifier};

/// Owns the modem until the first `connect`. The driver and event
/// subscription then stay alive until deep sleep cuts the power.
pub struct EspLink {
    modem: Option<Modem>,
    sysloop: EspSystemEventLoop,
    config: LinkConfig,
    wifi: Option<Box<EspWifi<'static>>>,
    got_ip: Option<EspSubscription<'static, System>>,
}

impl EspLink {
    pub fn new(modem: Modem, sysloop: EspSystemEventLoop, config: LinkConfig) -> Self {
        Self {
            modem: Some(modem),
            sysloop,
            config,
            wifi: None,
            got_ip: None,
        }
    }
}

impl Link for EspLink {
    fn connect(&mut self, up: Notifier) -> anyhow::Result<()> {
        let modem = self
            .modem
            .take()
            .ok_or_else(|| anyhow!("wifi was already started this cycle"))?;
        // wifi keeps its calibration data in NVS
        let nvs = EspDefaultNvsPartition::take()
            .context("failed to initialize non-volatile storage")?;

        self.got_ip = Some(self.sysloop.subscribe::<IpEvent, _>(move |event| {
            if let IpEvent::DhcpIpAssigned(_) = event {
                up.notify();
            }
        })?);

        let mut wifi = Box::new(EspWifi::new(modem, self.sysloop.clone(), Some(nvs))?);
        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: self
                .config
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("SSID {:?} is too long", self.config.ssid))?,
            password: self
                .config
                .password
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("wifi password is too long"))?,
            auth_method: if self.config.password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        }))?;
        wifi.start()?;
        wifi.connect()?;
        self.wifi = Some(wifi);
        Ok(())
    }
}
