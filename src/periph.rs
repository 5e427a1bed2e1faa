//! T-Higrow board wiring.

use std::time::Duration;

use esp_idf_hal::{
    adc::{
        attenuation::DB_11,
        oneshot::{
            config::{AdcChannelConfig, Calibration},
            AdcChannelDriver, AdcDriver,
        },
        ADC1,
    },
    gpio::{Gpio32, Gpio33, Gpio4, Output, PinDriver},
    peripheral::Peripheral,
};
use esp_idf_sys::EspError;

use crate::{
    cycle::Power,
    measure::{AnalogFrontEnd, Channel},
};

/// Sensor supply switch on GPIO4, soil probe on GPIO32, battery divider on GPIO33
pub struct HigrowFrontEnd<'d> {
    adc: AdcDriver<'d, ADC1>,
    soil: Gpio32,
    battery: Gpio33,
    power: PinDriver<'d, Gpio4, Output>,
}

impl<'d> HigrowFrontEnd<'d> {
    pub fn new(
        adc: impl Peripheral<P = ADC1> + 'd,
        soil: Gpio32,
        battery: Gpio33,
        power: Gpio4,
    ) -> Result<Self, EspError> {
        Ok(Self {
            adc: AdcDriver::new(adc)?,
            soil,
            battery,
            power: PinDriver::output(power)?,
        })
    }
}

impl AnalogFrontEnd for HigrowFrontEnd<'_> {
    fn power_on(&mut self) -> anyhow::Result<()> {
        self.power.set_high()?;
        Ok(())
    }

    fn read_millivolts(&mut self, channel: Channel) -> anyhow::Result<u32> {
        // with calibration on, `read` hands back millivolts
        let config = AdcChannelConfig {
            attenuation: DB_11,
            calibration: Calibration::Line,
            ..Default::default()
        };
        let mv = match channel {
            Channel::Soil => AdcChannelDriver::new(&self.adc, &mut self.soil, &config)?.read()?,
            Channel::Battery => {
                AdcChannelDriver::new(&self.adc, &mut self.battery, &config)?.read()?
            }
        };
        Ok(mv.into())
    }
}

/// Timer wakeup deep sleep
pub struct DeepSleep;

impl Power for DeepSleep {
    fn deep_sleep(&mut self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        // SAFETY: plain FFI call, does not return
        unsafe { esp_idf_sys::esp_deep_sleep(micros) }
    }
}
