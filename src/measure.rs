//! Turning calibrated ADC voltages into percentages.
//!
//! Soil (capacitive probe, 11dB attenuation):
//!
//! ```text
//!   Air:            2.77V
//!   Very dry soil:  2.76V
//!   Wet soil:       1.53V
//!   Very wet soil:  1.35V
//!   Water:          1.39V
//! ```
//!
//! Battery (through the on-board divider, 11dB attenuation):
//!
//! ```text
//!   4.2 V    1900 mV    100%
//!   4.0 V    1820 mV     84%
//!   3.8 V    1700 mV     60%
//!   3.6 V    1590 mV     38%
//!   3.4 V    1500 mV     20%
//!   3.2 V    1410 mV      2%
//! ```

use std::fmt;

use crate::error::SensorError;

/// The two analog inputs of the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// ADC1 channel 4 (GPIO32)
    Soil,
    /// ADC1 channel 5 (GPIO33)
    Battery,
}

impl Channel {
    /// the fixed calibration of this channel's front end
    pub const fn calibration(self) -> LinearCalibration {
        match self {
            Channel::Soil => SOIL_CALIBRATION,
            Channel::Battery => BATTERY_CALIBRATION,
        }
    }

    /// short id used in MQTT topics and unique ids
    pub const fn id(self) -> &'static str {
        match self {
            Channel::Soil => "soil",
            Channel::Battery => "battery",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Linear map from millivolts to a percentage, clamped to [0, 100].
///
/// `zero_mv` maps to 0% and `full_mv` to 100%. Either may be the larger one,
/// which is how the soil probe (drier = higher voltage) is inverted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearCalibration {
    pub zero_mv: f32,
    pub full_mv: f32,
}

/// air reads 0%, very wet soil 100%
pub const SOIL_CALIBRATION: LinearCalibration = LinearCalibration {
    zero_mv: 2770.0,
    full_mv: 1350.0,
};

/// 1400mV (~3.1V cell) is empty, 1900mV (4.2V cell) is full
pub const BATTERY_CALIBRATION: LinearCalibration = LinearCalibration {
    zero_mv: 1400.0,
    full_mv: 1900.0,
};

impl LinearCalibration {
    pub fn percentage(&self, millivolts: u32) -> f32 {
        let mv = millivolts as f32;
        clamp_percentage(100.0 * (mv - self.zero_mv) / (self.full_mv - self.zero_mv))
    }
}

pub fn clamp_percentage(value: f32) -> f32 {
    value.clamp(0.0, 100.0)
}

/// One reading of both sensors, each in [0, 100]
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Measurement {
    pub battery_pct: f32,
    pub soil_pct: f32,
}

impl Measurement {
    pub const ZERO: Self = Self {
        battery_pct: 0.0,
        soil_pct: 0.0,
    };

    pub fn get(&self, channel: Channel) -> f32 {
        match channel {
            Channel::Soil => self.soil_pct,
            Channel::Battery => self.battery_pct,
        }
    }
}

/// The analog side of the board: a switchable sensor supply and an ADC
/// that hands back calibrated millivolts.
pub trait AnalogFrontEnd {
    /// switch the sensor supply rail on
    fn power_on(&mut self) -> anyhow::Result<()>;

    /// Characterize the ADC for `channel` and take one sample, in millivolts.
    ///
    /// Characterization happens on every call; an error here means the
    /// hardware can't be configured and is not worth retrying.
    fn read_millivolts(&mut self, channel: Channel) -> anyhow::Result<u32>;
}

impl<T: AnalogFrontEnd + ?Sized> AnalogFrontEnd for &mut T {
    fn power_on(&mut self) -> anyhow::Result<()> {
        (**self).power_on()
    }
    fn read_millivolts(&mut self, channel: Channel) -> anyhow::Result<u32> {
        (**self).read_millivolts(channel)
    }
}

pub fn measure(adc: &mut impl AnalogFrontEnd, channel: Channel) -> Result<f32, SensorError> {
    let mv = adc
        .read_millivolts(channel)
        .map_err(|e| SensorError::Calibration(channel, e))?;
    let percentage = channel.calibration().percentage(mv);
    info!("Measurement {channel}: {mv} mV = {percentage:.0}%");
    Ok(percentage)
}

/// Battery first, then soil.
pub fn measure_all(adc: &mut impl AnalogFrontEnd) -> Result<Measurement, SensorError> {
    let battery_pct = measure(adc, Channel::Battery)?;
    let soil_pct = measure(adc, Channel::Soil)?;
    Ok(Measurement {
        battery_pct,
        soil_pct,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::SimBoard;

    #[test]
    fn soil_clamps_outside_calibration_points() {
        let cal = Channel::Soil.calibration();
        for mv in [0, 500, 1000, 1349, 1350] {
            assert_eq!(cal.percentage(mv), 100.0, "{mv} mV");
        }
        for mv in [2770, 2771, 3000, 3300, u32::MAX] {
            assert_eq!(cal.percentage(mv), 0.0, "{mv} mV");
        }
    }

    #[test]
    fn soil_is_monotonic_decreasing_between_points() {
        let cal = Channel::Soil.calibration();
        let mut last = cal.percentage(1350);
        for mv in 1351..=2770 {
            let pct = cal.percentage(mv);
            assert!(pct <= last, "{mv} mV gave {pct} after {last}");
            assert!((0.0..=100.0).contains(&pct));
            last = pct;
        }
        // midpoint
        assert!((cal.percentage(2060) - 50.0).abs() < 0.01);
    }

    #[test]
    fn battery_below_empty_is_zero() {
        let cal = Channel::Battery.calibration();
        for mv in [0, 1, 700, 1399, 1400] {
            assert_eq!(cal.percentage(mv), 0.0, "{mv} mV");
        }
    }

    #[test]
    fn battery_follows_discharge_table() {
        let cal = Channel::Battery.calibration();
        assert_eq!(cal.percentage(1900), 100.0);
        assert_eq!(cal.percentage(1820), 84.0);
        assert_eq!(cal.percentage(1700), 60.0);
        assert_eq!(cal.percentage(1500), 20.0);
        assert_eq!(cal.percentage(2500), 100.0);

        let mut last = 0.0;
        for mv in 1400..=1900 {
            let pct = cal.percentage(mv);
            assert!(pct >= last);
            last = pct;
        }
    }

    #[test]
    fn measure_all_reads_battery_then_soil() {
        let mut board = SimBoard::new([(1800, 2060)]);
        let m = measure_all(&mut board).unwrap();
        assert_eq!(m.battery_pct, 80.0);
        assert!((m.soil_pct - 50.0).abs() < 0.01);
        assert_eq!(board.reads(), &[Channel::Battery, Channel::Soil]);
    }

    #[test]
    fn calibration_failure_names_the_channel() {
        let mut board = SimBoard::new([(1800, 2060)]);
        board.fail_channel(Channel::Soil);
        match measure_all(&mut board) {
            Err(SensorError::Calibration(Channel::Soil, _)) => {}
            other => panic!("expected soil calibration error, got {other:?}"),
        }
    }
}
