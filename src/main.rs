#[macro_use]
extern crate log;

use plantsensor::{BUILD_DATETIME, BUILD_GIT_REV, VERSION};

#[cfg(target_os = "espidf")]
fn main() {
    use plantsensor::{conf::CycleConfig, cycle::Power, periph::DeepSleep};

    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("plantsensor v{VERSION} ({BUILD_GIT_REV}, built {BUILD_DATETIME})");
    log_reset_reason();

    if let Err(e) = device::run() {
        // nothing to retry with, try again next wake
        error!("Setup failed: {e:#}");
        DeepSleep.deep_sleep(CycleConfig::default().sleep_duration);
    }
}

#[cfg(target_os = "espidf")]
fn log_reset_reason() {
    use esp_idf_hal::reset::ResetReason::{self, *};
    match ResetReason::get() {
        // retained state starts from zero
        PowerOn | ExternalPin => info!("Cold boot"),
        DeepSleep => debug!("Woke from deep sleep"),
        Software => info!("Software reset"),
        reason @ (Watchdog | InterruptWatchdog | TaskWatchdog | Sdio) => {
            warn!("Reset by {reason:?}")
        }
        Panic => warn!("Reset after a panic"),
        Brownout => warn!("Brownout reset, battery is likely flat"),
        reason => warn!("Unexpected reset reason {reason:?}"),
    }
}

#[cfg(target_os = "espidf")]
mod device {
    use anyhow::anyhow;
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use plantsensor::{
        conf::{BrokerConfig, CycleConfig, LinkConfig},
        net::{mqtt::EspBroker, wifi::EspLink},
        periph::{DeepSleep, HigrowFrontEnd},
        store::RtcStore,
        Cycle,
    };

    pub fn run() -> anyhow::Result<()> {
        let peripherals = Peripherals::take()?;
        let pins = peripherals.pins;
        let sysloop = EspSystemEventLoop::take()?;

        let front_end = HigrowFrontEnd::new(peripherals.adc1, pins.gpio32, pins.gpio33, pins.gpio4)?;
        let store = RtcStore::take().ok_or_else(|| anyhow!("retained state already taken"))?;
        let link = EspLink::new(peripherals.modem, sysloop, LinkConfig::default());

        let mut cycle = Cycle::new(
            front_end,
            store,
            link,
            EspBroker::new(),
            DeepSleep,
            CycleConfig::default(),
            BrokerConfig::default(),
        );
        // errors are logged by the cycle, and deep sleep never returns
        let _ = cycle.wake();
        Ok(())
    }
}

/// Runs a handful of cycles against simulated hardware.
///
/// `plantsensor [cycles] [time-scale]`, time-scale divides the sleep time (0 skips sleeping).
#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    use anyhow::Context;
    use plantsensor::{
        conf::{BrokerConfig, CycleConfig},
        sim::{SimBoard, SimBroker, SimLink, SimPower},
        store::MemoryStore,
        Cycle,
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("plantsensor v{VERSION} ({BUILD_GIT_REV}, built {BUILD_DATETIME}) on simulated hardware");

    let mut args = std::env::args().skip(1);
    let cycles: u32 = args
        .next()
        .map(|a| a.parse())
        .transpose()
        .context("cycle count must be a number")?
        .unwrap_or(5);
    let time_scale: u32 = args
        .next()
        .map(|a| a.parse())
        .transpose()
        .context("time scale must be a number")?
        .unwrap_or(0);

    // a slowly drying pot on a slowly draining battery
    let readings = (0..cycles.max(1)).map(|i| {
        let battery = 1900u32.saturating_sub(i.saturating_mul(3));
        let soil = 1600u32.saturating_add(i.saturating_mul(9));
        (battery, soil)
    });
    let mut board = SimBoard::new(readings);
    let mut store = MemoryStore::new();
    let mut link = SimLink::new();
    let mut broker = SimBroker::new();
    let mut power = SimPower::with_time_scale(time_scale);

    for _ in 0..cycles {
        let report = Cycle::new(
            &mut board,
            &mut store,
            &mut link,
            &mut broker,
            &mut power,
            CycleConfig::default(),
            BrokerConfig::default(),
        )
        .wake();
        if let Ok(report) = report {
            debug!("{report:?}");
        }
    }
    info!(
        "{cycles} cycles, {} messages published, {} sleeps",
        broker.published().len(),
        power.sleeps().len()
    );
    Ok(())
}
