//! One wake cycle: measure, decide, maybe publish, sleep.

use std::{error::Error, time::Duration};

use crate::{
    conf::{BrokerConfig, CycleConfig},
    discovery::{self, DiscoveryPayload},
    error::{CycleError, SensorError},
    measure::{self, AnalogFrontEnd, Channel, Measurement},
    net::{Broker, Link, Session, SessionController},
    store::RetainedStore,
};


/// The last thing a cycle does
pub trait Power {
    /// Power down for `duration`. On hardware this never returns, the next
    /// cycle starts from reset.
    fn deep_sleep(&mut self, duration: Duration);
}

impl<T: Power + ?Sized> Power for &mut T {
    fn deep_sleep(&mut self, duration: Duration) {
        (**self).deep_sleep(duration)
    }
}

/// What happened during a cycle that ran to completion
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub wake_count: u32,
    pub measurement: Measurement,
    /// the session came up and state payloads were sent
    pub published: bool,
    /// discovery was sent this cycle (first wake only)
    pub announced: bool,
    /// publish calls the broker rejected
    pub failed_publishes: usize,
    /// `last_published` as saved at the end of the cycle
    pub baseline: Measurement,
}

pub struct Cycle<A, S, L, B, P>
where
    A: AnalogFrontEnd,
    S: RetainedStore,
    L: Link,
    B: Broker,
    P: Power,
{
    adc: A,
    store: S,
    link: L,
    broker: B,
    power: P,
    config: CycleConfig,
    broker_config: BrokerConfig,
}

impl<A, S, L, B, P> Cycle<A, S, L, B, P>
where
    A: AnalogFrontEnd,
    S: RetainedStore,
    L: Link,
    B: Broker,
    P: Power,
{
    pub fn new(
        adc: A,
        store: S,
        link: L,
        broker: B,
        power: P,
        config: CycleConfig,
        broker_config: BrokerConfig,
    ) -> Self {
        Self {
            adc,
            store,
            link,
            broker,
            power,
            config,
            broker_config,
        }
    }

    /// Run the cycle, then deep sleep no matter how it went.
    pub fn wake(&mut self) -> Result<CycleReport, CycleError> {
        let result = smol::block_on(self.run());
        if let Err(e) = &result {
            error!("Cycle aborted: {e:#}");
            let mut source = e.source();
            while let Some(cause) = source {
                error!("    caused by: {cause}");
                source = cause.source();
            }
        }
        info!("================================ Going to sleep ================================");
        self.power.deep_sleep(self.config.sleep_duration);
        result
    }

    /// Everything up to (not including) deep sleep.
    ///
    /// The wake counter is saved before anything can fail. `last_published`
    /// only moves once every payload of the cycle, discovery included, went out.
    pub async fn run(&mut self) -> Result<CycleReport, CycleError> {
        let mut state = self.store.load_or_default();
        state.wake_count = state.wake_count.wrapping_add(1);
        self.store.save(&state)?;
        info!("Wake #{}", state.wake_count);

        self.adc.power_on().map_err(SensorError::Power)?;
        // Measuring too quickly after enabling the sensors gives weird readings
        if !self.config.settle_delay.is_zero() {
            smol::Timer::after(self.config.settle_delay).await;
        }

        let current = measure::measure_all(&mut self.adc)?;
        let last = state.last_published;
        info!(
            "Battery: {:.1}% (change: {:.1}%)  Soil: {:.1}% (change: {:.1}%)",
            current.battery_pct,
            current.battery_pct - last.battery_pct,
            current.soil_pct,
            current.soil_pct - last.soil_pct,
        );

        let mut report = CycleReport {
            wake_count: state.wake_count,
            measurement: current,
            published: false,
            announced: false,
            failed_publishes: 0,
            baseline: last,
        };

        if !self.config.publish_policy.should_publish(&current, &state) {
            info!("Readings unchanged, not publishing");
            return Ok(report);
        }

        let mut controller =
            SessionController::new(&mut self.link, &mut self.broker, self.broker_config.clone())
                .with_timeouts(self.config.link_timeout, self.config.broker_timeout);
        let mut session = controller.connect().await?;

        // discovery only after power on, not on every wake
        if state.is_first_wake() {
            report.failed_publishes += publish_discovery(&mut session);
            report.announced = true;
        }
        report.failed_publishes += publish_measurements(&mut session, &current);
        report.published = true;
        session.close();

        if report.failed_publishes == 0 {
            state.last_published = current;
            self.store.save(&state)?;
            report.baseline = current;
        } else {
            warn!(
                "{} publish(es) failed, keeping previous baseline",
                report.failed_publishes
            );
        }

        Ok(report)
    }
}

/// returns the number of failed publishes
fn publish_discovery<L: Link, B: Broker>(session: &mut Session<'_, L, B>) -> usize {
    let mut failed = 0;
    for channel in [Channel::Battery, Channel::Soil] {
        let sent = DiscoveryPayload::for_channel(channel)
            .to_json()
            .map_err(anyhow::Error::from)
            .and_then(|payload| session.publish(&discovery::discovery_topic(channel), &payload));
        if let Err(e) = sent {
            error!("Failed to publish MQTT {channel} discovery data: {e:?}");
            failed += 1;
        }
    }
    failed
}

/// returns the number of failed publishes
fn publish_measurements<L: Link, B: Broker>(
    session: &mut Session<'_, L, B>,
    current: &Measurement,
) -> usize {
    let mut failed = 0;
    for channel in [Channel::Soil, Channel::Battery] {
        let payload = discovery::state_payload(current.get(channel));
        if let Err(e) = session.publish(&discovery::state_topic(channel), payload.as_bytes()) {
            error!("Failed to publish MQTT {channel} state: {e:?}");
            failed += 1;
        }
    }
    failed
}
