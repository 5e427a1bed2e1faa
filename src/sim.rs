//! Stand-ins for the board, radio and broker so cycles can run off-device.
//!
//! Used by the host build of the binary and by the tests.

use std::{
    collections::HashSet,
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail};

use crate::{
    conf::BrokerConfig,
    cycle::Power,
    flag::Notifier,
    measure::{AnalogFrontEnd, Channel},
    net::{Broker, Link},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardEvent {
    PowerOn(Instant),
    Read(Channel, Instant),
}

/// Scripted analog front end. Each `power_on` moves on to the next
/// `(battery_mv, soil_mv)` pair, the last pair repeats forever.
#[derive(Debug)]
pub struct SimBoard {
    readings: Vec<(u32, u32)>,
    power_ons: usize,
    failing: HashSet<Channel>,
    events: Vec<BoardEvent>,
}

impl SimBoard {
    pub fn new(readings: impl IntoIterator<Item = (u32, u32)>) -> Self {
        let readings: Vec<_> = readings.into_iter().collect();
        assert!(!readings.is_empty(), "SimBoard needs at least one reading");
        Self {
            readings,
            power_ons: 0,
            failing: HashSet::new(),
            events: vec![],
        }
    }

    /// every read of `channel` fails from now on
    pub fn fail_channel(&mut self, channel: Channel) {
        self.failing.insert(channel);
    }

    pub fn events(&self) -> &[BoardEvent] {
        &self.events
    }

    /// channels read so far, in order
    pub fn reads(&self) -> Vec<Channel> {
        self.events
            .iter()
            .filter_map(|e| match e {
                BoardEvent::Read(ch, _) => Some(*ch),
                BoardEvent::PowerOn(_) => None,
            })
            .collect()
    }

    fn current(&self) -> (u32, u32) {
        let idx = self.power_ons.saturating_sub(1).min(self.readings.len() - 1);
        self.readings[idx]
    }
}

impl AnalogFrontEnd for SimBoard {
    fn power_on(&mut self) -> anyhow::Result<()> {
        self.power_ons += 1;
        self.events.push(BoardEvent::PowerOn(Instant::now()));
        Ok(())
    }

    fn read_millivolts(&mut self, channel: Channel) -> anyhow::Result<u32> {
        self.events.push(BoardEvent::Read(channel, Instant::now()));
        if self.failing.contains(&channel) {
            bail!("ADC characterization not supported on this chip");
        }
        let (battery, soil) = self.current();
        Ok(match channel {
            Channel::Battery => battery,
            Channel::Soil => soil,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkBehavior {
    /// notify from a background thread after the delay
    #[default]
    Associate,
    /// connect succeeds, but the link never comes up
    NeverAssociate,
    /// connect itself returns an error
    Refuse,
}

#[derive(Debug, Default)]
pub struct SimLink {
    pub behavior: LinkBehavior,
    pub delay: Duration,
    connects: usize,
}

impl SimLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: LinkBehavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    pub fn connects(&self) -> usize {
        self.connects
    }
}

impl Link for SimLink {
    fn connect(&mut self, up: Notifier) -> anyhow::Result<()> {
        self.connects += 1;
        match self.behavior {
            LinkBehavior::Associate => {
                let delay = self.delay;
                thread::spawn(move || {
                    thread::sleep(delay);
                    up.notify();
                });
            }
            LinkBehavior::NeverAssociate => {}
            LinkBehavior::Refuse => bail!("wifi: station mode could not be started"),
        }
        Ok(())
    }
}

/// Records everything published to it
#[derive(Debug, Default)]
pub struct SimBroker {
    pub refuse_connect: bool,
    pub never_connect: bool,
    failing_topics: HashSet<String>,
    connected: bool,
    published: Vec<(String, Vec<u8>)>,
    connects: usize,
    closes: usize,
}

impl SimBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// publishes to `topic` fail from now on
    pub fn fail_topic(&mut self, topic: impl Into<String>) {
        self.failing_topics.insert(topic.into());
    }

    /// successful publishes as `(topic, payload)`
    pub fn published(&self) -> &[(String, Vec<u8>)] {
        &self.published
    }

    pub fn topics(&self) -> Vec<&str> {
        self.published.iter().map(|(t, _)| t.as_str()).collect()
    }

    pub fn payload(&self, topic: &str) -> Option<&str> {
        self.published
            .iter()
            .rev()
            .find(|(t, _)| t == topic)
            .and_then(|(_, p)| std::str::from_utf8(p).ok())
    }

    pub fn connects(&self) -> usize {
        self.connects
    }

    pub fn closes(&self) -> usize {
        self.closes
    }
}

impl Broker for SimBroker {
    fn connect(&mut self, config: &BrokerConfig, up: Notifier) -> anyhow::Result<()> {
        self.connects += 1;
        if self.refuse_connect {
            bail!("mqtt: could not reach {}", config.uri);
        }
        self.connected = true;
        if !self.never_connect {
            thread::spawn(move || up.notify());
        }
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> anyhow::Result<()> {
        if !self.connected {
            bail!("mqtt: not connected");
        }
        if self.failing_topics.contains(topic) {
            return Err(anyhow!("mqtt: outbox full, dropping message for {topic}"));
        }
        info!(
            "mqtt(sim): {topic} <- {}",
            String::from_utf8_lossy(payload)
        );
        self.published.push((topic.to_owned(), payload.to_vec()));
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.connected = false;
        self.closes += 1;
        Ok(())
    }
}

/// Records sleeps, optionally actually sleeping a scaled down amount
#[derive(Debug, Default)]
pub struct SimPower {
    /// divide requested sleep time by this much. 0 = don't sleep at all
    pub time_scale: u32,
    sleeps: Vec<Duration>,
}

impl SimPower {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_scale(time_scale: u32) -> Self {
        Self {
            time_scale,
            ..Self::default()
        }
    }

    pub fn sleeps(&self) -> &[Duration] {
        &self.sleeps
    }
}

impl Power for SimPower {
    fn deep_sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
        if self.time_scale > 0 {
            thread::sleep(duration / self.time_scale);
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn scaled_power_sleeps_a_fraction() {
        let mut power = SimPower::with_time_scale(1000);
        let start = Instant::now();
        power.deep_sleep(Duration::from_secs(60));
        assert!(start.elapsed() >= Duration::from_millis(60));
        assert_eq!(power.sleeps(), &[Duration::from_secs(60)]);
    }

    #[test]
    fn unscaled_power_only_records() {
        let mut power = SimPower::with_time_scale(0);
        let start = Instant::now();
        power.deep_sleep(Duration::from_secs(3600));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(power.sleeps().len(), 1);
    }
}
