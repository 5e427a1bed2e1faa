//! Bringing up wifi and then an MQTT session, strictly in that order.
//!
//! ```text
//! Idle -> LinkConnecting -> LinkUp -> BrokerConnecting -> BrokerUp
//! ```
//!
//! Each `*Connecting` state kicks off the driver and then parks until the
//! driver's callback fires the matching [`Notifier`]. Nothing goes back to
//! `Idle`: the only way out is teardown into `Closed`. The link itself is
//! never torn down, the radio loses power in deep sleep.

use std::time::Duration;

use crate::{
    conf::BrokerConfig,
    error::SessionError,
    flag::{Bits, ConnectBits, Notifier, BROKER_UP, LINK_UP},
};

#[cfg(target_os = "espidf")]
pub mod mqtt;
#[cfg(target_os = "espidf")]
pub mod wifi;

/// Wireless association. No disconnect, deep sleep takes care of that.
pub trait Link {
    /// Start associating. Must not block waiting for the association,
    /// `up` is to be notified (from any thread) once the link carries traffic.
    fn connect(&mut self, up: Notifier) -> anyhow::Result<()>;
}

/// MQTT client session
pub trait Broker {
    /// Start a session. `up` is notified when the broker accepted it.
    fn connect(&mut self, config: &BrokerConfig, up: Notifier) -> anyhow::Result<()>;
    fn publish(&mut self, topic: &str, payload: &[u8]) -> anyhow::Result<()>;
    /// Stop the session. Must be safe to call on a session that never connected.
    fn close(&mut self) -> anyhow::Result<()>;
}

impl<T: Link + ?Sized> Link for &mut T {
    fn connect(&mut self, up: Notifier) -> anyhow::Result<()> {
        (**self).connect(up)
    }
}

impl<T: Broker + ?Sized> Broker for &mut T {
    fn connect(&mut self, config: &BrokerConfig, up: Notifier) -> anyhow::Result<()> {
        (**self).connect(config, up)
    }
    fn publish(&mut self, topic: &str, payload: &[u8]) -> anyhow::Result<()> {
        (**self).publish(topic, payload)
    }
    fn close(&mut self) -> anyhow::Result<()> {
        (**self).close()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    LinkConnecting,
    LinkUp,
    BrokerConnecting,
    BrokerUp,
    Closed,
}

pub struct SessionController<L: Link, B: Broker> {
    link: L,
    broker: B,
    config: BrokerConfig,
    link_timeout: Option<Duration>,
    broker_timeout: Option<Duration>,
    bits: ConnectBits,
    state: SessionState,
}

impl<L: Link, B: Broker> SessionController<L, B> {
    /// A controller that waits forever for each stage
    pub fn new(link: L, broker: B, config: BrokerConfig) -> Self {
        Self {
            link,
            broker,
            config,
            link_timeout: None,
            broker_timeout: None,
            bits: ConnectBits::new(),
            state: SessionState::Idle,
        }
    }

    pub fn with_timeouts(mut self, link: Option<Duration>, broker: Option<Duration>) -> Self {
        self.link_timeout = link;
        self.broker_timeout = broker;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, to: SessionState) {
        debug!("session: {:?} -> {:?}", self.state, to);
        self.state = to;
    }

    /// Run the handshake up to `BrokerUp`.
    ///
    /// Can only be done once per controller. Any driver error or timeout is
    /// returned as is, after closing the broker if it had been started.
    pub async fn connect(&mut self) -> Result<Session<'_, L, B>, SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::AlreadyUsed(self.state));
        }

        self.transition(SessionState::LinkConnecting);
        info!("Connecting to wifi");
        if let Err(e) = self.link.connect(self.bits.notifier(LINK_UP)) {
            self.teardown();
            return Err(SessionError::Link(e));
        }
        if !wait_for(&self.bits, LINK_UP, self.link_timeout).await {
            self.teardown();
            return Err(SessionError::LinkTimeout(
                self.link_timeout.unwrap_or_default(),
            ));
        }
        self.transition(SessionState::LinkUp);

        self.transition(SessionState::BrokerConnecting);
        info!("Starting MQTT ({})", self.config.uri);
        let connected = match self.broker.connect(&self.config, self.bits.notifier(BROKER_UP)) {
            Ok(()) => wait_for(&self.bits, BROKER_UP, self.broker_timeout).await,
            Err(e) => {
                self.teardown();
                return Err(SessionError::Broker(e));
            }
        };
        if !connected {
            self.teardown();
            return Err(SessionError::BrokerTimeout(
                self.broker_timeout.unwrap_or_default(),
            ));
        }
        self.transition(SessionState::BrokerUp);
        info!("Connected to MQTT server");

        Ok(Session {
            controller: self,
            closed: false,
        })
    }

    /// Close the broker session if one was started. Errors are logged, there
    /// is nothing left to do about them this cycle.
    fn teardown(&mut self) -> bool {
        let ok = match self.state {
            SessionState::BrokerConnecting | SessionState::BrokerUp => {
                match self.broker.close() {
                    Ok(()) => true,
                    Err(e) => {
                        error!("Failed to close MQTT session: {e:?}");
                        false
                    }
                }
            }
            _ => true,
        };
        self.transition(SessionState::Closed);
        ok
    }
}

/// `false` on timeout
async fn wait_for(bits: &ConnectBits, which: Bits, timeout: Option<Duration>) -> bool {
    match timeout {
        None => {
            bits.wait(which).await;
            true
        }
        Some(timeout) => {
            smol::future::or(
                async {
                    bits.wait(which).await;
                    true
                },
                async {
                    smol::Timer::after(timeout).await;
                    false
                },
            )
            .await
        }
    }
}

/// A connected broker session. Closed on [`Session::close`] or drop,
/// whichever comes first.
pub struct Session<'c, L: Link, B: Broker> {
    controller: &'c mut SessionController<L, B>,
    closed: bool,
}

impl<L: Link, B: Broker> Session<'_, L, B> {
    pub fn publish(&mut self, topic: &str, payload: &[u8]) -> anyhow::Result<()> {
        debug!("mqtt: publishing to '{topic}' len={}", payload.len());
        self.controller.broker.publish(topic, payload)
    }

    /// returns `false` if the broker reported an error while closing
    pub fn close(mut self) -> bool {
        self.closed = true;
        self.controller.teardown()
    }
}

impl<L: Link, B: Broker> Drop for Session<'_, L, B> {
    fn drop(&mut self) {
        if !self.closed {
            self.controller.teardown();
        }
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    use anyhow::anyhow;

    use super::*;

    /// notifies from a separate thread after `delay`, or inline when `None`
    struct ThreadLink {
        delay: Option<Duration>,
        up: Arc<AtomicBool>,
    }

    impl Link for ThreadLink {
        fn connect(&mut self, notifier: Notifier) -> anyhow::Result<()> {
            let up = self.up.clone();
            match self.delay {
                None => {
                    up.store(true, Ordering::SeqCst);
                    notifier.notify();
                }
                Some(delay) => {
                    thread::spawn(move || {
                        thread::sleep(delay);
                        up.store(true, Ordering::SeqCst);
                        notifier.notify();
                    });
                }
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct CheckingBroker {
        link_up: Arc<AtomicBool>,
        link_was_up: Option<bool>,
        fail_connect: bool,
        never_connect: bool,
        published: Vec<String>,
        closes: usize,
    }

    impl Broker for CheckingBroker {
        fn connect(&mut self, _config: &BrokerConfig, up: Notifier) -> anyhow::Result<()> {
            self.link_was_up = Some(self.link_up.load(Ordering::SeqCst));
            if self.fail_connect {
                return Err(anyhow!("connection refused"));
            }
            if !self.never_connect {
                thread::spawn(move || up.notify());
            }
            Ok(())
        }
        fn publish(&mut self, topic: &str, _payload: &[u8]) -> anyhow::Result<()> {
            self.published.push(topic.to_owned());
            Ok(())
        }
        fn close(&mut self) -> anyhow::Result<()> {
            self.closes += 1;
            Ok(())
        }
    }

    fn parts(delay: Option<Duration>) -> (ThreadLink, CheckingBroker) {
        let up = Arc::new(AtomicBool::new(false));
        (
            ThreadLink {
                delay,
                up: up.clone(),
            },
            CheckingBroker {
                link_up: up,
                ..Default::default()
            },
        )
    }

    #[test]
    fn broker_never_starts_before_link_is_up() {
        let delays = [
            None,
            Some(Duration::ZERO),
            Some(Duration::from_millis(1)),
            Some(Duration::from_millis(15)),
        ];
        for delay in delays {
            for _ in 0..10 {
                let (link, mut broker) = parts(delay);
                let mut ctl = SessionController::new(link, &mut broker, BrokerConfig::default());
                smol::block_on(async {
                    let session = ctl.connect().await.expect("connect");
                    assert!(session.close());
                });
                assert_eq!(ctl.state(), SessionState::Closed);
                drop(ctl);
                assert_eq!(broker.link_was_up, Some(true), "delay {delay:?}");
                assert_eq!(broker.closes, 1);
            }
        }
    }

    #[test]
    fn publish_goes_through_and_drop_closes() {
        let (link, mut broker) = parts(None);
        let mut ctl = SessionController::new(link, &mut broker, BrokerConfig::default());
        smol::block_on(async {
            let mut session = ctl.connect().await.unwrap();
            session.publish("a/b", b"1").unwrap();
        });
        assert_eq!(ctl.state(), SessionState::Closed);
        drop(ctl);
        assert_eq!(broker.published, vec!["a/b".to_owned()]);
        assert_eq!(broker.closes, 1);
    }

    #[test]
    fn second_connect_is_refused() {
        let (link, mut broker) = parts(None);
        let mut ctl = SessionController::new(link, &mut broker, BrokerConfig::default());
        smol::block_on(async {
            ctl.connect().await.unwrap().close();
        });
        let res = smol::block_on(ctl.connect()).map(|_| ());
        assert!(matches!(
            res,
            Err(SessionError::AlreadyUsed(SessionState::Closed))
        ));
        assert_eq!(ctl.state(), SessionState::Closed);
        drop(ctl);
        assert_eq!(broker.closes, 1);
    }

    #[test]
    fn link_timeout_is_fatal_and_broker_untouched() {
        let (link, mut broker) = parts(Some(Duration::from_secs(5)));
        let mut ctl = SessionController::new(link, &mut broker, BrokerConfig::default())
            .with_timeouts(Some(Duration::from_millis(10)), None);
        let res = smol::block_on(ctl.connect()).map(|_| ());
        assert!(matches!(res, Err(SessionError::LinkTimeout(_))));
        assert_eq!(ctl.state(), SessionState::Closed);
        drop(ctl);
        assert_eq!(broker.link_was_up, None);
        assert_eq!(broker.closes, 0);
    }

    #[test]
    fn broker_connect_error_still_closes() {
        let (link, mut broker) = parts(None);
        broker.fail_connect = true;
        let mut ctl = SessionController::new(link, &mut broker, BrokerConfig::default());
        let res = smol::block_on(ctl.connect()).map(|_| ());
        assert!(matches!(res, Err(SessionError::Broker(_))));
        assert_eq!(ctl.state(), SessionState::Closed);
        drop(ctl);
        assert_eq!(broker.closes, 1);
    }

    #[test]
    fn broker_timeout_closes_session() {
        let (link, mut broker) = parts(None);
        broker.never_connect = true;
        let mut ctl = SessionController::new(link, &mut broker, BrokerConfig::default())
            .with_timeouts(None, Some(Duration::from_millis(10)));
        let res = smol::block_on(ctl.connect()).map(|_| ());
        assert!(matches!(
            res,
            Err(SessionError::BrokerTimeout(d)) if d == Duration::from_millis(10)
        ));
        drop(ctl);
        assert_eq!(broker.closes, 1);
    }

    #[test]
    fn link_error_is_fatal() {
        struct DeadLink;
        impl Link for DeadLink {
            fn connect(&mut self, _up: Notifier) -> anyhow::Result<()> {
                Err(anyhow!("no modem"))
            }
        }
        let mut broker = CheckingBroker::default();
        let mut ctl = SessionController::new(DeadLink, &mut broker, BrokerConfig::default());
        let res = smol::block_on(ctl.connect()).map(|_| ());
        assert!(matches!(res, Err(SessionError::Link(_))));
        drop(ctl);
        assert_eq!(broker.link_was_up, None);
    }
}
