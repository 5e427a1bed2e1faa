//! A tiny event group: connection callbacks set bits, the cycle awaits them.
//!
//! Callbacks run on whatever thread the network stack uses and only ever
//! touch the bits through a [`Notifier`]. There is one waiter per cycle.

use futures::future::Future;
use futures::task::{AtomicWaker, Context, Poll};
use std::pin::Pin;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::{Acquire, Release};
use std::sync::Arc;

pub type Bits = u32;

/// wifi associated and got a DHCP lease
pub const LINK_UP: Bits = 1 << 0;
/// MQTT CONNACK received
pub const BROKER_UP: Bits = 1 << 1;

#[derive(Debug)]
struct Inner {
    waker: AtomicWaker,
    bits: AtomicU32,
}

#[derive(Debug, Clone)]
pub struct ConnectBits(Arc<Inner>);

impl ConnectBits {
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            waker: AtomicWaker::new(),
            bits: AtomicU32::new(0),
        }))
    }

    /// a handle that sets `bits` when notified, for handing to a callback
    pub fn notifier(&self, bits: Bits) -> Notifier {
        Notifier {
            inner: self.0.clone(),
            bits,
        }
    }

    pub fn is_set(&self, bits: Bits) -> bool {
        self.0.bits.load(Acquire) & bits == bits
    }

    /// resolves once every bit in `bits` is set. bits are never cleared
    pub fn wait(&self, bits: Bits) -> WaitBits<'_> {
        WaitBits { group: self, bits }
    }
}

impl Default for ConnectBits {
    fn default() -> Self {
        Self::new()
    }
}

/// Setter side of [`ConnectBits`]
#[derive(Debug, Clone)]
pub struct Notifier {
    inner: Arc<Inner>,
    bits: Bits,
}

impl Notifier {
    pub fn notify(&self) {
        self.inner.bits.fetch_or(self.bits, Release);
        self.inner.waker.wake();
    }
}

pub struct WaitBits<'a> {
    group: &'a ConnectBits,
    bits: Bits,
}

impl Future for WaitBits<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // quick check to avoid registration if already done.
        if self.group.is_set(self.bits) {
            return Poll::Ready(());
        }

        self.group.0.waker.register(cx.waker());

        // Need to check condition **after** `register` to avoid a race
        // condition that would result in lost notifications.
        if self.group.is_set(self.bits) {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod test {
    use std::{thread, time::Duration};

    use super::*;

    #[test]
    fn notify_before_wait_resolves_immediately() {
        let bits = ConnectBits::new();
        bits.notifier(LINK_UP).notify();
        smol::block_on(bits.wait(LINK_UP));
        assert!(bits.is_set(LINK_UP));
        assert!(!bits.is_set(BROKER_UP));
    }

    #[test]
    fn wait_wakes_on_notify_from_other_thread() {
        let bits = ConnectBits::new();
        let notifier = bits.notifier(BROKER_UP);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            notifier.notify();
        });
        smol::block_on(bits.wait(BROKER_UP));
        handle.join().unwrap();
        assert!(bits.is_set(BROKER_UP));
    }

    #[test]
    fn waits_for_all_requested_bits() {
        let bits = ConnectBits::new();
        bits.notifier(LINK_UP).notify();
        assert!(!bits.is_set(LINK_UP | BROKER_UP));
        let broker = bits.notifier(BROKER_UP);
        thread::spawn(move || broker.notify());
        smol::block_on(bits.wait(LINK_UP | BROKER_UP));
    }
}
