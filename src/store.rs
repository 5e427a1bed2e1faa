use std::mem::size_of;

use static_assertions::const_assert_eq;

use crate::{error::StoreError, measure::Measurement};

/// State carried from one wake cycle to the next.
///
/// Lives in RTC slow memory on the device: it survives deep sleep, but a
/// power cycle (or pulling the battery) puts it back to [`CycleState::ZERO`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CycleState {
    /// bumped once at the start of every cycle. 1 = first cycle since power on
    pub wake_count: u32,
    /// baseline for change detection, only moved when a publish went out
    pub last_published: Measurement,
}

// u32 + 2 * f32, no padding. the RTC section relies on this
const_assert_eq!(size_of::<CycleState>(), 12);

impl CycleState {
    pub const ZERO: Self = Self {
        wake_count: 0,
        last_published: Measurement::ZERO,
    };

    pub fn is_first_wake(&self) -> bool {
        self.wake_count == 1
    }
}

/// Storage that keeps its contents across deep sleep (but not power loss)
pub trait RetainedStore {
    /// the retained record, or [`CycleState::ZERO`] after a cold boot
    fn load_or_default(&mut self) -> CycleState;
    fn save(&mut self, state: &CycleState) -> Result<(), StoreError>;
}

impl<S: RetainedStore + ?Sized> RetainedStore for &mut S {
    fn load_or_default(&mut self) -> CycleState {
        (**self).load_or_default()
    }
    fn save(&mut self, state: &CycleState) -> Result<(), StoreError> {
        (**self).save(state)
    }
}

/// Plain RAM store. Survives as long as the value does, so "power loss" is
/// just dropping it.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    state: CycleState,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: CycleState) -> Self {
        Self { state, saves: 0 }
    }

    pub fn state(&self) -> &CycleState {
        &self.state
    }

    /// number of successful `save` calls
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl RetainedStore for MemoryStore {
    fn load_or_default(&mut self) -> CycleState {
        self.state
    }

    fn save(&mut self, state: &CycleState) -> Result<(), StoreError> {
        self.state = *state;
        self.saves += 1;
        Ok(())
    }
}

#[cfg(target_os = "espidf")]
pub use rtc::RtcStore;

#[cfg(target_os = "espidf")]
mod rtc {
    use std::{
        ptr::{addr_of, addr_of_mut},
        sync::atomic::{AtomicBool, Ordering},
    };

    use super::{CycleState, RetainedStore};
    use crate::error::StoreError;

    // `.rtc.data` is initialized by the bootloader on power-on reset only,
    // deep sleep wakes leave it alone
    #[link_section = ".rtc.data"]
    static mut RETAINED: CycleState = CycleState::ZERO;

    static TAKEN: AtomicBool = AtomicBool::new(false);

    /// The retained record in RTC slow memory. There is only one.
    pub struct RtcStore {
        _private: (),
    }

    impl RtcStore {
        pub fn take() -> Option<Self> {
            (!TAKEN.swap(true, Ordering::AcqRel)).then_some(Self { _private: () })
        }
    }

    impl RetainedStore for RtcStore {
        fn load_or_default(&mut self) -> CycleState {
            // SAFETY: `TAKEN` hands out a single `RtcStore`, nothing else touches RETAINED
            unsafe { addr_of!(RETAINED).read_volatile() }
        }

        fn save(&mut self, state: &CycleState) -> Result<(), StoreError> {
            // SAFETY: see `load_or_default`
            unsafe { addr_of_mut!(RETAINED).write_volatile(*state) };
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fresh_store_is_zero() {
        let mut store = MemoryStore::new();
        assert_eq!(store.load_or_default(), CycleState::ZERO);
        assert!(!store.load_or_default().is_first_wake());
    }

    #[test]
    fn saved_state_is_loaded_back() {
        let mut store = MemoryStore::new();
        let state = CycleState {
            wake_count: 7,
            last_published: Measurement {
                battery_pct: 80.0,
                soil_pct: 45.0,
            },
        };
        store.save(&state).unwrap();
        assert_eq!(store.load_or_default(), state);
        assert_eq!(store.saves(), 1);
    }
}
