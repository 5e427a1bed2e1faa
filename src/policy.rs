use crate::{measure::Measurement, store::CycleState};

/// When a cycle is worth turning the radio on for
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PublishPolicy {
    /// publish on the first wake, or when either reading moved by at least
    /// `threshold` percentage points since the last publish
    ChangeDetection { threshold: f32 },
    /// publish every cycle. costs a lot more battery
    Always,
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self::ChangeDetection { threshold: 1.0 }
    }
}

impl PublishPolicy {
    pub fn should_publish(&self, current: &Measurement, history: &CycleState) -> bool {
        match *self {
            PublishPolicy::Always => true,
            PublishPolicy::ChangeDetection { threshold } => {
                let last = &history.last_published;
                history.is_first_wake()
                    || (current.soil_pct - last.soil_pct).abs() >= threshold
                    || (current.battery_pct - last.battery_pct).abs() >= threshold
            }
        }
    }
}

/// [`PublishPolicy::should_publish`] with the default 1% threshold
pub fn should_publish(current: &Measurement, history: &CycleState) -> bool {
    PublishPolicy::default().should_publish(current, history)
}

#[cfg(test)]
mod test {
    use super::*;

    fn history(wake_count: u32, soil_pct: f32, battery_pct: f32) -> CycleState {
        CycleState {
            wake_count,
            last_published: Measurement {
                battery_pct,
                soil_pct,
            },
        }
    }

    fn reading(soil_pct: f32, battery_pct: f32) -> Measurement {
        Measurement {
            battery_pct,
            soil_pct,
        }
    }

    #[test]
    fn first_wake_always_publishes() {
        let h = history(1, 45.0, 80.0);
        assert!(should_publish(&reading(45.0, 80.0), &h));
        assert!(should_publish(&reading(0.0, 0.0), &h));
    }

    #[test]
    fn small_changes_are_suppressed() {
        let h = history(2, 45.0, 80.0);
        assert!(!should_publish(&reading(45.4, 80.9), &h));
        assert!(!should_publish(&reading(44.01, 79.01), &h));
        assert!(!should_publish(&reading(45.0, 80.0), &h));
    }

    #[test]
    fn threshold_is_inclusive() {
        let h = history(5, 45.0, 80.0);
        assert!(should_publish(&reading(46.0, 80.0), &h));
        assert!(should_publish(&reading(44.0, 80.0), &h));
        assert!(should_publish(&reading(45.0, 81.0), &h));
        assert!(should_publish(&reading(45.0, 79.0), &h));
    }

    #[test]
    fn either_channel_triggers() {
        let h = history(3, 45.0, 80.0);
        assert!(should_publish(&reading(46.2, 80.0), &h));
        assert!(should_publish(&reading(45.0, 70.0), &h));
    }

    #[test]
    fn always_ignores_history() {
        let h = history(9, 45.0, 80.0);
        assert!(PublishPolicy::Always.should_publish(&reading(45.0, 80.0), &h));
    }
}
