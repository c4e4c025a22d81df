//! Scheduling policy and cycle triggers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default quiet period after the last local change.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(5);

/// Default fixed interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// Default coalescing window for real-time notifications.
pub const DEFAULT_REALTIME_DEBOUNCE: Duration = Duration::from_secs(2);

/// When automatic cycles run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum SchedulePolicy {
    /// Only manual and real-time triggers.
    Disabled,
    /// One cycle after `quiet` has passed without further local changes.
    Debounced {
        /// Quiet period.
        #[serde(with = "secs")]
        quiet: Duration,
    },
    /// A tick every `period`, skipped unless the vault is dirty.
    Interval {
        /// Tick period.
        #[serde(with = "secs")]
        period: Duration,
    },
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self::Debounced {
            quiet: DEFAULT_DEBOUNCE,
        }
    }
}

impl SchedulePolicy {
    /// Delay to (re)arm after a local change, if this policy reacts to changes.
    pub fn debounce_after_change(&self) -> Option<Duration> {
        match self {
            Self::Debounced { quiet } => Some(*quiet),
            Self::Disabled | Self::Interval { .. } => None,
        }
    }

    /// Tick period, if this policy ticks.
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Self::Interval { period } => Some(*period),
            Self::Disabled | Self::Debounced { .. } => None,
        }
    }
}

/// Why a cycle was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// The user asked for a sync.
    Manual,
    /// The debounce timer fired after local changes.
    LocalChange,
    /// The interval timer ticked.
    Interval,
    /// The remote store announced a change.
    Remote,
}

impl Trigger {
    /// Manual triggers surface "already in progress"; automatic ones are
    /// dropped silently.
    pub fn is_manual(&self) -> bool {
        matches!(self, Self::Manual)
    }

    /// Whether a request from this trigger should start a cycle given the
    /// dirty flag. Interval ticks on a clean vault are skipped.
    pub fn should_run(&self, dirty: bool) -> bool {
        match self {
            Self::Interval => dirty,
            Self::Manual | Self::LocalChange | Self::Remote => true,
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_only_runs_when_dirty() {
        assert!(!Trigger::Interval.should_run(false));
        assert!(Trigger::Interval.should_run(true));
    }

    #[test]
    fn other_triggers_ignore_dirty_flag() {
        for t in [Trigger::Manual, Trigger::LocalChange, Trigger::Remote] {
            assert!(t.should_run(false));
        }
    }

    #[test]
    fn only_manual_is_manual() {
        assert!(Trigger::Manual.is_manual());
        assert!(!Trigger::Remote.is_manual());
    }

    #[test]
    fn policy_accessors() {
        let d = SchedulePolicy::Debounced {
            quiet: Duration::from_secs(3),
        };
        assert_eq!(d.debounce_after_change(), Some(Duration::from_secs(3)));
        assert_eq!(d.interval(), None);

        let i = SchedulePolicy::Interval {
            period: Duration::from_secs(60),
        };
        assert_eq!(i.interval(), Some(Duration::from_secs(60)));
        assert_eq!(i.debounce_after_change(), None);

        assert_eq!(SchedulePolicy::Disabled.interval(), None);
        assert_eq!(SchedulePolicy::Disabled.debounce_after_change(), None);
    }

    #[test]
    fn policy_serde_uses_seconds() {
        let p: SchedulePolicy =
            serde_json::from_str(r#"{"policy":"interval","period":120}"#).unwrap();
        assert_eq!(
            p,
            SchedulePolicy::Interval {
                period: Duration::from_secs(120)
            }
        );
        let d: SchedulePolicy = serde_json::from_str(r#"{"policy":"disabled"}"#).unwrap();
        assert_eq!(d, SchedulePolicy::Disabled);
    }
}
