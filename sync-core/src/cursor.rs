//! Local sync cursor and local-deletion inference.
//!
//! The cursor records which paths were present after the last cycle that
//! completed without a failed download. Comparing that set to the current
//! manifest is the only way this client learns about local deletions.
//!
//! A mass disappearance of tracked files is more likely an unmounted drive or
//! an accidental wipe than an intentional cleanup, so deletions are withheld
//! when more than half of the tracked set is missing. The remote store then
//! sends downloads that restore the files instead of propagating the wipe.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Above this fraction of missing tracked paths, deletions are suppressed.
pub const WIPE_GUARD_RATIO: f64 = 0.5;

/// Local record of the last successfully completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Completion time of the last successful cycle (epoch seconds, 0 = never).
    #[serde(default)]
    pub last_sync_time: u64,
    /// Paths present locally after that cycle.
    #[serde(default)]
    pub last_synced_paths: BTreeSet<String>,
}

impl SyncCursor {
    /// A cursor that has never completed a cycle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed cycle.
    pub fn advance<I, S>(&mut self, now: u64, present_paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.last_sync_time = now;
        self.last_synced_paths = present_paths.into_iter().map(Into::into).collect();
    }

    /// Forget everything, forcing the next cycle to re-evaluate the whole vault
    /// without inferring any deletions.
    pub fn mark_stale(&mut self) {
        self.last_sync_time = 0;
        self.last_synced_paths.clear();
    }

    /// True when no cycle has completed since the cursor was created or
    /// marked stale.
    pub fn is_stale(&self) -> bool {
        self.last_sync_time == 0
    }

    /// Work out which deletions to report given the current local paths.
    pub fn plan_deletions<'a, I>(&self, current_paths: I) -> DeletionPlan
    where
        I: IntoIterator<Item = &'a str>,
    {
        let current: BTreeSet<&str> = current_paths.into_iter().collect();
        let candidates: Vec<String> = self
            .last_synced_paths
            .iter()
            .filter(|p| !current.contains(p.as_str()))
            .cloned()
            .collect();

        if candidates.is_empty() {
            return DeletionPlan::Report(Vec::new());
        }

        let tracked = self.last_synced_paths.len();
        if exceeds_wipe_guard(candidates.len(), tracked) {
            DeletionPlan::Suppressed {
                missing: candidates.len(),
                tracked,
            }
        } else {
            DeletionPlan::Report(candidates)
        }
    }
}

/// Outcome of local deletion inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionPlan {
    /// Report these paths as deleted (possibly none).
    Report(Vec<String>),
    /// Too many tracked paths vanished; report nothing this cycle.
    Suppressed {
        /// Tracked paths missing locally.
        missing: usize,
        /// Size of the tracked set.
        tracked: usize,
    },
}

impl DeletionPlan {
    /// Paths to send in the delta request.
    pub fn into_reported(self) -> Vec<String> {
        match self {
            Self::Report(paths) => paths,
            Self::Suppressed { .. } => Vec::new(),
        }
    }
}

/// `missing / tracked > WIPE_GUARD_RATIO`.
fn exceeds_wipe_guard(missing: usize, tracked: usize) -> bool {
    tracked > 0 && (missing as f64) / (tracked as f64) > WIPE_GUARD_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(paths: &[&str]) -> SyncCursor {
        let mut c = SyncCursor::new();
        c.advance(100, paths.iter().copied());
        c
    }

    // ===========================================
    // Basic Cursor Tests
    // ===========================================

    #[test]
    fn new_cursor_is_stale() {
        let c = SyncCursor::new();
        assert!(c.is_stale());
        assert!(c.last_synced_paths.is_empty());
    }

    #[test]
    fn advance_replaces_path_set() {
        let mut c = cursor(&["a.md", "b.md"]);
        c.advance(200, ["c.md"]);
        assert_eq!(c.last_sync_time, 200);
        assert_eq!(c.last_synced_paths.len(), 1);
        assert!(c.last_synced_paths.contains("c.md"));
    }

    #[test]
    fn mark_stale_clears_everything() {
        let mut c = cursor(&["a.md"]);
        c.mark_stale();
        assert!(c.is_stale());
        assert!(c.last_synced_paths.is_empty());
    }

    #[test]
    fn cursor_serde_defaults_missing_fields() {
        let c: SyncCursor = serde_json::from_str("{}").unwrap();
        assert_eq!(c, SyncCursor::new());
    }

    // ===========================================
    // Deletion Inference Tests
    // ===========================================

    #[test]
    fn nothing_missing_reports_nothing() {
        let c = cursor(&["a.md", "b.md"]);
        assert_eq!(
            c.plan_deletions(["a.md", "b.md", "new.md"]),
            DeletionPlan::Report(vec![])
        );
    }

    #[test]
    fn empty_prior_set_reports_nothing() {
        let c = SyncCursor::new();
        assert_eq!(c.plan_deletions(["a.md"]), DeletionPlan::Report(vec![]));
    }

    #[test]
    fn minority_missing_is_reported() {
        let c = cursor(&["a.md", "b.md", "c.md", "d.md"]);
        assert_eq!(
            c.plan_deletions(["a.md", "b.md", "c.md"]),
            DeletionPlan::Report(vec!["d.md".into()])
        );
    }

    #[test]
    fn exactly_half_missing_is_reported() {
        let c = cursor(&["a.md", "b.md", "c.md", "d.md"]);
        let plan = c.plan_deletions(["a.md", "b.md"]);
        assert_eq!(
            plan,
            DeletionPlan::Report(vec!["c.md".into(), "d.md".into()])
        );
    }

    #[test]
    fn more_than_half_missing_is_suppressed() {
        let c = cursor(&["a.md", "b.md", "c.md", "d.md"]);
        let plan = c.plan_deletions(["a.md"]);
        assert_eq!(
            plan,
            DeletionPlan::Suppressed {
                missing: 3,
                tracked: 4
            }
        );
        assert!(plan.into_reported().is_empty());
    }

    #[test]
    fn full_wipe_is_suppressed() {
        let c = cursor(&["a.md", "b.md", "c.md"]);
        assert!(matches!(
            c.plan_deletions(std::iter::empty()),
            DeletionPlan::Suppressed { missing: 3, tracked: 3 }
        ));
    }

    #[test]
    fn single_tracked_file_deleted_is_suppressed() {
        // 1/1 > 0.5
        let c = cursor(&["only.md"]);
        assert!(matches!(
            c.plan_deletions(std::iter::empty()),
            DeletionPlan::Suppressed { .. }
        ));
    }

    #[test]
    fn wipe_guard_boundary_across_sizes() {
        for tracked in 1..=20usize {
            let names: Vec<String> = (0..tracked).map(|i| format!("f{i}.md")).collect();
            let c = cursor(&names.iter().map(String::as_str).collect::<Vec<_>>());
            for missing in 1..=tracked {
                let present: Vec<&str> = names[missing..].iter().map(String::as_str).collect();
                let reported = !matches!(c.plan_deletions(present), DeletionPlan::Suppressed { .. });
                let expected = (missing as f64) / (tracked as f64) <= WIPE_GUARD_RATIO;
                assert_eq!(reported, expected, "missing={missing} tracked={tracked}");
            }
        }
    }
}
