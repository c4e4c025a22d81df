//! # vaultsync-core
//!
//! Pure sync logic for VaultSync (no I/O, instant tests).
//!
//! Everything here takes input and produces output without touching the
//! network or disk: path filtering, deletion inference with the wipe guard,
//! mode planning, retry policy, conflict naming, scheduling policy and the
//! real-time channel state machine. `vaultsync-client` performs the I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod conflict;
pub mod cursor;
pub mod filter;
pub mod plan;
pub mod retry;
pub mod schedule;
pub mod state;

pub use conflict::conflict_copy_path;
pub use cursor::{DeletionPlan, SyncCursor, WIPE_GUARD_RATIO};
pub use filter::{PathFilter, PatternError, STATE_DIR};
pub use plan::{plan, PlannedAction, SyncMode};
pub use retry::{is_terminal_status, RetryPolicy};
pub use schedule::{SchedulePolicy, Trigger};
pub use state::{calculate_backoff, Action, ChannelEvent, ConnectionState, Event};
