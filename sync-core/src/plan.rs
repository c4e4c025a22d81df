//! Sync modes and instruction planning.
//!
//! The remote store always answers with the full set of instructions for a
//! manifest. The configured [`SyncMode`] decides which of them this device
//! acts on and how conflicts are resolved.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use vaultsync_types::{FileId, Instruction, RemoteVersion};

/// Direction of synchronization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Upload and download, with keep-both conflict handling.
    #[default]
    Bidirectional,
    /// Only send local changes; conflicts resolve as local-wins.
    Push,
    /// Only apply remote changes; conflicts resolve as server-wins.
    Pull,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bidirectional => "bidirectional",
            Self::Push => "push",
            Self::Pull => "pull",
        })
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bidirectional" | "both" => Ok(Self::Bidirectional),
            "push" => Ok(Self::Push),
            "pull" => Ok(Self::Pull),
            other => Err(format!("unknown sync mode: {other}")),
        }
    }
}

/// What the executor does for one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    /// Send the local file.
    Upload {
        /// Target path.
        path: String,
    },
    /// Fetch and write the remote file.
    Download {
        /// Target path.
        path: String,
        /// Remote file to fetch.
        file_id: FileId,
    },
    /// Remove the local file.
    Delete {
        /// Target path.
        path: String,
    },
    /// Save the remote version as a conflict copy, then upload the local one.
    KeepBoth {
        /// Target path.
        path: String,
        /// Remote head, if any.
        remote: Option<RemoteVersion>,
    },
    /// Upload the local version over the remote head.
    LocalWins {
        /// Target path.
        path: String,
    },
    /// Overwrite the local file with the remote head.
    ServerWins {
        /// Target path.
        path: String,
        /// Remote head.
        file_id: FileId,
    },
}

impl PlannedAction {
    /// Path this action targets.
    pub fn path(&self) -> &str {
        match self {
            Self::Upload { path }
            | Self::Download { path, .. }
            | Self::Delete { path }
            | Self::KeepBoth { path, .. }
            | Self::LocalWins { path }
            | Self::ServerWins { path, .. } => path,
        }
    }
}

/// Map an instruction to an action under `mode`, or `None` if the mode
/// ignores it.
pub fn plan(instruction: Instruction, mode: SyncMode) -> Option<PlannedAction> {
    match (instruction, mode) {
        (Instruction::Upload { path }, SyncMode::Bidirectional | SyncMode::Push) => {
            Some(PlannedAction::Upload { path })
        }
        (Instruction::Upload { .. }, SyncMode::Pull) => None,

        (Instruction::Download { path, file_id, .. }, SyncMode::Bidirectional | SyncMode::Pull) => {
            Some(PlannedAction::Download { path, file_id })
        }
        (Instruction::Download { .. }, SyncMode::Push) => None,

        (Instruction::Delete { path }, SyncMode::Bidirectional | SyncMode::Pull) => {
            Some(PlannedAction::Delete { path })
        }
        (Instruction::Delete { .. }, SyncMode::Push) => None,

        (Instruction::Conflict { path, remote }, SyncMode::Bidirectional) => {
            Some(PlannedAction::KeepBoth { path, remote })
        }
        (Instruction::Conflict { path, .. }, SyncMode::Push) => {
            Some(PlannedAction::LocalWins { path })
        }
        (Instruction::Conflict { path, remote }, SyncMode::Pull) => {
            remote.map(|remote| PlannedAction::ServerWins {
                path,
                file_id: remote.file_id,
            })
        }
    }
}
