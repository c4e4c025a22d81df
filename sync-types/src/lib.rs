//! # sync-types
//!
//! Wire format types for the vaultsync remote store contract.
//!
//! This crate provides the foundational types used across all vaultsync crates:
//! - [`DeviceId`], [`FileId`] - Identity types
//! - [`ManifestEntry`] - One file in a content-addressed local snapshot
//! - [`DeltaRequest`], [`SyncInstruction`], [`Instruction`] - Reconciliation exchange
//! - [`Notification`] - Real-time channel messages
//! - [`SyncError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod manifest;
mod messages;
mod notification;

pub use error::SyncError;
pub use ids::{DeviceId, FileId};
pub use manifest::ManifestEntry;
pub use messages::{
    CompleteRequest, CompleteResponse, DeltaRequest, DeltaResponse, EncryptionSaltRequest,
    FixHashRequest, Instruction, LoginRequest, RefreshRequest, RemoteVersion, SyncAction,
    SyncInstruction, TokenPair, UploadRequest, UploadResponse, VaultKeyBody,
};
pub use notification::Notification;
