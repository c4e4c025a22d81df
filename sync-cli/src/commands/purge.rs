//! Delete a file on the remote store.

use anyhow::{Context, Result};
use std::path::Path;
use vaultsync_types::FileId;

use super::{open_engine, save_session};
use crate::config::Config;

/// Run the purge command.
pub async fn run(data_dir: &Path, file_id: &str) -> Result<()> {
    let config = Config::load(data_dir).await?;
    let engine = open_engine(data_dir, &config).await?;

    let result = engine.purge(&FileId::from(file_id)).await;
    save_session(&engine).await?;
    result.with_context(|| format!("Failed to delete remote file {}", file_id))?;

    println!("Deleted remote file {}", file_id);
    Ok(())
}
