//! Shared helper functions for CLI commands.

use std::path::PathBuf;

use anyhow::Context;

use mfk_invoices::config::resolve_path;

/// Resolve the output directory argument and make sure it exists.
///
/// `~` is expanded and relative paths are taken from the working directory.
pub fn prepare_output_dir(raw: &str) -> anyhow::Result<PathBuf> {
    let cwd = std::env::current_dir().context("failed to get current directory")?;
    let dir = resolve_path(raw, &cwd);

    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;

    Ok(dir)
}
