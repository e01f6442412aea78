//! CLI command implementations.

pub mod deobfuscate;
pub mod hash;
pub mod transformers;

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

/// Read a source file, or stdin for `-`
pub fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .context("Failed to read stdin")?;
        return Ok(source);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
