//! Hash command - print the source-identity hash of a file.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use super::read_input;

#[derive(Args)]
pub struct HashCommand {
    /// File to hash (`-` for stdin)
    #[arg(default_value = "-")]
    pub input: PathBuf,

    /// Print in hexadecimal
    #[arg(long)]
    pub hex: bool,
}

impl HashCommand {
    pub fn run(&self) -> Result<()> {
        let source = read_input(&self.input)?;
        println!("{}", self.render(unshroud::source_hash(&source)));
        Ok(())
    }

    fn render(&self, hash: u32) -> String {
        if self.hex {
            format!("{hash:#010x}")
        } else {
            hash.to_string()
        }
    }
}
