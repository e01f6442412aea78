//! Transformers command - list the built-in passes.

use anyhow::Result;
use clap::Args;
use unshroud::{DEFAULT_TRANSFORMERS, TransformerKind};

#[derive(Args)]
pub struct TransformersCommand {
    /// Show the default pass order instead of the pass list
    #[arg(long)]
    pub order: bool,

    /// Print JSON
    #[arg(long)]
    pub json: bool,
}

impl TransformersCommand {
    pub fn run(&self) -> Result<()> {
        println!("{}", self.render()?);
        Ok(())
    }

    fn render(&self) -> Result<String> {
        if self.order {
            let names: Vec<&str> = DEFAULT_TRANSFORMERS.iter().map(|kind| kind.name()).collect();
            return Ok(if self.json {
                serde_json::to_string_pretty(&names)?
            } else {
                names.join("\n")
            });
        }

        if self.json {
            let passes: serde_json::Map<String, serde_json::Value> = TransformerKind::ALL
                .iter()
                .map(|kind| (kind.name().to_string(), kind.default_options()))
                .collect();
            return Ok(serde_json::to_string_pretty(&passes)?);
        }

        let lines: Vec<String> = TransformerKind::ALL
            .iter()
            .map(|kind| format!("{:<24} {}", kind.name(), kind.default_options()))
            .collect();
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_has_every_pass() {
        let command = TransformersCommand {
            order: false,
            json: false,
        };
        let text = command.render().unwrap();
        for kind in TransformerKind::ALL {
            assert!(text.contains(kind.name()), "{text}");
        }
        assert!(text.contains("remove_decoders"));
    }

    #[test]
    fn test_default_order_json() {
        let command = TransformersCommand {
            order: true,
            json: true,
        };
        let names: Vec<String> = serde_json::from_str(&command.render().unwrap()).unwrap();
        assert_eq!(names.len(), 16);
        assert_eq!(names[0], "Simplify");
        assert_eq!(names[15], "DeadCode");
    }
}
