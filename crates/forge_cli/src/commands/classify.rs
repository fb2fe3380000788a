//! Classify command - Diagnose raw error text.

use std::io::Read;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use forge_diagnostics::{classify_many, is_auto_fixable, ClassifiedError};

use super::CommandError;

#[derive(Args)]
pub struct ClassifyArgs {
    /// Raw error texts to classify
    errors: Vec<String>,

    /// Also read errors from stdin, separated by blank lines
    #[arg(long)]
    stdin: bool,

    /// Print diagnoses as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Diagnosis<'a> {
    #[serde(flatten)]
    error: &'a ClassifiedError,
    label: &'static str,
    auto_fixable: bool,
}

/// Split stdin text into errors: blank lines separate entries.
fn split_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }
    blocks
}

pub async fn execute(args: ClassifyArgs) -> Result<()> {
    let mut raws = args.errors;
    if args.stdin {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("reading errors from stdin")?;
        raws.extend(split_blocks(&text));
    }
    if raws.is_empty() {
        return Err(CommandError::InvalidArgs("no error text given (pass ERRORS or --stdin)".into()).into());
    }

    let diagnoses = classify_many(&raws);

    if args.json {
        let out: Vec<Diagnosis> = diagnoses
            .iter()
            .map(|error| Diagnosis {
                error,
                label: error.kind.label(),
                auto_fixable: is_auto_fixable(error),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for error in &diagnoses {
        let fixable = if is_auto_fixable(error) { "auto-fixable" } else { "manual" };
        println!(
            "🔎 [{}] {} ({:.2}, {})",
            error.kind,
            error.kind.label(),
            error.confidence,
            fixable
        );
        println!("   {}", error.message);
        if let Some(location) = error.location() {
            println!("   at {}", location);
        }
        println!("   💡 {}", error.suggestion);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_blocks() {
        let text = "TypeError: x is not a function\n    at a.ts:1:2\n\n\nUnterminated string literal\n";
        assert_eq!(
            split_blocks(text),
            vec![
                "TypeError: x is not a function\n    at a.ts:1:2".to_string(),
                "Unterminated string literal".to_string(),
            ]
        );
        assert!(split_blocks("\n \n").is_empty());
    }
}
