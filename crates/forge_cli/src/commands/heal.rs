//! Heal command - Repair a project until it bundles.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use forge_heal::{FixSource, Healer, PatchOnlyRepairService};

use super::bundle::print_result;
use super::{load_config, load_sources, CommandError};

#[derive(Args)]
pub struct HealArgs {
    /// Project directory to heal
    dir: PathBuf,

    /// Configuration file (defaults to <DIR>/forge.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write patched files back into DIR
    #[arg(short, long)]
    write: bool,

    /// Print the heal report as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: HealArgs) -> Result<()> {
    let files = load_sources(&args.dir)?;
    let config = load_config(&args.dir, args.config.as_ref())?;
    info!("Healing {} file(s) from {}", files.len(), args.dir.display());

    let healer = Healer::from_config(&config, Arc::new(PatchOnlyRepairService))?;
    let report = healer.heal(files).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("🩺 Healing finished after {} round(s)", report.rounds);
        for fix in &report.applied {
            let via = match fix.source {
                FixSource::Patch => "patch",
                FixSource::Repair => "repair",
            };
            println!("   🔧 {} [{}]: {} ({})", fix.target_file, fix.kind, fix.description, via);
        }
        for diagnosis in &report.remaining {
            println!("   ❗ [{}] {}", diagnosis.kind, diagnosis.message);
        }
        print_result(&report.result);
    }

    if args.write {
        for key in &report.modified {
            let path = args.dir.join(key);
            fs::write(&path, &report.files[key]).with_context(|| format!("writing {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        if !args.json && !report.modified.is_empty() {
            println!("   💾 Updated {} file(s)", report.modified.len());
        }
    }

    if !report.success {
        return Err(CommandError::HealIncomplete(report.remaining.len()).into());
    }
    Ok(())
}
