//! Bundle command - Build a preview bundle from a project directory.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use forge_bundler::{BundleResult, Bundler};

use super::{load_config, load_sources, CommandError};

#[derive(Args)]
pub struct BundleArgs {
    /// Project directory to bundle
    dir: PathBuf,

    /// Directory to write bundle.js and bundle.css into
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Configuration file (defaults to <DIR>/forge.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,
}

pub(crate) fn print_result(result: &BundleResult) {
    if let Some(entry) = &result.entry_point {
        let mode = if entry.is_self_mounting { "self-mounting" } else { "wrapped" };
        println!("📦 Entry: {} ({})", entry.file, mode);
    }

    if result.success {
        println!(
            "   ✅ Bundled {} bytes of JS, {} bytes of CSS",
            result.code.len(),
            result.css.len()
        );
    } else {
        println!("   ❌ Build failed:");
        for error in &result.errors {
            println!("      - {}", error);
        }
    }

    if !result.externals.is_empty() {
        println!("   📚 Externals: {}", result.externals.join(", "));
    }
    for warning in &result.warnings {
        println!("   ⚠️  {}", warning);
    }
}

pub async fn execute(args: BundleArgs) -> Result<()> {
    let files = load_sources(&args.dir)?;
    let config = load_config(&args.dir, args.config.as_ref())?;
    info!("Bundling {} file(s) from {}", files.len(), args.dir.display());

    let bundler = Bundler::new().with_options(config.bundler);
    let result = bundler.bundle(&files).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    if !result.success {
        return Err(CommandError::BuildFailed(result.errors.len()).into());
    }

    if let Some(out) = &args.out {
        fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
        fs::write(out.join("bundle.js"), &result.code)?;
        fs::write(out.join("bundle.css"), &result.css)?;
        if !args.json {
            println!("   💾 Wrote {}", out.display());
        }
    }

    Ok(())
}
