//! Config command - Print or write the default configuration.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};

use forge_heal::{ConfigFormat, ForgeConfig};

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Toml,
    Yaml,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Write the configuration to this file instead of stdout (format from extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Format used when printing to stdout
    #[arg(long, value_enum, default_value = "toml")]
    format: Format,
}

pub async fn execute(args: ConfigArgs) -> Result<()> {
    let config = ForgeConfig::default();

    match args.output {
        Some(path) => {
            config.save(&path)?;
            println!("✅ Wrote default configuration to {}", path.display());
        }
        None => {
            let format = match args.format {
                Format::Toml => ConfigFormat::Toml,
                Format::Yaml => ConfigFormat::Yaml,
            };
            print!("{}", config.render(format)?);
        }
    }

    Ok(())
}
