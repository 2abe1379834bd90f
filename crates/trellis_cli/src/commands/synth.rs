//! Synth command - Write the template of an app definition.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use trellis_cli::AppDefinition;

use super::parse_format;

#[derive(Args)]
pub struct SynthArgs {
    /// App definition file (YAML or JSON)
    #[arg(short, long)]
    app: PathBuf,

    /// Write the template here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Template format: json or yaml
    #[arg(short, long, default_value = "json")]
    format: String,
}

pub fn execute(args: SynthArgs) -> Result<()> {
    let format = parse_format(&args.format)?;
    info!("Synthesizing {:?}", args.app);

    let app = AppDefinition::from_file(&args.app)
        .with_context(|| format!("Failed to load app definition {:?}", args.app))?;
    let tree = app.build().context("Failed to assemble patterns")?;
    let template = tree.synthesize().context("Failed to synthesize template")?;

    match &args.output {
        Some(path) => {
            template.write_to(path, format)?;
            println!("✅ Wrote {} resources to {}", tree.len(), path.display());
        }
        None => println!("{}", template.render(format)?),
    }
    Ok(())
}
