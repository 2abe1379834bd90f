//! Validate command - Assemble an app definition and summarize it.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use trellis_cli::AppDefinition;

#[derive(Args)]
pub struct ValidateArgs {
    /// App definition file (YAML or JSON)
    #[arg(short, long)]
    app: PathBuf,

    /// List suppressed checks per resource
    #[arg(long)]
    show_suppressions: bool,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    info!("Validating {:?}", args.app);

    let app = AppDefinition::from_file(&args.app)
        .with_context(|| format!("Failed to load app definition {:?}", args.app))?;
    let tree = app.build().context("Validation failed")?;

    println!("📋 Stack '{}'", app.stack.name);
    for pattern in &app.patterns {
        let owned = tree.declarations().iter().filter(|d| d.owner() == pattern.id).count();
        println!("   ✅ {} '{}': {} resources", pattern.pattern_type, pattern.id, owned);
    }

    let mut families: BTreeMap<&str, usize> = BTreeMap::new();
    for declaration in tree.declarations() {
        *families.entry(declaration.family().as_str()).or_default() += 1;
    }
    for (family, count) in &families {
        println!("   {:<10} {}", family, count);
    }

    if args.show_suppressions {
        println!("🔒 Suppressed checks:");
        for declaration in tree.declarations().iter().filter(|d| !d.suppressions().is_empty()) {
            for suppression in declaration.suppressions() {
                println!(
                    "   {} {}: {}",
                    declaration.logical_id(),
                    suppression.check(),
                    suppression.reason()
                );
            }
        }
    }

    println!();
    println!("✅ {} resources passed validation", tree.len());
    Ok(())
}
