//! Defaults command - Print a family's default profile.

use anyhow::{Context, Result};
use clap::Args;

use trellis_constructs::{default_fragment_for, profiles, DefaultContext, ProfileFamily};
use trellis_core::{Environment, TemplateFormat};

use super::parse_format;

#[derive(Args)]
pub struct DefaultsArgs {
    /// Resource family (storage, network, security-group, cache, catalog-database, catalog-table, compute)
    #[arg(long)]
    family: Option<String>,

    /// Profile variant; the family default when omitted
    #[arg(long)]
    variant: Option<String>,

    /// Construct id used for generated names
    #[arg(long, default_value = "Resource")]
    name: String,

    /// Deployment account
    #[arg(long)]
    account: Option<String>,

    /// Deployment region
    #[arg(long)]
    region: Option<String>,

    /// Output format: json or yaml
    #[arg(short, long, default_value = "yaml")]
    format: String,

    /// List every registered profile
    #[arg(long)]
    list: bool,
}

pub fn execute(args: DefaultsArgs) -> Result<()> {
    if args.list {
        println!("{:<18} {:<16} {:<8} DESCRIPTION", "FAMILY", "VARIANT", "VERSION");
        for profile in profiles() {
            let variant = if profile.is_default {
                format!("{}*", profile.variant)
            } else {
                profile.variant.to_string()
            };
            println!(
                "{:<18} {:<16} {:<8} {}",
                profile.family.as_str(),
                variant,
                profile.version,
                profile.description
            );
        }
        return Ok(());
    }

    let family_name = args
        .family
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("Missing argument --family (or use --list)"))?;
    let family =
        ProfileFamily::from_str(family_name).ok_or_else(|| anyhow::anyhow!("Unknown family: {}", family_name))?;
    let format = parse_format(&args.format)?;

    let environment = Environment {
        account: args.account,
        region: args.region,
    };
    let ctx = DefaultContext::new(&environment, &args.name);
    let fragment = default_fragment_for(family, args.variant.as_deref(), &ctx)
        .with_context(|| format!("Failed to resolve {} defaults", family))?;

    let rendered = match format {
        TemplateFormat::Json => serde_json::to_string_pretty(&fragment)?,
        TemplateFormat::Yaml => serde_yaml::to_string(&fragment)?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}
