//! CLI command definitions.

use clap::{Parser, Subcommand};

pub mod defaults;
pub mod stack_name;
pub mod synth;
pub mod validate;

/// trellis - best-practice infrastructure patterns compiled into deployment templates
#[derive(Parser)]
#[command(name = "trellis")]
#[command(version, about = "trellis - infrastructure patterns compiled into deployment templates")]
#[command(long_about = r#"
trellis merges partial pattern configuration over opinionated defaults,
validates the result and writes a deterministic deployment template.

COMMANDS:
  synth       → Assemble an app definition and write its template
  validate    → Assemble an app definition and report what it declares
  defaults    → Print the default profile of a resource family
  stack-name  → Print the stack name for an integration file

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Validation failure
  4 - Configuration error
  5 - Synthesis error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synthesize the template of an app definition
    Synth(synth::SynthArgs),

    /// Assemble an app definition without writing a template
    Validate(validate::ValidateArgs),

    /// Print a family's default profile
    Defaults(defaults::DefaultsArgs),

    /// Print the integration stack name for a file name
    #[command(name = "stack-name")]
    StackName(stack_name::StackNameArgs),
}

/// Parse an output format flag.
pub fn parse_format(value: &str) -> anyhow::Result<trellis_core::TemplateFormat> {
    trellis_core::TemplateFormat::from_str(value)
        .ok_or_else(|| anyhow::anyhow!("Unknown format '{}', expected json or yaml (argument --format)", value))
}
