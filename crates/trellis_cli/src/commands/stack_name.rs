//! Stack-name command - Derive an integration stack name from a file name.

use anyhow::Result;
use clap::Args;

use trellis_core::integ_stack_name;

#[derive(Args)]
pub struct StackNameArgs {
    /// Integration file name, e.g. integ.lambda-s3-existing-bucket.yaml
    file: String,
}

pub fn execute(args: StackNameArgs) -> Result<()> {
    let name = integ_stack_name(&args.file);
    if name.is_empty() {
        anyhow::bail!("Cannot derive a stack name from argument '{}'", args.file);
    }
    println!("{}", name);
    Ok(())
}
