use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use ism_core::jobs::JobDefinition;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum JobSubcommand {
    /// Check a rollup or transform definition (JSON or YAML)
    Validate { file: PathBuf },
}

pub fn run(subcmd: JobSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        JobSubcommand::Validate { file } => validate(&file, json),
    }
}

fn validate(file: &Path, json: bool) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let job = JobDefinition::parse(&text)
        .with_context(|| format!("{} is not a valid job definition", file.display()))?;
    if json {
        print_json(&serde_json::json!({ "kind": job.kind(), "valid": true, "job": job }))?;
    } else {
        println!("Valid {} job.", job.kind());
    }
    Ok(())
}
