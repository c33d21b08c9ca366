use super::{now_or, Workspace};
use crate::output::{or_dash, print_json, print_table};
use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use ism_core::{
    catalog::IndexRecord,
    units::{ByteSize, TimeValue},
};
use std::path::Path;

#[derive(Subcommand)]
pub enum IndexSubcommand {
    /// Add an index to the catalog
    Create {
        name: String,
        #[arg(long, default_value_t = 0)]
        docs: u64,
        /// Store size, e.g. 512mb
        #[arg(long)]
        size: Option<ByteSize>,
        /// Backdate the creation date, e.g. 30d
        #[arg(long)]
        age: Option<TimeValue>,
        /// Write alias rollover moves to the next index
        #[arg(long)]
        rollover_alias: Option<String>,
        /// Make the named action fail on this index (repeatable)
        #[arg(long = "fail")]
        fail: Vec<String>,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Change an index's document count, size, rollover alias or injected failures
    Update {
        name: String,
        #[arg(long)]
        docs: Option<u64>,
        #[arg(long)]
        size: Option<ByteSize>,
        #[arg(long)]
        rollover_alias: Option<String>,
        #[arg(long = "fail")]
        fail: Vec<String>,
        /// Drop every injected failure before applying --fail
        #[arg(long)]
        clear_fail: bool,
    },
    /// List catalog indices
    List,
    /// Show one index record
    Show { name: String },
}

pub fn run(root: &Path, subcmd: IndexSubcommand, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::open(root)?;
    match subcmd {
        IndexSubcommand::Create {
            name,
            docs,
            size,
            age,
            rollover_alias,
            fail,
            at,
        } => {
            let backdate = age.map_or_else(chrono::Duration::zero, |a| a.duration());
            let created = now_or(at)
                .checked_sub_signed(backdate)
                .context("--age reaches before the earliest representable date")?;
            let mut record = IndexRecord::new(&name, created);
            record.doc_count = docs;
            record.size_bytes = size.map_or(0, |s| s.bytes());
            record.rollover_alias = rollover_alias;
            record.fail_actions.extend(fail);
            let record = ws.catalog.insert(record)?;
            ws.save()?;
            if json {
                print_json(&record)?;
            } else {
                println!("Created index '{}' ({})", record.name, record.uuid);
            }
            Ok(())
        }
        IndexSubcommand::Update {
            name,
            docs,
            size,
            rollover_alias,
            fail,
            clear_fail,
        } => {
            let record = ws
                .catalog
                .update(&name, |rec| {
                    if let Some(n) = docs {
                        rec.doc_count = n;
                    }
                    if let Some(s) = &size {
                        rec.size_bytes = s.bytes();
                    }
                    if let Some(alias) = &rollover_alias {
                        rec.rollover_alias = Some(alias.clone());
                    }
                    if clear_fail {
                        rec.fail_actions.clear();
                    }
                    rec.fail_actions.extend(fail);
                    rec.clone()
                })
                .with_context(|| format!("cannot update index '{name}'"))?;
            ws.save()?;
            if json {
                print_json(&record)?;
            } else {
                println!("Updated index '{name}'");
            }
            Ok(())
        }
        IndexSubcommand::List => list(&ws, json),
        IndexSubcommand::Show { name } => {
            let record = ws.catalog.get(&name)?;
            if json {
                return print_json(&record);
            }
            println!("Index:     {}", record.name);
            println!("UUID:      {}", record.uuid);
            println!("Created:   {}", record.creation_date.to_rfc3339());
            println!("Docs:      {}", record.doc_count);
            println!("Size:      {} bytes", record.size_bytes);
            println!("Closed:    {}", record.closed);
            println!("Read-only: {}", record.read_only);
            println!("Replicas:  {}", record.number_of_replicas);
            println!("Priority:  {}", or_dash(record.priority));
            println!("Segments:  {}", or_dash(record.segments));
            println!("Alias:     {}", or_dash(record.rollover_alias.as_deref()));
            if !record.fail_actions.is_empty() {
                let failing: Vec<&str> = record.fail_actions.iter().map(String::as_str).collect();
                println!("Failing:   {}", failing.join(", "));
            }
            Ok(())
        }
    }
}

fn list(ws: &Workspace, json: bool) -> anyhow::Result<()> {
    let records = ws.catalog.list();
    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No indices.");
        return Ok(());
    }
    let rows = records
        .iter()
        .map(|r| {
            let managed = ws
                .registry
                .read(&r.name)
                .map_or_else(|| "-".to_string(), |m| m.policy_id);
            vec![
                r.name.clone(),
                r.doc_count.to_string(),
                r.size_bytes.to_string(),
                r.creation_date.format("%Y-%m-%d").to_string(),
                managed,
            ]
        })
        .collect();
    print_table(&["INDEX", "DOCS", "BYTES", "CREATED", "POLICY"], rows);
    Ok(())
}
