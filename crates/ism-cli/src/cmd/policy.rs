use super::Workspace;
use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use ism_core::{
    policy::Policy,
    store::{PolicySortField, PolicyStore, SearchQuery, SortDirection},
};
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum PolicySubcommand {
    /// Show a stored policy with its version
    Get { id: String },
    /// Create a policy, or update one when the current version is given
    Put {
        id: String,
        /// Policy JSON, bare or wrapped in {"policy": ...}
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        seq_no: Option<u64>,
        #[arg(long)]
        primary_term: Option<u64>,
    },
    /// Delete a policy
    Delete { id: String },
    /// List or search stored policies
    List {
        /// Terms that must all occur in the id or description
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long, default_value_t = 0)]
        from: usize,
        #[arg(long, default_value_t = 20)]
        size: usize,
        /// id, description or last_updated_time
        #[arg(long, default_value = "id")]
        sort: String,
        #[arg(long)]
        desc: bool,
    },
}

pub fn run(root: &Path, subcmd: PolicySubcommand, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::open(root)?;
    match subcmd {
        PolicySubcommand::Get { id } => get(&ws, &id, json),
        PolicySubcommand::Put {
            id,
            file,
            seq_no,
            primary_term,
        } => put(&ws, &id, &file, seq_no, primary_term, json),
        PolicySubcommand::Delete { id } => delete(&ws, &id, json),
        PolicySubcommand::List {
            search,
            from,
            size,
            sort,
            desc,
        } => {
            let query = SearchQuery {
                query: search,
                from,
                size,
                sort_field: sort.parse::<PolicySortField>()?,
                sort_direction: if desc {
                    SortDirection::Desc
                } else {
                    SortDirection::Asc
                },
            };
            list(&ws, &query, json)
        }
    }
}

fn get(ws: &Workspace, id: &str, json: bool) -> anyhow::Result<()> {
    let doc = ws.store.get(id)?;
    if json {
        return print_json(&doc);
    }
    println!("Policy:      {}", doc.id);
    println!("Version:     {}", doc.version);
    println!("Updated:     {}", doc.last_updated_time.to_rfc3339());
    if !doc.policy.description.is_empty() {
        println!("Description: {}", doc.policy.description);
    }
    println!("Default:     {}", doc.policy.default_state);
    for state in &doc.policy.states {
        let actions: Vec<&str> = state.actions.iter().map(|a| a.name()).collect();
        let targets: Vec<&str> = state
            .transitions
            .iter()
            .map(|t| t.state_name.as_str())
            .collect();
        println!(
            "  {} [{}] -> {}",
            state.name,
            actions.join(", "),
            if targets.is_empty() {
                "(end)".to_string()
            } else {
                targets.join(" | ")
            }
        );
    }
    Ok(())
}

fn put(
    ws: &Workspace,
    id: &str,
    file: &Path,
    seq_no: Option<u64>,
    primary_term: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let policy = Policy::from_json(&text)?;
    let outcome = ws
        .store
        .put_with(id, policy, seq_no, primary_term)
        .with_context(|| format!("failed to store policy '{id}'"))?;

    if json {
        print_json(&outcome)?;
    } else {
        println!("Stored policy '{}' ({})", outcome.id, outcome.version);
    }
    Ok(())
}

fn delete(ws: &Workspace, id: &str, json: bool) -> anyhow::Result<()> {
    ws.store.delete(id)?;
    if json {
        print_json(&serde_json::json!({ "id": id, "deleted": true }))?;
    } else {
        println!("Deleted policy '{id}'");
    }
    Ok(())
}

fn list(ws: &Workspace, query: &SearchQuery, json: bool) -> anyhow::Result<()> {
    let page = ws.store.search(query)?;
    if json {
        return print_json(&page);
    }
    if page.items.is_empty() {
        println!("No policies.");
        return Ok(());
    }
    let rows = page
        .items
        .iter()
        .map(|d| {
            vec![
                d.id.clone(),
                d.version.seq_no.to_string(),
                d.version.primary_term.to_string(),
                d.policy.states.len().to_string(),
                d.policy.description.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "SEQ", "TERM", "STATES", "DESCRIPTION"], rows);
    println!("{} of {} shown", page.items.len(), page.total);
    Ok(())
}
