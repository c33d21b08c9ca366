use super::Workspace;
use crate::output::{or_dash, print_json, print_table};
use ism_core::managed::ManagedIndexItem;
use ism_core::registry::ManagedIndexQuery;
use std::path::Path;

/// Show managed-index metadata. Named indices are shown as given; otherwise
/// the fleet is filtered, sorted and paged by `query`.
pub fn run(
    root: &Path,
    indices: &[String],
    query: &ManagedIndexQuery,
    json: bool,
) -> anyhow::Result<()> {
    let ws = Workspace::open(root)?;

    if indices.is_empty() {
        let page = ws.registry.search(query);
        if json {
            return print_json(&page);
        }
        if page.managed_indices.is_empty() {
            println!("No managed indices.");
            return Ok(());
        }
        print_items(&page.managed_indices);
        let shown = page.managed_indices.len();
        if shown < page.total_managed_indices {
            println!(
                "\n{shown} of {} managed indices (from {})",
                page.total_managed_indices, query.from
            );
        }
        return Ok(());
    }

    let items: Vec<ManagedIndexItem> = indices
        .iter()
        .map(|name| {
            ws.registry
                .item(name)
                .ok_or_else(|| anyhow::anyhow!("index '{name}' is not being managed"))
        })
        .collect::<anyhow::Result<_>>()?;

    if json {
        let metadata: Vec<_> = items.iter().filter_map(|i| i.metadata.as_ref()).collect();
        return print_json(&metadata);
    }
    print_items(&items);
    Ok(())
}

fn print_items(items: &[ManagedIndexItem]) {
    let rows = items
        .iter()
        .map(|item| {
            let meta = item.metadata.as_ref();
            vec![
                item.index.clone(),
                item.policy_id.clone(),
                or_dash(meta.and_then(|m| m.state_name())),
                or_dash(meta.and_then(|m| m.action.as_ref()).map(|a| a.name.as_str())),
                item.status().to_string(),
                or_dash(meta.and_then(|m| m.info_message())),
            ]
        })
        .collect();
    print_table(&["INDEX", "POLICY", "STATE", "ACTION", "STATUS", "INFO"], rows);
}
