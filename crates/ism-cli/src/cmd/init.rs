use anyhow::Context;
use ism_core::{config::Config, io, paths, store::RedbPolicyStore};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing ISM in: {}", root.display());

    let dir = paths::ism_dir(root);
    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let config = serde_yaml::to_string(&Config::default())?;
    let created = io::write_if_missing(&paths::config_path(root), config.as_bytes())
        .context("failed to write ism.yaml")?;
    report(created, paths::CONFIG_FILE);

    let db = paths::policy_db_path(root);
    let existed = db.exists();
    RedbPolicyStore::open(&db).context("failed to create policy store")?;
    report(!existed, paths::POLICY_DB_FILE);

    for (path, label, empty) in [
        (paths::registry_path(root), paths::REGISTRY_FILE, "indices: {}\n"),
        (paths::catalog_path(root), paths::CATALOG_FILE, "indices: {}\n"),
    ] {
        let created = io::write_if_missing(&path, empty.as_bytes())
            .with_context(|| format!("failed to write {label}"))?;
        report(created, label);
    }
    Ok(())
}

fn report(created: bool, label: &str) {
    if created {
        println!("  created: {label}");
    } else {
        println!("  exists:  {label}");
    }
}
