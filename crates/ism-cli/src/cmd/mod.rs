pub mod change_policy;
pub mod config;
pub mod explain;
pub mod index;
pub mod init;
pub mod job;
pub mod manage;
pub mod policy;
pub mod retry;
pub mod tick;

use anyhow::Context;
use chrono::{DateTime, Utc};
use ism_core::{
    catalog::IndexCatalog, config::Config, notify::TracingNotifier, paths,
    registry::ManagedIndexRegistry, store::RedbPolicyStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a command needs, loaded from the data directory. Mutating
/// commands call [`Workspace::save`] once they are done.
pub struct Workspace {
    root: PathBuf,
    pub config: Config,
    pub store: RedbPolicyStore,
    pub registry: ManagedIndexRegistry,
    pub catalog: Arc<IndexCatalog>,
    pub notifier: TracingNotifier,
}

impl Workspace {
    pub fn open(root: &Path) -> anyhow::Result<Self> {
        let config = Config::load(root).context("failed to load ism.yaml")?;
        let store = RedbPolicyStore::open(&paths::policy_db_path(root))
            .context("failed to open policy store")?;
        let registry = ManagedIndexRegistry::load(&paths::registry_path(root))
            .context("failed to load managed index registry")?;
        let catalog = IndexCatalog::load(&paths::catalog_path(root))
            .context("failed to load index catalog")?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
            store,
            registry,
            catalog: Arc::new(catalog),
            notifier: TracingNotifier,
        })
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.registry
            .save(&paths::registry_path(&self.root))
            .context("failed to save managed index registry")?;
        self.catalog
            .save(&paths::catalog_path(&self.root))
            .context("failed to save index catalog")?;
        Ok(())
    }
}

/// `--at` override for commands that depend on the clock.
pub fn now_or(at: Option<DateTime<Utc>>) -> DateTime<Utc> {
    at.unwrap_or_else(Utc::now)
}
