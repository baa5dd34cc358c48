//! Wiring of the default collaborators for one process.

use std::sync::Arc;

use crate::chain::ChainExecutor;
use crate::config::Config;
use crate::orchestrator::{FileStore, ManagerCache, Orchestrator};
use crate::profile::FileProfileSource;
use crate::registry::PhaseRegistry;
use crate::ui::PipelineUI;

/// Shared registry, stores and manager cache. Orchestrators built from the
/// same `Pipeline` share in-memory state managers.
#[derive(Clone)]
pub struct Pipeline {
    registry: Arc<PhaseRegistry>,
    store: Arc<FileStore>,
    profiles: Arc<FileProfileSource>,
    managers: Arc<ManagerCache>,
}

impl Pipeline {
    pub fn from_config(config: &Config) -> Self {
        Self::with_registry(config, PhaseRegistry::with_builtin())
    }

    pub fn with_registry(config: &Config, registry: PhaseRegistry) -> Self {
        let store = Arc::new(FileStore::new(&config.sessions_dir, &config.reports_dir));
        let managers = Arc::new(ManagerCache::new(
            store.clone(),
            config.cache_capacity,
            config.cache_idle_ttl,
        ));
        Self {
            registry: Arc::new(registry),
            store,
            profiles: Arc::new(FileProfileSource::new(&config.profiles_dir)),
            managers,
        }
    }

    pub fn registry(&self) -> &PhaseRegistry {
        &self.registry
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub fn profiles(&self) -> &FileProfileSource {
        &self.profiles
    }

    pub fn orchestrator(&self, subject_id: &str, ui: Option<Arc<PipelineUI>>) -> Orchestrator {
        let orchestrator = Orchestrator::new(
            subject_id,
            self.registry.clone(),
            self.profiles.clone(),
            self.store.clone(),
            self.managers.clone(),
        );
        match ui {
            Some(ui) => orchestrator.with_ui(ui),
            None => orchestrator,
        }
    }

    pub fn chains(&self) -> ChainExecutor {
        ChainExecutor::new(self.registry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliOverrides;
    use seoflow_common::Profile;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_pipeline_runs_against_config_paths() {
        let dir = TempDir::new().unwrap();
        let config = Config::resolve(dir.path().to_path_buf(), CliOverrides::default(), |_| None)
            .unwrap();
        config.ensure_directories().unwrap();

        let pipeline = Pipeline::from_config(&config);
        let mut profile = Profile::new();
        profile.insert("business_name".into(), json!("Acme"));
        pipeline.profiles().save_profile("u1", &profile).await.unwrap();
        pipeline
            .profiles()
            .save_selected_keywords("u1", &["crm".to_string()])
            .await
            .unwrap();

        let results = pipeline.orchestrator("u1", None).run_complete_workflow().await;
        assert!(results.is_success(), "{:?}", results.error);
        assert!(pipeline.store().state_path("u1").starts_with(&config.sessions_dir));
        assert_eq!(pipeline.store().list_reports("u1").unwrap().len(), 1);
    }
}
