//! Paths, settings and the objects built from them.

use aftp::layer::{LoggingLayer, RetryLayer};
use aftp::provider::ollama;
use aftp::runtime::{Installer, RuntimeCatalog, RuntimeLayout, RuntimeProbe, RuntimeRegistry};
use aftp::{AppPaths, ChatExecutor, ConversationStore, ModelHandleRegistry, Settings};
use std::path::Path;
use std::sync::Arc;

pub(crate) struct App {
    pub paths: AppPaths,
    pub settings: Settings,
}

impl App {
    pub fn load(root: Option<&Path>, host: Option<&str>) -> Self {
        let paths = match root {
            Some(root) => AppPaths::rooted(root),
            None => AppPaths::discover(),
        };
        let mut settings = Settings::load(&paths.settings_path);
        if let Some(host) = host {
            settings.ollama_host = Some(host.to_string());
        }
        tracing::debug!("paths: {:?}", paths);
        Self { paths, settings }
    }

    pub fn conversations(&self) -> Arc<ConversationStore> {
        Arc::new(ConversationStore::new(&self.paths.conversations_dir))
    }

    pub fn executor(&self) -> anyhow::Result<ChatExecutor> {
        let service = ollama(self.settings.service_config())?;
        Ok(ChatExecutor::builder(service)
            .layer(RetryLayer::new().with_max_retries(2))
            .layer(LoggingLayer::new())
            .conversations(self.conversations())
            .finish())
    }

    pub fn probe(&self) -> RuntimeProbe {
        RuntimeProbe::new(
            RuntimeLayout::from_settings(&self.paths, &self.settings),
            RuntimeCatalog::builtin().clone(),
        )
        .with_timeout(self.settings.probe_timeout())
    }

    pub fn registry(&self) -> RuntimeRegistry {
        RuntimeRegistry::new(&self.paths.runtime_registry_path, Arc::new(self.probe()))
            .with_concurrency(self.settings.probe_concurrency)
    }

    pub fn installer(&self) -> Installer {
        Installer::new(&self.paths.scripts_dir).with_timeout(self.settings.installer_timeout())
    }

    pub fn models(&self) -> ModelHandleRegistry {
        ModelHandleRegistry::new(&self.paths.model_registry_path)
    }
}
