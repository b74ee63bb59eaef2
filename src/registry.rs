/// The registry holds who may call the relay and the configuration parameters it falls back on.
/// It's read from a JSON config file, and when that file changes the registry is updated in
/// place.
///
/// ```json
/// {
///   "callers": { "alice": "token-for-alice" },
///   "params": { "CLAUDE_API_KEY": "sk-ant-..." }
/// }
/// ```
use crate::auth::{CallerIdentity, ConstantTimeString, bearer_token};
use crate::credentials::ParamSource;
use anyhow::anyhow;
use async_trait::async_trait;
use axum::http::HeaderMap;
use dashmap::DashMap;
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, sync::Arc};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// The config file maps caller uids to their bearer tokens, plus a flat map of parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub callers: HashMap<String, ConstantTimeString>,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// The live-updating registry of callers and parameters.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub callers: Arc<DashMap<ConstantTimeString, CallerIdentity>>,
    pub params: Arc<DashMap<String, String>>,
}

#[async_trait]
pub trait RegistryStream {
    async fn receive(
        &self,
    ) -> Result<mpsc::Receiver<Result<Registry, anyhow::Error>>, anyhow::Error>;
}

pub struct WatchedFile(pub PathBuf);

#[async_trait]
impl RegistryStream for WatchedFile {
    /// Watches a file for changes and returns a stream of Registry updates.
    async fn receive(
        &self,
    ) -> Result<mpsc::Receiver<Result<Registry, anyhow::Error>>, anyhow::Error> {
        let (registry_tx, registry_rx) = mpsc::channel(16);
        let (file_tx, mut file_rx) = mpsc::channel(16);

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = file_tx.blocking_send(res);
            },
            NotifyConfig::default(),
        )?;

        watcher.watch(&self.0, RecursiveMode::NonRecursive)?;

        let config_path = self.0.clone();
        tokio::spawn(async move {
            // The watcher lives as long as this task does.
            let _watcher = watcher;
            while let Some(res) = file_rx.recv().await {
                let update = match res {
                    Ok(event) if event.kind.is_modify() => {
                        info!("Config file changed, reloading registry...");
                        Registry::from_config_file(&config_path).await
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        error!("Watch error: {}", e);
                        Err(anyhow!("Watch error: {}", e))
                    }
                };
                if registry_tx.send(update).await.is_err() {
                    break; // Receiver dropped
                }
            }
        });

        Ok(registry_rx)
    }
}

impl Registry {
    pub async fn from_config_file(config_path: &PathBuf) -> Result<Self, anyhow::Error> {
        let contents = tokio::fs::read_to_string(config_path).await.map_err(|e| {
            anyhow!(
                "Failed to read config file {}: {}",
                config_path.display(),
                e
            )
        })?;

        let config_file: ConfigFile = serde_json::from_str(&contents).map_err(|e| {
            anyhow!(
                "Failed to parse config file {}: {}",
                config_path.display(),
                e
            )
        })?;

        let registry = Self::from_config(config_file);

        info!(
            "Loaded {} callers and {} params from {}",
            registry.callers.len(),
            registry.params.len(),
            config_path.display()
        );
        Ok(registry)
    }

    pub fn from_config(config_file: ConfigFile) -> Self {
        let callers = Arc::new(DashMap::new());
        for (uid, token) in config_file.callers {
            debug!("Registering caller {}", uid);
            callers.insert(token, CallerIdentity(uid));
        }

        let params = Arc::new(DashMap::new());
        for (name, value) in config_file.params {
            params.insert(name, value);
        }

        Registry { callers, params }
    }

    /// Resolves the identity attached to a call, if the bearer token belongs to a known caller.
    pub fn authenticate(&self, headers: &HeaderMap) -> Option<CallerIdentity> {
        let token = bearer_token(headers)?;
        self.callers
            .get(&ConstantTimeString::from(token))
            .map(|entry| entry.value().clone())
    }

    /// Receives updates from a stream of registries and applies them to this one in place.
    pub async fn receive_updates<W: RegistryStream + Send + 'static>(
        &self,
        registry_stream: W,
    ) -> Result<(), anyhow::Error> {
        let registry = self.clone();

        let mut rx = registry_stream.receive().await?;

        tokio::spawn(async move {
            while let Some(result) = rx.recv().await {
                match result {
                    Ok(new_registry) => {
                        info!("Config file changed, updating registry...");
                        registry.apply(&new_registry);
                    }
                    Err(e) => {
                        error!("Failed to reload config: {}", e);
                    }
                }
            }
        });

        Ok(())
    }

    // Remove-then-upsert rather than clear-and-refill, so concurrent lookups never see an
    // empty registry.
    fn apply(&self, new: &Registry) {
        self.callers
            .retain(|token, _| new.callers.contains_key(token));
        for entry in new.callers.iter() {
            self.callers
                .insert(entry.key().clone(), entry.value().clone());
        }

        self.params.retain(|name, _| new.params.contains_key(name));
        for entry in new.params.iter() {
            self.params.insert(entry.key().clone(), entry.value().clone());
        }
    }
}

impl ParamSource for Registry {
    fn param(&self, name: &str) -> Option<String> {
        self.params.get(name).map(|value| value.value().clone())
    }
}
