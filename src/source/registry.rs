use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use super::{ContentSource, MangaflixSource, ToonbrSource};
use crate::config::{SourceConfig, SourceKind};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("source not found: {0}")]
    NotFound(String),
}

/// Name → source adapter, resolved once at composition time
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<String, Arc<dyn ContentSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Arc<dyn ContentSource>) {
        self.sources.insert(source.name().to_string(), source);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ContentSource>, RegistryError> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Build adapters for every configured source, sharing one HTTP client
    pub fn from_config(configs: &HashMap<String, SourceConfig>, client: reqwest::Client) -> Self {
        let mut registry = Self::new();

        for (name, config) in configs {
            let source: Arc<dyn ContentSource> = match config.kind {
                SourceKind::Mangaflix => Arc::new(MangaflixSource::new(
                    name.clone(),
                    config.api_url.clone(),
                    config.language.clone().unwrap_or_else(|| "pt-br".to_string()),
                    client.clone(),
                )),
                SourceKind::Toonbr => Arc::new(ToonbrSource::new(
                    name.clone(),
                    config.api_url.clone(),
                    // validation guarantees a CDN for toonbr
                    config.cdn_url.clone().unwrap_or_default(),
                    client.clone(),
                )),
            };
            info!(source = %name, kind = ?config.kind, "Registered content source");
            registry.register(source);
        }

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configs() -> HashMap<String, SourceConfig> {
        let mut configs = HashMap::new();
        configs.insert(
            "flix".to_string(),
            SourceConfig {
                kind: SourceKind::Mangaflix,
                api_url: "https://api.example/v1".to_string(),
                cdn_url: None,
                language: None,
            },
        );
        configs.insert(
            "toon".to_string(),
            SourceConfig {
                kind: SourceKind::Toonbr,
                api_url: "https://api.example".to_string(),
                cdn_url: Some("https://cdn.example".to_string()),
                language: None,
            },
        );
        configs
    }

    #[test]
    fn test_from_config_registers_by_name() {
        let registry = SourceRegistry::from_config(&configs(), reqwest::Client::new());

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names().collect::<Vec<_>>(), ["flix", "toon"]);
        assert_eq!(registry.get("toon").unwrap().name(), "toon");
    }

    #[test]
    fn test_unknown_source() {
        let registry = SourceRegistry::new();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.get("missing"),
            Err(RegistryError::NotFound(name)) if name == "missing"
        ));
    }
}
