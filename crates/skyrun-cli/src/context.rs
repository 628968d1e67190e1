//! Shared command setup: config store, region, and AWS adapters.

use std::sync::Arc;

use anyhow::Result;
use skyrun_aws::AwsProviders;
use skyrun_core::packager::CodePackager;
use skyrun_store::{resolve_region, ConfigStore, JsonFileStore};

pub struct AppContext {
    pub store: Arc<dyn ConfigStore>,
    pub providers: AwsProviders,
    pub region: String,
}

impl AppContext {
    /// Resolve the region for `environment` and construct the adapters.
    pub async fn load(environment: &str) -> Result<Self> {
        let store: Arc<dyn ConfigStore> = Arc::new(JsonFileStore::at_default_path()?);
        let stored_region = store
            .load_environment(environment)?
            .and_then(|config| config.region);
        let region = resolve_region(stored_region.as_deref());
        tracing::debug!(environment, region = %region, "resolved region");
        let providers = skyrun_aws::load_providers(&region).await;
        Ok(Self { store, providers, region })
    }

    /// Construct the adapters for an explicitly chosen region,
    /// bypassing the stored config.
    pub async fn load_in_region(region: &str) -> Result<Self> {
        let store: Arc<dyn ConfigStore> = Arc::new(JsonFileStore::at_default_path()?);
        let providers = skyrun_aws::load_providers(region).await;
        Ok(Self { store, providers, region: region.to_string() })
    }

    pub fn packager(&self) -> CodePackager {
        CodePackager::new(self.providers.objects.clone())
    }
}
