//! Static map from adapter kind to constructor.

use std::collections::BTreeMap;
use std::sync::Arc;

use asana2calendar_core::{Adapter, AdapterConfig, AdapterSet, AppConfig, SyncError, SyncResult};
use asana2calendar_provider_asana::AsanaAdapter;
use asana2calendar_provider_caldav::CalDavAdapter;

type Constructor = fn(&str, &AdapterConfig) -> SyncResult<Arc<dyn Adapter>>;

pub struct Registry {
    kinds: BTreeMap<&'static str, Constructor>,
}

impl Registry {
    pub fn builtin() -> Self {
        let mut kinds: BTreeMap<&'static str, Constructor> = BTreeMap::new();
        kinds.insert(asana2calendar_provider_asana::KIND, build_asana);
        kinds.insert(asana2calendar_provider_caldav::KIND, build_caldav);
        Registry { kinds }
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.kinds.keys().copied().collect()
    }

    /// Validate `config` and construct every enabled adapter, in name order.
    pub fn build(&self, config: &AppConfig) -> SyncResult<AdapterSet> {
        config.validate(&self.kinds())?;

        let mut adapters = AdapterSet::new();
        for (name, adapter) in config.enabled_adapters() {
            let kind = adapter.kind(name);
            let construct = self
                .kinds
                .get(kind)
                .ok_or_else(|| SyncError::Config(format!("Adapter '{name}' has unknown kind '{kind}'")))?;
            adapters.insert(construct(name, adapter)?, adapter.required)?;
        }
        Ok(adapters)
    }
}

fn build_asana(name: &str, config: &AdapterConfig) -> SyncResult<Arc<dyn Adapter>> {
    Ok(Arc::new(AsanaAdapter::from_config(name, config)?))
}

fn build_caldav(name: &str, config: &AdapterConfig) -> SyncResult<Arc<dyn Adapter>> {
    Ok(Arc::new(CalDavAdapter::from_config(name, config)?))
}
