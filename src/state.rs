use std::sync::Arc;

use anyhow::Result;
use chrono::Duration;

use leadsync_core::crm::CrmClient;
use leadsync_core::locks::SyncLocks;
use leadsync_core::reconcile::Reconciler;
use leadsync_core::store::MemoryStore;
use leadsync_core::webhook::WebhookPipeline;

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub reconciler: Arc<Reconciler<MemoryStore, CrmClient>>,
    pub webhooks: Arc<WebhookPipeline<MemoryStore>>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        for tenant in config.tenants {
            store.insert_tenant(tenant.into_tenant());
        }

        let cooldown = Duration::seconds(config.cooldown_secs as i64);
        let api = Arc::new(CrmClient::new(config.crm));
        // One lock set for both directions: an inbound webhook and an
        // outbound run never interleave on the same lead.
        let locks = SyncLocks::in_memory();
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&store),
            api,
            locks.clone(),
            cooldown,
        ));
        let webhooks = Arc::new(WebhookPipeline::new(Arc::clone(&store), locks, cooldown));

        Ok(AppState {
            store,
            reconciler,
            webhooks,
        })
    }
}
