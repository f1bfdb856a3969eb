// Shared engine dependencies
//
// Everything a dispatch path needs, cheap to clone into spawned tasks and
// job handlers.

use pushcast_storage::{KeyVault, StorageBackend};
use std::sync::Arc;

use crate::config::DispatchConfig;
use crate::transport::PushTransport;
use crate::webhook::WebhookNotifier;

#[derive(Clone)]
pub struct EngineContext {
    pub storage: StorageBackend,
    pub vault: KeyVault,
    pub transport: Arc<dyn PushTransport>,
    pub notifier: WebhookNotifier,
    pub config: Arc<DispatchConfig>,
}

impl EngineContext {
    pub fn new(
        storage: StorageBackend,
        vault: KeyVault,
        transport: Arc<dyn PushTransport>,
        notifier: WebhookNotifier,
        config: DispatchConfig,
    ) -> Self {
        Self {
            storage,
            vault,
            transport,
            notifier,
            config: Arc::new(config),
        }
    }
}
