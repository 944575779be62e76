use std::sync::Arc;

use crate::config::GateSettings;
use crate::nav::Navigator;
use crate::provider::ProviderClient;
use crate::store::CredentialStore;

/// Shared wiring for the flow components: one provider client, one
/// credential store, one page surface, one settings block.
pub(crate) struct GateState {
    pub(crate) client: Arc<ProviderClient>,
    pub(crate) store: CredentialStore,
    pub(crate) nav: Arc<dyn Navigator>,
    pub(crate) settings: Arc<GateSettings>,
}

// Manual Clone: the fields are all shared handles.
impl Clone for GateState {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            store: self.store.clone(),
            nav: self.nav.clone(),
            settings: self.settings.clone(),
        }
    }
}
