use std::collections::BTreeMap;
use std::sync::Arc;

use application::{CommandTable, Dispatcher, LocalEndpoint};
use domain::EndpointId;
use infrastructure::Infrastructure;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub table: Arc<CommandTable>,
    pub local_endpoints: Arc<BTreeMap<EndpointId, Arc<LocalEndpoint>>>,
}

impl AppState {
    pub fn new(
        dispatcher: Dispatcher,
        table: Arc<CommandTable>,
        local_endpoints: BTreeMap<EndpointId, Arc<LocalEndpoint>>,
    ) -> Self {
        Self {
            dispatcher,
            table,
            local_endpoints: Arc::new(local_endpoints),
        }
    }

    pub fn from_infrastructure(infrastructure: &Infrastructure) -> Self {
        Self::new(
            infrastructure.dispatcher.clone(),
            infrastructure.table.clone(),
            infrastructure.local_endpoints.clone(),
        )
    }
}
