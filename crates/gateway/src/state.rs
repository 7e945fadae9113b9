//! Shared application state for the gateway

use parley_realtime::Hub;

#[derive(Clone)]
pub struct GatewayState {
    pub hub: Hub,
}

impl GatewayState {
    pub fn new(hub: Hub) -> Self {
        Self { hub }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }
}
