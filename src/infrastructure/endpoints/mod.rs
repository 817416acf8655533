pub mod base_url;
pub mod pc_server;

use crate::domain::models::EndpointBox;

pub struct EndpointManager {}

impl EndpointManager {
    /// Builds the endpoint described by the loaded configuration.
    pub fn get() -> EndpointBox {
        return Box::<pc_server::PcServer>::default();
    }
}
