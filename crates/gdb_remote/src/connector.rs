use std::time::Duration;

use devicebridge::{DebugStubConnector, DebugTransport, TransportError};
use tracing::info;

use crate::client::TcpDebugClient;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a fresh TCP connection to an already running stub for every session.
///
/// The service name is only reported; which service listens on `address` is
/// decided by whoever exposed it.
#[derive(Debug, Clone)]
pub struct TcpStubConnector {
    address: String,
    connect_timeout: Duration,
}

impl TcpStubConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl DebugStubConnector for TcpStubConnector {
    fn start_debug_stub(
        &self,
        service_name: &str,
    ) -> Result<Box<dyn DebugTransport>, TransportError> {
        info!(service = service_name, address = %self.address, "connecting to debug stub");
        let client = TcpDebugClient::connect(&self.address, self.connect_timeout).map_err(
            |error| TransportError::ServiceStart {
                service: service_name.to_string(),
                message: format!("{}: {error}", self.address),
            },
        )?;
        Ok(Box::new(client))
    }
}
