use async_trait::async_trait;
use crate::statistics::ConnectionStatistics;
use crate::system::Result;

pub type EndpointId = u64;

/// Anything that can take DIS traffic from the gateway: a web page connected
/// over a websocket, or the native network socket.
#[async_trait]
pub trait Endpoint: Send + Sync {
    fn id(&self) -> EndpointId;

    /// Sends binary DIS, typically IEEE 1278.1 PDUs.
    async fn send_binary(&self, data: &[u8]) -> Result<()>;

    /// Sends a text message, typically JSON.
    async fn send_text(&self, message: &str) -> Result<()>;

    fn statistics(&self) -> &ConnectionStatistics;
}
