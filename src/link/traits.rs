//! Device link abstraction for pluggable device backends

use async_trait::async_trait;
use stepwise_shared::LinkError;

/// Request/reply access to a single device
///
/// Every async call resolves at most once. Implementations own connection
/// management, framing and request correlation.
#[async_trait]
pub trait DeviceLink: Send + Sync + 'static {
    /// Dispatch one command and wait for its reply
    async fn send_command(&self, name: &str, params: &[String]) -> Result<String, LinkError>;

    /// Last known value of a continuously refreshed property
    ///
    /// Must not block; fails when no valid value is cached.
    fn cached_property(&self, name: &str) -> Result<String, LinkError>;

    /// Force one fresh read of a property
    async fn request_property(&self, name: &str) -> Result<String, LinkError>;
}
