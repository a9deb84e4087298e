use async_trait::async_trait;

use super::types::ValueSnapshot;

/// Anything that can produce the latest quote on demand.
///
/// Implementations do plain I/O and may fail; timeouts and retries are
/// applied by the caller through [`super::retry::RetryPolicy`].
#[async_trait]
pub trait ValueSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self) -> anyhow::Result<ValueSnapshot>;
}
