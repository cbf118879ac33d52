use async_trait::async_trait;

pub mod discord;

pub use discord::{DiscordAdapter, DiscordGrantAction, classify_status};

/// Chat platform adapters that feed activity into cadence.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Human-readable adapter name for logging.
    fn name(&self) -> &str;

    /// Run the adapter's connection until it ends or fails.
    async fn start(&self) -> anyhow::Result<()>;
}
