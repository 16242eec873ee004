use std::sync::Arc;

use anyhow::Context;

use agent_relay::agent::AgentClient;
use agent_relay::channels::{Channel, TelegramChannel};
use agent_relay::config::{RelayConfig, RelaySettings};
use agent_relay::relay::{Bot, Relay};
use agent_relay::store::MappingStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = RelayConfig::from_env().context("invalid configuration")?;
    let settings = RelaySettings::default();

    let mappings_path = match config.mappings_path.clone() {
        Some(path) => path,
        None => MappingStore::default_path().context("cannot locate the mappings file")?,
    };

    eprintln!("🤖 Agent Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Agent:    {}", config.agent_url);
    eprintln!("   Mappings: {}", mappings_path.display());
    eprintln!("   Allowed:  user {}\n", config.allowed_user_id);

    // ── Mapping store ────────────────────────────────────────────────────
    let store = Arc::new(
        MappingStore::load(&mappings_path)
            .await
            .with_context(|| format!("failed to load {}", mappings_path.display()))?,
    );

    // ── Agent client ─────────────────────────────────────────────────────
    let agent = Arc::new(
        AgentClient::new(config.agent_url.clone(), settings.agent_timeout)
            .context("failed to build agent client")?,
    );

    // ── Telegram ─────────────────────────────────────────────────────────
    let telegram = Arc::new(
        TelegramChannel::new(config.bot_token.clone())
            .context("failed to build Telegram client")?,
    );
    if let Err(e) = telegram.health_check().await {
        tracing::warn!("Telegram health check failed: {e}");
    }

    let relay = Arc::new(Relay::new(store, agent, settings));
    let bot = Arc::new(Bot::new(relay, telegram, config.allowed_user_id));

    bot.run().await.context("relay bot stopped with an error")?;

    tracing::info!("Relay stopped");
    Ok(())
}
