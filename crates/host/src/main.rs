use anyhow::Context;

use keystone_core::TenantId;
use keystone_events::EventBusConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    keystone_observability::init();

    let config = EventBusConfig::from_env();
    let tenant = std::env::var(keystone_host::ENV_TENANT_ID).unwrap_or_else(|_| {
        tracing::warn!("KEYSTONE_TENANT_ID not set; using {}", keystone_host::DEFAULT_TENANT_ID);
        keystone_host::DEFAULT_TENANT_ID.to_string()
    });
    let tenant = TenantId::parse(tenant).context("invalid KEYSTONE_TENANT_ID")?;

    let host = keystone_host::build(config, tenant);
    host.start().await;

    keystone_host::publish_samples(&host.bus)
        .await
        .context("publishing sample events")?;

    tracing::info!(
        audited = host.audit.len(),
        activity = host.feed.len(),
        notifications = host.notifications.len(),
        "sample session complete"
    );
    Ok(())
}
