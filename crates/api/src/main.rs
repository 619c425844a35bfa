use anyhow::Context;

use registrar_infra::RegistrarConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    registrar_observability::init();

    let config = RegistrarConfig::from_env().context("invalid configuration")?;
    let bind = config.bind;

    let app = registrar_api::app::build_app(config).await?;

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
