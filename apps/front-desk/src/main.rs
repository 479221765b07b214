use anyhow::{Context, Result};
use clinic_queue::{open_store, FrontDesk};
use front_desk::{build_info, build_router, AppConfig, AppState, JwtIdentity};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,front_desk=debug,clinic_queue=debug"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Falha ao aguardar sinal de encerramento");
    }
    info!("Encerrando front-desk");
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env().context("Configuração inválida")?;
    init_tracing(config.log_json);

    info!(
        version = build_info::PKG_VERSION,
        rustc = build_info::RUSTC_VERSION,
        "Iniciando front-desk"
    );

    let store = open_store(&config.store).await?;
    let desk = FrontDesk::new(Arc::new(store), config.policies);
    let state = AppState::new(desk, JwtIdentity::new(config.jwt_secret.as_bytes()));

    info!(bind = %config.bind, "Servidor HTTP escutando");
    axum::Server::bind(&config.bind)
        .serve(build_router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Falha no servidor HTTP")?;

    Ok(())
}
