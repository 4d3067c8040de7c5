// src/main.rs
use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use embed_sso_server::{
    config::Config,
    routes::{router, AppState},
    user::load_users,
};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env().context("loading embed configuration")?;
    let users = load_users(&config.demo_user_file)?;
    info!(
        embed_host = %config.embed_host,
        users = users.len(),
        static_dir = %config.static_dir.display(),
        "configuration loaded"
    );

    let (host, port) = (config.demo_host.clone(), config.demo_port);
    let app = router(Arc::new(AppState { config, users }));

    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("binding {host}:{port}"))?;
    let addr: SocketAddr = listener.local_addr()?;
    info!("embed demo listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
