mod api;
mod config;
mod database_connection;
mod external_services;
mod purchase_handler;
mod rate_limit;
mod secret;
mod tasks;

#[cfg(test)]
mod test_support;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum_server::tls_rustls::RustlsConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::MainConfig;
use crate::database_connection::DatabaseConnection;
use crate::external_services::signature::TokenCodec;
use crate::external_services::telegram::TelegramNotifier;
use crate::external_services::tinkoff::handler::TinkoffInvoiceHandler;
use crate::purchase_handler::PaymentHandler;
use crate::rate_limit::RateLimiter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = MainConfig::from_env()?;

    let codec = Arc::new(TokenCodec::new(
        config.terminal_key.clone(),
        config.terminal_password.clone(),
    )?);

    let store = Arc::new(
        DatabaseConnection::connect(config.database_url.reveal())
            .await
            .context("Can't connect to database")?,
    );

    let client = reqwest::Client::new();

    let gateway = Arc::new(TinkoffInvoiceHandler::new(
        client.clone(),
        &config.gateway_api_url,
        codec.clone(),
        config.receipt_taxation.clone(),
    ));

    let notifier = Arc::new(TelegramNotifier::new(
        client,
        &config.telegram_api_url,
        config.telegram_bot_token.clone(),
        config.telegram_chat_id.clone(),
    ));

    let limiter = Arc::new(RateLimiter::default());
    tasks::spawn_tasks(limiter.clone());

    let admin_token = config.admin_token();
    if admin_token.is_none() {
        info!("EASYLINK_ADMIN_TOKEN is not set, payment cancel endpoint is disabled");
    }

    let state = AppState {
        store: store.clone(),
        payments: Arc::new(PaymentHandler::new(store, gateway, codec)),
        notifier,
        limiter,
        admin_token,
    };

    let app = api::router(state).into_make_service_with_connect_info::<SocketAddr>();

    match config.tls_paths() {
        Some((cert, key)) => {
            let tls = RustlsConfig::from_pem_file(cert, key)
                .await
                .context("Can't load TLS certificate")?;

            info!(addr = %config.bind_addr, "Listening with TLS");
            axum_server::bind_rustls(config.bind_addr, tls)
                .serve(app)
                .await?;
        }
        None => {
            info!(addr = %config.bind_addr, "Listening");
            axum::Server::bind(&config.bind_addr).serve(app).await?;
        }
    }

    Ok(())
}
