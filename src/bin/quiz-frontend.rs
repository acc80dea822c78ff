use anyhow::Result;

use quiz_generator::{
    config::FrontendConfig,
    frontend::{BackendClient, FrontendState, create_frontend_router},
    log_system_event,
    logging::init_tracing,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = FrontendConfig::from_env()?;
    let _guard = init_tracing(&config.logging, "quiz-frontend.log")?;

    let state = FrontendState {
        client: BackendClient::new(&config.api_url)?,
        upload_limit: config.max_upload_bytes,
    };
    log_system_event!(
        startup,
        component = "frontend",
        format!("Forwarding requests to {}", config.api_url)
    );

    let addr = format!("{}:{}", config.host, config.port);
    log_system_event!(startup, component = "frontend", format!("Front end starting on {}", addr));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, create_frontend_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log_system_event!(shutdown, component = "frontend", "Front end stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
