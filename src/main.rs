use anyhow::{Context, Result};
use axum::http::HeaderValue;
use std::sync::Arc;
use tower::ServiceBuilder;

use quiz_generator::{
    Database, JwtVerifier, LLMService, QuizService,
    api::{AppState, cors_layer, create_router},
    config::Config,
    log_system_event,
    logging::init_tracing,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    let _guard = init_tracing(&config.logging, "quiz-generator.log")?;
    config.log_configuration_summary();
    config.validate()?;

    log_system_event!(startup, component = "server", "Starting quiz generator API");

    let db = Database::new(&config.database.url)
        .await
        .context("failed to open the quiz database")?;
    log_system_event!(startup, component = "database", "Database initialized successfully");

    let llm_service = LLMService::new_with_provider(
        config.llm.api_key.clone(),
        config.llm.base_url.clone(),
        config.llm.provider,
        config.llm.model.clone(),
        config.llm.timeout,
    )?;
    log_system_event!(
        startup,
        component = "llm_service",
        format!(
            "Initialized LLM service with provider {} (model {})",
            llm_service.provider_name(),
            llm_service.model_name()
        )
    );

    let state = AppState {
        quiz_service: QuizService::new(db, llm_service),
        identity: Arc::new(JwtVerifier::new(&config.auth.jwt_secret)),
        upload_limit: config.server.max_upload_bytes,
    };

    let allowed_origin = HeaderValue::from_str(&config.server.allowed_origin)?;
    let app = create_router(state).layer(ServiceBuilder::new().layer(cors_layer(allowed_origin)));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    log_system_event!(startup, component = "server", format!("Server starting on {}", addr));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log_system_event!(shutdown, component = "server", "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
