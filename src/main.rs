use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shipnotes::services::{
    CredentialCipher, GitHubClient, HttpMailer, OAuthStateStore, OpenAiClient,
};
use shipnotes::{handlers, AppState, Config};

/// Health check endpoint
async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "shipnotes"
    }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shipnotes=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().expect("Failed to load configuration");

    info!("Starting shipnotes server on {}:{}", config.host, config.port);

    // Create database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .expect("Failed to create database pool");

    info!("Database connection pool established");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to run database migrations");

    info!("Database migrations completed");

    let http_timeout = Duration::from_secs(config.http_timeout_secs);

    let cipher = CredentialCipher::from_hex_key(&config.credential_key)
        .expect("Invalid CREDENTIAL_KEY");

    let host = Arc::new(GitHubClient::with_base_url(
        config.host_api_base.clone(),
        http_timeout,
    ));
    let completions = Arc::new(OpenAiClient::new(
        config.llm_api_base.clone(),
        config.llm_api_key.clone(),
        config.llm_model.clone(),
        config.llm_temperature,
        http_timeout,
    ));
    let mailer = Arc::new(HttpMailer::new(
        config.mail_api_base.clone(),
        config.mail_api_key.clone(),
        config.mail_from.clone(),
        http_timeout,
    ));

    // Transient OAuth connect-flow state lives in this injected store; the
    // sweeper's lifetime is tied to the server process.
    let oauth_states = OAuthStateStore::new(Duration::from_secs(config.oauth_state_ttl_secs));
    let _sweeper_shutdown = oauth_states.start_sweeper(Duration::from_secs(60));
    info!("OAuth state sweeper started");

    let app_state = web::Data::new(AppState {
        db: db_pool.clone(),
        config: config.clone(),
        cipher,
        host,
        completions,
        mailer,
        oauth_states,
    });

    let server_addr = format!("{}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .route("/health", web::get().to(health_check))
            .service(
                web::scope("/v1")
                    .configure(handlers::configure_webhook_routes)
                    .configure(handlers::configure_release_routes)
                    .configure(handlers::configure_repo_routes),
            )
    })
    .bind(&server_addr)?
    .run()
    .await
}
