use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use hungerheal::api;
use hungerheal::auth::FirebaseVerifier;
use hungerheal::config::{Config, LogFormat};
use hungerheal::error::AppError;
use hungerheal::expiry::{ExpiryPredictor, GeminiModel, HttpImageFetcher};
use hungerheal::media::CloudinaryUploader;
use hungerheal::state::AppState;
use hungerheal::store::{DonationStore, MemoryStore, PgStore};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    init_tracing(&config);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.upstream_timeout_secs))
        .build()
        .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

    let store = open_store(&config).await?;
    let verifier = Arc::new(FirebaseVerifier::new(
        config.firebase_project_id.clone(),
        client.clone(),
    ));

    let mut app_state = AppState::new(store, verifier, config.event_buffer_size);

    match &config.cloudinary {
        Some(cloudinary) => {
            app_state = app_state.with_uploader(Arc::new(CloudinaryUploader::new(
                cloudinary.clone(),
                client.clone(),
            )));
        }
        None => tracing::warn!("cloudinary not configured, donations with images will fail"),
    }

    match &config.gemini_api_key {
        Some(api_key) => {
            let model = GeminiModel::new(api_key.clone(), config.gemini_model.clone(), client.clone());
            app_state = app_state.with_predictor(ExpiryPredictor::new(
                Arc::new(HttpImageFetcher::new(client.clone())),
                Arc::new(model),
            ));
        }
        None => tracing::warn!("gemini api key not set, expiry prediction disabled"),
    }

    let shared_state = Arc::new(app_state);

    let app = api::rest::router(shared_state)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors_layer(&config.cors_allowed_origins));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

fn init_tracing(config: &Config) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

async fn open_store(config: &Config) -> Result<Arc<dyn DonationStore>, AppError> {
    let Some(database_url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, using in-memory store; data is lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    };

    let store = PgStore::connect(database_url, config.db_max_connections).await?;
    if config.run_migrations {
        store.migrate().await?;
    }

    Ok(Arc::new(store))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(%origin, error = %err, "ignoring invalid cors origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(allowed))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
