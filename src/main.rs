mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod middleware;
mod models;
mod routes;
mod service;
mod utils;

use std::sync::Arc;

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Method,
};
use dotenv::dotenv;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use config::{Config, PaymentMode};
use db::{db::DBClient, store::MarketStore};
use routes::create_router;
use service::{
    audit_service::AuditService,
    lifecycle_service::{LifecycleService, LifecycleSettings},
    notification_service::NotificationService,
    payment_gateway::{BypassGateway, PaymentGateway, StripeGateway},
};

pub struct AppState {
    pub env: Config,
    pub store: Arc<dyn MarketStore>,
    pub lifecycle_service: Arc<LifecycleService>,
}

impl AppState {
    pub fn new(db_client: DBClient, config: Config) -> Self {
        let store: Arc<dyn MarketStore> = Arc::new(db_client);

        let gateway: Arc<dyn PaymentGateway> = match config.payment_mode {
            PaymentMode::Live => Arc::new(StripeGateway::new(&config)),
            PaymentMode::TestBypass => {
                tracing::warn!("payment mode is test_bypass: no real gateway calls will be made");
                Arc::new(BypassGateway)
            }
        };

        let notification_service = Arc::new(NotificationService::new(store.clone()));
        let audit_service = Arc::new(AuditService::new(store.clone()));

        let lifecycle_service = Arc::new(LifecycleService::new(
            store.clone(),
            gateway,
            notification_service,
            audit_service,
            LifecycleSettings::from_config(&config),
        ));

        Self {
            env: config,
            store,
            lifecycle_service,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    dotenv().ok();

    let config = Config::init();

    let pool = match PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => {
            println!("✅ Connection to the database is successful!");
            pool
        }
        Err(err) => {
            println!("🔥 Failed to connect to the database: {:?}", err);
            std::process::exit(1);
        }
    };

    let db_client = DBClient::new(pool);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
        ]);

    let app_state = Arc::new(AppState::new(db_client, config.clone()));

    let app = create_router(app_state.clone()).layer(cors);

    // Start the auto-release sweep
    tokio::spawn(service::background_jobs::start_auto_release_job(
        app_state.clone(),
    ));

    println!("🚀 Server is running on http://localhost:{}", config.port);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", &config.port))
        .await
        .unwrap();

    axum::serve(listener, app).await.unwrap();
}
