mod auth;
mod config;
mod database;
mod errors;
mod middleware;
mod models;
mod pose;
mod routes;

use axum::{
    extract::Extension,
    routing::{get, post, put},
    Router,
};
use config::Config;
use env_logger::Env;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use auth::{OAuthExchange, SessionManager, TokenManager};
use database::{CredentialStore, PgRepository, RedisCredentialStore, RedisManager, Repository};
use middleware::{auth_middleware, rate_limit_middleware};
use pose::{DeviationDetector, EventRecorder};

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    env_logger::init_from_env(Env::default().default_filter_or(&config.rust_log()));
    let bind_address = format!("{}:{}", config.host, config.port);

    let db_pool = match database::create_pool(&config).await {
        Ok(pool) => {
            println!("✅ Database pool created successfully");
            pool
        }
        Err(e) => {
            eprintln!("❌ Failed to create database pool: {}", e);
            eprintln!("Check your DATABASE_URL: {}", config.database_url);
            std::process::exit(1);
        }
    };

    if let Err(e) = database::init_schema(&db_pool).await {
        eprintln!("❌ Failed to initialize database schema: {}", e);
        std::process::exit(1);
    }

    let redis_manager = match RedisManager::new(&config).await {
        Ok(redis) => {
            println!("✅ Redis connection established successfully");
            Arc::new(redis)
        }
        Err(e) => {
            eprintln!("❌ Failed to connect to Redis: {}", e);
            eprintln!("Check your REDIS_URL: {}", config.redis_url);
            std::process::exit(1);
        }
    };

    let token_manager = match TokenManager::new(&config) {
        Ok(manager) => manager,
        Err(e) => {
            eprintln!("❌ Failed to initialize token manager: {}", e);
            std::process::exit(1);
        }
    };

    let oauth = match OAuthExchange::new(&config) {
        Ok(exchange) => Arc::new(exchange),
        Err(e) => {
            eprintln!("❌ Failed to initialize identity-provider client: {}", e);
            std::process::exit(1);
        }
    };

    let repository: Arc<dyn Repository> = Arc::new(PgRepository::new(db_pool.clone()));
    let credentials: Arc<dyn CredentialStore> =
        Arc::new(RedisCredentialStore::new(redis_manager.clone()));

    let session_manager = Arc::new(SessionManager::new(
        repository.clone(),
        credentials,
        token_manager,
    ));
    let detector = Arc::new(DeviationDetector::new(config.deviation_threshold));
    let recorder = Arc::new(EventRecorder::new(repository.clone()));

    println!("🚀 Starting server at http://{}", bind_address);

    let app = Router::new()
        .merge(api_routes(session_manager.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(Extension(Arc::new(config)))
                .layer(Extension(redis_manager))
                .layer(Extension(repository))
                .layer(Extension(session_manager))
                .layer(Extension(oauth))
                .layer(Extension(detector))
                .layer(Extension(recorder)),
        );

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .unwrap_or_else(|e| {
            eprintln!("❌ Failed to bind to {}: {}", bind_address, e);
            std::process::exit(1);
        });

    axum::serve(listener, app).await.unwrap_or_else(|e| {
        eprintln!("❌ Server error: {}", e);
        std::process::exit(1);
    });
}

fn api_routes(session_manager: Arc<SessionManager>) -> Router {
    // Login is public but rate-limited; everything under /pose and /mypage
    // presents a bearer token on every call.
    let login_routes = Router::new()
        .route("/auth/login", post(routes::auth::login))
        .layer(axum::middleware::from_fn(rate_limit_middleware));

    let protected_routes = Router::new()
        .route("/auth/me", get(routes::auth::me))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/pose/baseline", post(routes::pose::capture_baseline))
        .route("/pose/sample", post(routes::pose::submit_sample))
        .route("/pose/stats", get(routes::pose::stats))
        .route("/pose/stats/rebuild", post(routes::pose::rebuild_stats))
        .route("/mypage/me", get(routes::mypage::me))
        .route("/mypage/threshold", put(routes::mypage::set_threshold))
        .layer(Extension(session_manager))
        .layer(axum::middleware::from_fn(auth_middleware));

    Router::new()
        .route("/health", get(routes::health::health))
        .merge(login_routes)
        .merge(protected_routes)
}
