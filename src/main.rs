//! Team Sport Finder Backend
//!
//! REST backend for tournaments, teams and join requests, with SQLite
//! persistence, Tantivy full-text search and identities delegated to an
//! external JWT provider.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod membership;
mod models;
mod search;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use auth::{IdentityResolver, JwksVerifier};
use config::{Config, LogFormat};
use db::Repository;
use membership::MembershipEngine;
use models::TeamFilter;
use search::TeamIndex;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub search: Arc<TeamIndex>,
    pub identity: Arc<IdentityResolver>,
    pub membership: Arc<MembershipEngine>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Open the database and index, and wire up the services.
    pub async fn initialize(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let pool = db::init_database(&config.db_path).await?;
        let repo = Arc::new(Repository::new(pool));

        let search = Arc::new(TeamIndex::open(&config.index_path)?);

        // The index is derived; rebuild it from the database on every start
        tracing::info!("Building search index...");
        let teams = repo.list_teams(&TeamFilter::default()).await?;
        search.rebuild(&teams).await?;

        let verifier = JwksVerifier::new(
            config.jwks_url.clone(),
            config.idp_secret_key.clone(),
            config.jwt_issuer.clone(),
            config.jwks_ttl,
            config.idp_timeout,
        )?;
        let identity = Arc::new(IdentityResolver::new(verifier, repo.clone()));
        let membership = Arc::new(MembershipEngine::new(repo.clone()));

        Ok(Self {
            repo,
            search,
            identity,
            membership,
            config: Arc::new(config),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(env_filter);
    match config.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }

    tracing::info!("Starting Team Sport Finder Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Index path: {:?}", config.index_path);
    tracing::info!("Key set URL: {}", config.jwks_url);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.admin_api_key.is_none() {
        tracing::warn!(
            "No admin key configured (TEAMFINDER_ADMIN_KEY). Administrative endpoints are disabled"
        );
    }

    let bind_addr = config.bind_addr;
    let state = AppState::initialize(config).await?;

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the admin layer
    let psk = state.config.admin_api_key.clone();

    // Routes for end users, resolved to a caller by bearer token
    let user_routes = Router::new()
        // Identity
        .route("/auth/me", get(api::me))
        .route("/auth/register", post(api::register))
        // Player profile
        .route(
            "/players/profile",
            get(api::get_profile)
                .post(api::create_profile)
                .put(api::update_profile),
        )
        // Tournaments
        .route(
            "/tournaments",
            get(api::list_tournaments).post(api::create_tournament),
        )
        .route("/tournaments/my", get(api::my_tournaments))
        .route(
            "/tournaments/{id}",
            get(api::get_tournament)
                .put(api::update_tournament)
                .delete(api::delete_tournament),
        )
        .route("/tournaments/{id}/teams", get(api::tournament_teams))
        // Teams
        .route("/teams", get(api::list_teams).post(api::create_team))
        .route("/teams/search", get(api::search_teams))
        .route(
            "/teams/{id}",
            get(api::get_team)
                .put(api::update_team)
                .delete(api::delete_team),
        )
        .route("/teams/{id}/members", get(api::team_members))
        // Join requests
        .route("/join-requests", post(api::create_join_request))
        .route("/join-requests/my", get(api::my_join_requests))
        .route("/join-requests/received", get(api::received_join_requests))
        .route("/join-requests/{id}", get(api::get_join_request))
        .route("/join-requests/{id}/accept", post(api::accept_join_request))
        .route("/join-requests/{id}/reject", post(api::reject_join_request))
        .route("/join-requests/{id}/cancel", post(api::cancel_join_request))
        .layer(middleware::from_fn_with_state(
            state.identity.clone(),
            auth::identity_layer,
        ));

    // Administrative routes, pre-shared key only
    let admin_routes = Router::new()
        .route(
            "/join-requests/{id}",
            delete(api::admin_delete_join_request),
        )
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    let api_routes = user_routes.nest("/admin", admin_routes);

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod testing;
