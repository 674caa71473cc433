//! Trailcrew trip-planning backend.
//!
//! A members-only trip-planning REST API: member directory, trip lifecycle
//! (draft → published → canceled), capacity-bounded RSVPs, and replay-safe
//! idempotency for mutating requests. Storage is pluggable between an
//! in-memory backend and Postgres.

mod api;
mod auth;
mod config;
mod domain;
mod errors;
mod idempotency;
mod services;
mod store;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use auth::Authenticator;
use config::{AuthMode, Config, StorageBackend};
use services::members::MemberService;
use services::rsvps::RsvpService;
use services::trips::TripService;
use services::{SystemClock, TripLocks};
use store::{IdempotencyStore, Storage};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub members: Arc<MemberService>,
    pub trips: Arc<TripService>,
    pub rsvps: Arc<RsvpService>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    pub config: Arc<Config>,
}

/// Wire services over a storage bundle.
pub fn build_state(storage: Storage, config: Arc<Config>) -> AppState {
    let clock: Arc<dyn services::Clock> = Arc::new(SystemClock);
    let locks = Arc::new(TripLocks::new());

    let members = Arc::new(MemberService::new(storage.members.clone(), clock.clone()));
    let trips = Arc::new(TripService::new(
        storage.trips.clone(),
        storage.members.clone(),
        storage.rsvps.clone(),
        locks.clone(),
        clock.clone(),
    ));
    let rsvps = Arc::new(RsvpService::new(
        storage.trips,
        storage.rsvps,
        locks,
        clock,
        trips.clone(),
    ));

    AppState {
        members,
        trips,
        rsvps,
        idempotency: storage.idempotency,
        config,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting trailcrew backend");
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!("Storage backend: {:?}", config.storage_backend);
    tracing::info!("Auth mode: {:?}", config.auth_mode);

    let storage = match config.storage_backend {
        StorageBackend::Memory => Storage::memory(),
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .expect("DATABASE_URL checked at config load");
            let pool = store::postgres::init_database(url).await?;
            Storage::postgres(pool)
        }
    };

    let authenticator = Arc::new(match config.auth_mode {
        AuthMode::Jwt => {
            let jwt = config.jwt.clone().expect("JWT config checked at load");
            Authenticator::Jwt(auth::JwtVerifier::new(jwt))
        }
        AuthMode::Dev => {
            tracing::warn!("AUTH_MODE=dev: subjects come from X-Debug-Subject. Do not deploy.");
            Authenticator::Dev {
                default_subject: config.dev_default_subject.clone(),
            }
        }
    });

    let bind_addr = config.bind_addr;
    let state = build_state(storage, Arc::new(config));
    let app = create_router(state, authenticator);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState, authenticator: Arc<Authenticator>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let authenticated = Router::new()
        // Members
        .route("/members", post(api::create_my_member).get(api::list_members))
        .route(
            "/members/me",
            get(api::get_my_member_profile).patch(api::update_my_member_profile),
        )
        .route("/members/search", get(api::search_members))
        // Trips
        .route("/trips", get(api::list_visible_trips).post(api::create_trip_draft))
        .route("/trips/drafts", get(api::list_my_draft_trips))
        .route(
            "/trips/{tripId}",
            get(api::get_trip_details).patch(api::update_trip),
        )
        .route(
            "/trips/{tripId}/draft-visibility",
            put(api::set_trip_draft_visibility),
        )
        .route("/trips/{tripId}/organizers", post(api::add_trip_organizer))
        .route(
            "/trips/{tripId}/organizers/{memberId}",
            delete(api::remove_trip_organizer),
        )
        .route("/trips/{tripId}/publish", post(api::publish_trip))
        .route("/trips/{tripId}/cancel", post(api::cancel_trip))
        // RSVPs
        .route("/trips/{tripId}/rsvp", put(api::set_my_rsvp))
        .route("/trips/{tripId}/rsvp/me", get(api::get_my_rsvp))
        .route("/trips/{tripId}/rsvps", get(api::get_trip_rsvp_summary))
        .layer(middleware::from_fn(move |req, next| {
            auth::subject_layer(authenticator.clone(), req, next)
        }));

    // Health check is unauthenticated and used for infra probes.
    let health = Router::new().route("/healthz", get(health_check));

    Router::new()
        .merge(authenticated)
        .merge(health)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// Liveness endpoint.
async fn health_check() -> &'static str {
    "ok"
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down...");
}
