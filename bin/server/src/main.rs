use axum::http::{HeaderValue, Method, StatusCode, header};
use rootcause::Report;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::fmt;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tacokumo_admin_platform_access::{
    CsrfState, FlowSettings, OAuthFlow, RedisStore, Session, SessionStore, StateStore,
};
use tacokumo_admin_server::{
    app,
    auth::{
        AppState, Authenticator, github::GitHubClient, jwks::JwksCache, jwt::JwtValidator,
    },
    config::{CorsConfig, DatabaseConfig, RedisConfig, ServerConfig},
    db::Stores,
};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// Reasons the server failed to start or stopped abnormally.
#[derive(Debug)]
enum StartupError {
    Config { details: String },
    Redis { details: String },
    Database { details: String },
    Migration { details: String },
    IdentityProvider { details: String },
    SigningKeys { details: String },
    Bind { addr: String, details: String },
    Serve { details: String },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "invalid configuration: {details}"),
            Self::Redis { details } => write!(f, "redis unavailable: {details}"),
            Self::Database { details } => write!(f, "database unavailable: {details}"),
            Self::Migration { details } => write!(f, "migrations failed: {details}"),
            Self::IdentityProvider { details } => {
                write!(f, "failed to set up the GitHub client: {details}")
            }
            Self::SigningKeys { details } => write!(f, "failed to load signing keys: {details}"),
            Self::Bind { addr, details } => write!(f, "failed to bind {addr}: {details}"),
            Self::Serve { details } => write!(f, "server error: {details}"),
        }
    }
}

impl std::error::Error for StartupError {}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Report<StartupError>> {
    let config = ServerConfig::from_env().map_err(|e| StartupError::Config {
        details: e.to_string(),
    })?;
    tracing::info!("loaded configuration");

    let frontend_url = Url::parse(&config.frontend_url).map_err(|e| StartupError::Config {
        details: format!("FRONTEND_URL: {e}"),
    })?;
    let (session_ttl, state_ttl) = config
        .session
        .store_ttls()
        .map_err(|details| StartupError::Config { details })?;

    let redis_pool = connect_redis(&config.redis).await?;
    let db_pool = connect_database(&config.database).await?;

    tracing::info!("running database migrations");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .map_err(|e| StartupError::Migration {
            details: e.to_string(),
        })?;

    let sessions: Arc<SessionStore> =
        Arc::new(RedisStore::<Session>::new(redis_pool.clone(), session_ttl));
    let states: Arc<StateStore> =
        Arc::new(RedisStore::<CsrfState>::new(redis_pool.clone(), state_ttl));

    let github = GitHubClient::new(&config.github).map_err(|e| StartupError::IdentityProvider {
        details: e.to_string(),
    })?;
    let flow = OAuthFlow::new(
        Arc::new(github),
        sessions.clone(),
        states,
        FlowSettings {
            frontend_url,
            session_ttl: config.session.ttl(),
            state_ttl: config.session.state_ttl(),
            allowed_orgs: config.github.allowed_orgs(),
        },
    );

    let (validator, jwks_refresh) = match &config.jwt {
        Some(jwt) => {
            let keys = Arc::new(JwksCache::new(jwt.jwks_url()).map_err(|e| {
                StartupError::SigningKeys {
                    details: e.to_string(),
                }
            })?);
            let count = keys.refresh().await.map_err(|e| StartupError::SigningKeys {
                details: e.to_string(),
            })?;
            tracing::info!(keys = count, url = %keys.url(), "loaded signing keys");

            let refresh = keys.spawn_refresh(jwt.refresh_interval());
            let validator = JwtValidator::new(keys, jwt.issuer.clone(), jwt.client_ids());
            (Some(Arc::new(validator)), Some(refresh))
        }
        None => {
            tracing::info!("no JWT issuer configured; bearer tokens are session ids only");
            (None, None)
        }
    };

    let state = Arc::new(AppState {
        authenticator: Authenticator::new(sessions.clone(), validator),
        flow,
        sessions,
        stores: Stores::postgres(db_pool.clone()),
        session_config: config.session.clone(),
    });

    let mut router = app(state)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout(),
        ))
        .layer(TraceLayer::new_for_http());
    if let Some(cors) = cors_layer(&config.cors)? {
        router = router.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .map_err(|e| StartupError::Bind {
            addr: config.addr.clone(),
            details: e.to_string(),
        })?;
    tracing::info!(addr = %config.addr, "listening");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    tracing::info!("shutting down");
    if let Some(refresh) = jwks_refresh {
        refresh.shutdown().await;
    }
    db_pool.close().await;
    redis_pool.close();

    served.map_err(|e| StartupError::Serve {
        details: e.to_string(),
    })?;
    Ok(())
}

async fn connect_redis(config: &RedisConfig) -> Result<deadpool_redis::Pool, Report<StartupError>> {
    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
    pool_config.timeouts.wait = Some(config.timeout());
    pool_config.timeouts.create = Some(config.timeout());
    pool_config.timeouts.recycle = Some(config.timeout());
    redis_config.pool = Some(pool_config);

    let pool = redis_config
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .map_err(|e| StartupError::Redis {
            details: e.to_string(),
        })?;

    // Fail fast rather than on the first login.
    pool.get().await.map_err(|e| StartupError::Redis {
        details: e.to_string(),
    })?;
    tracing::info!("connected to redis");

    Ok(pool)
}

/// Connects to PostgreSQL, retrying `initial_conn_retry` times one second
/// apart.
async fn connect_database(config: &DatabaseConfig) -> Result<PgPool, Report<StartupError>> {
    let options = PgPoolOptions::new().max_connections(config.max_connections);
    let mut attempt = 0;
    loop {
        match options.clone().connect(&config.url).await {
            Ok(pool) => {
                tracing::info!("connected to database");
                return Ok(pool);
            }
            Err(e) if attempt < config.initial_conn_retry => {
                attempt += 1;
                tracing::warn!(error = %e, attempt, "database connection failed, retrying");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Err(e) => {
                return Err(StartupError::Database {
                    details: e.to_string(),
                }
                .into());
            }
        }
    }
}

/// CORS for the configured origins, or `None` when no origin is allowed.
fn cors_layer(config: &CorsConfig) -> Result<Option<CorsLayer>, Report<StartupError>> {
    let origins = config
        .allow_origins()
        .iter()
        .map(|origin| HeaderValue::from_str(origin))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StartupError::Config {
            details: format!("CORS__ALLOW_ORIGINS: {e}"),
        })?;
    if origins.is_empty() {
        return Ok(None);
    }

    Ok(Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(config.allow_credentials)
            .max_age(Duration::from_secs(config.max_age_seconds)),
    ))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
