//! Signing keys of the external token issuer.
//!
//! [`JwksCache`] fetches the issuer's JSON Web Key Set and keeps the
//! decoded keys by `kid`. A background task started with
//! [`JwksCache::spawn_refresh`] refetches the set on an interval, and a
//! lookup for an unknown `kid` triggers an early refetch so that key
//! rotation is picked up without waiting for the next tick.

use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use rootcause::Report;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Unknown-`kid` lookups refetch at most this often, counted from the
/// last fetch attempt whether or not it succeeded.
const MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(30);

/// Errors from fetching or reading the key set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JwksError {
    /// The HTTP client could not be built.
    Client { details: String },
    /// The request did not complete.
    Fetch { url: String, details: String },
    /// The endpoint answered with a non-success status.
    Status { url: String, status: u16 },
    /// The body is not a JWK set.
    Decode { url: String, details: String },
    /// No signing key has this id.
    UnknownKey { kid: String },
}

impl fmt::Display for JwksError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client { details } => write!(f, "failed to build JWKS client: {details}"),
            Self::Fetch { url, details } => write!(f, "failed to fetch JWKS from '{url}': {details}"),
            Self::Status { url, status } => write!(f, "JWKS endpoint '{url}' returned {status}"),
            Self::Decode { url, details } => {
                write!(f, "invalid JWKS document from '{url}': {details}")
            }
            Self::UnknownKey { kid } => write!(f, "no signing key with kid '{kid}'"),
        }
    }
}

impl std::error::Error for JwksError {}

/// A decoded signing key.
#[derive(Clone)]
pub struct SigningKey {
    pub key: DecodingKey,
    /// The algorithm the key is pinned to, if the JWK names one.
    pub algorithm: Option<Algorithm>,
}

/// Cached signing keys for one JWKS endpoint.
pub struct JwksCache {
    http: reqwest::Client,
    url: String,
    keys: RwLock<HashMap<String, SigningKey>>,
    /// Start of the last fetch. Held across a fetch so that concurrent
    /// refetches are serialized.
    last_attempt: Mutex<Option<Instant>>,
}

impl JwksCache {
    /// Creates an empty cache for `url`. Call [`refresh`](Self::refresh)
    /// before serving requests.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> Result<Self, Report<JwksError>> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| JwksError::Client {
                details: e.to_string(),
            })?;
        Ok(Self {
            http,
            url: url.into(),
            keys: RwLock::new(HashMap::new()),
            last_attempt: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetches the key set and replaces the cached keys.
    ///
    /// The previous keys stay in place if the fetch fails.
    pub async fn refresh(&self) -> Result<usize, Report<JwksError>> {
        let mut last_attempt = self.last_attempt.lock().await;
        *last_attempt = Some(Instant::now());
        self.fetch().await
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<usize, Report<JwksError>> {
        let response = self
            .http
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| JwksError::Fetch {
                url: self.url.clone(),
                details: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(JwksError::Status {
                url: self.url.clone(),
                status: response.status().as_u16(),
            }
            .into());
        }

        let set: JwkSet = response.json().await.map_err(|e| JwksError::Decode {
            url: self.url.clone(),
            details: e.to_string(),
        })?;

        let keys = signing_keys(&set);
        let count = keys.len();
        *self.keys.write().await = keys;
        info!(keys = count, "JWKS refreshed");
        Ok(count)
    }

    /// Returns the signing key named `kid`, refetching if it is not cached
    /// and no fetch was attempted within the last 30 seconds.
    pub async fn signing_key(&self, kid: &str) -> Result<SigningKey, Report<JwksError>> {
        if let Some(key) = self.cached(kid).await {
            return Ok(key);
        }

        let mut last_attempt = self.last_attempt.lock().await;
        // Another lookup may have refetched while this one waited.
        if let Some(key) = self.cached(kid).await {
            return Ok(key);
        }
        let throttled = last_attempt.is_some_and(|at| at.elapsed() < MIN_REFETCH_INTERVAL);
        if !throttled {
            debug!(kid, "unknown kid, refetching JWKS");
            *last_attempt = Some(Instant::now());
            self.fetch().await?;
            if let Some(key) = self.cached(kid).await {
                return Ok(key);
            }
        }

        Err(JwksError::UnknownKey {
            kid: kid.to_string(),
        }
        .into())
    }

    async fn cached(&self, kid: &str) -> Option<SigningKey> {
        self.keys.read().await.get(kid).cloned()
    }

    /// Starts a task that refreshes the keys every `every`.
    #[must_use]
    pub fn spawn_refresh(self: &Arc<Self>, every: Duration) -> JwksRefreshHandle {
        let cache = Arc::clone(self);
        let every = every.max(Duration::from_secs(1));
        let (stop, mut stopped) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        if let Err(e) = cache.refresh().await {
                            warn!(error = %e, "JWKS refresh failed; keeping cached keys");
                        }
                    }
                }
            }
            debug!("JWKS refresh task stopped");
        });

        JwksRefreshHandle { stop, task }
    }
}

/// Handle to the background refresh task.
pub struct JwksRefreshHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl JwksRefreshHandle {
    /// Stops the task and waits for it to finish.
    pub async fn shutdown(self) {
        // An error means the task already exited.
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "JWKS refresh task panicked");
        }
    }
}

fn signing_keys(set: &JwkSet) -> HashMap<String, SigningKey> {
    set.keys
        .iter()
        .filter(|jwk| !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)))
        .filter_map(|jwk| {
            let kid = jwk.common.key_id.clone()?;
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => Some((
                    kid,
                    SigningKey {
                        key,
                        algorithm: jwk_algorithm(jwk),
                    },
                )),
                Err(e) => {
                    warn!(%kid, error = %e, "skipping unusable JWK");
                    None
                }
            }
        })
        .collect()
}

fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    jwk.common.key_algorithm.as_ref().and_then(|alg| match alg {
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    })
}
