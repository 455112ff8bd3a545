//! High-level HMAC server API.
//!
//! Provides `HmacServer`, the framework-independent verification pipeline.
//! It runs in two stages around the application handler:
//!
//! 1. [`HmacServer::verify`] resolves the route, picks the adapter, and
//!    verifies the request.
//! 2. [`HmacServer::sign_response`] signs whatever the handler produced,
//!    using the [`RequestContext`] returned by the first stage.

use std::sync::Arc;
use std::time::Duration;

use http::header::CONTENT_TYPE;
use http::request::Parts;
use http::{HeaderValue, Response, StatusCode};
use tracing::{debug, warn};

use super::adapter::{AdapterEnv, AdapterError, AdapterKind, RequestContext};
use super::config::{HmacServerConfig, Resolution, RouteIdentity};
use super::replay::NonceRegistry;
use super::session::SessionRegistry;
use crate::core::{
    ConfigurationError, HmacError, KeyProvider, NONCE_REGISTRY_CAPACITY, NONCE_RETENTION,
    PROBLEM_CONTENT_TYPE, Problem, SESSION_IDLE_TIMEOUT, SESSION_REGISTRY_CAPACITY,
};

/// Outcome of the verification stage.
#[derive(Debug)]
pub enum Verification {
    /// HMAC does not apply to this route; run the handler untouched.
    PassThrough,
    /// Verified. Run the handler, then sign its response with the context.
    Authenticated(RequestContext),
    /// Verification failed; send this 401 problem response.
    Rejected(Response<Vec<u8>>),
    /// The adapter answered the request itself; send this response as is.
    Interrupted(Response<Vec<u8>>),
}

/// Builder for creating an `HmacServer`.
pub struct HmacServerBuilder {
    config: HmacServerConfig,
    provider: Option<Arc<dyn KeyProvider>>,
    nonce_retention: Duration,
    nonce_capacity: usize,
    session_idle_timeout: Duration,
    session_capacity: usize,
}

impl HmacServerBuilder {
    /// Create a new server builder.
    pub fn new(config: HmacServerConfig) -> Self {
        Self {
            config,
            provider: None,
            nonce_retention: NONCE_RETENTION,
            nonce_capacity: NONCE_REGISTRY_CAPACITY,
            session_idle_timeout: SESSION_IDLE_TIMEOUT,
            session_capacity: SESSION_REGISTRY_CAPACITY,
        }
    }

    /// Set the key provider.
    pub fn key_provider(mut self, provider: impl KeyProvider + 'static) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    /// Set a shared key provider.
    pub fn shared_key_provider(mut self, provider: Arc<dyn KeyProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// How long request nonces are remembered.
    ///
    /// Never shorter than the session idle timeout, so a handshake cannot be
    /// replayed while the session it opened may still be alive.
    pub fn nonce_retention(mut self, retention: Duration) -> Self {
        self.nonce_retention = retention;
        self
    }

    /// Upper bound on remembered nonces.
    pub fn nonce_capacity(mut self, capacity: usize) -> Self {
        self.nonce_capacity = capacity;
        self
    }

    /// Idle time after which a session is dropped.
    pub fn session_idle_timeout(mut self, timeout: Duration) -> Self {
        self.session_idle_timeout = timeout;
        self
    }

    /// Upper bound on established sessions.
    pub fn session_capacity(mut self, capacity: usize) -> Self {
        self.session_capacity = capacity;
        self
    }

    /// Build the server.
    ///
    /// # Errors
    /// `ConfigurationError::MissingKeyProvider` if no provider was set.
    pub fn build(self) -> Result<HmacServer, ConfigurationError> {
        let provider = self.provider.ok_or(ConfigurationError::MissingKeyProvider)?;
        Ok(HmacServer {
            config: self.config,
            provider,
            nonces: NonceRegistry::with_limits(
                self.nonce_retention.max(self.session_idle_timeout),
                self.nonce_capacity,
            ),
            sessions: SessionRegistry::with_limits(self.session_idle_timeout, self.session_capacity),
        })
    }
}

/// HMAC verification pipeline.
///
/// Shared across concurrent requests: the configuration and provider are
/// read-only, and the replay and session registries are internally locked.
/// Each request gets its own engine.
pub struct HmacServer {
    config: HmacServerConfig,
    provider: Arc<dyn KeyProvider>,
    nonces: NonceRegistry,
    sessions: SessionRegistry,
}

impl HmacServer {
    /// Start building a server for `config`.
    pub fn builder(config: HmacServerConfig) -> HmacServerBuilder {
        HmacServerBuilder::new(config)
    }

    /// The route configuration.
    pub fn config(&self) -> &HmacServerConfig {
        &self.config
    }

    /// Established sessions currently parked.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Verification stage.
    ///
    /// `body` must be the raw request payload exactly as received.
    ///
    /// # Errors
    /// Configuration errors (missing selector or adapter, unknown selector,
    /// unknown adapter name, unknown provider entry). These are operator
    /// problems and must not be turned into a pass-through.
    pub fn verify(
        &self,
        route: &RouteIdentity,
        parts: &Parts,
        body: &[u8],
    ) -> Result<Verification, ConfigurationError> {
        let (selector, adapter) = match self.config.resolve(route)? {
            Resolution::NotRequired | Resolution::Disabled => {
                debug!(controller = %route.controller, method = %route.method, "hmac not required");
                return Ok(Verification::PassThrough);
            }
            Resolution::Required { selector, adapter } => (selector, adapter),
        };
        let provider_key = self.config.provider_key(&selector)?;
        let adapter: AdapterKind = adapter.parse()?;

        if !adapter.can_handle(parts) {
            warn!(%adapter, uri = %parts.uri, "hmac token missing");
            return Ok(Verification::Rejected(problem_response(
                adapter.missing_token_message(),
                parts,
                None,
                adapter,
            )));
        }

        let env = AdapterEnv {
            provider: &*self.provider,
            provider_key,
            nonces: &self.nonces,
            sessions: &self.sessions,
        };
        match adapter.authenticate(parts, body, &env) {
            Ok(ctx) => Ok(Verification::Authenticated(ctx)),
            Err(AdapterError::Interrupt(response)) => Ok(Verification::Interrupted(*response)),
            Err(AdapterError::Rejected {
                error: HmacError::Configuration(err),
                ..
            }) => Err(err),
            Err(AdapterError::Rejected { error, description }) => {
                warn!(%adapter, uri = %parts.uri, %error, "hmac authentication failed");
                Ok(Verification::Rejected(problem_response(
                    format!("HMAC ERROR: {error}"),
                    parts,
                    description,
                    adapter,
                )))
            }
        }
    }

    /// Response signing stage.
    ///
    /// Attaches the response token. For session requests the session is
    /// parked again for its next message; if signing fails it is dropped.
    pub fn sign_response(
        &self,
        ctx: RequestContext,
        response: &mut Response<Vec<u8>>,
    ) -> Result<(), HmacError> {
        ctx.sign_response(response, &self.sessions)
    }
}

fn problem_response(
    detail: String,
    parts: &Parts,
    description: Option<&'static str>,
    adapter: AdapterKind,
) -> Response<Vec<u8>> {
    let mut problem = Problem::unauthorized([detail], parts.uri.to_string());
    if let Some(description) = description {
        problem = problem.with_hmac(description, adapter.version());
    }

    let mut response = Response::new(problem.to_json());
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(PROBLEM_CONTENT_TYPE));
    response
}
