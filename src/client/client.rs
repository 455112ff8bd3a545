//! High-level HMAC client API.
//!
//! Provides `HmacClient<T>` which signs outgoing requests, sends them over an
//! [`HttpTransport`] and verifies the server's response signature before the
//! response is handed back.

use std::time::Duration;

use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderValue, Method, Request, Response, StatusCode, Uri};
use thiserror::Error;
use tracing::{debug, warn};

use crate::codec::{AuthToken, CanonicalMessage, TokenKind, append_token, request_target};
use crate::core::{
    ConfigurationError, DEFAULT_REQUEST_TIMEOUT, HEADER_NAME, HmacError, HttpTransport,
    PROBLEM_CONTENT_TYPE, Problem, ProtocolError, SESSION_HEADER_NAME, TransportError,
};
use crate::crypto::{EngineMode, HmacEngine};

/// Errors that can occur in the HMAC client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Signing failed before anything was sent.
    #[error("signing failed: {0}")]
    Signing(#[from] HmacError),

    /// Session handshake failed; the whole call is aborted.
    #[error("handshake failed: {0}")]
    Handshake(Box<ClientError>),

    /// The response signature could not be verified. The response body
    /// must not be trusted.
    #[error("response authentication failed: {0}")]
    ResponseAuth(HmacError),

    /// The server rejected the request with a problem body.
    ///
    /// The problem is unauthenticated and only useful for diagnostics.
    #[error("unauthorized: {}", .0.detail)]
    Unauthorized(Problem),

    /// The request could not be rebuilt with the token attached.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] http::Error),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The request timed out.
    #[error("request timed out")]
    Timeout,
}

impl From<ConfigurationError> for ClientError {
    fn from(err: ConfigurationError) -> Self {
        ClientError::Signing(err.into())
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        ClientError::Signing(err.into())
    }
}

/// Where a stateless request token travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenPlacement {
    /// In the [`HEADER_NAME`] header; signs `METHOD || URI || BODY`.
    #[default]
    Header,
    /// In the `hmac` query parameter; signs `URI` only.
    Query,
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Token placement for stateless engines. Session engines always use
    /// headers.
    pub placement: TokenPlacement,

    /// Timeout for each transport call, handshake included.
    pub request_timeout: Duration,

    /// Side-effect-free verb used for the session handshake.
    pub handshake_method: Method,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            placement: TokenPlacement::Header,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            handshake_method: Method::GET,
        }
    }
}

/// Builder for creating a `ClientConfig`.
#[derive(Debug)]
pub struct HmacClientBuilder {
    config: ClientConfig,
}

impl HmacClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    /// Set the token placement.
    pub fn placement(mut self, placement: TokenPlacement) -> Self {
        self.config.placement = placement;
        self
    }

    /// Set the request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the handshake verb.
    pub fn handshake_method(mut self, method: Method) -> Self {
        self.config.handshake_method = method;
        self
    }

    /// Build the client configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for HmacClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An HMAC-signing HTTP client.
///
/// Holds at most one engine. A stateless engine allows exactly one `send`.
/// A session engine performs the handshake on the first `send` and then
/// signs every message with the session key.
///
/// Not meant for concurrent use: `send` takes `&mut self` because session
/// state advances with every round trip.
///
/// # Example
///
/// ```ignore
/// use sphinx_hmac::client::{HmacClient, HmacClientBuilder};
/// use sphinx_hmac::crypto::HmacEngine;
///
/// let config = HmacClientBuilder::new().build();
/// let mut client = HmacClient::new(transport, config).with_engine(HmacEngine::session(material));
///
/// let response = client.send(request).await?;
/// ```
pub struct HmacClient<T: HttpTransport> {
    transport: T,
    config: ClientConfig,
    engine: Option<HmacEngine>,
}

impl<T: HttpTransport> HmacClient<T> {
    /// Create a client without an engine.
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            engine: None,
        }
    }

    /// Bind an engine (builder style).
    pub fn with_engine(mut self, engine: HmacEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Bind or replace the engine.
    pub fn set_engine(&mut self, engine: HmacEngine) -> &mut Self {
        self.engine = Some(engine);
        self
    }

    /// The bound engine.
    pub fn engine(&self) -> Option<&HmacEngine> {
        self.engine.as_ref()
    }

    /// Unbind and return the engine.
    pub fn take_engine(&mut self) -> Option<HmacEngine> {
        self.engine.take()
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sign `request`, send it, and verify the response signature.
    ///
    /// # Errors
    /// - `Signing(Configuration(MissingEngine))` if no engine is bound
    /// - `Signing(Protocol(EngineReused))` on a second call with a stateless
    ///   engine, before any network activity
    /// - `Handshake(_)` if session establishment fails
    /// - `ResponseAuth(_)` if the response token is missing or invalid
    pub async fn send(&mut self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, ClientError> {
        let engine = self
            .engine
            .as_mut()
            .ok_or(ConfigurationError::MissingEngine)?;

        match engine.mode() {
            EngineMode::Stateless => {
                let request = sign_stateless(engine, self.config.placement, request)?;
                let response = send_with_timeout(&self.transport, &self.config, request).await?;
                verify_stateless(engine, response)
            }
            EngineMode::Session => {
                if !engine.is_established() {
                    handshake(engine, &self.transport, &self.config, &request)
                        .await
                        .map_err(|e| ClientError::Handshake(Box::new(e)))?;
                }
                let request = sign_session(engine, request)?;
                let result = match send_with_timeout(&self.transport, &self.config, request).await {
                    Ok(response) => verify_session(engine, response),
                    Err(err) => Err(err),
                };
                if result.is_err() {
                    // The server may or may not have advanced; the sequence
                    // can no longer be trusted.
                    engine.terminate();
                }
                result
            }
        }
    }
}

fn sign_stateless(
    engine: &mut HmacEngine,
    placement: TokenPlacement,
    request: Request<Vec<u8>>,
) -> Result<Request<Vec<u8>>, ClientError> {
    let (mut parts, body) = request.into_parts();
    let target = request_target(&parts.uri).to_owned();

    let canonical = match placement {
        TokenPlacement::Header => CanonicalMessage::Request {
            method: parts.method.as_str(),
            uri: &target,
            body: &body,
        },
        TokenPlacement::Query => CanonicalMessage::Uri { uri: &target },
    };
    let signature = engine.sign_request(&canonical.to_bytes())?;
    let token = request_token(engine, signature)?;

    match placement {
        TokenPlacement::Header => {
            parts.headers.insert(HEADER_NAME, header_value(&token)?);
        }
        TokenPlacement::Query => {
            parts.uri = Uri::try_from(append_token(&parts.uri.to_string(), &token))
                .map_err(http::Error::from)?;
        }
    }
    debug!(key_id = %engine.key_id(), ?placement, "signed stateless request");
    Ok(Request::from_parts(parts, body))
}

fn verify_stateless(
    engine: &HmacEngine,
    response: Response<Vec<u8>>,
) -> Result<Response<Vec<u8>>, ClientError> {
    check_problem(&response)?;
    let token = response_token(&response, TokenKind::Response)?;
    let canonical = CanonicalMessage::Response {
        body: response.body(),
    };
    engine
        .verify_response(&canonical.to_bytes(), token.signature())
        .map_err(|err| {
            warn!(key_id = %engine.key_id(), error = %err, "response signature rejected");
            ClientError::ResponseAuth(err)
        })?;
    Ok(response)
}

async fn handshake<T: HttpTransport>(
    engine: &mut HmacEngine,
    transport: &T,
    config: &ClientConfig,
    request: &Request<Vec<u8>>,
) -> Result<(), ClientError> {
    let method = config.handshake_method.clone();
    let target = request_target(request.uri()).to_owned();

    let mut headers = request.headers().clone();
    headers.remove(CONTENT_LENGTH);
    headers.remove(CONTENT_TYPE);

    let canonical = CanonicalMessage::Request {
        method: method.as_str(),
        uri: &target,
        body: b"",
    };
    let signature = engine.sign_request(&canonical.to_bytes())?;
    let token = request_token(engine, signature)?;
    headers.insert(HEADER_NAME, header_value(&token)?);

    let mut establish = Request::builder()
        .method(method)
        .uri(request.uri().clone())
        .version(request.version())
        .body(Vec::new())?;
    *establish.headers_mut() = headers;

    debug!(key_id = %engine.key_id(), "sending session handshake");
    let result = match send_with_timeout(transport, config, establish).await {
        Ok(response) => accept_establish(engine, &response),
        Err(err) => Err(err),
    };
    if result.is_err() {
        engine.terminate();
    }
    result
}

fn accept_establish(engine: &mut HmacEngine, response: &Response<Vec<u8>>) -> Result<(), ClientError> {
    check_problem(response)?;
    let AuthToken::SessionEstablish { nonce2, signature } =
        response_token(response, TokenKind::SessionEstablish)?
    else {
        return Err(ClientError::ResponseAuth(
            ProtocolError::FieldCount {
                expected: TokenKind::SessionEstablish.field_count(),
                actual: 0,
            }
            .into(),
        ));
    };
    engine
        .accept_nonce2(nonce2, &signature)
        .map_err(ClientError::ResponseAuth)
}

fn sign_session(engine: &HmacEngine, request: Request<Vec<u8>>) -> Result<Request<Vec<u8>>, ClientError> {
    let (mut parts, body) = request.into_parts();
    let target = request_target(&parts.uri).to_owned();
    let canonical = CanonicalMessage::Request {
        method: parts.method.as_str(),
        uri: &target,
        body: &body,
    };
    let signature = engine.sign_session_request(&canonical.to_bytes())?;
    let token = AuthToken::SessionMessage { signature }.encode();
    let nonce = engine.nonce().ok_or(ProtocolError::NonceNotBound)?;

    parts.headers.insert(HEADER_NAME, header_value(&token)?);
    parts
        .headers
        .insert(SESSION_HEADER_NAME, header_value(nonce.as_str())?);
    Ok(Request::from_parts(parts, body))
}

fn verify_session(
    engine: &mut HmacEngine,
    response: Response<Vec<u8>>,
) -> Result<Response<Vec<u8>>, ClientError> {
    check_problem(&response)?;
    let token = response_token(&response, TokenKind::SessionMessage)?;
    let canonical = CanonicalMessage::Response {
        body: response.body(),
    };
    engine
        .verify_session_response(&canonical.to_bytes(), token.signature())
        .map_err(ClientError::ResponseAuth)?;
    engine.next_message().map_err(ClientError::ResponseAuth)?;
    Ok(response)
}

async fn send_with_timeout<T: HttpTransport>(
    transport: &T,
    config: &ClientConfig,
    request: Request<Vec<u8>>,
) -> Result<Response<Vec<u8>>, ClientError> {
    match tokio::time::timeout(config.request_timeout, transport.send(request)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ClientError::Timeout),
    }
}

fn request_token(engine: &HmacEngine, signature: crate::crypto::Signature) -> Result<String, ProtocolError> {
    let nonce = engine.nonce().ok_or(ProtocolError::NonceNotBound)?;
    Ok(AuthToken::Request {
        key_id: engine.key_id().clone(),
        nonce: nonce.clone(),
        signature,
    }
    .encode())
}

fn header_value(value: &str) -> Result<HeaderValue, ProtocolError> {
    HeaderValue::from_str(value).map_err(|_| ProtocolError::MalformedHeader)
}

/// Surface a 401 problem body as `Unauthorized`.
fn check_problem(response: &Response<Vec<u8>>) -> Result<(), ClientError> {
    if response.status() != StatusCode::UNAUTHORIZED {
        return Ok(());
    }
    let is_problem = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with(PROBLEM_CONTENT_TYPE));
    if !is_problem {
        return Ok(());
    }
    match serde_json::from_slice::<Problem>(response.body()) {
        Ok(problem) => {
            warn!(detail = %problem.detail, hmac = ?problem.hmac, "server rejected request");
            Err(ClientError::Unauthorized(problem))
        }
        Err(_) => Ok(()),
    }
}

fn response_token(response: &Response<Vec<u8>>, kind: TokenKind) -> Result<AuthToken, ClientError> {
    let value = response
        .headers()
        .get(HEADER_NAME)
        .ok_or_else(|| ProtocolError::MissingToken(format!("{HEADER_NAME} header")))
        .and_then(|v| v.to_str().map_err(|_| ProtocolError::MalformedHeader))
        .map_err(|e| ClientError::ResponseAuth(e.into()))?;
    AuthToken::decode(kind, value).map_err(|e| ClientError::ResponseAuth(e.into()))
}
