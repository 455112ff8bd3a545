//! Server adapters: the wire-encoding and verification strategies.
//!
//! | Adapter | Config names | Token |
//! |---|---|---|
//! | [`AdapterKind::Header`] | `HMACHeaderAdapter`, `header` | `HMAC-Authentication` header, signs `METHOD \|\| URI \|\| BODY` |
//! | [`AdapterKind::Uri`] | `HMACUriAdapter`, `uri` | last `hmac` query parameter, signs `URI` |
//! | [`AdapterKind::SessionHeader`] | `HMACSessionHeaderAdapter`, `session` | handshake, then session messages |
//!
//! Every adapter answers with a signed response. The session adapter
//! answers the handshake itself with an [`AdapterError::Interrupt`].

use std::fmt;
use std::str::FromStr;

use http::request::Parts;
use http::{HeaderValue, Response, StatusCode};
use thiserror::Error;
use tracing::debug;

use super::replay::NonceRegistry;
use super::session::{ServerSession, SessionRegistry};
use crate::codec::{AuthToken, CanonicalMessage, TokenKind, has_token, request_target, split_token};
use crate::core::{
    AuthenticationFailure, ConfigurationError, HEADER_NAME, HmacError, KeyProvider,
    PROTOCOL_VERSION, ProtocolError, SESSION_HEADER_NAME, URI_PARAM_NAME,
};
use crate::crypto::{EngineMode, HmacEngine, KeyId, Nonce};

/// The closed set of adapter variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// Stateless, token in a header.
    Header,
    /// Stateless, token in the query string.
    Uri,
    /// Session handshake and session messages, tokens in headers.
    SessionHeader,
}

impl AdapterKind {
    /// Canonical config name.
    pub fn name(self) -> &'static str {
        match self {
            AdapterKind::Header => "HMACHeaderAdapter",
            AdapterKind::Uri => "HMACUriAdapter",
            AdapterKind::SessionHeader => "HMACSessionHeaderAdapter",
        }
    }

    /// Protocol version this adapter speaks.
    pub fn version(self) -> u32 {
        PROTOCOL_VERSION
    }

    /// Whether the request carries a token this adapter can read.
    pub fn can_handle(self, parts: &Parts) -> bool {
        match self {
            AdapterKind::Header | AdapterKind::SessionHeader => {
                parts.headers.contains_key(HEADER_NAME)
            }
            AdapterKind::Uri => has_token(request_target(&parts.uri)),
        }
    }

    /// Failure detail for a request [`can_handle`](Self::can_handle)
    /// refused.
    pub fn missing_token_message(self) -> String {
        match self {
            AdapterKind::Header | AdapterKind::SessionHeader => {
                format!("HMAC Authentication required: missing {HEADER_NAME} header")
            }
            AdapterKind::Uri => {
                format!("HMAC Authentication required: missing {URI_PARAM_NAME} query parameter")
            }
        }
    }

    /// Verify an inbound request.
    pub(crate) fn authenticate(
        self,
        parts: &Parts,
        body: &[u8],
        env: &AdapterEnv<'_>,
    ) -> Result<RequestContext, AdapterError> {
        let target = request_target(&parts.uri);
        match self {
            AdapterKind::Header => {
                let token = header_token(parts)?;
                let canonical = CanonicalMessage::Request {
                    method: parts.method.as_str(),
                    uri: target,
                    body,
                };
                let engine = verify_plain(token, &canonical.to_bytes(), EngineMode::Stateless, env)?;
                Ok(RequestContext::plain(self, engine))
            }
            AdapterKind::Uri => {
                let split = split_token(target)
                    .map_err(|e| rejected(e, None))?
                    .ok_or_else(|| {
                        rejected(ProtocolError::MissingToken(format!("{URI_PARAM_NAME} query parameter")), None)
                    })?;
                let canonical = CanonicalMessage::Uri {
                    uri: &split.signed_uri,
                };
                let engine =
                    verify_plain(&split.token, &canonical.to_bytes(), EngineMode::Stateless, env)?;
                Ok(RequestContext::plain(self, engine))
            }
            AdapterKind::SessionHeader => {
                let token = header_token(parts)?;
                let canonical = CanonicalMessage::Request {
                    method: parts.method.as_str(),
                    uri: target,
                    body,
                };
                match parts.headers.get(SESSION_HEADER_NAME) {
                    None => Err(establish(token, &canonical.to_bytes(), env)),
                    Some(value) => {
                        let nonce = value
                            .to_str()
                            .map_err(|_| ProtocolError::MalformedHeader)
                            .and_then(Nonce::parse)
                            .map_err(|e| rejected(e, None))?;
                        session_message(nonce, token, &canonical.to_bytes(), env)
                    }
                }
            }
        }
    }

    /// Sign an outgoing response with the request's engine.
    pub(crate) fn sign_response(
        self,
        engine: &mut HmacEngine,
        response: &mut Response<Vec<u8>>,
    ) -> Result<(), HmacError> {
        let canonical = CanonicalMessage::Response {
            body: response.body(),
        }
        .to_bytes();
        let token = match self {
            AdapterKind::Header | AdapterKind::Uri => AuthToken::Response {
                signature: engine.sign_response(&canonical)?,
            },
            AdapterKind::SessionHeader => {
                let signature = engine.sign_session_response(&canonical)?;
                engine.next_message()?;
                AuthToken::SessionMessage { signature }
            }
        };
        response
            .headers_mut()
            .insert(HEADER_NAME, header_value(&token.encode())?);
        Ok(())
    }
}

impl FromStr for AdapterKind {
    type Err = ConfigurationError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "HMACHeaderAdapter" | "header" => Ok(AdapterKind::Header),
            "HMACUriAdapter" | "uri" => Ok(AdapterKind::Uri),
            "HMACSessionHeaderAdapter" | "session" => Ok(AdapterKind::SessionHeader),
            other => Err(ConfigurationError::UnknownAdapter(other.to_owned())),
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why an adapter did not authenticate a request.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Verification failed. `description` is set once key material was
    /// found, for client diagnostics.
    #[error("{error}")]
    Rejected {
        /// The underlying failure.
        error: HmacError,
        /// HMAC scheme of the engine that was built, if any.
        description: Option<&'static str>,
    },

    /// The adapter answered the request itself.
    ///
    /// Not a failure: the response goes to the client as is, bypassing
    /// error formatting and the handler.
    #[error("request answered by the adapter")]
    Interrupt(Box<Response<Vec<u8>>>),
}

fn rejected(error: impl Into<HmacError>, description: Option<&'static str>) -> AdapterError {
    AdapterError::Rejected {
        error: error.into(),
        description,
    }
}

/// Shared server state an adapter needs during one request.
pub(crate) struct AdapterEnv<'a> {
    pub provider: &'a dyn KeyProvider,
    pub provider_key: &'a str,
    pub nonces: &'a NonceRegistry,
    pub sessions: &'a SessionRegistry,
}

/// The authenticated identity, exposed to downstream handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Key id the request was signed with.
    pub key_id: KeyId,
    /// Adapter that verified the request.
    pub adapter: AdapterKind,
}

/// Request-scoped state carried from verification to response signing.
#[derive(Debug)]
pub struct RequestContext {
    identity: Identity,
    binding: Binding,
}

#[derive(Debug)]
enum Binding {
    Plain(HmacEngine),
    Session { nonce: Nonce, session: ServerSession },
}

impl RequestContext {
    fn plain(adapter: AdapterKind, engine: HmacEngine) -> Self {
        Self {
            identity: Identity {
                key_id: engine.key_id().clone(),
                adapter,
            },
            binding: Binding::Plain(engine),
        }
    }

    /// The authenticated identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The engine that verified the request.
    pub fn engine(&self) -> &HmacEngine {
        match &self.binding {
            Binding::Plain(engine) => engine,
            Binding::Session { session, .. } => session.engine(),
        }
    }

    /// Sign `response`; an established session goes back to `sessions`.
    pub(crate) fn sign_response(
        self,
        response: &mut Response<Vec<u8>>,
        sessions: &SessionRegistry,
    ) -> Result<(), HmacError> {
        let adapter = self.identity.adapter;
        match self.binding {
            Binding::Plain(mut engine) => adapter.sign_response(&mut engine, response),
            Binding::Session { nonce, mut session } => {
                adapter.sign_response(session.engine_mut(), response)?;
                sessions.put(&nonce, session);
                Ok(())
            }
        }
    }
}

fn header_token(parts: &Parts) -> Result<&str, AdapterError> {
    let value = parts
        .headers
        .get(HEADER_NAME)
        .ok_or_else(|| rejected(ProtocolError::MissingToken(format!("{HEADER_NAME} header")), None))?;
    value
        .to_str()
        .map_err(|_| rejected(ProtocolError::MalformedHeader, None))
}

fn header_value(value: &str) -> Result<HeaderValue, ProtocolError> {
    HeaderValue::from_str(value).map_err(|_| ProtocolError::MalformedHeader)
}

/// Verify a `version:keyId:nonce:signature` request and return the engine.
fn verify_plain(
    token: &str,
    canonical: &[u8],
    mode: EngineMode,
    env: &AdapterEnv<'_>,
) -> Result<HmacEngine, AdapterError> {
    let AuthToken::Request {
        key_id,
        nonce,
        signature,
    } = AuthToken::decode(TokenKind::Request, token).map_err(|e| rejected(e, None))?
    else {
        return Err(rejected(ProtocolError::MalformedHeader, None));
    };

    let material = env
        .provider
        .lookup(env.provider_key, &key_id)
        .map_err(|e| rejected(e, None))?
        .ok_or_else(|| rejected(AuthenticationFailure::UnknownKeyId(key_id.to_string()), None))?;

    let mut engine = HmacEngine::responder(material, mode);
    let description = Some(engine.description());

    engine
        .bind_nonce(nonce.clone())
        .map_err(|e| rejected(e, description))?;
    engine
        .verify_request(canonical, &signature)
        .map_err(|e| rejected(e, description))?;

    // Only authentic requests consume a nonce.
    if !env.nonces.register(&key_id, &nonce) {
        return Err(rejected(AuthenticationFailure::ReplayedNonce, description));
    }

    debug!(%key_id, ?mode, "hmac request verified");
    Ok(engine)
}

/// Handshake: verify, issue Nonce2, park the session, answer directly.
fn establish(token: &str, canonical: &[u8], env: &AdapterEnv<'_>) -> AdapterError {
    let mut engine = match verify_plain(token, canonical, EngineMode::Session, env) {
        Ok(engine) => engine,
        Err(err) => return err,
    };
    let description = Some(engine.description());

    let (nonce2, signature) = match engine.issue_nonce2() {
        Ok(issued) => issued,
        Err(err) => return rejected(err, description),
    };
    let Some(nonce) = engine.nonce().cloned() else {
        return rejected(ProtocolError::NonceNotBound, description);
    };

    let token = AuthToken::SessionEstablish { nonce2, signature }.encode();
    let value = match header_value(&token) {
        Ok(value) => value,
        Err(err) => return rejected(err, description),
    };

    // A replayed handshake must not replace the live session.
    if !env
        .sessions
        .insert_new(&nonce, ServerSession::new(engine, env.provider_key))
    {
        return rejected(AuthenticationFailure::ReplayedNonce, description);
    }

    let mut response = Response::new(Vec::new());
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(HEADER_NAME, value);
    AdapterError::Interrupt(Box::new(response))
}

fn session_message(
    nonce: Nonce,
    token: &str,
    canonical: &[u8],
    env: &AdapterEnv<'_>,
) -> Result<RequestContext, AdapterError> {
    let token = AuthToken::decode(TokenKind::SessionMessage, token).map_err(|e| rejected(e, None))?;

    let mut session = env
        .sessions
        .take(env.provider_key, &nonce)
        .ok_or_else(|| rejected(AuthenticationFailure::UnknownSession, None))?;
    let description = Some(session.engine().description());

    // On failure the session is not put back.
    session
        .engine_mut()
        .verify_session_request(canonical, token.signature())
        .map_err(|e| rejected(e, description))?;

    let identity = Identity {
        key_id: session.engine().key_id().clone(),
        adapter: AdapterKind::SessionHeader,
    };
    debug!(key_id = %identity.key_id, sequence = session.engine().sequence(), "hmac session message verified");
    Ok(RequestContext {
        identity,
        binding: Binding::Session { nonce, session },
    })
}

#[cfg(test)]
mod tests {
    use http::Request;

    use super::*;
    use crate::crypto::{Algorithm, KeyMaterial, Secret};
    use crate::server::StaticKeyProvider;

    const SECRET: &[u8] = b"adapter-secret";

    fn material() -> KeyMaterial {
        KeyMaterial::new(KeyId::new("app").unwrap(), Secret::new(SECRET.to_vec()), Algorithm::Sha256)
    }

    struct Fixture {
        provider: StaticKeyProvider,
        nonces: NonceRegistry,
        sessions: SessionRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_nonces(NonceRegistry::new())
        }

        fn with_nonces(nonces: NonceRegistry) -> Self {
            Self {
                provider: StaticKeyProvider::new()
                    .with_key("keys", material())
                    .with_key("internal", material()),
                nonces,
                sessions: SessionRegistry::new(),
            }
        }

        fn env(&self) -> AdapterEnv<'_> {
            self.env_for("keys")
        }

        fn env_for<'a>(&'a self, provider_key: &'a str) -> AdapterEnv<'a> {
            AdapterEnv {
                provider: &self.provider,
                provider_key,
                nonces: &self.nonces,
                sessions: &self.sessions,
            }
        }
    }

    /// Run the session handshake for `client` and return the client nonce.
    fn handshake(fixture: &Fixture, client: &mut HmacEngine, provider_key: &str) -> (Parts, Nonce) {
        let canonical = CanonicalMessage::Request { method: "GET", uri: "/stream", body: b"" };
        let signature = client.sign_request(&canonical.to_bytes()).unwrap();
        let nonce = client.nonce().unwrap().clone();
        let token = AuthToken::Request {
            key_id: client.key_id().clone(),
            nonce: nonce.clone(),
            signature,
        };
        let (parts, _) = Request::builder()
            .uri("/stream")
            .header(HEADER_NAME, token.encode())
            .body(())
            .unwrap()
            .into_parts();

        let response = match AdapterKind::SessionHeader.authenticate(&parts, b"", &fixture.env_for(provider_key)) {
            Err(AdapterError::Interrupt(response)) => response,
            other => panic!("unexpected result {other:?}"),
        };
        let header = response.headers()[HEADER_NAME].to_str().unwrap();
        let AuthToken::SessionEstablish { nonce2, signature } =
            AuthToken::decode(TokenKind::SessionEstablish, header).unwrap()
        else {
            panic!("expected a session establish token");
        };
        client.accept_nonce2(nonce2, &signature).unwrap();
        (parts, nonce)
    }

    fn session_request(client: &HmacEngine, nonce: &Nonce, uri: &str) -> Parts {
        let canonical = CanonicalMessage::Request { method: "GET", uri, body: b"" };
        let signature = client.sign_session_request(&canonical.to_bytes()).unwrap();
        Request::builder()
            .uri(uri)
            .header(HEADER_NAME, AuthToken::SessionMessage { signature }.encode())
            .header(SESSION_HEADER_NAME, nonce.as_str())
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    fn rejection(result: Result<RequestContext, AdapterError>) -> HmacError {
        match result {
            Err(AdapterError::Rejected { error, .. }) => error,
            other => panic!("unexpected result {other:?}"),
        }
    }

    fn signed_header_request(method: &str, uri: &str, body: &[u8]) -> (Parts, Vec<u8>) {
        let mut client = HmacEngine::new(material());
        let canonical = CanonicalMessage::Request { method, uri, body }.to_bytes();
        let signature = client.sign_request(&canonical).unwrap();
        let token = AuthToken::Request {
            key_id: client.key_id().clone(),
            nonce: client.nonce().unwrap().clone(),
            signature,
        };
        let (parts, body) = Request::builder()
            .method(method)
            .uri(uri)
            .header(HEADER_NAME, token.encode())
            .body(body.to_vec())
            .unwrap()
            .into_parts();
        (parts, body)
    }

    #[test]
    fn test_adapter_names() {
        assert_eq!("HMACHeaderAdapter".parse::<AdapterKind>(), Ok(AdapterKind::Header));
        assert_eq!("uri".parse::<AdapterKind>(), Ok(AdapterKind::Uri));
        assert_eq!("HMACSessionHeaderAdapter".parse::<AdapterKind>(), Ok(AdapterKind::SessionHeader));
        assert_eq!(
            "HMACAdapterDefault".parse::<AdapterKind>(),
            Err(ConfigurationError::UnknownAdapter("HMACAdapterDefault".into()))
        );
        assert_eq!(AdapterKind::Uri.to_string(), "HMACUriAdapter");
    }

    #[test]
    fn test_can_handle() {
        let (parts, _) = Request::builder().uri("/x?hmac=1").body(()).unwrap().into_parts();
        assert!(AdapterKind::Uri.can_handle(&parts));
        assert!(!AdapterKind::Header.can_handle(&parts));

        let (parts, _) = Request::builder()
            .uri("/x")
            .header(HEADER_NAME, "1:abc")
            .body(())
            .unwrap()
            .into_parts();
        assert!(AdapterKind::SessionHeader.can_handle(&parts));
        assert!(!AdapterKind::Uri.can_handle(&parts));
    }

    #[test]
    fn test_header_authenticate_and_sign() {
        let fixture = Fixture::new();
        let (parts, body) = signed_header_request("POST", "/orders?x=1", b"{\"n\":1}");

        let ctx = AdapterKind::Header
            .authenticate(&parts, &body, &fixture.env())
            .unwrap();
        assert_eq!(ctx.identity().key_id.as_str(), "app");
        assert_eq!(ctx.identity().adapter, AdapterKind::Header);

        let mut response = Response::new(b"created".to_vec());
        ctx.sign_response(&mut response, &fixture.sessions).unwrap();
        let token = response.headers()[HEADER_NAME].to_str().unwrap();
        assert!(AuthToken::decode(TokenKind::Response, token).is_ok());
    }

    #[test]
    fn test_header_replay_rejected() {
        let fixture = Fixture::new();
        let (parts, body) = signed_header_request("GET", "/orders", b"");

        assert!(AdapterKind::Header.authenticate(&parts, &body, &fixture.env()).is_ok());
        match AdapterKind::Header.authenticate(&parts, &body, &fixture.env()) {
            Err(AdapterError::Rejected { error, description }) => {
                assert_eq!(error, HmacError::from(AuthenticationFailure::ReplayedNonce));
                assert_eq!(description, Some("HMAC-SHA256"));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_header_tampered_body() {
        let fixture = Fixture::new();
        let (parts, _) = signed_header_request("POST", "/orders", b"amount=1");

        match AdapterKind::Header.authenticate(&parts, b"amount=9", &fixture.env()) {
            Err(AdapterError::Rejected { error, .. }) => {
                assert_eq!(error, HmacError::from(AuthenticationFailure::SignatureMismatch));
            }
            other => panic!("unexpected result {other:?}"),
        }
        // A forged request does not burn the nonce
        assert!(fixture.nonces.is_empty());
    }

    #[test]
    fn test_unknown_key_id() {
        let fixture = Fixture::new();
        let (parts, _) = Request::builder()
            .uri("/")
            .header(HEADER_NAME, "1:ghost:abcd:00ff")
            .body(())
            .unwrap()
            .into_parts();

        match AdapterKind::Header.authenticate(&parts, b"", &fixture.env()) {
            Err(AdapterError::Rejected { error, description }) => {
                assert_eq!(error, AuthenticationFailure::UnknownKeyId("ghost".into()).into());
                assert_eq!(description, None);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_uri_authenticate() {
        let fixture = Fixture::new();
        let mut client = HmacEngine::new(material());
        let signature = client
            .sign_request(&CanonicalMessage::Uri { uri: "/files?id=7" }.to_bytes())
            .unwrap();
        let token = AuthToken::Request {
            key_id: client.key_id().clone(),
            nonce: client.nonce().unwrap().clone(),
            signature,
        };
        let uri = crate::codec::append_token("/files?id=7", &token.encode());
        let (parts, _) = Request::builder().uri(uri).body(()).unwrap().into_parts();

        let ctx = AdapterKind::Uri.authenticate(&parts, b"", &fixture.env()).unwrap();
        assert_eq!(ctx.identity().adapter, AdapterKind::Uri);
    }

    #[test]
    fn test_session_handshake_interrupts() {
        let fixture = Fixture::new();
        let (parts, body) = signed_header_request("GET", "/stream", b"");

        let response = match AdapterKind::SessionHeader.authenticate(&parts, &body, &fixture.env()) {
            Err(AdapterError::Interrupt(response)) => response,
            other => panic!("unexpected result {other:?}"),
        };
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.body().is_empty());
        let token = response.headers()[HEADER_NAME].to_str().unwrap();
        assert!(matches!(
            AuthToken::decode(TokenKind::SessionEstablish, token),
            Ok(AuthToken::SessionEstablish { .. })
        ));
        assert_eq!(fixture.sessions.len(), 1);
    }

    #[test]
    fn test_session_message_for_unknown_session() {
        let fixture = Fixture::new();
        let (parts, _) = Request::builder()
            .uri("/stream")
            .header(HEADER_NAME, "1:00ff")
            .header(SESSION_HEADER_NAME, Nonce::generate().as_str())
            .body(())
            .unwrap()
            .into_parts();

        match AdapterKind::SessionHeader.authenticate(&parts, b"", &fixture.env()) {
            Err(AdapterError::Rejected { error, .. }) => {
                assert_eq!(error, HmacError::from(AuthenticationFailure::UnknownSession));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_header_tampered_method_and_uri() {
        let fixture = Fixture::new();
        let (parts, body) = signed_header_request("POST", "/orders?id=7", b"amount=1");

        let mut method = parts.clone();
        method.method = http::Method::PUT;
        let mut path = parts.clone();
        path.uri = "/orderz?id=7".parse().unwrap();
        let mut query = parts.clone();
        query.uri = "/orders?id=8".parse().unwrap();

        for tampered in [method, path, query] {
            assert_eq!(
                rejection(AdapterKind::Header.authenticate(&tampered, &body, &fixture.env())),
                HmacError::from(AuthenticationFailure::SignatureMismatch)
            );
        }
        assert!(AdapterKind::Header.authenticate(&parts, &body, &fixture.env()).is_ok());
    }

    #[test]
    fn test_session_message_verified_and_parked_again() {
        let fixture = Fixture::new();
        let mut client = HmacEngine::session(material());
        let (_, nonce) = handshake(&fixture, &mut client, "keys");

        let parts = session_request(&client, &nonce, "/stream/1");
        let ctx = AdapterKind::SessionHeader
            .authenticate(&parts, b"", &fixture.env())
            .unwrap();
        assert_eq!(ctx.identity().adapter, AdapterKind::SessionHeader);
        assert!(fixture.sessions.is_empty());

        let mut response = Response::new(b"chunk".to_vec());
        ctx.sign_response(&mut response, &fixture.sessions).unwrap();
        assert_eq!(fixture.sessions.len(), 1);
    }

    #[test]
    fn test_session_bound_to_its_key_set() {
        let fixture = Fixture::new();
        let mut client = HmacEngine::session(material());
        let (_, nonce) = handshake(&fixture, &mut client, "keys");

        // Same key material, but the route resolves to another provider entry
        let parts = session_request(&client, &nonce, "/admin");
        assert_eq!(
            rejection(AdapterKind::SessionHeader.authenticate(&parts, b"", &fixture.env_for("internal"))),
            HmacError::from(AuthenticationFailure::UnknownSession)
        );

        // The session stays usable on its own routes
        assert!(AdapterKind::SessionHeader.authenticate(&parts, b"", &fixture.env()).is_ok());
    }

    #[test]
    fn test_replayed_handshake_keeps_live_session() {
        // Nonces are forgotten at once, so only the session registry stands guard
        let fixture = Fixture::with_nonces(NonceRegistry::with_limits(std::time::Duration::ZERO, 16));
        let mut client = HmacEngine::session(material());
        let (handshake_parts, nonce) = handshake(&fixture, &mut client, "keys");

        assert_eq!(
            rejection(AdapterKind::SessionHeader.authenticate(&handshake_parts, b"", &fixture.env())),
            HmacError::from(AuthenticationFailure::ReplayedNonce)
        );
        assert_eq!(fixture.sessions.len(), 1);

        let parts = session_request(&client, &nonce, "/stream/1");
        assert!(AdapterKind::SessionHeader.authenticate(&parts, b"", &fixture.env()).is_ok());
    }
}
