//! The HMAC engine.
//!
//! One engine serves one logical connection. It holds the secret, the key
//! id, the nonce and the session state, and it enforces the protocol's
//! ordering rules:
//!
//! - A stateless engine signs or verifies at most one request.
//! - A session engine signs or verifies session messages only after the
//!   handshake's Nonce2 signature has been verified.
//! - Any verification failure inside a session terminates it.
//!
//! # Concurrency
//!
//! Session state is mutated in place across the handshake and every round
//! trip, so an engine is not meant to be shared between concurrent calls.
//! Use one engine per in-flight session, or serialize access to a shared
//! engine behind a mutex.

use tracing::debug;

use crate::core::{HmacError, ProtocolError, SessionStateError};

use super::{
    Algorithm, KeyId, KeyMaterial, Nonce, Secret, SessionKey, SessionMachine, SessionPhase,
    Signature,
    mac::{MacInput, SignContext},
};

/// Which side of the exchange this engine is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Client: generates its nonce at construction.
    Initiator,
    /// Server: binds the nonce received in the request token.
    Responder,
}

/// Whether the engine supports sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// One request, one response.
    Stateless,
    /// Handshake followed by any number of session messages.
    Session,
}

/// Computes and verifies signatures for one logical connection.
#[derive(Debug)]
pub struct HmacEngine {
    role: Role,
    mode: EngineMode,
    key_id: KeyId,
    secret: Secret,
    algorithm: Algorithm,
    nonce: Option<Nonce>,
    /// Plain (non-session) requests signed or verified so far.
    requests: u64,
    session: SessionMachine,
}

impl HmacEngine {
    /// Create a stateless client engine with a fresh nonce.
    pub fn new(material: KeyMaterial) -> Self {
        Self::build(material, Role::Initiator, EngineMode::Stateless)
    }

    /// Create a session-capable client engine with a fresh nonce.
    pub fn session(material: KeyMaterial) -> Self {
        Self::build(material, Role::Initiator, EngineMode::Session)
    }

    /// Create a server engine. The client nonce is bound later with
    /// [`bind_nonce`](Self::bind_nonce).
    pub fn responder(material: KeyMaterial, mode: EngineMode) -> Self {
        Self::build(material, Role::Responder, mode)
    }

    fn build(material: KeyMaterial, role: Role, mode: EngineMode) -> Self {
        let (key_id, secret, algorithm) = material.into_parts();
        let nonce = match role {
            Role::Initiator => Some(Nonce::generate()),
            Role::Responder => None,
        };
        Self {
            role,
            mode,
            key_id,
            secret,
            algorithm,
            nonce,
            requests: 0,
            session: SessionMachine::new(),
        }
    }

    /// Bind the nonce received from the client (responder only, once).
    pub fn bind_nonce(&mut self, nonce: Nonce) -> Result<(), ProtocolError> {
        if self.nonce.is_some() {
            return Err(ProtocolError::NonceAlreadyBound);
        }
        self.nonce = Some(nonce);
        Ok(())
    }

    /// Engine role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Engine mode.
    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    /// Key id.
    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    /// Nonce, once generated or bound.
    pub fn nonce(&self) -> Option<&Nonce> {
        self.nonce.as_ref()
    }

    /// Keyed-hash algorithm.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Human-readable scheme description.
    pub fn description(&self) -> &'static str {
        self.algorithm.description()
    }

    /// Current session phase (`NotStarted` for stateless engines).
    pub fn session_phase(&self) -> SessionPhase {
        self.session.phase()
    }

    /// Verified session round trips so far.
    pub fn sequence(&self) -> u64 {
        self.session.sequence()
    }

    /// Whether a session is established.
    pub fn is_established(&self) -> bool {
        self.session.is_established()
    }

    // =========================================================================
    // Primitives
    // =========================================================================

    /// Compute the signature of `canonical` for message kind `context`.
    ///
    /// Deterministic: same secret, nonce, context and bytes give the same
    /// digest. Session contexts are keyed by the derived session key and
    /// bound to the current sequence number.
    pub fn compute_signature(
        &self,
        canonical: &[u8],
        context: SignContext,
    ) -> Result<Signature, HmacError> {
        self.with_input(canonical, context, |input| Ok(input.sign()?))
    }

    /// Recompute and compare in constant time.
    pub fn verify(
        &self,
        canonical: &[u8],
        signature: &Signature,
        context: SignContext,
    ) -> Result<(), HmacError> {
        self.with_input(canonical, context, |input| input.verify(signature))
    }

    fn with_input<T>(
        &self,
        canonical: &[u8],
        context: SignContext,
        f: impl FnOnce(&MacInput<'_>) -> Result<T, HmacError>,
    ) -> Result<T, HmacError> {
        if context.is_session_message() {
            self.require_session_mode()?;
            let key = self.session.key()?;
            let sequence = self.session.sequence().to_be_bytes();
            let binding: [&[u8]; 1] = [&sequence];
            return f(&MacInput {
                key: key.expose(),
                algorithm: self.algorithm,
                context,
                binding: &binding,
                canonical,
            });
        }

        let nonce = self.nonce.as_ref().ok_or(ProtocolError::NonceNotBound)?;
        let binding: [&[u8]; 4] = [
            self.key_id.as_str().as_bytes(),
            &[0x00],
            nonce.as_str().as_bytes(),
            &[0x00],
        ];
        f(&MacInput {
            key: self.secret.expose(),
            algorithm: self.algorithm,
            context,
            binding: &binding,
            canonical,
        })
    }

    // =========================================================================
    // Plain (non-session) messages
    // =========================================================================

    /// Sign the single plain request this engine may send.
    ///
    /// On a session engine this is the handshake request and moves the
    /// session to `Establishing`.
    ///
    /// # Errors
    /// `ProtocolError::EngineReused` on a second call.
    pub fn sign_request(&mut self, canonical: &[u8]) -> Result<Signature, HmacError> {
        self.claim_request()?;
        let signature = self.compute_signature(canonical, SignContext::Request)?;
        if self.mode == EngineMode::Session {
            self.session.begin_establish()?;
        }
        Ok(signature)
    }

    /// Verify the single plain request this engine may accept.
    ///
    /// On a session engine this is the handshake request; success moves the
    /// session to `Establishing`, failure terminates it.
    pub fn verify_request(
        &mut self,
        canonical: &[u8],
        signature: &Signature,
    ) -> Result<(), HmacError> {
        self.claim_request()?;
        let result = self.verify(canonical, signature, SignContext::Request);
        if self.mode == EngineMode::Session {
            match &result {
                Ok(()) => self.session.begin_establish()?,
                Err(_) => self.session.fail(),
            }
        }
        result
    }

    /// Sign a stateless response body.
    pub fn sign_response(&self, canonical: &[u8]) -> Result<Signature, HmacError> {
        self.compute_signature(canonical, SignContext::Response)
    }

    /// Verify a stateless response body.
    pub fn verify_response(&self, canonical: &[u8], signature: &Signature) -> Result<(), HmacError> {
        self.verify(canonical, signature, SignContext::Response)
    }

    fn claim_request(&mut self) -> Result<(), HmacError> {
        if self.requests > 0 {
            return Err(ProtocolError::EngineReused.into());
        }
        self.requests += 1;
        Ok(())
    }

    // =========================================================================
    // Session establishment
    // =========================================================================

    /// Server side of the handshake: issue a Nonce2, sign it, and establish
    /// the session.
    ///
    /// Requires a verified handshake request (`Establishing`).
    pub fn issue_nonce2(&mut self) -> Result<(Nonce, Signature), HmacError> {
        self.require_session_mode()?;
        let phase = self.session.phase();
        if phase != SessionPhase::Establishing {
            return Err(match phase {
                SessionPhase::Established => SessionStateError::AlreadyEstablished,
                SessionPhase::Terminated(_) => SessionStateError::Terminated,
                phase => SessionStateError::NotEstablished(phase),
            }
            .into());
        }

        let nonce2 = Nonce::generate();
        let signature = self.compute_signature(nonce2.as_str().as_bytes(), SignContext::SessionEstablish)?;
        self.start_session(nonce2.clone())?;
        Ok((nonce2, signature))
    }

    /// Client side of the handshake: verify the server's Nonce2 signature
    /// and establish the session.
    ///
    /// Any failure terminates the session.
    pub fn accept_nonce2(&mut self, nonce2: Nonce, signature: &Signature) -> Result<(), HmacError> {
        self.require_session_mode()?;
        let result = self
            .verify(nonce2.as_str().as_bytes(), signature, SignContext::SessionEstablish)
            .and_then(|()| self.start_session(nonce2));
        if result.is_err() {
            self.session.fail();
        }
        result
    }

    /// `Establishing -> Established`: derive the session key from both
    /// nonces.
    ///
    /// Unchecked: only reachable through [`issue_nonce2`](Self::issue_nonce2)
    /// and [`accept_nonce2`](Self::accept_nonce2), after the Nonce2
    /// signature exists or was verified. A second call fails with
    /// `SessionStateError::AlreadyEstablished`.
    fn start_session(&mut self, nonce2: Nonce) -> Result<(), HmacError> {
        self.require_session_mode()?;
        let nonce = self.nonce.as_ref().ok_or(ProtocolError::NonceNotBound)?;
        let key = SessionKey::derive(&self.secret, nonce, &nonce2)?;
        self.session.establish(nonce2, key)?;
        debug!(key_id = %self.key_id, "hmac session established");
        Ok(())
    }

    // =========================================================================
    // Session messages
    // =========================================================================

    /// Sign a client to server session message.
    pub fn sign_session_request(&self, canonical: &[u8]) -> Result<Signature, HmacError> {
        self.compute_signature(canonical, SignContext::SessionRequest)
    }

    /// Verify a client to server session message. Failure terminates the
    /// session.
    pub fn verify_session_request(
        &mut self,
        canonical: &[u8],
        signature: &Signature,
    ) -> Result<(), HmacError> {
        self.verify_session(canonical, signature, SignContext::SessionRequest)
    }

    /// Sign a server to client session message.
    pub fn sign_session_response(&self, canonical: &[u8]) -> Result<Signature, HmacError> {
        self.compute_signature(canonical, SignContext::SessionResponse)
    }

    /// Verify a server to client session message. Failure terminates the
    /// session.
    pub fn verify_session_response(
        &mut self,
        canonical: &[u8],
        signature: &Signature,
    ) -> Result<(), HmacError> {
        self.verify_session(canonical, signature, SignContext::SessionResponse)
    }

    fn verify_session(
        &mut self,
        canonical: &[u8],
        signature: &Signature,
        context: SignContext,
    ) -> Result<(), HmacError> {
        let result = self.verify(canonical, signature, context);
        if matches!(result, Err(HmacError::Authentication(_))) {
            self.session.fail();
        }
        result
    }

    /// Advance the sequence counter after a fully verified round trip.
    pub fn next_message(&mut self) -> Result<u64, HmacError> {
        self.require_session_mode()?;
        Ok(self.session.advance()?)
    }

    /// Terminate the session after a transport or protocol failure.
    pub fn terminate(&mut self) {
        self.session.fail();
    }

    /// Close the session deliberately.
    pub fn close(&mut self) {
        self.session.close();
    }

    fn require_session_mode(&self) -> Result<(), SessionStateError> {
        match self.mode {
            EngineMode::Session => Ok(()),
            EngineMode::Stateless => Err(SessionStateError::NotSessionCapable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AuthenticationFailure;
    use crate::crypto::TerminationReason;

    fn material() -> KeyMaterial {
        KeyMaterial::new(
            KeyId::new("app").unwrap(),
            Secret::new(b"0123456789abcdef".to_vec()),
            Algorithm::Sha256,
        )
    }

    fn responder_for(client: &HmacEngine, mode: EngineMode) -> HmacEngine {
        let mut server = HmacEngine::responder(material(), mode);
        server.bind_nonce(client.nonce().unwrap().clone()).unwrap();
        server
    }

    /// Run a full handshake and return both established engines.
    fn established_pair() -> (HmacEngine, HmacEngine) {
        let mut client = HmacEngine::session(material());
        let mut server = responder_for(&client, EngineMode::Session);

        let sig = client.sign_request(b"GET/session").unwrap();
        server.verify_request(b"GET/session", &sig).unwrap();
        let (nonce2, sig2) = server.issue_nonce2().unwrap();
        client.accept_nonce2(nonce2, &sig2).unwrap();
        (client, server)
    }

    #[test]
    fn test_stateless_roundtrip() {
        let mut client = HmacEngine::new(material());
        let mut server = responder_for(&client, EngineMode::Stateless);

        let sig = client.sign_request(b"POST/things{}").unwrap();
        server.verify_request(b"POST/things{}", &sig).unwrap();

        let rsig = server.sign_response(b"{\"ok\":true}").unwrap();
        client.verify_response(b"{\"ok\":true}", &rsig).unwrap();
    }

    #[test]
    fn test_tamper_detected() {
        let mut client = HmacEngine::new(material());
        let mut server = responder_for(&client, EngineMode::Stateless);

        let sig = client.sign_request(b"POST/things{}").unwrap();
        assert_eq!(
            server.verify_request(b"POST/things{ }", &sig),
            Err(AuthenticationFailure::SignatureMismatch.into())
        );
    }

    #[test]
    fn test_method_and_uri_tamper_detected() {
        use crate::codec::CanonicalMessage;

        let mut client = HmacEngine::new(material());
        let signed = CanonicalMessage::Request { method: "POST", uri: "/things?page=2", body: b"{}" };
        let sig = client.sign_request(&signed.to_bytes()).unwrap();

        for (method, uri) in [("PUT", "/things?page=2"), ("POST", "/thing5?page=2"), ("POST", "/things?page=3")] {
            let mut server = responder_for(&client, EngineMode::Stateless);
            let tampered = CanonicalMessage::Request { method, uri, body: b"{}" };
            assert_eq!(
                server.verify_request(&tampered.to_bytes(), &sig),
                Err(AuthenticationFailure::SignatureMismatch.into())
            );
        }
    }

    #[test]
    fn test_nonce_is_bound_into_signature() {
        let mut client = HmacEngine::new(material());
        let mut server = HmacEngine::responder(material(), EngineMode::Stateless);
        server.bind_nonce(Nonce::generate()).unwrap();

        let sig = client.sign_request(b"GET/").unwrap();
        assert!(server.verify_request(b"GET/", &sig).is_err());
    }

    #[test]
    fn test_stateless_single_use() {
        let mut client = HmacEngine::new(material());
        client.sign_request(b"GET/a").unwrap();
        assert_eq!(
            client.sign_request(b"GET/b"),
            Err(ProtocolError::EngineReused.into())
        );
    }

    #[test]
    fn test_responder_requires_nonce() {
        let server = HmacEngine::responder(material(), EngineMode::Stateless);
        assert_eq!(
            server.sign_response(b"x"),
            Err(ProtocolError::NonceNotBound.into())
        );
    }

    #[test]
    fn test_bind_nonce_once() {
        let mut client = HmacEngine::new(material());
        assert_eq!(
            client.bind_nonce(Nonce::generate()),
            Err(ProtocolError::NonceAlreadyBound)
        );
    }

    #[test]
    fn test_session_message_before_establish() {
        let client = HmacEngine::session(material());
        assert_eq!(
            client.sign_session_request(b"GET/x"),
            Err(SessionStateError::NotEstablished(SessionPhase::NotStarted).into())
        );
    }

    #[test]
    fn test_stateless_engine_rejects_session_ops() {
        let mut client = HmacEngine::new(material());
        assert_eq!(
            client.sign_session_request(b"GET/x"),
            Err(SessionStateError::NotSessionCapable.into())
        );
        assert_eq!(
            client.next_message(),
            Err(SessionStateError::NotSessionCapable.into())
        );
    }

    #[test]
    fn test_session_roundtrips_advance_sequence() {
        let (mut client, mut server) = established_pair();
        assert!(client.is_established());
        assert!(server.is_established());

        for expected in 1..=3 {
            let sig = client.sign_session_request(b"POST/items[1]").unwrap();
            server.verify_session_request(b"POST/items[1]", &sig).unwrap();
            let rsig = server.sign_session_response(b"ok").unwrap();
            server.next_message().unwrap();
            client.verify_session_response(b"ok", &rsig).unwrap();
            assert_eq!(client.next_message().unwrap(), expected);
        }
    }

    #[test]
    fn test_session_replay_of_old_message_fails() {
        let (mut client, mut server) = established_pair();

        let sig = client.sign_session_request(b"GET/a").unwrap();
        server.verify_session_request(b"GET/a", &sig).unwrap();
        server.next_message().unwrap();
        client.next_message().unwrap();

        // The same signature is bound to sequence 0
        assert!(server.verify_session_request(b"GET/a", &sig).is_err());
        assert_eq!(
            server.session_phase(),
            SessionPhase::Terminated(TerminationReason::Error)
        );
    }

    #[test]
    fn test_request_signature_is_not_a_response_signature() {
        let (client, mut server) = established_pair();
        let sig = client.sign_session_request(b"same").unwrap();
        assert!(server.verify_session_response(b"same", &sig).is_err());
    }

    #[test]
    fn test_bad_nonce2_terminates() {
        let mut client = HmacEngine::session(material());
        let mut server = responder_for(&client, EngineMode::Session);

        let sig = client.sign_request(b"GET/").unwrap();
        server.verify_request(b"GET/", &sig).unwrap();
        let (_nonce2, sig2) = server.issue_nonce2().unwrap();

        let forged = Nonce::generate();
        assert!(client.accept_nonce2(forged, &sig2).is_err());
        assert_eq!(
            client.session_phase(),
            SessionPhase::Terminated(TerminationReason::Error)
        );
        assert_eq!(
            client.sign_session_request(b"GET/"),
            Err(SessionStateError::Terminated.into())
        );
    }

    #[test]
    fn test_start_session_twice_is_error() {
        let (mut client, _server) = established_pair();
        assert_eq!(
            client.start_session(Nonce::generate()),
            Err(SessionStateError::AlreadyEstablished.into())
        );
    }

    #[test]
    fn test_second_handshake_is_already_established() {
        let mut client = HmacEngine::session(material());
        let mut server = responder_for(&client, EngineMode::Session);

        let sig = client.sign_request(b"GET/").unwrap();
        server.verify_request(b"GET/", &sig).unwrap();
        let (nonce2, sig2) = server.issue_nonce2().unwrap();
        client.accept_nonce2(nonce2.clone(), &sig2).unwrap();

        assert_eq!(
            client.accept_nonce2(nonce2, &sig2),
            Err(SessionStateError::AlreadyEstablished.into())
        );
        assert_eq!(
            server.issue_nonce2(),
            Err(SessionStateError::AlreadyEstablished.into())
        );
    }

    #[test]
    fn test_issue_nonce2_requires_verified_request() {
        let mut client = HmacEngine::session(material());
        let mut server = responder_for(&client, EngineMode::Session);
        assert!(server.issue_nonce2().is_err());

        let sig = client.sign_request(b"GET/").unwrap();
        assert!(server.verify_request(b"GET/x", &sig).is_err());
        assert_eq!(
            server.issue_nonce2(),
            Err(SessionStateError::Terminated.into())
        );
    }

    #[test]
    fn test_sha512_engines_interoperate() {
        let material = KeyMaterial::new(
            KeyId::new("app").unwrap(),
            Secret::new(b"k".to_vec()),
            Algorithm::Sha512,
        );
        let mut client = HmacEngine::new(material.clone());
        let mut server = HmacEngine::responder(material, EngineMode::Stateless);
        server.bind_nonce(client.nonce().unwrap().clone()).unwrap();

        let sig = client.sign_request(b"GET/").unwrap();
        assert_eq!(sig.as_bytes().len(), 64);
        server.verify_request(b"GET/", &sig).unwrap();
    }
}
