//! Session state machine.
//!
//! ```text
//! NotStarted --establish request sent--> Establishing
//! Establishing --valid Nonce2 signature--> Established
//! Establishing --invalid / malformed / version mismatch--> Terminated(Error)
//! Established --verified round trip--> Established (sequence + 1)
//! any --fatal error--> Terminated(Error)
//! ```
//!
//! There is no handshake retry. A terminated session stays terminated and
//! the caller must build a new engine (and with it a new nonce).

use std::fmt;

use crate::core::SessionStateError;

use super::{Nonce, SessionKey};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Protocol, authentication or transport failure.
    Error,
    /// Closed by its owner.
    Closed,
}

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No handshake attempted yet.
    NotStarted,
    /// Handshake request sent (client) or verified (server).
    Establishing,
    /// Nonce2 exchanged and verified.
    Established,
    /// Session is over.
    Terminated(TerminationReason),
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::NotStarted => f.write_str("not started"),
            SessionPhase::Establishing => f.write_str("establishing"),
            SessionPhase::Established => f.write_str("established"),
            SessionPhase::Terminated(TerminationReason::Error) => f.write_str("terminated (error)"),
            SessionPhase::Terminated(TerminationReason::Closed) => f.write_str("terminated (closed)"),
        }
    }
}

/// Session phase, Nonce2, derived key and sequence counter.
#[derive(Debug)]
pub struct SessionMachine {
    phase: SessionPhase,
    nonce2: Option<Nonce>,
    key: Option<SessionKey>,
    sequence: u64,
}

impl SessionMachine {
    /// Create a machine in `NotStarted`.
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::NotStarted,
            nonce2: None,
            key: None,
            sequence: 0,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Number of verified round trips so far.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Nonce2 bound to this session, once established.
    pub fn nonce2(&self) -> Option<&Nonce> {
        self.nonce2.as_ref()
    }

    /// Whether the session is established.
    pub fn is_established(&self) -> bool {
        self.phase == SessionPhase::Established
    }

    /// `NotStarted -> Establishing`.
    pub fn begin_establish(&mut self) -> Result<(), SessionStateError> {
        match self.phase {
            SessionPhase::NotStarted => {
                self.phase = SessionPhase::Establishing;
                Ok(())
            }
            SessionPhase::Terminated(_) => Err(SessionStateError::Terminated),
            SessionPhase::Established => Err(SessionStateError::AlreadyEstablished),
            phase => Err(SessionStateError::HandshakeInProgress(phase)),
        }
    }

    /// `Establishing -> Established`.
    ///
    /// A second call on an established session is an error, not a no-op.
    pub fn establish(&mut self, nonce2: Nonce, key: SessionKey) -> Result<(), SessionStateError> {
        match self.phase {
            SessionPhase::Establishing => {
                self.nonce2 = Some(nonce2);
                self.key = Some(key);
                self.sequence = 0;
                self.phase = SessionPhase::Established;
                Ok(())
            }
            SessionPhase::Established => Err(SessionStateError::AlreadyEstablished),
            SessionPhase::Terminated(_) => Err(SessionStateError::Terminated),
            phase => Err(SessionStateError::NotEstablished(phase)),
        }
    }

    /// The session key, if the session is established.
    pub fn key(&self) -> Result<&SessionKey, SessionStateError> {
        match (self.phase, &self.key) {
            (SessionPhase::Established, Some(key)) => Ok(key),
            (SessionPhase::Terminated(_), _) => Err(SessionStateError::Terminated),
            (phase, _) => Err(SessionStateError::NotEstablished(phase)),
        }
    }

    /// Advance the sequence counter after a verified round trip.
    pub fn advance(&mut self) -> Result<u64, SessionStateError> {
        self.key()?;
        match self.sequence.checked_add(1) {
            Some(next) => {
                self.sequence = next;
                Ok(next)
            }
            None => {
                self.fail();
                Err(SessionStateError::SequenceExhausted)
            }
        }
    }

    /// Move to `Terminated(Error)` and drop the session key.
    pub fn fail(&mut self) {
        self.terminate(TerminationReason::Error);
    }

    /// Move to `Terminated(Closed)` and drop the session key.
    pub fn close(&mut self) {
        self.terminate(TerminationReason::Closed);
    }

    fn terminate(&mut self, reason: TerminationReason) {
        if !matches!(self.phase, SessionPhase::Terminated(_)) {
            self.phase = SessionPhase::Terminated(reason);
        }
        self.key = None;
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}
