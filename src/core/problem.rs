//! Structured unauthenticated response body (`application/problem+json`).
//!
//! The body format is part of the protocol surface: clients read `hmac` and
//! `version` to diagnose a mismatched configuration.

use serde::{Deserialize, Serialize};

use super::constants::{PROBLEM_TITLE, PROBLEM_TYPE};

/// Problem details for a rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Machine-readable problem type.
    #[serde(rename = "type")]
    pub problem_type: String,
    /// Short title.
    pub title: String,
    /// HTTP status code.
    pub status: u16,
    /// Human-readable reasons, newline separated.
    pub detail: String,
    /// The request URI.
    pub instance: String,
    /// Description of the HMAC scheme the server expected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,
    /// Protocol version the server's adapter speaks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

impl Problem {
    /// Build a 401 problem from one or more failure messages.
    pub fn unauthorized<I, S>(messages: I, instance: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let detail = messages
            .into_iter()
            .map(|m| m.as_ref().to_owned())
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            problem_type: PROBLEM_TYPE.to_owned(),
            title: PROBLEM_TITLE.to_owned(),
            status: 401,
            detail,
            instance: instance.into(),
            hmac: None,
            version: None,
        }
    }

    /// Attach the adapter's HMAC description and protocol version.
    pub fn with_hmac(mut self, description: impl Into<String>, version: u32) -> Self {
        self.hmac = Some(description.into());
        self.version = Some(version);
        self
    }

    /// Serialize to the JSON wire body.
    pub fn to_json(&self) -> Vec<u8> {
        // Serializing a struct of strings and integers cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }
}
