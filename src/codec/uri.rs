//! URI-mode token placement.
//!
//! The client signs the request target, then appends the percent-encoded
//! token as the final query parameter (`?hmac=` or `&hmac=`). The server
//! strips that final parameter to recover exactly the bytes that were
//! signed. The token parameter must therefore be last.

use url::form_urlencoded;

use crate::core::{ProtocolError, URI_PARAM_NAME};

/// A token extracted from a request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriToken {
    /// The request target as it was before the token was appended.
    pub signed_uri: String,
    /// The decoded token value.
    pub token: String,
}

/// Append `token` to `uri` as the last query parameter.
///
/// Uses `&` when `uri` already has a query string, `?` otherwise.
pub fn append_token(uri: &str, token: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(token.as_bytes()).collect();
    let separator = if uri.contains('?') { '&' } else { '?' };
    format!("{uri}{separator}{URI_PARAM_NAME}={encoded}")
}

/// Split the token parameter off a request target.
///
/// Returns `Ok(None)` when the query has no token parameter at all.
///
/// # Errors
/// `ProtocolError::TokenNotLast` if the token parameter is present but is
/// not the final parameter.
pub fn split_token(uri: &str) -> Result<Option<UriToken>, ProtocolError> {
    let Some(query_start) = uri.find('?') else {
        return Ok(None);
    };
    let query = &uri[query_start + 1..];

    let (param_offset, last_param) = match query.rfind('&') {
        Some(pos) => (query_start + 1 + pos, &query[pos + 1..]),
        None => (query_start, query),
    };

    let (name, value) = last_param.split_once('=').unwrap_or((last_param, ""));
    if name != URI_PARAM_NAME {
        let present = form_urlencoded::parse(query.as_bytes()).any(|(k, _)| k == URI_PARAM_NAME);
        return if present {
            Err(ProtocolError::TokenNotLast(URI_PARAM_NAME))
        } else {
            Ok(None)
        };
    }

    let token = form_urlencoded::parse(format!("{URI_PARAM_NAME}={value}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default();

    Ok(Some(UriToken {
        signed_uri: uri[..param_offset].to_owned(),
        token,
    }))
}

/// Whether `uri` carries a token parameter anywhere in its query.
pub fn has_token(uri: &str) -> bool {
    uri.split_once('?').is_some_and(|(_, query)| {
        form_urlencoded::parse(query.as_bytes()).any(|(k, _)| k == URI_PARAM_NAME)
    })
}
