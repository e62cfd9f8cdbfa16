//! `Authorization: Basic` credential parsing.

use axum::http::{HeaderMap, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::SecretString;
use thiserror::Error;

use padgate_core::{Username, UsernameError};

/// Why a request carried no usable credential.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// No `Authorization` header.
    #[error("no authorization header")]
    Missing,

    /// The header uses another scheme or is not valid header text.
    #[error("authorization scheme is not Basic")]
    NotBasic,

    /// The payload is not valid base64.
    #[error("credentials are not valid base64")]
    Encoding,

    /// The decoded payload is not UTF-8.
    #[error("credentials are not valid UTF-8")]
    NotUtf8,

    /// The decoded payload has no `:` separator.
    #[error("credentials have no username/password separator")]
    MissingSeparator,

    /// The username part is not a valid login.
    #[error("invalid username: {0}")]
    InvalidUsername(#[from] UsernameError),

    /// The password part is empty.
    #[error("password is empty")]
    EmptyPassword,
}

/// A username/password pair from a Basic authorization header.
#[derive(Debug)]
pub struct Credential {
    /// Login handle.
    pub username: Username,
    /// Password as sent by the client.
    pub password: SecretString,
}

impl Credential {
    /// Extract the Basic credential from request headers.
    ///
    /// The scheme is matched case-insensitively and the payload is split on
    /// the first colon, so passwords may contain colons.
    ///
    /// # Errors
    ///
    /// Returns a [`CredentialError`] describing why no credential could be
    /// extracted.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, CredentialError> {
        let value = headers
            .get(header::AUTHORIZATION)
            .ok_or(CredentialError::Missing)?
            .to_str()
            .map_err(|_| CredentialError::NotBasic)?;

        let (scheme, payload) = value
            .trim()
            .split_once(' ')
            .ok_or(CredentialError::NotBasic)?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return Err(CredentialError::NotBasic);
        }

        let decoded = STANDARD
            .decode(payload.trim())
            .map_err(|_| CredentialError::Encoding)?;
        let decoded = String::from_utf8(decoded).map_err(|_| CredentialError::NotUtf8)?;

        let (username, password) = decoded
            .split_once(':')
            .ok_or(CredentialError::MissingSeparator)?;
        let username = Username::parse(username)?;
        if password.is_empty() {
            return Err(CredentialError::EmptyPassword);
        }

        Ok(Self {
            username,
            password: SecretString::from(password.to_owned()),
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use secrecy::ExposeSecret;

    use super::*;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn basic(raw: &str) -> HeaderMap {
        headers_with(&format!("Basic {}", STANDARD.encode(raw)))
    }

    #[test]
    fn test_parses_basic_credential() {
        let credential = Credential::from_headers(&basic("alice:secret")).unwrap();
        assert_eq!(credential.username.as_str(), "alice");
        assert_eq!(credential.password.expose_secret(), "secret");
    }

    #[test]
    fn test_password_may_contain_colons() {
        let credential = Credential::from_headers(&basic("alice:pa:ss:word")).unwrap();
        assert_eq!(credential.username.as_str(), "alice");
        assert_eq!(credential.password.expose_secret(), "pa:ss:word");
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        let headers = headers_with(&format!("bAsIc {}", STANDARD.encode("alice:secret")));
        assert!(Credential::from_headers(&headers).is_ok());
    }

    #[test]
    fn test_missing_header() {
        assert_eq!(
            Credential::from_headers(&HeaderMap::new()).unwrap_err(),
            CredentialError::Missing
        );
    }

    #[test]
    fn test_other_scheme() {
        assert_eq!(
            Credential::from_headers(&headers_with("Bearer abc.def")).unwrap_err(),
            CredentialError::NotBasic
        );
        assert_eq!(
            Credential::from_headers(&headers_with("Basic")).unwrap_err(),
            CredentialError::NotBasic
        );
    }

    #[test]
    fn test_malformed_payloads() {
        assert_eq!(
            Credential::from_headers(&headers_with("Basic !!!notbase64")).unwrap_err(),
            CredentialError::Encoding
        );

        let not_utf8 = STANDARD.encode([0xff, 0xfe, b':', b'x']);
        assert_eq!(
            Credential::from_headers(&headers_with(&format!("Basic {not_utf8}"))).unwrap_err(),
            CredentialError::NotUtf8
        );

        assert_eq!(
            Credential::from_headers(&basic("alicesecret")).unwrap_err(),
            CredentialError::MissingSeparator
        );
    }

    #[test]
    fn test_empty_parts_are_rejected() {
        assert_eq!(
            Credential::from_headers(&basic(":secret")).unwrap_err(),
            CredentialError::InvalidUsername(UsernameError::Empty)
        );
        assert_eq!(
            Credential::from_headers(&basic("alice:")).unwrap_err(),
            CredentialError::EmptyPassword
        );
    }
}
