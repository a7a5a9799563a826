//! Handshake authentication.
//!
//! The server never trusts anything a client says after the upgrade about
//! who it is. Identity comes from the credential on the opening request,
//! checked by an [`Authenticator`]. Authenticating has no side effects; the
//! caller creates the [`Session`](crate::Session) afterwards.

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tabletop_protocol::UserId;
use tabletop_transport::Handshake;

use crate::SessionError;

/// Cookie the REST API stores its session token in.
pub const DEFAULT_COOKIE_NAME: &str = "tabletop_session";

/// Lifetime of tokens minted by [`JwtAuthenticator::issue`].
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

const MIN_SECRET_LEN: usize = 32;

/// Maps a connection handshake to the user it belongs to.
///
/// # Example
///
/// ```rust
/// use tabletop_protocol::UserId;
/// use tabletop_session::{Authenticator, SessionError};
/// use tabletop_transport::Handshake;
///
/// /// Trusts an `x-user` header. Only for local development.
/// struct HeaderAuthenticator;
///
/// impl Authenticator for HeaderAuthenticator {
///     async fn authenticate(&self, handshake: &Handshake) -> Result<UserId, SessionError> {
///         handshake
///             .header("x-user")
///             .map(UserId::new)
///             .ok_or_else(|| SessionError::Unauthenticated("missing x-user".into()))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Returns the authenticated user or [`SessionError::Unauthenticated`].
    fn authenticate(
        &self,
        handshake: &Handshake,
    ) -> impl std::future::Future<Output = Result<UserId, SessionError>> + Send;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// HS256 JWT authenticator sharing the REST API's signing secret.
///
/// The token is read from the session cookie first, then from an
/// `Authorization: Bearer` header.
#[derive(Clone)]
pub struct JwtAuthenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    cookie_name: String,
}

impl JwtAuthenticator {
    /// Builds an authenticator reading the [`DEFAULT_COOKIE_NAME`] cookie.
    ///
    /// # Errors
    /// [`SessionError::Config`] if `secret` is shorter than 32 bytes.
    pub fn new(secret: &str) -> Result<Self, SessionError> {
        Self::with_cookie_name(secret, DEFAULT_COOKIE_NAME)
    }

    /// Builds an authenticator reading the given cookie.
    pub fn with_cookie_name(
        secret: &str,
        cookie_name: impl Into<String>,
    ) -> Result<Self, SessionError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(SessionError::Config(format!(
                "jwt secret must be at least {MIN_SECRET_LEN} bytes long"
            )));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            cookie_name: cookie_name.into(),
        })
    }

    /// The cookie the token is read from.
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Mints a token for `user` valid for [`DEFAULT_TOKEN_TTL_SECS`].
    pub fn issue(&self, user: &UserId) -> Result<String, SessionError> {
        self.issue_at(user, unix_now()?, DEFAULT_TOKEN_TTL_SECS)
    }

    /// Mints a token issued at `issued_at` (unix seconds) living `ttl_secs`.
    pub fn issue_at(
        &self,
        user: &UserId,
        issued_at: i64,
        ttl_secs: i64,
    ) -> Result<String, SessionError> {
        let claims = Claims {
            sub: user.as_str().to_string(),
            iat: issued_at,
            exp: issued_at + ttl_secs,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| SessionError::Issue(e.to_string()))
    }

    /// Checks a raw token and returns its subject.
    pub fn verify(&self, token: &str) -> Result<UserId, SessionError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| SessionError::Unauthenticated(e.to_string()))?
            .claims;
        if claims.sub.is_empty() {
            return Err(SessionError::Unauthenticated("empty subject".into()));
        }
        Ok(UserId::new(claims.sub))
    }

    fn token<'a>(&self, handshake: &'a Handshake) -> Option<&'a str> {
        handshake
            .cookie(&self.cookie_name)
            .filter(|t| !t.is_empty())
            .or_else(|| handshake.bearer_token())
    }
}

impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, handshake: &Handshake) -> Result<UserId, SessionError> {
        let token = self
            .token(handshake)
            .ok_or_else(|| SessionError::Unauthenticated("no credential".into()))?;
        self.verify(token)
    }
}

impl std::fmt::Debug for JwtAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuthenticator")
            .field("cookie_name", &self.cookie_name)
            .finish_non_exhaustive()
    }
}

fn unix_now() -> Result<i64, SessionError> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| SessionError::Issue(format!("system clock is before unix epoch: {e}")))?;
    i64::try_from(elapsed.as_secs()).map_err(|e| SessionError::Issue(e.to_string()))
}
