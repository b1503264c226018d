//! Tower layers for protecting services with [`pordisto`] JWT authorities
//!
//! [`Oauth2Authorizer`] builds two cooperating layers: a JWT layer that
//! authenticates the bearer token presented with each request against an
//! [`Authority`][pordisto_oauth2::Authority], and a scope layer that
//! authorizes the request by checking the scopes granted by the token
//! against a [`ScopePolicy`][pordisto_oauth2::ScopePolicy]. Verified claims
//! are attached to the request's extensions, where handlers and inner
//! middleware can read them back out.
//!
//! See the `examples` folder in the repository for a working example using
//! an `axum` web server.
//!
//! ```
//! use pordisto::{jws, jwt};
//! use pordisto_oauth2::{Authority, IdentityClaims, KeySource, ScopePolicy};
//! use pordisto_tower::Oauth2Authorizer;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let validator = jwt::CoreValidator::default()
//!     .add_approved_algorithm(jws::Algorithm::RS256)
//!     .add_allowed_audience(jwt::Audience::from("https://api.example.com/"))
//!     .require_issuer(jwt::Issuer::from("https://issuer.example.com/"));
//!
//! // Key acquisition is lazy: nothing is fetched until a token needs it
//! let authority = Authority::remote(
//!     KeySource::oidc_issuer("https://issuer.example.com"),
//!     validator,
//! )?;
//!
//! let authorizer = Oauth2Authorizer::new()
//!     .with_claims::<IdentityClaims>()
//!     .with_terse_error_handler::<axum::body::Body>();
//!
//! async fn handle_post() -> &'static str {
//!     "Handled POST /users"
//! }
//!
//! let app = axum::Router::new()
//!     .route("/users", axum::routing::post(handle_post))
//!     .layer(authorizer.scope_layer(ScopePolicy::allow_one_from_static("post_user")))
//!     .layer(authorizer.jwt_layer(authority));
//! # let _ = app.into_make_service();
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::marker::PhantomData;

mod authorizer;
mod jwt;
mod oauth2;
pub mod util;

pub use crate::authorizer::Oauth2Authorizer;
pub use crate::jwt::OnJwtError;
pub use crate::oauth2::OnScopeError;

/// Terse responders for authentication and authorization failures
///
/// Responses contain the relevant status code and challenge header, but
/// no description of the failure and an empty body. This is the posture
/// to prefer when responding to untrusted clients.
pub struct TerseErrorHandler<ResBody> {
    _ty: PhantomData<fn() -> ResBody>,
}

impl<ResBody> TerseErrorHandler<ResBody> {
    /// Instantiates a new instance over a given body type
    #[inline]
    pub fn new() -> Self {
        Self { _ty: PhantomData }
    }
}

impl<ResBody> fmt::Debug for TerseErrorHandler<ResBody> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("TerseErrorHandler")
    }
}

impl<ResBody> Default for TerseErrorHandler<ResBody> {
    #[inline]
    fn default() -> Self {
        Self { _ty: PhantomData }
    }
}

impl<ResBody> Clone for TerseErrorHandler<ResBody> {
    #[inline]
    fn clone(&self) -> Self {
        Self { _ty: PhantomData }
    }
}

impl<ResBody> Copy for TerseErrorHandler<ResBody> {}

/// Verbose responders for authentication and authorization failures
///
/// Responses describe the failure in the challenge header's
/// `error_description` attribute; bodies remain empty. The descriptions
/// can reveal details of the verification configuration, so this handler
/// is best reserved for development.
pub struct VerboseErrorHandler<ResBody> {
    _ty: PhantomData<fn() -> ResBody>,
}

impl<ResBody> VerboseErrorHandler<ResBody> {
    /// Instantiates a new instance over a given body type
    #[inline]
    pub fn new() -> Self {
        Self { _ty: PhantomData }
    }
}

impl<ResBody> fmt::Debug for VerboseErrorHandler<ResBody> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("VerboseErrorHandler")
    }
}

impl<ResBody> Default for VerboseErrorHandler<ResBody> {
    #[inline]
    fn default() -> Self {
        Self { _ty: PhantomData }
    }
}

impl<ResBody> Clone for VerboseErrorHandler<ResBody> {
    #[inline]
    fn clone(&self) -> Self {
        Self { _ty: PhantomData }
    }
}

impl<ResBody> Copy for VerboseErrorHandler<ResBody> {}
