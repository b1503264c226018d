//! OAuth2 scopes and scope-bearing claims
//!
//! Scopes and scope tokens follow the definitions in
//! [RFC 6749, Section 3.3][RFC6749 3.3].
//!
//!   [RFC6749 3.3]: https://datatracker.ietf.org/doc/html/rfc6749#section-3.3

use std::{convert::TryFrom, fmt, iter::FromIterator, slice, str::FromStr, vec};

use aliri_braid::braid;
use aliri_clock::UnixTime;
use compact_str::CompactString;
use pordisto::jwt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An invalid scope token
#[derive(Debug, Error)]
pub enum InvalidScopeToken {
    /// The scope token was the empty string
    #[error("scope token cannot be empty")]
    EmptyString,
    /// The scope token contained an invalid byte
    #[error("invalid scope token byte at position {position}: 0x{value:02x}")]
    InvalidByte {
        /// The index in the scope token where the invalid byte was found
        position: usize,
        /// The invalid byte value
        value: u8,
    },
}

aliri_braid::from_infallible!(InvalidScopeToken);

/// An OAuth2 scope token as defined in [RFC 6749, Section 3.3][RFC6749 3.3]
///
/// A scope token must be composed of printable ASCII characters excluding
/// ` ` (space), `"` (double quote), and `\` (backslash).
///
///   [RFC6749 3.3]: (https://datatracker.ietf.org/doc/html/rfc6749#section-3.3)
#[braid(
    serde,
    validator,
    ref_doc = "A borrowed reference to an OAuth2 [`ScopeToken`]"
)]
pub struct ScopeToken;

impl aliri_braid::Validator for ScopeToken {
    type Error = InvalidScopeToken;

    /// Validates that the scope token is valid
    ///
    /// A valid scope token is non-empty and composed of printable
    /// ASCII characters except ` `, `"`, and `\`.
    fn validate(s: &str) -> Result<(), Self::Error> {
        if s.is_empty() {
            Err(InvalidScopeToken::EmptyString)
        } else if let Some((position, &value)) = s
            .as_bytes()
            .iter()
            .enumerate()
            .find(|(_, &b)| b <= 0x20 || b == 0x22 || b == 0x5C || 0x7F <= b)
        {
            Err(InvalidScopeToken::InvalidByte { position, value })
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum ScopeDto {
    String(String),
    Array(Vec<ScopeToken>),
}

impl TryFrom<Option<ScopeDto>> for Scope {
    type Error = InvalidScopeToken;

    fn try_from(dto: Option<ScopeDto>) -> Result<Self, Self::Error> {
        if let Some(dto) = dto {
            match dto {
                ScopeDto::String(s) => Self::try_from(s),
                ScopeDto::Array(arr) => Ok(arr.into_iter().collect()),
            }
        } else {
            Ok(Self::empty())
        }
    }
}

impl From<Scope> for ScopeDto {
    fn from(s: Scope) -> Self {
        let x: Vec<_> = s.0.into_iter().map(ScopeToken::take).collect();
        let y = x.join(" ");
        ScopeDto::String(y)
    }
}

/// An OAuth2 Scope defining a set of access permissions
///
/// Duplicate scope tokens are ignored, and two scopes are equal if they
/// hold the same set of scope tokens, regardless of order.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(try_from = "Option<ScopeDto>", into = "ScopeDto")]
#[must_use]
pub struct Scope(Vec<ScopeToken>);

impl Scope {
    /// Produces an empty scope
    #[inline]
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// Constructs a new scope from a single scope token
    #[inline]
    pub fn single(scope_token: ScopeToken) -> Self {
        let mut s = Self::empty();
        s.insert(scope_token);
        s
    }

    /// Adds an additional scope token
    #[inline]
    pub fn and(self, scope_token: ScopeToken) -> Self {
        let mut s = self;
        s.insert(scope_token);
        s
    }

    /// Constructs a scope from an iterator of scope tokens
    #[inline]
    pub fn from_scope_tokens<I>(scope_tokens: I) -> Self
    where
        I: IntoIterator<Item = ScopeToken>,
    {
        Self::from_iter(scope_tokens)
    }

    /// Adds a scope token to the scope
    ///
    /// A scope token that is already present is ignored.
    #[inline]
    pub fn insert(&mut self, scope_token: ScopeToken) {
        if !self.contains(&scope_token) {
            self.0.push(scope_token);
        }
    }

    /// Whether this scope contains no scope tokens
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Produces an iterator of the scope tokens in this set
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &ScopeTokenRef> {
        (&self).into_iter()
    }

    /// Checks to see whether this scope contains the requested
    /// scope token
    #[inline]
    pub fn contains(&self, scope_token: &ScopeTokenRef) -> bool {
        self.iter().any(|held| held == scope_token)
    }

    /// Checks to see whether this scope contains all of
    /// the scope tokens in `subset`.
    #[inline]
    pub fn contains_all(&self, subset: &Scope) -> bool {
        subset.iter().all(|scope_token| self.contains(scope_token))
    }
}

impl PartialEq for Scope {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.contains_all(other)
    }
}

impl Eq for Scope {}

impl fmt::Display for Scope {
    /// Formats the scope as a space-delimited list of scope tokens
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut iter = self.iter();
        if let Some(first) = iter.next() {
            fmt::Display::fmt(first, f)?;
            for scope_token in iter {
                f.write_str(" ")?;
                fmt::Display::fmt(scope_token, f)?;
            }
        }
        Ok(())
    }
}

impl IntoIterator for Scope {
    type Item = ScopeToken;
    type IntoIter = vec::IntoIter<ScopeToken>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// An iterator over a set of borrowed scope tokens
#[derive(Clone, Debug)]
pub struct Iter<'a> {
    iter: slice::Iter<'a, ScopeToken>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a ScopeTokenRef;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|x| x.as_ref())
    }
}

impl<'a> IntoIterator for &'a Scope {
    type Item = &'a ScopeTokenRef;
    type IntoIter = Iter<'a>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        Self::IntoIter {
            iter: self.0.iter(),
        }
    }
}

impl<S> Extend<S> for Scope
where
    S: Into<ScopeToken>,
{
    #[inline]
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = S>,
    {
        for scope_token in iter {
            self.insert(scope_token.into());
        }
    }
}

impl<S> FromIterator<S> for Scope
where
    S: Into<ScopeToken>,
{
    #[inline]
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = S>,
    {
        let mut set = Self::empty();
        set.extend(iter);
        set
    }
}

impl TryFrom<&'_ str> for Scope {
    type Error = InvalidScopeToken;

    #[inline]
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.split_whitespace().map(ScopeToken::from_str).collect()
    }
}

impl TryFrom<String> for Scope {
    type Error = InvalidScopeToken;

    #[inline]
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::try_from(s.as_str())
    }
}

impl FromStr for Scope {
    type Err = InvalidScopeToken;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

/// Constructs a [`Scope`] from a list of scope tokens
///
/// Scope tokens are validated at macro execution, so this macro should
/// only be used with tokens that are known to be valid.
///
/// # Panics
///
/// Panics if any of the listed scope tokens is invalid.
///
/// # Examples
///
/// ```
/// use pordisto_oauth2::{scope, Scope};
///
/// let scope = scope!["users.read", "users.write"];
///
/// assert_eq!(scope, "users.read users.write".parse::<Scope>().unwrap());
/// ```
#[macro_export]
macro_rules! scope {
    [$($scope_token:expr),* $(,)?] => {
        $crate::Scope::empty()
            $(.and($crate::scope::ScopeToken::from_static($scope_token)))*
    };
}

/// A convenience structure for payloads where the user only cares about the
/// scope and other basic claims
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BasicClaimsWithScope {
    /// The basic claims
    #[serde(flatten)]
    pub basic: jwt::BasicClaims,

    /// The `scope` claim
    ///
    /// A token without a `scope` claim is treated as having an empty scope.
    #[serde(default)]
    pub scope: Scope,
}

impl jwt::CoreClaims for BasicClaimsWithScope {
    #[inline]
    fn nbf(&self) -> Option<UnixTime> {
        self.basic.nbf()
    }

    #[inline]
    fn exp(&self) -> Option<UnixTime> {
        self.basic.exp()
    }

    #[inline]
    fn aud(&self) -> &jwt::Audiences {
        self.basic.aud()
    }

    #[inline]
    fn iss(&self) -> Option<&jwt::IssuerRef> {
        self.basic.iss()
    }

    #[inline]
    fn sub(&self) -> Option<&jwt::SubjectRef> {
        self.basic.sub()
    }
}

/// An opaque object identifier for the subject of a token, such as the
/// `oid` claim issued by Azure AD
#[braid(serde, ref_doc = "A borrowed reference to an [`ObjectId`]")]
pub struct ObjectId;

/// The identity claims asserted by a verified access token
///
/// In addition to the basic claims, this captures the identifying claims
/// commonly issued by OAuth2 identity providers. Providers that issue
/// scopes in the `scp` claim are also supported.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// The subject of the token
    pub sub: jwt::Subject,

    /// The display name of the subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<CompactString>,

    /// The immutable object identifier assigned to the subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oid: Option<ObjectId>,

    /// The time the token was issued
    pub iat: UnixTime,

    /// The scopes granted to the bearer
    ///
    /// A token without a `scope` claim is treated as having an empty scope.
    #[serde(default, alias = "scp")]
    pub scope: Scope,

    /// The issuer of the token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<jwt::Issuer>,

    /// The audiences the token is intended for
    #[serde(default, skip_serializing_if = "jwt::Audiences::is_empty")]
    pub aud: jwt::Audiences,

    /// The time the token expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<UnixTime>,

    /// The time before which the token is invalid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<UnixTime>,
}

impl jwt::CoreClaims for IdentityClaims {
    #[inline]
    fn nbf(&self) -> Option<UnixTime> {
        self.nbf
    }

    #[inline]
    fn exp(&self) -> Option<UnixTime> {
        self.exp
    }

    #[inline]
    fn aud(&self) -> &jwt::Audiences {
        &self.aud
    }

    #[inline]
    fn iss(&self) -> Option<&jwt::IssuerRef> {
        self.iss.as_deref()
    }

    #[inline]
    fn sub(&self) -> Option<&jwt::SubjectRef> {
        Some(self.sub.as_ref())
    }
}

/// Indicates that the type has an OAuth2 scope claim
pub trait HasScope {
    /// OAuth2 scope
    ///
    /// Scope claimed by the underlying token, generally in the `scope`
    /// claim.
    fn scope(&self) -> &Scope;
}

impl HasScope for BasicClaimsWithScope {
    #[inline]
    fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl HasScope for IdentityClaims {
    #[inline]
    fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl HasScope for Scope {
    #[inline]
    fn scope(&self) -> &Scope {
        self
    }
}
