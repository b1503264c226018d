use crate::{oidc::OidcConfiguration, scope::HasScope, ScopePolicy};
use aliri_traits::Policy;
use arc_swap::ArcSwap;
use pordisto::{
    error,
    jwt::{self, CoreHeaders, HasAlgorithm},
    Jwks, JwtRef,
};
use reqwest::{
    header::{self, HeaderValue},
    Client, StatusCode,
};
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::OnceCell;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// An error during JWT verification by an authority
#[derive(Debug, Error)]
pub enum AuthorityError {
    /// Indicates that the authority cannot verify the JWT because it cannot
    /// find a key which matches the specifications in the token header
    #[error("no matching key found to validate JWT")]
    UnknownKey,
    /// Indicates that the authority could not refresh its key set from the
    /// remote source
    #[error("failed to refresh JWKS")]
    JwksFetch(#[source] reqwest::Error),
    /// Indicates that the JWT was malformed or otherwise defective
    #[error("invalid JWT")]
    JwtVerifyError(#[from] error::JwtVerifyError),
    /// Indicates that, while the JWT was acceptable, it does not grant the
    /// level of authorization requested.
    #[error("access denied by policy")]
    PolicyDenial(#[from] crate::InsufficientScope),
}

/// The location from which an [`Authority`] acquires its signing keys
#[derive(Clone, Debug)]
pub enum KeySource {
    /// A direct URL to a JSON Web Key Set document
    Jwks {
        /// The URL of the JWKS document
        url: String,
    },
    /// An OpenID Connect discovery document, from which the JWKS URL
    /// is resolved
    OidcDiscovery {
        /// The URL of the discovery document
        url: String,
    },
}

impl KeySource {
    /// Constructs a key source from a direct JWKS URL
    pub fn jwks(url: impl Into<String>) -> Self {
        Self::Jwks { url: url.into() }
    }

    /// Constructs a key source from an OIDC issuer
    ///
    /// The discovery document location is derived from the issuer by
    /// appending the well-known suffix `/.well-known/openid-configuration`.
    pub fn oidc_issuer(issuer: impl AsRef<str>) -> Self {
        let url = format!(
            "{}/.well-known/openid-configuration",
            issuer.as_ref().trim_end_matches('/')
        );
        Self::OidcDiscovery { url }
    }

    /// Constructs a key source from a direct OIDC discovery document URL
    pub fn oidc_discovery(url: impl Into<String>) -> Self {
        Self::OidcDiscovery { url: url.into() }
    }
}

#[derive(Debug)]
struct VolatileData {
    jwks: Jwks,
    etag: Option<HeaderValue>,
    last_modified: Option<HeaderValue>,
}

impl VolatileData {
    fn new(jwks: Jwks) -> Self {
        Self {
            jwks,
            etag: None,
            last_modified: None,
        }
    }
}

#[derive(Debug)]
struct RemoteOptions {
    source: KeySource,
    client: Client,
    jwks_url: OnceCell<String>,
}

impl RemoteOptions {
    fn new(source: KeySource, client: Client) -> Self {
        let jwks_url = match &source {
            KeySource::Jwks { url } => OnceCell::new_with(Some(url.clone())),
            KeySource::OidcDiscovery { .. } => OnceCell::new(),
        };

        Self {
            source,
            client,
            jwks_url,
        }
    }

    /// The URL of the JWKS document, resolving it through the discovery
    /// document on first use
    ///
    /// A successful resolution is retained for the life of the authority.
    /// A failed resolution leaves the cell empty, and the next caller will
    /// attempt the resolution again.
    async fn jwks_url(&self) -> Result<&str, reqwest::Error> {
        let url = self
            .jwks_url
            .get_or_try_init(|| self.fetch_discovery())
            .await?;

        Ok(url.as_str())
    }

    async fn fetch_discovery(&self) -> Result<String, reqwest::Error> {
        let discovery_url = match &self.source {
            KeySource::Jwks { url } => return Ok(url.clone()),
            KeySource::OidcDiscovery { url } => url,
        };

        let config = OidcConfiguration::fetch(&self.client, discovery_url).await?;

        tracing::info!(
            oidc.url = %discovery_url,
            oidc.issuer = %config.issuer,
            jwks.url = %config.jwks_uri,
            "resolved OIDC discovery document"
        );

        Ok(config.jwks_uri)
    }
}

#[derive(Debug)]
struct Inner {
    data: ArcSwap<VolatileData>,
    remote: Option<RemoteOptions>,
    validator: jwt::CoreValidator,
}

/// An authority backed by a potentially dynamic JSON Web Key Set (JWKS)
/// held by a remote source
///
/// Keys are acquired lazily. Constructing an authority performs no I/O;
/// the key set is first populated when a verification has need of it or
/// when [`refresh()`][Authority::refresh] is called.
#[derive(Debug, Clone)]
#[must_use]
pub struct Authority {
    inner: Arc<Inner>,
}

impl Authority {
    /// Constructs a new JWKS authority from an existing JWKS
    pub fn new(jwks: Jwks, validator: jwt::CoreValidator) -> Self {
        let data = VolatileData::new(jwks);

        Self {
            inner: Arc::new(Inner {
                data: ArcSwap::from_pointee(data),
                remote: None,
                validator,
            }),
        }
    }

    /// Constructs a new JWKS authority that acquires its keys from the
    /// given source
    ///
    /// Requests to the key source use a default timeout of 10 seconds. To
    /// customize the timeout or other connection settings, construct the
    /// authority with [`remote_with_client()`][Authority::remote_with_client].
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client could not be
    /// constructed.
    pub fn remote(
        source: KeySource,
        validator: jwt::CoreValidator,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("pordisto_oauth2/", env!("CARGO_PKG_VERSION")))
            .timeout(DEFAULT_TIMEOUT)
            .build()?;

        Ok(Self::remote_with_client(source, client, validator))
    }

    /// Constructs a new JWKS authority that acquires its keys from the
    /// given source using the provided HTTP client
    pub fn remote_with_client(
        source: KeySource,
        client: Client,
        validator: jwt::CoreValidator,
    ) -> Self {
        let data = VolatileData::new(Jwks::default());

        Self {
            inner: Arc::new(Inner {
                data: ArcSwap::from_pointee(data),
                remote: Some(RemoteOptions::new(source, client)),
                validator,
            }),
        }
    }

    /// Refreshes the JWKS from the remote source
    ///
    /// No retries are attempted. If the attempt to refresh the JWKS from
    /// the remote source fails, no change is made to the internal JWKS.
    /// For an authority with no remote source, this is a no-op.
    #[tracing::instrument(skip(self), fields(jwks.url = tracing::field::Empty))]
    pub async fn refresh(&self) -> Result<(), reqwest::Error> {
        let remote = match &self.inner.remote {
            Some(remote) => remote,
            None => return Ok(()),
        };

        let jwks_url = remote.jwks_url().await?;

        let span = tracing::Span::current();
        span.record("jwks.url", jwks_url);
        tracing::debug!("refreshing JWKS");
        let mut request = remote.client.get(jwks_url);

        {
            let data = self.inner.data.load();
            if let Some(etag) = &data.etag {
                request = request.header(header::IF_NONE_MATCH, etag)
            } else if let Some(last_modified) = &data.last_modified {
                request = request.header(header::IF_MODIFIED_SINCE, last_modified)
            }
        }

        let response = request.send().await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            tracing::debug!("JWKS not modified");
            return Ok(());
        } else if let Err(err) = response.error_for_status_ref() {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(
                error,
                http.status_code = response.status().as_u16(),
                "JWKS refresh failed; unexpected response status",
            );
            return Err(err);
        }

        let etag = response.headers().get(header::ETAG).map(ToOwned::to_owned);
        let last_modified = response
            .headers()
            .get(header::LAST_MODIFIED)
            .map(ToOwned::to_owned);
        match response.json::<Jwks>().await {
            Ok(jwks) => {
                let data = Arc::new(VolatileData {
                    jwks,
                    etag,
                    last_modified,
                });

                self.inner.data.store(data);
                tracing::info!("JWKS refreshed");
            }
            Err(err) => {
                let error: &dyn std::error::Error = &err;
                tracing::warn!(error, "JWKS refresh failed; unexpected error");
                return Err(err);
            }
        }

        Ok(())
    }

    /// Updates the JWKS associated with the internal state
    pub fn set_jwks(&self, jwks: Jwks) {
        let data = Arc::new(VolatileData::new(jwks));
        self.inner.data.store(data);
    }

    /// Authenticates the token and checks access according to the policy
    ///
    /// The signing algorithm named by the token is checked against the
    /// validator's approved algorithms before any key is consulted. If no
    /// held key matches the token, the key set is refreshed once from the
    /// remote source before the token is rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is invalid or is not authorized by the policy
    pub async fn verify_token<T>(
        &self,
        token: &JwtRef,
        policy: &ScopePolicy,
    ) -> Result<T, AuthorityError>
    where
        T: for<'de> Deserialize<'de> + HasScope + jwt::CoreClaims,
    {
        let decomposed = token.decompose()?;

        let alg = self
            .inner
            .validator
            .approve_algorithm(decomposed.alg())
            .map_err(error::JwtVerifyError::from)?;

        let data = self.inner.data.load_full();
        let refreshed;

        let key = match data.jwks.get_key_by_opt(decomposed.kid(), alg) {
            Some(key) => key,
            None => {
                // The key may have been rotated in since the last fetch
                self.refresh().await.map_err(AuthorityError::JwksFetch)?;

                refreshed = self.inner.data.load_full();
                match refreshed.jwks.get_key_by_opt(decomposed.kid(), alg) {
                    Some(key) => key,
                    None => {
                        if let Some(kid) = decomposed.kid() {
                            tracing::debug!(%kid, %alg, "unable to find matching key");
                        } else {
                            tracing::debug!(%alg, "unable to find matching key");
                        }
                        return Err(AuthorityError::UnknownKey);
                    }
                }
            }
        };

        let validated: jwt::Verified<T> = decomposed.verify(key, &self.inner.validator)?;

        policy.evaluate(validated.claims().scope())?;

        let (_, validated_claims) = validated.extract();

        Ok(validated_claims)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::SocketAddr,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use aliri_base64::Base64Url;
    use axum::{response::IntoResponse, routing::get, Json, Router};
    use color_eyre::Result;
    use openssl::{
        hash::MessageDigest,
        pkey::{PKey, Private},
        sign::Signer,
    };
    use pordisto::{jwa, jwk, jws, Jwk, Jwt};
    use tokio::net::TcpListener;
    use tracing_test::traced_test;

    use super::*;
    use crate::{scope, IdentityClaims, InsufficientScope};

    fn generate_key(kid: &str) -> Result<(Jwk, PKey<Private>)> {
        let rsa = openssl::rsa::Rsa::generate(2048)?;

        let public = jwa::Rsa::from_public_components(
            Base64Url::from_raw(rsa.n().to_vec()),
            Base64Url::from_raw(rsa.e().to_vec()),
        )?;

        let jwk = Jwk::from(public)
            .with_key_id(jwk::KeyId::from(kid))
            .with_algorithm(jws::Algorithm::RS256);

        let pkey = PKey::from_rsa(rsa)?;

        Ok((jwk, pkey))
    }

    fn sign_rs256(pkey: &PKey<Private>, message: &str) -> Result<Vec<u8>> {
        let mut signer = Signer::new(MessageDigest::sha256(), pkey)?;
        signer.update(message.as_bytes())?;
        Ok(signer.sign_to_vec()?)
    }

    fn issue(
        pkey: &PKey<Private>,
        header: &serde_json::Value,
        claims: &serde_json::Value,
    ) -> Result<Jwt> {
        let header = Base64Url::from_raw(serde_json::to_vec(header)?);
        let payload = Base64Url::from_raw(serde_json::to_vec(claims)?);
        let message = format!("{}.{}", header, payload);
        let signature = Base64Url::from_raw(sign_rs256(pkey, &message)?);
        Ok(Jwt::from(format!("{}.{}", message, signature)))
    }

    fn header(kid: &str) -> serde_json::Value {
        serde_json::json!({
            "alg": "RS256",
            "kid": kid,
        })
    }

    fn claims(scope: &str) -> serde_json::Value {
        serde_json::json!({
            "sub": "test_subject",
            "iss": "authority",
            "aud": "my_api",
            "iat": 1700000000u64,
            "exp": 32503680000u64,
            "scope": scope,
        })
    }

    fn validator() -> jwt::CoreValidator {
        jwt::CoreValidator::default()
            .add_approved_algorithm(jws::Algorithm::RS256)
            .add_allowed_audience(jwt::Audience::from("my_api"))
            .require_issuer(jwt::Issuer::from("authority"))
    }

    async fn serve(app: Router) -> Result<SocketAddr> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(addr)
    }

    async fn serve_jwks(jwks: Jwks) -> Result<(String, Arc<AtomicUsize>)> {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        let app = Router::new().route(
            "/jwks.json",
            get(move || {
                let jwks = jwks.clone();
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(jwks)
                }
            }),
        );

        let addr = serve(app).await?;

        Ok((format!("http://{}/jwks.json", addr), hits))
    }

    #[tokio::test]
    async fn verification_fetches_keys_on_first_use_only() -> Result<()> {
        let (jwk, pkey) = generate_key("key-1")?;
        let mut jwks = Jwks::default();
        jwks.add_key(jwk);

        let (url, hits) = serve_jwks(jwks).await?;

        let authority = Authority::remote(KeySource::jwks(url), validator())?;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let token = issue(&pkey, &header("key-1"), &claims("get:data"))?;
        let policy = ScopePolicy::allow_one(scope!["get:data"]);

        let first: IdentityClaims = authority.verify_token(&token, &policy).await?;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let second: IdentityClaims = authority.verify_token(&token, &policy).await?;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert_eq!(first, second);
        assert_eq!(first.sub.as_str(), "test_subject");
        assert_eq!(first.scope, scope!["get:data"]);

        Ok(())
    }

    #[tokio::test]
    async fn an_unknown_key_id_refreshes_once_then_fails() -> Result<()> {
        let (jwk, pkey) = generate_key("key-1")?;
        let (_rogue_jwk, rogue_pkey) = generate_key("key-2")?;

        let mut jwks = Jwks::default();
        jwks.add_key(jwk);

        let (url, hits) = serve_jwks(jwks).await?;
        let authority = Authority::remote(KeySource::jwks(url), validator())?;
        let policy = ScopePolicy::allow_one(scope!["get:data"]);

        let good = issue(&pkey, &header("key-1"), &claims("get:data"))?;
        let _: IdentityClaims = authority.verify_token(&good, &policy).await?;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let unknown = issue(&rogue_pkey, &header("key-2"), &claims("get:data"))?;
        let err = authority
            .verify_token::<IdentityClaims>(&unknown, &policy)
            .await
            .unwrap_err();

        assert!(matches!(err, AuthorityError::UnknownKey));
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        Ok(())
    }

    #[tokio::test]
    async fn a_disallowed_algorithm_is_rejected_without_consulting_keys() -> Result<()> {
        let (jwk, _pkey) = generate_key("key-1")?;
        let mut jwks = Jwks::default();
        jwks.add_key(jwk);

        let (url, hits) = serve_jwks(jwks).await?;
        let authority = Authority::remote(KeySource::jwks(url), validator())?;
        let policy = ScopePolicy::allow_any();

        let payload = Base64Url::from_raw(serde_json::to_vec(&claims("get:data"))?);
        let signature = Base64Url::from_raw(b"not-a-real-signature".to_vec());

        let hmac_header =
            Base64Url::from_raw(serde_json::to_vec(&serde_json::json!({
                "alg": "HS256",
                "kid": "key-1",
            }))?);
        let hmac_token = Jwt::from(format!("{}.{}.{}", hmac_header, payload, signature));

        let err = authority
            .verify_token::<IdentityClaims>(&hmac_token, &policy)
            .await
            .unwrap_err();
        assert!(matches!(&err, AuthorityError::JwtVerifyError(e) if e.is_unapproved_alg()));

        let none_header =
            Base64Url::from_raw(serde_json::to_vec(&serde_json::json!({ "alg": "none" }))?);
        let unsigned_token = Jwt::from(format!("{}.{}.{}", none_header, payload, signature));

        let err = authority
            .verify_token::<IdentityClaims>(&unsigned_token, &policy)
            .await
            .unwrap_err();
        assert!(matches!(&err, AuthorityError::JwtVerifyError(e) if e.is_unapproved_alg()));

        assert_eq!(hits.load(Ordering::SeqCst), 0);

        Ok(())
    }

    #[tokio::test]
    async fn concurrent_cold_verifications_fetch_at_most_twice() -> Result<()> {
        let (jwk, pkey) = generate_key("key-1")?;
        let mut jwks = Jwks::default();
        jwks.add_key(jwk);

        let (url, hits) = serve_jwks(jwks).await?;
        let authority = Authority::remote(KeySource::jwks(url), validator())?;
        let policy = ScopePolicy::allow_one(scope!["get:data"]);

        let token = issue(&pkey, &header("key-1"), &claims("get:data"))?;

        let (first, second) = tokio::join!(
            authority.verify_token::<IdentityClaims>(&token, &policy),
            authority.verify_token::<IdentityClaims>(&token, &policy),
        );

        assert_eq!(first?, second?);

        let fetches = hits.load(Ordering::SeqCst);
        assert!(
            (1..=2).contains(&fetches),
            "expected at most two fetches, saw {}",
            fetches
        );

        Ok(())
    }

    #[tokio::test]
    async fn a_forged_signature_is_rejected() -> Result<()> {
        let (jwk, _pkey) = generate_key("key-1")?;
        let (_forger_jwk, forger_pkey) = generate_key("key-1")?;

        let mut jwks = Jwks::default();
        jwks.add_key(jwk);

        let (url, _hits) = serve_jwks(jwks).await?;
        let authority = Authority::remote(KeySource::jwks(url), validator())?;
        let policy = ScopePolicy::allow_one(scope!["get:data"]);

        let forged = issue(&forger_pkey, &header("key-1"), &claims("get:data"))?;

        let err = authority
            .verify_token::<IdentityClaims>(&forged, &policy)
            .await
            .unwrap_err();

        assert!(matches!(
            &err,
            AuthorityError::JwtVerifyError(error::JwtVerifyError::JwkVerifyError(e))
                if e.is_signature_mismatch()
        ));

        Ok(())
    }

    #[tokio::test]
    async fn a_token_with_insufficient_scope_is_denied() -> Result<()> {
        let (jwk, pkey) = generate_key("key-1")?;
        let mut jwks = Jwks::default();
        jwks.add_key(jwk);

        let (url, _hits) = serve_jwks(jwks).await?;
        let authority = Authority::remote(KeySource::jwks(url), validator())?;
        let policy = ScopePolicy::allow_one(scope!["access_as_user"]);

        let insufficient = issue(&pkey, &header("key-1"), &claims("access_as_user_extra"))?;
        let err = authority
            .verify_token::<IdentityClaims>(&insufficient, &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthorityError::PolicyDenial(InsufficientScope)));

        let sufficient = issue(&pkey, &header("key-1"), &claims("access_as_user"))?;
        let verified: IdentityClaims = authority.verify_token(&sufficient, &policy).await?;
        assert_eq!(verified.scope, scope!["access_as_user"]);

        Ok(())
    }

    #[tokio::test]
    async fn an_unreachable_key_source_fails_with_a_fetch_error() -> Result<()> {
        let (_jwk, pkey) = generate_key("key-1")?;

        let authority = Authority::remote(
            KeySource::jwks("http://127.0.0.1:1/jwks.json"),
            validator(),
        )?;

        let token = issue(&pkey, &header("key-1"), &claims("get:data"))?;
        let err = authority
            .verify_token::<IdentityClaims>(&token, &ScopePolicy::allow_any())
            .await
            .unwrap_err();

        assert!(matches!(err, AuthorityError::JwksFetch(_)));

        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn an_error_status_from_the_key_source_fails_with_a_fetch_error() -> Result<()> {
        let (_jwk, pkey) = generate_key("key-1")?;

        let app = Router::new().route(
            "/jwks.json",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let addr = serve(app).await?;

        let authority = Authority::remote(
            KeySource::jwks(format!("http://{}/jwks.json", addr)),
            validator(),
        )?;

        let token = issue(&pkey, &header("key-1"), &claims("get:data"))?;
        let err = authority
            .verify_token::<IdentityClaims>(&token, &ScopePolicy::allow_any())
            .await
            .unwrap_err();

        assert!(matches!(err, AuthorityError::JwksFetch(_)));
        assert!(logs_contain("JWKS refresh failed"));

        Ok(())
    }

    #[tokio::test]
    async fn a_malformed_key_set_document_fails_with_a_fetch_error() -> Result<()> {
        let (_jwk, pkey) = generate_key("key-1")?;

        let app = Router::new().route("/jwks.json", get(|| async { "this is not a JWKS" }));
        let addr = serve(app).await?;

        let authority = Authority::remote(
            KeySource::jwks(format!("http://{}/jwks.json", addr)),
            validator(),
        )?;

        let token = issue(&pkey, &header("key-1"), &claims("get:data"))?;
        let err = authority
            .verify_token::<IdentityClaims>(&token, &ScopePolicy::allow_any())
            .await
            .unwrap_err();

        assert!(matches!(err, AuthorityError::JwksFetch(_)));

        Ok(())
    }

    #[tokio::test]
    async fn oidc_discovery_is_resolved_once_per_authority() -> Result<()> {
        let (jwk, pkey) = generate_key("key-1")?;
        let (_rogue_jwk, rogue_pkey) = generate_key("key-2")?;
        let mut jwks = Jwks::default();
        jwks.add_key(jwk);

        let discovery_hits = Arc::new(AtomicUsize::new(0));
        let jwks_hits = Arc::new(AtomicUsize::new(0));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let discovery_doc = serde_json::json!({
            "issuer": "authority",
            "jwks_uri": format!("http://{}/jwks.json", addr),
        });

        let discovery_counter = Arc::clone(&discovery_hits);
        let jwks_counter = Arc::clone(&jwks_hits);

        let app = Router::new()
            .route(
                "/.well-known/openid-configuration",
                get(move || {
                    let doc = discovery_doc.clone();
                    let counter = Arc::clone(&discovery_counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Json(doc)
                    }
                }),
            )
            .route(
                "/jwks.json",
                get(move || {
                    let jwks = jwks.clone();
                    let counter = Arc::clone(&jwks_counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Json(jwks)
                    }
                }),
            );

        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let authority = Authority::remote(
            KeySource::oidc_issuer(format!("http://{}", addr)),
            validator(),
        )?;
        let policy = ScopePolicy::allow_one(scope!["get:data"]);

        let token = issue(&pkey, &header("key-1"), &claims("get:data"))?;
        let _: IdentityClaims = authority.verify_token(&token, &policy).await?;
        assert_eq!(discovery_hits.load(Ordering::SeqCst), 1);
        assert_eq!(jwks_hits.load(Ordering::SeqCst), 1);

        let unknown = issue(&rogue_pkey, &header("key-2"), &claims("get:data"))?;
        let err = authority
            .verify_token::<IdentityClaims>(&unknown, &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthorityError::UnknownKey));
        assert_eq!(discovery_hits.load(Ordering::SeqCst), 1);
        assert_eq!(jwks_hits.load(Ordering::SeqCst), 2);

        authority.refresh().await?;
        assert_eq!(discovery_hits.load(Ordering::SeqCst), 1);
        assert_eq!(jwks_hits.load(Ordering::SeqCst), 3);

        Ok(())
    }

    #[tokio::test]
    async fn a_failed_discovery_is_retried_on_the_next_use() -> Result<()> {
        let (_jwk, pkey) = generate_key("key-1")?;

        let discovery_hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&discovery_hits);

        let app = Router::new().route(
            "/.well-known/openid-configuration",
            get(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }),
        );
        let addr = serve(app).await?;

        let authority = Authority::remote(
            KeySource::oidc_issuer(format!("http://{}", addr)),
            validator(),
        )?;

        let token = issue(&pkey, &header("key-1"), &claims("get:data"))?;

        for _ in 0..2 {
            let err = authority
                .verify_token::<IdentityClaims>(&token, &ScopePolicy::allow_any())
                .await
                .unwrap_err();
            assert!(matches!(err, AuthorityError::JwksFetch(_)));
        }

        assert_eq!(discovery_hits.load(Ordering::SeqCst), 2);

        Ok(())
    }

    #[tokio::test]
    async fn set_jwks_enables_local_verification() -> Result<()> {
        let (jwk, pkey) = generate_key("key-1")?;

        let authority = Authority::new(Jwks::default(), validator());
        let policy = ScopePolicy::allow_one(scope!["get:data"]);
        let token = issue(&pkey, &header("key-1"), &claims("get:data"))?;

        let err = authority
            .verify_token::<IdentityClaims>(&token, &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthorityError::UnknownKey));

        let mut jwks = Jwks::default();
        jwks.add_key(jwk);
        authority.set_jwks(jwks);

        let verified: IdentityClaims = authority.verify_token(&token, &policy).await?;
        assert_eq!(verified.scope, scope!["get:data"]);

        Ok(())
    }

    #[tokio::test]
    async fn an_expired_token_is_rejected() -> Result<()> {
        let (jwk, pkey) = generate_key("key-1")?;
        let mut jwks = Jwks::default();
        jwks.add_key(jwk);

        let authority = Authority::new(jwks, validator());

        let mut expired = claims("get:data");
        expired["exp"] = serde_json::json!(1500000000u64);

        let token = issue(&pkey, &header("key-1"), &expired)?;
        let err = authority
            .verify_token::<IdentityClaims>(&token, &ScopePolicy::allow_any())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AuthorityError::JwtVerifyError(error::JwtVerifyError::ClaimsRejected(
                error::ClaimsRejected::TokenExpired
            ))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn refresh_uses_etags_to_avoid_redundant_transfers() -> Result<()> {
        let (jwk, pkey) = generate_key("key-1")?;
        let mut jwks = Jwks::default();
        jwks.add_key(jwk);

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        let app = Router::new().route(
            "/jwks.json",
            get(move |headers: header::HeaderMap| {
                let jwks = jwks.clone();
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);

                    if headers.get(header::IF_NONE_MATCH)
                        == Some(&HeaderValue::from_static("\"v1\""))
                    {
                        return StatusCode::NOT_MODIFIED.into_response();
                    }

                    ([(header::ETAG, "\"v1\"")], Json(jwks)).into_response()
                }
            }),
        );
        let addr = serve(app).await?;

        let authority = Authority::remote(
            KeySource::jwks(format!("http://{}/jwks.json", addr)),
            validator(),
        )?;
        let policy = ScopePolicy::allow_one(scope!["get:data"]);
        let token = issue(&pkey, &header("key-1"), &claims("get:data"))?;

        let _: IdentityClaims = authority.verify_token(&token, &policy).await?;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        authority.refresh().await?;
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        let _: IdentityClaims = authority.verify_token(&token, &policy).await?;
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        Ok(())
    }
}
