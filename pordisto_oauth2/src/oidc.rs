//! OpenID Connect discovery document resolution

use reqwest::Client;
use serde::{Deserialize, Serialize};

/// The subset of the OIDC provider metadata used to locate the
/// provider's JSON Web Key Set
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OidcConfiguration {
    /// The issuer asserted by the provider
    pub issuer: String,

    /// The URL of the provider's JSON Web Key Set
    pub jwks_uri: String,
}

impl OidcConfiguration {
    /// Fetches the OIDC provider metadata from `uri`
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be completed, if the
    /// response status was not successful, or if the body was not a
    /// valid discovery document.
    pub async fn fetch(client: &Client, uri: &str) -> Result<Self, reqwest::Error> {
        let response = client.get(uri).send().await?;
        response.error_for_status_ref()?;

        let oidc_document = response.json::<Self>().await?;

        Ok(oidc_document)
    }
}
