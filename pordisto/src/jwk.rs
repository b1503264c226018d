//! Implementations of the JSON Web Keys (JWK) standard
//!
//! The specifications for JSON Web Keys can be found in [RFC7517][].
//!
//! [RFC7517]: https://tools.ietf.org/html/rfc7517

use std::convert::TryFrom;

use aliri_braid::braid;
use serde::{Deserialize, Serialize, Serializer};

use crate::{
    error, jwa,
    jws::{self, Verifier},
};

/// An identifier for a JWK
#[braid(serde, ref_doc = "A borrowed reference to JWK identifier ([`KeyId`])")]
pub struct KeyId;

/// An identified JSON Web Key
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "JwkDto")]
#[must_use]
pub struct Jwk {
    key_id: Option<KeyId>,
    usage: Option<jwa::Usage>,
    algorithm: Option<jwa::Algorithm>,
    key: Key,
}

impl Jwk {
    /// The key ID
    #[must_use]
    pub fn key_id(&self) -> Option<&KeyIdRef> {
        self.key_id.as_deref()
    }

    /// The intended usage of the key
    #[must_use]
    pub fn usage(&self) -> Option<jwa::Usage> {
        self.usage
    }

    /// The algorithm to be used with this JWK
    #[must_use]
    pub fn algorithm(&self) -> Option<jwa::Algorithm> {
        self.algorithm
    }

    /// Whether the key is compatible with the given algorithm
    #[must_use]
    pub fn is_compatible(&self, alg: jwa::Algorithm) -> bool {
        self.key.is_compatible(alg)
    }

    /// Sets the key ID
    pub fn with_key_id(self, kid: KeyId) -> Self {
        Self {
            key_id: Some(kid),
            ..self
        }
    }

    /// Sets the key's usage
    pub fn with_usage(self, usage: jwa::Usage) -> Self {
        Self {
            usage: Some(usage),
            ..self
        }
    }

    /// Sets the algorithm and usage consistent with that algorithm
    pub fn with_algorithm(self, alg: impl Into<jwa::Algorithm>) -> Self {
        let alg = alg.into();
        Self {
            algorithm: Some(alg),
            usage: Some(alg.to_usage()),
            ..self
        }
    }
}

impl From<jwa::Rsa> for Jwk {
    fn from(key: jwa::Rsa) -> Self {
        Self {
            key_id: None,
            usage: None,
            algorithm: None,
            key: Key::from(key),
        }
    }
}

impl From<jwa::rsa::PublicKey> for Jwk {
    fn from(key: jwa::rsa::PublicKey) -> Self {
        Self {
            key_id: None,
            usage: None,
            algorithm: None,
            key: Key::from(key),
        }
    }
}

impl Verifier for Jwk {
    type Algorithm = jwa::Algorithm;
    type Error = error::JwkVerifyError;

    fn can_verify(&self, alg: Self::Algorithm) -> bool {
        if let Ok(alg) = jws::Algorithm::try_from(alg) {
            self.key.can_verify(alg)
        } else {
            false
        }
    }

    fn verify(
        &self,
        alg: Self::Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Self::Error> {
        if alg.to_usage() != jwa::Usage::Signing {
            return Err(error::jwk_usage_mismatch().into());
        }

        if let Some(u) = self.usage {
            if u != jwa::Usage::Signing {
                return Err(error::jwk_usage_mismatch().into());
            }
        }

        match self.algorithm {
            Some(key_alg) if key_alg == alg => {}
            Some(_) => {
                return Err(error::incompatible_algorithm(alg).into());
            }
            None => {}
        }

        let alg = jws::Algorithm::try_from(alg)?;
        self.key.verify(alg, data, signature)?;

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct JwkDto {
    #[serde(rename = "kid", default, skip_serializing_if = "Option::is_none")]
    key_id: Option<KeyId>,

    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    usage: Option<jwa::Usage>,

    #[serde(rename = "alg", default, skip_serializing_if = "Option::is_none")]
    algorithm: Option<jwa::Algorithm>,

    #[serde(flatten)]
    key: Key,
}

impl TryFrom<JwkDto> for Jwk {
    type Error = error::IncompatibleAlgorithm;

    fn try_from(dto: JwkDto) -> Result<Self, Self::Error> {
        if let Some(alg) = &dto.algorithm {
            if !dto.key.is_compatible(*alg) {
                return Err(error::incompatible_algorithm(*alg));
            }
        }

        Ok(Self {
            key_id: dto.key_id,
            usage: dto.usage,
            algorithm: dto.algorithm,
            key: dto.key,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct JwkDtoRef<'a> {
    #[serde(rename = "kid")]
    key_id: Option<&'a KeyIdRef>,

    #[serde(rename = "use")]
    usage: Option<jwa::Usage>,

    #[serde(rename = "alg")]
    algorithm: Option<jwa::Algorithm>,

    #[serde(flatten)]
    key: &'a Key,
}

impl Serialize for Jwk {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let dto = JwkDtoRef {
            key_id: self.key_id(),
            usage: self.usage(),
            algorithm: self.algorithm(),
            key: &self.key,
        };

        dto.serialize(serializer)
    }
}

/// A JSON Web Key
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kty")]
enum Key {
    /// RSA
    #[serde(rename = "RSA")]
    Rsa(jwa::rsa::Rsa),
}

impl Key {
    fn is_compatible(&self, alg: jwa::Algorithm) -> bool {
        match alg {
            jwa::Algorithm::Signing(alg) => self.can_verify(alg),
        }
    }
}

impl From<jwa::Rsa> for Key {
    fn from(key: jwa::Rsa) -> Self {
        Self::Rsa(key)
    }
}

impl From<jwa::rsa::PublicKey> for Key {
    fn from(key: jwa::rsa::PublicKey) -> Self {
        Self::Rsa(key.into())
    }
}

impl Verifier for Key {
    type Algorithm = jws::Algorithm;
    type Error = error::JwkVerifyError;

    fn can_verify(&self, alg: Self::Algorithm) -> bool {
        match self {
            Self::Rsa(p) => {
                if let Ok(alg) = jwa::rsa::SigningAlgorithm::try_from(alg) {
                    p.can_verify(alg)
                } else {
                    false
                }
            }
        }
    }

    fn verify(
        &self,
        alg: Self::Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Self::Error> {
        match self {
            Self::Rsa(p) => p.verify(jwa::rsa::SigningAlgorithm::try_from(alg)?, data, signature)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use aliri_base64::Base64Url;
    use color_eyre::Result;

    use super::*;
    use crate::test;

    mod serialization {
        use super::*;

        #[test]
        fn deserialize() -> Result<()> {
            let key: Jwk = serde_json::from_str(test::rsa::JWK)?;
            assert_eq!(key.algorithm, Some(jwa::Algorithm::RS256));
            assert_eq!(
                key.key_id(),
                Some(KeyIdRef::from_str(test::rsa::TEST_KEY_ID))
            );
            Ok(())
        }

        #[test]
        fn deserialize_minimal() -> Result<()> {
            let key: Jwk = serde_json::from_str(test::rsa::JWK_MINIMAL)?;
            assert_eq!(key.algorithm, None);
            assert_eq!(key.key_id(), None);
            Ok(())
        }

        #[test]
        fn serialization_round_trip() -> Result<()> {
            let key: Jwk = serde_json::from_str(test::rsa::JWK)?;
            let reserialized = serde_json::to_string(&key)?;
            let key2: Jwk = serde_json::from_str(&reserialized)?;
            assert_eq!(key, key2);
            Ok(())
        }
    }

    mod verification {
        use super::*;

        #[test]
        fn error_using_encryption_key_for_signing() {
            let key = Jwk {
                key_id: None,
                usage: Some(jwa::Usage::Encryption),
                algorithm: None,
                key: Key::Rsa(
                    jwa::Rsa::from_public_components(
                        Base64Url::from_raw(vec![0; 256]),
                        Base64Url::from_raw(Vec::new()),
                    )
                    .unwrap(),
                ),
            };

            let err = dbg!(key.verify(jwa::Algorithm::RS256, &[], &[])).unwrap_err();

            assert!(err.is_usage_mismatch());
        }

        #[test]
        fn error_using_alg_other_than_declared() {
            let key: Jwk = serde_json::from_str(test::rsa::JWK).unwrap();

            let err = dbg!(key.verify(jwa::Algorithm::RS512, &[], &[])).unwrap_err();

            assert!(err.is_incompatible_alg());
        }

        #[test]
        fn verify_rs256() -> Result<()> {
            let (pkey, jwk) = test::rsa::generate()?;
            let message = b"brute force is no substitute for arithmetic";
            let signature = test::rsa::sign_pkcs1_sha256(&pkey, message)?;

            jwk.verify(jwa::Algorithm::RS256, message, &signature)?;
            Ok(())
        }

        #[test]
        fn verify_rs256_rejects_tampered_data() -> Result<()> {
            let (pkey, jwk) = test::rsa::generate()?;
            let message = b"brute force is no substitute for arithmetic";
            let signature = test::rsa::sign_pkcs1_sha256(&pkey, message)?;

            let err = dbg!(jwk.verify(jwa::Algorithm::RS256, b"brute force", &signature))
                .unwrap_err();

            assert!(err.is_signature_mismatch());
            Ok(())
        }

        #[test]
        fn verify_rs256_rejects_signature_from_other_key() -> Result<()> {
            let (pkey, _) = test::rsa::generate()?;
            let (_, other_jwk) = test::rsa::generate()?;
            let message = b"brute force is no substitute for arithmetic";
            let signature = test::rsa::sign_pkcs1_sha256(&pkey, message)?;

            let err = dbg!(other_jwk.verify(jwa::Algorithm::RS256, message, &signature))
                .unwrap_err();

            assert!(err.is_signature_mismatch());
            Ok(())
        }

        #[test]
        fn verify_ps256() -> Result<()> {
            let (pkey, jwk) = test::rsa::generate()?;
            let message = b"brute force is no substitute for arithmetic";
            let signature = test::rsa::sign_pss_sha256(&pkey, message)?;

            jwk.verify(jwa::Algorithm::PS256, message, &signature)?;
            Ok(())
        }
    }
}
