use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{jwa, jwk, Jwk};

/// A JSON Web Key Set (JWKS)
///
/// Keys carrying a key ID are indexed on construction, so lookups by ID
/// do not rescan the set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "JwksDto")]
pub struct Jwks {
    keys: Vec<Jwk>,
    #[serde(skip)]
    by_id: HashMap<jwk::KeyId, usize>,
}

impl Jwks {
    /// Adds a key to the set
    pub fn add_key(&mut self, key: Jwk) {
        if let Some(kid) = key.key_id() {
            self.by_id.entry(kid.to_owned()).or_insert(self.keys.len());
        }
        self.keys.push(key);
    }

    /// A view of the keys in this set
    pub fn keys(&self) -> &[Jwk] {
        &self.keys
    }

    /// Gets the best key based on the algorithm requested
    pub fn get_key<A: Into<jwa::Algorithm>>(&self, alg: A) -> Option<&Jwk> {
        get_key_impl(self.keys(), alg.into())
    }

    /// Gets the best key based on the key id and algorithm requested
    pub fn get_key_by_id<A: Into<jwa::Algorithm>>(
        &self,
        kid: &'_ jwk::KeyIdRef,
        alg: A,
    ) -> Option<&Jwk> {
        let alg = alg.into();

        if let Some(&idx) = self.by_id.get(kid) {
            let key = &self.keys[idx];
            if is_candidate(key, alg) {
                return Some(key);
            }
        }

        get_key_by_id_impl(self.keys(), kid, alg)
    }

    /// Gets the best key based on the key id (if provided) and algorithm requested
    pub fn get_key_by_opt<A: Into<jwa::Algorithm>>(
        &self,
        kid: Option<&'_ jwk::KeyIdRef>,
        alg: A,
    ) -> Option<&Jwk> {
        match kid {
            Some(kid) => self.get_key_by_id(kid, alg),
            None => get_key_impl(self.keys(), alg.into()),
        }
    }
}

#[derive(Deserialize)]
struct JwksDto {
    #[serde(deserialize_with = "deserialize_keys")]
    keys: Vec<Jwk>,
}

impl From<JwksDto> for Jwks {
    fn from(dto: JwksDto) -> Self {
        let mut jwks = Jwks::default();
        for key in dto.keys {
            jwks.add_key(key);
        }
        jwks
    }
}

fn is_candidate(key: &Jwk, alg: jwa::Algorithm) -> bool {
    if !key.is_compatible(alg) {
        return false;
    }

    if matches!(key.algorithm(), Some(a) if a != alg) {
        return false;
    }

    !matches!(key.usage(), Some(u) if u != alg.to_usage())
}

fn get_key_impl(keys: &[Jwk], alg: jwa::Algorithm) -> Option<&Jwk> {
    let alg_usage = alg.to_usage();

    let best = keys.iter().fold(None, move |best, k| {
        let mut score = 0;

        if !k.is_compatible(alg) {
            return best;
        }

        if let Some(algorithm) = k.algorithm() {
            if algorithm == alg {
                score += 2;
            } else {
                return best;
            }
        }

        if let Some(key_usage) = k.usage() {
            if key_usage == alg_usage {
                score += 1;
            } else {
                return best;
            }
        }

        match best {
            Some((_, best_score)) if best_score < score => Some((k, score)),
            None => Some((k, score)),
            _ => best,
        }
    });

    best.map(|(b, _)| b)
}

fn get_key_by_id_impl<'a>(
    keys: &'a [Jwk],
    kid: &'_ jwk::KeyIdRef,
    alg: jwa::Algorithm,
) -> Option<&'a Jwk> {
    let alg_usage = alg.to_usage();

    let best = keys.iter().fold(None, move |best, k| {
        let mut score = 0;

        if !k.is_compatible(alg) {
            return best;
        }

        if let Some(key_id) = k.key_id() {
            if key_id == kid {
                score += 4;
            } else {
                return best;
            }
        }

        if let Some(algorithm) = k.algorithm() {
            if algorithm == alg {
                score += 2;
            } else {
                return best;
            }
        }

        if let Some(key_usage) = k.usage() {
            if key_usage == alg_usage {
                score += 1;
            } else {
                return best;
            }
        }

        match best {
            Some((_, best_score)) if best_score < score => Some((k, score)),
            None => Some((k, score)),
            _ => best,
        }
    });

    best.map(|(b, _)| b)
}

fn deserialize_keys<'de, D>(deserializer: D) -> Result<Vec<Jwk>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct MaybeJwksVisitor;

    impl<'de> serde::de::Visitor<'de> for MaybeJwksVisitor {
        type Value = Vec<Jwk>;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("a list of JWK objects")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: serde::de::SeqAccess<'de>,
        {
            let mut values = Vec::with_capacity(seq.size_hint().unwrap_or_default());
            let mut index = 0_usize;

            while let Some(value) = seq.next_element()? {
                match value {
                    MaybeJwk::Jwk(jwk) => values.push(jwk),
                    MaybeJwk::Unknown(key) => {
                        tracing::warn!(
                            jwks.idx = index,
                            jwk.kid = ?key.kid,
                            "jwk.use" = ?key.r#use,
                            jwk.alg = ?key.alg,
                            "ignoring unknown JWK"
                        );
                    }
                }
                index += 1;
            }

            Ok(values)
        }
    }

    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum MaybeJwk {
        Jwk(Jwk),
        Unknown(JwkLike),
    }

    #[allow(dead_code)]
    #[derive(serde::Deserialize)]
    struct JwkLike {
        #[serde(default)]
        kid: Option<jwk::KeyId>,
        #[serde(rename = "use", default)]
        r#use: Option<String>,
        #[serde(default)]
        alg: Option<String>,
    }

    deserializer.deserialize_seq(MaybeJwksVisitor)
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;
    use tracing_test::traced_test;

    use super::*;
    use crate::{jwk::KeyIdRef, test};

    const JWKS_WITH_UNKNOWN_ALG: &str = r#"
        {
            "keys": [
                {
                    "kid": "1",
                    "use": "enc",
                    "alg": "RSA-OAEP"
                }
            ]
        }
    "#;

    const JWKS_WITH_NO_ALG: &str = r#"
        {
            "keys": [
                {
                    "kid": "1",
                    "use": "enc"
                }
            ]
        }
    "#;

    const JWKS_WITH_NOTHING: &str = r#"
        {
            "keys": [
                {}
            ]
        }
    "#;

    #[test]
    #[traced_test]
    fn deserializes_jwks_with_unknown_alg() -> Result<()> {
        let jwks: Jwks = serde_json::from_str(JWKS_WITH_UNKNOWN_ALG)?;
        dbg!(&jwks);
        assert!(jwks.keys.is_empty());
        Ok(())
    }

    #[test]
    #[traced_test]
    fn deserialize_jwks_with_no_alg() -> Result<()> {
        let jwks: Jwks = serde_json::from_str(JWKS_WITH_NO_ALG)?;
        dbg!(&jwks);
        assert!(jwks.keys.is_empty());
        Ok(())
    }

    #[test]
    #[traced_test]
    fn deserialize_jwks_with_nothing() -> Result<()> {
        let jwks: Jwks = serde_json::from_str(JWKS_WITH_NOTHING)?;
        dbg!(&jwks);
        assert!(jwks.keys.is_empty());
        Ok(())
    }

    #[test]
    #[traced_test]
    fn decodes_jwks() -> Result<()> {
        let jwks: Jwks = serde_json::from_str(test::rsa::JWKS)?;
        dbg!(&jwks);
        assert_eq!(jwks.keys.len(), 2);
        Ok(())
    }

    #[test]
    fn finds_key_by_id() -> Result<()> {
        let jwks: Jwks = serde_json::from_str(test::rsa::JWKS)?;

        let key = jwks
            .get_key_by_id(KeyIdRef::from_str(test::rsa::TEST_KEY_ID), jwa::Algorithm::RS256)
            .ok_or_else(|| color_eyre::eyre::eyre!("no key"))?;

        assert_eq!(key.key_id(), Some(KeyIdRef::from_str(test::rsa::TEST_KEY_ID)));
        Ok(())
    }

    #[test]
    fn finds_unadorned_key_by_id() -> Result<()> {
        let jwks: Jwks = serde_json::from_str(test::rsa::JWKS)?;

        let key = jwks
            .get_key_by_id(KeyIdRef::from_str("QxLpM3zWn"), jwa::Algorithm::RS512)
            .ok_or_else(|| color_eyre::eyre::eyre!("no key"))?;

        assert_eq!(key.key_id(), Some(KeyIdRef::from_str("QxLpM3zWn")));
        Ok(())
    }

    #[test]
    fn misses_unknown_key_id() -> Result<()> {
        let jwks: Jwks = serde_json::from_str(test::rsa::JWKS)?;

        let key = jwks.get_key_by_id(KeyIdRef::from_str("absent"), jwa::Algorithm::RS256);

        assert!(key.is_none());
        Ok(())
    }

    #[test]
    fn misses_key_declared_for_another_alg() -> Result<()> {
        let jwks: Jwks = serde_json::from_str(test::rsa::JWKS)?;

        let key = jwks.get_key_by_id(
            KeyIdRef::from_str(test::rsa::TEST_KEY_ID),
            jwa::Algorithm::RS512,
        );

        assert!(key.is_none());
        Ok(())
    }

    #[test]
    fn prefers_fully_matched_key_when_no_id_given() -> Result<()> {
        let jwks: Jwks = serde_json::from_str(test::rsa::JWKS)?;

        let key = jwks
            .get_key(jwa::Algorithm::RS256)
            .ok_or_else(|| color_eyre::eyre::eyre!("no key"))?;

        assert_eq!(key.key_id(), Some(KeyIdRef::from_str(test::rsa::TEST_KEY_ID)));
        Ok(())
    }

    #[test]
    fn reserialized_set_still_finds_keys() -> Result<()> {
        let jwks: Jwks = serde_json::from_str(test::rsa::JWKS)?;
        let round_tripped: Jwks = serde_json::from_str(&serde_json::to_string(&jwks)?)?;

        assert_eq!(jwks, round_tripped);
        assert!(round_tripped
            .get_key_by_id(KeyIdRef::from_str(test::rsa::TEST_KEY_ID), jwa::Algorithm::RS256)
            .is_some());
        Ok(())
    }
}
