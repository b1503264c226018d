use std::{convert::TryFrom, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{error, jwa, jws};

/// An algorithm
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum Algorithm {
    /// A signing/verification algorithm
    Signing(jws::Algorithm),
}

impl Algorithm {
    /// The RS256 signing algorithm
    pub const RS256: Algorithm = Self::Signing(jws::Algorithm::RS256);
    /// The RS384 signing algorithm
    pub const RS384: Algorithm = Self::Signing(jws::Algorithm::RS384);
    /// The RS512 signing algorithm
    pub const RS512: Algorithm = Self::Signing(jws::Algorithm::RS512);
    /// The PS256 signing algorithm
    pub const PS256: Algorithm = Self::Signing(jws::Algorithm::PS256);
    /// The PS384 signing algorithm
    pub const PS384: Algorithm = Self::Signing(jws::Algorithm::PS384);
    /// The PS512 signing algorithm
    pub const PS512: Algorithm = Self::Signing(jws::Algorithm::PS512);

    /// Gets the usage related to this algorithm
    pub fn to_usage(self) -> jwa::Usage {
        match self {
            Self::Signing(_) => jwa::Usage::Signing,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Signing(x) => fmt::Display::fmt(x, f),
        }
    }
}

impl TryFrom<&'_ str> for Algorithm {
    type Error = error::UnknownAlgorithm;

    #[inline]
    fn try_from(value: &'_ str) -> Result<Self, Self::Error> {
        match value {
            "RS256" => Ok(Algorithm::RS256),
            "RS384" => Ok(Algorithm::RS384),
            "RS512" => Ok(Algorithm::RS512),
            "PS256" => Ok(Algorithm::PS256),
            "PS384" => Ok(Algorithm::PS384),
            "PS512" => Ok(Algorithm::PS512),
            _ => Err(error::unknown_algorithm(value.to_string())),
        }
    }
}

impl TryFrom<String> for Algorithm {
    type Error = error::UnknownAlgorithm;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = error::UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

impl<T> From<T> for Algorithm
where
    jws::Algorithm: From<T>,
{
    #[inline]
    fn from(alg: T) -> Self {
        Self::Signing(jws::Algorithm::from(alg))
    }
}

impl TryFrom<Algorithm> for jws::Algorithm {
    type Error = error::IncompatibleAlgorithm;

    #[inline]
    fn try_from(alg: Algorithm) -> Result<Self, Self::Error> {
        match alg {
            Algorithm::Signing(alg) => Ok(alg),

            #[allow(unreachable_patterns)]
            _ => Err(error::incompatible_algorithm(alg)),
        }
    }
}
