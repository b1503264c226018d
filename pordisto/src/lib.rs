//! This crate implements the Javascript/JSON Object Signing and Encryption (JOSE)
//! standards needed to verify JSON Web Tokens against a JSON Web Key set,
//! including:
//!
//! * JSON Web Signature (JWS): [RFC7515][]
//! * JSON Web Key (JWK): [RFC7517][]
//! * JSON Web Algorithms (JWA): [RFC7518][]
//! * JSON Web Token (JWT): [RFC7519][]
//!
//! Only verification is implemented. This crate never holds private key
//! material and cannot mint or sign tokens. JSON Web Encryption (JWE),
//! [RFC7516][], is not supported.
//!
//! [RFC7515]: https://tools.ietf.org/html/rfc7515
//! [RFC7516]: https://tools.ietf.org/html/rfc7516
//! [RFC7517]: https://tools.ietf.org/html/rfc7517
//! [RFC7518]: https://tools.ietf.org/html/rfc7518
//! [RFC7519]: https://tools.ietf.org/html/rfc7519
//!
//! # Example
//!
//! ```
//! use pordisto::{jwt, jwt::CoreHeaders, jws, Jwk, JwtRef};
//! use pordisto::jwt::HasAlgorithm;
//!
//! let token = JwtRef::from_str(concat!(
//!     "eyJhbGciOiJSUzI1NiIsImtpZCI6IkoyWnN2RXFUZCJ9.",
//!     "eyJzdWIiOiJ1c2VyfDEyMzQiLCJhdWQiOiJodHRwczovL2FwaS5leGFtcGxlLmNvbS8iLCJpc3MiOiJo",
//!     "dHRwczovL2lzc3Vlci5leGFtcGxlLmNvbS8iLCJpYXQiOjE2NzExMjAwMDAsImV4cCI6MzI1MDM2ODAw",
//!     "MDAsInNjb3BlIjoiZ2V0OmRhdGEifQ.",
//!     "jIhMFgH90BrAdrWy5JY9UKuj4D8yfIBR_LWoiE9yyNlElGopXvBF-qDbDFH-K9h4XrPeR_x2TWGz88Dg",
//!     "jkaz8O698Z_FwNq7wjkcs9DIF9xtjaLO7yYA4tVqHf1_1ezP03xhlUs2_FtX1AlNXzGIxwz7UC69lKtF",
//!     "4Uz-a-89kjCnoU_tuolN5r-buwiDixLu026RIX_MnpWL8dlB8_166Ft6SmKPrI9NdyqagndbmgZa4xz1",
//!     "d6CRpIlsrgkSzbophGpdBoplIdch4MUkgPFCKagn00palagy67THhwQCs_lrc4qd8LOfebuzmHZzMJ4_",
//!     "7jEos2sLsa45AX3wp4JkVw"
//! ));
//!
//! let key: Jwk = serde_json::from_str(r#"{
//!     "kty": "RSA",
//!     "use": "sig",
//!     "alg": "RS256",
//!     "kid": "J2ZsvEqTd",
//!     "n": "m0yHhRf5kKj-tMo7mICjkwGzdzwWoKf-nqCKpZ3i7THzZpMWJWQ16Bm0wi0Kk2g0nd3kluygVMwCD8hnqUQzbpR-3vVRMx3BqH8htDLZQMLWJFayr2-sfs-Mijkua_CzB5aq1ccZRPrIXWTopZlQiErwZ5kD_cWamjPIkzTTSqQX28Gq9Jh-qlAESIebsCdrnw0FOJlEi7r7ds9x59og6EDOxl8dCKedM3I-QNQYoSVblgwfXWtIZZQexJxJTc__A8zhBlIIIlJ0H5dUARLi1krxVnD-90syMbzMINqBqyEuTjsmKpxEhe-7dcHCbDNq_8-5SkU7Xe9g84bvRU9v3Q",
//!     "e": "AQAB"
//! }"#).unwrap();
//!
//! let mut keys = pordisto::Jwks::default();
//! keys.add_key(key);
//!
//! let validator = jwt::CoreValidator::default()
//!     .add_approved_algorithm(jws::Algorithm::RS256)
//!     .add_allowed_audience(jwt::Audience::from_static("https://api.example.com/"))
//!     .require_issuer(jwt::Issuer::from_static("https://issuer.example.com/"));
//!
//! let decomposed: jwt::Decomposed = token.decompose().unwrap();
//! let approved = validator.approve_algorithm(decomposed.alg()).unwrap();
//! let key_ref = keys.get_key_by_id(decomposed.kid().unwrap(), approved).unwrap();
//!
//! let data: jwt::Verified = token.verify(key_ref, &validator)
//!     .expect("JWT was invalid");
//! # let _ = data;
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

pub mod error;
pub mod jwa;
pub mod jwk;
mod jwks;
pub mod jws;
pub mod jwt;


#[doc(inline)]
pub use jwk::Jwk;
#[doc(inline)]
pub use jwks::Jwks;
#[doc(inline)]
pub use jwt::{Jwt, JwtRef};
