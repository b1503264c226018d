//! Implementations of the JSON Web Algorithms (JWA) standard
//!
//! The specifications for these algorithms can be found in [RFC7518][].
//!
//! Only the RSA signature family is implemented. Tokens naming any other
//! algorithm are rejected during validation.
//!
//! [RFC7518]: https://tools.ietf.org/html/rfc7518

pub mod rsa;

#[doc(inline)]
pub use rsa::Rsa;

mod algorithm;
mod usage;

pub use algorithm::Algorithm;
pub use usage::Usage;
