//!
//! Context-oriented cryptography engine (unsafe-forbid).
//! - Keys: generation, extraction, PEM/DER/PKCS#8 import and export, DH/ECDH, KDFs, PBKDF2
//! - Symmetric: AES, DES/3DES, RC2, RC4, CAST5 over ECB/CBC/CTR/CFB/OFB, GCM, CCM and key wrap
//! - Signatures: RSA (PKCS#1 v1.5, PSS, X9.31), DSA, ECDSA; HMAC and CMAC
//! - Envelopes: RSA-sealed session keys
//!   - every context follows initialize -> update* -> finalize, failed calls change nothing
//!   - primitives come from a [`Provider`], the RustCrypto one by default
#![forbid(unsafe_code)]
#![warn(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::unreachable,
    clippy::todo,
    clippy::unimplemented
)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![allow(missing_docs)]

//! Everything hangs off an [`Engine`]:
//!
//! ```no_run
//! use yaca_crypto::{BlockCipherMode, EncryptAlgorithm, Engine, KeyBitLength, KeyType};
//!
//! # fn main() -> yaca_crypto::Result<()> {
//! let engine = Engine::default();
//! let key = engine.generate_key(KeyType::Symmetric, KeyBitLength::Bits(256))?;
//! let iv = engine.generate_key(KeyType::Iv, KeyBitLength::Bits(128))?;
//! let ct = engine.simple_encrypt(EncryptAlgorithm::Aes, BlockCipherMode::Cbc, &key, Some(&iv), b"YACA")?;
//! let pt = engine.simple_decrypt(EncryptAlgorithm::Aes, BlockCipherMode::Cbc, &key, Some(&iv), &ct)?;
//! assert_eq!(pt, b"YACA");
//! # Ok(())
//! # }
//! ```

/// Symmetric encryption contexts and chaining modes.
pub mod cipher;
/// Engine configuration (TOML file and environment).
pub mod config;
/// Context phase machine.
pub mod context;
/// Message digests.
pub mod digest;
/// The engine handle.
pub mod engine;
/// Error type and classification.
pub mod error;
/// Key store.
pub mod key;
/// Primitive provider seam.
pub mod provider;
/// Low-level RSA operations.
pub mod rsa;
/// RSA envelopes.
pub mod seal;
/// Signature and MAC contexts.
pub mod sign;
/// One-shot wrappers.
pub mod simple;
/// Algorithm, mode and key descriptors.
pub mod types;
/// Allocation, comparison and randomness helpers.
pub mod util;

pub use cipher::{CipherContext, CipherOperation};
pub use config::EngineConfig;
pub use context::Phase;
pub use digest::DigestContext;
pub use engine::Engine;
pub use error::{Error, ErrorKind, Result};
pub use key::{derive_kdf, derive_pbkdf2, Key};
pub use provider::{BlockCipher, KeystreamCipher, Provider, RustCryptoProvider};
pub use seal::Seal;
pub use sign::{SignContext, VerifyContext};
pub use simple::verify_mac;
pub use types::{
    BlockCipherMode, DhLength, DigestAlgorithm, EcCurve, EncryptAlgorithm, Kdf, KeyBitLength, KeyFileFormat,
    KeyFormat, KeyType, Padding,
};
pub use util::{memcmp, random_bytes};
