#![forbid(unsafe_code)]

//! Message digests: streaming context plus the hasher dispatch reused by signatures.

use crate::context::{Lifecycle, Phase};
use crate::engine::Engine;
use crate::error::Result;
use crate::types::DigestAlgorithm;
use crate::util::impl_destroy;
use digest::Digest;
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};

#[derive(Clone)]
pub(crate) enum Hasher {
    Md5(Md5),
    Sha1(Sha1),
    Sha224(Sha224),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

macro_rules! each_hasher {
    ($value:expr, $h:ident => $body:expr) => {
        match $value {
            Hasher::Md5($h) => $body,
            Hasher::Sha1($h) => $body,
            Hasher::Sha224($h) => $body,
            Hasher::Sha256($h) => $body,
            Hasher::Sha384($h) => $body,
            Hasher::Sha512($h) => $body,
        }
    };
}

impl Hasher {
    pub(crate) fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => Self::Md5(Md5::new()),
            DigestAlgorithm::Sha1 => Self::Sha1(Sha1::new()),
            DigestAlgorithm::Sha224 => Self::Sha224(Sha224::new()),
            DigestAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            DigestAlgorithm::Sha384 => Self::Sha384(Sha384::new()),
            DigestAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
        }
    }

    pub(crate) fn update(&mut self, data: &[u8]) {
        each_hasher!(self, h => Digest::update(h, data))
    }

    pub(crate) fn finalize(self) -> Vec<u8> {
        each_hasher!(self, h => h.finalize().to_vec())
    }
}

/// One-shot digest.
pub(crate) fn hash(algorithm: DigestAlgorithm, data: &[u8]) -> Vec<u8> {
    let mut h = Hasher::new(algorithm);
    h.update(data);
    h.finalize()
}

/// Streaming message digest.
pub struct DigestContext {
    algorithm: DigestAlgorithm,
    hasher: Hasher,
    lifecycle: Lifecycle,
}

impl_destroy!(DigestContext);

impl DigestContext {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self { algorithm, hasher: Hasher::new(algorithm), lifecycle: Lifecycle::new() }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    /// Absorbs `data`; empty input is accepted.
    pub fn update(&mut self, data: &[u8]) -> Result<()> {
        self.lifecycle.check_update()?;
        self.hasher.update(data);
        self.lifecycle.updated();
        Ok(())
    }

    /// Produces the digest. A second finalize is rejected.
    pub fn finalize(&mut self) -> Result<Vec<u8>> {
        self.lifecycle.check_finalize()?;
        let out = self.hasher.clone().finalize();
        self.lifecycle.finalized();
        Ok(out)
    }

    /// Output size: 0 for updates, the digest length for finalize (`input_len == 0`).
    pub fn output_length(&self, input_len: usize) -> Result<usize> {
        Ok(if input_len == 0 { self.algorithm.output_len() } else { 0 })
    }
}

impl Engine {
    /// Starts a streaming digest.
    pub fn digest_initialize(&self, algorithm: DigestAlgorithm) -> Result<DigestContext> {
        tracing::debug!(%algorithm, "digest context created");
        Ok(DigestContext::new(algorithm))
    }
}
