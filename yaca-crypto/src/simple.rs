#![forbid(unsafe_code)]

//! One-shot wrappers: a single initialize / update / finalize cycle per call.
//!
//! Authenticated and key-wrap modes are not offered here because their tags
//! and length rules need the streaming API.

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::key::Key;
use crate::types::{BlockCipherMode, DigestAlgorithm, EncryptAlgorithm};
use crate::util;

fn check_simple_mode(mode: BlockCipherMode) -> Result<()> {
    match mode {
        BlockCipherMode::Gcm | BlockCipherMode::Ccm | BlockCipherMode::Wrap => {
            Err(Error::invalid(format!("{mode} mode is not available through the one-shot API")))
        }
        _ => Ok(()),
    }
}

fn join(mut head: Vec<u8>, tail: Vec<u8>) -> Result<Vec<u8>> {
    head.try_reserve_exact(tail.len())?;
    head.extend_from_slice(&tail);
    Ok(head)
}

impl Engine {
    /// Encrypts `plaintext` in one call (PKCS#7 padding for ECB/CBC).
    pub fn simple_encrypt(
        &self,
        algorithm: EncryptAlgorithm,
        mode: BlockCipherMode,
        key: &Key,
        iv: Option<&Key>,
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        check_simple_mode(mode)?;
        let mut ctx = self.encrypt_initialize(algorithm, mode, key, iv)?;
        let head = ctx.update(plaintext)?;
        join(head, ctx.finalize()?)
    }

    /// Decrypts `ciphertext` in one call.
    ///
    /// # Errors
    /// `DataMismatch` when the padding is wrong.
    pub fn simple_decrypt(
        &self,
        algorithm: EncryptAlgorithm,
        mode: BlockCipherMode,
        key: &Key,
        iv: Option<&Key>,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        check_simple_mode(mode)?;
        let mut ctx = self.decrypt_initialize(algorithm, mode, key, iv)?;
        let head = ctx.update(ciphertext)?;
        join(head, ctx.finalize()?)
    }

    /// Digest of `data`.
    pub fn simple_calculate_digest(&self, algorithm: DigestAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
        let mut ctx = self.digest_initialize(algorithm)?;
        ctx.update(data)?;
        ctx.finalize()
    }

    /// Signs `data` with PKCS#1 v1.5 (RSA), DSA or ECDSA.
    pub fn simple_calculate_signature(&self, digest: DigestAlgorithm, key: &Key, data: &[u8]) -> Result<Vec<u8>> {
        let mut ctx = self.sign_initialize(digest, key)?;
        ctx.update(data)?;
        ctx.finalize()
    }

    /// Checks `signature` over `data` with a public key.
    ///
    /// # Errors
    /// `DataMismatch` when `signature` does not match `data`.
    pub fn simple_verify_signature(
        &self,
        digest: DigestAlgorithm,
        key: &Key,
        data: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        let mut ctx = self.verify_initialize(digest, key)?;
        ctx.update(data)?;
        ctx.finalize(signature)
    }

    /// HMAC of `data` under a Symmetric or Des key.
    pub fn simple_calculate_hmac(&self, digest: DigestAlgorithm, key: &Key, data: &[u8]) -> Result<Vec<u8>> {
        let mut ctx = self.sign_initialize_hmac(digest, key)?;
        ctx.update(data)?;
        ctx.finalize()
    }

    /// CMAC of `data` under a block cipher key.
    pub fn simple_calculate_cmac(&self, algorithm: EncryptAlgorithm, key: &Key, data: &[u8]) -> Result<Vec<u8>> {
        let mut ctx = self.sign_initialize_cmac(algorithm, key)?;
        ctx.update(data)?;
        ctx.finalize()
    }
}

/// Verifies a MAC computed elsewhere against a fresh one, in constant time.
pub fn verify_mac(expected: &[u8], computed: &[u8]) -> Result<()> {
    util::memcmp(expected, computed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KeyBitLength, KeyType};

    #[test]
    fn yaca_string_through_aes_cbc() {
        let engine = Engine::default();
        let key = Key::from_bytes(KeyType::Symmetric, &[0u8; 32]).unwrap();
        let iv = Key::from_bytes(KeyType::Iv, &[0u8; 16]).unwrap();
        let ct = engine
            .simple_encrypt(EncryptAlgorithm::Aes, BlockCipherMode::Cbc, &key, Some(&iv), b"YACA")
            .unwrap();
        assert_eq!(ct.len(), 16);
        let pt = engine
            .simple_decrypt(EncryptAlgorithm::Aes, BlockCipherMode::Cbc, &key, Some(&iv), &ct)
            .unwrap();
        assert_eq!(pt, b"YACA");
    }

    #[test]
    fn aead_and_wrap_are_refused() {
        let engine = Engine::default();
        let key = Key::from_bytes(KeyType::Symmetric, &[0u8; 16]).unwrap();
        let iv = Key::from_bytes(KeyType::Iv, &[0u8; 12]).unwrap();
        for mode in [BlockCipherMode::Gcm, BlockCipherMode::Ccm] {
            assert!(engine.simple_encrypt(EncryptAlgorithm::Aes, mode, &key, Some(&iv), b"x").is_err());
        }
        assert!(engine.simple_decrypt(EncryptAlgorithm::Aes, BlockCipherMode::Wrap, &key, None, &[0u8; 24]).is_err());
    }

    #[test]
    fn empty_input_still_pads() {
        let engine = Engine::default();
        let key = engine.generate_key(KeyType::Des, KeyBitLength::Bits(192)).unwrap();
        let ct = engine
            .simple_encrypt(EncryptAlgorithm::TripleDes3Tdea, BlockCipherMode::Ecb, &key, None, b"")
            .unwrap();
        assert_eq!(ct.len(), 8);
        let pt = engine
            .simple_decrypt(EncryptAlgorithm::TripleDes3Tdea, BlockCipherMode::Ecb, &key, None, &ct)
            .unwrap();
        assert!(pt.is_empty());
    }

    #[test]
    fn hmac_verification() {
        let engine = Engine::default();
        let key = engine.generate_key(KeyType::Symmetric, KeyBitLength::Bits(256)).unwrap();
        let tag = engine.simple_calculate_hmac(DigestAlgorithm::Sha512, &key, b"data").unwrap();
        let again = engine.simple_calculate_hmac(DigestAlgorithm::Sha512, &key, b"data").unwrap();
        verify_mac(&tag, &again).unwrap();
        let other = engine.simple_calculate_hmac(DigestAlgorithm::Sha512, &key, b"date").unwrap();
        assert!(matches!(verify_mac(&tag, &other), Err(Error::DataMismatch(_))));
    }

    #[test]
    fn signatures() {
        let engine = Engine::default();
        let sk = engine.generate_key(KeyType::RsaPrivate, KeyBitLength::Bits(1024)).unwrap();
        let pk = sk.extract_public().unwrap();
        let sig = engine.simple_calculate_signature(DigestAlgorithm::Sha1, &sk, b"doc").unwrap();
        engine.simple_verify_signature(DigestAlgorithm::Sha1, &pk, b"doc", &sig).unwrap();
        assert!(engine.simple_verify_signature(DigestAlgorithm::Sha1, &pk, b"dog", &sig).is_err());
        assert_eq!(engine.simple_calculate_digest(DigestAlgorithm::Sha224, b"").unwrap().len(), 28);
    }
}
