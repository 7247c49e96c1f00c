#![forbid(unsafe_code)]

//! Signature, HMAC and CMAC contexts.
//!
//! Asymmetric signing hashes the stream with the chosen digest and signs the
//! hash at finalize: RSA (PKCS#1 v1.5, PSS or X9.31), DSA and ECDSA (DER
//! `SEQUENCE { r, s }`). MACs have no verify context; recompute the tag and
//! compare it with [`memcmp`](crate::util::memcmp).

use crate::cipher::{check_key_bits, check_key_type};
use crate::context::{Lifecycle, Phase};
use crate::digest::Hasher;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::key::ec::{EcPublicKey, EcSecretKey};
use crate::key::{Key, KeyMaterial};
use crate::rsa::{x931_recover, x931_sign};
use crate::types::{DigestAlgorithm, EncryptAlgorithm, KeyType, Padding};
use crate::util::impl_destroy;
use cmac::Cmac;
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, Pss, RsaPrivateKey, RsaPublicKey};
use signature::hazmat::{PrehashSigner, PrehashVerifier};
use signature::SignatureEncoding;
use tracing::{debug, warn};

/// Binds `$d` to the hash type behind a [`DigestAlgorithm`].
macro_rules! with_digest {
    ($algo:expr, $d:ident => $body:expr) => {
        match $algo {
            DigestAlgorithm::Md5 => {
                type $d = md5::Md5;
                $body
            }
            DigestAlgorithm::Sha1 => {
                type $d = sha1::Sha1;
                $body
            }
            DigestAlgorithm::Sha224 => {
                type $d = sha2::Sha224;
                $body
            }
            DigestAlgorithm::Sha256 => {
                type $d = sha2::Sha256;
                $body
            }
            DigestAlgorithm::Sha384 => {
                type $d = sha2::Sha384;
                $body
            }
            DigestAlgorithm::Sha512 => {
                type $d = sha2::Sha512;
                $body
            }
        }
    };
}

/// Hash identifier byte appended to the digest in X9.31 signatures.
fn x931_hash_id(digest: DigestAlgorithm) -> Result<u8> {
    match digest {
        DigestAlgorithm::Sha1 => Ok(0x33),
        DigestAlgorithm::Sha256 => Ok(0x34),
        DigestAlgorithm::Sha384 => Ok(0x36),
        DigestAlgorithm::Sha512 => Ok(0x35),
        other => Err(Error::invalid(format!("X9.31 signatures cannot use {other}"))),
    }
}

/// DER `DigestInfo` header length for PKCS#1 v1.5 signatures.
const fn digest_info_prefix_len(digest: DigestAlgorithm) -> usize {
    match digest {
        DigestAlgorithm::Md5 => 18,
        DigestAlgorithm::Sha1 => 15,
        _ => 19,
    }
}

/// Rejects a padding / digest pair whose encoding does not fit a `k`-byte modulus.
fn check_rsa_fit(padding: Padding, digest: DigestAlgorithm, k: usize) -> Result<()> {
    let h = digest.output_len();
    let needed = match padding {
        Padding::Pkcs1 => digest_info_prefix_len(digest) + h + 11,
        Padding::Pkcs1Pss => 2 * h + 2,
        Padding::X931 => {
            x931_hash_id(digest)?;
            h + 3
        }
        other => return Err(Error::invalid(format!("{other} padding is not a signature padding"))),
    };
    if needed > k {
        return Err(Error::invalid(format!(
            "{padding} with {digest} needs a modulus of at least {} bits",
            needed * 8
        )));
    }
    Ok(())
}

/// DER size bound of `SEQUENCE { INTEGER r, INTEGER s }` for `n`-byte scalars.
const fn max_der_signature_len(n: usize) -> usize {
    2 * (n + 3) + 3
}

trait MacState: Send {
    fn absorb(&mut self, data: &[u8]);
    fn tag(&self) -> Vec<u8>;
}

impl<M: Mac + Clone + Send> MacState for M {
    fn absorb(&mut self, data: &[u8]) {
        Mac::update(self, data);
    }

    fn tag(&self) -> Vec<u8> {
        self.clone().finalize().into_bytes().to_vec()
    }
}

fn mac<M>(key: &[u8]) -> Result<Box<dyn MacState>>
where
    M: Mac + KeyInit + Clone + Send + 'static,
{
    let m = <M as KeyInit>::new_from_slice(key)
        .map_err(|_| Error::invalid(format!("{}-bit key rejected by the MAC", key.len() * 8)))?;
    Ok(Box::new(m))
}

enum Signer {
    Rsa { key: RsaPrivateKey, padding: Padding },
    Dsa(dsa::SigningKey),
    Ec(EcSecretKey),
}

enum SignState {
    Asymmetric { hasher: Hasher, signer: Signer },
    Mac { state: Box<dyn MacState>, tag_len: usize },
}

/// Streaming signature or MAC calculation.
pub struct SignContext {
    digest: Option<DigestAlgorithm>,
    lifecycle: Lifecycle,
    state: SignState,
}

impl_destroy!(SignContext);

impl std::fmt::Debug for SignContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignContext")
            .field("digest", &self.digest)
            .field("phase", &self.lifecycle.phase())
            .finish_non_exhaustive()
    }
}

impl SignContext {
    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    pub fn update(&mut self, data: &[u8]) -> Result<()> {
        self.lifecycle.check_update()?;
        match &mut self.state {
            SignState::Asymmetric { hasher, .. } => hasher.update(data),
            SignState::Mac { state, .. } => state.absorb(data),
        }
        self.lifecycle.updated();
        Ok(())
    }

    /// Signs the absorbed data or emits the MAC.
    pub fn finalize(&mut self) -> Result<Vec<u8>> {
        self.lifecycle.check_finalize()?;
        let out = match &self.state {
            SignState::Mac { state, .. } => state.tag(),
            SignState::Asymmetric { hasher, signer } => {
                let hashed = hasher.clone().finalize();
                let digest = self.digest.ok_or_else(|| Error::internal("asymmetric context without digest"))?;
                sign_hash(signer, digest, &hashed)?
            }
        };
        self.lifecycle.finalized();
        Ok(out)
    }

    /// RSA signature padding (PKCS#1 by default); must be set before finalize.
    pub fn set_padding(&mut self, padding: Padding) -> Result<()> {
        self.lifecycle.check_finalize()?;
        let digest = self.digest;
        match (&mut self.state, digest) {
            (SignState::Asymmetric { signer: Signer::Rsa { key, padding: current }, .. }, Some(digest)) => {
                check_rsa_fit(padding, digest, key.size())?;
                *current = padding;
                Ok(())
            }
            _ => Err(Error::invalid("padding only applies to RSA signatures")),
        }
    }

    /// Output size: 0 for updates, the maximum signature or MAC length for finalize.
    pub fn output_length(&self, input_len: usize) -> Result<usize> {
        if input_len > 0 {
            return Ok(0);
        }
        Ok(match &self.state {
            SignState::Mac { tag_len, .. } => *tag_len,
            SignState::Asymmetric { signer: Signer::Rsa { key, .. }, .. } => key.size(),
            SignState::Asymmetric { signer: Signer::Dsa(k), .. } => {
                max_der_signature_len(k.verifying_key().components().q().bits().div_ceil(8))
            }
            SignState::Asymmetric { signer: Signer::Ec(k), .. } => max_der_signature_len(k.curve().field_len()),
        })
    }
}

fn sign_hash(signer: &Signer, digest: DigestAlgorithm, hashed: &[u8]) -> Result<Vec<u8>> {
    let sig_err = |e: signature::Error| Error::internal(format!("sign: {e}"));
    match signer {
        Signer::Rsa { key, padding } => match padding {
            Padding::Pkcs1Pss => with_digest!(digest, D => key.sign_with_rng(&mut OsRng, Pss::new::<D>(), hashed))
                .map_err(|e| Error::internal(format!("rsa: {e}"))),
            Padding::X931 => {
                let mut data = hashed.to_vec();
                data.push(x931_hash_id(digest)?);
                x931_sign(key, &data)
            }
            _ => with_digest!(digest, D => key.sign_with_rng(&mut OsRng, Pkcs1v15Sign::new::<D>(), hashed))
                .map_err(|e| Error::internal(format!("rsa: {e}"))),
        },
        Signer::Dsa(k) => {
            let sig: dsa::Signature = k.sign_prehash(hashed).map_err(sig_err)?;
            Ok(sig.to_vec())
        }
        Signer::Ec(k) => k.sign_prehash(hashed),
    }
}

enum Verifier {
    Rsa { key: RsaPublicKey, padding: Padding },
    Dsa(dsa::VerifyingKey),
    Ec(EcPublicKey),
}

/// Streaming signature verification.
pub struct VerifyContext {
    digest: DigestAlgorithm,
    lifecycle: Lifecycle,
    hasher: Hasher,
    verifier: Verifier,
}

impl_destroy!(VerifyContext);

impl std::fmt::Debug for VerifyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifyContext")
            .field("digest", &self.digest)
            .field("phase", &self.lifecycle.phase())
            .finish_non_exhaustive()
    }
}

impl VerifyContext {
    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    pub fn update(&mut self, data: &[u8]) -> Result<()> {
        self.lifecycle.check_update()?;
        self.hasher.update(data);
        self.lifecycle.updated();
        Ok(())
    }

    /// RSA signature padding; must match the one used to sign.
    pub fn set_padding(&mut self, padding: Padding) -> Result<()> {
        self.lifecycle.check_finalize()?;
        match &mut self.verifier {
            Verifier::Rsa { key, padding: current } => {
                check_rsa_fit(padding, self.digest, key.size())?;
                *current = padding;
                Ok(())
            }
            _ => Err(Error::invalid("padding only applies to RSA signatures")),
        }
    }

    /// Checks `signature` against the absorbed data.
    ///
    /// # Errors
    /// `DataMismatch` for a wrong or malformed signature; the context stays
    /// open so the call may be repeated.
    pub fn finalize(&mut self, signature: &[u8]) -> Result<()> {
        self.lifecycle.check_finalize()?;
        let hashed = self.hasher.clone().finalize();
        let result = verify_hash(&self.verifier, self.digest, &hashed, signature);
        if result.is_err() {
            warn!(digest = %self.digest, "signature verification failed");
        }
        result?;
        self.lifecycle.finalized();
        Ok(())
    }
}

fn verify_hash(verifier: &Verifier, digest: DigestAlgorithm, hashed: &[u8], signature: &[u8]) -> Result<()> {
    let bad = |_| Error::mismatch("signature does not verify");
    match verifier {
        Verifier::Rsa { key, padding } => match padding {
            Padding::Pkcs1Pss => {
                with_digest!(digest, D => key.verify(Pss::new::<D>(), hashed, signature)).map_err(bad)
            }
            Padding::X931 => {
                let recovered = x931_recover(key, signature)?;
                let mut expected = hashed.to_vec();
                expected.push(x931_hash_id(digest)?);
                crate::util::memcmp(&recovered, &expected).map_err(|_| Error::mismatch("signature does not verify"))
            }
            _ => with_digest!(digest, D => key.verify(Pkcs1v15Sign::new::<D>(), hashed, signature)).map_err(bad),
        },
        Verifier::Dsa(k) => {
            let sig = dsa::Signature::try_from(signature).map_err(|_| Error::mismatch("malformed DSA signature"))?;
            k.verify_prehash(hashed, &sig).map_err(|_| Error::mismatch("signature does not verify"))
        }
        Verifier::Ec(k) => k.verify_prehash(hashed, signature),
    }
}

fn check_asymmetric_digest(key_type: KeyType, digest: DigestAlgorithm) -> Result<()> {
    if digest == DigestAlgorithm::Md5 && !matches!(key_type, KeyType::RsaPrivate | KeyType::RsaPublic) {
        return Err(Error::invalid(format!("{key_type} signatures cannot use md5")));
    }
    Ok(())
}

impl Engine {
    /// Starts an RSA, DSA or ECDSA signature over `digest`.
    pub fn sign_initialize(&self, digest: DigestAlgorithm, key: &Key) -> Result<SignContext> {
        check_asymmetric_digest(key.key_type(), digest)?;
        let signer = match key.material() {
            KeyMaterial::RsaPrivate(k) => {
                check_rsa_fit(Padding::Pkcs1, digest, k.size())?;
                Signer::Rsa { key: k.clone(), padding: Padding::Pkcs1 }
            }
            KeyMaterial::DsaPrivate(k) => Signer::Dsa(k.clone()),
            KeyMaterial::EcPrivate(k) => Signer::Ec(k.clone()),
            _ => return Err(Error::invalid(format!("cannot sign with a {} key", key.key_type()))),
        };
        debug!(key_type = %key.key_type(), %digest, bit_length = key.bit_length(), "sign context created");
        Ok(SignContext {
            digest: Some(digest),
            lifecycle: Lifecycle::new(),
            state: SignState::Asymmetric { hasher: Hasher::new(digest), signer },
        })
    }

    /// Starts an HMAC over `digest` keyed by a Symmetric or Des key.
    pub fn sign_initialize_hmac(&self, digest: DigestAlgorithm, key: &Key) -> Result<SignContext> {
        if !matches!(key.key_type(), KeyType::Symmetric | KeyType::Des) {
            return Err(Error::invalid(format!("HMAC needs a symmetric key, got {}", key.key_type())));
        }
        let k = key.secret_bytes()?;
        let state = with_digest!(digest, D => mac::<Hmac<D>>(k))?;
        debug!(%digest, bit_length = key.bit_length(), "HMAC context created");
        Ok(SignContext {
            digest: Some(digest),
            lifecycle: Lifecycle::new(),
            state: SignState::Mac { state, tag_len: digest.output_len() },
        })
    }

    /// Starts a CMAC over a block cipher.
    pub fn sign_initialize_cmac(&self, algorithm: EncryptAlgorithm, key: &Key) -> Result<SignContext> {
        check_key_type(algorithm, key)?;
        check_key_bits(algorithm, key.bit_length())?;
        let k = key.secret_bytes()?;
        let state = match (algorithm, k.len()) {
            (EncryptAlgorithm::Aes, 16) => mac::<Cmac<aes::Aes128>>(k)?,
            (EncryptAlgorithm::Aes, 24) => mac::<Cmac<aes::Aes192>>(k)?,
            (EncryptAlgorithm::Aes, _) => mac::<Cmac<aes::Aes256>>(k)?,
            (EncryptAlgorithm::UnsafeDes, _) => mac::<Cmac<des::Des>>(k)?,
            (EncryptAlgorithm::UnsafeTripleDes2Tdea, _) => mac::<Cmac<des::TdesEde2>>(k)?,
            (EncryptAlgorithm::TripleDes3Tdea, _) => mac::<Cmac<des::TdesEde3>>(k)?,
            (EncryptAlgorithm::Cast5, _) => mac::<Cmac<cast5::Cast5>>(k)?,
            (other, _) => return Err(Error::invalid(format!("CMAC is not defined over {other}"))),
        };
        let tag_len = algorithm.block_size().unwrap_or(16);
        debug!(%algorithm, bit_length = key.bit_length(), "CMAC context created");
        Ok(SignContext { digest: None, lifecycle: Lifecycle::new(), state: SignState::Mac { state, tag_len } })
    }

    /// Starts verification of an RSA, DSA or ECDSA signature over `digest`.
    pub fn verify_initialize(&self, digest: DigestAlgorithm, key: &Key) -> Result<VerifyContext> {
        check_asymmetric_digest(key.key_type(), digest)?;
        let verifier = match key.material() {
            KeyMaterial::RsaPublic(k) => {
                check_rsa_fit(Padding::Pkcs1, digest, k.size())?;
                Verifier::Rsa { key: k.clone(), padding: Padding::Pkcs1 }
            }
            KeyMaterial::DsaPublic(k) => Verifier::Dsa(k.clone()),
            KeyMaterial::EcPublic(k) => Verifier::Ec(k.clone()),
            _ => return Err(Error::invalid(format!("cannot verify with a {} key", key.key_type()))),
        };
        debug!(key_type = %key.key_type(), %digest, bit_length = key.bit_length(), "verify context created");
        Ok(VerifyContext { digest, lifecycle: Lifecycle::new(), hasher: Hasher::new(digest), verifier })
    }
}
