#![forbid(unsafe_code)]

//! Envelope encryption: a fresh session key encrypts the payload and travels
//! RSA-encrypted (PKCS#1 v1.5) to the holder of the private key.

use crate::cipher::{iv_bit_length, iv_slice, CipherContext, CipherOperation};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::key::{Key, KeyMaterial};
use crate::types::{BlockCipherMode, EncryptAlgorithm, KeyBitLength, KeyType, Padding};
use tracing::{debug, warn};

/// PKCS#1 v1.5 encryption overhead in bits.
const RSA_PKCS1_OVERHEAD_BITS: u32 = 88;

/// A started envelope: the encrypting context plus what the recipient needs.
#[derive(Debug)]
pub struct Seal {
    /// Encrypts the payload; operation [`CipherOperation::Seal`].
    pub context: CipherContext,
    /// Session key encrypted under the recipient's public key.
    pub encrypted_key: Key,
    /// Plaintext IV, absent for modes without one.
    pub iv: Option<Key>,
}

fn check_envelope_mode(mode: BlockCipherMode) -> Result<()> {
    match mode {
        BlockCipherMode::Gcm | BlockCipherMode::Ccm | BlockCipherMode::Wrap => {
            Err(Error::invalid(format!("{mode} mode cannot be used in an envelope")))
        }
        _ => Ok(()),
    }
}

fn check_fits(rsa_bits: u32, sym_key_bits: u32) -> Result<()> {
    if sym_key_bits + RSA_PKCS1_OVERHEAD_BITS > rsa_bits {
        return Err(Error::invalid(format!(
            "a {sym_key_bits}-bit session key does not fit a {rsa_bits}-bit RSA key"
        )));
    }
    Ok(())
}

const fn session_key_type(algorithm: EncryptAlgorithm) -> KeyType {
    if algorithm.is_des_family() {
        KeyType::Des
    } else {
        KeyType::Symmetric
    }
}

impl Engine {
    /// Generates a session key and IV, encrypts the key for `public`, and
    /// returns a context encrypting under the session key.
    pub fn seal_initialize(
        &self,
        public: &Key,
        algorithm: EncryptAlgorithm,
        mode: BlockCipherMode,
        sym_key_bits: u32,
    ) -> Result<Seal> {
        if !matches!(public.material(), KeyMaterial::RsaPublic(_)) {
            return Err(Error::invalid(format!("sealing needs an RSA public key, got {}", public.key_type())));
        }
        check_envelope_mode(mode)?;
        let iv_bits = iv_bit_length(algorithm, mode, sym_key_bits)?;
        check_fits(public.bit_length(), sym_key_bits)?;

        let session = self.generate_key(session_key_type(algorithm), KeyBitLength::Bits(sym_key_bits))?;
        let iv = match iv_bits {
            0 => None,
            bits => Some(self.generate_key(KeyType::Iv, KeyBitLength::Bits(bits))?),
        };
        let wrapped = self.rsa_public_encrypt(Padding::Pkcs1, public, session.secret_bytes()?)?;
        let encrypted_key = Key::from_bytes(KeyType::Symmetric, &wrapped)?;
        let context = CipherContext::new(
            self.provider(),
            CipherOperation::Seal,
            algorithm,
            mode,
            session.secret_bytes()?,
            iv_slice(iv.as_ref())?,
        )?;
        debug!(%algorithm, %mode, sym_key_bits, rsa_bits = public.bit_length(), "envelope sealed");
        Ok(Seal { context, encrypted_key, iv })
    }

    /// Recovers the session key with `private` and returns a context decrypting
    /// under it.
    ///
    /// # Errors
    /// `DataMismatch` when the encrypted key does not decrypt under `private`;
    /// `InvalidParameter` when the recovered key or the IV has the wrong length.
    pub fn open_initialize(
        &self,
        private: &Key,
        algorithm: EncryptAlgorithm,
        mode: BlockCipherMode,
        sym_key_bits: u32,
        encrypted_key: &Key,
        iv: Option<&Key>,
    ) -> Result<CipherContext> {
        if !matches!(private.material(), KeyMaterial::RsaPrivate(_)) {
            return Err(Error::invalid(format!("opening needs an RSA private key, got {}", private.key_type())));
        }
        check_envelope_mode(mode)?;
        iv_bit_length(algorithm, mode, sym_key_bits)?;
        check_fits(private.bit_length(), sym_key_bits)?;

        let session = self
            .rsa_private_decrypt(Padding::Pkcs1, private, encrypted_key.secret_bytes()?)
            .map_err(|e| {
                warn!(%algorithm, %mode, "envelope key did not decrypt");
                e
            })?;
        let session = zeroize::Zeroizing::new(session);
        if session.len() * 8 != sym_key_bits as usize {
            return Err(Error::invalid(format!(
                "recovered a {}-bit session key, expected {sym_key_bits}",
                session.len() * 8
            )));
        }
        let context = CipherContext::new(self.provider(), CipherOperation::Open, algorithm, mode, &session, iv_slice(iv)?)?;
        debug!(%algorithm, %mode, sym_key_bits, "envelope opened");
        Ok(context)
    }
}
