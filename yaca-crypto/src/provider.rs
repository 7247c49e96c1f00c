#![forbid(unsafe_code)]

//! Primitive provider seam.
//!
//! The engine drives every chaining mode itself and only asks the provider for
//! keyed single-block permutations, keystreams and randomness. The default
//! [`RustCryptoProvider`] is backed by the RustCrypto cipher crates.

use crate::error::{Error, Result};
use crate::types::EncryptAlgorithm;
use cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit, StreamCipher};
use std::fmt;

/// A keyed block permutation.
pub trait BlockCipher: Send + Sync {
    /// Block size in bytes.
    fn block_size(&self) -> usize;
    /// Encrypts exactly one block in place.
    fn encrypt_block(&self, block: &mut [u8]);
    /// Decrypts exactly one block in place.
    fn decrypt_block(&self, block: &mut [u8]);
}

/// A keyed keystream generator.
pub trait KeystreamCipher: Send {
    /// XORs the next `buf.len()` keystream bytes into `buf`.
    fn apply(&mut self, buf: &mut [u8]);
}

/// Source of primitives for every context created by an engine.
pub trait Provider: Send + Sync + fmt::Debug {
    /// Fills `dst` with cryptographically secure random bytes.
    fn random_bytes(&self, dst: &mut [u8]) -> Result<()>;

    /// Keys a block cipher. `rc2_effective_bits` only applies to RC2 and
    /// defaults to the key length.
    fn block_cipher(
        &self,
        algorithm: EncryptAlgorithm,
        key: &[u8],
        rc2_effective_bits: Option<usize>,
    ) -> Result<Box<dyn BlockCipher>>;

    /// Keys a stream cipher.
    fn stream_cipher(&self, algorithm: EncryptAlgorithm, key: &[u8]) -> Result<Box<dyn KeystreamCipher>>;
}

/// Provider backed by the RustCrypto crates and the OS random source.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustCryptoProvider;

struct Keyed<C>(C);

impl<C> BlockCipher for Keyed<C>
where
    C: BlockEncrypt + BlockDecrypt + Send + Sync,
{
    fn block_size(&self) -> usize {
        C::block_size()
    }

    fn encrypt_block(&self, block: &mut [u8]) {
        self.0.encrypt_block(GenericArray::from_mut_slice(block));
    }

    fn decrypt_block(&self, block: &mut [u8]) {
        self.0.decrypt_block(GenericArray::from_mut_slice(block));
    }
}

fn keyed<C>(key: &[u8]) -> Result<Box<dyn BlockCipher>>
where
    C: KeyInit + BlockEncrypt + BlockDecrypt + Send + Sync + 'static,
{
    let cipher = C::new_from_slice(key)
        .map_err(|_| Error::invalid(format!("{}-bit key rejected by the cipher", key.len() * 8)))?;
    Ok(Box::new(Keyed(cipher)))
}

impl<N> KeystreamCipher for rc4::Rc4<N>
where
    rc4::Rc4<N>: StreamCipher + Send,
{
    fn apply(&mut self, buf: &mut [u8]) {
        StreamCipher::apply_keystream(self, buf);
    }
}

macro_rules! rc4_by_len {
    ($key:expr; $($len:literal => $size:ident),+ $(,)?) => {
        match $key.len() {
            $(
                $len => {
                    let cipher = rc4::Rc4::<cipher::consts::$size>::new_from_slice($key)
                        .map_err(|_| Error::invalid("RC4 key rejected"))?;
                    Ok(Box::new(cipher) as Box<dyn KeystreamCipher>)
                }
            )+
            other => Err(Error::invalid(format!("RC4 key of {} bits is not supported", other * 8))),
        }
    };
}

impl Provider for RustCryptoProvider {
    fn random_bytes(&self, dst: &mut [u8]) -> Result<()> {
        getrandom::getrandom(dst).map_err(|e| Error::internal(format!("rng: {e}")))
    }

    fn block_cipher(
        &self,
        algorithm: EncryptAlgorithm,
        key: &[u8],
        rc2_effective_bits: Option<usize>,
    ) -> Result<Box<dyn BlockCipher>> {
        match algorithm {
            EncryptAlgorithm::Aes => match key.len() {
                16 => keyed::<aes::Aes128>(key),
                24 => keyed::<aes::Aes192>(key),
                32 => keyed::<aes::Aes256>(key),
                n => Err(Error::invalid(format!("AES does not accept {}-bit keys", n * 8))),
            },
            EncryptAlgorithm::UnsafeDes => keyed::<des::Des>(key),
            EncryptAlgorithm::UnsafeTripleDes2Tdea => keyed::<des::TdesEde2>(key),
            EncryptAlgorithm::TripleDes3Tdea => keyed::<des::TdesEde3>(key),
            EncryptAlgorithm::Cast5 => keyed::<cast5::Cast5>(key),
            EncryptAlgorithm::UnsafeRc2 => {
                if key.is_empty() || key.len() > 128 {
                    return Err(Error::invalid("RC2 keys are 8 to 1024 bits"));
                }
                let bits = rc2_effective_bits.unwrap_or(key.len() * 8);
                if !(1..=1024).contains(&bits) {
                    return Err(Error::invalid("RC2 effective key bits must be within 1..=1024"));
                }
                Ok(Box::new(Keyed(rc2::Rc2::new_with_eff_key_len(key, bits))))
            }
            EncryptAlgorithm::UnsafeRc4 => Err(Error::invalid("RC4 is a stream cipher")),
        }
    }

    fn stream_cipher(&self, algorithm: EncryptAlgorithm, key: &[u8]) -> Result<Box<dyn KeystreamCipher>> {
        if algorithm != EncryptAlgorithm::UnsafeRc4 {
            return Err(Error::invalid(format!("{algorithm} is not a stream cipher")));
        }
        rc4_by_len!(key;
            5 => U5, 6 => U6, 7 => U7, 8 => U8, 9 => U9, 10 => U10, 11 => U11, 12 => U12,
            13 => U13, 14 => U14, 15 => U15, 16 => U16, 17 => U17, 18 => U18, 19 => U19,
            20 => U20, 21 => U21, 22 => U22, 23 => U23, 24 => U24, 25 => U25, 26 => U26,
            27 => U27, 28 => U28, 29 => U29, 30 => U30, 31 => U31, 32 => U32,
        )
    }
}
