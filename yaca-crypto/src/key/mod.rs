#![forbid(unsafe_code)]

//! Key store: the key data model plus generation, extraction, import/export
//! and derivation.

pub(crate) mod codec;
pub(crate) mod derive;
pub(crate) mod dh;
pub(crate) mod ec;
mod legacy_pem;

pub use derive::{derive_kdf, derive_pbkdf2};

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::types::{EcCurve, KeyBitLength, KeyType};
use crate::util::{self, impl_destroy};
use dh::{DhGroup, DhPrivateKey, DhPublicKey};
use ec::{EcPublicKey, EcSecretKey};
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;
use tracing::info;
use zeroize::Zeroizing;

pub(crate) enum KeyMaterial {
    Simple { key_type: KeyType, bytes: Zeroizing<Vec<u8>> },
    RsaPublic(RsaPublicKey),
    RsaPrivate(RsaPrivateKey),
    DsaPublic(dsa::VerifyingKey),
    DsaPrivate(dsa::SigningKey),
    DsaParams(dsa::Components),
    DhPublic(DhPublicKey),
    DhPrivate(DhPrivateKey),
    DhParams(DhGroup),
    EcPublic(EcPublicKey),
    EcPrivate(EcSecretKey),
    EcParams(EcCurve),
}

/// An owned key handle. Material is zeroized when the handle is dropped.
///
/// The type is fixed at creation and the bit length always follows from the
/// material.
pub struct Key {
    material: KeyMaterial,
}

impl_destroy!(Key);

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("key_type", &self.key_type())
            .field("bit_length", &self.bit_length())
            .finish_non_exhaustive()
    }
}

fn set_odd_parity(bytes: &mut [u8]) {
    for b in bytes {
        let upper = (*b >> 1).count_ones() as u8;
        *b = (*b & 0xFE) | ((upper + 1) & 1);
    }
}

/// Maps a DSA length onto the FIPS 186 sizes the provider can generate.
#[allow(deprecated)]
fn dsa_key_size(bits: u32) -> Result<dsa::KeySize> {
    if bits < 512 || bits % 64 != 0 {
        return Err(Error::invalid("DSA keys must be at least 512 bits, a multiple of 64"));
    }
    match bits {
        1024 => Ok(dsa::KeySize::DSA_1024_160),
        2048 => Ok(dsa::KeySize::DSA_2048_224),
        3072 => Ok(dsa::KeySize::DSA_3072_256),
        other => Err(Error::invalid(format!(
            "the provider only generates 1024, 2048 or 3072-bit DSA groups, not {other}"
        ))),
    }
}

impl Key {
    pub(crate) fn from_material(material: KeyMaterial) -> Self {
        Self { material }
    }

    pub(crate) fn material(&self) -> &KeyMaterial {
        &self.material
    }

    /// Wraps raw bytes as a Symmetric, Des or Iv key.
    pub fn from_bytes(key_type: KeyType, bytes: &[u8]) -> Result<Self> {
        match key_type {
            KeyType::Symmetric | KeyType::Iv if !bytes.is_empty() => {}
            KeyType::Des if matches!(bytes.len(), 8 | 16 | 24) => {}
            KeyType::Des => return Err(Error::invalid("DES keys are 64, 128 or 192 bits")),
            other if other.is_simple() => return Err(Error::invalid("empty key")),
            other => return Err(Error::invalid(format!("{other} keys are not raw byte strings"))),
        }
        let mut buf = Zeroizing::new(util::alloc(bytes.len())?);
        buf.extend_from_slice(bytes);
        Ok(Self::from_material(KeyMaterial::Simple { key_type, bytes: buf }))
    }

    pub fn key_type(&self) -> KeyType {
        match &self.material {
            KeyMaterial::Simple { key_type, .. } => *key_type,
            KeyMaterial::RsaPublic(_) => KeyType::RsaPublic,
            KeyMaterial::RsaPrivate(_) => KeyType::RsaPrivate,
            KeyMaterial::DsaPublic(_) => KeyType::DsaPublic,
            KeyMaterial::DsaPrivate(_) => KeyType::DsaPrivate,
            KeyMaterial::DsaParams(_) => KeyType::DsaParams,
            KeyMaterial::DhPublic(_) => KeyType::DhPublic,
            KeyMaterial::DhPrivate(_) => KeyType::DhPrivate,
            KeyMaterial::DhParams(_) => KeyType::DhParams,
            KeyMaterial::EcPublic(_) => KeyType::EcPublic,
            KeyMaterial::EcPrivate(_) => KeyType::EcPrivate,
            KeyMaterial::EcParams(_) => KeyType::EcParams,
        }
    }

    /// Length in bits: bytes × 8, modulus or prime size, or curve size.
    pub fn bit_length(&self) -> u32 {
        let bits = match &self.material {
            KeyMaterial::Simple { bytes, .. } => bytes.len() * 8,
            KeyMaterial::RsaPublic(k) => k.n().bits(),
            KeyMaterial::RsaPrivate(k) => k.n().bits(),
            KeyMaterial::DsaPublic(k) => k.components().p().bits(),
            KeyMaterial::DsaPrivate(k) => k.verifying_key().components().p().bits(),
            KeyMaterial::DsaParams(c) => c.p().bits(),
            KeyMaterial::DhPublic(k) => return k.group().bits(),
            KeyMaterial::DhPrivate(k) => return k.group().bits(),
            KeyMaterial::DhParams(g) => return g.bits(),
            KeyMaterial::EcPublic(_) | KeyMaterial::EcPrivate(_) | KeyMaterial::EcParams(_) => {
                return self.curve().map_or(0, EcCurve::bits);
            }
        };
        u32::try_from(bits).unwrap_or(u32::MAX)
    }

    /// Curve of an EC key.
    pub fn curve(&self) -> Option<EcCurve> {
        match &self.material {
            KeyMaterial::EcPublic(k) => Some(k.curve()),
            KeyMaterial::EcPrivate(k) => Some(k.curve()),
            KeyMaterial::EcParams(c) => Some(*c),
            _ => None,
        }
    }

    /// Raw bytes of a Symmetric, Des or Iv key.
    pub fn secret_bytes(&self) -> Result<&[u8]> {
        match &self.material {
            KeyMaterial::Simple { bytes, .. } => Ok(bytes.as_slice()),
            _ => Err(Error::invalid(format!("{} keys have no raw byte form", self.key_type()))),
        }
    }

    /// Public half of a private key.
    pub fn extract_public(&self) -> Result<Key> {
        let material = match &self.material {
            KeyMaterial::RsaPrivate(k) => KeyMaterial::RsaPublic(k.to_public_key()),
            KeyMaterial::DsaPrivate(k) => KeyMaterial::DsaPublic(k.verifying_key().clone()),
            KeyMaterial::DhPrivate(k) => KeyMaterial::DhPublic(k.public_key()),
            KeyMaterial::EcPrivate(k) => KeyMaterial::EcPublic(k.public_key()),
            _ => return Err(Error::invalid(format!("cannot extract a public key from a {} key", self.key_type()))),
        };
        Ok(Key::from_material(material))
    }

    /// Domain parameters of a DSA, DH or EC key.
    pub fn extract_parameters(&self) -> Result<Key> {
        let material = match &self.material {
            KeyMaterial::DsaPublic(k) => KeyMaterial::DsaParams(k.components().clone()),
            KeyMaterial::DsaPrivate(k) => KeyMaterial::DsaParams(k.verifying_key().components().clone()),
            KeyMaterial::DhPublic(k) => KeyMaterial::DhParams(k.group().clone()),
            KeyMaterial::DhPrivate(k) => KeyMaterial::DhParams(k.group().clone()),
            KeyMaterial::EcPublic(k) => KeyMaterial::EcParams(k.curve()),
            KeyMaterial::EcPrivate(k) => KeyMaterial::EcParams(k.curve()),
            _ => return Err(Error::invalid(format!("{} keys carry no parameters", self.key_type()))),
        };
        Ok(Key::from_material(material))
    }

    /// Raw shared secret between this private key and a peer's public key.
    pub fn derive_dh(&self, peer: &Key) -> Result<Key> {
        let secret = match (&self.material, &peer.material) {
            (KeyMaterial::DhPrivate(k), KeyMaterial::DhPublic(p)) => k.shared_secret(p)?,
            (KeyMaterial::EcPrivate(k), KeyMaterial::EcPublic(p)) => k.diffie_hellman(p)?,
            _ => {
                return Err(Error::invalid(format!(
                    "cannot agree between a {} key and a {} key",
                    self.key_type(),
                    peer.key_type()
                )))
            }
        };
        Ok(Key::from_material(KeyMaterial::Simple { key_type: KeyType::Symmetric, bytes: secret }))
    }
}

impl Engine {
    /// Generates a fresh key of `key_type`.
    pub fn generate_key(&self, key_type: KeyType, length: KeyBitLength) -> Result<Key> {
        let material = match (key_type, length) {
            (KeyType::Symmetric | KeyType::Iv, KeyBitLength::Bits(bits)) => {
                if bits == 0 || bits % 8 != 0 {
                    return Err(Error::invalid("key length must be a positive multiple of 8"));
                }
                let bytes = Zeroizing::new(self.random_bytes(bits as usize / 8)?);
                KeyMaterial::Simple { key_type, bytes }
            }
            (KeyType::Des, KeyBitLength::Bits(bits @ (64 | 128 | 192))) => {
                let mut bytes = Zeroizing::new(self.random_bytes(bits as usize / 8)?);
                set_odd_parity(&mut bytes);
                KeyMaterial::Simple { key_type, bytes }
            }
            (KeyType::RsaPrivate, KeyBitLength::Bits(bits)) => {
                if bits < 512 || bits % 8 != 0 {
                    return Err(Error::invalid("RSA keys must be at least 512 bits, a multiple of 8"));
                }
                let key = RsaPrivateKey::new(&mut OsRng, bits as usize)
                    .map_err(|e| Error::internal(format!("rsa: {e}")))?;
                KeyMaterial::RsaPrivate(key)
            }
            (KeyType::DsaPrivate, KeyBitLength::Bits(bits)) => {
                let components = dsa::Components::generate(&mut OsRng, dsa_key_size(bits)?);
                KeyMaterial::DsaPrivate(dsa::SigningKey::generate(&mut OsRng, components))
            }
            (KeyType::DsaParams, KeyBitLength::Bits(bits)) => {
                KeyMaterial::DsaParams(dsa::Components::generate(&mut OsRng, dsa_key_size(bits)?))
            }
            (KeyType::DhPrivate, KeyBitLength::Dh(len)) => {
                KeyMaterial::DhPrivate(DhGroup::generate(len)?.generate_key()?)
            }
            (KeyType::DhParams, KeyBitLength::Dh(len)) => KeyMaterial::DhParams(DhGroup::generate(len)?),
            (KeyType::EcPrivate, KeyBitLength::Ec(curve)) => KeyMaterial::EcPrivate(EcSecretKey::generate(curve)?),
            (KeyType::EcParams, KeyBitLength::Ec(curve)) => {
                ec::check_supported(curve)?;
                KeyMaterial::EcParams(curve)
            }
            (t, _) if t.is_public() => {
                return Err(Error::invalid(format!("{t} keys are extracted, not generated")));
            }
            (t, len) => return Err(Error::invalid(format!("cannot generate a {t} key of length {len}"))),
        };
        let key = Key::from_material(material);
        info!(key_type = %key.key_type(), bit_length = key.bit_length(), "key generated");
        Ok(key)
    }

    /// Generates a private key on the domain parameters held by `params`.
    pub fn generate_key_from_parameters(&self, params: &Key) -> Result<Key> {
        let material = match params.material() {
            KeyMaterial::DsaParams(c) => KeyMaterial::DsaPrivate(dsa::SigningKey::generate(&mut OsRng, c.clone())),
            KeyMaterial::DhParams(g) => KeyMaterial::DhPrivate(g.generate_key()?),
            KeyMaterial::EcParams(curve) => KeyMaterial::EcPrivate(EcSecretKey::generate(*curve)?),
            _ => return Err(Error::invalid(format!("{} keys are not parameters", params.key_type()))),
        };
        Ok(Key::from_material(material))
    }
}
