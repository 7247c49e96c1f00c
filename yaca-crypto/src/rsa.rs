#![forbid(unsafe_code)]

//! Low-level RSA: padded public/private encryption and their inverses.
//!
//! OAEP and PKCS#1 v1.5 type 2 come from the `rsa` crate's schemes; the
//! remaining encodings (none, type 1, SSLv23, X9.31) are applied here on top of
//! the raw modular exponentiation exposed by `rsa::hazmat`.

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::key::{Key, KeyMaterial};
use crate::types::Padding;
use crate::util;
use num_bigint_dig::BigUint;
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use tracing::debug;
use zeroize::Zeroizing;

/// Minimum filler length of PKCS#1 v1.5 and SSLv23 encodings.
const MIN_PS_LEN: usize = 8;
const X931_TRAILER: u8 = 0xCC;

/// Largest input `padding` accepts for a `k`-byte modulus.
pub(crate) fn max_input_len(padding: Padding, k: usize) -> Result<usize> {
    let overhead = match padding {
        Padding::None => 0,
        Padding::Pkcs1 | Padding::Pkcs1Sslv23 => 11,
        Padding::Pkcs1Oaep => 42,
        Padding::X931 => 2,
        other => return Err(Error::invalid(format!("{other} padding is not an RSA encryption padding"))),
    };
    k.checked_sub(overhead).ok_or_else(|| Error::invalid("modulus too small for this padding"))
}

fn check_len(padding: Padding, k: usize, len: usize) -> Result<()> {
    let max = max_input_len(padding, k)?;
    match padding {
        Padding::None if len != k => Err(Error::invalid(format!("unpadded RSA input must be exactly {k} bytes"))),
        _ if len > max => Err(Error::invalid(format!("{len} bytes exceed the {max}-byte limit of {padding} padding"))),
        _ => Ok(()),
    }
}

fn rsa_error(e: rsa::Error) -> Error {
    Error::internal(format!("rsa: {e}"))
}

fn public_of(key: &Key) -> Result<&RsaPublicKey> {
    match key.material() {
        KeyMaterial::RsaPublic(k) => Ok(k),
        _ => Err(Error::invalid(format!("expected an RSA public key, got {}", key.key_type()))),
    }
}

fn private_of(key: &Key) -> Result<&RsaPrivateKey> {
    match key.material() {
        KeyMaterial::RsaPrivate(k) => Ok(k),
        _ => Err(Error::invalid(format!("expected an RSA private key, got {}", key.key_type()))),
    }
}

fn to_int(n: &BigUint, block: &[u8]) -> Result<BigUint> {
    let m = BigUint::from_bytes_be(block);
    if &m >= n {
        return Err(Error::invalid("input is not smaller than the modulus"));
    }
    Ok(m)
}

/// `m^e mod n` over a k-byte block.
pub(crate) fn raw_public(key: &RsaPublicKey, block: &[u8]) -> Result<Vec<u8>> {
    let m = to_int(key.n(), block)?;
    let c = rsa::hazmat::rsa_encrypt(key, &m).map_err(rsa_error)?;
    util::left_pad(&c.to_bytes_be(), key.size())
}

/// `c^d mod n` over a k-byte block, blinded and checked against the public exponent.
pub(crate) fn raw_private(key: &RsaPrivateKey, block: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let c = to_int(key.n(), block)?;
    let m = rsa::hazmat::rsa_decrypt_and_check(key, Some(&mut OsRng), &c).map_err(rsa_error)?;
    Ok(Zeroizing::new(util::left_pad(&m.to_bytes_be(), key.size())?))
}

/// `00 || bt || PS || 00 || data`, PS nonzero (type 2) or 0xFF (type 1).
fn pad_pkcs1(engine: &Engine, block_type: u8, data: &[u8], k: usize, sslv23: bool) -> Result<Zeroizing<Vec<u8>>> {
    let ps_len = k - 3 - data.len();
    let mut em = Zeroizing::new(util::zalloc(k)?);
    em[1] = block_type;
    let ps = &mut em[2..2 + ps_len];
    if block_type == 1 {
        ps.fill(0xFF);
    } else {
        engine.provider().random_bytes(ps)?;
        for b in ps.iter_mut() {
            while *b == 0 {
                let mut one = [0u8; 1];
                engine.provider().random_bytes(&mut one)?;
                *b = one[0];
            }
        }
        if sslv23 {
            ps[ps_len - MIN_PS_LEN..].fill(0x03);
        }
    }
    em[k - data.len()..].copy_from_slice(data);
    Ok(em)
}

/// Inverse of [`pad_pkcs1`]; every failure is a `DataMismatch`.
fn unpad_pkcs1(em: &[u8], block_type: u8) -> Result<Vec<u8>> {
    let bad = || Error::mismatch("RSA padding check failed");
    if em.len() < 2 + MIN_PS_LEN + 1 || em[0] != 0 || em[1] != block_type {
        return Err(bad());
    }
    let body = &em[2..];
    let sep = body.iter().position(|&b| b == 0).ok_or_else(bad)?;
    if sep < MIN_PS_LEN || (block_type == 1 && body[..sep].iter().any(|&b| b != 0xFF)) {
        return Err(bad());
    }
    Ok(body[sep + 1..].to_vec())
}

/// ANSI X9.31 encoding: `6B BB..BB BA || data || CC`, or `6A || data || CC`.
fn pad_x931(data: &[u8], k: usize) -> Result<Vec<u8>> {
    let j = k - data.len() - 1;
    let mut em = util::alloc(k)?;
    if j == 1 {
        em.push(0x6A);
    } else {
        em.push(0x6B);
        em.resize(j - 1, 0xBB);
        em.push(0xBA);
    }
    em.extend_from_slice(data);
    em.push(X931_TRAILER);
    Ok(em)
}

fn unpad_x931(em: &[u8]) -> Result<Vec<u8>> {
    let bad = || Error::mismatch("X9.31 padding check failed");
    let (&last, rest) = em.split_last().ok_or_else(bad)?;
    if last != X931_TRAILER {
        return Err(bad());
    }
    let body = match rest.first() {
        Some(0x6A) => &rest[1..],
        Some(0x6B) => {
            let fill = rest[1..].iter().take_while(|&&b| b == 0xBB).count();
            match rest.get(1 + fill) {
                Some(0xBA) => &rest[2 + fill..],
                _ => return Err(bad()),
            }
        }
        _ => return Err(bad()),
    };
    Ok(body.to_vec())
}

/// X9.31 private operation: the signature is `min(s, n - s)`.
pub(crate) fn x931_sign(key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>> {
    let k = key.size();
    check_len(Padding::X931, k, data.len())?;
    let em = pad_x931(data, k)?;
    let s = BigUint::from_bytes_be(&raw_private(key, &em)?);
    let alt = key.n() - &s;
    util::left_pad(&s.min(alt).to_bytes_be(), k)
}

/// X9.31 public operation: recovers `data` from a signature.
pub(crate) fn x931_recover(key: &RsaPublicKey, signature: &[u8]) -> Result<Vec<u8>> {
    let k = key.size();
    if signature.len() != k {
        return Err(Error::mismatch("signature length differs from the modulus length"));
    }
    let m = BigUint::from_bytes_be(&raw_public(key, signature).map_err(|_| Error::mismatch("signature out of range"))?);
    // the encoded message always ends in the nibble 0xC
    let m = if (&m % 16u32) == BigUint::from(12u32) { m } else { key.n() - &m };
    unpad_x931(&util::left_pad(&m.to_bytes_be(), k)?)
}

impl Engine {
    /// Encrypts `input` with an RSA public key.
    ///
    /// Paddings: None, Pkcs1, Pkcs1Oaep (SHA-1), Pkcs1Sslv23.
    pub fn rsa_public_encrypt(&self, padding: Padding, key: &Key, input: &[u8]) -> Result<Vec<u8>> {
        let pk = public_of(key)?;
        let k = pk.size();
        if !matches!(padding, Padding::None | Padding::Pkcs1 | Padding::Pkcs1Oaep | Padding::Pkcs1Sslv23) {
            return Err(Error::invalid(format!("{padding} padding cannot be used for public encryption")));
        }
        check_len(padding, k, input.len())?;
        let out = match padding {
            Padding::Pkcs1 => pk.encrypt(&mut OsRng, Pkcs1v15Encrypt, input).map_err(rsa_error)?,
            Padding::Pkcs1Oaep => pk.encrypt(&mut OsRng, Oaep::new::<Sha1>(), input).map_err(rsa_error)?,
            Padding::Pkcs1Sslv23 => raw_public(pk, &pad_pkcs1(self, 2, input, k, true)?)?,
            _ => raw_public(pk, input)?,
        };
        debug!(%padding, modulus_bits = k * 8, "RSA public encrypt");
        Ok(out)
    }

    /// Inverse of [`rsa_public_encrypt`](Self::rsa_public_encrypt).
    ///
    /// # Errors
    /// `DataMismatch` when the decrypted block is not correctly padded.
    pub fn rsa_private_decrypt(&self, padding: Padding, key: &Key, input: &[u8]) -> Result<Vec<u8>> {
        let sk = private_of(key)?;
        let k = sk.size();
        if input.len() != k {
            return Err(Error::invalid(format!("RSA ciphertext must be exactly {k} bytes")));
        }
        let out = match padding {
            Padding::None => raw_private(sk, input)?.to_vec(),
            Padding::Pkcs1 => sk
                .decrypt(Pkcs1v15Encrypt, input)
                .map_err(|_| Error::mismatch("PKCS#1 v1.5 decryption failed"))?,
            Padding::Pkcs1Oaep => sk
                .decrypt(Oaep::new::<Sha1>(), input)
                .map_err(|_| Error::mismatch("OAEP decryption failed"))?,
            Padding::Pkcs1Sslv23 => unpad_pkcs1(&raw_private(sk, input)?, 2)?,
            other => return Err(Error::invalid(format!("{other} padding cannot be used for private decryption"))),
        };
        debug!(%padding, modulus_bits = k * 8, "RSA private decrypt");
        Ok(out)
    }

    /// Applies the private key to `input` (signature-style). Paddings: None, Pkcs1, X931.
    pub fn rsa_private_encrypt(&self, padding: Padding, key: &Key, input: &[u8]) -> Result<Vec<u8>> {
        let sk = private_of(key)?;
        let k = sk.size();
        let out = match padding {
            Padding::None => {
                check_len(padding, k, input.len())?;
                raw_private(sk, input)?.to_vec()
            }
            Padding::Pkcs1 => {
                check_len(padding, k, input.len())?;
                raw_private(sk, &pad_pkcs1(self, 1, input, k, false)?)?.to_vec()
            }
            Padding::X931 => x931_sign(sk, input)?,
            other => return Err(Error::invalid(format!("{other} padding cannot be used for private encryption"))),
        };
        debug!(%padding, modulus_bits = k * 8, "RSA private encrypt");
        Ok(out)
    }

    /// Inverse of [`rsa_private_encrypt`](Self::rsa_private_encrypt).
    ///
    /// # Errors
    /// `DataMismatch` when the recovered block is not correctly padded.
    pub fn rsa_public_decrypt(&self, padding: Padding, key: &Key, input: &[u8]) -> Result<Vec<u8>> {
        let pk = public_of(key)?;
        let k = pk.size();
        if input.len() != k {
            return Err(Error::invalid(format!("RSA input must be exactly {k} bytes")));
        }
        let out = match padding {
            Padding::None => raw_public(pk, input)?,
            Padding::Pkcs1 => unpad_pkcs1(&raw_public(pk, input)?, 1)?,
            Padding::X931 => x931_recover(pk, input)?,
            other => return Err(Error::invalid(format!("{other} padding cannot be used for public decryption"))),
        };
        debug!(%padding, modulus_bits = k * 8, "RSA public decrypt");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KeyBitLength, KeyType};

    fn keypair(engine: &Engine) -> (Key, Key) {
        let sk = engine.generate_key(KeyType::RsaPrivate, KeyBitLength::Bits(1024)).unwrap();
        let pk = sk.extract_public().unwrap();
        (sk, pk)
    }

    #[test]
    fn encryption_paddings_round_trip() {
        let engine = Engine::default();
        let (sk, pk) = keypair(&engine);
        for padding in [Padding::Pkcs1, Padding::Pkcs1Oaep, Padding::Pkcs1Sslv23] {
            let max = max_input_len(padding, 128).unwrap();
            let msg = vec![0x5Au8; max];
            let ct = engine.rsa_public_encrypt(padding, &pk, &msg).unwrap();
            assert_eq!(ct.len(), 128);
            assert_eq!(engine.rsa_private_decrypt(padding, &sk, &ct).unwrap(), msg);
            let too_long = vec![0u8; max + 1];
            assert!(matches!(
                engine.rsa_public_encrypt(padding, &pk, &too_long),
                Err(Error::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn raw_round_trip_needs_full_block() {
        let engine = Engine::default();
        let (sk, pk) = keypair(&engine);
        let mut block = vec![0x11u8; 128];
        block[0] = 0;
        let ct = engine.rsa_public_encrypt(Padding::None, &pk, &block).unwrap();
        assert_eq!(engine.rsa_private_decrypt(Padding::None, &sk, &ct).unwrap(), block);
        assert!(engine.rsa_public_encrypt(Padding::None, &pk, &block[1..]).is_err());
    }

    #[test]
    fn signature_paddings_round_trip() {
        let engine = Engine::default();
        let (sk, pk) = keypair(&engine);
        for padding in [Padding::Pkcs1, Padding::X931] {
            let msg = b"yet another crypto api";
            let sig = engine.rsa_private_encrypt(padding, &sk, msg).unwrap();
            assert_eq!(engine.rsa_public_decrypt(padding, &pk, &sig).unwrap(), msg);
        }
        let full = vec![0x7Fu8; 126];
        let sig = engine.rsa_private_encrypt(Padding::X931, &sk, &full).unwrap();
        assert_eq!(engine.rsa_public_decrypt(Padding::X931, &pk, &sig).unwrap(), full);
        assert!(engine.rsa_private_encrypt(Padding::X931, &sk, &[0u8; 127]).is_err());
    }

    #[test]
    fn wrong_padding_is_a_mismatch() {
        let engine = Engine::default();
        let (sk, pk) = keypair(&engine);
        let ct = engine.rsa_public_encrypt(Padding::Pkcs1Oaep, &pk, b"secret").unwrap();
        let err = engine.rsa_private_decrypt(Padding::Pkcs1, &sk, &ct).unwrap_err();
        assert!(matches!(err, Error::DataMismatch(_)));

        let sig = engine.rsa_private_encrypt(Padding::Pkcs1, &sk, b"msg").unwrap();
        let err = engine.rsa_public_decrypt(Padding::X931, &pk, &sig).unwrap_err();
        assert!(matches!(err, Error::DataMismatch(_)));
    }

    #[test]
    fn key_roles_are_enforced() {
        let engine = Engine::default();
        let (sk, pk) = keypair(&engine);
        assert!(engine.rsa_public_encrypt(Padding::Pkcs1, &sk, b"x").is_err());
        assert!(engine.rsa_private_encrypt(Padding::Pkcs1, &pk, b"x").is_err());
        assert!(engine.rsa_public_encrypt(Padding::X931, &pk, b"x").is_err());
        assert!(engine.rsa_private_decrypt(Padding::X931, &sk, &[0u8; 128]).is_err());
    }

    #[test]
    fn x931_layout() {
        assert_eq!(pad_x931(&[1, 2], 4).unwrap(), [0x6A, 1, 2, 0xCC]);
        assert_eq!(pad_x931(&[1, 2], 6).unwrap(), [0x6B, 0xBB, 0xBA, 1, 2, 0xCC]);
        assert_eq!(unpad_x931(&[0x6B, 0xBB, 0xBA, 1, 2, 0xCC]).unwrap(), [1, 2]);
        assert_eq!(unpad_x931(&[0x6A, 1, 2, 0xCC]).unwrap(), [1, 2]);
        assert!(unpad_x931(&[0x6B, 0xBB, 1, 2, 0xCC]).is_err());
        assert!(unpad_x931(&[0x6A, 1, 2, 0xCD]).is_err());
    }
}
