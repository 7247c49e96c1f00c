#![forbid(unsafe_code)]

//! Key wrapping: RFC 3394 for AES and RFC 3217 for triple DES.

use super::Direction;
use crate::digest::hash;
use crate::error::{Error, Result};
use crate::provider::BlockCipher;
use crate::types::DigestAlgorithm;
use crate::util;

/// RFC 3394 default initial value.
pub(crate) const AES_WRAP_DEFAULT_IV: [u8; 8] = [0xa6; 8];
/// Fixed outer IV of the RFC 3217 construction.
const TDES_WRAP_IV2: [u8; 8] = [0x4a, 0xdd, 0xa2, 0x2c, 0x79, 0xe8, 0x21, 0x05];
/// Key sizes an AES wrapping accepts, in bytes.
const AES_WRAP_INPUTS: [usize; 3] = [16, 24, 32];
/// A 3DES wrapping operates on exactly one 192-bit key.
pub(crate) const TDES_KEY_LEN: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WrapKind {
    Aes,
    TripleDes,
}

pub(crate) struct Wrap {
    cipher: Box<dyn BlockCipher>,
    direction: Direction,
    kind: WrapKind,
    iv: Vec<u8>,
    done: bool,
}

impl Wrap {
    pub(crate) fn new(cipher: Box<dyn BlockCipher>, direction: Direction, kind: WrapKind, iv: &[u8]) -> Self {
        Self { cipher, direction, kind, iv: iv.to_vec(), done: false }
    }

    /// Output size for an update of `input_len` bytes.
    pub(crate) fn update_len(&self, input_len: usize) -> Result<usize> {
        match (self.kind, self.direction) {
            (WrapKind::Aes, Direction::Encrypt) if AES_WRAP_INPUTS.contains(&input_len) => Ok(input_len + 8),
            (WrapKind::Aes, Direction::Decrypt) if AES_WRAP_INPUTS.contains(&input_len.wrapping_sub(8)) => {
                Ok(input_len - 8)
            }
            (WrapKind::Aes, _) => Err(Error::invalid("AES wrap handles a single 128, 192 or 256-bit key")),
            (WrapKind::TripleDes, Direction::Encrypt) if input_len == TDES_KEY_LEN => Ok(TDES_KEY_LEN + 16),
            (WrapKind::TripleDes, Direction::Decrypt) if input_len == TDES_KEY_LEN + 16 => Ok(TDES_KEY_LEN),
            (WrapKind::TripleDes, _) => Err(Error::invalid("3DES wrap handles a single 192-bit key")),
        }
    }

    pub(crate) fn update(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        if self.done {
            return Err(Error::invalid("wrap mode accepts a single update"));
        }
        self.update_len(input.len())?;
        let out = match (self.kind, self.direction) {
            (WrapKind::Aes, Direction::Encrypt) => aes_wrap(self.cipher.as_ref(), &self.iv, input)?,
            (WrapKind::Aes, Direction::Decrypt) => aes_unwrap(self.cipher.as_ref(), &self.iv, input)?,
            (WrapKind::TripleDes, Direction::Encrypt) => tdes_wrap(self.cipher.as_ref(), &self.iv, input)?,
            (WrapKind::TripleDes, Direction::Decrypt) => tdes_unwrap(self.cipher.as_ref(), input)?,
        };
        self.done = true;
        Ok(out)
    }
}

fn aes_wrap(cipher: &dyn BlockCipher, iv: &[u8], plain: &[u8]) -> Result<Vec<u8>> {
    let n = plain.len() / 8;
    let mut a = [0u8; 8];
    a.copy_from_slice(iv);
    let mut r = util::alloc(plain.len())?;
    r.extend_from_slice(plain);
    let mut block = [0u8; 16];
    for j in 0..6u64 {
        for (i, chunk) in r.chunks_mut(8).enumerate() {
            block[..8].copy_from_slice(&a);
            block[8..].copy_from_slice(chunk);
            cipher.encrypt_block(&mut block);
            let t = (n as u64) * j + i as u64 + 1;
            a.copy_from_slice(&block[..8]);
            for (x, y) in a.iter_mut().zip(t.to_be_bytes()) {
                *x ^= y;
            }
            chunk.copy_from_slice(&block[8..]);
        }
    }
    let mut out = util::alloc(plain.len() + 8)?;
    out.extend_from_slice(&a);
    out.extend_from_slice(&r);
    Ok(out)
}

fn aes_unwrap(cipher: &dyn BlockCipher, iv: &[u8], wrapped: &[u8]) -> Result<Vec<u8>> {
    let n = wrapped.len() / 8 - 1;
    let mut a = [0u8; 8];
    a.copy_from_slice(&wrapped[..8]);
    let mut r = util::alloc(n * 8)?;
    r.extend_from_slice(&wrapped[8..]);
    let mut block = [0u8; 16];
    for j in (0..6u64).rev() {
        for i in (0..n).rev() {
            let t = (n as u64) * j + i as u64 + 1;
            for (x, y) in a.iter_mut().zip(t.to_be_bytes()) {
                *x ^= y;
            }
            block[..8].copy_from_slice(&a);
            block[8..].copy_from_slice(&r[i * 8..i * 8 + 8]);
            cipher.decrypt_block(&mut block);
            a.copy_from_slice(&block[..8]);
            r[i * 8..i * 8 + 8].copy_from_slice(&block[8..]);
        }
    }
    util::memcmp(&a, iv).map_err(|_| Error::mismatch("unwrapped integrity check failed"))?;
    Ok(r)
}

fn cbc_encrypt(cipher: &dyn BlockCipher, iv: &[u8], data: &mut [u8]) {
    let mut prev = iv.to_vec();
    for block in data.chunks_mut(8) {
        for (b, p) in block.iter_mut().zip(&prev) {
            *b ^= p;
        }
        cipher.encrypt_block(block);
        prev.copy_from_slice(block);
    }
}

fn cbc_decrypt(cipher: &dyn BlockCipher, iv: &[u8], data: &mut [u8]) {
    let mut prev = iv.to_vec();
    for block in data.chunks_mut(8) {
        let saved = block.to_vec();
        cipher.decrypt_block(block);
        for (b, p) in block.iter_mut().zip(&prev) {
            *b ^= p;
        }
        prev = saved;
    }
}

fn tdes_wrap(cipher: &dyn BlockCipher, iv: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let icv = hash(DigestAlgorithm::Sha1, key);
    let mut temp1 = util::alloc(TDES_KEY_LEN + 8)?;
    temp1.extend_from_slice(key);
    temp1.extend_from_slice(&icv[..8]);
    cbc_encrypt(cipher, iv, &mut temp1);

    let mut temp3 = util::alloc(TDES_KEY_LEN + 16)?;
    temp3.extend_from_slice(iv);
    temp3.extend_from_slice(&temp1);
    temp3.reverse();
    cbc_encrypt(cipher, &TDES_WRAP_IV2, &mut temp3);
    Ok(temp3)
}

fn tdes_unwrap(cipher: &dyn BlockCipher, wrapped: &[u8]) -> Result<Vec<u8>> {
    let mut temp3 = wrapped.to_vec();
    cbc_decrypt(cipher, &TDES_WRAP_IV2, &mut temp3);
    temp3.reverse();
    let (iv, temp1) = temp3.split_at_mut(8);
    cbc_decrypt(cipher, iv, temp1);
    let (key, icv) = temp1.split_at(TDES_KEY_LEN);
    let expected = hash(DigestAlgorithm::Sha1, key);
    util::memcmp(icv, &expected[..8]).map_err(|_| Error::mismatch("unwrapped integrity check failed"))?;
    Ok(key.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Provider, RustCryptoProvider};
    use crate::types::EncryptAlgorithm;
    use hex_literal::hex;

    #[test]
    fn rfc3394_128_bit_kek() {
        let kek = hex!("000102030405060708090A0B0C0D0E0F");
        let data = hex!("00112233445566778899AABBCCDDEEFF");
        let cipher = || RustCryptoProvider.block_cipher(EncryptAlgorithm::Aes, &kek, None).unwrap();
        let mut w = Wrap::new(cipher(), Direction::Encrypt, WrapKind::Aes, &AES_WRAP_DEFAULT_IV);
        let wrapped = w.update(&data).unwrap();
        assert_eq!(wrapped, hex!("1FA68B0A8112B447AEF34BD8FB5A7B829D3E862371D2CFE5"));
        assert!(w.update(&data).is_err());

        let mut u = Wrap::new(cipher(), Direction::Decrypt, WrapKind::Aes, &AES_WRAP_DEFAULT_IV);
        assert_eq!(u.update(&wrapped).unwrap(), data);
    }

    #[test]
    fn aes_unwrap_detects_tampering() {
        let kek = [9u8; 32];
        let cipher = || RustCryptoProvider.block_cipher(EncryptAlgorithm::Aes, &kek, None).unwrap();
        let mut w = Wrap::new(cipher(), Direction::Encrypt, WrapKind::Aes, &AES_WRAP_DEFAULT_IV);
        let mut wrapped = w.update(&[5u8; 32]).unwrap();
        wrapped[10] ^= 1;
        let mut u = Wrap::new(cipher(), Direction::Decrypt, WrapKind::Aes, &AES_WRAP_DEFAULT_IV);
        assert!(matches!(u.update(&wrapped), Err(Error::DataMismatch(_))));
    }

    #[test]
    fn tdes_wrap_round_trip() {
        let kek = hex!("255e0d1c07b646dfb3134cc843ba8aa71f025b7c0838251f");
        let cek = hex!("2923bf85e06dd6ae529149f1f1bae9eab3a7da3d860d3e98");
        let iv = hex!("5dd4cbfc96f5453b");
        let cipher = || RustCryptoProvider.block_cipher(EncryptAlgorithm::TripleDes3Tdea, &kek, None).unwrap();
        let mut w = Wrap::new(cipher(), Direction::Encrypt, WrapKind::TripleDes, &iv);
        let wrapped = w.update(&cek).unwrap();
        assert_eq!(wrapped.len(), 40);
        let mut u = Wrap::new(cipher(), Direction::Decrypt, WrapKind::TripleDes, &iv);
        assert_eq!(u.update(&wrapped).unwrap(), cek);
    }

    #[test]
    fn wrap_length_rules() {
        let cipher = RustCryptoProvider.block_cipher(EncryptAlgorithm::Aes, &[0u8; 16], None).unwrap();
        let w = Wrap::new(cipher, Direction::Encrypt, WrapKind::Aes, &AES_WRAP_DEFAULT_IV);
        assert!(w.update_len(8).is_err());
        assert!(w.update_len(20).is_err());
        assert!(w.update_len(40).is_err());
        assert_eq!(w.update_len(24).unwrap(), 32);
    }
}
