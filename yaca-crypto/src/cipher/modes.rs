#![forbid(unsafe_code)]

//! Confidentiality-only chaining modes driven over a [`BlockCipher`].

use super::Direction;
use crate::error::{Error, Result};
use crate::provider::BlockCipher;
use crate::util;

fn xor_in_place(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}

/// ECB and CBC with optional PKCS#7 padding.
pub(crate) struct BlockChain {
    cipher: Box<dyn BlockCipher>,
    direction: Direction,
    /// Previous ciphertext block (CBC); `None` selects ECB.
    chain: Option<Vec<u8>>,
    pad: bool,
    pending: Vec<u8>,
}

impl BlockChain {
    pub(crate) fn new(cipher: Box<dyn BlockCipher>, direction: Direction, iv: Option<&[u8]>) -> Self {
        Self { cipher, direction, chain: iv.map(<[u8]>::to_vec), pad: true, pending: Vec::new() }
    }

    pub(crate) fn padded(&self) -> bool {
        self.pad
    }

    pub(crate) fn set_padding(&mut self, pad: bool) {
        self.pad = pad;
    }

    fn bs(&self) -> usize {
        self.cipher.block_size()
    }

    /// Bytes emitted by an update of `input_len` bytes.
    pub(crate) fn update_len(&self, input_len: usize) -> Result<usize> {
        let bs = self.bs();
        let total = self
            .pending
            .len()
            .checked_add(input_len)
            .ok_or_else(|| Error::invalid("input length overflows"))?;
        Ok(match self.direction {
            // the last full block may carry padding and is held back
            Direction::Decrypt if self.pad => total.saturating_sub(1) / bs * bs,
            _ => total / bs * bs,
        })
    }

    /// Upper bound of the bytes emitted by finalize.
    pub(crate) fn finalize_len(&self) -> usize {
        if self.pad {
            self.bs()
        } else {
            0
        }
    }

    fn process(&self, chain: &mut Option<Vec<u8>>, block: &mut [u8]) {
        match (self.direction, chain.as_mut()) {
            (Direction::Encrypt, Some(prev)) => {
                xor_in_place(block, prev);
                self.cipher.encrypt_block(block);
                prev.copy_from_slice(block);
            }
            (Direction::Decrypt, Some(prev)) => {
                let saved = block.to_vec();
                self.cipher.decrypt_block(block);
                xor_in_place(block, prev);
                prev.copy_from_slice(&saved);
            }
            (Direction::Encrypt, None) => self.cipher.encrypt_block(block),
            (Direction::Decrypt, None) => self.cipher.decrypt_block(block),
        }
    }

    pub(crate) fn update(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let out_len = self.update_len(input.len())?;
        let mut out = util::alloc(out_len)?;
        let mut pending = util::alloc(self.pending.len() + input.len())?;
        pending.extend_from_slice(&self.pending);
        pending.extend_from_slice(input);

        let mut chain = self.chain.clone();
        let bs = self.bs();
        for block in pending[..out_len].chunks(bs) {
            let start = out.len();
            out.extend_from_slice(block);
            self.process(&mut chain, &mut out[start..]);
        }
        self.chain = chain;
        self.pending = pending.split_off(out_len);
        Ok(out)
    }

    pub(crate) fn finalize(&mut self) -> Result<Vec<u8>> {
        let bs = self.bs();
        let mut chain = self.chain.clone();
        let out = match (self.direction, self.pad) {
            (Direction::Encrypt, true) => {
                let fill = bs - self.pending.len();
                let mut block = self.pending.clone();
                block.resize(bs, fill as u8);
                self.process(&mut chain, &mut block);
                block
            }
            (Direction::Decrypt, true) => {
                if self.pending.len() != bs {
                    return Err(Error::invalid("ciphertext is not a whole number of blocks"));
                }
                let mut block = self.pending.clone();
                self.process(&mut chain, &mut block);
                let fill = strip_pkcs7(&block, bs)?;
                block.truncate(bs - fill);
                block
            }
            (_, false) => {
                if !self.pending.is_empty() {
                    return Err(Error::invalid("input is not a multiple of the block size"));
                }
                Vec::new()
            }
        };
        self.chain = chain;
        self.pending.clear();
        Ok(out)
    }
}

/// Validates PKCS#7 padding without early exit; returns the pad length.
fn strip_pkcs7(block: &[u8], bs: usize) -> Result<usize> {
    let fill = block[bs - 1] as usize;
    let mut bad = u8::from(fill == 0 || fill > bs);
    for (i, &b) in block.iter().enumerate() {
        let in_pad = i + fill >= bs;
        bad |= u8::from(in_pad && b as usize != fill);
    }
    if bad != 0 {
        return Err(Error::mismatch("bad padding"));
    }
    Ok(fill)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FeedbackKind {
    /// Full-block cipher feedback.
    Cfb,
    Cfb8,
    Cfb1,
    Ofb,
    /// Big-endian counter over the whole block.
    Ctr,
}

/// Length-preserving modes: CFB variants, OFB and CTR.
pub(crate) struct Feedback {
    cipher: Box<dyn BlockCipher>,
    direction: Direction,
    kind: FeedbackKind,
    register: Vec<u8>,
    keystream: Vec<u8>,
    used: usize,
}

impl Feedback {
    pub(crate) fn new(cipher: Box<dyn BlockCipher>, direction: Direction, kind: FeedbackKind, iv: &[u8]) -> Self {
        let bs = cipher.block_size();
        Self { cipher, direction, kind, register: iv.to_vec(), keystream: vec![0; bs], used: bs }
    }

    pub(crate) fn update(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = util::alloc(input.len())?;
        out.extend_from_slice(input);
        match self.kind {
            FeedbackKind::Ofb | FeedbackKind::Ctr | FeedbackKind::Cfb => {
                for byte in out.iter_mut() {
                    if self.used == self.keystream.len() {
                        self.refill();
                    }
                    let incoming = *byte;
                    *byte ^= self.keystream[self.used];
                    if self.kind == FeedbackKind::Cfb {
                        self.register[self.used] = match self.direction {
                            Direction::Encrypt => *byte,
                            Direction::Decrypt => incoming,
                        };
                    }
                    self.used += 1;
                }
            }
            FeedbackKind::Cfb8 => {
                for byte in out.iter_mut() {
                    let incoming = *byte;
                    *byte ^= self.encrypt_register()[0];
                    let feed = match self.direction {
                        Direction::Encrypt => *byte,
                        Direction::Decrypt => incoming,
                    };
                    self.register.rotate_left(1);
                    if let Some(last) = self.register.last_mut() {
                        *last = feed;
                    }
                }
            }
            FeedbackKind::Cfb1 => {
                for byte in out.iter_mut() {
                    let incoming = *byte;
                    let mut result = 0u8;
                    for shift in (0..8).rev() {
                        let in_bit = (incoming >> shift) & 1;
                        let out_bit = in_bit ^ (self.encrypt_register()[0] >> 7);
                        let feed = match self.direction {
                            Direction::Encrypt => out_bit,
                            Direction::Decrypt => in_bit,
                        };
                        self.shift_in_bit(feed);
                        result |= out_bit << shift;
                    }
                    *byte = result;
                }
            }
        }
        Ok(out)
    }

    fn encrypt_register(&self) -> Vec<u8> {
        let mut block = self.register.clone();
        self.cipher.encrypt_block(&mut block);
        block
    }

    fn refill(&mut self) {
        self.keystream.copy_from_slice(&self.register);
        self.cipher.encrypt_block(&mut self.keystream);
        match self.kind {
            FeedbackKind::Ofb => self.register.copy_from_slice(&self.keystream),
            FeedbackKind::Ctr => increment_be(&mut self.register),
            _ => {}
        }
        self.used = 0;
    }

    fn shift_in_bit(&mut self, bit: u8) {
        let len = self.register.len();
        for i in 0..len {
            let carry = if i + 1 < len { self.register[i + 1] >> 7 } else { bit };
            self.register[i] = (self.register[i] << 1) | carry;
        }
    }
}

/// Increments a big-endian counter, wrapping at the block boundary.
pub(crate) fn increment_be(counter: &mut [u8]) {
    for b in counter.iter_mut().rev() {
        let (next, overflow) = b.overflowing_add(1);
        *b = next;
        if !overflow {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Provider, RustCryptoProvider};
    use crate::types::EncryptAlgorithm;
    use hex_literal::hex;

    const KEY: [u8; 16] = hex!("2b7e151628aed2a6abf7158809cf4f3c");
    const IV: [u8; 16] = hex!("000102030405060708090a0b0c0d0e0f");
    const P1: [u8; 16] = hex!("6bc1bee22e409f96e93d7e117393172a");

    fn aes() -> Box<dyn BlockCipher> {
        RustCryptoProvider.block_cipher(EncryptAlgorithm::Aes, &KEY, None).unwrap()
    }

    #[test]
    fn cbc_first_block_sp800_38a() {
        let mut enc = BlockChain::new(aes(), Direction::Encrypt, Some(&IV));
        enc.set_padding(false);
        assert_eq!(enc.update(&P1).unwrap(), hex!("7649abac8119b246cee98e9b12e9197d"));
        assert!(enc.finalize().unwrap().is_empty());
    }

    #[test]
    fn ctr_first_block_sp800_38a() {
        let mut ctr = Feedback::new(aes(), Direction::Encrypt, FeedbackKind::Ctr, &hex!("f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff"));
        assert_eq!(ctr.update(&P1).unwrap(), hex!("874d6191b620e3261bef6864990db6ce"));
    }

    #[test]
    fn cfb_and_ofb_first_block_sp800_38a() {
        for kind in [FeedbackKind::Cfb, FeedbackKind::Ofb] {
            let mut m = Feedback::new(aes(), Direction::Encrypt, kind, &IV);
            assert_eq!(m.update(&P1).unwrap(), hex!("3b3fd92eb72dad20333449f8e83cfb4a"));
        }
    }

    #[test]
    fn cfb8_sp800_38a() {
        let mut m = Feedback::new(aes(), Direction::Encrypt, FeedbackKind::Cfb8, &IV);
        assert_eq!(m.update(&hex!("6bc1")).unwrap(), hex!("3b79"));
    }

    #[test]
    fn cfb1_sp800_38a() {
        let mut m = Feedback::new(aes(), Direction::Encrypt, FeedbackKind::Cfb1, &IV);
        assert_eq!(m.update(&hex!("6bc1")).unwrap(), hex!("68b3"));
        let mut d = Feedback::new(aes(), Direction::Decrypt, FeedbackKind::Cfb1, &IV);
        assert_eq!(d.update(&hex!("68b3")).unwrap(), hex!("6bc1"));
    }

    #[test]
    fn split_updates_match_single_update() {
        for kind in [FeedbackKind::Cfb, FeedbackKind::Cfb8, FeedbackKind::Ofb, FeedbackKind::Ctr] {
            let data: Vec<u8> = (0u8..53).collect();
            let mut whole = Feedback::new(aes(), Direction::Encrypt, kind, &IV);
            let expected = whole.update(&data).unwrap();
            let mut split = Feedback::new(aes(), Direction::Encrypt, kind, &IV);
            let mut got = split.update(&data[..7]).unwrap();
            got.extend(split.update(&data[7..40]).unwrap());
            got.extend(split.update(&data[40..]).unwrap());
            assert_eq!(got, expected, "{kind:?}");
            let mut dec = Feedback::new(aes(), Direction::Decrypt, kind, &IV);
            assert_eq!(dec.update(&got).unwrap(), data, "{kind:?}");
        }
    }

    #[test]
    fn padded_decrypt_withholds_last_block() {
        let mut enc = BlockChain::new(aes(), Direction::Encrypt, Some(&IV));
        let mut ct = enc.update(&[7u8; 32]).unwrap();
        ct.extend(enc.finalize().unwrap());
        assert_eq!(ct.len(), 48);

        let mut dec = BlockChain::new(aes(), Direction::Decrypt, Some(&IV));
        assert_eq!(dec.update_len(48).unwrap(), 32);
        let mut pt = dec.update(&ct).unwrap();
        assert_eq!(pt.len(), 32);
        pt.extend(dec.finalize().unwrap());
        assert_eq!(pt, vec![7u8; 32]);
    }

    #[test]
    fn corrupted_padding_is_a_mismatch() {
        // a block whose plaintext ends in 0x00 can never carry valid padding
        let mut raw = BlockChain::new(aes(), Direction::Encrypt, None);
        raw.set_padding(false);
        let ct = raw.update(&[0u8; 16]).unwrap();

        let mut dec = BlockChain::new(aes(), Direction::Decrypt, None);
        assert!(dec.update(&ct).unwrap().is_empty());
        assert!(matches!(dec.finalize(), Err(Error::DataMismatch(_))));
    }

    #[test]
    fn unpadded_partial_block_is_rejected() {
        let mut enc = BlockChain::new(aes(), Direction::Encrypt, Some(&IV));
        enc.set_padding(false);
        assert!(enc.update(&[1u8; 20]).unwrap().len() == 16);
        assert!(matches!(enc.finalize(), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn counter_wraps() {
        let mut c = [0xff; 4];
        increment_be(&mut c);
        assert_eq!(c, [0; 4]);
        let mut c = [0, 0xff];
        increment_be(&mut c);
        assert_eq!(c, [1, 0]);
    }
}
