#![forbid(unsafe_code)]

//! Streaming GCM and single-shot CCM over a 128-bit [`BlockCipher`].

use super::Direction;
use crate::error::{Error, Result};
use crate::provider::BlockCipher;
use crate::util;
use ghash::universal_hash::{KeyInit, UniversalHash};
use ghash::GHash;

const BLOCK: usize = 16;

/// Tag lengths GCM accepts, in bytes.
pub(crate) const GCM_TAG_LENGTHS: [usize; 7] = [4, 8, 12, 13, 14, 15, 16];
/// Tag lengths CCM accepts, in bytes.
pub(crate) const CCM_TAG_LENGTHS: [usize; 7] = [4, 6, 8, 10, 12, 14, 16];

fn inc32(block: &mut [u8; BLOCK]) {
    let mut ctr = [0u8; 4];
    ctr.copy_from_slice(&block[12..]);
    block[12..].copy_from_slice(&u32::from_be_bytes(ctr).wrapping_add(1).to_be_bytes());
}

fn length_block(a: u64, b: u64) -> ghash::Block {
    let mut block = ghash::Block::default();
    block[..8].copy_from_slice(&a.to_be_bytes());
    block[8..].copy_from_slice(&b.to_be_bytes());
    block
}

pub(crate) struct Gcm {
    cipher: Box<dyn BlockCipher>,
    direction: Direction,
    ghash: GHash,
    j0: [u8; BLOCK],
    counter: [u8; BLOCK],
    keystream: [u8; BLOCK],
    used: usize,
    /// Ciphertext not yet absorbed because it does not fill a block.
    partial: Vec<u8>,
    aad_len: u64,
    text_len: u64,
    aad_done: bool,
    tag_len: usize,
    tag: Option<Vec<u8>>,
}

impl Gcm {
    pub(crate) fn new(cipher: Box<dyn BlockCipher>, direction: Direction, iv: &[u8]) -> Result<Self> {
        if cipher.block_size() != BLOCK {
            return Err(Error::invalid("GCM needs a 128-bit block cipher"));
        }
        if iv.is_empty() {
            return Err(Error::invalid("GCM IV must not be empty"));
        }
        let mut h = [0u8; BLOCK];
        cipher.encrypt_block(&mut h);
        let ghash = GHash::new(ghash::Key::from_slice(&h));

        let mut j0 = [0u8; BLOCK];
        if iv.len() == 12 {
            j0[..12].copy_from_slice(iv);
            j0[15] = 1;
        } else {
            let mut g = ghash.clone();
            g.update_padded(iv);
            g.update(&[length_block(0, (iv.len() as u64) * 8)]);
            j0.copy_from_slice(&g.finalize());
        }
        let mut counter = j0;
        inc32(&mut counter);

        Ok(Self {
            cipher,
            direction,
            ghash,
            j0,
            counter,
            keystream: [0; BLOCK],
            used: BLOCK,
            partial: Vec::new(),
            aad_len: 0,
            text_len: 0,
            aad_done: false,
            tag_len: BLOCK,
            tag: None,
        })
    }

    /// Additional authenticated data; accepted once, before any text.
    pub(crate) fn set_aad(&mut self, aad: &[u8]) -> Result<()> {
        if self.aad_done {
            return Err(Error::invalid("AAD was already supplied"));
        }
        self.ghash.update_padded(aad);
        self.aad_len = (aad.len() as u64) * 8;
        self.aad_done = true;
        Ok(())
    }

    pub(crate) fn set_tag_len(&mut self, len: usize) -> Result<()> {
        if self.direction != Direction::Encrypt {
            return Err(Error::invalid("tag length is chosen when encrypting"));
        }
        if !GCM_TAG_LENGTHS.contains(&len) {
            return Err(Error::invalid(format!("invalid GCM tag length {len}")));
        }
        self.tag_len = len;
        Ok(())
    }

    pub(crate) fn set_tag(&mut self, tag: &[u8]) -> Result<()> {
        if self.direction != Direction::Decrypt {
            return Err(Error::invalid("expected tag is only set when decrypting"));
        }
        if !GCM_TAG_LENGTHS.contains(&tag.len()) {
            return Err(Error::invalid(format!("invalid GCM tag length {}", tag.len())));
        }
        self.tag_len = tag.len();
        self.tag = Some(tag.to_vec());
        Ok(())
    }

    /// Tag computed by a finished encryption.
    pub(crate) fn tag(&self) -> Option<&[u8]> {
        match self.direction {
            Direction::Encrypt => self.tag.as_deref(),
            Direction::Decrypt => None,
        }
    }

    pub(crate) fn update(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = util::alloc(input.len())?;
        out.extend_from_slice(input);
        for byte in out.iter_mut() {
            if self.used == BLOCK {
                self.keystream = self.counter;
                self.cipher.encrypt_block(&mut self.keystream);
                inc32(&mut self.counter);
                self.used = 0;
            }
            *byte ^= self.keystream[self.used];
            self.used += 1;
        }
        let ciphertext = match self.direction {
            Direction::Encrypt => &out[..],
            Direction::Decrypt => input,
        };
        self.absorb(ciphertext);
        self.text_len += (input.len() as u64) * 8;
        self.aad_done = true;
        Ok(out)
    }

    fn absorb(&mut self, data: &[u8]) {
        self.partial.extend_from_slice(data);
        let whole = self.partial.len() / BLOCK * BLOCK;
        if whole > 0 {
            let blocks: Vec<ghash::Block> =
                self.partial[..whole].chunks(BLOCK).map(ghash::Block::clone_from_slice).collect();
            self.ghash.update(&blocks);
            self.partial.drain(..whole);
        }
    }

    /// Computes (encrypt) or checks (decrypt) the tag; no further output.
    pub(crate) fn finalize(&mut self) -> Result<Vec<u8>> {
        let mut g = self.ghash.clone();
        g.update_padded(&self.partial);
        g.update(&[length_block(self.aad_len, self.text_len)]);
        let mut full = [0u8; BLOCK];
        full.copy_from_slice(&g.finalize());
        let mut mask = self.j0;
        self.cipher.encrypt_block(&mut mask);
        for (t, m) in full.iter_mut().zip(mask) {
            *t ^= m;
        }

        match self.direction {
            Direction::Encrypt => self.tag = Some(full[..self.tag_len].to_vec()),
            Direction::Decrypt => {
                let expected = self
                    .tag
                    .as_deref()
                    .ok_or_else(|| Error::invalid("expected tag must be set before finalize"))?;
                util::memcmp(expected, &full[..expected.len()])
                    .map_err(|_| Error::mismatch("GCM tag verification failed"))?;
            }
        }
        Ok(Vec::new())
    }
}

/// CCM processes the whole message in a single update.
pub(crate) struct Ccm {
    cipher: Box<dyn BlockCipher>,
    direction: Direction,
    nonce: Vec<u8>,
    tag_len: usize,
    total_len: Option<usize>,
    aad: Option<Vec<u8>>,
    tag: Option<Vec<u8>>,
    done: bool,
}

impl Ccm {
    pub(crate) fn new(cipher: Box<dyn BlockCipher>, direction: Direction, nonce: &[u8]) -> Result<Self> {
        if cipher.block_size() != BLOCK {
            return Err(Error::invalid("CCM needs a 128-bit block cipher"));
        }
        if !(7..=13).contains(&nonce.len()) {
            return Err(Error::invalid("CCM nonce must be 7 to 13 bytes"));
        }
        Ok(Self {
            cipher,
            direction,
            nonce: nonce.to_vec(),
            tag_len: 12,
            total_len: None,
            aad: None,
            tag: None,
            done: false,
        })
    }

    fn length_field(&self) -> usize {
        15 - self.nonce.len()
    }

    fn check_fits(&self, len: usize) -> Result<()> {
        let q = self.length_field();
        if q < 8 && (len as u128) >> (8 * q) != 0 {
            return Err(Error::invalid("message too long for the CCM nonce size"));
        }
        Ok(())
    }

    pub(crate) fn set_total_length(&mut self, len: usize) -> Result<()> {
        self.check_fits(len)?;
        self.total_len = Some(len);
        Ok(())
    }

    pub(crate) fn set_aad(&mut self, aad: &[u8]) -> Result<()> {
        if self.total_len.is_none() {
            return Err(Error::invalid("CCM total length must be set before AAD"));
        }
        if self.aad.is_some() {
            return Err(Error::invalid("AAD was already supplied"));
        }
        self.aad = Some(aad.to_vec());
        Ok(())
    }

    pub(crate) fn set_tag_len(&mut self, len: usize) -> Result<()> {
        if self.direction != Direction::Encrypt {
            return Err(Error::invalid("tag length is chosen when encrypting"));
        }
        if !CCM_TAG_LENGTHS.contains(&len) {
            return Err(Error::invalid(format!("invalid CCM tag length {len}")));
        }
        self.tag_len = len;
        Ok(())
    }

    pub(crate) fn set_tag(&mut self, tag: &[u8]) -> Result<()> {
        if self.direction != Direction::Decrypt {
            return Err(Error::invalid("expected tag is only set when decrypting"));
        }
        if !CCM_TAG_LENGTHS.contains(&tag.len()) {
            return Err(Error::invalid(format!("invalid CCM tag length {}", tag.len())));
        }
        self.tag_len = tag.len();
        self.tag = Some(tag.to_vec());
        Ok(())
    }

    pub(crate) fn tag(&self) -> Option<&[u8]> {
        match self.direction {
            Direction::Encrypt => self.tag.as_deref(),
            Direction::Decrypt => None,
        }
    }

    pub(crate) fn update(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        if self.done {
            return Err(Error::invalid("CCM accepts a single update"));
        }
        if self.direction == Direction::Decrypt && self.tag.is_none() {
            return Err(Error::invalid("expected tag must be set before decrypting"));
        }
        match self.total_len {
            Some(total) if total != input.len() => {
                return Err(Error::invalid("CCM input does not match the declared total length"));
            }
            Some(_) => {}
            None => self.check_fits(input.len())?,
        }

        let (s0, output) = self.ctr(input)?;
        let plaintext = match self.direction {
            Direction::Encrypt => input,
            Direction::Decrypt => &output[..],
        };
        let mut tag = self.cbc_mac(plaintext)?;
        tag.truncate(self.tag_len);
        for (t, s) in tag.iter_mut().zip(s0) {
            *t ^= s;
        }
        match self.direction {
            Direction::Encrypt => self.tag = Some(tag),
            Direction::Decrypt => {
                let expected = self.tag.as_deref().unwrap_or_default();
                util::memcmp(expected, &tag).map_err(|_| Error::mismatch("CCM tag verification failed"))?;
            }
        }
        self.total_len = Some(input.len());
        self.done = true;
        Ok(output)
    }

    /// An untouched context processes the empty message here.
    pub(crate) fn finalize(&mut self) -> Result<Vec<u8>> {
        if !self.done {
            return self.update(&[]);
        }
        Ok(Vec::new())
    }

    fn counter_block(&self, index: u64) -> [u8; BLOCK] {
        let q = self.length_field();
        let mut block = [0u8; BLOCK];
        block[0] = (q - 1) as u8;
        block[1..1 + self.nonce.len()].copy_from_slice(&self.nonce);
        let idx = index.to_be_bytes();
        let take = q.min(8);
        block[BLOCK - take..].copy_from_slice(&idx[8 - take..]);
        block
    }

    /// Returns the tag mask S0 and the CTR-transformed input.
    fn ctr(&self, input: &[u8]) -> Result<([u8; BLOCK], Vec<u8>)> {
        let mut s0 = self.counter_block(0);
        self.cipher.encrypt_block(&mut s0);
        let mut out = util::alloc(input.len())?;
        out.extend_from_slice(input);
        for (i, chunk) in out.chunks_mut(BLOCK).enumerate() {
            let mut ks = self.counter_block(i as u64 + 1);
            self.cipher.encrypt_block(&mut ks);
            for (b, k) in chunk.iter_mut().zip(ks) {
                *b ^= k;
            }
        }
        Ok((s0, out))
    }

    fn cbc_mac(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let q = self.length_field();
        let aad = self.aad.as_deref().unwrap_or_default();
        let mut b0 = [0u8; BLOCK];
        b0[0] = (u8::from(!aad.is_empty()) << 6) | ((((self.tag_len - 2) / 2) as u8) << 3) | (q - 1) as u8;
        b0[1..1 + self.nonce.len()].copy_from_slice(&self.nonce);
        let len = (payload.len() as u64).to_be_bytes();
        let take = q.min(8);
        b0[BLOCK - take..].copy_from_slice(&len[8 - take..]);

        let mut formatted = util::alloc(BLOCK + aad.len() + payload.len() + 3 * BLOCK)?;
        formatted.extend_from_slice(&b0);
        if !aad.is_empty() {
            if aad.len() < 0xFF00 {
                formatted.extend_from_slice(&(aad.len() as u16).to_be_bytes());
            } else {
                let len = u32::try_from(aad.len()).map_err(|_| Error::invalid("CCM AAD too long"))?;
                formatted.extend_from_slice(&[0xFF, 0xFE]);
                formatted.extend_from_slice(&len.to_be_bytes());
            }
            formatted.extend_from_slice(aad);
            formatted.resize(formatted.len().div_ceil(BLOCK) * BLOCK, 0);
        }
        formatted.extend_from_slice(payload);
        formatted.resize(formatted.len().div_ceil(BLOCK) * BLOCK, 0);

        let mut mac = [0u8; BLOCK];
        for block in formatted.chunks(BLOCK) {
            for (m, b) in mac.iter_mut().zip(block) {
                *m ^= b;
            }
            self.cipher.encrypt_block(&mut mac);
        }
        Ok(mac.to_vec())
    }
}
