#![forbid(unsafe_code)]

//! Symmetric encryption contexts: parameter validation, mode dispatch and the
//! update / finalize / property protocol.

pub(crate) mod aead;
pub(crate) mod modes;
pub(crate) mod wrap;

use crate::context::{Lifecycle, Phase};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::key::Key;
use crate::provider::{KeystreamCipher, Provider};
use crate::types::{BlockCipherMode, EncryptAlgorithm, KeyType, Padding};
use crate::util::{self, impl_destroy};
use aead::{Ccm, Gcm};
use modes::{BlockChain, Feedback, FeedbackKind};
use std::sync::Arc;
use tracing::debug;
use wrap::{Wrap, WrapKind};
use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Encrypt,
    Decrypt,
}

/// What a [`CipherContext`] was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherOperation {
    Encrypt,
    Decrypt,
    /// Encryption under an RSA-sealed session key.
    Seal,
    /// Decryption under a session key recovered from a seal.
    Open,
}

impl CipherOperation {
    pub(crate) const fn direction(self) -> Direction {
        match self {
            Self::Encrypt | Self::Seal => Direction::Encrypt,
            Self::Decrypt | Self::Open => Direction::Decrypt,
        }
    }
}

pub(crate) fn check_key_bits(algorithm: EncryptAlgorithm, bits: u32) -> Result<()> {
    let ok = match algorithm {
        EncryptAlgorithm::Aes => matches!(bits, 128 | 192 | 256),
        EncryptAlgorithm::UnsafeDes => bits == 64,
        EncryptAlgorithm::UnsafeTripleDes2Tdea => bits == 128,
        EncryptAlgorithm::TripleDes3Tdea => bits == 192,
        EncryptAlgorithm::UnsafeRc2 => bits % 8 == 0 && (8..=1024).contains(&bits),
        EncryptAlgorithm::UnsafeRc4 => bits % 8 == 0 && (40..=2048).contains(&bits),
        EncryptAlgorithm::Cast5 => bits % 8 == 0 && (40..=128).contains(&bits),
    };
    if ok {
        Ok(())
    } else {
        Err(Error::invalid(format!("{bits}-bit keys are not valid for {algorithm}")))
    }
}

fn check_mode(algorithm: EncryptAlgorithm, mode: BlockCipherMode) -> Result<()> {
    use BlockCipherMode as M;
    let ok = match algorithm {
        EncryptAlgorithm::Aes => !matches!(mode, M::None),
        EncryptAlgorithm::UnsafeDes => {
            matches!(mode, M::Ecb | M::Cbc | M::Cfb | M::Cfb1 | M::Cfb8 | M::Ofb)
        }
        EncryptAlgorithm::TripleDes3Tdea => {
            matches!(mode, M::Ecb | M::Cbc | M::Cfb | M::Cfb1 | M::Cfb8 | M::Ofb | M::Wrap)
        }
        EncryptAlgorithm::UnsafeTripleDes2Tdea | EncryptAlgorithm::UnsafeRc2 | EncryptAlgorithm::Cast5 => {
            matches!(mode, M::Ecb | M::Cbc | M::Cfb | M::Ofb)
        }
        EncryptAlgorithm::UnsafeRc4 => mode == M::None,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::invalid(format!("{algorithm} does not support {mode} mode")))
    }
}

/// IV length in bits required by an (algorithm, mode, key length) triple.
///
/// # Errors
/// `InvalidParameter` when the triple itself is invalid.
pub fn iv_bit_length(algorithm: EncryptAlgorithm, mode: BlockCipherMode, key_bits: u32) -> Result<u32> {
    check_key_bits(algorithm, key_bits)?;
    check_mode(algorithm, mode)?;
    Ok(match mode {
        BlockCipherMode::None | BlockCipherMode::Ecb => 0,
        BlockCipherMode::Wrap => 64,
        BlockCipherMode::Gcm | BlockCipherMode::Ccm => 96,
        _ => algorithm.block_size().map_or(0, |bs| bs as u32 * 8),
    })
}

fn check_iv(mode: BlockCipherMode, expected_bits: u32, iv: Option<&[u8]>) -> Result<()> {
    match (expected_bits, iv) {
        (0, None) => Ok(()),
        (0, Some(_)) => Err(Error::invalid(format!("{mode} mode takes no IV"))),
        (_, None) => Err(Error::invalid(format!("{mode} mode requires an IV"))),
        (bits, Some(iv)) => {
            let got = iv.len() * 8;
            let ok = match mode {
                BlockCipherMode::Gcm => got >= 64,
                BlockCipherMode::Ccm => (56..=104).contains(&got),
                _ => got == bits as usize,
            };
            if ok {
                Ok(())
            } else {
                Err(Error::invalid(format!("a {got}-bit IV is not valid for {mode} mode")))
            }
        }
    }
}

enum CipherState {
    Chain(BlockChain),
    Feedback(Feedback),
    Gcm(Gcm),
    Ccm(Ccm),
    Wrap(Wrap),
    Stream(Box<dyn KeystreamCipher>),
}

/// Streaming symmetric encryption or decryption.
pub struct CipherContext {
    operation: CipherOperation,
    algorithm: EncryptAlgorithm,
    mode: BlockCipherMode,
    key_bits: u32,
    lifecycle: Lifecycle,
    state: CipherState,
    /// Kept only for RC2 so the effective key length can be changed.
    rc2: Option<(Arc<dyn Provider>, Zeroizing<Vec<u8>>, Option<Vec<u8>>)>,
}

impl_destroy!(CipherContext);

impl std::fmt::Debug for CipherContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherContext")
            .field("operation", &self.operation)
            .field("algorithm", &self.algorithm)
            .field("mode", &self.mode)
            .field("key_bits", &self.key_bits)
            .field("phase", &self.lifecycle.phase())
            .finish_non_exhaustive()
    }
}

impl CipherContext {
    pub(crate) fn new(
        provider: &Arc<dyn Provider>,
        operation: CipherOperation,
        algorithm: EncryptAlgorithm,
        mode: BlockCipherMode,
        key: &[u8],
        iv: Option<&[u8]>,
    ) -> Result<Self> {
        let key_bits = u32::try_from(key.len() * 8).map_err(|_| Error::invalid("key too long"))?;
        let iv_bits = iv_bit_length(algorithm, mode, key_bits)?;
        check_iv(mode, iv_bits, iv)?;
        let direction = operation.direction();
        let iv_bytes = iv.unwrap_or_default();

        let state = if algorithm == EncryptAlgorithm::UnsafeRc4 {
            CipherState::Stream(provider.stream_cipher(algorithm, key)?)
        } else {
            let cipher = provider.block_cipher(algorithm, key, None)?;
            Self::block_state(cipher, direction, mode, iv)?
        };
        let rc2 = (algorithm == EncryptAlgorithm::UnsafeRc2)
            .then(|| (Arc::clone(provider), Zeroizing::new(key.to_vec()), iv.map(<[u8]>::to_vec)));

        debug!(?operation, %algorithm, %mode, key_bits, iv_bits = iv_bytes.len() * 8, "cipher context created");
        Ok(Self { operation, algorithm, mode, key_bits, lifecycle: Lifecycle::new(), state, rc2 })
    }

    fn block_state(
        cipher: Box<dyn crate::provider::BlockCipher>,
        direction: Direction,
        mode: BlockCipherMode,
        iv: Option<&[u8]>,
    ) -> Result<CipherState> {
        let iv_bytes = iv.unwrap_or_default();
        let feedback = |cipher, kind| CipherState::Feedback(Feedback::new(cipher, direction, kind, iv_bytes));
        Ok(match mode {
            BlockCipherMode::Ecb => CipherState::Chain(BlockChain::new(cipher, direction, None)),
            BlockCipherMode::Cbc => CipherState::Chain(BlockChain::new(cipher, direction, iv)),
            BlockCipherMode::Cfb => feedback(cipher, FeedbackKind::Cfb),
            BlockCipherMode::Cfb1 => feedback(cipher, FeedbackKind::Cfb1),
            BlockCipherMode::Cfb8 => feedback(cipher, FeedbackKind::Cfb8),
            BlockCipherMode::Ofb => feedback(cipher, FeedbackKind::Ofb),
            BlockCipherMode::Ctr => feedback(cipher, FeedbackKind::Ctr),
            BlockCipherMode::Gcm => CipherState::Gcm(Gcm::new(cipher, direction, iv_bytes)?),
            BlockCipherMode::Ccm => CipherState::Ccm(Ccm::new(cipher, direction, iv_bytes)?),
            BlockCipherMode::Wrap => {
                let kind = if cipher.block_size() == 16 { WrapKind::Aes } else { WrapKind::TripleDes };
                CipherState::Wrap(Wrap::new(cipher, direction, kind, iv_bytes))
            }
            BlockCipherMode::None => return Err(Error::invalid("block ciphers need a chaining mode")),
        })
    }

    pub fn operation(&self) -> CipherOperation {
        self.operation
    }

    pub fn algorithm(&self) -> EncryptAlgorithm {
        self.algorithm
    }

    pub fn mode(&self) -> BlockCipherMode {
        self.mode
    }

    pub fn key_bit_length(&self) -> u32 {
        self.key_bits
    }

    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    /// Processes `input` and returns whatever output is ready.
    pub fn update(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        self.lifecycle.check_update()?;
        let out = match &mut self.state {
            CipherState::Chain(c) => c.update(input)?,
            CipherState::Feedback(f) => f.update(input)?,
            CipherState::Gcm(g) => g.update(input)?,
            CipherState::Ccm(c) => c.update(input)?,
            CipherState::Wrap(w) => w.update(input)?,
            CipherState::Stream(s) => {
                let mut out = util::alloc(input.len())?;
                out.extend_from_slice(input);
                s.apply(&mut out);
                out
            }
        };
        self.lifecycle.updated();
        Ok(out)
    }

    /// Flushes buffered data, applies or strips padding, and computes or checks the tag.
    ///
    /// A failed finalize leaves the context as it was.
    pub fn finalize(&mut self) -> Result<Vec<u8>> {
        self.lifecycle.check_finalize()?;
        let out = match &mut self.state {
            CipherState::Chain(c) => c.finalize(),
            CipherState::Gcm(g) => g.finalize(),
            CipherState::Ccm(c) => c.finalize(),
            CipherState::Feedback(_) | CipherState::Wrap(_) | CipherState::Stream(_) => Ok(Vec::new()),
        };
        match out {
            Ok(out) => {
                self.lifecycle.finalized();
                Ok(out)
            }
            Err(e) => {
                if let Error::DataMismatch(_) = e {
                    debug!(algorithm = %self.algorithm, mode = %self.mode, "integrity check failed at finalize");
                }
                Err(e)
            }
        }
    }

    /// Output size of an `update(input_len)`; `input_len == 0` asks for the
    /// size of `finalize` (an upper bound when padded decryption is pending).
    pub fn output_length(&self, input_len: usize) -> Result<usize> {
        if input_len == 0 {
            return Ok(match &self.state {
                CipherState::Chain(c) => c.finalize_len(),
                _ => 0,
            });
        }
        match &self.state {
            CipherState::Chain(c) => c.update_len(input_len),
            CipherState::Wrap(w) => w.update_len(input_len),
            _ => Ok(input_len),
        }
    }

    /// PKCS#7 (default) or no padding; ECB and CBC only, before the first update.
    pub fn set_padding(&mut self, padding: Padding) -> Result<()> {
        self.lifecycle.check_configurable()?;
        let CipherState::Chain(chain) = &mut self.state else {
            return Err(Error::invalid(format!("{} mode does not use padding", self.mode)));
        };
        match padding {
            Padding::None => chain.set_padding(false),
            Padding::Pkcs7 => chain.set_padding(true),
            other => return Err(Error::invalid(format!("{other} padding is not valid for symmetric ciphers"))),
        }
        Ok(())
    }

    /// Current padding of an ECB/CBC context.
    pub fn padding(&self) -> Result<Padding> {
        match &self.state {
            CipherState::Chain(c) if c.padded() => Ok(Padding::Pkcs7),
            CipherState::Chain(_) => Ok(Padding::None),
            _ => Err(Error::invalid(format!("{} mode does not use padding", self.mode))),
        }
    }

    /// Re-keys RC2 with the given effective key length (1..=1024 bits).
    pub fn set_rc2_effective_key_bits(&mut self, bits: usize) -> Result<()> {
        self.lifecycle.check_configurable()?;
        let Some((provider, key, iv)) = &self.rc2 else {
            return Err(Error::invalid("effective key bits only apply to RC2"));
        };
        let cipher = provider.block_cipher(self.algorithm, key, Some(bits))?;
        let mut state = Self::block_state(cipher, self.operation.direction(), self.mode, iv.as_deref())?;
        if let (CipherState::Chain(old), CipherState::Chain(new)) = (&self.state, &mut state) {
            new.set_padding(old.padded());
        }
        self.state = state;
        Ok(())
    }

    /// Additional authenticated data for GCM (before the first update) or CCM
    /// (after [`set_total_length`](Self::set_total_length)).
    pub fn set_aad(&mut self, aad: &[u8]) -> Result<()> {
        self.lifecycle.check_configurable()?;
        match &mut self.state {
            CipherState::Gcm(g) => g.set_aad(aad),
            CipherState::Ccm(c) => c.set_aad(aad),
            _ => Err(Error::invalid(format!("{} mode takes no AAD", self.mode))),
        }
    }

    /// Tag length in bytes for GCM/CCM encryption.
    pub fn set_tag_len(&mut self, len: usize) -> Result<()> {
        self.lifecycle.check_configurable()?;
        match &mut self.state {
            CipherState::Gcm(g) => g.set_tag_len(len),
            CipherState::Ccm(c) => c.set_tag_len(len),
            _ => Err(Error::invalid(format!("{} mode has no tag", self.mode))),
        }
    }

    /// Expected tag for GCM (before finalize) or CCM (before the update) decryption.
    pub fn set_tag(&mut self, tag: &[u8]) -> Result<()> {
        match &mut self.state {
            CipherState::Gcm(g) => {
                self.lifecycle.check_finalize()?;
                g.set_tag(tag)
            }
            CipherState::Ccm(c) => {
                self.lifecycle.check_configurable()?;
                c.set_tag(tag)
            }
            _ => Err(Error::invalid(format!("{} mode has no tag", self.mode))),
        }
    }

    /// Declares the CCM payload length; required before AAD.
    pub fn set_total_length(&mut self, len: usize) -> Result<()> {
        self.lifecycle.check_configurable()?;
        match &mut self.state {
            CipherState::Ccm(c) => c.set_total_length(len),
            _ => Err(Error::invalid("total length only applies to CCM")),
        }
    }

    /// Authentication tag of a finished GCM/CCM encryption.
    pub fn tag(&self) -> Result<Vec<u8>> {
        let tag = match &self.state {
            CipherState::Gcm(g) if self.lifecycle.phase() == Phase::Finalized => g.tag(),
            CipherState::Ccm(c) if self.lifecycle.phase() == Phase::Finalized => c.tag(),
            CipherState::Gcm(_) | CipherState::Ccm(_) => {
                return Err(Error::invalid("tag is available after finalize"));
            }
            _ => return Err(Error::invalid(format!("{} mode has no tag", self.mode))),
        };
        tag.map(<[u8]>::to_vec).ok_or_else(|| Error::invalid("tag is only produced when encrypting"))
    }
}

pub(crate) fn check_key_type(algorithm: EncryptAlgorithm, key: &Key) -> Result<()> {
    let expected = if algorithm.is_des_family() { KeyType::Des } else { KeyType::Symmetric };
    if key.key_type() == expected {
        Ok(())
    } else {
        Err(Error::invalid(format!("{algorithm} needs a {expected} key, got {}", key.key_type())))
    }
}

pub(crate) fn iv_slice(iv: Option<&Key>) -> Result<Option<&[u8]>> {
    iv.map(|iv| match iv.key_type() {
        KeyType::Iv | KeyType::Symmetric => iv.secret_bytes(),
        other => Err(Error::invalid(format!("an IV cannot be a {other} key"))),
    })
    .transpose()
}

impl Engine {
    /// IV length in bits for the given parameters.
    pub fn iv_bit_length(&self, algorithm: EncryptAlgorithm, mode: BlockCipherMode, key_bits: u32) -> Result<u32> {
        iv_bit_length(algorithm, mode, key_bits)
    }

    pub fn encrypt_initialize(
        &self,
        algorithm: EncryptAlgorithm,
        mode: BlockCipherMode,
        key: &Key,
        iv: Option<&Key>,
    ) -> Result<CipherContext> {
        self.cipher_initialize(CipherOperation::Encrypt, algorithm, mode, key, iv)
    }

    pub fn decrypt_initialize(
        &self,
        algorithm: EncryptAlgorithm,
        mode: BlockCipherMode,
        key: &Key,
        iv: Option<&Key>,
    ) -> Result<CipherContext> {
        self.cipher_initialize(CipherOperation::Decrypt, algorithm, mode, key, iv)
    }

    fn cipher_initialize(
        &self,
        operation: CipherOperation,
        algorithm: EncryptAlgorithm,
        mode: BlockCipherMode,
        key: &Key,
        iv: Option<&Key>,
    ) -> Result<CipherContext> {
        check_key_type(algorithm, key)?;
        CipherContext::new(self.provider(), operation, algorithm, mode, key.secret_bytes()?, iv_slice(iv)?)
    }
}
