#![forbid(unsafe_code)]

//! Descriptors for keys, algorithms, modes, paddings and container formats.
//!
//! Every descriptor has a canonical lowercase name (`Display`/`FromStr`) so
//! front ends can accept them as plain strings.

use crate::error::{Error, Result};
use std::{fmt, str::FromStr};

macro_rules! named_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// Canonical lowercase name.
            pub const fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => $text, )+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.name().eq_ignore_ascii_case(s))
                    .ok_or_else(|| Error::invalid(format!(concat!("unknown ", stringify!($name), " '{}'"), s)))
            }
        }
    };
}

named_enum! {
    /// Kind of a key handle. Fixed at creation.
    pub enum KeyType {
        /// Generic secret key.
        Symmetric => "symmetric",
        /// DES / 3DES key (64, 128 or 192 bits).
        Des => "des",
        /// Initialization vector.
        Iv => "iv",
        RsaPublic => "rsa-public",
        RsaPrivate => "rsa-private",
        DsaPublic => "dsa-public",
        DsaPrivate => "dsa-private",
        DsaParams => "dsa-params",
        DhPublic => "dh-public",
        DhPrivate => "dh-private",
        DhParams => "dh-params",
        EcPublic => "ec-public",
        EcPrivate => "ec-private",
        EcParams => "ec-params",
    }
}

impl KeyType {
    /// Symmetric, DES and IV keys are raw byte strings.
    pub const fn is_simple(self) -> bool {
        matches!(self, Self::Symmetric | Self::Des | Self::Iv)
    }

    pub const fn is_private(self) -> bool {
        matches!(self, Self::RsaPrivate | Self::DsaPrivate | Self::DhPrivate | Self::EcPrivate)
    }

    pub const fn is_public(self) -> bool {
        matches!(self, Self::RsaPublic | Self::DsaPublic | Self::DhPublic | Self::EcPublic)
    }

    pub const fn is_params(self) -> bool {
        matches!(self, Self::DsaParams | Self::DhParams | Self::EcParams)
    }

    /// Public type matching a private one.
    pub const fn public_counterpart(self) -> Option<Self> {
        match self {
            Self::RsaPrivate => Some(Self::RsaPublic),
            Self::DsaPrivate => Some(Self::DsaPublic),
            Self::DhPrivate => Some(Self::DhPublic),
            Self::EcPrivate => Some(Self::EcPublic),
            _ => None,
        }
    }

    /// Parameter-set type for a DSA, DH or EC key.
    pub const fn params_counterpart(self) -> Option<Self> {
        match self {
            Self::DsaPrivate | Self::DsaPublic => Some(Self::DsaParams),
            Self::DhPrivate | Self::DhPublic => Some(Self::DhParams),
            Self::EcPrivate | Self::EcPublic => Some(Self::EcParams),
            _ => None,
        }
    }

    /// Private type generated from a parameter set.
    pub const fn private_from_params(self) -> Option<Self> {
        match self {
            Self::DsaParams => Some(Self::DsaPrivate),
            Self::DhParams => Some(Self::DhPrivate),
            Self::EcParams => Some(Self::EcPrivate),
            _ => None,
        }
    }
}

named_enum! {
    /// Symmetric encryption algorithm. `Unsafe*` variants are legacy.
    pub enum EncryptAlgorithm {
        Aes => "aes",
        UnsafeDes => "des",
        UnsafeTripleDes2Tdea => "3des-2tdea",
        TripleDes3Tdea => "3des-3tdea",
        UnsafeRc2 => "rc2",
        UnsafeRc4 => "rc4",
        Cast5 => "cast5",
    }
}

impl EncryptAlgorithm {
    /// Cipher block size in bytes; RC4 has none.
    pub const fn block_size(self) -> Option<usize> {
        match self {
            Self::Aes => Some(16),
            Self::UnsafeRc4 => None,
            _ => Some(8),
        }
    }

    pub const fn is_des_family(self) -> bool {
        matches!(self, Self::UnsafeDes | Self::UnsafeTripleDes2Tdea | Self::TripleDes3Tdea)
    }
}

named_enum! {
    /// Chaining mode of a block cipher.
    pub enum BlockCipherMode {
        /// Stream ciphers only (RC4).
        None => "none",
        Ecb => "ecb",
        Cbc => "cbc",
        Ctr => "ctr",
        Gcm => "gcm",
        /// Full-block cipher feedback.
        Cfb => "cfb",
        Cfb1 => "cfb1",
        Cfb8 => "cfb8",
        Ofb => "ofb",
        Ccm => "ccm",
        /// Key wrapping (RFC 3394 for AES, RFC 3217 for 3DES).
        Wrap => "wrap",
    }
}

impl BlockCipherMode {
    /// Modes whose ciphertext carries an authentication tag.
    pub const fn is_aead(self) -> bool {
        matches!(self, Self::Gcm | Self::Ccm)
    }
}

named_enum! {
    pub enum DigestAlgorithm {
        Md5 => "md5",
        Sha1 => "sha1",
        Sha224 => "sha224",
        Sha256 => "sha256",
        Sha384 => "sha384",
        Sha512 => "sha512",
    }
}

impl DigestAlgorithm {
    /// Digest length in bytes.
    pub const fn output_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

named_enum! {
    /// Padding of block ciphers and RSA operations.
    pub enum Padding {
        None => "none",
        X931 => "x931",
        Pkcs1 => "pkcs1",
        Pkcs1Pss => "pkcs1-pss",
        Pkcs1Oaep => "pkcs1-oaep",
        Pkcs1Sslv23 => "pkcs1-sslv23",
        Pkcs7 => "pkcs7",
    }
}

named_enum! {
    /// Container used for asymmetric key export.
    pub enum KeyFormat {
        /// Algorithm-native encoding (PKCS#1, SEC1, traditional DSA).
        Default => "default",
        /// Encrypted PKCS#8 (private keys only).
        Pkcs8 => "pkcs8",
    }
}

named_enum! {
    /// Outer encoding of an exported key.
    pub enum KeyFileFormat {
        Raw => "raw",
        Base64 => "base64",
        Pem => "pem",
        Der => "der",
    }
}

named_enum! {
    /// Key derivation function applied to a shared secret.
    pub enum Kdf {
        /// ANSI X9.42 with an AES-256 key-wrap OtherInfo.
        X942 => "x942",
        /// ANSI X9.63 (the counter-mode hash KDF).
        X962 => "x962",
    }
}

named_enum! {
    /// Named elliptic curves.
    pub enum EcCurve {
        Prime192v1 => "prime192v1",
        Prime256v1 => "prime256v1",
        Secp256k1 => "secp256k1",
        Secp384r1 => "secp384r1",
        Secp521r1 => "secp521r1",
    }
}

impl EcCurve {
    pub const fn bits(self) -> u32 {
        match self {
            Self::Prime192v1 => 192,
            Self::Prime256v1 | Self::Secp256k1 => 256,
            Self::Secp384r1 => 384,
            Self::Secp521r1 => 521,
        }
    }

    /// Size in bytes of a field element / scalar.
    pub const fn field_len(self) -> usize {
        (self.bits() as usize + 7) / 8
    }

    const fn raw(self) -> u32 {
        match self {
            Self::Prime192v1 => 0x3000_00C0,
            Self::Prime256v1 => 0x3000_0100,
            Self::Secp256k1 => 0x3120_0100,
            Self::Secp384r1 => 0x3110_0180,
            Self::Secp521r1 => 0x3110_0209,
        }
    }
}

/// Size of a Diffie-Hellman group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DhLength {
    /// RFC 5114 shaped group, 1024-bit prime with a 160-bit subgroup.
    Rfc1024_160,
    /// RFC 5114 shaped group, 2048-bit prime with a 224-bit subgroup.
    Rfc2048_224,
    /// RFC 5114 shaped group, 2048-bit prime with a 256-bit subgroup.
    Rfc2048_256,
    /// Safe-prime group with generator 2 or 5 and a prime of `prime_bits` bits.
    Generator { generator: u32, prime_bits: u32 },
}

impl DhLength {
    /// Bits of the prime modulus.
    pub const fn prime_bits(self) -> u32 {
        match self {
            Self::Rfc1024_160 => 1024,
            Self::Rfc2048_224 | Self::Rfc2048_256 => 2048,
            Self::Generator { prime_bits, .. } => prime_bits,
        }
    }
}

const DH_GENERATOR_FLAG: u32 = 0x1000_0000;
const DH_GENERATOR_5_FLAG: u32 = 0x0100_0000;
const DH_RFC_1024_160: u32 = 0x2000_0400;
const DH_RFC_2048_224: u32 = 0x2100_0800;
const DH_RFC_2048_256: u32 = 0x2200_0800;

/// Requested key length: plain bits, a named curve or a DH group description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyBitLength {
    Bits(u32),
    Ec(EcCurve),
    Dh(DhLength),
}

impl KeyBitLength {
    /// Decodes the packed 32-bit representation used on the wire and by front ends.
    pub fn from_raw(raw: u32) -> Result<Self> {
        if let Some(curve) = EcCurve::ALL.iter().copied().find(|c| c.raw() == raw) {
            return Ok(Self::Ec(curve));
        }
        match raw {
            DH_RFC_1024_160 => return Ok(Self::Dh(DhLength::Rfc1024_160)),
            DH_RFC_2048_224 => return Ok(Self::Dh(DhLength::Rfc2048_224)),
            DH_RFC_2048_256 => return Ok(Self::Dh(DhLength::Rfc2048_256)),
            _ => {}
        }
        match raw & 0xF000_0000 {
            0 => Ok(Self::Bits(raw)),
            DH_GENERATOR_FLAG => {
                let generator = match raw & 0x0F00_0000 {
                    0 => 2,
                    DH_GENERATOR_5_FLAG => 5,
                    _ => return Err(Error::invalid(format!("unknown DH generator in {raw:#010x}"))),
                };
                Ok(Self::Dh(DhLength::Generator { generator, prime_bits: raw & 0x00FF_FFFF }))
            }
            _ => Err(Error::invalid(format!("unrecognised key length {raw:#010x}"))),
        }
    }

    /// Packed 32-bit representation.
    pub fn to_raw(self) -> Result<u32> {
        Ok(match self {
            Self::Bits(bits) if bits & 0xF000_0000 == 0 => bits,
            Self::Bits(bits) => return Err(Error::invalid(format!("key length {bits} is too large"))),
            Self::Ec(curve) => curve.raw(),
            Self::Dh(DhLength::Rfc1024_160) => DH_RFC_1024_160,
            Self::Dh(DhLength::Rfc2048_224) => DH_RFC_2048_224,
            Self::Dh(DhLength::Rfc2048_256) => DH_RFC_2048_256,
            Self::Dh(DhLength::Generator { generator, prime_bits }) => {
                if prime_bits > 0x00FF_FFFF {
                    return Err(Error::invalid("DH prime length does not fit the packed form"));
                }
                let g = match generator {
                    2 => 0,
                    5 => DH_GENERATOR_5_FLAG,
                    other => return Err(Error::invalid(format!("unsupported DH generator {other}"))),
                };
                DH_GENERATOR_FLAG | g | prime_bits
            }
        })
    }
}

impl From<EcCurve> for KeyBitLength {
    fn from(curve: EcCurve) -> Self {
        Self::Ec(curve)
    }
}

impl From<DhLength> for KeyBitLength {
    fn from(len: DhLength) -> Self {
        Self::Dh(len)
    }
}

impl fmt::Display for KeyBitLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bits(bits) => write!(f, "{bits}"),
            Self::Ec(curve) => write!(f, "{curve}"),
            Self::Dh(DhLength::Rfc1024_160) => f.write_str("dh-rfc-1024-160"),
            Self::Dh(DhLength::Rfc2048_224) => f.write_str("dh-rfc-2048-224"),
            Self::Dh(DhLength::Rfc2048_256) => f.write_str("dh-rfc-2048-256"),
            Self::Dh(DhLength::Generator { generator, prime_bits }) => {
                write!(f, "dh-gen{generator}-{prime_bits}")
            }
        }
    }
}

/// Accepts a bit count, a curve name or the `dh-*` forms produced by `Display`.
impl FromStr for KeyBitLength {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Ok(bits) = s.parse::<u32>() {
            return Ok(Self::Bits(bits));
        }
        if let Ok(curve) = s.parse::<EcCurve>() {
            return Ok(Self::Ec(curve));
        }
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "dh-rfc-1024-160" => return Ok(Self::Dh(DhLength::Rfc1024_160)),
            "dh-rfc-2048-224" => return Ok(Self::Dh(DhLength::Rfc2048_224)),
            "dh-rfc-2048-256" => return Ok(Self::Dh(DhLength::Rfc2048_256)),
            _ => {}
        }
        let generator_form = lower
            .strip_prefix("dh-gen")
            .and_then(|rest| rest.split_once('-'))
            .and_then(|(g, bits)| Some((g.parse::<u32>().ok()?, bits.parse::<u32>().ok()?)));
        match generator_form {
            Some((generator @ (2 | 5), prime_bits)) => {
                Ok(Self::Dh(DhLength::Generator { generator, prime_bits }))
            }
            _ => Err(Error::invalid(format!("unknown key length '{s}'"))),
        }
    }
}
