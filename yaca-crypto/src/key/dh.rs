#![forbid(unsafe_code)]

//! Finite-field Diffie-Hellman groups and keys.

use crate::error::{Error, Result};
use crate::types::DhLength;
use crate::util;
use num_bigint_dig::{prime::probably_prime, BigUint, RandBigInt, RandPrime};
use num_traits::{One, Zero};
use rand::rngs::OsRng;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

/// Miller-Rabin rounds for safe-prime candidates.
const PRIME_ROUNDS: usize = 20;

/// Domain parameters `(p, g, q)`; `q` is the order of the subgroup `g` lives in.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct DhGroup {
    pub(crate) p: BigUint,
    pub(crate) g: BigUint,
    pub(crate) q: BigUint,
}

impl DhGroup {
    #[allow(deprecated)]
    pub(crate) fn generate(len: DhLength) -> Result<Self> {
        let group = match len {
            DhLength::Rfc1024_160 => Self::x942(dsa::KeySize::DSA_1024_160),
            DhLength::Rfc2048_224 => Self::x942(dsa::KeySize::DSA_2048_224),
            DhLength::Rfc2048_256 => Self::x942(dsa::KeySize::DSA_2048_256),
            DhLength::Generator { generator, prime_bits } => {
                if !matches!(generator, 2 | 5) {
                    return Err(Error::invalid(format!("unsupported DH generator {generator}")));
                }
                if prime_bits < 512 || prime_bits % 8 != 0 {
                    return Err(Error::invalid("DH primes must be at least 512 bits, a multiple of 8"));
                }
                Self::safe_prime(generator, prime_bits as usize)
            }
        };
        debug!(prime_bits = group.bits(), "DH group generated");
        Ok(group)
    }

    /// Prime-order subgroup group of the RFC 5114 shape.
    fn x942(size: dsa::KeySize) -> Self {
        let components = dsa::Components::generate(&mut OsRng, size);
        Self { p: components.p().clone(), g: components.g().clone(), q: components.q().clone() }
    }

    fn safe_prime(generator: u32, bits: usize) -> Self {
        let mut rng = OsRng;
        loop {
            let q: BigUint = rng.gen_prime(bits - 1);
            let p: BigUint = (&q << 1usize) + 1u32;
            if p.bits() == bits && probably_prime(&p, PRIME_ROUNDS) {
                return Self { p, g: BigUint::from(generator), q };
            }
        }
    }

    pub(crate) fn from_parts(p: BigUint, g: BigUint, q: BigUint) -> Result<Self> {
        let one = BigUint::one();
        let p_minus_1 = &p - &one;
        if p.bits() < 256 || !(&p % 2u32).is_one() {
            return Err(Error::invalid("DH prime is malformed"));
        }
        if g <= one || g >= p_minus_1 || q <= BigUint::from(2u32) || q > p_minus_1 {
            return Err(Error::invalid("DH parameters are out of range"));
        }
        if !(&p_minus_1 % &q).is_zero() {
            return Err(Error::invalid("DH subgroup order does not divide p - 1"));
        }
        Ok(Self { p, g, q })
    }

    pub(crate) fn bits(&self) -> u32 {
        self.p.bits() as u32
    }

    fn byte_len(&self) -> usize {
        (self.p.bits() + 7) / 8
    }

    pub(crate) fn generate_key(&self) -> Result<DhPrivateKey> {
        let low = BigUint::from(2u32);
        let x = OsRng.gen_biguint_range(&low, &self.q);
        DhPrivateKey::from_parts(self.clone(), x)
    }
}

pub(crate) struct DhPrivateKey {
    group: DhGroup,
    x: BigUint,
    y: BigUint,
}

impl Drop for DhPrivateKey {
    fn drop(&mut self) {
        self.x.zeroize();
    }
}

impl DhPrivateKey {
    pub(crate) fn from_parts(group: DhGroup, x: BigUint) -> Result<Self> {
        if x <= BigUint::one() || x >= group.p {
            return Err(Error::invalid("DH private value is out of range"));
        }
        let y = group.g.modpow(&x, &group.p);
        Ok(Self { group, x, y })
    }

    pub(crate) fn group(&self) -> &DhGroup {
        &self.group
    }

    pub(crate) fn x(&self) -> &BigUint {
        &self.x
    }

    pub(crate) fn public_key(&self) -> DhPublicKey {
        DhPublicKey { group: self.group.clone(), y: self.y.clone() }
    }

    /// `peer.y ^ x mod p`, left-padded to the prime length.
    pub(crate) fn shared_secret(&self, peer: &DhPublicKey) -> Result<Zeroizing<Vec<u8>>> {
        if peer.group != self.group {
            return Err(Error::invalid("DH keys belong to different groups"));
        }
        let mut z = peer.y.modpow(&self.x, &self.group.p);
        if z <= BigUint::one() {
            z.zeroize();
            return Err(Error::invalid("degenerate DH shared secret"));
        }
        let raw = Zeroizing::new(z.to_bytes_be());
        z.zeroize();
        Ok(Zeroizing::new(util::left_pad(&raw, self.group.byte_len())?))
    }
}

#[derive(Clone, PartialEq, Eq)]
pub(crate) struct DhPublicKey {
    group: DhGroup,
    y: BigUint,
}

impl DhPublicKey {
    pub(crate) fn from_parts(group: DhGroup, y: BigUint) -> Result<Self> {
        let p_minus_1 = &group.p - BigUint::one();
        if y <= BigUint::one() || y >= p_minus_1 {
            return Err(Error::invalid("DH public value is out of range"));
        }
        Ok(Self { group, y })
    }

    pub(crate) fn group(&self) -> &DhGroup {
        &self.group
    }

    pub(crate) fn y(&self) -> &BigUint {
        &self.y
    }
}
