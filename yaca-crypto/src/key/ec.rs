#![forbid(unsafe_code)]

//! Elliptic-curve keys over the curves the RustCrypto provider implements.

use crate::error::{Error, Result};
use crate::types::EcCurve;
use der::asn1::{BitStringRef, ObjectIdentifier, OctetStringRef};
use der::{Decode, Sequence};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rand::rngs::OsRng;
use signature::hazmat::{PrehashSigner, PrehashVerifier};
use std::borrow::Cow;
use zeroize::Zeroizing;

pub(crate) const OID_PRIME192V1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.1");
pub(crate) const OID_PRIME256V1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
pub(crate) const OID_SECP256K1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.10");
pub(crate) const OID_SECP384R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");
pub(crate) const OID_SECP521R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.35");

pub(crate) fn curve_oid(curve: EcCurve) -> ObjectIdentifier {
    match curve {
        EcCurve::Prime192v1 => OID_PRIME192V1,
        EcCurve::Prime256v1 => OID_PRIME256V1,
        EcCurve::Secp256k1 => OID_SECP256K1,
        EcCurve::Secp384r1 => OID_SECP384R1,
        EcCurve::Secp521r1 => OID_SECP521R1,
    }
}

pub(crate) fn curve_from_oid(oid: &ObjectIdentifier) -> Result<EcCurve> {
    EcCurve::ALL
        .iter()
        .copied()
        .find(|c| curve_oid(*c) == *oid)
        .ok_or_else(|| Error::invalid(format!("unknown curve {oid}")))
}

/// Provider support check shared by generation and import.
pub(crate) fn check_supported(curve: EcCurve) -> Result<()> {
    match curve {
        EcCurve::Prime256v1 | EcCurve::Secp256k1 | EcCurve::Secp384r1 => Ok(()),
        other => Err(Error::invalid(format!("curve {other} is not available from the provider"))),
    }
}

/// Outer fields of a SEC1 `ECPrivateKey`.
#[derive(Sequence)]
struct Sec1Header<'a> {
    version: u8,
    private_key: OctetStringRef<'a>,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    parameters: Option<ObjectIdentifier>,
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    public_key: Option<BitStringRef<'a>>,
}

#[derive(Clone)]
pub(crate) enum EcSecretKey {
    P256(p256::SecretKey),
    K256(k256::SecretKey),
    P384(p384::SecretKey),
}

#[derive(Clone, PartialEq, Eq)]
pub(crate) enum EcPublicKey {
    P256(p256::PublicKey),
    K256(k256::PublicKey),
    P384(p384::PublicKey),
}

/// Runs `$body` with `$k` bound to the inner key and `$c` aliasing the curve crate.
macro_rules! with_curve {
    ($value:expr, $enum:ident, |$k:ident, $c:ident| $body:expr) => {
        match $value {
            $enum::P256($k) => {
                use p256 as $c;
                $body
            }
            $enum::K256($k) => {
                use k256 as $c;
                $body
            }
            $enum::P384($k) => {
                use p384 as $c;
                $body
            }
        }
    };
    ($value:expr, $enum:ident, |$k:ident| $body:expr) => {
        match $value {
            $enum::P256($k) => $body,
            $enum::K256($k) => $body,
            $enum::P384($k) => $body,
        }
    };
}

/// Left-pads a digest shorter than the curve order with zeros. The integer it
/// encodes is unchanged.
fn widen_prehash(prehash: &[u8], field_len: usize) -> Cow<'_, [u8]> {
    if prehash.len() >= field_len {
        return Cow::Borrowed(prehash);
    }
    let mut wide = vec![0u8; field_len];
    wide[field_len - prehash.len()..].copy_from_slice(prehash);
    Cow::Owned(wide)
}

fn sig_error(e: signature::Error) -> Error {
    Error::internal(format!("ecdsa: {e}"))
}

impl EcSecretKey {
    pub(crate) fn generate(curve: EcCurve) -> Result<Self> {
        check_supported(curve)?;
        Ok(match curve {
            EcCurve::Prime256v1 => Self::P256(p256::SecretKey::random(&mut OsRng)),
            EcCurve::Secp256k1 => Self::K256(k256::SecretKey::random(&mut OsRng)),
            _ => Self::P384(p384::SecretKey::random(&mut OsRng)),
        })
    }

    pub(crate) fn curve(&self) -> EcCurve {
        match self {
            Self::P256(_) => EcCurve::Prime256v1,
            Self::K256(_) => EcCurve::Secp256k1,
            Self::P384(_) => EcCurve::Secp384r1,
        }
    }

    pub(crate) fn public_key(&self) -> EcPublicKey {
        match self {
            Self::P256(k) => EcPublicKey::P256(k.public_key()),
            Self::K256(k) => EcPublicKey::K256(k.public_key()),
            Self::P384(k) => EcPublicKey::P384(k.public_key()),
        }
    }

    /// DER-encoded ECDSA signature over an already hashed message.
    pub(crate) fn sign_prehash(&self, prehash: &[u8]) -> Result<Vec<u8>> {
        let prehash = widen_prehash(prehash, self.curve().field_len());
        with_curve!(self, Self, |k, c| {
            let signer = c::ecdsa::SigningKey::from(k);
            let sig: c::ecdsa::Signature = signer.sign_prehash(&prehash).map_err(sig_error)?;
            Ok(sig.to_der().as_bytes().to_vec())
        })
    }

    /// Raw x-coordinate of the shared point.
    pub(crate) fn diffie_hellman(&self, peer: &EcPublicKey) -> Result<Zeroizing<Vec<u8>>> {
        let secret = match (self, peer) {
            (Self::P256(k), EcPublicKey::P256(p)) => {
                p256::ecdh::diffie_hellman(k.to_nonzero_scalar(), p.as_affine()).raw_secret_bytes().to_vec()
            }
            (Self::K256(k), EcPublicKey::K256(p)) => {
                k256::ecdh::diffie_hellman(k.to_nonzero_scalar(), p.as_affine()).raw_secret_bytes().to_vec()
            }
            (Self::P384(k), EcPublicKey::P384(p)) => {
                p384::ecdh::diffie_hellman(k.to_nonzero_scalar(), p.as_affine()).raw_secret_bytes().to_vec()
            }
            _ => return Err(Error::invalid("EC keys are on different curves")),
        };
        Ok(Zeroizing::new(secret))
    }

    pub(crate) fn to_sec1_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        with_curve!(self, Self, |k| k.to_sec1_der().map_err(|e| Error::internal(format!("sec1: {e}"))))
    }

    /// Parses a SEC1 `ECPrivateKey`, picking the curve from its named-curve
    /// parameter (or the scalar length when the parameter is absent).
    pub(crate) fn from_sec1_der(der: &[u8]) -> Option<Self> {
        let header = Sec1Header::from_der(der).ok()?;
        let curve = match header.parameters {
            Some(oid) => curve_from_oid(&oid).ok()?,
            None if header.private_key.as_bytes().len() == 48 => EcCurve::Secp384r1,
            None => EcCurve::Prime256v1,
        };
        match curve {
            EcCurve::Prime256v1 => p256::SecretKey::from_sec1_der(der).ok().map(Self::P256),
            EcCurve::Secp256k1 => k256::SecretKey::from_sec1_der(der).ok().map(Self::K256),
            EcCurve::Secp384r1 => p384::SecretKey::from_sec1_der(der).ok().map(Self::P384),
            _ => None,
        }
    }

    pub(crate) fn to_pkcs8_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        with_curve!(self, Self, |k| k
            .to_pkcs8_der()
            .map(|doc| Zeroizing::new(doc.as_bytes().to_vec()))
            .map_err(|e| Error::internal(format!("pkcs8: {e}"))))
    }

    pub(crate) fn from_pkcs8_der(der: &[u8]) -> Option<Self> {
        p256::SecretKey::from_pkcs8_der(der)
            .map(Self::P256)
            .or_else(|_| k256::SecretKey::from_pkcs8_der(der).map(Self::K256))
            .or_else(|_| p384::SecretKey::from_pkcs8_der(der).map(Self::P384))
            .ok()
    }
}

impl EcPublicKey {
    pub(crate) fn curve(&self) -> EcCurve {
        match self {
            Self::P256(_) => EcCurve::Prime256v1,
            Self::K256(_) => EcCurve::Secp256k1,
            Self::P384(_) => EcCurve::Secp384r1,
        }
    }

    /// Checks a DER-encoded ECDSA signature over an already hashed message.
    pub(crate) fn verify_prehash(&self, prehash: &[u8], signature: &[u8]) -> Result<()> {
        let prehash = widen_prehash(prehash, self.curve().field_len());
        with_curve!(self, Self, |k, c| {
            let sig = c::ecdsa::Signature::from_der(signature)
                .map_err(|_| Error::mismatch("malformed ECDSA signature"))?;
            c::ecdsa::VerifyingKey::from(k)
                .verify_prehash(&prehash, &sig)
                .map_err(|_| Error::mismatch("ECDSA signature does not verify"))
        })
    }

    pub(crate) fn to_spki_der(&self) -> Result<Vec<u8>> {
        with_curve!(self, Self, |k| k
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| Error::internal(format!("spki: {e}"))))
    }

    pub(crate) fn from_spki_der(der: &[u8]) -> Option<Self> {
        p256::PublicKey::from_public_key_der(der)
            .map(Self::P256)
            .or_else(|_| k256::PublicKey::from_public_key_der(der).map(Self::K256))
            .or_else(|_| p384::PublicKey::from_public_key_der(der).map(Self::P384))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::hash;
    use crate::types::DigestAlgorithm;

    #[test]
    fn ecdsa_round_trip_on_every_supported_curve() {
        for curve in [EcCurve::Prime256v1, EcCurve::Secp256k1, EcCurve::Secp384r1] {
            let sk = EcSecretKey::generate(curve).unwrap();
            assert_eq!(sk.curve(), curve);
            let digest = hash(DigestAlgorithm::Sha256, b"message");
            let sig = sk.sign_prehash(&digest).unwrap();
            sk.public_key().verify_prehash(&digest, &sig).unwrap();
            let other = hash(DigestAlgorithm::Sha256, b"massage");
            assert!(sk.public_key().verify_prehash(&other, &sig).is_err());
        }
    }

    #[test]
    fn short_digests_are_widened() {
        let sk = EcSecretKey::generate(EcCurve::Secp384r1).unwrap();
        let digest = hash(DigestAlgorithm::Sha1, b"message");
        let sig = sk.sign_prehash(&digest).unwrap();
        sk.public_key().verify_prehash(&digest, &sig).unwrap();
        let mut padded = vec![0u8; 28];
        padded.extend_from_slice(&digest);
        sk.public_key().verify_prehash(&padded, &sig).unwrap();
    }

    #[test]
    fn unsupported_curves_are_refused() {
        assert!(EcSecretKey::generate(EcCurve::Prime192v1).is_err());
        assert!(EcSecretKey::generate(EcCurve::Secp521r1).is_err());
    }

    #[test]
    fn ecdh_agrees_and_checks_curves() {
        let a = EcSecretKey::generate(EcCurve::Secp384r1).unwrap();
        let b = EcSecretKey::generate(EcCurve::Secp384r1).unwrap();
        let ab = a.diffie_hellman(&b.public_key()).unwrap();
        assert_eq!(*ab, *b.diffie_hellman(&a.public_key()).unwrap());
        assert_eq!(ab.len(), 48);
        let c = EcSecretKey::generate(EcCurve::Prime256v1).unwrap();
        assert!(a.diffie_hellman(&c.public_key()).is_err());
    }

    #[test]
    fn containers_detect_curve() {
        let sk = EcSecretKey::generate(EcCurve::Secp256k1).unwrap();
        let sec1 = sk.to_sec1_der().unwrap();
        assert_eq!(EcSecretKey::from_sec1_der(&sec1).unwrap().curve(), EcCurve::Secp256k1);
        let spki = sk.public_key().to_spki_der().unwrap();
        assert!(EcPublicKey::from_spki_der(&spki).unwrap() == sk.public_key());
        assert_eq!(curve_from_oid(&OID_SECP384R1).unwrap(), EcCurve::Secp384r1);
    }
}
