#![forbid(unsafe_code)]

//! Key derivation: X9.42 / X9.63 hash KDFs over a shared secret, and PBKDF2.

use super::Key;
use crate::digest::Hasher;
use crate::error::{Error, Result};
use crate::types::{DigestAlgorithm, Kdf, KeyType};
use crate::util;
use der::asn1::{ObjectIdentifier, OctetStringRef};
use der::{Encode, Sequence};
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};
use tracing::debug;
use zeroize::Zeroizing;

/// `id-aes256-wrap`, the key-encryption algorithm named in X9.42 OtherInfo.
const OID_AES256_WRAP: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.1.45");

/// Upper bound on hash blocks a KDF may chain.
const MAX_KDF_BLOCKS: usize = 255;

#[derive(Sequence)]
struct KeySpecificInfo<'a> {
    algorithm: ObjectIdentifier,
    counter: OctetStringRef<'a>,
}

#[derive(Sequence)]
struct OtherInfo<'a> {
    key_info: KeySpecificInfo<'a>,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    party_a_info: Option<OctetStringRef<'a>>,
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT")]
    supp_pub_info: OctetStringRef<'a>,
}

fn octets(bytes: &[u8]) -> Result<OctetStringRef<'_>> {
    OctetStringRef::new(bytes).map_err(|e| Error::internal(format!("der: {e}")))
}

fn other_info(counter: &[u8; 4], info: Option<&[u8]>, out_bits: &[u8; 4]) -> Result<Vec<u8>> {
    OtherInfo {
        key_info: KeySpecificInfo { algorithm: OID_AES256_WRAP, counter: octets(counter)? },
        party_a_info: info.map(octets).transpose()?,
        supp_pub_info: octets(out_bits)?,
    }
    .to_der()
    .map_err(|e| Error::internal(format!("der: {e}")))
}

/// Stretches a shared secret into `output_len` bytes of keying material.
///
/// X9.63 hashes `Z || counter || info`; X9.42 hashes `Z || OtherInfo(counter)`.
/// The counter is big-endian and starts at 1.
pub fn derive_kdf(
    kdf: Kdf,
    digest: DigestAlgorithm,
    secret: &[u8],
    info: Option<&[u8]>,
    output_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    if secret.is_empty() {
        return Err(Error::invalid("empty shared secret"));
    }
    let hash_len = digest.output_len();
    if output_len == 0 || output_len > MAX_KDF_BLOCKS * hash_len {
        return Err(Error::invalid(format!("KDF output must be 1..={} bytes", MAX_KDF_BLOCKS * hash_len)));
    }
    let out_bits = u32::try_from(output_len * 8)
        .map_err(|_| Error::invalid("KDF output too long"))?
        .to_be_bytes();

    let mut out = Zeroizing::new(util::alloc(output_len.div_ceil(hash_len) * hash_len)?);
    for counter in 1..=output_len.div_ceil(hash_len) as u32 {
        let counter = counter.to_be_bytes();
        let mut h = Hasher::new(digest);
        h.update(secret);
        match kdf {
            Kdf::X962 => {
                h.update(&counter);
                if let Some(info) = info {
                    h.update(info);
                }
            }
            Kdf::X942 => h.update(&other_info(&counter, info, &out_bits)?),
        }
        out.extend_from_slice(&Zeroizing::new(h.finalize()));
    }
    out.truncate(output_len);
    debug!(%kdf, %digest, output_len, "key material derived");
    Ok(out)
}

/// PBKDF2-HMAC over `digest`, returned as a Symmetric key of `output_bits`.
pub fn derive_pbkdf2(
    password: &str,
    salt: &[u8],
    iterations: u32,
    digest: DigestAlgorithm,
    output_bits: u32,
) -> Result<Key> {
    if salt.is_empty() {
        return Err(Error::invalid("PBKDF2 needs a salt"));
    }
    if iterations == 0 {
        return Err(Error::invalid("PBKDF2 needs at least one iteration"));
    }
    if output_bits == 0 || output_bits % 8 != 0 {
        return Err(Error::invalid("PBKDF2 output must be a positive multiple of 8 bits"));
    }
    let mut out = Zeroizing::new(util::zalloc(output_bits as usize / 8)?);
    let pw = password.as_bytes();
    match digest {
        DigestAlgorithm::Md5 => pbkdf2::pbkdf2_hmac::<Md5>(pw, salt, iterations, &mut out),
        DigestAlgorithm::Sha1 => pbkdf2::pbkdf2_hmac::<Sha1>(pw, salt, iterations, &mut out),
        DigestAlgorithm::Sha224 => pbkdf2::pbkdf2_hmac::<Sha224>(pw, salt, iterations, &mut out),
        DigestAlgorithm::Sha256 => pbkdf2::pbkdf2_hmac::<Sha256>(pw, salt, iterations, &mut out),
        DigestAlgorithm::Sha384 => pbkdf2::pbkdf2_hmac::<Sha384>(pw, salt, iterations, &mut out),
        DigestAlgorithm::Sha512 => pbkdf2::pbkdf2_hmac::<Sha512>(pw, salt, iterations, &mut out),
    }
    debug!(%digest, iterations, output_bits, "password key derived");
    Key::from_bytes(KeyType::Symmetric, &out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn pbkdf2_rfc6070() {
        let k = derive_pbkdf2("password", b"salt", 1, DigestAlgorithm::Sha1, 160).unwrap();
        assert_eq!(k.secret_bytes().unwrap(), hex!("0c60c80f961f0e71f3a9b524af6012062fe037a6"));
        let k = derive_pbkdf2("password", b"salt", 2, DigestAlgorithm::Sha1, 160).unwrap();
        assert_eq!(k.secret_bytes().unwrap(), hex!("ea6c014dc72d6f8ccd1ed92ace1d41f0d8de8957"));
    }

    #[test]
    fn pbkdf2_argument_checks() {
        assert!(derive_pbkdf2("pw", b"", 1, DigestAlgorithm::Sha256, 128).is_err());
        assert!(derive_pbkdf2("pw", b"s", 0, DigestAlgorithm::Sha256, 128).is_err());
        assert!(derive_pbkdf2("pw", b"s", 1, DigestAlgorithm::Sha256, 100).is_err());
    }

    #[test]
    fn x963_first_block_is_counter_one() {
        let z = [0x11u8; 32];
        let out = derive_kdf(Kdf::X962, DigestAlgorithm::Sha256, &z, Some(b"ctx"), 32).unwrap();
        let mut expected = z.to_vec();
        expected.extend_from_slice(&[0, 0, 0, 1]);
        expected.extend_from_slice(b"ctx");
        assert_eq!(out.as_slice(), crate::digest::hash(DigestAlgorithm::Sha256, &expected));
    }

    #[test]
    fn outputs_are_prefixes() {
        let z = [7u8; 20];
        for kdf in [Kdf::X942, Kdf::X962] {
            let long = derive_kdf(kdf, DigestAlgorithm::Sha1, &z, None, 50).unwrap();
            assert_eq!(long.len(), 50);
            let short = derive_kdf(kdf, DigestAlgorithm::Sha1, &z, None, 20).unwrap();
            if kdf == Kdf::X962 {
                assert_eq!(&long[..20], short.as_slice());
            } else {
                // OtherInfo binds the total output length
                assert_ne!(&long[..20], short.as_slice());
            }
        }
    }

    #[test]
    fn other_info_layout() {
        let der = other_info(&[0, 0, 0, 1], None, &[0, 0, 0, 128]).unwrap();
        assert_eq!(
            der,
            hex!(
                "301b"
                "3011 0609 60864801650304012d 0404 00000001"
                "a206 0404 00000080"
            )
            .to_vec()
        );
    }

    #[test]
    fn kdf_argument_checks() {
        assert!(derive_kdf(Kdf::X962, DigestAlgorithm::Sha1, &[], None, 16).is_err());
        assert!(derive_kdf(Kdf::X962, DigestAlgorithm::Sha1, &[1], None, 0).is_err());
        assert!(derive_kdf(Kdf::X962, DigestAlgorithm::Md5, &[1], None, 255 * 16 + 1).is_err());
    }
}
