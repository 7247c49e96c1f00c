#![forbid(unsafe_code)]

//! Small helpers shared by every context: fallible allocation, constant-time
//! comparison and handle destruction.

use crate::error::{Error, Result};
use subtle::ConstantTimeEq;

/// Allocates an empty buffer able to hold `len` bytes without reallocating.
pub fn alloc(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)?;
    Ok(buf)
}

/// Zero-filled buffer of exactly `len` bytes.
pub fn zalloc(len: usize) -> Result<Vec<u8>> {
    let mut buf = alloc(len)?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Constant-time comparison of two equally long buffers.
///
/// # Errors
/// `DataMismatch` when contents or lengths differ.
pub fn memcmp(a: &[u8], b: &[u8]) -> Result<()> {
    if a.len() == b.len() && bool::from(a.ct_eq(b)) {
        Ok(())
    } else {
        Err(Error::mismatch("buffers differ"))
    }
}

/// Fills a fresh buffer with random bytes from the operating system.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut buf = zalloc(len)?;
    getrandom::getrandom(&mut buf).map_err(|e| Error::internal(format!("rng: {e}")))?;
    Ok(buf)
}

/// Left-pads a big-endian integer encoding to `len` bytes.
pub(crate) fn left_pad(bytes: &[u8], len: usize) -> Result<Vec<u8>> {
    if bytes.len() > len {
        return Err(Error::internal("integer wider than its field"));
    }
    let mut out = zalloc(len)?;
    out[len - bytes.len()..].copy_from_slice(bytes);
    Ok(out)
}

macro_rules! impl_destroy {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $ty {
                /// Releases the handle held in `slot`; an empty slot is left untouched.
                pub fn destroy(slot: &mut Option<Self>) {
                    drop(slot.take());
                }
            }
        )+
    };
}
pub(crate) use impl_destroy;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memcmp_detects_single_bit() {
        let a = [0u8; 32];
        let mut b = a;
        memcmp(&a, &b).unwrap();
        b[31] ^= 1;
        assert!(matches!(memcmp(&a, &b), Err(Error::DataMismatch(_))));
    }

    #[test]
    fn memcmp_rejects_length_difference() {
        assert!(memcmp(b"abc", b"abcd").is_err());
        memcmp(b"", b"").unwrap();
    }

    #[test]
    fn random_buffers_differ() {
        let a = random_bytes(32).unwrap();
        let b = random_bytes(32).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn left_pad_places_value_at_the_end() {
        assert_eq!(left_pad(&[1, 2], 4).unwrap(), vec![0, 0, 1, 2]);
        assert!(left_pad(&[1, 2, 3], 2).is_err());
    }
}
