#![forbid(unsafe_code)]

//! Traditional password-protected PEM (`Proc-Type: 4,ENCRYPTED` with a
//! `DEK-Info` header), as written by OpenSSL for PKCS#1 and DSA keys.

use crate::cipher::{CipherContext, CipherOperation};
use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::types::{BlockCipherMode, EncryptAlgorithm};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use md5::{Digest, Md5};
use std::fmt::Write as _;
use std::sync::Arc;
use zeroize::Zeroizing;

const LINE_WIDTH: usize = 64;

/// Whether the armor carries the encryption headers.
pub(crate) fn is_encrypted(text: &str) -> bool {
    text.lines().any(|l| l.trim_start().starts_with("Proc-Type:") && l.contains("ENCRYPTED"))
}

/// OpenSSL `EVP_BytesToKey` with MD5 and one iteration.
fn bytes_to_key(password: &[u8], salt: &[u8], len: usize) -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(Vec::with_capacity(len + 16));
    let mut prev: Vec<u8> = Vec::new();
    while key.len() < len {
        let mut h = Md5::new();
        h.update(&prev);
        h.update(password);
        h.update(salt);
        prev = h.finalize().to_vec();
        key.extend_from_slice(&prev);
    }
    key.truncate(len);
    key
}

fn dek_cipher(name: &str) -> Result<(EncryptAlgorithm, usize)> {
    match name.trim() {
        "AES-128-CBC" => Ok((EncryptAlgorithm::Aes, 16)),
        "AES-192-CBC" => Ok((EncryptAlgorithm::Aes, 24)),
        "AES-256-CBC" => Ok((EncryptAlgorithm::Aes, 32)),
        "DES-EDE3-CBC" => Ok((EncryptAlgorithm::TripleDes3Tdea, 24)),
        "DES-CBC" => Ok((EncryptAlgorithm::UnsafeDes, 8)),
        other => Err(Error::invalid(format!("unsupported PEM cipher {other}"))),
    }
}

/// Encrypts `der` under `password` with AES-256-CBC and armors it.
pub(crate) fn encrypt(provider: &Arc<dyn Provider>, label: &str, der: &[u8], password: &[u8]) -> Result<Vec<u8>> {
    let mut iv = [0u8; 16];
    provider.random_bytes(&mut iv)?;
    let key = bytes_to_key(password, &iv[..8], 32);
    let mut ctx = CipherContext::new(
        provider,
        CipherOperation::Encrypt,
        EncryptAlgorithm::Aes,
        BlockCipherMode::Cbc,
        &key,
        Some(&iv),
    )?;
    let mut body = ctx.update(der)?;
    body.extend(ctx.finalize()?);

    let encoded = STANDARD.encode(&body);
    let mut out = String::with_capacity(encoded.len() + 256);
    let _ = writeln!(out, "-----BEGIN {label}-----");
    let _ = writeln!(out, "Proc-Type: 4,ENCRYPTED");
    let _ = writeln!(out, "DEK-Info: AES-256-CBC,{}", hex::encode_upper(iv));
    out.push('\n');
    for line in encoded.as_bytes().chunks(LINE_WIDTH) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push('\n');
    }
    let _ = writeln!(out, "-----END {label}-----");
    Ok(out.into_bytes())
}

/// Parses and decrypts an encrypted armor, returning its label and DER body.
///
/// # Errors
/// `InvalidParameter` for malformed armor, `InvalidPassword` when decryption fails.
pub(crate) fn decrypt(provider: &Arc<dyn Provider>, text: &str, password: &[u8]) -> Result<(String, Zeroizing<Vec<u8>>)> {
    let mut lines = text.lines().map(str::trim).skip_while(|l| !l.starts_with("-----BEGIN "));
    let label = lines
        .next()
        .and_then(|l| l.strip_prefix("-----BEGIN "))
        .and_then(|l| l.strip_suffix("-----"))
        .ok_or_else(|| Error::invalid("missing PEM armor"))?
        .to_string();

    let mut dek_info = None;
    let mut body = String::new();
    let mut in_headers = true;
    let mut terminated = false;
    for line in lines {
        if line.starts_with("-----END ") {
            terminated = true;
            break;
        }
        if in_headers {
            if line.is_empty() {
                in_headers = false;
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.trim() == "DEK-Info" {
                    dek_info = Some(value.trim().to_string());
                }
                continue;
            }
            in_headers = false;
        }
        body.push_str(line);
    }
    if !terminated {
        return Err(Error::invalid("unterminated PEM armor"));
    }

    let dek_info = dek_info.ok_or_else(|| Error::invalid("encrypted PEM without DEK-Info"))?;
    let (cipher_name, iv_hex) =
        dek_info.split_once(',').ok_or_else(|| Error::invalid("malformed DEK-Info header"))?;
    let (algorithm, key_len) = dek_cipher(cipher_name)?;
    let iv = hex::decode(iv_hex.trim()).map_err(|_| Error::invalid("malformed DEK-Info IV"))?;
    if Some(iv.len()) != algorithm.block_size() {
        return Err(Error::invalid("DEK-Info IV has the wrong length"));
    }
    let ciphertext = STANDARD.decode(body.as_bytes()).map_err(|_| Error::invalid("malformed PEM body"))?;

    let key = bytes_to_key(password, &iv[..8], key_len);
    let mut ctx =
        CipherContext::new(provider, CipherOperation::Decrypt, algorithm, BlockCipherMode::Cbc, &key, Some(&iv))?;
    let mut der = Zeroizing::new(ctx.update(&ciphertext).map_err(|_| Error::InvalidPassword)?);
    der.extend(ctx.finalize().map_err(|_| Error::InvalidPassword)?);
    Ok((label, der))
}
