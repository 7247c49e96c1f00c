#![forbid(unsafe_code)]

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Nonce};
use proptest::prelude::*;
use yaca_crypto::{
    BlockCipherMode, CipherContext, Engine, EncryptAlgorithm, Error, Key, KeyBitLength, KeyType, Padding, Phase,
};

fn run(ctx: &mut CipherContext, data: &[u8], chunk: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for piece in data.chunks(chunk.max(1)) {
        let expected = ctx.output_length(piece.len()).unwrap();
        let got = ctx.update(piece).unwrap();
        assert_eq!(got.len(), expected);
        out.extend(got);
    }
    let bound = ctx.output_length(0).unwrap();
    let tail = ctx.finalize().unwrap();
    assert!(tail.len() <= bound);
    out.extend(tail);
    out
}

fn session(engine: &Engine, algorithm: EncryptAlgorithm, mode: BlockCipherMode, bits: u32) -> (Key, Option<Key>) {
    let key_type = match algorithm {
        EncryptAlgorithm::UnsafeDes | EncryptAlgorithm::UnsafeTripleDes2Tdea | EncryptAlgorithm::TripleDes3Tdea => {
            KeyType::Des
        }
        _ => KeyType::Symmetric,
    };
    let key = engine.generate_key(key_type, KeyBitLength::Bits(bits)).unwrap();
    let iv_bits = engine.iv_bit_length(algorithm, mode, bits).unwrap();
    let iv = (iv_bits > 0).then(|| engine.generate_key(KeyType::Iv, KeyBitLength::Bits(iv_bits)).unwrap());
    (key, iv)
}

#[test]
fn yaca_scenario_streaming() {
    let engine = Engine::default();
    let key = Key::from_bytes(KeyType::Symmetric, &[0u8; 32]).unwrap();
    let iv = Key::from_bytes(KeyType::Iv, &[0u8; 16]).unwrap();

    let mut enc = engine.encrypt_initialize(EncryptAlgorithm::Aes, BlockCipherMode::Cbc, &key, Some(&iv)).unwrap();
    assert!(enc.update(b"YACA").unwrap().is_empty());
    let ct = enc.finalize().unwrap();
    assert_eq!(ct.len(), 16);

    let mut dec = engine.decrypt_initialize(EncryptAlgorithm::Aes, BlockCipherMode::Cbc, &key, Some(&iv)).unwrap();
    let mut pt = dec.update(&ct).unwrap();
    pt.extend(dec.finalize().unwrap());
    assert_eq!(pt, b"YACA");
}

#[test]
fn every_algorithm_and_mode_round_trips() {
    use BlockCipherMode as M;
    use EncryptAlgorithm as A;
    let engine = Engine::default();
    let cases: &[(A, u32, &[M])] = &[
        (A::Aes, 128, &[M::Ecb, M::Cbc, M::Ctr, M::Cfb, M::Cfb1, M::Cfb8, M::Ofb]),
        (A::Aes, 256, &[M::Ecb, M::Cbc, M::Ctr, M::Cfb, M::Ofb]),
        (A::UnsafeDes, 64, &[M::Ecb, M::Cbc, M::Cfb, M::Cfb1, M::Cfb8, M::Ofb]),
        (A::UnsafeTripleDes2Tdea, 128, &[M::Ecb, M::Cbc, M::Cfb, M::Ofb]),
        (A::TripleDes3Tdea, 192, &[M::Ecb, M::Cbc, M::Cfb, M::Cfb1, M::Cfb8, M::Ofb]),
        (A::UnsafeRc2, 128, &[M::Ecb, M::Cbc, M::Cfb, M::Ofb]),
        (A::UnsafeRc4, 128, &[M::None]),
        (A::Cast5, 128, &[M::Ecb, M::Cbc, M::Cfb, M::Ofb]),
    ];
    let inputs: [&[u8]; 4] = [b"", b"x", &[7u8; 16], &[9u8; 45]];
    for &(algorithm, bits, modes) in cases {
        for &mode in modes {
            let (key, iv) = session(&engine, algorithm, mode, bits);
            for input in inputs {
                let mut enc = engine.encrypt_initialize(algorithm, mode, &key, iv.as_ref()).unwrap();
                let ct = run(&mut enc, input, 5);
                let mut dec = engine.decrypt_initialize(algorithm, mode, &key, iv.as_ref()).unwrap();
                let pt = run(&mut dec, &ct, 3);
                assert_eq!(pt, input, "{algorithm} {mode} len {}", input.len());
            }
        }
    }
}

#[test]
fn unpadded_cbc_needs_whole_blocks() {
    let engine = Engine::default();
    let (key, iv) = session(&engine, EncryptAlgorithm::Aes, BlockCipherMode::Cbc, 128);
    let mut ctx = engine.encrypt_initialize(EncryptAlgorithm::Aes, BlockCipherMode::Cbc, &key, iv.as_ref()).unwrap();
    ctx.set_padding(Padding::None).unwrap();
    ctx.update(&[1u8; 20]).unwrap();
    assert!(matches!(ctx.finalize(), Err(Error::InvalidParameter(_))));
    ctx.update(&[1u8; 12]).unwrap();
    assert!(ctx.finalize().unwrap().is_empty());
    assert!(ctx.set_padding(Padding::Pkcs7).is_err());
}

#[test]
fn bad_padding_leaves_context_open() {
    let engine = Engine::default();
    let (key, iv) = session(&engine, EncryptAlgorithm::Aes, BlockCipherMode::Cbc, 128);
    let mut enc = engine.encrypt_initialize(EncryptAlgorithm::Aes, BlockCipherMode::Cbc, &key, iv.as_ref()).unwrap();
    enc.set_padding(Padding::None).unwrap();
    // a final plaintext byte of zero is never valid PKCS#7
    let ct = run(&mut enc, &[0u8; 32], 32);

    let mut dec = engine.decrypt_initialize(EncryptAlgorithm::Aes, BlockCipherMode::Cbc, &key, iv.as_ref()).unwrap();
    dec.update(&ct).unwrap();
    assert!(matches!(dec.finalize(), Err(Error::DataMismatch(_))));
    assert_eq!(dec.phase(), Phase::Updating);
    assert!(matches!(dec.finalize(), Err(Error::DataMismatch(_))));
}

#[test]
fn finalized_contexts_reject_everything() {
    let engine = Engine::default();
    let (key, _) = session(&engine, EncryptAlgorithm::Aes, BlockCipherMode::Ecb, 192);
    let mut ctx = engine.encrypt_initialize(EncryptAlgorithm::Aes, BlockCipherMode::Ecb, &key, None).unwrap();
    ctx.update(b"abc").unwrap();
    ctx.finalize().unwrap();
    assert_eq!(ctx.phase(), Phase::Finalized);
    assert!(ctx.update(b"abc").is_err());
    assert!(ctx.finalize().is_err());
    assert!(ctx.set_padding(Padding::None).is_err());

    let mut slot = Some(ctx);
    CipherContext::destroy(&mut slot);
    CipherContext::destroy(&mut slot);
    assert!(slot.is_none());
}

#[test]
fn key_and_iv_validation() {
    let engine = Engine::default();
    let des = engine.generate_key(KeyType::Des, KeyBitLength::Bits(64)).unwrap();
    let sym = engine.generate_key(KeyType::Symmetric, KeyBitLength::Bits(128)).unwrap();
    let iv8 = engine.generate_key(KeyType::Iv, KeyBitLength::Bits(64)).unwrap();
    let iv16 = engine.generate_key(KeyType::Iv, KeyBitLength::Bits(128)).unwrap();
    assert!(engine.encrypt_initialize(EncryptAlgorithm::Aes, BlockCipherMode::Cbc, &des, Some(&iv16)).is_err());
    assert!(engine.encrypt_initialize(EncryptAlgorithm::UnsafeDes, BlockCipherMode::Cbc, &sym, Some(&iv8)).is_err());
    assert!(engine.encrypt_initialize(EncryptAlgorithm::UnsafeDes, BlockCipherMode::Cbc, &des, Some(&iv16)).is_err());
    assert!(engine.encrypt_initialize(EncryptAlgorithm::UnsafeDes, BlockCipherMode::Cbc, &des, None).is_err());
    assert!(engine.encrypt_initialize(EncryptAlgorithm::Aes, BlockCipherMode::Ecb, &sym, Some(&iv16)).is_err());
    assert!(engine.encrypt_initialize(EncryptAlgorithm::UnsafeDes, BlockCipherMode::Cbc, &des, Some(&iv8)).is_ok());
}

#[test]
fn rc2_effective_bits_change_the_ciphertext() {
    let engine = Engine::default();
    let (key, iv) = session(&engine, EncryptAlgorithm::UnsafeRc2, BlockCipherMode::Cbc, 128);
    let encrypt = |eff: Option<usize>| {
        let mut ctx = engine.encrypt_initialize(EncryptAlgorithm::UnsafeRc2, BlockCipherMode::Cbc, &key, iv.as_ref()).unwrap();
        if let Some(bits) = eff {
            ctx.set_rc2_effective_key_bits(bits).unwrap();
        }
        run(&mut ctx, b"effective key length", 64)
    };
    assert_eq!(encrypt(None), encrypt(Some(128)));
    assert_ne!(encrypt(None), encrypt(Some(40)));
}

#[test]
fn gcm_tag_mismatch_is_detected() {
    let engine = Engine::default();
    let (key, iv) = session(&engine, EncryptAlgorithm::Aes, BlockCipherMode::Gcm, 256);
    let mut enc = engine.encrypt_initialize(EncryptAlgorithm::Aes, BlockCipherMode::Gcm, &key, iv.as_ref()).unwrap();
    enc.set_aad(b"header").unwrap();
    enc.set_tag_len(12).unwrap();
    let ct = run(&mut enc, b"gcm payload", 4);
    let mut tag = enc.tag().unwrap();
    assert_eq!(tag.len(), 12);

    let mut dec = engine.decrypt_initialize(EncryptAlgorithm::Aes, BlockCipherMode::Gcm, &key, iv.as_ref()).unwrap();
    dec.set_aad(b"header").unwrap();
    let pt = dec.update(&ct).unwrap();
    tag[0] ^= 1;
    dec.set_tag(&tag).unwrap();
    assert!(matches!(dec.finalize(), Err(Error::DataMismatch(_))));
    tag[0] ^= 1;
    dec.set_tag(&tag).unwrap();
    dec.finalize().unwrap();
    assert_eq!(pt, b"gcm payload");
}

#[test]
fn ccm_with_aad_round_trip() {
    let engine = Engine::default();
    let (key, _) = session(&engine, EncryptAlgorithm::Aes, BlockCipherMode::Ccm, 128);
    let nonce = engine.generate_key(KeyType::Iv, KeyBitLength::Bits(104)).unwrap();
    let msg = b"counter with cbc-mac";

    let mut enc = engine.encrypt_initialize(EncryptAlgorithm::Aes, BlockCipherMode::Ccm, &key, Some(&nonce)).unwrap();
    enc.set_tag_len(16).unwrap();
    enc.set_total_length(msg.len()).unwrap();
    enc.set_aad(b"associated").unwrap();
    let ct = enc.update(msg).unwrap();
    assert!(enc.finalize().unwrap().is_empty());
    let tag = enc.tag().unwrap();

    let mut dec = engine.decrypt_initialize(EncryptAlgorithm::Aes, BlockCipherMode::Ccm, &key, Some(&nonce)).unwrap();
    dec.set_tag(&tag).unwrap();
    dec.set_total_length(ct.len()).unwrap();
    dec.set_aad(b"associated").unwrap();
    assert_eq!(dec.update(&ct).unwrap(), msg);
    dec.finalize().unwrap();

    let mut bad = engine.decrypt_initialize(EncryptAlgorithm::Aes, BlockCipherMode::Ccm, &key, Some(&nonce)).unwrap();
    bad.set_tag(&tag).unwrap();
    bad.set_total_length(ct.len()).unwrap();
    bad.set_aad(b"associatet").unwrap();
    assert!(matches!(bad.update(&ct), Err(Error::DataMismatch(_))));
}

#[test]
fn key_wrap_round_trip() {
    let engine = Engine::default();
    let kek = engine.generate_key(KeyType::Symmetric, KeyBitLength::Bits(256)).unwrap();
    let payload = engine.random_bytes(24).unwrap();
    assert!(engine.encrypt_initialize(EncryptAlgorithm::Aes, BlockCipherMode::Wrap, &kek, None).is_err());
    let iv = Key::from_bytes(KeyType::Iv, &[0xA6; 8]).unwrap();
    let mut wrap = engine.encrypt_initialize(EncryptAlgorithm::Aes, BlockCipherMode::Wrap, &kek, Some(&iv)).unwrap();
    let wrapped = wrap.update(&payload).unwrap();
    assert_eq!(wrapped.len(), 32);
    assert!(wrap.update(&payload).is_err());
    let mut unwrap = engine.decrypt_initialize(EncryptAlgorithm::Aes, BlockCipherMode::Wrap, &kek, Some(&iv)).unwrap();
    assert_eq!(unwrap.update(&wrapped).unwrap(), payload);
}

proptest! {
    #[test]
    fn gcm_matches_reference(
        key in any::<[u8; 16]>(),
        nonce in any::<[u8; 12]>(),
        aad in proptest::collection::vec(any::<u8>(), 0..48),
        msg in proptest::collection::vec(any::<u8>(), 0..200),
        chunk in 1usize..40,
    ) {
        let engine = Engine::default();
        let k = Key::from_bytes(KeyType::Symmetric, &key).unwrap();
        let iv = Key::from_bytes(KeyType::Iv, &nonce).unwrap();
        let mut ctx = engine.encrypt_initialize(EncryptAlgorithm::Aes, BlockCipherMode::Gcm, &k, Some(&iv)).unwrap();
        ctx.set_aad(&aad).unwrap();
        let mut ours = run(&mut ctx, &msg, chunk);
        ours.extend(ctx.tag().unwrap());

        let reference = Aes128Gcm::new(&key.into())
            .encrypt(Nonce::from_slice(&nonce), Payload { msg: &msg, aad: &aad })
            .unwrap();
        prop_assert_eq!(ours, reference);
    }

    #[test]
    fn chunking_does_not_change_cbc(msg in proptest::collection::vec(any::<u8>(), 0..300), chunk in 1usize..50) {
        let engine = Engine::default();
        let k = Key::from_bytes(KeyType::Symmetric, &[3u8; 24]).unwrap();
        let iv = Key::from_bytes(KeyType::Iv, &[4u8; 16]).unwrap();
        let one_shot = engine.simple_encrypt(EncryptAlgorithm::Aes, BlockCipherMode::Cbc, &k, Some(&iv), &msg).unwrap();
        let mut ctx = engine.encrypt_initialize(EncryptAlgorithm::Aes, BlockCipherMode::Cbc, &k, Some(&iv)).unwrap();
        prop_assert_eq!(run(&mut ctx, &msg, chunk), one_shot);
    }
}
