use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use yaca_crypto::{BlockCipherMode, DigestAlgorithm, EncryptAlgorithm, Engine, KeyBitLength, KeyType};

fn bench_ciphers(c: &mut Criterion) {
    let engine = Engine::default();
    let key = engine.generate_key(KeyType::Symmetric, KeyBitLength::Bits(256)).unwrap();
    let iv = engine.generate_key(KeyType::Iv, KeyBitLength::Bits(128)).unwrap();
    let gcm_iv = engine.generate_key(KeyType::Iv, KeyBitLength::Bits(96)).unwrap();
    let mut group = c.benchmark_group("aes256");
    for &n in &[64usize, 1024, 16384] {
        let data = vec![0x5Au8; n];
        group.throughput(Throughput::Bytes(n as u64));
        for mode in [BlockCipherMode::Cbc, BlockCipherMode::Ctr, BlockCipherMode::Cfb8] {
            group.bench_function(format!("{mode}_{n}"), |b| {
                b.iter(|| {
                    let out = engine
                        .simple_encrypt(EncryptAlgorithm::Aes, mode, &key, Some(&iv), black_box(&data))
                        .unwrap();
                    black_box(out)
                })
            });
        }
        group.bench_function(format!("gcm_{n}"), |b| {
            b.iter(|| {
                let mut ctx = engine
                    .encrypt_initialize(EncryptAlgorithm::Aes, BlockCipherMode::Gcm, &key, Some(&gcm_iv))
                    .unwrap();
                let mut out = ctx.update(black_box(&data)).unwrap();
                out.extend(ctx.finalize().unwrap());
                black_box((out, ctx.tag().unwrap()))
            })
        });
    }
    group.finish();
}

fn bench_macs(c: &mut Criterion) {
    let engine = Engine::default();
    let key = engine.generate_key(KeyType::Symmetric, KeyBitLength::Bits(128)).unwrap();
    let data = vec![0u8; 4096];
    c.bench_function("hmac_sha256_4096", |b| {
        b.iter(|| black_box(engine.simple_calculate_hmac(DigestAlgorithm::Sha256, &key, black_box(&data)).unwrap()))
    });
    c.bench_function("cmac_aes128_4096", |b| {
        b.iter(|| black_box(engine.simple_calculate_cmac(EncryptAlgorithm::Aes, &key, black_box(&data)).unwrap()))
    });
}

criterion_group!(benches, bench_ciphers, bench_macs);
criterion_main!(benches);
