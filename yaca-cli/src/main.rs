#![forbid(unsafe_code)]

use anyhow::{anyhow, bail, Context};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use yaca_crypto::{
    BlockCipherMode, DigestAlgorithm, EncryptAlgorithm, Engine, EngineConfig, Key, KeyBitLength, KeyFileFormat,
    KeyFormat, KeyType, Padding,
};

#[derive(Debug, Parser)]
#[command(name = "yaca", version, about = "Context-oriented cryptography from the command line")]
struct Cli {
    /// TOML engine configuration
    #[arg(long, env = "YACA_CONFIG")]
    config: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
    /// PBKDF2 iterations for password-protected PKCS#8 export
    #[arg(long)]
    pkcs8_iterations: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Generate a key and write it out
    Keygen {
        /// Key type, e.g. symmetric, rsa-private, ec-private, dh-params
        #[arg(long = "type")]
        key_type: KeyType,
        /// Bit count, curve name or dh-* length
        #[arg(long)]
        length: KeyBitLength,
        #[arg(long, default_value = "default")]
        format: KeyFormat,
        /// raw, base64, pem or der
        #[arg(long, default_value = "pem")]
        file_format: KeyFileFormat,
        #[arg(long, env = "YACA_PASSWORD")]
        password: Option<String>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Extract the public half of a private key
    Pubkey {
        #[arg(long = "type")]
        key_type: KeyType,
        #[arg(long = "in")]
        input: PathBuf,
        #[arg(long, env = "YACA_PASSWORD")]
        password: Option<String>,
        #[arg(long, default_value = "pem")]
        file_format: KeyFileFormat,
        #[arg(long)]
        out: PathBuf,
    },
    /// Hex digest of a file or stdin
    Digest {
        #[arg(long, default_value = "sha256")]
        algorithm: DigestAlgorithm,
        #[arg(long = "in")]
        input: Option<PathBuf>,
    },
    /// Symmetric encryption into a JSON envelope
    Encrypt {
        #[arg(long, default_value = "aes")]
        algorithm: EncryptAlgorithm,
        #[arg(long, default_value = "cbc")]
        mode: BlockCipherMode,
        /// Key file (base64 or raw bytes)
        #[arg(long)]
        key: PathBuf,
        #[arg(long = "in")]
        input: Option<PathBuf>,
    },
    /// Decrypt a JSON envelope produced by `encrypt`
    Decrypt {
        #[arg(long)]
        key: PathBuf,
        #[arg(long = "in")]
        input: Option<PathBuf>,
    },
    /// Encrypt under a fresh session key sealed for an RSA public key
    Seal {
        #[arg(long)]
        pubkey: PathBuf,
        #[arg(long, default_value = "aes")]
        algorithm: EncryptAlgorithm,
        #[arg(long, default_value = "cbc")]
        mode: BlockCipherMode,
        #[arg(long, default_value_t = 256)]
        key_bits: u32,
        #[arg(long = "in")]
        input: Option<PathBuf>,
    },
    /// Open a sealed JSON envelope with the RSA private key
    Open {
        #[arg(long)]
        key: PathBuf,
        #[arg(long, env = "YACA_PASSWORD")]
        password: Option<String>,
        #[arg(long = "in")]
        input: Option<PathBuf>,
    },
    /// Base64 signature with an RSA, DSA or EC private key
    Sign {
        #[arg(long = "type")]
        key_type: KeyType,
        #[arg(long)]
        key: PathBuf,
        #[arg(long, env = "YACA_PASSWORD")]
        password: Option<String>,
        #[arg(long, default_value = "sha256")]
        digest: DigestAlgorithm,
        /// RSA only: pkcs1, pkcs1-pss or x931
        #[arg(long)]
        padding: Option<Padding>,
        #[arg(long = "in")]
        input: Option<PathBuf>,
    },
    /// Check a base64 signature; exits non-zero on mismatch
    Verify {
        #[arg(long = "type")]
        key_type: KeyType,
        #[arg(long)]
        key: PathBuf,
        #[arg(long, default_value = "sha256")]
        digest: DigestAlgorithm,
        #[arg(long)]
        padding: Option<Padding>,
        #[arg(long)]
        signature: String,
        #[arg(long = "in")]
        input: Option<PathBuf>,
    },
    /// Config helpers
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCmd {
    /// Show the effective engine config (file, env, flags)
    Show,
    /// Write a yaca.toml template with the defaults
    WriteTemplate {
        #[arg(long, default_value = "yaca.toml")]
        path: PathBuf,
        #[arg(long)]
        force: bool,
    },
}

/// Symmetric ciphertext plus everything needed to decrypt it.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    algorithm: String,
    mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key_bits: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encrypted_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iv: Option<String>,
    data: String,
}

impl Envelope {
    fn algorithm(&self) -> anyhow::Result<EncryptAlgorithm> {
        Ok(self.algorithm.parse()?)
    }

    fn mode(&self) -> anyhow::Result<BlockCipherMode> {
        Ok(self.mode.parse()?)
    }

    fn iv(&self) -> anyhow::Result<Option<Key>> {
        self.iv
            .as_deref()
            .map(|iv| Ok(Key::from_bytes(KeyType::Iv, &B64.decode(iv).context("iv is not base64")?)?))
            .transpose()
    }

    fn data(&self) -> anyhow::Result<Vec<u8>> {
        B64.decode(&self.data).context("data is not base64")
    }
}

fn resolve_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut cfg = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::default(),
    };
    cfg.apply_env()?;
    if let Some(level) = &cli.log_level {
        cfg.log_level = level.clone();
    }
    if let Some(iterations) = cli.pkcs8_iterations {
        cfg.pkcs8_iterations = iterations;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn read_input(path: Option<&Path>) -> anyhow::Result<Vec<u8>> {
    match path {
        Some(p) => std::fs::read(p).with_context(|| format!("failed to read {}", p.display())),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf).context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn read_key(engine: &Engine, key_type: KeyType, path: &Path, password: Option<&str>) -> anyhow::Result<Key> {
    let blob = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let blob = if key_type.is_simple() { trim_ascii_end(&blob) } else { &blob[..] };
    engine
        .import_key(key_type, password, blob)
        .with_context(|| format!("cannot import {key_type} key from {}", path.display()))
}

fn trim_ascii_end(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(0, |i| i + 1);
    // raw binary keys may end in whitespace bytes; only trim text that decodes
    if B64.decode(&bytes[..end]).is_ok() {
        &bytes[..end]
    } else {
        bytes
    }
}

fn write_out(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

fn symmetric_type(algorithm: EncryptAlgorithm) -> KeyType {
    if algorithm.is_des_family() {
        KeyType::Des
    } else {
        KeyType::Symmetric
    }
}

fn generate_iv(engine: &Engine, algorithm: EncryptAlgorithm, mode: BlockCipherMode, key: &Key) -> anyhow::Result<Option<Key>> {
    match engine.iv_bit_length(algorithm, mode, key.bit_length())? {
        0 => Ok(None),
        bits => Ok(Some(engine.generate_key(KeyType::Iv, KeyBitLength::Bits(bits))?)),
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = resolve_config(&cli)?;
    init_tracing(&cfg.log_level);
    debug!(?cfg, "configuration resolved");

    if let Commands::Config { action } = &cli.command {
        return run_config(action, &cfg);
    }
    let engine = Engine::new(cfg)?;

    match cli.command {
        Commands::Keygen { key_type, length, format, file_format, password, out } => {
            let key = engine.generate_key(key_type, length)?;
            let bytes = engine.export_key(&key, format, file_format, password.as_deref())?;
            write_out(&out, &bytes)?;
            info!(%key_type, bits = key.bit_length(), path = %out.display(), "key written");
        }
        Commands::Pubkey { key_type, input, password, file_format, out } => {
            let key = read_key(&engine, key_type, &input, password.as_deref())?;
            let public = key.extract_public()?;
            write_out(&out, &engine.export_key(&public, KeyFormat::Default, file_format, None)?)?;
        }
        Commands::Digest { algorithm, input } => {
            let data = read_input(input.as_deref())?;
            println!("{}", hex::encode(engine.simple_calculate_digest(algorithm, &data)?));
        }
        Commands::Encrypt { algorithm, mode, key, input } => {
            let key = read_key(&engine, symmetric_type(algorithm), &key, None)?;
            let iv = generate_iv(&engine, algorithm, mode, &key)?;
            let data = read_input(input.as_deref())?;
            let ct = engine.simple_encrypt(algorithm, mode, &key, iv.as_ref(), &data)?;
            print_json(&Envelope {
                algorithm: algorithm.to_string(),
                mode: mode.to_string(),
                key_bits: None,
                encrypted_key: None,
                iv: iv.map(|iv| iv.secret_bytes().map(|b| B64.encode(b))).transpose()?,
                data: B64.encode(ct),
            })?;
        }
        Commands::Decrypt { key, input } => {
            let envelope: Envelope = serde_json::from_slice(&read_input(input.as_deref())?)?;
            let algorithm = envelope.algorithm()?;
            let key = read_key(&engine, symmetric_type(algorithm), &key, None)?;
            let pt = engine.simple_decrypt(algorithm, envelope.mode()?, &key, envelope.iv()?.as_ref(), &envelope.data()?)?;
            std::io::stdout().lock().write_all(&pt)?;
        }
        Commands::Seal { pubkey, algorithm, mode, key_bits, input } => {
            let public = read_key(&engine, KeyType::RsaPublic, &pubkey, None)?;
            let data = read_input(input.as_deref())?;
            let mut seal = engine.seal_initialize(&public, algorithm, mode, key_bits)?;
            let mut ct = seal.context.update(&data)?;
            ct.extend(seal.context.finalize()?);
            print_json(&Envelope {
                algorithm: algorithm.to_string(),
                mode: mode.to_string(),
                key_bits: Some(key_bits),
                encrypted_key: Some(B64.encode(seal.encrypted_key.secret_bytes()?)),
                iv: seal.iv.as_ref().map(|iv| iv.secret_bytes().map(|b| B64.encode(b))).transpose()?,
                data: B64.encode(ct),
            })?;
        }
        Commands::Open { key, password, input } => {
            let private = read_key(&engine, KeyType::RsaPrivate, &key, password.as_deref())?;
            let envelope: Envelope = serde_json::from_slice(&read_input(input.as_deref())?)?;
            let key_bits = envelope.key_bits.ok_or_else(|| anyhow!("envelope has no key_bits"))?;
            let encrypted = envelope.encrypted_key.as_deref().ok_or_else(|| anyhow!("envelope has no encrypted_key"))?;
            let encrypted = Key::from_bytes(KeyType::Symmetric, &B64.decode(encrypted).context("encrypted_key is not base64")?)?;
            let mut ctx = engine.open_initialize(
                &private,
                envelope.algorithm()?,
                envelope.mode()?,
                key_bits,
                &encrypted,
                envelope.iv()?.as_ref(),
            )?;
            let mut pt = ctx.update(&envelope.data()?)?;
            pt.extend(ctx.finalize()?);
            std::io::stdout().lock().write_all(&pt)?;
        }
        Commands::Sign { key_type, key, password, digest, padding, input } => {
            let key = read_key(&engine, key_type, &key, password.as_deref())?;
            let data = read_input(input.as_deref())?;
            let mut ctx = engine.sign_initialize(digest, &key)?;
            if let Some(padding) = padding {
                ctx.set_padding(padding)?;
            }
            ctx.update(&data)?;
            println!("{}", B64.encode(ctx.finalize()?));
        }
        Commands::Verify { key_type, key, digest, padding, signature, input } => {
            let key = read_key(&engine, key_type, &key, None)?;
            let signature = B64.decode(signature.trim()).context("signature is not base64")?;
            let data = read_input(input.as_deref())?;
            let mut ctx = engine.verify_initialize(digest, &key)?;
            if let Some(padding) = padding {
                ctx.set_padding(padding)?;
            }
            ctx.update(&data)?;
            match ctx.finalize(&signature) {
                Ok(()) => println!("{}", json!({ "ok": true })),
                Err(e) if e.kind() == yaca_crypto::ErrorKind::DataMismatch => {
                    println!("{}", json!({ "ok": false }));
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Config { .. } => {}
    }
    Ok(())
}

fn run_config(action: &ConfigCmd, cfg: &EngineConfig) -> anyhow::Result<()> {
    match action {
        ConfigCmd::Show => print_json(cfg),
        ConfigCmd::WriteTemplate { path, force } => {
            if path.exists() && !force {
                bail!("{} exists (use --force to overwrite)", path.display());
            }
            let body = toml::to_string_pretty(&EngineConfig::default())?;
            write_out(path, format!("# yaca engine configuration\n{body}").as_bytes())?;
            println!("{}", json!({ "ok": true, "path": path.display().to_string() }));
            Ok(())
        }
    }
}
