#![forbid(unsafe_code)]

//! The engine handle every operation hangs off.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::provider::{Provider, RustCryptoProvider};
use crate::util;
use std::sync::Arc;
use tracing::info;

/// Holds the primitive provider and configuration shared by all contexts.
///
/// Cloning is cheap; clones share the provider.
#[derive(Debug, Clone)]
pub struct Engine {
    provider: Arc<dyn Provider>,
    config: Arc<EngineConfig>,
}

impl Default for Engine {
    fn default() -> Self {
        Self { provider: Arc::new(RustCryptoProvider), config: Arc::new(EngineConfig::default()) }
    }
}

impl Engine {
    /// Engine over [`RustCryptoProvider`] with a validated configuration.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_provider(config, Arc::new(RustCryptoProvider))
    }

    /// Engine over a caller-supplied provider.
    pub fn with_provider(config: EngineConfig, provider: Arc<dyn Provider>) -> Result<Self> {
        config.validate()?;
        info!(provider = ?provider, pkcs8_iterations = config.pkcs8_iterations, "engine ready");
        Ok(Self { provider, config: Arc::new(config) })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// `len` random bytes from the provider.
    pub fn random_bytes(&self, len: usize) -> Result<Vec<u8>> {
        let mut buf = util::zalloc(len)?;
        self.provider.random_bytes(&mut buf)?;
        Ok(buf)
    }
}
