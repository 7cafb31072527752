// File: pos-sync/src/compression.rs
// Purpose: Request body compression for large sync batches

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Compression configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Enable compression
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Minimum body size in bytes to trigger compression
    #[serde(default = "default_threshold")]
    pub threshold: usize,
    /// Compression level (0-9, where 6 is default)
    #[serde(default = "default_level")]
    pub level: u32,
}

fn default_enabled() -> bool {
    true
}

fn default_threshold() -> usize {
    16 * 1024
}

fn default_level() -> u32 {
    6
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            threshold: default_threshold(),
            level: default_level(),
        }
    }
}

impl CompressionConfig {
    pub fn new(enabled: bool, threshold: usize, level: u32) -> Self {
        Self {
            enabled,
            threshold,
            level: level.min(9),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            threshold: usize::MAX,
            level: 0,
        }
    }
}

/// Compress data using gzip
pub fn compress(data: &[u8], level: u32) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decompress gzip data, refusing output larger than `limit` bytes
pub fn decompress(data: &[u8], limit: usize) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data).take(limit as u64 + 1);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    if decompressed.len() > limit {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("decompressed body exceeds {} bytes", limit),
        ));
    }
    Ok(decompressed)
}

/// Decide whether to compress based on config and data size
pub fn should_compress(config: &CompressionConfig, data_size: usize) -> bool {
    config.enabled && data_size >= config.threshold
}

/// A request body, gzipped when that pays off
#[derive(Debug)]
pub enum Body {
    Gzip(Vec<u8>),
    Plain(Vec<u8>),
}

impl Body {
    /// Encode `json`, compressing only above threshold and only if smaller
    pub fn encode(json: Vec<u8>, config: &CompressionConfig) -> std::io::Result<Self> {
        if should_compress(config, json.len()) {
            let compressed = compress(&json, config.level)?;
            if compressed.len() < json.len() {
                return Ok(Body::Gzip(compressed));
            }
        }
        Ok(Body::Plain(json))
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, Body::Gzip(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Body::Gzip(data) | Body::Plain(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Body::Gzip(data) | Body::Plain(data) => data,
        }
    }
}
