// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::cfg::logger::LoggerConfig;

/// Build-time cache configuration: capacity ceilings and feature toggles.
/// Loaded once, at cache construction, and never mutated afterwards.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_true", rename = "CachingEnabled")]
    /// Whether the cache persists and reuses discovered databases at all.
    /// When `false`, every connection performs full discovery and nothing
    /// is read from or written to the persistence backend.
    pub caching_enabled: bool,

    #[serde(rename = "MaxConnections")]
    /// Upper bound on simultaneously tracked peer connections.
    pub max_connections: usize,

    #[serde(rename = "MaxServices")]
    /// Per-peer ceiling on discovered services (primary + secondary).
    pub max_services: usize,

    #[serde(rename = "MaxIncludedServices")]
    /// Per-peer ceiling on discovered include relationships.
    pub max_included_services: usize,

    #[serde(rename = "MaxCharacteristics")]
    /// Per-peer ceiling on discovered characteristics.
    pub max_characteristics: usize,

    #[serde(rename = "MaxDescriptors")]
    /// Per-peer ceiling on discovered descriptors.
    pub max_descriptors: usize,

    #[serde(default = "default_true", rename = "IncludeServicesEnabled")]
    /// Whether the Discovery Driver runs the included-service phase at
    /// all. Disabling it skips INC_DISC and goes straight from service
    /// discovery to characteristic discovery.
    pub include_services_enabled: bool,

    #[serde(default, rename = "DisableAutoRediscovery")]
    /// When set, a Service-Changed indication is recorded but does not by
    /// itself trigger `GattCache::update`'s rediscovery; the host stack is
    /// expected to call it explicitly instead.
    pub disable_auto_rediscovery: bool,

    #[serde(default)]
    pub logger: LoggerConfig,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Config {
            caching_enabled: true,
            max_connections: 8,
            max_services: 64,
            max_included_services: 32,
            max_characteristics: 256,
            max_descriptors: 256,
            include_services_enabled: true,
            disable_auto_rediscovery: false,
            logger: LoggerConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config = serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates capacity invariants; there is nothing to normalize beyond
    /// that, since every field here is a plain scalar.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(self.max_connections >= 1, "MaxConnections must be >= 1");
        ensure!(self.max_services >= 1, "MaxServices must be >= 1");
        ensure!(
            self.max_characteristics >= 1,
            "MaxCharacteristics must be >= 1"
        );
        Ok(())
    }
}
