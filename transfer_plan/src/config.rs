/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Configuration for transfer planning and bandwidth calculation.
//!
//! Settings come from defaults, environment variables, or a YAML file,
//! and can be layered with [`PlanConfig::merge`].

use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

pub const PREFER_HOST_TIMING_ENV: &str = "TRANSFER_PLAN_PREFER_HOST_TIMING";
pub const SKIP_FINE_GRAIN_ENV: &str = "TRANSFER_PLAN_SKIP_FINE_GRAIN";
pub const WARMUP_ITERATIONS_ENV: &str = "TRANSFER_PLAN_WARMUP_ITERATIONS";
pub const SIZES_ENV: &str = "TRANSFER_PLAN_SIZES";

/// Payload sizes tested by default: every power of two from 1 KiB to 512 MiB.
pub fn default_sizes() -> Vec<usize> {
    (10..=29).map(|shift| 1usize << shift).collect()
}

/// Configuration for a planning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    /// Report host-measured time even for transactions involving an
    /// accelerator.
    pub prefer_host_timing: bool,
    /// All-pools sweeps exclude fine-grained host pools instead of
    /// coarse-grained ones.
    pub skip_fine_grain: bool,
    /// Leading iterations discarded when reducing timing samples.
    pub warmup_iterations: usize,
    /// Tested payload sizes in bytes.
    pub sizes: Vec<usize>,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            prefer_host_timing: false,
            skip_fine_grain: false,
            warmup_iterations: 1,
            sizes: default_sizes(),
        }
    }
}

/// A partial configuration; set fields take precedence when merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfigOverrides {
    pub prefer_host_timing: Option<bool>,
    pub skip_fine_grain: Option<bool>,
    pub warmup_iterations: Option<usize>,
    pub sizes: Option<Vec<usize>>,
}

impl PlanConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables on top of defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.merge(&PlanConfigOverrides::from_env());
        config
    }

    /// Load configuration from a YAML file. Missing keys keep defaults.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let config: PlanConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), anyhow::Error> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Merge overrides into this configuration
    pub fn merge(&mut self, overrides: &PlanConfigOverrides) {
        if let Some(value) = overrides.prefer_host_timing {
            self.prefer_host_timing = value;
        }
        if let Some(value) = overrides.skip_fine_grain {
            self.skip_fine_grain = value;
        }
        if let Some(value) = overrides.warmup_iterations {
            self.warmup_iterations = value;
        }
        if let Some(value) = &overrides.sizes {
            self.sizes = value.clone();
        }
    }
}

impl PlanConfigOverrides {
    /// Collect overrides from environment variables. Values that fail to
    /// parse are logged and ignored.
    pub fn from_env() -> Self {
        let mut overrides = Self::default();

        if let Ok(val) = env::var(PREFER_HOST_TIMING_ENV) {
            match parse_bool(&val) {
                Some(parsed) => overrides.prefer_host_timing = Some(parsed),
                None => log_invalid(PREFER_HOST_TIMING_ENV, &val),
            }
        }

        // Presence alone enables the switch.
        if env::var_os(SKIP_FINE_GRAIN_ENV).is_some() {
            overrides.skip_fine_grain = Some(true);
        }

        if let Ok(val) = env::var(WARMUP_ITERATIONS_ENV) {
            match val.trim().parse::<usize>() {
                Ok(parsed) => overrides.warmup_iterations = Some(parsed),
                Err(_) => log_invalid(WARMUP_ITERATIONS_ENV, &val),
            }
        }

        if let Ok(val) = env::var(SIZES_ENV) {
            match parse_sizes(&val) {
                Some(parsed) => overrides.sizes = Some(parsed),
                None => log_invalid(SIZES_ENV, &val),
            }
        }

        overrides
    }
}

fn log_invalid(env_var: &str, val: &str) {
    tracing::error!(
        "ignoring invalid value \"{}\" in ${}; keeping the configured value",
        val,
        env_var,
    );
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_sizes(val: &str) -> Option<Vec<usize>> {
    let sizes = val
        .split(',')
        .map(|part| part.trim().parse::<usize>().ok().filter(|size| *size > 0))
        .collect::<Option<Vec<_>>>()?;
    if sizes.is_empty() { None } else { Some(sizes) }
}
