use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use dotenvy::dotenv;

use crate::proxy::{self, ProxyEndpoint};

/// Runtime configuration, loaded once at startup from the environment
/// (with `.env` support for development).
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub domains_file: PathBuf,
    pub products_file: PathBuf,
    pub output_dir: PathBuf,
    pub checkpoint_db: PathBuf,
    pub max_workers: usize,
    pub proxies: Vec<ProxyEndpoint>,
}

impl ScraperConfig {
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            domains_file: var_or("DOMAINS_FILE", "data/domains.csv").into(),
            products_file: var_or("PRODUCTS_FILE", "data/products.csv").into(),
            output_dir: var_or("OUTPUT_DIR", "data/output").into(),
            checkpoint_db: var_or("CHECKPOINT_DB", "checkpoint.db").into(),
            max_workers: var_or("MAX_WORKERS", "3")
                .parse()
                .context("MAX_WORKERS must be a number")?,
            proxies: proxy::from_env(),
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
