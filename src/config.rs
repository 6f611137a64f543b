use anyhow::{Context, Result};
use chrono::Duration;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

use crate::geocode::GOOGLE_GEOCODE_URL;

const DEFAULT_SECRETS_PATH: &str = "./secrets.json";
const DEFAULT_TABLE: &str = "pontos_de_onibus";

#[derive(Clone, Debug)]
pub struct Config {
    pub supabase_url: String,
    pub supabase_key: String,
    pub google_maps_api_key: String,
    pub table_name: String,
    pub geocode_url: String,
    pub port: u16,
    pub data_dir: String,
    pub row_cache_ttl: Duration,
    pub geocode_cache_ttl: Duration,
    pub geocode_concurrency: usize,
}

impl Config {
    /// Secrets come from the JSON secrets file first, then the environment.
    /// Missing secrets are left empty and fail at request time.
    pub fn load() -> Result<Self> {
        let path = std::env::var("SECRETS_PATH").unwrap_or_else(|_| DEFAULT_SECRETS_PATH.into());
        let secrets = read_secrets(Path::new(&path))?;
        Ok(Self::from_sources(&secrets, |k| std::env::var(k).ok()))
    }

    pub fn from_sources(
        secrets: &HashMap<String, String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let secret = |k: &str| {
            secrets
                .get(k)
                .cloned()
                .or_else(|| env(k))
                .unwrap_or_default()
        };
        let var = |k: &str, default: &str| env(k).unwrap_or_else(|| default.to_string());

        Self {
            supabase_url: secret("SUPABASE_URL"),
            supabase_key: secret("SUPABASE_KEY"),
            google_maps_api_key: secret("GOOGLE_MAPS_API_KEY"),
            table_name: var("TABLE_NAME", DEFAULT_TABLE),
            geocode_url: var("GEOCODE_URL", GOOGLE_GEOCODE_URL),
            port: parse_or(&env, "PORT", 3000),
            data_dir: var("DATA_DIR", "./data"),
            row_cache_ttl: Duration::seconds(parse_or(&env, "ROW_CACHE_TTL_SECS", 300)),
            geocode_cache_ttl: Duration::seconds(parse_or(&env, "GEOCODE_CACHE_TTL_SECS", 86_400)),
            geocode_concurrency: parse_or(&env, "GEOCODE_CONCURRENCY", 4),
        }
    }
}

fn parse_or<T: FromStr + Copy>(env: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match env(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Unparsable setting, using default");
            default
        }),
        None => default,
    }
}

fn read_secrets(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading secrets file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing secrets file {}", path.display()))
}
