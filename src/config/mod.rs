use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Base URL of the hosted profile-analysis API
    #[serde(default = "default_enrichment_api_url")]
    pub enrichment_api_url: String,

    /// Directory holding the on-device profile cache blob
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_enrichment_api_url() -> String {
    "https://fastapi-drab-iota.vercel.app".to_string()
}

fn default_cache_dir() -> String {
    "./data".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
