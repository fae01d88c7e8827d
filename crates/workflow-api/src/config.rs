//! Server configuration loaded from environment variables.
//!
//! No config file format is introduced — `DATABASE_URL`, `BIND_ADDR`, and
//! `RUST_LOG` are the only knobs (§7.2).

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub database_url: String,
    pub bind_addr: String,
}

impl ApiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable required"))?;
        let bind_addr =
            std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        Ok(Self {
            database_url,
            bind_addr,
        })
    }
}
