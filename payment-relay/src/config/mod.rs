use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Payment gateway credentials and endpoint.
///
/// The secret key is exchanged for a Basic credential once, at client
/// construction; nothing reads it afterwards.
#[derive(Deserialize, Clone, Debug)]
pub struct GatewayConfig {
    pub secret_key: Secret<String>,
    pub api_base_url: String,
    pub timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("RELAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("RELAY_PORT")
            .unwrap_or_else(|_| "4000".to_string())
            .parse()?;

        let db_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
        let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;
        let min_connections = env::var("DATABASE_MIN_CONNECTIONS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()?;

        let secret_key = env::var("GATEWAY_SECRET_KEY")
            .map_err(|_| anyhow::anyhow!("GATEWAY_SECRET_KEY must be set"))?;
        let api_base_url = env::var("GATEWAY_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.tosspayments.com".to_string());
        // A wedged gateway must not hold requests open indefinitely.
        let timeout_seconds = env::var("GATEWAY_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()?;

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                max_connections,
                min_connections,
            },
            gateway: GatewayConfig {
                secret_key: Secret::new(secret_key),
                api_base_url,
                timeout_seconds,
            },
            service_name: "payment-relay".to_string(),
        })
    }
}
