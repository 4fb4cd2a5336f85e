use ipnetwork::IpNetwork;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which adapters back the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// PostgreSQL + MongoDB + Redis
    External,
    /// In-process stores, nothing persisted
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "external" | "" => Ok(StoreBackend::External),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(anyhow::anyhow!(
                "Unknown STORE_BACKEND '{}', expected 'external' or 'memory'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub mongo_uri: String,
    pub mongo_database: String,
    pub mongo_collection: String,
    pub redis_url: String,
    pub telemetry_key_prefix: String,
    pub registry_host: String,
    pub registry_port: u16,
    pub max_connections: u32,
    pub store_timeout: Duration,
    pub enrichment_concurrency: usize,
    pub store_backend: StoreBackend,
    pub admin_token: Option<String>,
    pub allowed_admin_ips: Vec<IpNetwork>,
    pub log_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // Build database_url from individual fields or use DATABASE_URL if provided
        let database_url = if let Ok(url) = env::var("DATABASE_URL") {
            url
        } else {
            let db_host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
            let db_port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
            let db_name = env::var("DB_NAME").unwrap_or_else(|_| "sensors".to_string());
            let db_user = env::var("DB_USER").unwrap_or_else(|_| "sensors".to_string());
            let db_password = env::var("DB_PASSWORD").unwrap_or_else(|_| "password".to_string());

            // URL-encode password to handle special characters
            let encoded_password = urlencoding::encode(&db_password);

            format!(
                "postgres://{}:{}@{}:{}/{}",
                db_user, encoded_password, db_host, db_port, db_name
            )
        };

        let mongo_uri =
            env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let mongo_database = env::var("MONGO_DATABASE").unwrap_or_else(|_| "SensorsDB".to_string());
        let mongo_collection =
            env::var("MONGO_COLLECTION").unwrap_or_else(|_| "Sensors".to_string());

        let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let telemetry_key_prefix =
            env::var("TELEMETRY_KEY_PREFIX").unwrap_or_else(|_| "sensor:".to_string());

        let registry_host = env::var("REGISTRY_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let registry_port = parse_or("REGISTRY_PORT", 8000);

        let max_connections = parse_or("MAX_CONNECTIONS", 10);
        let store_timeout_ms: u64 = parse_or("STORE_TIMEOUT_MS", 5000);
        let enrichment_concurrency: usize = parse_or("ENRICHMENT_CONCURRENCY", 16);

        let store_backend = env::var("STORE_BACKEND")
            .unwrap_or_default()
            .parse::<StoreBackend>()?;

        // Admin routes stay unmounted without a token
        let admin_token = env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty());

        let allowed_admin_ips = parse_networks(
            &env::var("ALLOWED_ADMIN_IPS").unwrap_or_else(|_| "127.0.0.0/8,::1/128".to_string()),
        );

        let log_dir = env::var("LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/var/log/sensor-registry"));

        Ok(Config {
            database_url,
            mongo_uri,
            mongo_database,
            mongo_collection,
            redis_url,
            telemetry_key_prefix,
            registry_host,
            registry_port,
            max_connections,
            store_timeout: Duration::from_millis(store_timeout_ms),
            enrichment_concurrency: enrichment_concurrency.max(1),
            store_backend,
            admin_token,
            allowed_admin_ips,
            log_dir,
        })
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.registry_host, self.registry_port);
        addr.parse()
            .map_err(|e| anyhow::anyhow!("Invalid socket address: {}", e))
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parse a comma-separated list of CIDR networks, skipping invalid entries
fn parse_networks(list: &str) -> Vec<IpNetwork> {
    list.split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                IpNetwork::from_str(trimmed).ok()
            }
        })
        .collect()
}
