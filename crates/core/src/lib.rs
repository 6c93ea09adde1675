pub mod domain;
pub mod peers;
pub mod pipeline;
pub mod prices;
pub mod reference;
pub mod storage;

pub mod config {
    use anyhow::Context;

    pub const DEFAULT_REFERENCE_TABLE_PATH: &str = "bse.csv";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub reference_table_path: Option<String>,
        pub peer_provider_base_url: Option<String>,
        pub peer_provider_timeout_secs: Option<u64>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let peer_provider_timeout_secs = match std::env::var("PEER_PROVIDER_TIMEOUT_SECS") {
                Ok(s) => Some(
                    s.trim()
                        .parse::<u64>()
                        .with_context(|| format!("PEER_PROVIDER_TIMEOUT_SECS is not a number: {s}"))?,
                ),
                Err(_) => None,
            };

            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                reference_table_path: std::env::var("REFERENCE_TABLE_PATH").ok(),
                peer_provider_base_url: std::env::var("PEER_PROVIDER_BASE_URL")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                peer_provider_timeout_secs,
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn reference_table_path(&self) -> &str {
            self.reference_table_path
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(DEFAULT_REFERENCE_TABLE_PATH)
        }
    }
}
