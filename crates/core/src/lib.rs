pub mod cache;
pub mod domain;
pub mod features;
pub mod ingest;
pub mod ranking;
pub mod time;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone, Default)]
    pub struct Settings {
        pub sentry_dsn: Option<String>,
        pub price_provider: Option<String>,
        pub price_provider_base_url: Option<String>,
        pub price_provider_api_key: Option<String>,
        pub cors_allow_origins: Option<String>,
        pub cors_allow_credentials: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                price_provider: std::env::var("PRICE_PROVIDER").ok(),
                price_provider_base_url: std::env::var("PRICE_PROVIDER_BASE_URL").ok(),
                price_provider_api_key: std::env::var("PRICE_PROVIDER_API_KEY").ok(),
                cors_allow_origins: std::env::var("CORS_ALLOW_ORIGINS").ok(),
                cors_allow_credentials: std::env::var("CORS_ALLOW_CREDENTIALS").ok(),
            })
        }

        pub fn require_price_provider_base_url(&self) -> anyhow::Result<&str> {
            self.price_provider_base_url
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .context("PRICE_PROVIDER_BASE_URL is required")
        }

        /// Defaults to true; accepts the usual spellings of false.
        pub fn cors_allow_credentials(&self) -> bool {
            match self.cors_allow_credentials.as_deref() {
                None => true,
                Some(v) => !matches!(
                    v.trim().to_ascii_lowercase().as_str(),
                    "0" | "false" | "no" | "off"
                ),
            }
        }
    }
}
