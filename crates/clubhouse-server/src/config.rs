use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

use clubhouse_types::models::PaymentProvider;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

pub struct Config {
    pub jwt_secret: String,
    pub code_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub notify_url: Option<String>,
    pub refund_urls: HashMap<PaymentProvider, String>,
    pub bootstrap_admin: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let set = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = set("CLUB_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("CLUB_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }
        let code_secret = set("CLUB_CODE_SECRET").unwrap_or_else(|| jwt_secret.clone());

        let host = set("CLUB_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = set("CLUB_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("CLUB_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let refund_urls = [
            (PaymentProvider::Stripe, "CLUB_REFUND_URL_STRIPE"),
            (PaymentProvider::Mollie, "CLUB_REFUND_URL_MOLLIE"),
            (PaymentProvider::Paypal, "CLUB_REFUND_URL_PAYPAL"),
        ]
        .into_iter()
        .filter_map(|(provider, key)| set(key).map(|url| (provider, url)))
        .collect();

        Ok(Self {
            jwt_secret,
            code_secret,
            db_path: set("CLUB_DB_PATH").unwrap_or_else(|| "clubhouse.db".into()).into(),
            addr,
            notify_url: set("CLUB_NOTIFY_URL"),
            refund_urls,
            bootstrap_admin: set("CLUB_BOOTSTRAP_ADMIN"),
        })
    }
}
