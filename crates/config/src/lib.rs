use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// `AppConfig` holds every setting the order bot needs at startup.
///
/// Values come from environment variables (optionally via a `.env` file) and
/// fall back to the defaults set in [`AppConfig::load`]. Secrets default to
/// empty strings so that a local run starts without them; the outbound calls
/// that need them will then fail and be reported to the customer.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AppConfig {
    // --- HTTP server ---
    /// The port on which the HTTP server will listen.
    pub http_port: u16,
    /// Graceful shutdown timeout (human-friendly format, e.g. "5s", "1m").
    #[serde(deserialize_with = "deserialize_duration")]
    pub shutdown_timeout: Duration,
    /// Upper bound for every outbound HTTP call (messaging, payments, carrier, ledger).
    #[serde(deserialize_with = "deserialize_duration")]
    pub outbound_timeout: Duration,

    // --- Messaging platform ---
    pub whatsapp_api_base: String,
    pub whatsapp_phone_number_id: String,
    pub whatsapp_access_token: String,
    /// Shared secret echoed back during the webhook verification handshake.
    pub whatsapp_verify_token: String,
    /// Id of the delivery-details form sent after a catalog selection.
    pub whatsapp_flow_id: String,

    // --- Payment links ---
    pub razorpay_api_base: String,
    pub razorpay_key_id: String,
    pub razorpay_key_secret: String,
    /// HMAC secret used to authenticate payment webhooks.
    pub razorpay_webhook_secret: String,
    /// Lifetime of a hosted payment link. The provider rejects anything under 15 minutes.
    #[serde(deserialize_with = "deserialize_duration")]
    pub payment_link_expiry: Duration,
    pub currency: String,

    // --- Logistics carrier ---
    pub delhivery_api_base: String,
    pub delhivery_token: String,
    /// Pincode of the warehouse shipments are picked up from.
    pub origin_pincode: String,
    /// Registered pickup location name at the carrier.
    pub pickup_location: String,

    // --- Pricing ---
    /// Cash-on-delivery handling fee in minor units.
    pub cod_fee_minor: i64,
    pub default_country_code: String,
    /// Optional JSON file with the product table; the built-in table is used when empty.
    pub catalog_path: String,

    // --- Ledger ---
    /// One of "sheets", "postgres" or "log".
    pub ledger_backend: String,
    pub sheets_api_base: String,
    pub sheets_spreadsheet_id: String,
    pub sheets_range: String,
    pub sheets_access_token: String,

    // --- Database (postgres ledger backend only) ---
    pub db_host: String,
    pub db_port: u16,
    pub db_user: String,
    pub db_password: String,
    pub db_name: String,
}

/// Accepts human-readable durations like "5s", "20m".
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let val = String::deserialize(deserializer)?;
    humantime::parse_duration(&val)
        .map_err(|e| D::Error::custom(format!("Invalid duration '{val}': {e}")))
}

impl AppConfig {
    /// Loads configuration from environment variables (and optionally from a `.env` file).
    ///
    /// # Errors
    /// Returns an error if a variable cannot be parsed into its field type.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            // HTTP
            .set_default("http_port", 8080)?
            .set_default("shutdown_timeout", "5s")?
            .set_default("outbound_timeout", "10s")?
            // Messaging
            .set_default("whatsapp_api_base", "https://graph.facebook.com/v19.0")?
            .set_default("whatsapp_phone_number_id", "")?
            .set_default("whatsapp_access_token", "")?
            .set_default("whatsapp_verify_token", "")?
            .set_default("whatsapp_flow_id", "")?
            // Payments
            .set_default("razorpay_api_base", "https://api.razorpay.com/v1")?
            .set_default("razorpay_key_id", "")?
            .set_default("razorpay_key_secret", "")?
            .set_default("razorpay_webhook_secret", "")?
            .set_default("payment_link_expiry", "20m")?
            .set_default("currency", "INR")?
            // Logistics
            .set_default("delhivery_api_base", "https://track.delhivery.com")?
            .set_default("delhivery_token", "")?
            .set_default("origin_pincode", "110001")?
            .set_default("pickup_location", "Primary Warehouse")?
            // Pricing
            .set_default("cod_fee_minor", 15000)?
            .set_default("default_country_code", "91")?
            .set_default("catalog_path", "")?
            // Ledger
            .set_default("ledger_backend", "log")?
            .set_default("sheets_api_base", "https://sheets.googleapis.com")?
            .set_default("sheets_spreadsheet_id", "")?
            .set_default("sheets_range", "Orders!A1")?
            .set_default("sheets_access_token", "")?
            // Database
            .set_default("db_host", "localhost")?
            .set_default("db_port", 5432)?
            .set_default("db_user", "orderbot")?
            .set_default("db_password", "orderbot")?
            .set_default("db_name", "orderbot")?
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        settings
            .try_deserialize()
            .context("Failed to load configuration")
    }

    /// Postgres connection string for the ledger database.
    pub fn database_dsn(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={} sslmode=disable",
            self.db_host, self.db_port, self.db_user, self.db_password, self.db_name
        )
    }
}
