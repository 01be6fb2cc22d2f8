//! Order bot entry point.
//!
//! Wires the messaging, payment-link and carrier clients, the ledger backend
//! and the in-memory session store into the commerce service, then serves
//! the webhook endpoints until a shutdown signal arrives.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use app_config::AppConfig;
use clients::{DelhiveryClient, RazorpayClient, WhatsAppClient, build_http_client};
use repository::{LedgerRepository, LogLedgerRepository, PgLedgerRepository, SheetsLedgerRepository};
use server::Server;
use service::{Catalog, CheckoutSettings, CommerceServiceImpl};
use store::SessionStore;

const MIGRATIONS_DIR: &str = "migrations";

/// Initialize the tracing subscriber; `RUST_LOG` overrides the default level.
fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_catalog(config: &AppConfig) -> Result<Catalog> {
    if config.catalog_path.is_empty() {
        info!("Using built-in product catalog");
        return Ok(Catalog::builtin());
    }
    let catalog = Catalog::from_file(Path::new(&config.catalog_path))?;
    if catalog.is_empty() {
        bail!("Catalog file {} has no products", config.catalog_path);
    }
    info!(products = catalog.len(), path = %config.catalog_path, "Product catalog loaded");
    Ok(catalog)
}

async fn ledger_backend(
    config: &AppConfig,
    http: &clients::HttpClient,
) -> Result<Arc<dyn LedgerRepository>> {
    match config.ledger_backend.as_str() {
        "sheets" => {
            info!(spreadsheet = %config.sheets_spreadsheet_id, "Ledger backend: Google Sheets");
            Ok(Arc::new(SheetsLedgerRepository::new(
                http.clone(),
                config.sheets_api_base.clone(),
                config.sheets_spreadsheet_id.clone(),
                config.sheets_range.clone(),
                config.sheets_access_token.clone(),
            )))
        }
        "postgres" => {
            let pool = db::init_db_pool(config, Path::new(MIGRATIONS_DIR))
                .await
                .context("Failed to initialize ledger database")?;
            info!("Ledger backend: Postgres");
            Ok(Arc::new(PgLedgerRepository::new(pool)))
        }
        "log" => {
            warn!("Ledger backend: log only, rows are not persisted");
            Ok(Arc::new(LogLedgerRepository))
        }
        other => bail!("Unknown ledger backend {other:?}, expected sheets, postgres or log"),
    }
}

fn checkout_settings(config: &AppConfig) -> CheckoutSettings {
    if config.razorpay_webhook_secret.is_empty() {
        warn!("RAZORPAY_WEBHOOK_SECRET is empty, every payment notification will be rejected");
    }
    CheckoutSettings {
        form_id: config.whatsapp_flow_id.clone(),
        origin_pincode: config.origin_pincode.clone(),
        pickup_location: config.pickup_location.clone(),
        cod_fee: config.cod_fee_minor,
        currency: config.currency.clone(),
        payment_link_expiry: config.payment_link_expiry,
        default_country_code: config.default_country_code.clone(),
        webhook_secret: config.razorpay_webhook_secret.clone(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();
    info!("Order bot starting...");

    let config = AppConfig::load().context("Failed to load configuration")?;

    let http = build_http_client(config.outbound_timeout).context("Failed to build HTTP client")?;
    let messaging = WhatsAppClient::new(
        http.clone(),
        config.whatsapp_api_base.clone(),
        config.whatsapp_phone_number_id.clone(),
        config.whatsapp_access_token.clone(),
    );
    let payments = RazorpayClient::new(
        http.clone(),
        config.razorpay_api_base.clone(),
        config.razorpay_key_id.clone(),
        config.razorpay_key_secret.clone(),
    );
    let logistics = DelhiveryClient::new(
        http.clone(),
        config.delhivery_api_base.clone(),
        config.delhivery_token.clone(),
    );
    let ledger = ledger_backend(&config, &http).await?;

    let service = Arc::new(CommerceServiceImpl::new(
        SessionStore::new(),
        load_catalog(&config)?,
        checkout_settings(&config),
        messaging,
        payments,
        logistics,
        ledger,
    ));

    let http_server = Server::new(
        config.http_port,
        config.whatsapp_verify_token.clone(),
        config.shutdown_timeout,
        service,
    )?;
    http_server.start().await?;

    info!("Application stopped");
    Ok(())
}
