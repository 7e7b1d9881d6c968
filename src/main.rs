//! UCP gateway server.
//!
//! Wires the gateway components together — settings, stores, key resolver,
//! authenticator, payment handler, session manager, router — and serves the
//! UCP endpoints. Construction is explicit and happens exactly once here;
//! no component reaches for ambient state.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use clap::Parser;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ucp_gateway::{
    api::{self, AppState},
    auth::{HttpProfileFetcher, KeyResolver, RequestAuthenticator},
    checkout::SessionManager,
    payment::UcpPaymentHandler,
    settings::{parse_allow_list, Settings},
    store::{CatalogStore, Coupon, MemoryCatalog, MemoryOrderStore, OrderStore, Product},
};

/// Merchant-side UCP gateway.
#[derive(Debug, Parser)]
#[command(name = "ucp-gateway", version, about)]
struct Args {
    /// Path to the gateway configuration file (TOML).
    #[arg(long, env = "UCP_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long, env = "UCP_LISTEN", default_value = "127.0.0.1:8080")]
    listen: SocketAddr,
}

/// On-disk configuration: settings plus demo catalog contents.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    products: Vec<Product>,
    #[serde(default)]
    coupons: Vec<Coupon>,
}

fn load_config(path: Option<&PathBuf>) -> Result<ConfigFile, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(ConfigFile::default());
    };
    let raw = std::fs::read_to_string(path)?;
    let config: ConfigFile = toml::from_str(&raw)?;
    Ok(config)
}

/// Applies environment overrides the legacy settings store supported.
fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(raw) = std::env::var("UCP_DEV_MODE") {
        settings.dev_mode = matches!(raw.as_str(), "1" | "true" | "yes");
    }
    if let Ok(raw) = std::env::var("UCP_AGENT_WHITELIST") {
        settings.agent_whitelist = parse_allow_list(&raw);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    let mut settings = config.settings;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    if settings.dev_mode {
        tracing::warn!("dev mode is enabled; the \"test\" signature bypass is active");
    }
    let settings = Arc::new(settings);

    let orders: Arc<dyn OrderStore> = Arc::new(MemoryOrderStore::new());
    let catalog = Arc::new(MemoryCatalog::with_contents(config.products, config.coupons));
    let catalog: Arc<dyn CatalogStore> = catalog;

    let resolver = Arc::new(KeyResolver::new(Box::new(HttpProfileFetcher::new()?)));
    let authenticator =
        Arc::new(RequestAuthenticator::new(resolver, Arc::clone(&settings)));

    let payment = Arc::new(UcpPaymentHandler::new(&settings));
    let sessions = Arc::new(SessionManager::new(
        Arc::clone(&orders),
        Arc::clone(&catalog),
        Arc::clone(&settings),
        Some(Arc::clone(&payment)),
    ));

    let app = api::router(AppState {
        settings,
        authenticator,
        sessions,
        catalog,
        payment_handlers: Arc::new(vec![payment.descriptor()]),
    });

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    info!(listen = %args.listen, "UCP gateway listening");
    axum::serve(listener, app).await?;

    Ok(())
}
