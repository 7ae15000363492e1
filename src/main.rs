//! Package Billing API server.

use std::sync::Arc;

use anyhow::Context;
use secrecy::ExposeSecret;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use package_billing::adapters::http::{payment_router, PaymentAppState};
use package_billing::adapters::postgres::{
    PostgresPackageActivator, PostgresPackageCatalog, PostgresPaymentRepository,
};
use package_billing::adapters::providers::{
    GooglePlayAdapter, GooglePlayConfig, HttpPurchaseValidator, PaypalAdapter, PaypalConfig,
    VnpayAdapter, VnpayConfig, ZalopayAdapter, ZalopayConfig,
};
use package_billing::application::{
    ActivatePackageHandler, CreateCheckoutHandler, CreatePaymentHandler, GetPaymentHandler,
    ProviderRegistry, ReconciliationEngine,
};
use package_billing::config::{AppConfig, PaymentConfig};
use package_billing::domain::payment::ExchangeRate;
use package_billing::ports::{PackageActivator, PackageCatalog, PaymentRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    config.validate().context("validating configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Package Billing v{}", env!("CARGO_PKG_VERSION"));

    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await
        .context("connecting to database")?;
    if config.database.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("running migrations")?;
        tracing::info!("Database migrations applied");
    }

    let repository: Arc<dyn PaymentRepository> = Arc::new(PostgresPaymentRepository::new(pool.clone()));
    let catalog: Arc<dyn PackageCatalog> = Arc::new(PostgresPackageCatalog::new(pool.clone()));
    let activator: Arc<dyn PackageActivator> = Arc::new(PostgresPackageActivator::new(pool));

    let exchange_rate = ExchangeRate::new(config.payment.vnd_per_usd);
    let providers = provider_registry(&config.payment, exchange_rate);
    tracing::info!(providers = ?providers.kinds(), "Payment providers registered");

    let state = PaymentAppState::new(
        CreateCheckoutHandler::new(
            repository.clone(),
            CreatePaymentHandler::new(repository.clone(), catalog.clone()),
            providers.clone(),
        ),
        ReconciliationEngine::new(
            repository.clone(),
            providers,
            ActivatePackageHandler::new(catalog, activator),
            exchange_rate,
        )
        .with_verify_timeout(config.payment.provider_timeout()),
        GetPaymentHandler::new(repository),
    );

    let app = payment_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(config.server.request_timeout()));

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Builds an adapter for every provider that has a configuration section.
fn provider_registry(config: &PaymentConfig, exchange_rate: ExchangeRate) -> ProviderRegistry {
    let timeout = config.provider_timeout();
    let mut registry = ProviderRegistry::new();

    if let Some(vnpay) = &config.vnpay {
        registry.register(Arc::new(VnpayAdapter::new(VnpayConfig::new(
            vnpay.tmn_code.clone(),
            vnpay.hash_secret.expose_secret().clone(),
            vnpay.pay_url.clone(),
            vnpay.return_url.clone(),
        ))));
    }

    if let Some(paypal) = &config.paypal {
        registry.register(Arc::new(PaypalAdapter::new(
            PaypalConfig::new(
                paypal.client_id.clone(),
                paypal.client_secret.expose_secret().clone(),
                paypal.webhook_id.clone(),
                paypal.return_url.clone(),
                paypal.cancel_url.clone(),
            )
            .with_base_url(paypal.api_base_url.clone())
            .with_exchange_rate(exchange_rate)
            .with_request_timeout(timeout),
        )));
    }

    if let Some(zalopay) = &config.zalopay {
        registry.register(Arc::new(ZalopayAdapter::new(
            ZalopayConfig::new(
                zalopay.app_id,
                zalopay.key1.expose_secret().clone(),
                zalopay.key2.expose_secret().clone(),
                zalopay.create_order_url.clone(),
                zalopay.callback_url.clone(),
                zalopay.redirect_url.clone(),
            )
            .with_request_timeout(timeout),
        )));
    }

    if let Some(google_play) = &config.google_play {
        let validator = HttpPurchaseValidator::new(
            GooglePlayConfig::new(
                google_play.package_name.clone(),
                google_play.access_token.expose_secret().clone(),
            )
            .with_base_url(google_play.api_base_url.clone())
            .with_request_timeout(timeout),
        );
        registry.register(Arc::new(GooglePlayAdapter::new(Arc::new(validator))));
    }

    registry
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
