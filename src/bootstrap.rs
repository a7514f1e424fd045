use std::{sync::Arc, time::Duration};

use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{error, info, warn};

use crate::{
    api::handler::AppState,
    auth::IdentityToolkitAuthenticator,
    catalog::PgPriceOracle,
    config::{AppConfig, RateLimitBackend},
    error::{AppError, AppResult},
    gateway::{paypal::PayPalSettings, PayPalClient},
    ledger::{LedgerRepository, RetryPolicy},
    notify::{EmailJsNotifier, LogNotifier, Notifier},
    rate_limit::{GcraLimiter, PgFixedWindowLimiter, RateLimiter, SlidingWindowLimiter},
    settlement::{PipelineSettings, SettlementPipeline},
};

pub async fn initialize_app_state(cfg: &AppConfig) -> AppResult<AppState> {
    info!("Initializing application components ...");

    // Database pool
    let pool = initialize_database(&cfg.database_url).await?;

    // Caller identity
    let authenticator = Arc::new(IdentityToolkitAuthenticator::new(
        cfg.identity_base_url.clone(),
        cfg.identity_api_key.clone(),
        cfg.identity_timeout(),
    )?);
    if cfg.identity_api_key.is_empty() {
        warn!("⚠️  IDENTITY_API_KEY not set - every identity lookup will be rejected");
    }

    // Admission control
    let limiter = initialize_rate_limiter(cfg, &pool)?;

    // Catalog and gateway
    let oracle = Arc::new(PgPriceOracle::new(pool.clone()));

    let gateway_base_url = cfg.gateway_base_url()?;
    if cfg.gateway_client_id.is_empty() || cfg.gateway_client_secret.is_empty() {
        error!("⚠️  Gateway credentials not set - token exchange will fail");
    }
    let gateway = Arc::new(PayPalClient::new(PayPalSettings {
        base_url: gateway_base_url.clone(),
        client_id: cfg.gateway_client_id.clone(),
        client_secret: cfg.gateway_client_secret.clone(),
        timeout: cfg.gateway_timeout(),
        retry_backoff: cfg.gateway_retry_backoff(),
        token_expiry_margin: Duration::from_secs(cfg.token_expiry_margin_secs),
    }));
    info!("✅ Payment gateway client initialized: {}", gateway_base_url);

    // Ledger
    let ledger = Arc::new(LedgerRepository::new(
        pool.clone(),
        RetryPolicy {
            max_attempts: cfg.settlement_max_attempts,
            base_backoff: cfg.settlement_retry_backoff(),
        },
    ));

    let notifier = initialize_notifier(cfg)?;

    let accepted_statuses = cfg.accepted_statuses();
    info!(
        "✅ Settlement pipeline: commission {}, accepted statuses {:?}",
        cfg.commission_rate, accepted_statuses
    );

    let pipeline = SettlementPipeline::new(
        authenticator,
        limiter,
        oracle,
        gateway,
        ledger,
        notifier,
        PipelineSettings {
            commission_rate: cfg.commission_rate,
            accepted_statuses,
            request_deadline: cfg.request_deadline(),
        },
    );

    info!("✓ All components initialized");

    Ok(AppState {
        pipeline: Arc::new(pipeline),
    })
}

/// Build the configured limiter and start its background sweeper
fn initialize_rate_limiter(cfg: &AppConfig, pool: &PgPool) -> AppResult<Arc<dyn RateLimiter>> {
    let window = cfg.rate_limit_window();
    let max = cfg.rate_limit_max_requests;

    let limiter: Arc<dyn RateLimiter> = match cfg.rate_limit_backend()? {
        RateLimitBackend::Sliding => {
            let limiter = SlidingWindowLimiter::new(window, max);
            let sweeper = limiter.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(window).await;
                    sweeper.prune_idle();
                }
            });
            Arc::new(limiter)
        }
        RateLimitBackend::Gcra => {
            let limiter = GcraLimiter::new(window, max)?;
            let sweeper = limiter.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(window).await;
                    sweeper.prune_idle();
                }
            });
            Arc::new(limiter)
        }
        RateLimitBackend::Postgres => {
            let limiter = Arc::new(PgFixedWindowLimiter::new(pool.clone(), window, max)?);
            let sweeper = limiter.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(window).await;
                    match sweeper.prune_expired().await {
                        Ok(count) => {
                            if count > 0 {
                                info!("🧹 Removed {} expired rate limit windows", count);
                            }
                        }
                        Err(e) => error!("Failed to prune rate limit windows: {:?}", e),
                    }
                }
            });
            limiter
        }
    };

    info!(
        "✅ Rate limiter: {} requests per {:?} ({})",
        max, window, cfg.rate_limit_backend
    );
    Ok(limiter)
}

fn initialize_notifier(cfg: &AppConfig) -> AppResult<Arc<dyn Notifier>> {
    match cfg.emailjs_settings() {
        Some(settings) => {
            let notifier = EmailJsNotifier::new(settings)
                .map_err(|e| AppError::Config(format!("email notifier: {}", e)))?;
            info!("✅ EmailJS sale notifications enabled");
            Ok(Arc::new(notifier))
        }
        None => {
            warn!("⚠️  EMAILJS_* not set - sale notices will only be logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(50)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("✓ Database pool configured: 50 max connections");

    // Run migrations
    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
