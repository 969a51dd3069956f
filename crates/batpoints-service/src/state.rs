//! Application state.

use std::sync::Arc;
use std::time::Duration;

use batpoints_store::Store;

use crate::chain::{ChainError, ChainGateway, DisabledChainGateway, HttpChainGateway};
use crate::config::ServiceConfig;
use crate::engine::{ConversionEngine, ConversionRecovery, TipEngine};
use crate::notify::{HttpNotifier, LogNotifier, Notifier};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Tip transfer engine.
    pub tips: TipEngine,

    /// Conversion engine.
    pub conversions: ConversionEngine,

    /// Recovery worker for in-flight conversions.
    pub recovery: Arc<ConversionRecovery>,
}

impl AppState {
    /// Create application state, wiring the relayer and notification
    /// service from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the relayer client cannot be built.
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Result<Self, ChainError> {
        let chain: Arc<dyn ChainGateway> = match (
            &config.chain.api_url,
            &config.chain.api_key,
            &config.chain.treasury_address,
        ) {
            (Some(url), Some(key), Some(treasury)) => {
                tracing::info!(
                    relayer_url = %url,
                    mint_enabled = config.chain.mint_enabled,
                    "Chain relayer enabled"
                );
                Arc::new(HttpChainGateway::new(
                    url,
                    key,
                    treasury,
                    config.chain.mint_enabled,
                )?)
            }
            _ => {
                tracing::warn!("Chain relayer not configured - conversions will fail");
                Arc::new(DisabledChainGateway)
            }
        };

        let notifier: Arc<dyn Notifier> = match config.notification_url.as_deref() {
            Some(url) => match HttpNotifier::new(url) {
                Ok(notifier) => {
                    tracing::info!(notification_url = %url, "Notification service enabled");
                    Arc::new(notifier)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Notification client unavailable - logging events");
                    Arc::new(LogNotifier)
                }
            },
            None => {
                tracing::warn!("Notification service not configured - logging events");
                Arc::new(LogNotifier)
            }
        };

        Ok(Self::with_components(store, config, chain, notifier))
    }

    /// Create application state from explicit collaborators.
    #[must_use]
    pub fn with_components(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        chain: Arc<dyn ChainGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let tips = TipEngine::new(
            Arc::clone(&store),
            Arc::clone(&notifier),
            config.tips.clone(),
        );
        let conversions = ConversionEngine::new(
            Arc::clone(&store),
            Arc::clone(&chain),
            Arc::clone(&notifier),
            config.conversions.clone(),
        );
        let recovery = Arc::new(ConversionRecovery::new(
            Arc::clone(&store),
            chain,
            notifier,
            Duration::from_secs(config.recovery_stale_after_seconds),
        ));

        Self {
            store,
            config,
            tips,
            conversions,
            recovery,
        }
    }

    /// Replace the conversion engine, e.g. to tune polling.
    #[must_use]
    pub fn with_conversion_engine(mut self, conversions: ConversionEngine) -> Self {
        self.conversions = conversions;
        self
    }
}
