//! HTTP server assembling the chat gateway and consultation routes

mod cors;
mod health;

use std::net::SocketAddr;

use axum::Router;
use carepath_config::Config;
use carepath_consult::Orchestrator;
use carepath_llm::GatewayState;
use tower_http::trace::TraceLayer;

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
    orchestrator: Orchestrator,
}

impl Server {
    /// Build the server from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a backend cannot be constructed or the
    /// consultation pipeline cannot be bound to the configured backends
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let listen_address = config
            .server
            .listen_address
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

        let gateway = GatewayState::from_config(config)?;
        let backends = gateway.backends().clone();
        let orchestrator = Orchestrator::from_config(&config.consultation, backends.clone())?;

        let mut app = Router::new();

        let health = &config.server.health;
        if health.enabled {
            let route = if health.include_backends {
                axum::routing::get(health::detailed_health_handler).with_state(backends)
            } else {
                axum::routing::get(health::health_handler)
            };
            app = app.route(&health.path, route);
        }

        app = app
            .merge(carepath_llm::gateway_router(gateway))
            .merge(carepath_consult::consultation_router(orchestrator.clone()));

        app = app.layer(TraceLayer::new_for_http());

        if let Some(ref cors_config) = config.server.cors {
            app = app.layer(cors::cors_layer(cors_config));
        }

        Ok(Self {
            router: app,
            listen_address,
            orchestrator,
        })
    }

    /// Get the configured listen address
    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Stage backends are warmed in the background once the listener is
    /// bound. Blocks until the cancellation token is triggered.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        let orchestrator = self.orchestrator;
        tokio::spawn(async move {
            let report = orchestrator.warmup_all().await;
            let failed: Vec<String> = report
                .iter()
                .filter(|(_, ok)| !**ok)
                .map(|(stage, _)| stage.to_string())
                .collect();
            if failed.is_empty() {
                tracing::info!(stages = report.len(), "stage backends warmed up");
            } else {
                tracing::warn!(failed = ?failed, "some stage backends could not be warmed up");
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        Ok(())
    }
}
