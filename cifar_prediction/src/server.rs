use crate::{
    config::ServerConfig, inference_service::InferenceService, model_service::ModelService,
    routes::api_routes, telemetry::Metrics,
};
use axum::{extract::DefaultBodyLimit, Router};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

pub struct SharedState<M: ModelService> {
    pub inference_service: InferenceService<M>,
    pub metrics: Arc<Metrics>,
}

impl<M: ModelService> Clone for SharedState<M> {
    fn clone(&self) -> Self {
        Self {
            inference_service: self.inference_service.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

pub fn build_router<M: ModelService>(
    inference_service: InferenceService<M>,
    metrics: Arc<Metrics>,
    config: &ServerConfig,
) -> Router {
    let app_state = SharedState {
        inference_service,
        metrics,
    };

    Router::new()
        .merge(api_routes::<M>())
        .nest_service("/static", ServeDir::new(&config.static_dir))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .with_state(app_state)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<M: ModelService>(
        inference_service: InferenceService<M>,
        config: &ServerConfig,
    ) -> anyhow::Result<Self> {
        let addr = config.get_address();

        let metrics = Arc::new(Metrics::new()?);
        let metrics_layer = HttpMetricsLayerBuilder::new().build();

        let router = build_router(inference_service, metrics, config).layer(metrics_layer);

        let listener = TcpListener::bind(&addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
