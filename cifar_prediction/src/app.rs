use crate::{
    config::Config, inference_service::InferenceService, labels::ClassLabels,
    ort_service::OrtModelService, server::HttpServer,
};
use std::error::Error;
use tokio::signal;

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let architecture = config.model.architecture;

    let labels = match ClassLabels::load(&config.labels, architecture) {
        Ok(labels) => labels,
        Err(e) => {
            tracing::error!("Failed to load class labels: {}", e);
            return Err(Box::new(e));
        }
    };

    let model_service = match OrtModelService::new(&config.model) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("Failed to load model: {}", e);
            return Err(Box::new(e));
        }
    };

    let inference_service = InferenceService::new(model_service, labels, config.model.top_k);
    let server = HttpServer::new(inference_service, &config.server).await?;

    server
        .run(async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown.");
        })
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
