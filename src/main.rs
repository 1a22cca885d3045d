use std::{error::Error, sync::Arc};

use tracing_subscriber::EnvFilter;

use crate::lib::{
    api::types::DispatchServer,
    config::{AppConfig, DispatchMode, scan_types::ScanTypeRegistry},
    dispatch::{dispatcher::Dispatcher, entry::DispatchEntry},
    launch::{
        docker::DockerBackend, ecs::EcsBackend, secrets::EnvSecretProvider, types::LaunchBackend,
    },
    tasks::{store::MemoryTaskStore, tracker::TaskTracker},
};

mod lib {
    pub mod api;
    pub mod config;
    pub mod dispatch;
    pub mod launch;
    pub mod tasks;
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env()?;

    let registry = match &config.scan_types_path {
        Some(path) => ScanTypeRegistry::from_file(path)?,
        None => ScanTypeRegistry::builtin(),
    };
    tracing::info!(scan_types = ?registry.names(), "Scan type registry loaded");

    let backend: Arc<dyn LaunchBackend> = match config.dispatch_mode {
        DispatchMode::Cloud => {
            tracing::info!("Using ECS launch backend");
            Arc::new(EcsBackend::from_env(config.cloud_settings()?).await)
        }
        DispatchMode::Local => {
            tracing::info!(image = %config.local_image, "Using local Docker launch backend");
            let secrets = Arc::new(EnvSecretProvider::new(config.worker_secret_names.clone()));
            Arc::new(DockerBackend::new(config.local_settings(), secrets)?)
        }
    };

    let tracker = TaskTracker::new(Arc::new(MemoryTaskStore::new()));
    let entry = DispatchEntry::new(registry, Dispatcher::new(backend, tracker))
        .with_max_desired_count(config.max_desired_count);

    DispatchServer::new(entry, &config.bind_addr)
        .start_server()
        .await?;

    Ok(())
}
