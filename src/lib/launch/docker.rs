use std::sync::Arc;

use async_trait::async_trait;
use bollard::{
    Docker,
    container::{Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions},
    image::CreateImageOptions,
    models::HostConfig,
};
use futures_util::stream::StreamExt;

use super::secrets::SecretProvider;
use super::types::{
    LaunchBackend, LaunchError, LaunchResult, LaunchedUnit, SERVICE_QUEUE_URL_ENV,
    SERVICE_TYPE_ENV, UnitFailure,
};

/// Containers are started one by one, so the per-call limit only bounds how
/// long a single batch holds the dispatcher.
const LOCAL_MAX_PER_CALL: usize = 10;

#[derive(Debug, Clone)]
pub struct LocalSettings {
    pub image: String,
    pub network: String,
    pub memory: i64,
    pub pull_image: bool,
    pub name_prefix: String,
}

/// The slice of the Docker engine API the backend drives.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn pull(&self, image: &str) -> Result<(), bollard::errors::Error>;

    /// Creates a container and returns its id.
    async fn create(
        &self,
        name: &str,
        config: Config<String>,
    ) -> Result<String, bollard::errors::Error>;

    async fn start(&self, id: &str) -> Result<(), bollard::errors::Error>;

    async fn remove(&self, id: &str) -> Result<(), bollard::errors::Error>;
}

/// `ContainerRuntime` over a bollard connection.
pub struct BollardRuntime {
    client: Docker,
}

impl BollardRuntime {
    pub fn connect() -> Result<Self, LaunchError> {
        let client = Docker::connect_with_local_defaults()?;
        Ok(BollardRuntime { client })
    }
}

#[async_trait]
impl ContainerRuntime for BollardRuntime {
    async fn pull(&self, image: &str) -> Result<(), bollard::errors::Error> {
        let mut stream = self.client.create_image(
            Some(CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(msg) = stream.next().await {
            let info = msg?;
            if let Some(status) = info.status {
                tracing::debug!(image, %status, "Image pull progress");
            }
        }
        Ok(())
    }

    async fn create(
        &self,
        name: &str,
        config: Config<String>,
    ) -> Result<String, bollard::errors::Error> {
        let options = Some(CreateContainerOptions {
            name: name.to_string(),
            ..Default::default()
        });
        let resp = self.client.create_container(options, config).await?;
        Ok(resp.id)
    }

    async fn start(&self, id: &str) -> Result<(), bollard::errors::Error> {
        self.client
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
    }

    async fn remove(&self, id: &str) -> Result<(), bollard::errors::Error> {
        let options = Some(RemoveContainerOptions {
            force: true,
            ..Default::default()
        });
        self.client.remove_container(id, options).await
    }
}

/// Launches workers as containers on the local Docker engine.
pub struct DockerBackend {
    runtime: Arc<dyn ContainerRuntime>,
    settings: LocalSettings,
    secrets: Arc<dyn SecretProvider>,
}

impl DockerBackend {
    pub fn new(
        settings: LocalSettings,
        secrets: Arc<dyn SecretProvider>,
    ) -> Result<Self, LaunchError> {
        let runtime = Arc::new(BollardRuntime::connect()?);
        Ok(Self::with_runtime(runtime, settings, secrets))
    }

    pub fn with_runtime(
        runtime: Arc<dyn ContainerRuntime>,
        settings: LocalSettings,
        secrets: Arc<dyn SecretProvider>,
    ) -> Self {
        DockerBackend {
            runtime,
            settings,
            secrets,
        }
    }

    fn container_config(&self, env: Vec<String>) -> Config<String> {
        let host_config = HostConfig {
            network_mode: Some(self.settings.network.clone()),
            memory: Some(self.settings.memory),
            ..Default::default()
        };

        Config {
            image: Some(self.settings.image.clone()),
            env: Some(env),
            host_config: Some(host_config),
            ..Default::default()
        }
    }

    /// Creates and starts one container, returning its id. A container that
    /// was created but would not start is removed again.
    async fn start_one(&self, name: &str, env: Vec<String>) -> Result<String, UnitFailure> {
        let id = self
            .runtime
            .create(name, self.container_config(env))
            .await
            .map_err(|e| UnitFailure {
                handle: None,
                reason: format!("create {name}: {e}"),
            })?;

        if let Err(e) = self.runtime.start(&id).await {
            if let Err(remove_err) = self.runtime.remove(&id).await {
                tracing::warn!(
                    container = %name,
                    container_id = %id,
                    error = %remove_err,
                    "Failed to remove container that did not start"
                );
            }
            return Err(UnitFailure {
                handle: Some(id),
                reason: format!("start {name}: {e}"),
            });
        }

        Ok(id)
    }
}

pub fn container_name(prefix: &str, scan_type: &str, index: usize) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}_{}", prefix, scan_type, index, &suffix[..8])
}

pub fn worker_env(secrets: Vec<(String, String)>, scan_type: &str, queue_url: &str) -> Vec<String> {
    let mut env: Vec<String> = secrets
        .into_iter()
        .filter(|(k, _)| k != SERVICE_TYPE_ENV && k != SERVICE_QUEUE_URL_ENV)
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    env.push(format!("{SERVICE_TYPE_ENV}={scan_type}"));
    env.push(format!("{SERVICE_QUEUE_URL_ENV}={queue_url}"));
    env
}

#[async_trait]
impl LaunchBackend for DockerBackend {
    fn max_per_call(&self) -> usize {
        LOCAL_MAX_PER_CALL
    }

    async fn launch(
        &self,
        scan_type: &str,
        count: usize,
        queue_url: &str,
    ) -> Result<LaunchResult, LaunchError> {
        if self.settings.pull_image {
            tracing::info!(image = %self.settings.image, "Pulling worker image");
            self.runtime.pull(&self.settings.image).await?;
            tracing::info!(image = %self.settings.image, "Image pulled");
        }

        let env = worker_env(self.secrets.worker_env()?, scan_type, queue_url);
        let mut result = LaunchResult::default();

        for index in 0..count {
            let name = container_name(&self.settings.name_prefix, scan_type, index);
            match self.start_one(&name, env.clone()).await {
                Ok(id) => {
                    tracing::info!(
                        container = %name,
                        container_id = %id,
                        "Worker container started"
                    );
                    result.succeeded.push(LaunchedUnit { handle: id });
                }
                Err(failure) => {
                    tracing::warn!(
                        scan_type,
                        index,
                        reason = %failure.reason,
                        "Worker container failed, continuing"
                    );
                    result.failed.push(failure);
                }
            }
        }

        Ok(result)
    }
}
