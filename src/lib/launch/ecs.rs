use async_trait::async_trait;
use aws_sdk_ecs::{
    Client,
    error::DisplayErrorContext,
    operation::run_task::RunTaskInput,
    types::{
        AssignPublicIp, AwsVpcConfiguration, ContainerOverride, KeyValuePair, LaunchType,
        NetworkConfiguration, TaskOverride,
    },
};

use super::types::{
    LaunchBackend, LaunchError, LaunchResult, LaunchedUnit, SERVICE_QUEUE_URL_ENV,
    SERVICE_TYPE_ENV, UnitFailure,
};

/// `RunTask` accepts at most ten tasks per call.
pub const ECS_MAX_PER_CALL: usize = 10;

const WORKER_CONTAINER_NAME: &str = "main";

#[derive(Debug, Clone)]
pub struct CloudSettings {
    pub cluster: String,
    pub task_definition: String,
    pub security_group: String,
    pub subnet: String,
    pub platform_version: String,
}

/// Launches workers as Fargate tasks.
pub struct EcsBackend {
    client: Client,
    settings: CloudSettings,
}

impl EcsBackend {
    pub fn new(client: Client, settings: CloudSettings) -> Self {
        Self { client, settings }
    }

    pub async fn from_env(settings: CloudSettings) -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&sdk_config), settings)
    }
}

fn network_configuration(settings: &CloudSettings) -> Result<NetworkConfiguration, LaunchError> {
    let vpc = AwsVpcConfiguration::builder()
        .assign_public_ip(AssignPublicIp::Enabled)
        .security_groups(settings.security_group.clone())
        .subnets(settings.subnet.clone())
        .build()
        .map_err(|e| LaunchError::Ecs(e.to_string()))?;

    Ok(NetworkConfiguration::builder()
        .awsvpc_configuration(vpc)
        .build())
}

fn env_pair(name: &str, value: &str) -> KeyValuePair {
    KeyValuePair::builder().name(name).value(value).build()
}

/// Builds the `RunTask` request for one batch of Fargate workers.
pub fn run_task_input(
    settings: &CloudSettings,
    scan_type: &str,
    count: usize,
    queue_url: &str,
) -> Result<RunTaskInput, LaunchError> {
    let count = i32::try_from(count)
        .map_err(|_| LaunchError::Ecs(format!("task count {count} out of range")))?;

    let overrides = TaskOverride::builder()
        .container_overrides(
            ContainerOverride::builder()
                .name(WORKER_CONTAINER_NAME)
                .environment(env_pair(SERVICE_TYPE_ENV, scan_type))
                .environment(env_pair(SERVICE_QUEUE_URL_ENV, queue_url))
                .build(),
        )
        .build();

    RunTaskInput::builder()
        .cluster(&settings.cluster)
        .task_definition(&settings.task_definition)
        .network_configuration(network_configuration(settings)?)
        .platform_version(&settings.platform_version)
        .launch_type(LaunchType::Fargate)
        .count(count)
        .overrides(overrides)
        .build()
        .map_err(|e| LaunchError::Ecs(e.to_string()))
}

/// Folds the `RunTask` response into a per-unit result. Any shortfall between
/// `requested` and what ECS reported is counted as failed.
pub fn collect_run_task(
    requested: usize,
    task_arns: Vec<String>,
    mut failed: Vec<UnitFailure>,
) -> LaunchResult {
    let succeeded: Vec<LaunchedUnit> = task_arns
        .into_iter()
        .take(requested)
        .map(|handle| LaunchedUnit { handle })
        .collect();

    let reported = succeeded.len() + failed.len();
    if reported < requested {
        for _ in reported..requested {
            failed.push(UnitFailure {
                handle: None,
                reason: "Not started by ECS".to_string(),
            });
        }
    }
    failed.truncate(requested - succeeded.len());

    LaunchResult { succeeded, failed }
}

#[async_trait]
impl LaunchBackend for EcsBackend {
    fn max_per_call(&self) -> usize {
        ECS_MAX_PER_CALL
    }

    async fn launch(
        &self,
        scan_type: &str,
        count: usize,
        queue_url: &str,
    ) -> Result<LaunchResult, LaunchError> {
        let input = run_task_input(&self.settings, scan_type, count, queue_url)?;

        let output = self
            .client
            .run_task()
            .set_cluster(input.cluster)
            .set_task_definition(input.task_definition)
            .set_network_configuration(input.network_configuration)
            .set_platform_version(input.platform_version)
            .set_launch_type(input.launch_type)
            .set_count(input.count)
            .set_overrides(input.overrides)
            .send()
            .await
            .map_err(|e| LaunchError::Ecs(DisplayErrorContext(&e).to_string()))?;

        let task_arns = output
            .tasks()
            .iter()
            .filter_map(|t| t.task_arn().map(str::to_string))
            .collect();

        let failures = output
            .failures()
            .iter()
            .map(|f| UnitFailure {
                handle: f.arn().map(str::to_string),
                reason: f.reason().unwrap_or("unknown").to_string(),
            })
            .collect::<Vec<_>>();

        for failure in &failures {
            tracing::warn!(scan_type, reason = %failure.reason, "ECS reported task failure");
        }

        Ok(collect_run_task(count, task_arns, failures))
    }
}
