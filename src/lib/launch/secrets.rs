use super::types::LaunchError;

/// Supplies the secret environment handed to locally launched workers.
pub trait SecretProvider: Send + Sync {
    fn worker_env(&self) -> Result<Vec<(String, String)>, LaunchError>;
}

/// Forwards a fixed allowlist of variables from the dispatcher's own environment.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretProvider {
    names: Vec<String>,
}

impl EnvSecretProvider {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }
}

impl SecretProvider for EnvSecretProvider {
    fn worker_env(&self) -> Result<Vec<(String, String)>, LaunchError> {
        let mut env = Vec::with_capacity(self.names.len());
        for name in &self.names {
            match std::env::var(name) {
                Ok(value) => env.push((name.clone(), value)),
                Err(std::env::VarError::NotPresent) => {
                    tracing::warn!(secret = %name, "Worker secret not set, skipping");
                }
                Err(e) => return Err(LaunchError::Secret(format!("{name}: {e}"))),
            }
        }
        Ok(env)
    }
}
