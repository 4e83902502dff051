//! [`MachineExecutor`] backed by the multipass CLI.

use std::path::Path;

use async_trait::async_trait;
use mpfleet_reconciler::{
    CreationParams, ExecutionError, ExecutionOutput, MachineExecutor, MachineTarget, Operation,
};
use tracing::{info, warn};

use crate::client::MultipassClient;
use crate::config::MultipassConfig;

/// Runs lifecycle operations by shelling out to `multipass`.
#[derive(Debug, Clone, Default)]
pub struct MultipassExecutor {
    client: MultipassClient,
}

impl MultipassExecutor {
    /// Create an executor over an existing client.
    pub const fn new(client: MultipassClient) -> Self {
        Self { client }
    }

    /// Create an executor from configuration.
    pub fn with_config(config: MultipassConfig) -> Self {
        Self::new(MultipassClient::with_config(config))
    }

    /// The underlying client.
    pub const fn client(&self) -> &MultipassClient {
        &self.client
    }
}

#[async_trait]
impl MachineExecutor for MultipassExecutor {
    async fn execute(
        &self,
        target: &MachineTarget,
        operation: Operation,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let args = operation_args(target, operation, &self.client.config().cloud_init_dir)?;
        info!(
            machine = %target.id,
            instance = %target.name,
            operation = %operation,
            "Dispatching multipass operation"
        );

        self.client.run(&args).await.map_err(|e| {
            warn!(machine = %target.id, operation = %operation, error = %e, "multipass operation failed");
            ExecutionError::from(e)
        })
    }
}

/// Command-line arguments (without the program) for one operation.
///
/// # Errors
///
/// Returns [`ExecutionError::MissingParams`] for a launch without creation
/// parameters.
pub fn operation_args(
    target: &MachineTarget,
    operation: Operation,
    cloud_init_dir: &Path,
) -> Result<Vec<String>, ExecutionError> {
    match operation {
        Operation::Launch => {
            let params = target
                .params
                .as_ref()
                .ok_or_else(|| ExecutionError::MissingParams {
                    machine: target.id.to_string(),
                })?;
            Ok(launch_args(&target.name, params, cloud_init_dir))
        }
        Operation::Recover
        | Operation::Start
        | Operation::Suspend
        | Operation::Stop
        | Operation::Delete => Ok(vec![operation.verb().to_string(), target.name.clone()]),
    }
}

fn launch_args(name: &str, params: &CreationParams, cloud_init_dir: &Path) -> Vec<String> {
    let mut args = vec![
        "launch".to_string(),
        "--cpus".to_string(),
        params.vcpu.to_string(),
        "--disk".to_string(),
        params.disk.clone(),
        "--mem".to_string(),
        params.mem.clone(),
        "--name".to_string(),
        name.to_string(),
    ];

    if let Some(cloud_init) = &params.cloud_init {
        let file = format!("{}-{name}", cloud_init.trim());
        args.push("--cloud-init".to_string());
        args.push(cloud_init_dir.join(file).to_string_lossy().into_owned());
    }

    for net in &params.networks {
        args.push("--network".to_string());
        args.push(format!("name={},mode={}", net.name.trim(), net.mode.trim()));
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpfleet_reconciler::{MachineId, NetworkAttachment};

    fn target(params: Option<CreationParams>) -> MachineTarget {
        MachineTarget {
            id: MachineId::from("192.168.64.10"),
            name: "node-a".to_string(),
            params,
        }
    }

    #[test]
    fn test_simple_operations_take_instance_name() {
        for op in [
            Operation::Recover,
            Operation::Start,
            Operation::Suspend,
            Operation::Stop,
            Operation::Delete,
        ] {
            let args = operation_args(&target(None), op, Path::new("."));
            assert_eq!(
                args,
                Ok(vec![op.verb().to_string(), "node-a".to_string()])
            );
        }
    }

    #[test]
    fn test_launch_without_params_is_rejected() {
        let args = operation_args(&target(None), Operation::Launch, Path::new("."));
        assert_eq!(
            args,
            Err(ExecutionError::MissingParams {
                machine: "192.168.64.10".to_string()
            })
        );
    }

    #[test]
    fn test_launch_args_minimal() {
        let params = CreationParams::new(2, "10G", "2G");
        let args = operation_args(&target(Some(params)), Operation::Launch, Path::new("."));
        assert_eq!(
            args,
            Ok(vec![
                "launch".to_string(),
                "--cpus".to_string(),
                "2".to_string(),
                "--disk".to_string(),
                "10G".to_string(),
                "--mem".to_string(),
                "2G".to_string(),
                "--name".to_string(),
                "node-a".to_string(),
            ])
        );
    }

    #[test]
    fn test_launch_args_with_cloud_init_and_networks() {
        let params = CreationParams::new(1, "5G", "1G")
            .with_cloud_init(" base.yaml \n")
            .with_network(NetworkAttachment::new(" en0 ", "manual"))
            .with_network(NetworkAttachment::new("bridge0", " auto"));
        let args = operation_args(
            &target(Some(params)),
            Operation::Launch,
            Path::new("/tmp/ci"),
        )
        .unwrap_or_default();

        let tail: Vec<&str> = args.iter().skip(9).map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "--cloud-init",
                "/tmp/ci/base.yaml-node-a",
                "--network",
                "name=en0,mode=manual",
                "--network",
                "name=bridge0,mode=auto",
            ]
        );
    }
}
