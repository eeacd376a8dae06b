//! Running brand operations end to end

use std::sync::Arc;

use camera_api::{
    build_requests, parse_response, BrandProtocol, BrandRegistry, Operation, OperationKind,
    OperationOutput, WireRequest, WireResponse,
};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::collaborators::{ConfigStore, Transport};
use crate::config::EngineConfig;
use crate::error::{CommandStatus, CoreError, Result};
use crate::events::Reachability;
use crate::exchange;
use crate::types::{CameraIndex, IpCameraConfig};

/// Outcome of one executed operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub camera: CameraIndex,
    pub kind: OperationKind,
    pub status: CommandStatus,
    /// Parsed result of the final response; `None` on failure
    pub output: Option<OperationOutput>,
}

pub type CommandCallback = Box<dyn FnOnce(CommandOutcome) + Send>;

/// Executes get/set operations against cameras through their brand table
#[derive(Clone)]
pub struct CommandExecutor {
    inner: Arc<ExecutorInner>,
}

struct ExecutorInner {
    config: EngineConfig,
    store: Arc<dyn ConfigStore>,
    transport: Arc<dyn Transport>,
    reachability: Arc<dyn Reachability>,
    brands: BrandRegistry,
}

impl CommandExecutor {
    pub fn new(
        config: EngineConfig,
        brands: BrandRegistry,
        store: Arc<dyn ConfigStore>,
        transport: Arc<dyn Transport>,
        reachability: Arc<dyn Reachability>,
    ) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                config,
                store,
                transport,
                reachability,
                brands,
            }),
        }
    }

    /// Run `operation` on `camera` and report the outcome to `callback`
    ///
    /// Everything that can be decided without the camera (range checks,
    /// argument validation, brand support) fails synchronously and sends
    /// nothing.
    pub fn execute(&self, camera: CameraIndex, operation: Operation, callback: CommandCallback) -> Result<()> {
        let inner = &self.inner;
        let max_cameras = inner.config.max_cameras();
        if camera.as_usize() >= max_cameras {
            return Err(CoreError::InvalidParameter(format!(
                "camera {camera} out of range (max {max_cameras})"
            )));
        }
        let ip = inner
            .store
            .ip_camera_config(camera)
            .ok_or(CoreError::ParamNotConfigured(camera))?;

        let protocol = inner.brands.lookup(ip.brand);
        let requests = build_requests(protocol.as_ref(), &ip.model, &operation).map_err(|e| {
            if e.is_not_supported() {
                debug!(camera = %camera, brand = %ip.brand, model = %ip.model.name(), error = %e, "Operation not supported");
            }
            CoreError::from(e)
        })?;

        if !inner.reachability.is_reachable(camera) {
            return Err(CoreError::CameraDisconnected(camera));
        }
        let runtime = Handle::try_current()
            .map_err(|e| CoreError::ResourceLimit(format!("cannot start command worker: {e}")))?;

        let worker = Arc::clone(inner);
        runtime.spawn(async move {
            let kind = operation.kind();
            let outcome = match worker.run(&ip, protocol.as_ref(), &operation, &requests).await {
                Ok(output) => {
                    info!(camera = %camera, operation = ?kind, "Command completed");
                    CommandOutcome {
                        camera,
                        kind,
                        status: CommandStatus::Success,
                        output: Some(output),
                    }
                }
                Err(e) => {
                    warn!(camera = %camera, operation = ?kind, error = %e, "Command failed");
                    CommandOutcome {
                        camera,
                        kind,
                        status: e.status(),
                        output: None,
                    }
                }
            };
            callback(outcome);
        });
        Ok(())
    }
}

impl ExecutorInner {
    /// Send the requests in order; a failure abandons the rest
    async fn run(
        &self,
        ip: &IpCameraConfig,
        protocol: &dyn BrandProtocol,
        operation: &Operation,
        requests: &[WireRequest],
    ) -> Result<OperationOutput> {
        let mut last = None;
        for (step, request) in requests.iter().enumerate() {
            let response = self.exchange(ip, request).await?;
            if step + 1 < requests.len() {
                protocol.check_ack(&ip.model, &response)?;
            } else {
                last = Some(response);
            }
        }
        let response = last.ok_or_else(|| CoreError::Transport("no request was sent".to_string()))?;
        Ok(parse_response(protocol, &ip.model, operation, &response)?)
    }

    async fn exchange(&self, ip: &IpCameraConfig, request: &WireRequest) -> Result<WireResponse> {
        let (tx, rx) = oneshot::channel();
        let on_complete = Box::new(move |outcome: Result<WireResponse>| {
            let _ = tx.send(outcome);
        });
        let handle = exchange::send_request(self.transport.as_ref(), ip, request, on_complete)?;

        match tokio::time::timeout(self.config.session_response_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(CoreError::Transport("response callback dropped".to_string())),
            Err(_) => {
                self.transport.stop(handle);
                Err(CoreError::Timeout(request.describe()))
            }
        }
    }
}
