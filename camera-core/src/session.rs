//! Config sessions: fetching a camera's stream profile on behalf of a caller
//!
//! One session slot exists per (camera, stream). A request acquires its slot,
//! a worker task sends the brand's fetch requests one at a time and waits on
//! a single-slot wake channel that the transport callback feeds. The caller's
//! callback receives whatever stream settings were gathered, even on failure.

use std::sync::Arc;

use camera_api::{build_requests, BrandProtocol, BrandRegistry, CameraModel, Operation, StreamConfig, StreamType, WireResponse};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::collaborators::{ConfigStore, Transport, TransportHandle};
use crate::config::EngineConfig;
use crate::error::{CommandStatus, CoreError, Result};
use crate::events::Reachability;
use crate::exchange;
use crate::types::{CameraIndex, CompositeIndex, IpCameraConfig};

/// What a finished session hands back to its caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileConfigResult {
    pub composite: CompositeIndex,
    pub stream_config: StreamConfig,
    pub profile_index: u8,
    pub status: CommandStatus,
}

pub type ProfileCallback = Box<dyn FnOnce(ProfileConfigResult) + Send>;

/// Ordered operations a session was asked to perform
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestPlan {
    steps: Vec<Operation>,
}

impl RequestPlan {
    pub fn new(steps: Vec<Operation>) -> Self {
        Self { steps }
    }

    /// Plan that reads one stream profile back from the camera
    pub fn profile_fetch(stream: StreamType) -> Self {
        Self::new(vec![Operation::GetStreamConfig(stream)])
    }

    pub fn steps(&self) -> &[Operation] {
        &self.steps
    }

    /// First step that fetches stream configuration
    pub fn stream_fetch(&self) -> Option<StreamType> {
        self.steps.iter().find_map(|step| match step {
            Operation::GetStreamConfig(stream) => Some(*stream),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SessionPhase {
    #[default]
    Free,
    Busy,
}

#[derive(Debug)]
enum Wake {
    Done,
    Failed(CoreError),
}

#[derive(Default)]
struct SessionSlot {
    phase: SessionPhase,
    /// Distinguishes successive sessions of the same slot
    session: u64,
    composite: Option<CompositeIndex>,
    profile_index: u8,
    plan: RequestPlan,
    stream_config: StreamConfig,
    callback: Option<ProfileCallback>,
    wake: Option<mpsc::Sender<Wake>>,
    handle: Option<TransportHandle>,
}

struct Acquire {
    composite: CompositeIndex,
    profile_index: u8,
    plan: RequestPlan,
    stream_config: StreamConfig,
    callback: ProfileCallback,
    wake: mpsc::Sender<Wake>,
}

impl SessionSlot {
    /// Test-and-set: only a free slot can be taken
    fn acquire(&mut self, request: Acquire) -> Result<u64> {
        if self.phase == SessionPhase::Busy {
            return Err(CoreError::SessionBusy(request.composite));
        }
        let session = self.session.wrapping_add(1);
        *self = SessionSlot {
            phase: SessionPhase::Busy,
            session,
            composite: Some(request.composite),
            profile_index: request.profile_index,
            plan: request.plan,
            stream_config: request.stream_config,
            callback: Some(request.callback),
            wake: Some(request.wake),
            handle: None,
        };
        Ok(session)
    }

    /// Back to defaults; the session counter survives
    fn release(&mut self) {
        let session = self.session;
        *self = SessionSlot {
            session,
            ..Default::default()
        };
    }

    fn is_current(&self, session: u64) -> bool {
        self.phase == SessionPhase::Busy && self.session == session
    }
}

/// Runs config sessions, at most one per (camera, stream)
#[derive(Clone)]
pub struct ConfigSessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: EngineConfig,
    store: Arc<dyn ConfigStore>,
    transport: Arc<dyn Transport>,
    reachability: Arc<dyn Reachability>,
    brands: BrandRegistry,
    pool: Mutex<Vec<SessionSlot>>,
}

impl ConfigSessionManager {
    pub fn new(
        config: EngineConfig,
        brands: BrandRegistry,
        store: Arc<dyn ConfigStore>,
        transport: Arc<dyn Transport>,
        reachability: Arc<dyn Reachability>,
    ) -> Self {
        let slots = config.max_cameras() * StreamType::ALL.len();
        let pool = (0..slots).map(|_| SessionSlot::default()).collect();
        Self {
            inner: Arc::new(SessionInner {
                config,
                store,
                transport,
                reachability,
                brands,
                pool: Mutex::new(pool),
            }),
        }
    }

    /// Fetch the stream profile of `composite` and report it to `callback`
    ///
    /// Fails fast when a session for the same camera and stream is running.
    pub fn request_profile_config(
        &self,
        composite: CompositeIndex,
        profile_index: u8,
        callback: ProfileCallback,
    ) -> Result<()> {
        let plan = RequestPlan::profile_fetch(composite.stream);
        self.request_with_plan(composite, profile_index, plan, callback)
    }

    pub fn request_with_plan(
        &self,
        composite: CompositeIndex,
        profile_index: u8,
        plan: RequestPlan,
        callback: ProfileCallback,
    ) -> Result<()> {
        let inner = &self.inner;
        let camera = composite.camera;
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
        if !inner.reachability.is_reachable(camera) {
            return Err(CoreError::CameraDisconnected(camera));
        }

        let index = composite.flatten(max_cameras);
        let stream_config = inner.store.stream_config(camera).unwrap_or_default();
        let (wake, wake_rx) = mpsc::channel(1);
        let session = inner.pool.lock()[index].acquire(Acquire {
            composite,
            profile_index,
            plan,
            stream_config,
            callback,
            wake,
        })?;

        match Handle::try_current() {
            Ok(runtime) => {
                let worker = Arc::clone(inner);
                runtime.spawn(async move { worker.run(index, session, ip, wake_rx).await });
                debug!(composite = %composite, profile_index, "Config session started");
                Ok(())
            }
            Err(e) => {
                inner.pool.lock()[index].release();
                Err(CoreError::ResourceLimit(format!("cannot start session worker: {e}")))
            }
        }
    }

    pub fn is_busy(&self, composite: CompositeIndex) -> bool {
        let index = composite.flatten(self.inner.config.max_cameras());
        self.inner
            .pool
            .lock()
            .get(index)
            .is_some_and(|slot| slot.phase == SessionPhase::Busy)
    }

    pub fn active_sessions(&self) -> usize {
        self.inner
            .pool
            .lock()
            .iter()
            .filter(|slot| slot.phase == SessionPhase::Busy)
            .count()
    }
}

impl SessionInner {
    async fn run(
        self: Arc<Self>,
        index: usize,
        session: u64,
        ip: IpCameraConfig,
        mut wake_rx: mpsc::Receiver<Wake>,
    ) {
        let stream = self.pool.lock()[index].plan.stream_fetch();
        let Some(stream) = stream else {
            debug!("Session plan has no stream fetch");
            self.finish(index, session, CommandStatus::Success);
            return;
        };

        let status = match self.fetch(index, session, &ip, stream, &mut wake_rx).await {
            Ok(()) => CommandStatus::Success,
            Err(e) => {
                if e.is_not_supported() {
                    debug!(brand = %ip.brand, error = %e, "Stream fetch not supported");
                } else {
                    warn!(address = %ip.address, error = %e, "Config session failed");
                }
                e.status()
            }
        };
        self.finish(index, session, status);
    }

    async fn fetch(
        self: &Arc<Self>,
        index: usize,
        session: u64,
        ip: &IpCameraConfig,
        stream: StreamType,
        wake_rx: &mut mpsc::Receiver<Wake>,
    ) -> Result<()> {
        let protocol = self.brands.lookup(ip.brand);
        let requests = build_requests(protocol.as_ref(), &ip.model, &Operation::GetStreamConfig(stream))?;
        let count = requests.len();

        for (step, request) in requests.iter().enumerate() {
            let last = step + 1 == count;
            let inner = Arc::clone(self);
            let protocol = Arc::clone(&protocol);
            let model = ip.model.clone();
            let on_complete = Box::new(move |outcome: Result<WireResponse>| {
                inner.on_response(index, session, stream, last, protocol.as_ref(), &model, outcome);
            });

            let handle = exchange::send_request(self.transport.as_ref(), ip, request, on_complete)?;
            {
                let mut pool = self.pool.lock();
                if pool[index].is_current(session) {
                    pool[index].handle = Some(handle);
                }
            }

            match tokio::time::timeout(self.config.session_response_timeout, wake_rx.recv()).await {
                Ok(Some(Wake::Done)) => {}
                Ok(Some(Wake::Failed(e))) => return Err(e),
                Ok(None) => return Err(CoreError::Transport("wake channel closed".to_string())),
                Err(_) => {
                    self.transport.stop(handle);
                    return Err(CoreError::Timeout(request.describe()));
                }
            }
        }
        Ok(())
    }

    /// Transport callback: merge the response into the session and wake the worker
    #[allow(clippy::too_many_arguments)]
    fn on_response(
        &self,
        index: usize,
        session: u64,
        stream: StreamType,
        last: bool,
        protocol: &dyn BrandProtocol,
        model: &CameraModel,
        outcome: Result<WireResponse>,
    ) {
        let (wake, result) = {
            let mut pool = self.pool.lock();
            let slot = &mut pool[index];
            if !slot.is_current(session) {
                return;
            }
            slot.handle = None;
            let result = outcome.and_then(|response| {
                if last {
                    let profile = slot.stream_config.profile_mut(stream);
                    protocol.parse_stream(model, stream, &response, profile)?;
                } else {
                    protocol.check_ack(model, &response)?;
                }
                Ok(())
            });
            (slot.wake.clone(), result)
        };

        if let Some(wake) = wake {
            let message = match result {
                Ok(()) => Wake::Done,
                Err(e) => Wake::Failed(e),
            };
            let _ = wake.try_send(message);
        }
    }

    /// Report to the caller, then free the slot
    fn finish(&self, index: usize, session: u64, status: CommandStatus) {
        let delivery = {
            let mut pool = self.pool.lock();
            let slot = &mut pool[index];
            if !slot.is_current(session) {
                return;
            }
            slot.wake = None;
            match (slot.callback.take(), slot.composite) {
                (Some(callback), Some(composite)) => Some((
                    callback,
                    ProfileConfigResult {
                        composite,
                        stream_config: slot.stream_config.clone(),
                        profile_index: slot.profile_index,
                        status,
                    },
                )),
                _ => None,
            }
        };

        if let Some((callback, result)) = delivery {
            info!(composite = %result.composite, status = ?result.status, "Config session finished");
            callback(result);
        }

        let mut pool = self.pool.lock();
        if pool[index].is_current(session) {
            pool[index].release();
        }
    }
}
