//! In-memory collaborators for driving the core without cameras

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use camera_api::onvif::{OnvifAction, OnvifRequest};
use camera_api::{
    Brand, BrandRegistry, CameraEvent, CameraModel, EventState, Frame, HttpRequest, StreamConfig,
};
use camera_core::{
    CameraConfig, CameraCore, CameraIndex, Collaborators, ConfigStore, CoreError, EngineConfig,
    EventEngine, EventRecord, EventSink, IpCameraConfig, NotifyRoute, OnvifCallback, OnvifClient,
    Result, TimerCallback, TimerHandle, TimerService, Transport, TransportCallback,
    TransportHandle, TransportResponse,
};
use parking_lot::Mutex;

// ---- Configuration store ----

#[derive(Default)]
pub struct MemoryStore {
    cameras: Mutex<HashMap<CameraIndex, CameraConfig>>,
    ip_cameras: Mutex<HashMap<CameraIndex, IpCameraConfig>>,
    streams: Mutex<HashMap<CameraIndex, StreamConfig>>,
}

impl MemoryStore {
    pub fn add_camera(&self, camera: CameraIndex, ip: IpCameraConfig) {
        self.ip_cameras.lock().insert(camera, ip);
    }

    pub fn set_camera_config(&self, camera: CameraIndex, config: CameraConfig) {
        self.cameras.lock().insert(camera, config);
    }

    pub fn set_stream_config(&self, camera: CameraIndex, config: StreamConfig) {
        self.streams.lock().insert(camera, config);
    }
}

impl ConfigStore for MemoryStore {
    fn camera_config(&self, camera: CameraIndex) -> Option<CameraConfig> {
        self.cameras.lock().get(&camera).cloned()
    }

    fn ip_camera_config(&self, camera: CameraIndex) -> Option<IpCameraConfig> {
        self.ip_cameras.lock().get(&camera).cloned()
    }

    fn stream_config(&self, camera: CameraIndex) -> Option<StreamConfig> {
        self.streams.lock().get(&camera).cloned()
    }
}

// ---- Transport ----

/// A request the transport was asked to send
#[derive(Clone)]
pub struct SentRequest {
    pub handle: TransportHandle,
    pub address: String,
    /// `GET /path` for HTTP, `TCP HEADER` for frames
    pub description: String,
    pub body: Option<String>,
    callback: TransportCallback,
}

#[derive(Default)]
pub struct MockTransport {
    next_handle: AtomicU64,
    sent: Mutex<Vec<SentRequest>>,
    stopped: Mutex<Vec<TransportHandle>>,
    refuse: AtomicBool,
}

impl MockTransport {
    /// Make every following send fail
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn descriptions(&self) -> Vec<String> {
        self.sent.lock().iter().map(|s| s.description.clone()).collect()
    }

    pub fn last_handle(&self) -> TransportHandle {
        self.sent.lock().last().expect("nothing was sent").handle
    }

    pub fn stopped(&self) -> Vec<TransportHandle> {
        self.stopped.lock().clone()
    }

    /// Deliver `response` to the request behind `handle`
    pub fn respond(&self, handle: TransportHandle, response: TransportResponse) {
        let callback = self
            .sent
            .lock()
            .iter()
            .find(|s| s.handle == handle)
            .map(|s| Arc::clone(&s.callback))
            .expect("unknown transport handle");
        callback(response);
    }

    /// A complete HTTP response in one chunk
    pub fn respond_http(&self, handle: TransportHandle, status: u16, body: &str) {
        self.respond(handle, TransportResponse::Data(Bytes::copy_from_slice(body.as_bytes())));
        self.respond(handle, TransportResponse::Complete { status });
    }

    pub fn respond_frame(&self, handle: TransportHandle, frame: &Frame) {
        self.respond(handle, TransportResponse::Data(frame.encode()));
    }

    /// Yield to spawned workers until `count` requests went out
    pub async fn wait_for_requests(&self, count: usize) {
        for _ in 0..1000 {
            if self.sent_count() >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {count} requests, saw {}", self.sent_count());
    }

    fn record(
        &self,
        camera: &IpCameraConfig,
        description: String,
        body: Option<String>,
        callback: TransportCallback,
    ) -> Result<TransportHandle> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(CoreError::Transport("connection refused".to_string()));
        }
        let handle = TransportHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        self.sent.lock().push(SentRequest {
            handle,
            address: camera.address.clone(),
            description,
            body,
            callback,
        });
        Ok(handle)
    }
}

impl Transport for MockTransport {
    fn send_http(
        &self,
        camera: &IpCameraConfig,
        request: &HttpRequest,
        callback: TransportCallback,
    ) -> Result<TransportHandle> {
        let description = format!("{} {}", request.method.as_str(), request.path);
        self.record(camera, description, request.body.clone(), callback)
    }

    fn send_tcp(
        &self,
        camera: &IpCameraConfig,
        frame: Bytes,
        callback: TransportCallback,
    ) -> Result<TransportHandle> {
        let description = match Frame::parse(&frame) {
            Ok(frame) => format!("TCP {}", frame.header()),
            Err(_) => "TCP <malformed>".to_string(),
        };
        self.record(camera, description, None, callback)
    }

    fn stop(&self, handle: TransportHandle) {
        self.stopped.lock().push(handle);
    }
}

// ---- Timers ----

struct PendingTimer {
    handle: TimerHandle,
    delay: Duration,
    callback: TimerCallback,
}

/// Timers that only fire when a test says so
#[derive(Default)]
pub struct ManualTimers {
    next_handle: AtomicU64,
    reloads: AtomicU64,
    pending: Mutex<Vec<PendingTimer>>,
}

impl ManualTimers {
    /// Timers armed so far, fired or not
    pub fn started(&self) -> u64 {
        self.next_handle.load(Ordering::SeqCst)
    }

    pub fn reloads(&self) -> u64 {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn pending_delays(&self) -> Vec<Duration> {
        self.pending.lock().iter().map(|t| t.delay).collect()
    }

    /// Fire every timer pending right now; timers armed by callbacks wait
    pub fn fire_all(&self) -> usize {
        let due = std::mem::take(&mut *self.pending.lock());
        let count = due.len();
        for timer in due {
            (timer.callback)();
        }
        count
    }

    /// Fire only the timers armed with `delay`
    pub fn fire_with_delay(&self, delay: Duration) -> usize {
        let due: Vec<PendingTimer> = {
            let mut pending = self.pending.lock();
            let (due, keep) = std::mem::take(&mut *pending)
                .into_iter()
                .partition(|t| t.delay == delay);
            *pending = keep;
            due
        };
        let count = due.len();
        for timer in due {
            (timer.callback)();
        }
        count
    }
}

impl TimerService for ManualTimers {
    fn start(&self, delay: Duration, callback: TimerCallback) -> Result<TimerHandle> {
        let handle = TimerHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        self.pending.lock().push(PendingTimer {
            handle,
            delay,
            callback,
        });
        Ok(handle)
    }

    fn delete(&self, handle: TimerHandle) {
        self.pending.lock().retain(|t| t.handle != handle);
    }

    fn reload(&self, handle: TimerHandle, delay: Duration) -> bool {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        match self.pending.lock().iter_mut().find(|t| t.handle == handle) {
            Some(timer) => {
                timer.delay = delay;
                true
            }
            None => false,
        }
    }
}

// ---- ONVIF ----

#[derive(Default)]
pub struct MockOnvif {
    queue: Mutex<VecDeque<(OnvifRequest, OnvifCallback)>>,
    history: Mutex<Vec<OnvifRequest>>,
}

impl MockOnvif {
    pub fn pending_actions(&self) -> Vec<OnvifAction> {
        self.queue.lock().iter().map(|(request, _)| request.action).collect()
    }

    pub fn history(&self) -> Vec<OnvifRequest> {
        self.history.lock().clone()
    }

    /// Answer the oldest outstanding request; returns what it was
    pub fn respond_next(&self, response: std::result::Result<String, String>) -> OnvifAction {
        let (request, callback) = self
            .queue
            .lock()
            .pop_front()
            .expect("no ONVIF request outstanding");
        callback(response);
        request.action
    }
}

impl OnvifClient for MockOnvif {
    fn start_operation(
        &self,
        _camera: &IpCameraConfig,
        request: OnvifRequest,
        callback: OnvifCallback,
    ) -> Result<()> {
        self.history.lock().push(request.clone());
        self.queue.lock().push_back((request, callback));
        Ok(())
    }
}

// ---- Event sink ----

#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<(EventRecord, NotifyRoute)>>,
}

impl RecordingSink {
    pub fn transitions(&self) -> Vec<(CameraEvent, EventState)> {
        self.records
            .lock()
            .iter()
            .map(|(record, _)| (record.event, record.state))
            .collect()
    }

    pub fn transitions_of(&self, event: CameraEvent) -> Vec<EventState> {
        self.records
            .lock()
            .iter()
            .filter(|(record, _)| record.event == event)
            .map(|(record, _)| record.state)
            .collect()
    }

    pub fn records(&self) -> Vec<(EventRecord, NotifyRoute)> {
        self.records.lock().clone()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn write_event(&self, record: &EventRecord) {
        self.records.lock().push((record.clone(), NotifyRoute::Logged));
    }

    fn send_network_event(&self, record: &EventRecord) {
        self.records.lock().push((record.clone(), NotifyRoute::NetworkOnly));
    }
}

// ---- Wiring ----

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub transport: Arc<MockTransport>,
    pub onvif: Arc<MockOnvif>,
    pub timers: Arc<ManualTimers>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::default()),
            transport: Arc::new(MockTransport::default()),
            onvif: Arc::new(MockOnvif::default()),
            timers: Arc::new(ManualTimers::default()),
            sink: Arc::new(RecordingSink::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            store: self.store.clone(),
            transport: self.transport.clone(),
            onvif: self.onvif.clone(),
            timers: self.timers.clone(),
            sink: self.sink.clone(),
        }
    }

    pub fn engine(&self) -> EventEngine {
        self.engine_with(test_config())
    }

    pub fn engine_with(&self, config: EngineConfig) -> EventEngine {
        EventEngine::new(config, BrandRegistry::default(), self.collaborators())
            .expect("valid engine config")
    }

    pub fn core(&self, config: EngineConfig) -> CameraCore {
        CameraCore::new(config, self.collaborators()).expect("valid engine config")
    }

    pub fn add_camera(&self, camera: u16, brand: Brand, model: &str) -> CameraIndex {
        let camera = CameraIndex(camera);
        let address = format!("10.0.0.{}", 10 + camera.0);
        self.store
            .add_camera(camera, IpCameraConfig::new(brand, CameraModel::new(model), address));
        camera
    }

    /// A camera whose events come from an ONVIF pull-point subscription
    pub fn add_onvif_camera(&self, camera: u16, brand: Brand, model: &str) -> CameraIndex {
        let camera = CameraIndex(camera);
        let address = format!("10.0.0.{}", 10 + camera.0);
        let ip = IpCameraConfig::new(brand, CameraModel::new(model), address).with_onvif(true);
        self.store.add_camera(camera, ip);
        camera
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig::for_variant(camera_core::HardwareVariant::Nvr8)
}

/// Report the camera reachable, the way the connection monitor does
pub fn bring_online(engine: &EventEngine, camera: CameraIndex) {
    engine
        .report_event(camera, CameraEvent::ConnectionFailure, EventState::Active)
        .expect("report connectivity");
}

/// A Matrix event notification frame
pub fn matrix_event(code: &str, active: bool) -> Frame {
    let mut frame = Frame::new("EVT");
    frame.push(1, code).expect("field");
    frame.push(2, if active { "1" } else { "0" }).expect("field");
    frame
}
