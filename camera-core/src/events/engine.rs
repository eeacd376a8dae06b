//! Event polling engine
//!
//! Tracks every (camera, event) pair through `Off → On → {Active, Inactive}`,
//! drives the wire or ONVIF delivery of events and normalizes what cameras
//! report into debounced notifications.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use camera_api::onvif::{self, OnvifAction};
use camera_api::{
    ApiError, BrandProtocol, BrandRegistry, CameraEvent, CameraModel, EventPollRequest,
    EventState, OperationKind, ResponseShape, WireRequest, WireResponse,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use super::onvif::{OnvifEffect, OnvifInput, OnvifPhase};
use super::request::{RequestState, SinglePoll, StreamDecoder};
use super::status::{ArmedTimer, EventCallback, PollSlot, StatusTable, TimerPurpose};
use super::Reachability;
use crate::collaborators::{
    Collaborators, ConfigStore, EventSink, OnvifCallback, OnvifClient, TimerCallback,
    TimerService, Transport, TransportCallback, TransportResponse,
};
use crate::config::EngineConfig;
use crate::error::{CoreError, Result};
use crate::exchange;
use crate::types::{CameraConfig, CameraIndex, EventRecord, IpCameraConfig, NormalizedEvent, NotifyRoute};

/// Event polling engine shared by every camera
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct EventEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    store: Arc<dyn ConfigStore>,
    transport: Arc<dyn Transport>,
    onvif: Arc<dyn OnvifClient>,
    timers: Arc<dyn TimerService>,
    sink: Arc<dyn EventSink>,
    brands: BrandRegistry,
    status: StatusTable,
    requests: Vec<Mutex<RequestState>>,
    generation: AtomicU64,
    events_tx: broadcast::Sender<NormalizedEvent>,
}

impl EventEngine {
    pub fn new(config: EngineConfig, brands: BrandRegistry, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let max_cameras = config.max_cameras();
        let (events_tx, _) = broadcast::channel(config.event_broadcast_capacity);
        let inner = EngineInner {
            status: StatusTable::new(max_cameras, config.default_debounce_delay),
            requests: (0..max_cameras).map(|_| Mutex::new(RequestState::default())).collect(),
            store: collaborators.store,
            transport: collaborators.transport,
            onvif: collaborators.onvif,
            timers: collaborators.timers,
            sink: collaborators.sink,
            brands,
            config,
            generation: AtomicU64::new(1),
            events_tx,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Start delivery of `event` from `camera`
    ///
    /// Idempotent: polling an event that is already on succeeds without
    /// sending anything.
    pub fn start_poll(&self, camera: CameraIndex, event: CameraEvent) -> Result<()> {
        self.inner.start_poll(camera, event)
    }

    /// Stop delivery of `event`; an active event is declared inactive at once
    pub fn stop_poll(&self, camera: CameraIndex, event: CameraEvent) -> Result<()> {
        self.inner.stop_poll(camera, event)
    }

    /// Stop every event of `camera`, e.g. when it is removed from the recorder
    pub fn stop_camera(&self, camera: CameraIndex) -> Result<()> {
        self.inner.check_camera(camera)?;
        for event in CameraEvent::ALL {
            self.inner.stop_poll(camera, event)?;
        }
        Ok(())
    }

    /// Feed a raw event state into normalization
    pub fn report_event(&self, camera: CameraIndex, event: CameraEvent, state: EventState) -> Result<()> {
        self.inner.report_event(camera, event, state)
    }

    pub fn polled_status(&self, camera: CameraIndex, event: CameraEvent) -> Result<EventState> {
        self.inner.check_camera(camera)?;
        Ok(self.inner.status.slot(camera, event).status)
    }

    /// Sticky health of motion and no-motion detection
    pub fn health_status(&self, camera: CameraIndex, event: CameraEvent) -> Result<EventState> {
        self.inner.check_camera(camera)?;
        self.inner
            .status
            .health(camera)
            .get(event)
            .ok_or_else(|| CoreError::InvalidParameter(format!("{event} has no health status")))
    }

    pub fn is_polling(&self, camera: CameraIndex, event: CameraEvent) -> Result<bool> {
        self.inner.check_camera(camera)?;
        Ok(self.inner.status.slot(camera, event).polling)
    }

    /// Event delivery shape currently in use for `camera`
    pub fn response_shape(&self, camera: CameraIndex) -> Result<Option<ResponseShape>> {
        self.inner.check_camera(camera)?;
        Ok(self.inner.requests[camera.as_usize()].lock().shape)
    }

    pub fn onvif_phase(&self, camera: CameraIndex) -> Result<OnvifPhase> {
        self.inner.check_camera(camera)?;
        Ok(self.inner.requests[camera.as_usize()].lock().onvif.phase())
    }

    pub fn set_event_callback(
        &self,
        camera: CameraIndex,
        event: CameraEvent,
        callback: Option<EventCallback>,
    ) -> Result<()> {
        self.inner.check_camera(camera)?;
        self.inner.status.slot(camera, event).callback = callback;
        Ok(())
    }

    pub fn set_notify_route(&self, camera: CameraIndex, event: CameraEvent, route: NotifyRoute) -> Result<()> {
        self.inner.check_camera(camera)?;
        self.inner.status.slot(camera, event).route = route;
        Ok(())
    }

    /// Debounce delay of every event except motion, which uses the camera's
    /// re-detection delay
    pub fn set_debounce_delay(&self, camera: CameraIndex, event: CameraEvent, delay: Duration) -> Result<()> {
        self.inner.check_camera(camera)?;
        if delay.is_zero() {
            return Err(CoreError::InvalidParameter("debounce delay must be greater than 0".into()));
        }
        self.inner.status.slot(camera, event).debounce = delay;
        Ok(())
    }

    /// Receive every notification the engine emits
    pub fn subscribe(&self) -> broadcast::Receiver<NormalizedEvent> {
        self.inner.events_tx.subscribe()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }
}

impl Reachability for EventEngine {
    fn is_reachable(&self, camera: CameraIndex) -> bool {
        self.inner.is_reachable(camera)
    }
}

impl std::fmt::Debug for EventEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEngine")
            .field("max_cameras", &self.inner.status.max_cameras())
            .finish_non_exhaustive()
    }
}

impl EngineInner {
    fn check_camera(&self, camera: CameraIndex) -> Result<()> {
        if camera.as_usize() >= self.status.max_cameras() {
            return Err(CoreError::InvalidParameter(format!(
                "camera {camera} out of range (max {})",
                self.status.max_cameras()
            )));
        }
        Ok(())
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Connectivity status: `Active` means the camera answers
    fn is_reachable(&self, camera: CameraIndex) -> bool {
        camera.as_usize() < self.status.max_cameras()
            && self.status.slot(camera, CameraEvent::ConnectionFailure).status.is_active()
    }

    // ---- StartPoll / StopPoll ----

    fn start_poll(self: &Arc<Self>, camera: CameraIndex, event: CameraEvent) -> Result<()> {
        self.check_camera(camera)?;
        let ip = self
            .store
            .ip_camera_config(camera)
            .ok_or(CoreError::ParamNotConfigured(camera))?;
        if ip.is_auto_config() {
            return Err(CoreError::InvalidParameter(format!(
                "camera {camera} was added without configuration"
            )));
        }

        {
            let mut slot = self.status.slot(camera, event);
            if slot.polling {
                return Ok(());
            }
            slot.polling = true;
        }
        if event.is_synthetic() {
            debug!(camera = %camera, event = %event, "Synthetic event enabled");
            return Ok(());
        }

        let started = if !self.is_reachable(camera) {
            Err(CoreError::CameraDisconnected(camera))
        } else if ip.onvif {
            self.start_onvif(camera, &ip, event)
        } else {
            self.start_wire(camera, &ip, event)
        };

        match started {
            Ok(()) => {
                info!(camera = %camera, event = %event, "Event polling started");
                Ok(())
            }
            Err(e) => {
                self.status.slot(camera, event).polling = false;
                if e.is_not_supported() {
                    debug!(camera = %camera, event = %event, error = %e, "Event not supported");
                } else {
                    warn!(camera = %camera, event = %event, error = %e, "Failed to start event polling");
                }
                Err(e)
            }
        }
    }

    fn stop_poll(self: &Arc<Self>, camera: CameraIndex, event: CameraEvent) -> Result<()> {
        self.check_camera(camera)?;
        let was_active = {
            let mut slot = self.status.slot(camera, event);
            if !slot.polling {
                return Ok(());
            }
            slot.polling = false;
            self.cancel_timer(&mut slot);
            self.deactivate(&mut slot, camera, event)
        };
        if was_active {
            self.notify(camera, event, EventState::Inactive);
        }
        if !event.is_synthetic() {
            self.release(camera, event);
        }
        info!(camera = %camera, event = %event, "Event polling stopped");
        Ok(())
    }

    /// Drop whatever delivers `event`; shared connections go with the last user
    fn release(&self, camera: CameraIndex, event: CameraEvent) {
        let still_wanted = self.status.any_wire_polling(camera);
        let mut stop = Vec::new();
        let mut timers = Vec::new();
        {
            let mut requests = self.requests[camera.as_usize()].lock();
            match requests.shape {
                Some(ResponseShape::MultiPart) if !still_wanted => {
                    let stream = std::mem::take(&mut requests.stream);
                    stop.extend(stream.handle);
                    timers.extend(stream.retry);
                }
                Some(ResponseShape::SinglePart) => {
                    if let Some(poll) = requests.single[event.index()].take() {
                        stop.extend(poll.handle);
                        timers.extend(poll.timer);
                    }
                }
                Some(ResponseShape::Onvif) => requests.onvif.unwant(event),
                _ => {}
            }
            requests.settle_shape();
        }
        for handle in stop {
            self.transport.stop(handle);
        }
        for handle in timers {
            self.timers.delete(handle);
        }
    }

    // ---- ReportEvent ----

    fn report_event(self: &Arc<Self>, camera: CameraIndex, event: CameraEvent, state: EventState) -> Result<()> {
        self.check_camera(camera)?;
        let auto_config = self
            .store
            .ip_camera_config(camera)
            .is_some_and(|ip| ip.is_auto_config());
        let config = self.store.camera_config(camera).unwrap_or_default();

        let notification = {
            let mut slot = self.status.slot(camera, event);
            if !slot.polling && event != CameraEvent::ConnectionFailure && !auto_config {
                trace!(camera = %camera, event = %event, "Ignoring report for event not polled");
                return Ok(());
            }

            if event.has_health_status() && !config.detection_enabled(event) {
                // Health is written from the incoming state first, so "Inactive
                // with health Off" holds exactly when the report is Inactive
                self.status.health(camera).set(event, state);
                if state.is_active() {
                    trace!(camera = %camera, event = %event, "Detection disabled; health updated");
                    return Ok(());
                }
            }

            if event == CameraEvent::ConnectionFailure {
                self.apply_connectivity(&mut slot, camera, &config, state)
            } else if slot.status == state {
                if state.is_active() {
                    self.repeat_active(&mut slot, camera, event);
                }
                None
            } else if state.is_active() {
                self.activate(&mut slot, camera, event, &config);
                Some((event, EventState::Active))
            } else {
                self.defer_inactive(&mut slot, camera, event, &config)
            }
        };

        if let Some((event, state)) = notification {
            self.notify(camera, event, state);
        }
        Ok(())
    }

    fn apply_connectivity(
        &self,
        slot: &mut PollSlot,
        camera: CameraIndex,
        config: &CameraConfig,
        state: EventState,
    ) -> Option<(CameraEvent, EventState)> {
        if slot.status == state {
            return None;
        }
        slot.status = state;
        match state {
            EventState::Active if !config.enabled => {
                debug!(camera = %camera, "Disabled camera reachable again");
                None
            }
            EventState::Active => {
                info!(camera = %camera, "Camera online");
                Some((CameraEvent::CameraOnline, EventState::Active))
            }
            EventState::Inactive => {
                warn!(camera = %camera, "Camera connection lost");
                Some((CameraEvent::ConnectionFailure, EventState::Inactive))
            }
        }
    }

    /// `Active` again while already active. A pending inactive is dropped; a
    /// running hold keeps its original deadline.
    fn repeat_active(&self, slot: &mut PollSlot, camera: CameraIndex, event: CameraEvent) {
        if slot.timer.is_some_and(|timer| timer.purpose == TimerPurpose::Clear) {
            trace!(camera = %camera, event = %event, "Pending inactive cancelled");
            self.cancel_timer(slot);
        }
    }

    fn activate(self: &Arc<Self>, slot: &mut PollSlot, camera: CameraIndex, event: CameraEvent, config: &CameraConfig) {
        slot.status = EventState::Active;
        self.status.health(camera).set(event, EventState::Active);
        self.cancel_timer(slot);
        if event == CameraEvent::MotionDetect || event.is_latching() {
            let delay = self.delay_for(slot, event, config);
            self.arm_timer(slot, camera, event, delay, TimerPurpose::Hold);
        }
    }

    fn defer_inactive(
        self: &Arc<Self>,
        slot: &mut PollSlot,
        camera: CameraIndex,
        event: CameraEvent,
        config: &CameraConfig,
    ) -> Option<(CameraEvent, EventState)> {
        if config.enabled && self.is_reachable(camera) {
            if slot.timer.is_some() {
                return None;
            }
            let delay = self.delay_for(slot, event, config);
            if self.arm_timer(slot, camera, event, delay, TimerPurpose::Clear) {
                return None;
            }
        }
        self.cancel_timer(slot);
        self.deactivate(slot, camera, event)
            .then_some((event, EventState::Inactive))
    }

    fn delay_for(&self, slot: &PollSlot, event: CameraEvent, config: &CameraConfig) -> Duration {
        match event {
            CameraEvent::MotionDetect => config.redetection_delay,
            _ => slot.debounce,
        }
    }

    /// Force the slot inactive. Returns whether it was active.
    fn deactivate(&self, slot: &mut PollSlot, camera: CameraIndex, event: CameraEvent) -> bool {
        if !slot.status.is_active() {
            return false;
        }
        slot.status = EventState::Inactive;
        self.status.health(camera).set(event, EventState::Inactive);
        true
    }

    // ---- Debounce timers ----

    fn arm_timer(
        self: &Arc<Self>,
        slot: &mut PollSlot,
        camera: CameraIndex,
        event: CameraEvent,
        delay: Duration,
        purpose: TimerPurpose,
    ) -> bool {
        let generation = self.next_generation();
        let engine = Arc::downgrade(self);
        let callback: TimerCallback = Box::new(move || {
            if let Some(engine) = engine.upgrade() {
                engine.declare_normal(camera, event, generation);
            }
        });
        match self.timers.start(delay, callback) {
            Ok(handle) => {
                slot.timer = Some(ArmedTimer {
                    handle,
                    generation,
                    purpose,
                });
                true
            }
            Err(e) => {
                warn!(camera = %camera, event = %event, error = %e, "Failed to arm debounce timer");
                false
            }
        }
    }

    fn cancel_timer(&self, slot: &mut PollSlot) {
        if let Some(timer) = slot.timer.take() {
            self.timers.delete(timer.handle);
        }
    }

    /// Debounce timer expiry
    fn declare_normal(&self, camera: CameraIndex, event: CameraEvent, generation: u64) {
        let was_active = {
            let mut slot = self.status.slot(camera, event);
            if !slot.owns_timer(generation) {
                trace!(camera = %camera, event = %event, "Stale debounce timer ignored");
                return;
            }
            self.cancel_timer(&mut slot);
            self.deactivate(&mut slot, camera, event)
        };
        if was_active {
            debug!(camera = %camera, event = %event, "Debounce elapsed");
            self.notify(camera, event, EventState::Inactive);
        }
    }

    /// Declare inactive without debounce
    fn force_inactive(&self, camera: CameraIndex, event: CameraEvent) {
        let was_active = {
            let mut slot = self.status.slot(camera, event);
            self.cancel_timer(&mut slot);
            self.deactivate(&mut slot, camera, event)
        };
        if was_active {
            self.notify(camera, event, EventState::Inactive);
        }
    }

    fn notify(&self, camera: CameraIndex, event: CameraEvent, state: EventState) {
        let (route, callback) = {
            let slot = self.status.slot(camera, event);
            (slot.route, slot.callback.clone())
        };

        let record = EventRecord::now(camera, event, state);
        match route {
            NotifyRoute::NetworkOnly => self.sink.send_network_event(&record),
            NotifyRoute::Logged => self.sink.write_event(&record),
        }
        // No subscribers is fine
        let _ = self.events_tx.send(NormalizedEvent {
            camera,
            event,
            state,
            route,
        });
        if let Some(callback) = callback {
            callback(camera, event, state);
        }
        debug!(camera = %camera, event = %event, state = ?state, route = ?route, "Event notified");
    }

    // ---- Wire delivery ----

    fn start_wire(self: &Arc<Self>, camera: CameraIndex, ip: &IpCameraConfig, event: CameraEvent) -> Result<()> {
        let protocol = self.brands.lookup(ip.brand);
        let poll = protocol.event_request(&ip.model, event)?;
        match poll.shape {
            ResponseShape::MultiPart => self.open_stream(camera, ip, poll, false),
            ResponseShape::SinglePart => self.start_single(camera, ip, event, poll.request),
            ResponseShape::Onvif => Err(ApiError::not_supported(ip.brand, OperationKind::GetEventUrl).into()),
        }
    }

    fn open_stream(
        self: &Arc<Self>,
        camera: CameraIndex,
        ip: &IpCameraConfig,
        poll: EventPollRequest,
        reopen: bool,
    ) -> Result<()> {
        let generation = self.next_generation();
        {
            let mut requests = self.requests[camera.as_usize()].lock();
            if !reopen && requests.stream.is_open() {
                return Ok(());
            }
            requests.shape = Some(ResponseShape::MultiPart);
            requests.stream.poll = Some(poll.clone());
            requests.stream.generation = generation;
            requests.stream.handle = None;
            requests.stream.retry = None;
        }

        let callback = self.stream_callback(camera, ip, &poll, generation);
        match self.transport.send(ip, &poll.request, callback) {
            Ok(handle) => {
                let current = {
                    let mut requests = self.requests[camera.as_usize()].lock();
                    let current = requests.stream.generation == generation && requests.stream.is_open();
                    if current {
                        requests.stream.handle = Some(handle);
                    }
                    current
                };
                if !current {
                    self.transport.stop(handle);
                }
                debug!(camera = %camera, request = %poll.request.describe(), "Event stream opened");
                Ok(())
            }
            Err(e) if reopen => {
                warn!(camera = %camera, error = %e, "Failed to re-open event stream");
                self.schedule_stream_retry(camera, generation);
                Ok(())
            }
            Err(e) => {
                let mut requests = self.requests[camera.as_usize()].lock();
                if requests.stream.generation == generation {
                    requests.stream = Default::default();
                    requests.settle_shape();
                }
                Err(e)
            }
        }
    }

    fn stream_callback(
        self: &Arc<Self>,
        camera: CameraIndex,
        ip: &IpCameraConfig,
        poll: &EventPollRequest,
        generation: u64,
    ) -> TransportCallback {
        let engine: Weak<Self> = Arc::downgrade(self);
        let protocol = self.brands.lookup(ip.brand);
        let model = ip.model.clone();
        let decoder = Mutex::new(StreamDecoder::for_request(poll));

        Arc::new(move |response: TransportResponse| {
            let Some(engine) = engine.upgrade() else {
                return;
            };
            if !engine.stream_current(camera, generation) {
                return;
            }
            match response {
                TransportResponse::Data(data) => {
                    let units = decoder.lock().push(&data);
                    for unit in units {
                        engine.dispatch_payload(camera, protocol.as_ref(), &model, None, unit);
                    }
                }
                TransportResponse::Complete { status } => {
                    engine.stream_dropped(camera, generation, &format!("stream ended with status {status}"));
                }
                TransportResponse::Closed => engine.stream_dropped(camera, generation, "connection closed"),
                TransportResponse::Error(e) => engine.stream_dropped(camera, generation, &e),
            }
        })
    }

    fn stream_current(&self, camera: CameraIndex, generation: u64) -> bool {
        let requests = self.requests[camera.as_usize()].lock();
        requests.stream.is_open() && requests.stream.generation == generation
    }

    fn stream_dropped(self: &Arc<Self>, camera: CameraIndex, generation: u64, reason: &str) {
        if !self.status.any_wire_polling(camera) {
            let mut requests = self.requests[camera.as_usize()].lock();
            if requests.stream.generation == generation {
                requests.stream = Default::default();
                requests.settle_shape();
            }
            return;
        }
        warn!(
            camera = %camera,
            reason,
            retry_in = ?self.config.event_retry_interval,
            "Event stream dropped"
        );
        self.schedule_stream_retry(camera, generation);
    }

    fn schedule_stream_retry(self: &Arc<Self>, camera: CameraIndex, generation: u64) {
        let engine = Arc::downgrade(self);
        let callback: TimerCallback = Box::new(move || {
            if let Some(engine) = engine.upgrade() {
                engine.reopen_stream(camera, generation);
            }
        });
        let mut requests = self.requests[camera.as_usize()].lock();
        if requests.stream.generation != generation || !requests.stream.is_open() {
            return;
        }
        requests.stream.handle = None;
        match self.timers.start(self.config.event_retry_interval, callback) {
            Ok(handle) => requests.stream.retry = Some(handle),
            Err(e) => {
                warn!(camera = %camera, error = %e, "Cannot schedule event stream retry");
                requests.stream = Default::default();
                requests.settle_shape();
            }
        }
    }

    fn reopen_stream(self: &Arc<Self>, camera: CameraIndex, generation: u64) {
        let poll = {
            let mut requests = self.requests[camera.as_usize()].lock();
            if requests.stream.generation != generation || requests.stream.retry.take().is_none() {
                return;
            }
            requests.stream.poll.clone()
        };
        let (Some(poll), Some(ip)) = (poll, self.store.ip_camera_config(camera)) else {
            return;
        };
        if !self.status.any_wire_polling(camera) {
            return;
        }
        // Errors re-arm the retry timer inside open_stream
        let _ = self.open_stream(camera, &ip, poll, true);
    }

    fn start_single(
        self: &Arc<Self>,
        camera: CameraIndex,
        ip: &IpCameraConfig,
        event: CameraEvent,
        request: WireRequest,
    ) -> Result<()> {
        let generation = self.next_generation();
        {
            let mut requests = self.requests[camera.as_usize()].lock();
            requests.shape = Some(ResponseShape::SinglePart);
            requests.single[event.index()] = Some(SinglePoll {
                request: request.clone(),
                generation,
                handle: None,
                timer: None,
            });
        }
        if let Err(e) = self.send_single(camera, ip, event, &request, generation) {
            let mut requests = self.requests[camera.as_usize()].lock();
            if requests.single_matches(event, generation) {
                requests.single[event.index()] = None;
                requests.settle_shape();
            }
            return Err(e);
        }
        Ok(())
    }

    fn send_single(
        self: &Arc<Self>,
        camera: CameraIndex,
        ip: &IpCameraConfig,
        event: CameraEvent,
        request: &WireRequest,
        generation: u64,
    ) -> Result<()> {
        let engine = Arc::downgrade(self);
        let protocol = self.brands.lookup(ip.brand);
        let model = ip.model.clone();
        let on_complete = Box::new(move |outcome: Result<WireResponse>| {
            if let Some(engine) = engine.upgrade() {
                engine.single_completed(camera, event, generation, protocol.as_ref(), &model, outcome);
            }
        });

        let handle = exchange::send_request(self.transport.as_ref(), ip, request, on_complete)?;
        let mut requests = self.requests[camera.as_usize()].lock();
        if let Some(poll) = requests.single_mut(event, generation) {
            if poll.timer.is_none() {
                poll.handle = Some(handle);
            }
        }
        Ok(())
    }

    fn single_completed(
        self: &Arc<Self>,
        camera: CameraIndex,
        event: CameraEvent,
        generation: u64,
        protocol: &dyn BrandProtocol,
        model: &CameraModel,
        outcome: Result<WireResponse>,
    ) {
        if !self.requests[camera.as_usize()].lock().single_matches(event, generation) {
            return;
        }
        let delay = match outcome {
            Ok(response) => {
                self.dispatch_payload(camera, protocol, model, Some(event), Ok(response));
                self.config.event_poll_interval
            }
            Err(e) => {
                debug!(camera = %camera, event = %event, error = %e, "Event poll failed");
                self.config.event_retry_interval
            }
        };
        self.schedule_single(camera, event, generation, delay);
    }

    fn schedule_single(self: &Arc<Self>, camera: CameraIndex, event: CameraEvent, generation: u64, delay: Duration) {
        let engine = Arc::downgrade(self);
        let callback: TimerCallback = Box::new(move || {
            if let Some(engine) = engine.upgrade() {
                engine.resend_single(camera, event, generation);
            }
        });
        let mut requests = self.requests[camera.as_usize()].lock();
        let Some(poll) = requests.single_mut(event, generation) else {
            return;
        };
        poll.handle = None;
        match self.timers.start(delay, callback) {
            Ok(handle) => poll.timer = Some(handle),
            Err(e) => {
                warn!(camera = %camera, event = %event, error = %e, "Cannot schedule event poll");
                requests.single[event.index()] = None;
                requests.settle_shape();
            }
        }
    }

    fn resend_single(self: &Arc<Self>, camera: CameraIndex, event: CameraEvent, generation: u64) {
        let request = {
            let mut requests = self.requests[camera.as_usize()].lock();
            let Some(poll) = requests.single_mut(event, generation) else {
                return;
            };
            poll.timer = None;
            poll.request.clone()
        };
        let Some(ip) = self.store.ip_camera_config(camera) else {
            return;
        };
        if let Err(e) = self.send_single(camera, &ip, event, &request, generation) {
            debug!(camera = %camera, event = %event, error = %e, "Event poll not sent");
            self.schedule_single(camera, event, generation, self.config.event_retry_interval);
        }
    }

    /// Parse one complete payload and feed what it reports into normalization
    fn dispatch_payload(
        self: &Arc<Self>,
        camera: CameraIndex,
        protocol: &dyn BrandProtocol,
        model: &CameraModel,
        polled: Option<CameraEvent>,
        payload: std::result::Result<WireResponse, ApiError>,
    ) {
        let reports = payload.and_then(|response| protocol.parse_events(model, polled, &response));
        match reports {
            Ok(reports) => {
                for (event, state) in reports {
                    if let Err(e) = self.report_event(camera, event, state) {
                        debug!(camera = %camera, event = %event, error = %e, "Report rejected");
                    }
                }
            }
            Err(e) => debug!(camera = %camera, error = %e, "Discarding event payload"),
        }
    }

    // ---- ONVIF delivery ----

    fn start_onvif(self: &Arc<Self>, camera: CameraIndex, ip: &IpCameraConfig, event: CameraEvent) -> Result<()> {
        let (effects, generation) = {
            let mut requests = self.requests[camera.as_usize()].lock();
            requests.shape = Some(ResponseShape::Onvif);
            if requests.onvif.want(event) {
                return Ok(());
            }
            let effects = requests.onvif.step(OnvifInput::Start, &self.config);
            (effects, requests.onvif.generation())
        };

        if let Err(e) = self.run_onvif_effects(camera, ip, generation, effects) {
            {
                let mut requests = self.requests[camera.as_usize()].lock();
                requests.onvif.unwant(event);
            }
            self.feed_onvif(camera, generation, OnvifInput::Failed);
            self.requests[camera.as_usize()].lock().settle_shape();
            return Err(e);
        }
        Ok(())
    }

    /// Apply one input to the camera's subscription unless it is stale
    fn feed_onvif(self: &Arc<Self>, camera: CameraIndex, generation: u64, input: OnvifInput) {
        let (effects, generation) = {
            let mut requests = self.requests[camera.as_usize()].lock();
            if requests.onvif.generation() != generation {
                trace!(camera = %camera, "Stale ONVIF callback ignored");
                return;
            }
            let effects = requests.onvif.step(input, &self.config);
            if requests.onvif.phase() == OnvifPhase::Idle {
                requests.settle_shape();
            }
            (effects, requests.onvif.generation())
        };
        if effects.is_empty() {
            return;
        }
        let Some(ip) = self.store.ip_camera_config(camera) else {
            return;
        };
        if let Err(e) = self.run_onvif_effects(camera, &ip, generation, effects) {
            warn!(camera = %camera, error = %e, "ONVIF request not sent");
            self.feed_onvif(camera, generation, OnvifInput::Failed);
        }
    }

    fn run_onvif_effects(
        self: &Arc<Self>,
        camera: CameraIndex,
        ip: &IpCameraConfig,
        generation: u64,
        effects: Vec<OnvifEffect>,
    ) -> Result<()> {
        for effect in effects {
            match effect {
                OnvifEffect::Send(request) => {
                    let engine = Arc::downgrade(self);
                    let action = request.action;
                    let callback: OnvifCallback = Box::new(move |response| {
                        if let Some(engine) = engine.upgrade() {
                            engine.onvif_response(camera, generation, action, response);
                        }
                    });
                    trace!(camera = %camera, action = ?action, "ONVIF request");
                    self.onvif.start_operation(ip, request, callback)?;
                }
                OnvifEffect::ArmNotify(delay) => self.arm_onvif_timer(camera, generation, delay, OnvifInput::NotifyTick),
                OnvifEffect::ArmRetry(delay) => self.arm_onvif_timer(camera, generation, delay, OnvifInput::RetryTick),
                OnvifEffect::Report(event, state) => {
                    if let Err(e) = self.report_event(camera, event, state) {
                        debug!(camera = %camera, event = %event, error = %e, "Report rejected");
                    }
                }
                OnvifEffect::ForceInactive(event) => {
                    debug!(camera = %camera, event = %event, "Event missing from notifications");
                    self.force_inactive(camera, event);
                }
            }
        }
        Ok(())
    }

    fn arm_onvif_timer(self: &Arc<Self>, camera: CameraIndex, generation: u64, delay: Duration, input: OnvifInput) {
        let engine = Arc::downgrade(self);
        let callback: TimerCallback = Box::new(move || {
            if let Some(engine) = engine.upgrade() {
                engine.feed_onvif(camera, generation, input);
            }
        });
        if let Err(e) = self.timers.start(delay, callback) {
            warn!(camera = %camera, error = %e, "Cannot arm ONVIF timer");
        }
    }

    fn onvif_response(
        self: &Arc<Self>,
        camera: CameraIndex,
        generation: u64,
        action: OnvifAction,
        response: std::result::Result<String, String>,
    ) {
        let input = match (action, response) {
            (_, Err(e)) => {
                warn!(camera = %camera, action = ?action, error = %e, "ONVIF request failed");
                OnvifInput::Failed
            }
            (OnvifAction::CreatePullPointSubscription, Ok(body)) => match onvif::parse_subscription(&body) {
                Ok(address) => {
                    info!(camera = %camera, address = %address, "ONVIF subscription created");
                    OnvifInput::Subscribed(address)
                }
                Err(e) => {
                    warn!(camera = %camera, error = %e, "Bad subscription response");
                    OnvifInput::Failed
                }
            },
            (OnvifAction::PullMessages, Ok(body)) => match onvif::parse_pull_messages(&body) {
                Ok(reports) => OnvifInput::Messages(reports),
                Err(e) => {
                    warn!(camera = %camera, error = %e, "Bad PullMessages response");
                    OnvifInput::Failed
                }
            },
            (OnvifAction::Renew, Ok(body)) => match onvif::parse_envelope(&body) {
                Ok(_) => OnvifInput::Renewed,
                Err(e) => {
                    debug!(camera = %camera, error = %e, "Renew refused");
                    OnvifInput::Failed
                }
            },
            (OnvifAction::Unsubscribe, Ok(_)) => OnvifInput::Unsubscribed,
        };
        self.feed_onvif(camera, generation, input);
    }
}
