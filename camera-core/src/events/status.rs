//! Per (camera, event) poll status and per camera health groups

use std::sync::Arc;
use std::time::Duration;

use camera_api::{CameraEvent, EventState};
use parking_lot::{Mutex, MutexGuard};

use crate::collaborators::TimerHandle;
use crate::types::{CameraIndex, NotifyRoute};

/// Invoked after every notification emitted for the event it is registered on
pub type EventCallback = Arc<dyn Fn(CameraIndex, CameraEvent, EventState) + Send + Sync>;

/// Why a debounce timer was armed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerPurpose {
    /// Armed on `Active`; the event returns to `Inactive` when it fires
    Hold,
    /// Armed by an `Inactive` report; a repeated `Active` cancels it
    Clear,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ArmedTimer {
    pub handle: TimerHandle,
    pub generation: u64,
    pub purpose: TimerPurpose,
}

pub(crate) struct PollSlot {
    pub polling: bool,
    pub status: EventState,
    pub debounce: Duration,
    pub route: NotifyRoute,
    pub timer: Option<ArmedTimer>,
    pub callback: Option<EventCallback>,
}

impl PollSlot {
    fn new(event: CameraEvent, debounce: Duration) -> Self {
        Self {
            polling: false,
            status: EventState::Inactive,
            debounce,
            route: NotifyRoute::default_for(event),
            timer: None,
            callback: None,
        }
    }

    /// Whether `generation` identifies the timer currently armed on this slot
    pub fn owns_timer(&self, generation: u64) -> bool {
        self.timer.is_some_and(|timer| timer.generation == generation)
    }
}

/// Sticky health of the detection events of one camera
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct HealthGroup {
    motion: EventState,
    no_motion: EventState,
}

impl HealthGroup {
    pub fn get(&self, event: CameraEvent) -> Option<EventState> {
        match event {
            CameraEvent::MotionDetect => Some(self.motion),
            CameraEvent::NoMotion => Some(self.no_motion),
            _ => None,
        }
    }

    /// Update health; events without health tracking are ignored
    pub fn set(&mut self, event: CameraEvent, state: EventState) {
        match event {
            CameraEvent::MotionDetect => self.motion = state,
            CameraEvent::NoMotion => self.no_motion = state,
            _ => {}
        }
    }
}

/// Poll status of every event of every camera
///
/// Lock order: an event slot may be held while taking the health group or
/// the connectivity slot of the same camera, never the other way round.
pub(crate) struct StatusTable {
    max_cameras: usize,
    slots: Vec<Mutex<PollSlot>>,
    health: Vec<Mutex<HealthGroup>>,
}

impl StatusTable {
    pub fn new(max_cameras: usize, debounce: Duration) -> Self {
        let slots = (0..max_cameras)
            .flat_map(|_| CameraEvent::ALL)
            .map(|event| Mutex::new(PollSlot::new(event, debounce)))
            .collect();
        let health = (0..max_cameras)
            .map(|_| Mutex::new(HealthGroup::default()))
            .collect();
        Self {
            max_cameras,
            slots,
            health,
        }
    }

    pub fn max_cameras(&self) -> usize {
        self.max_cameras
    }

    /// Callers validate `camera` against [`StatusTable::max_cameras`] first
    pub fn slot(&self, camera: CameraIndex, event: CameraEvent) -> MutexGuard<'_, PollSlot> {
        self.slots[camera.as_usize() * CameraEvent::COUNT + event.index()].lock()
    }

    pub fn health(&self, camera: CameraIndex) -> MutexGuard<'_, HealthGroup> {
        self.health[camera.as_usize()].lock()
    }

    /// Whether any wire-delivered event of `camera` is being polled
    pub fn any_wire_polling(&self, camera: CameraIndex) -> bool {
        CameraEvent::ALL
            .into_iter()
            .filter(|event| !event.is_synthetic())
            .any(|event| self.slot(camera, event).polling)
    }
}
