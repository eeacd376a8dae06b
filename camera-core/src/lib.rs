//! Camera-facing protocol core of a network video recorder
//!
//! Three services share one set of collaborators:
//!
//! - [`ConfigSessionManager`] fetches stream profiles from cameras, at most one
//!   session per camera and stream.
//! - [`EventEngine`] polls camera events over brand wire protocols or ONVIF
//!   pull-point subscriptions and turns raw reports into debounced
//!   notifications.
//! - [`CommandExecutor`] runs any brand operation end to end.
//!
//! [`CameraCore`] wires them together; reachability for sessions and commands
//! comes from the engine's connectivity status.

pub mod collaborators;
pub mod command;
pub mod config;
pub mod error;
pub mod events;
mod exchange;
pub mod logging;
pub mod session;
pub mod timer;
pub mod types;

use std::sync::Arc;

use camera_api::BrandRegistry;

pub use collaborators::{
    Collaborators, ConfigStore, EventSink, OnvifCallback, OnvifClient, TimerCallback, TimerHandle,
    TimerService, Transport, TransportCallback, TransportHandle, TransportResponse,
};
pub use command::{CommandCallback, CommandExecutor, CommandOutcome};
pub use config::EngineConfig;
pub use error::{CommandStatus, CoreError, Result};
pub use events::{EventCallback, EventEngine, OnvifPhase, Reachability};
pub use logging::{init_logging, LoggingMode};
pub use session::{ConfigSessionManager, ProfileCallback, ProfileConfigResult, RequestPlan};
pub use timer::TokioTimerService;
pub use types::{
    AddMode, CameraConfig, CameraIndex, CompositeIndex, EventRecord, HardwareVariant,
    IpCameraConfig, NormalizedEvent, NotifyRoute,
};

/// The engine, the session manager and the executor over shared collaborators
#[derive(Clone)]
pub struct CameraCore {
    pub events: EventEngine,
    pub sessions: ConfigSessionManager,
    pub commands: CommandExecutor,
}

impl CameraCore {
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Result<Self> {
        Self::with_brands(config, BrandRegistry::default(), collaborators)
    }

    pub fn with_brands(config: EngineConfig, brands: BrandRegistry, collaborators: Collaborators) -> Result<Self> {
        let events = EventEngine::new(config.clone(), brands.clone(), collaborators.clone())?;
        let reachability: Arc<dyn Reachability> = Arc::new(events.clone());
        let sessions = ConfigSessionManager::new(
            config.clone(),
            brands.clone(),
            Arc::clone(&collaborators.store),
            Arc::clone(&collaborators.transport),
            Arc::clone(&reachability),
        );
        let commands = CommandExecutor::new(
            config,
            brands,
            collaborators.store,
            collaborators.transport,
            reachability,
        );
        Ok(Self {
            events,
            sessions,
            commands,
        })
    }
}
