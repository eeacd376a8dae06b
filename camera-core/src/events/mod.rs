//! Event polling: status tracking, wire and ONVIF delivery, normalization

mod engine;
pub mod onvif;
mod request;
mod status;

pub use engine::EventEngine;
pub use onvif::{MissCounter, OnvifPhase};
pub use status::EventCallback;

use crate::types::CameraIndex;

/// Whether a camera currently answers on the network
pub trait Reachability: Send + Sync {
    fn is_reachable(&self, camera: CameraIndex) -> bool;
}
