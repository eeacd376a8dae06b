//! Configuration types for the camera-core crate
//!
//! This module defines the settings that control the event engine, the ONVIF
//! subscription loop and the config session workers.

use std::time::Duration;

use crate::error::{CoreError, Result};
use crate::types::HardwareVariant;

/// Configuration for the camera core
///
/// Sizes every per-camera table from the hardware variant and holds the
/// timer intervals used by event polling and config sessions.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Recorder hardware; decides how many cameras are tracked
    /// Default: Nvr16
    pub hardware_variant: HardwareVariant,

    /// Debounce delay before an event other than motion is declared inactive
    /// Default: 5 seconds
    pub default_debounce_delay: Duration,

    /// Interval between ONVIF PullMessages requests
    /// Default: 1 second
    pub onvif_notify_interval: Duration,

    /// Number of PullMessages rounds between subscription renewals
    /// Default: 50
    pub onvif_renew_poll_count: u32,

    /// Consecutive pulls an event may be missing before it is forced inactive
    /// Default: 60
    pub onvif_max_event_wait_count: u32,

    /// Termination time requested for ONVIF pull-point subscriptions
    /// Default: 60 seconds
    pub onvif_subscription_timeout: Duration,

    /// Maximum number of messages requested per PullMessages call
    /// Default: 16
    pub onvif_message_limit: u32,

    /// Interval between single-part event polls
    /// Default: 1 second
    pub event_poll_interval: Duration,

    /// Delay before a dropped event stream is re-opened
    /// Default: 10 seconds
    pub event_retry_interval: Duration,

    /// How long a config session waits for each camera response
    /// Default: 10 seconds
    pub session_response_timeout: Duration,

    /// Capacity of the normalized event broadcast channel
    /// Default: 256
    pub event_broadcast_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hardware_variant: HardwareVariant::default(),
            default_debounce_delay: Duration::from_secs(5),
            onvif_notify_interval: Duration::from_secs(1),
            onvif_renew_poll_count: 50,
            onvif_max_event_wait_count: 60,
            onvif_subscription_timeout: Duration::from_secs(60),
            onvif_message_limit: 16,
            event_poll_interval: Duration::from_secs(1),
            event_retry_interval: Duration::from_secs(10),
            session_response_timeout: Duration::from_secs(10),
            event_broadcast_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Create a new EngineConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an EngineConfig for a given hardware variant
    pub fn for_variant(hardware_variant: HardwareVariant) -> Self {
        Self {
            hardware_variant,
            ..Default::default()
        }
    }

    /// Create an EngineConfig tuned for quick reaction to camera changes
    pub fn responsive() -> Self {
        Self {
            default_debounce_delay: Duration::from_secs(2),
            onvif_max_event_wait_count: 20,
            event_retry_interval: Duration::from_secs(3),
            session_response_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    /// Create an EngineConfig that keeps camera traffic low
    pub fn low_traffic() -> Self {
        Self {
            onvif_notify_interval: Duration::from_secs(2),
            onvif_renew_poll_count: 25,
            onvif_max_event_wait_count: 30,
            onvif_subscription_timeout: Duration::from_secs(120),
            event_poll_interval: Duration::from_secs(3),
            event_retry_interval: Duration::from_secs(30),
            ..Default::default()
        }
    }

    pub fn max_cameras(&self) -> usize {
        self.hardware_variant.max_cameras()
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.onvif_notify_interval.is_zero() {
            return Err(CoreError::Configuration(
                "ONVIF notify interval must be greater than 0".to_string(),
            ));
        }

        if self.onvif_renew_poll_count == 0 {
            return Err(CoreError::Configuration(
                "ONVIF renew poll count must be greater than 0".to_string(),
            ));
        }

        if self.onvif_max_event_wait_count == 0 {
            return Err(CoreError::Configuration(
                "ONVIF max event wait count must be greater than 0".to_string(),
            ));
        }

        // The subscription has to outlive the renewal period
        let renew_period = self.onvif_notify_interval * self.onvif_renew_poll_count;
        if self.onvif_subscription_timeout <= renew_period {
            return Err(CoreError::Configuration(
                "ONVIF subscription timeout must exceed the renewal period".to_string(),
            ));
        }

        if self.onvif_message_limit == 0 {
            return Err(CoreError::Configuration(
                "ONVIF message limit must be greater than 0".to_string(),
            ));
        }

        if self.event_poll_interval.is_zero() || self.event_retry_interval.is_zero() {
            return Err(CoreError::Configuration(
                "Event poll and retry intervals must be greater than 0".to_string(),
            ));
        }

        if self.session_response_timeout.is_zero() {
            return Err(CoreError::Configuration(
                "Session response timeout must be greater than 0".to_string(),
            ));
        }

        if self.event_broadcast_capacity == 0 {
            return Err(CoreError::Configuration(
                "Event broadcast capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder pattern methods for fluent configuration

    pub fn with_hardware_variant(mut self, variant: HardwareVariant) -> Self {
        self.hardware_variant = variant;
        self
    }

    pub fn with_debounce_delay(mut self, delay: Duration) -> Self {
        self.default_debounce_delay = delay;
        self
    }

    pub fn with_onvif_polling(mut self, interval: Duration, renew_count: u32, max_wait: u32) -> Self {
        self.onvif_notify_interval = interval;
        self.onvif_renew_poll_count = renew_count;
        self.onvif_max_event_wait_count = max_wait;
        self
    }

    pub fn with_event_intervals(mut self, poll: Duration, retry: Duration) -> Self {
        self.event_poll_interval = poll;
        self.event_retry_interval = retry;
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_response_timeout = timeout;
        self
    }
}
