//! ONVIF pull-point subscription state machine
//!
//! The machine is pure: [`OnvifSubscription::step`] consumes one input and
//! returns the effects the engine must carry out. Every SOAP call, timer and
//! event report therefore flows through a single transition function.

use std::time::Duration;

use camera_api::onvif::{self, OnvifRequest};
use camera_api::{CameraEvent, EventReport, EventState};

use crate::config::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnvifPhase {
    #[default]
    Idle,
    Subscribing,
    /// Pulling messages on the notify interval
    Subscribed,
    Renewing,
    Unsubscribing,
}

/// Consecutive pulls an event has been missing from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissCounter {
    /// Not reported since the subscription started or the last forced reset
    #[default]
    NotArrived,
    Missing(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnvifInput {
    /// Polling was switched on for some event
    Start,
    /// CreatePullPointSubscription answered with this manager address
    Subscribed(String),
    NotifyTick,
    Messages(Vec<EventReport>),
    Renewed,
    /// The outstanding SOAP call failed
    Failed,
    Unsubscribed,
    RetryTick,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnvifEffect {
    Send(OnvifRequest),
    ArmNotify(Duration),
    ArmRetry(Duration),
    Report(CameraEvent, EventState),
    ForceInactive(CameraEvent),
}

/// Subscription state of one camera
#[derive(Debug, Default)]
pub struct OnvifSubscription {
    phase: OnvifPhase,
    address: Option<String>,
    /// The shared "all events" flag
    all_events: bool,
    wanted: [bool; CameraEvent::COUNT],
    misses: [MissCounter; CameraEvent::COUNT],
    renew_counter: u32,
    generation: u64,
}

impl OnvifSubscription {
    pub fn phase(&self) -> OnvifPhase {
        self.phase
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Bumped whenever a new subscription is attempted; responses carrying an
    /// older generation belong to a subscription that no longer exists
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_active(&self) -> bool {
        self.all_events
    }

    pub fn misses(&self, event: CameraEvent) -> MissCounter {
        self.misses[event.index()]
    }

    pub fn renew_counter(&self) -> u32 {
        self.renew_counter
    }

    /// Mark `event` as wanted. Returns true if the shared flag was already on.
    pub fn want(&mut self, event: CameraEvent) -> bool {
        self.wanted[event.index()] = true;
        std::mem::replace(&mut self.all_events, true)
    }

    /// Drop `event`; the shared flag turns off with the last wanted event
    pub fn unwant(&mut self, event: CameraEvent) {
        self.wanted[event.index()] = false;
        self.all_events = self.wanted.iter().any(|wanted| *wanted);
    }

    pub fn step(&mut self, input: OnvifInput, config: &EngineConfig) -> Vec<OnvifEffect> {
        use OnvifInput as In;
        use OnvifPhase as Ph;

        match (self.phase, input) {
            (Ph::Idle, In::Start | In::RetryTick) if self.all_events => {
                self.phase = Ph::Subscribing;
                self.generation += 1;
                vec![OnvifEffect::Send(onvif::create_pull_point_subscription(
                    config.onvif_subscription_timeout,
                ))]
            }
            (Ph::Subscribing, In::Subscribed(address)) => {
                self.renew_counter = 0;
                self.misses = [MissCounter::NotArrived; CameraEvent::COUNT];
                self.address = Some(address);
                if self.all_events {
                    self.phase = Ph::Subscribed;
                    vec![self.pull(config)]
                } else {
                    self.unsubscribe()
                }
            }
            (Ph::Subscribing, In::Failed) => self.reset(config),
            (Ph::Subscribed, In::NotifyTick) => {
                if self.all_events {
                    vec![self.pull(config)]
                } else {
                    self.unsubscribe()
                }
            }
            (Ph::Subscribed, In::Messages(reports)) => self.on_messages(reports, config),
            (Ph::Subscribed, In::Failed) => self.unsubscribe(),
            (Ph::Renewing, In::Renewed | In::Failed) => {
                self.phase = Ph::Subscribed;
                vec![OnvifEffect::ArmNotify(config.onvif_notify_interval)]
            }
            (Ph::Unsubscribing, In::Unsubscribed | In::Failed) => self.reset(config),
            _ => Vec::new(),
        }
    }

    fn pull(&self, config: &EngineConfig) -> OnvifEffect {
        let address = self.address.as_deref().unwrap_or_default();
        OnvifEffect::Send(onvif::pull_messages(
            address,
            config.onvif_notify_interval,
            config.onvif_message_limit,
        ))
    }

    fn unsubscribe(&mut self) -> Vec<OnvifEffect> {
        match self.address.as_deref() {
            Some(address) => {
                self.phase = OnvifPhase::Unsubscribing;
                vec![OnvifEffect::Send(onvif::unsubscribe(address))]
            }
            None => {
                self.phase = OnvifPhase::Idle;
                Vec::new()
            }
        }
    }

    /// Back to idle; retry later if events are still wanted
    fn reset(&mut self, config: &EngineConfig) -> Vec<OnvifEffect> {
        self.phase = OnvifPhase::Idle;
        self.address = None;
        if self.all_events {
            vec![OnvifEffect::ArmRetry(config.event_retry_interval)]
        } else {
            Vec::new()
        }
    }

    fn on_messages(&mut self, reports: Vec<EventReport>, config: &EngineConfig) -> Vec<OnvifEffect> {
        let mut effects = Vec::new();
        let mut arrived = [false; CameraEvent::COUNT];

        for (event, state) in reports {
            arrived[event.index()] = true;
            self.misses[event.index()] = MissCounter::Missing(0);
            effects.push(OnvifEffect::Report(event, state));
        }

        for event in CameraEvent::ALL {
            let index = event.index();
            if !self.wanted[index] || arrived[index] {
                continue;
            }
            if let MissCounter::Missing(count) = self.misses[index] {
                let count = count + 1;
                if count >= config.onvif_max_event_wait_count {
                    effects.push(OnvifEffect::ForceInactive(event));
                    self.misses[index] = MissCounter::NotArrived;
                } else {
                    self.misses[index] = MissCounter::Missing(count);
                }
            }
        }

        self.renew_counter += 1;
        if self.renew_counter >= config.onvif_renew_poll_count {
            self.renew_counter = 0;
            self.phase = OnvifPhase::Renewing;
            let address = self.address.as_deref().unwrap_or_default();
            effects.push(OnvifEffect::Send(onvif::renew(
                address,
                config.onvif_subscription_timeout,
            )));
        } else {
            effects.push(OnvifEffect::ArmNotify(config.onvif_notify_interval));
        }
        effects
    }
}
