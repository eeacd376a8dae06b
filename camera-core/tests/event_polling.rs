//! Event engine behavior over brand wire protocols
//!
//! Timers are manual, so every debounce and retry fires exactly when a test
//! asks for it.

mod common;

use std::sync::Arc;
use std::time::Duration;

use camera_api::{Brand, CameraEvent, CameraModel, EventState, ResponseShape};
use camera_core::{
    AddMode, CameraConfig, CameraIndex, CommandStatus, CoreError, EventCallback, IpCameraConfig,
    NotifyRoute, TransportResponse,
};
use common::{bring_online, matrix_event, Harness};
use parking_lot::Mutex;
use proptest::prelude::*;
use rstest::rstest;

use CameraEvent::*;
use EventState::{Active, Inactive};

fn matrix_camera(harness: &Harness) -> CameraIndex {
    harness.add_camera(0, Brand::Matrix, "MX-IPC-2MP")
}

#[test]
fn test_start_poll_is_idempotent() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = matrix_camera(&harness);
    bring_online(&engine, camera);

    engine.start_poll(camera, MotionDetect).unwrap();
    engine.start_poll(camera, MotionDetect).unwrap();
    assert_eq!(harness.transport.descriptions(), vec!["TCP SUB_EVT"]);

    // The event stream is shared by every event of the camera
    engine.start_poll(camera, ViewTamper).unwrap();
    assert_eq!(harness.transport.sent_count(), 1);
    assert_eq!(engine.response_shape(camera).unwrap(), Some(ResponseShape::MultiPart));
    assert!(engine.is_polling(camera, ViewTamper).unwrap());
}

#[rstest]
#[case(ConnectionFailure)]
#[case(RecordingFail)]
#[case(RecordingStart)]
#[case(CameraOnline)]
fn test_synthetic_events_send_nothing(#[case] event: CameraEvent) {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = matrix_camera(&harness);

    engine.start_poll(camera, event).unwrap();

    assert!(engine.is_polling(camera, event).unwrap());
    assert_eq!(harness.transport.sent_count(), 0);
    assert_eq!(engine.response_shape(camera).unwrap(), None);
}

#[test]
fn test_unreachable_camera_rolls_back() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = matrix_camera(&harness);

    let err = engine.start_poll(camera, MotionDetect).unwrap_err();
    assert!(matches!(err, CoreError::CameraDisconnected(c) if c == camera));
    assert!(!engine.is_polling(camera, MotionDetect).unwrap());
    assert_eq!(harness.transport.sent_count(), 0);
}

#[test]
fn test_start_poll_argument_checks() {
    let harness = Harness::new();
    let engine = harness.engine();

    let err = engine.start_poll(CameraIndex(8), MotionDetect).unwrap_err();
    assert_eq!(err.status(), CommandStatus::InvalidParameter);

    let err = engine.start_poll(CameraIndex(3), MotionDetect).unwrap_err();
    assert_eq!(err.status(), CommandStatus::ParamNotConfigured);
}

#[test]
fn test_transport_failure_rolls_back() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = matrix_camera(&harness);
    bring_online(&engine, camera);
    harness.transport.refuse_connections(true);

    let err = engine.start_poll(camera, MotionDetect).unwrap_err();
    assert_eq!(err.status(), CommandStatus::Fail);
    assert!(!engine.is_polling(camera, MotionDetect).unwrap());
    assert_eq!(engine.response_shape(camera).unwrap(), None);
}

#[test]
fn test_unsupported_event_is_not_polled() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = harness.add_camera(1, Brand::Hikvision, "DS-2CD2143");
    bring_online(&engine, camera);

    let err = engine.start_poll(camera, NoMotion).unwrap_err();
    assert_eq!(err.status(), CommandStatus::FeatureNotSupported);
    assert!(!engine.is_polling(camera, NoMotion).unwrap());
    assert_eq!(harness.transport.sent_count(), 0);
}

#[test]
fn test_stream_frames_become_notifications() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = matrix_camera(&harness);
    bring_online(&engine, camera);
    harness.sink.clear();

    engine.start_poll(camera, MotionDetect).unwrap();
    let stream = harness.transport.last_handle();
    harness.transport.respond_frame(stream, &matrix_event("MOTION", true));
    // Tamper is not polled; the camera's report is dropped
    harness.transport.respond_frame(stream, &matrix_event("TAMPER", true));

    assert_eq!(harness.sink.transitions(), vec![(MotionDetect, Active)]);
    assert_eq!(engine.polled_status(camera, MotionDetect).unwrap(), Active);
    assert_eq!(engine.polled_status(camera, ViewTamper).unwrap(), Inactive);
    // Motion stays up for the re-detection delay
    assert_eq!(harness.timers.pending_delays(), vec![Duration::from_secs(10)]);
}

#[test]
fn test_frames_split_across_chunks() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = matrix_camera(&harness);
    bring_online(&engine, camera);
    harness.sink.clear();

    engine.start_poll(camera, ViewTamper).unwrap();
    let stream = harness.transport.last_handle();
    let bytes = matrix_event("TAMPER", true).encode();
    let (head, tail) = bytes.split_at(5);
    harness
        .transport
        .respond(stream, TransportResponse::Data(bytes::Bytes::copy_from_slice(head)));
    assert!(harness.sink.transitions().is_empty());
    harness
        .transport
        .respond(stream, TransportResponse::Data(bytes::Bytes::copy_from_slice(tail)));

    assert_eq!(harness.sink.transitions(), vec![(ViewTamper, Active)]);
}

#[test]
fn test_dropped_stream_is_reopened() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = matrix_camera(&harness);
    bring_online(&engine, camera);
    harness.sink.clear();

    engine.start_poll(camera, ViewTamper).unwrap();
    let first = harness.transport.last_handle();
    harness.transport.respond(first, TransportResponse::Closed);

    assert_eq!(harness.timers.pending_delays(), vec![engine.config().event_retry_interval]);
    assert_eq!(harness.timers.fire_all(), 1);
    assert_eq!(harness.transport.descriptions(), vec!["TCP SUB_EVT", "TCP SUB_EVT"]);

    // Late data on the dead connection is ignored
    harness.transport.respond_frame(first, &matrix_event("TAMPER", true));
    assert!(harness.sink.transitions().is_empty());

    let second = harness.transport.last_handle();
    harness.transport.respond_frame(second, &matrix_event("TAMPER", true));
    assert_eq!(harness.sink.transitions(), vec![(ViewTamper, Active)]);
}

#[test]
fn test_failed_reopen_keeps_retrying() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = matrix_camera(&harness);
    bring_online(&engine, camera);

    engine.start_poll(camera, ViewTamper).unwrap();
    harness
        .transport
        .respond(harness.transport.last_handle(), TransportResponse::Error("reset".into()));

    harness.transport.refuse_connections(true);
    harness.timers.fire_all();
    assert_eq!(harness.timers.pending_count(), 1);

    harness.transport.refuse_connections(false);
    harness.timers.fire_all();
    assert_eq!(harness.transport.sent_count(), 2);
    assert_eq!(harness.timers.pending_count(), 0);
}

#[test]
fn test_single_part_poll_cycle() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = harness.add_camera(2, Brand::Dahua, "IPC-HDW2431");
    bring_online(&engine, camera);
    harness.sink.clear();

    engine.start_poll(camera, MotionDetect).unwrap();
    assert_eq!(engine.response_shape(camera).unwrap(), Some(ResponseShape::SinglePart));
    let descriptions = harness.transport.descriptions();
    assert_eq!(descriptions.len(), 1);
    assert!(descriptions[0].starts_with("GET /cgi-bin/eventManager.cgi?action=getEventIndexes"));

    harness
        .transport
        .respond_http(harness.transport.last_handle(), 200, "channels[0]=0\r\n");
    assert_eq!(harness.sink.transitions(), vec![(MotionDetect, Active)]);

    let poll_interval = engine.config().event_poll_interval;
    assert!(harness.timers.pending_delays().contains(&poll_interval));
    assert_eq!(harness.timers.fire_with_delay(poll_interval), 1);
    assert_eq!(harness.transport.sent_count(), 2);

    // Nothing active any more: the inactive edge waits for the hold timer
    harness
        .transport
        .respond_http(harness.transport.last_handle(), 200, "Error\r\nNo Events\r\n");
    assert_eq!(harness.sink.transitions(), vec![(MotionDetect, Active)]);
}

#[test]
fn test_single_part_error_backs_off() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = harness.add_camera(2, Brand::Dahua, "IPC-HDW2431");
    bring_online(&engine, camera);

    engine.start_poll(camera, Sensor1).unwrap();
    harness
        .transport
        .respond(harness.transport.last_handle(), TransportResponse::Error("timeout".into()));

    assert_eq!(
        harness.timers.pending_delays(),
        vec![engine.config().event_retry_interval]
    );
}

#[test]
fn test_stop_while_active_notifies_and_closes() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = matrix_camera(&harness);
    bring_online(&engine, camera);
    harness.sink.clear();

    engine.start_poll(camera, MotionDetect).unwrap();
    engine.start_poll(camera, ViewTamper).unwrap();
    let stream = harness.transport.last_handle();
    harness.transport.respond_frame(stream, &matrix_event("MOTION", true));

    engine.stop_poll(camera, MotionDetect).unwrap();
    assert_eq!(
        harness.sink.transitions(),
        vec![(MotionDetect, Active), (MotionDetect, Inactive)]
    );
    assert_eq!(harness.timers.pending_count(), 0);
    // Tamper still uses the stream
    assert!(harness.transport.stopped().is_empty());

    engine.stop_poll(camera, ViewTamper).unwrap();
    assert_eq!(harness.transport.stopped(), vec![stream]);
    assert_eq!(engine.response_shape(camera).unwrap(), None);

    // Stopping again changes nothing
    engine.stop_poll(camera, ViewTamper).unwrap();
    assert_eq!(harness.sink.transitions().len(), 2);
}

#[test]
fn test_stop_camera_releases_everything() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = harness.add_camera(2, Brand::Dahua, "IPC-HDW2431");
    bring_online(&engine, camera);

    engine.start_poll(camera, MotionDetect).unwrap();
    engine.start_poll(camera, Sensor2).unwrap();
    engine.stop_camera(camera).unwrap();

    assert_eq!(harness.transport.stopped().len(), 2);
    assert!(!engine.is_polling(camera, Sensor2).unwrap());
    assert_eq!(engine.response_shape(camera).unwrap(), None);
}

#[test]
fn test_repeated_status_is_ignored() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = matrix_camera(&harness);
    bring_online(&engine, camera);
    engine.start_poll(camera, ViewTamper).unwrap();
    harness.sink.clear();

    engine.report_event(camera, ViewTamper, Active).unwrap();
    engine.report_event(camera, ViewTamper, Active).unwrap();

    assert_eq!(harness.sink.transitions(), vec![(ViewTamper, Active)]);
    assert_eq!(harness.timers.pending_count(), 0);
}

#[rstest]
#[case::motion(MotionDetect)]
#[case::line_cross(LineCross)]
#[case::loitering(Loitering)]
fn test_repeated_active_keeps_hold_deadline(#[case] event: CameraEvent) {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = matrix_camera(&harness);
    bring_online(&engine, camera);
    engine.start_poll(camera, event).unwrap();
    harness.sink.clear();

    engine.report_event(camera, event, Active).unwrap();
    let armed = harness.timers.started();
    let delays = harness.timers.pending_delays();
    assert_eq!(delays.len(), 1);

    engine.report_event(camera, event, Active).unwrap();
    engine.report_event(camera, event, Active).unwrap();

    assert_eq!(harness.sink.transitions(), vec![(event, Active)]);
    assert_eq!(harness.timers.started(), armed);
    assert_eq!(harness.timers.reloads(), 0);
    assert_eq!(harness.timers.pending_delays(), delays);
}

#[test]
fn test_latching_event_clears_once() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = matrix_camera(&harness);
    bring_online(&engine, camera);
    engine.start_poll(camera, LineCross).unwrap();
    harness.sink.clear();

    let stream = harness.transport.last_handle();
    harness.transport.respond_frame(stream, &matrix_event("LINE_CROSS", true));
    let armed = harness.timers.started();
    harness.transport.respond_frame(stream, &matrix_event("LINE_CROSS", true));
    // The re-report leaves the running debounce untouched
    assert_eq!(harness.timers.started(), armed);
    assert_eq!(harness.timers.reloads(), 0);
    assert_eq!(
        harness.timers.pending_delays(),
        vec![engine.config().default_debounce_delay]
    );

    harness.timers.fire_all();
    harness.timers.fire_all();
    assert_eq!(harness.sink.transitions_of(LineCross), vec![Active, Inactive]);
    assert_eq!(engine.polled_status(camera, LineCross).unwrap(), Inactive);
}

#[test]
fn test_inactive_is_debounced() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = matrix_camera(&harness);
    bring_online(&engine, camera);
    engine.start_poll(camera, ViewTamper).unwrap();
    engine
        .set_debounce_delay(camera, ViewTamper, Duration::from_secs(3))
        .unwrap();
    harness.sink.clear();

    engine.report_event(camera, ViewTamper, Active).unwrap();
    engine.report_event(camera, ViewTamper, Inactive).unwrap();
    assert_eq!(harness.timers.pending_delays(), vec![Duration::from_secs(3)]);

    // Back before the debounce ran out: the pending inactive is dropped
    engine.report_event(camera, ViewTamper, Active).unwrap();
    assert_eq!(harness.timers.pending_count(), 0);
    assert_eq!(harness.sink.transitions(), vec![(ViewTamper, Active)]);

    engine.report_event(camera, ViewTamper, Inactive).unwrap();
    harness.timers.fire_all();
    assert_eq!(harness.sink.transitions(), vec![(ViewTamper, Active), (ViewTamper, Inactive)]);
}

#[test]
fn test_zero_debounce_rejected() {
    let harness = Harness::new();
    let engine = harness.engine();
    let err = engine
        .set_debounce_delay(CameraIndex(0), ViewTamper, Duration::ZERO)
        .unwrap_err();
    assert_eq!(err.status(), CommandStatus::InvalidParameter);
}

#[test]
fn test_unreachable_camera_clears_at_once() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = matrix_camera(&harness);
    bring_online(&engine, camera);
    engine.start_poll(camera, ViewTamper).unwrap();
    engine.report_event(camera, ViewTamper, Active).unwrap();

    engine
        .report_event(camera, ConnectionFailure, Inactive)
        .unwrap();
    engine.report_event(camera, ViewTamper, Inactive).unwrap();

    assert_eq!(harness.timers.pending_count(), 0);
    assert_eq!(harness.sink.transitions_of(ViewTamper), vec![Active, Inactive]);
}

#[test]
fn test_connectivity_notifications() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = matrix_camera(&harness);

    bring_online(&engine, camera);
    bring_online(&engine, camera);
    engine
        .report_event(camera, ConnectionFailure, Inactive)
        .unwrap();

    assert_eq!(
        harness.sink.transitions(),
        vec![(CameraOnline, Active), (ConnectionFailure, Inactive)]
    );
}

#[test]
fn test_disabled_camera_comes_back_silently() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = matrix_camera(&harness);
    harness.store.set_camera_config(
        camera,
        CameraConfig {
            enabled: false,
            ..Default::default()
        },
    );

    bring_online(&engine, camera);
    assert!(harness.sink.transitions().is_empty());
    assert!(camera_core::Reachability::is_reachable(&engine, camera));

    engine
        .report_event(camera, ConnectionFailure, Inactive)
        .unwrap();
    assert_eq!(harness.sink.transitions(), vec![(ConnectionFailure, Inactive)]);
}

#[test]
fn test_disabled_motion_updates_health_only() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = matrix_camera(&harness);
    harness.store.set_camera_config(
        camera,
        CameraConfig {
            motion_detection: false,
            ..Default::default()
        },
    );
    bring_online(&engine, camera);
    engine.start_poll(camera, MotionDetect).unwrap();
    harness.sink.clear();

    engine.report_event(camera, MotionDetect, Active).unwrap();
    assert!(harness.sink.transitions().is_empty());
    assert_eq!(engine.polled_status(camera, MotionDetect).unwrap(), Inactive);
    assert_eq!(engine.health_status(camera, MotionDetect).unwrap(), Active);

    engine.report_event(camera, MotionDetect, Inactive).unwrap();
    assert_eq!(engine.health_status(camera, MotionDetect).unwrap(), Inactive);
    assert!(harness.sink.transitions().is_empty());
}

#[test]
fn test_inactive_passes_while_detection_disabled() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = matrix_camera(&harness);
    bring_online(&engine, camera);
    engine.start_poll(camera, MotionDetect).unwrap();
    engine.report_event(camera, MotionDetect, Active).unwrap();
    harness.sink.clear();

    harness.store.set_camera_config(
        camera,
        CameraConfig {
            motion_detection: false,
            ..Default::default()
        },
    );
    // Active is absorbed into health, Inactive still reaches the status
    engine.report_event(camera, MotionDetect, Active).unwrap();
    engine.report_event(camera, MotionDetect, Inactive).unwrap();
    assert_eq!(engine.health_status(camera, MotionDetect).unwrap(), Inactive);
    assert_eq!(harness.timers.pending_count(), 1);

    harness.timers.fire_all();
    assert_eq!(harness.sink.transitions(), vec![(MotionDetect, Inactive)]);
    assert_eq!(engine.polled_status(camera, MotionDetect).unwrap(), Inactive);
}

#[test]
fn test_health_only_for_motion_events() {
    let harness = Harness::new();
    let engine = harness.engine();
    let err = engine.health_status(CameraIndex(0), ViewTamper).unwrap_err();
    assert_eq!(err.status(), CommandStatus::InvalidParameter);
}

#[test]
fn test_auto_config_camera() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = CameraIndex(0);
    let mut ip = IpCameraConfig::new(Brand::Matrix, CameraModel::new("MX-IPC-2MP"), "10.0.0.10");
    ip.added_by = AddMode::AutoConfig;
    harness.store.add_camera(camera, ip);
    bring_online(&engine, camera);
    harness.sink.clear();

    let err = engine.start_poll(camera, MotionDetect).unwrap_err();
    assert_eq!(err.status(), CommandStatus::InvalidParameter);

    // Reports are still accepted without polling
    engine.report_event(camera, ViewTamper, Active).unwrap();
    assert_eq!(harness.sink.transitions(), vec![(ViewTamper, Active)]);
}

#[test]
fn test_reports_for_idle_events_ignored() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = matrix_camera(&harness);
    bring_online(&engine, camera);
    harness.sink.clear();

    engine.report_event(camera, Intrusion, Active).unwrap();
    assert!(harness.sink.transitions().is_empty());
    assert_eq!(engine.polled_status(camera, Intrusion).unwrap(), Inactive);
}

#[test]
fn test_notify_routes() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = matrix_camera(&harness);
    bring_online(&engine, camera);
    engine.start_poll(camera, RecordingStart).unwrap();
    engine.start_poll(camera, ViewTamper).unwrap();
    engine
        .set_notify_route(camera, ViewTamper, NotifyRoute::NetworkOnly)
        .unwrap();
    harness.sink.clear();

    engine.report_event(camera, RecordingStart, Active).unwrap();
    engine.report_event(camera, ViewTamper, Active).unwrap();

    let routes: Vec<_> = harness
        .sink
        .records()
        .into_iter()
        .map(|(record, route)| (record.event, route))
        .collect();
    assert_eq!(
        routes,
        vec![
            (RecordingStart, NotifyRoute::NetworkOnly),
            (ViewTamper, NotifyRoute::NetworkOnly)
        ]
    );
}

#[test]
fn test_event_callback_and_broadcast() {
    let harness = Harness::new();
    let engine = harness.engine();
    let camera = matrix_camera(&harness);
    bring_online(&engine, camera);
    engine.start_poll(camera, Sensor1).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: EventCallback = Arc::new(move |camera: CameraIndex, event: CameraEvent, state: EventState| {
        sink.lock().push((camera, event, state));
    });
    engine.set_event_callback(camera, Sensor1, Some(callback)).unwrap();
    let mut events = engine.subscribe();

    engine.report_event(camera, Sensor1, Active).unwrap();

    assert_eq!(*seen.lock(), vec![(camera, Sensor1, Active)]);
    let broadcast = events.try_recv().unwrap();
    assert_eq!((broadcast.camera, broadcast.event, broadcast.state), (camera, Sensor1, Active));
    assert_eq!(broadcast.route, NotifyRoute::Logged);
}

proptest! {
    /// With the camera unreachable nothing is debounced, so every change of
    /// state is notified exactly once and repeats are not notified at all.
    #[test]
    fn prop_notifications_follow_state_changes(states in proptest::collection::vec(any::<bool>(), 0..40)) {
        let harness = Harness::new();
        let engine = harness.engine();
        let camera = matrix_camera(&harness);
        bring_online(&engine, camera);
        engine.start_poll(camera, ViewTamper).unwrap();
        engine.report_event(camera, ConnectionFailure, Inactive).unwrap();

        let mut expected = Vec::new();
        let mut current = Inactive;
        for active in states {
            let state = EventState::from_active(active);
            engine.report_event(camera, ViewTamper, state).unwrap();
            if state != current {
                expected.push(state);
                current = state;
            }
        }

        prop_assert_eq!(harness.sink.transitions_of(ViewTamper), expected);
        prop_assert_eq!(engine.polled_status(camera, ViewTamper).unwrap(), current);
        prop_assert_eq!(harness.timers.pending_count(), 0);
    }

    /// A disabled camera never announces itself online, yet every loss of
    /// connectivity after a silent reconnect is still reported.
    #[test]
    fn prop_disabled_camera_connectivity(states in proptest::collection::vec(any::<bool>(), 0..40)) {
        let harness = Harness::new();
        let engine = harness.engine();
        let camera = matrix_camera(&harness);
        harness.store.set_camera_config(camera, CameraConfig { enabled: false, ..Default::default() });

        let mut expected = Vec::new();
        let mut current = Inactive;
        for active in states {
            let state = EventState::from_active(active);
            engine.report_event(camera, ConnectionFailure, state).unwrap();
            if state != current {
                current = state;
                if state == Inactive {
                    expected.push((ConnectionFailure, Inactive));
                }
            }
        }

        prop_assert_eq!(harness.sink.transitions(), expected);
        prop_assert_eq!(
            camera_core::Reachability::is_reachable(&engine, camera),
            current.is_active()
        );
    }
}
