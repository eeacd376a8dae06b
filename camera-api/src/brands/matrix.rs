//! Matrix cameras: framed TCP command channel
//!
//! Configuration lives in numbered tables read with `GET_CFG` and written
//! with `SET_CFG`. Field 1 of a request is the table id; replies carry the
//! status in field 1 and the table values as a contiguous run from field 2.

use camera_wire::{Frame, WireError};
use tracing::debug;

use super::{expect_reply, parse_flag, parse_number};
use crate::brand::{Brand, BrandProtocol, CameraModel};
use crate::error::{ApiError, Result};
use crate::event::{CameraEvent, EventReport, EventState};
use crate::operation::OperationKind;
use crate::request::{EventPollRequest, WireRequest, WireResponse};
use crate::settings::{
    ImageSettings, MotionWindow, OsdSettings, PrivacyMask, PtzAction, PtzCommand, Region,
};
use crate::stream::{BitRate, StreamProfile, StreamType};

const GET_CFG: &str = "GET_CFG";
const SET_CFG: &str = "SET_CFG";
const RESTART_STREAM: &str = "SRT_LV_STRM";
const PTZ_CTRL: &str = "PTZ_CTRL";
const SUBSCRIBE_EVENTS: &str = "SUB_EVT";
const EVENT: &str = "EVT";

const TABLE_STREAM: u16 = 10;
const TABLE_IMAGE: u16 = 20;
const TABLE_OSD: u16 = 30;
const TABLE_MOTION: u16 = 40;
const TABLE_PRIVACY: u16 = 50;

#[derive(Debug, Clone, Copy, Default)]
pub struct MatrixProtocol;

fn stream_index(stream: StreamType) -> String {
    stream.index().to_string()
}

fn get_cfg(table: u16, index: Option<&str>) -> Result<WireRequest> {
    let mut frame = Frame::new(GET_CFG);
    frame.push(1, table.to_string())?;
    if let Some(index) = index {
        frame.push(2, index)?;
    }
    Ok(WireRequest::Tcp(frame))
}

fn set_cfg(table: u16, values: impl IntoIterator<Item = String>) -> Result<Frame> {
    let mut frame = Frame::new(SET_CFG);
    frame.push(1, table.to_string())?;
    for value in values {
        frame.push_next(value)?;
    }
    Ok(frame)
}

fn flag(value: bool) -> String {
    u8::from(value).to_string()
}

fn region_values(regions: &[Region]) -> Vec<String> {
    let mut values = vec![regions.len().to_string()];
    for region in regions {
        values.extend([region.x, region.y, region.width, region.height].map(|v| v.to_string()));
    }
    values
}

/// Decode `count, (x, y, w, h)*` starting at `values[0]`
fn parse_regions(values: &[&str]) -> Result<Vec<Region>> {
    let Some((count, rest)) = values.split_first() else {
        return Ok(Vec::new());
    };
    let count: usize = parse_number("region count", count)?;
    if rest.len() < count * 4 {
        return Err(ApiError::ParseError(format!(
            "{count} regions announced, {} values present",
            rest.len()
        )));
    }
    rest.chunks(4)
        .take(count)
        .map(|chunk| {
            Ok(Region::new(
                parse_number("region x", chunk[0])?,
                parse_number("region y", chunk[1])?,
                parse_number("region width", chunk[2])?,
                parse_number("region height", chunk[3])?,
            ))
        })
        .collect()
}

fn ptz_code(action: PtzAction) -> &'static str {
    match action {
        PtzAction::Stop => "STOP",
        PtzAction::Up => "UP",
        PtzAction::Down => "DOWN",
        PtzAction::Left => "LEFT",
        PtzAction::Right => "RIGHT",
        PtzAction::ZoomIn => "ZOOM_IN",
        PtzAction::ZoomOut => "ZOOM_OUT",
        PtzAction::FocusNear => "FOCUS_NEAR",
        PtzAction::FocusFar => "FOCUS_FAR",
        PtzAction::GotoPreset(_) => "PRESET",
    }
}

fn event_from_code(code: &str, input: Option<&str>) -> Option<CameraEvent> {
    let event = match code {
        "MOTION" => CameraEvent::MotionDetect,
        "TAMPER" => CameraEvent::ViewTamper,
        "ALARM_IN" => {
            let input = input?.trim().parse().ok()?;
            return CameraEvent::from_sensor_input(input);
        }
        "LINE_CROSS" => CameraEvent::LineCross,
        "INTRUSION" => CameraEvent::Intrusion,
        "AUDIO" => CameraEvent::AudioException,
        "MISSING_OBJ" => CameraEvent::MissingObject,
        "SUSPICIOUS_OBJ" => CameraEvent::SuspiciousObject,
        "LOITERING" => CameraEvent::Loitering,
        "OBJ_COUNT" => CameraEvent::ObjectCounting,
        "NO_MOTION" => CameraEvent::NoMotion,
        _ => return None,
    };
    Some(event)
}

impl BrandProtocol for MatrixProtocol {
    fn brand(&self) -> Brand {
        Brand::Matrix
    }

    fn build_get_stream(&self, _model: &CameraModel, stream: StreamType) -> Result<Vec<WireRequest>> {
        Ok(vec![get_cfg(TABLE_STREAM, Some(&stream_index(stream)))?])
    }

    fn parse_stream(
        &self,
        _model: &CameraModel,
        _stream: StreamType,
        response: &WireResponse,
        profile: &mut StreamProfile,
    ) -> Result<()> {
        let frame = expect_reply(response, GET_CFG)?;
        let values = frame.values_from(2);
        // Older firmware stops after the fields it knows; keep defaults for the rest
        for (offset, raw) in values.iter().enumerate() {
            match offset {
                0 => profile.codec = raw.parse()?,
                1 => profile.resolution = raw.parse()?,
                2 => profile.frame_rate = parse_number("frame rate", raw)?,
                3 => profile.quality = parse_number("quality", raw)?,
                4 => profile.bit_rate_mode = raw.parse()?,
                5 => profile.bit_rate = BitRate::from_kbps(parse_number("bitrate", raw)?),
                6 => profile.gop = parse_number("gop", raw)?,
                7 => profile.audio = parse_flag(raw)?,
                _ => break,
            }
        }
        Ok(())
    }

    fn build_set_stream(
        &self,
        _model: &CameraModel,
        stream: StreamType,
        profile: &StreamProfile,
    ) -> Result<Vec<WireRequest>> {
        let values = [
            stream_index(stream),
            profile.codec.as_str().replace('.', ""),
            profile.resolution.to_string(),
            profile.frame_rate.to_string(),
            profile.quality.to_string(),
            match profile.bit_rate_mode {
                crate::stream::BitRateMode::Constant => "CBR".to_string(),
                crate::stream::BitRateMode::Variable => "VBR".to_string(),
            },
            profile.bit_rate.kbps().to_string(),
            profile.gop.to_string(),
            flag(profile.audio),
        ];
        let mut restart = Frame::new(RESTART_STREAM);
        restart.push(1, stream_index(stream))?;
        Ok(vec![
            WireRequest::Tcp(set_cfg(TABLE_STREAM, values)?),
            WireRequest::Tcp(restart),
        ])
    }

    fn build_get_image(&self, _model: &CameraModel) -> Result<Vec<WireRequest>> {
        Ok(vec![get_cfg(TABLE_IMAGE, None)?])
    }

    fn parse_image(&self, _model: &CameraModel, response: &WireResponse) -> Result<ImageSettings> {
        let frame = expect_reply(response, GET_CFG)?;
        let values = frame.values_from(2);
        if values.len() < 5 {
            return Err(WireError::MissingField(2 + values.len() as u16).into());
        }
        Ok(ImageSettings {
            brightness: parse_number("brightness", values[0])?,
            contrast: parse_number("contrast", values[1])?,
            saturation: parse_number("saturation", values[2])?,
            hue: parse_number("hue", values[3])?,
            sharpness: parse_number("sharpness", values[4])?,
        })
    }

    fn build_set_image(&self, _model: &CameraModel, settings: &ImageSettings) -> Result<Vec<WireRequest>> {
        let values = [
            settings.brightness,
            settings.contrast,
            settings.saturation,
            settings.hue,
            settings.sharpness,
        ]
        .map(|v| v.to_string());
        Ok(vec![WireRequest::Tcp(set_cfg(TABLE_IMAGE, values)?)])
    }

    fn build_set_osd(&self, _model: &CameraModel, osd: &OsdSettings) -> Result<Vec<WireRequest>> {
        let values = [
            flag(osd.show_date_time),
            flag(osd.show_channel_name),
            osd.channel_name.clone(),
        ];
        Ok(vec![WireRequest::Tcp(set_cfg(TABLE_OSD, values)?)])
    }

    fn build_get_motion_window(&self, _model: &CameraModel) -> Result<Vec<WireRequest>> {
        Ok(vec![get_cfg(TABLE_MOTION, None)?])
    }

    fn parse_motion_window(&self, _model: &CameraModel, response: &WireResponse) -> Result<MotionWindow> {
        let frame = expect_reply(response, GET_CFG)?;
        let values = frame.values_from(2);
        let [enabled, sensitivity, rest @ ..] = values.as_slice() else {
            return Err(WireError::MissingField(3).into());
        };
        Ok(MotionWindow {
            enabled: parse_flag(enabled)?,
            sensitivity: parse_number("sensitivity", sensitivity)?,
            regions: parse_regions(rest)?,
        })
    }

    fn build_set_motion_window(&self, _model: &CameraModel, window: &MotionWindow) -> Result<Vec<WireRequest>> {
        let mut values = vec![flag(window.enabled), window.sensitivity.to_string()];
        values.extend(region_values(&window.regions));
        Ok(vec![WireRequest::Tcp(set_cfg(TABLE_MOTION, values)?)])
    }

    fn build_get_privacy_mask(&self, _model: &CameraModel) -> Result<Vec<WireRequest>> {
        Ok(vec![get_cfg(TABLE_PRIVACY, None)?])
    }

    fn parse_privacy_mask(&self, _model: &CameraModel, response: &WireResponse) -> Result<PrivacyMask> {
        let frame = expect_reply(response, GET_CFG)?;
        let values = frame.values_from(2);
        let [enabled, rest @ ..] = values.as_slice() else {
            return Err(WireError::MissingField(2).into());
        };
        Ok(PrivacyMask {
            enabled: parse_flag(enabled)?,
            regions: parse_regions(rest)?,
        })
    }

    fn build_set_privacy_mask(&self, _model: &CameraModel, mask: &PrivacyMask) -> Result<Vec<WireRequest>> {
        let mut values = vec![flag(mask.enabled)];
        values.extend(region_values(&mask.regions));
        Ok(vec![WireRequest::Tcp(set_cfg(TABLE_PRIVACY, values)?)])
    }

    fn build_set_ptz(&self, model: &CameraModel, command: &PtzCommand) -> Result<Vec<WireRequest>> {
        if !model.has_ptz() {
            debug!(model = model.name(), "fixed Matrix model has no PTZ head");
            return self.unsupported(OperationKind::SetPtz);
        }
        let mut frame = Frame::new(PTZ_CTRL);
        frame
            .push(1, ptz_code(command.action))?
            .push(2, command.speed.to_string())?;
        if let PtzAction::GotoPreset(preset) = command.action {
            frame.push(3, preset.to_string())?;
        }
        Ok(vec![WireRequest::Tcp(frame)])
    }

    fn event_request(&self, _model: &CameraModel, event: CameraEvent) -> Result<EventPollRequest> {
        if event.is_synthetic() {
            return self.unsupported(OperationKind::GetEventUrl);
        }
        Ok(EventPollRequest::multi_part(
            WireRequest::Tcp(Frame::new(SUBSCRIBE_EVENTS)),
            None,
        ))
    }

    fn parse_events(
        &self,
        _model: &CameraModel,
        _polled: Option<CameraEvent>,
        response: &WireResponse,
    ) -> Result<Vec<EventReport>> {
        let WireResponse::Frame(frame) = response else {
            return Err(ApiError::ParseError("Matrix events arrive as frames".to_string()));
        };
        if frame.is_reply_to(SUBSCRIBE_EVENTS) {
            expect_reply(response, SUBSCRIBE_EVENTS)?;
            return Ok(Vec::new());
        }
        if frame.header() != EVENT {
            return Err(ApiError::ParseError(format!(
                "unexpected frame {} on event channel",
                frame.header()
            )));
        }
        let code = frame.require(1)?;
        let state = EventState::from_active(parse_flag(frame.require(2)?)?);
        match event_from_code(code.trim(), frame.get(3)) {
            Some(event) => Ok(vec![(event, state)]),
            None => {
                debug!(code, "ignoring unknown Matrix event code");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{build_requests, parse_response, Operation, OperationOutput};
    use crate::stream::{BitRateMode, Resolution, VideoCodec};

    fn reply(command: &str, status: u16, values: &[&str]) -> WireResponse {
        let mut frame = Frame::new(Frame::reply_header(command));
        frame.push(1, status.to_string()).unwrap();
        for value in values {
            frame.push_next(*value).unwrap();
        }
        WireResponse::Frame(frame)
    }

    fn frame_of(request: &WireRequest) -> &Frame {
        match request {
            WireRequest::Tcp(frame) => frame,
            other => panic!("expected TCP request, got {other:?}"),
        }
    }

    #[test]
    fn test_get_stream_request() {
        let requests = MatrixProtocol
            .build_get_stream(&CameraModel::new("MX-BL"), StreamType::Sub)
            .unwrap();
        let frame = frame_of(&requests[0]);
        assert_eq!(frame.header(), "GET_CFG");
        assert_eq!(frame.values_from(1), vec!["10", "1"]);
    }

    #[test]
    fn test_parse_stream_reply() {
        let response = reply(
            GET_CFG,
            0,
            &["H265", "2560x1440", "20", "5", "VBR", "5000", "40", "1"],
        );
        let mut profile = StreamProfile::main_defaults();
        MatrixProtocol
            .parse_stream(&CameraModel::default(), StreamType::Main, &response, &mut profile)
            .unwrap();
        assert_eq!(profile.codec, VideoCodec::H265);
        assert_eq!(profile.resolution, Resolution::new(2560, 1440));
        assert_eq!(profile.bit_rate_mode, BitRateMode::Variable);
        assert_eq!(profile.bit_rate.kbps(), 4096);
        assert_eq!(profile.gop, 40);
        assert!(profile.audio);
    }

    #[test]
    fn test_parse_partial_stream_reply_keeps_defaults() {
        let response = reply(GET_CFG, 0, &["MJPEG", "1280x720"]);
        let mut profile = StreamProfile::sub_defaults();
        MatrixProtocol
            .parse_stream(&CameraModel::default(), StreamType::Sub, &response, &mut profile)
            .unwrap();
        assert_eq!(profile.codec, VideoCodec::Mjpeg);
        assert_eq!(profile.frame_rate, StreamProfile::sub_defaults().frame_rate);
    }

    #[test]
    fn test_rejected_reply() {
        let response = reply(GET_CFG, 7, &[]);
        let mut profile = StreamProfile::main_defaults();
        let err = MatrixProtocol
            .parse_stream(&CameraModel::default(), StreamType::Main, &response, &mut profile)
            .unwrap_err();
        assert!(matches!(err, ApiError::Rejected(7)));
    }

    #[test]
    fn test_set_stream_restarts_live_stream() {
        let requests = MatrixProtocol
            .build_set_stream(&CameraModel::default(), StreamType::Main, &StreamProfile::main_defaults())
            .unwrap();
        assert_eq!(requests.len(), 2);
        let set = frame_of(&requests[0]);
        assert_eq!(set.header(), SET_CFG);
        assert_eq!(set.values_from(1)[..4], ["10", "0", "H264", "1920x1080"]);
        assert_eq!(frame_of(&requests[1]).header(), RESTART_STREAM);
    }

    #[test]
    fn test_motion_window_round_trip_through_table() {
        let window = MotionWindow {
            enabled: true,
            sensitivity: 7,
            regions: vec![Region::new(0, 0, 500, 500), Region::new(500, 500, 250, 250)],
        };
        let requests = MatrixProtocol
            .build_set_motion_window(&CameraModel::default(), &window)
            .unwrap();
        let values: Vec<&str> = frame_of(&requests[0]).values_from(2);

        let parsed = MatrixProtocol
            .parse_motion_window(&CameraModel::default(), &reply(GET_CFG, 0, &values))
            .unwrap();
        assert_eq!(parsed, window);
    }

    #[test]
    fn test_ptz_rejected_on_fixed_model() {
        let command = PtzCommand::new(PtzAction::Left, 3);
        let err = build_requests(&MatrixProtocol, &CameraModel::new("MX-BL-2030"), &Operation::SetPtz(command))
            .unwrap_err();
        assert!(err.is_not_supported());

        let requests = MatrixProtocol
            .build_set_ptz(&CameraModel::new("MX-PTZ-2030"), &PtzCommand::new(PtzAction::GotoPreset(4), 2))
            .unwrap();
        assert_eq!(frame_of(&requests[0]).values_from(1), vec!["PRESET", "2", "4"]);
    }

    #[test]
    fn test_set_ack() {
        let op = Operation::SetOsd(OsdSettings::default());
        let model = CameraModel::default();
        assert_eq!(
            parse_response(&MatrixProtocol, &model, &op, &reply(SET_CFG, 0, &[])).unwrap(),
            OperationOutput::Done
        );
        assert!(matches!(
            parse_response(&MatrixProtocol, &model, &op, &reply(SET_CFG, 3, &[])),
            Err(ApiError::Rejected(3))
        ));
    }

    #[test]
    fn test_event_frames() {
        let model = CameraModel::default();
        let mut frame = Frame::new(EVENT);
        frame.push(1, "ALARM_IN").unwrap().push(2, "1").unwrap().push(3, "2").unwrap();
        let reports = MatrixProtocol
            .parse_events(&model, None, &WireResponse::Frame(frame))
            .unwrap();
        assert_eq!(reports, vec![(CameraEvent::Sensor2, EventState::Active)]);

        let mut frame = Frame::new(EVENT);
        frame.push(1, "LOITERING").unwrap().push(2, "0").unwrap();
        let reports = MatrixProtocol
            .parse_events(&model, None, &WireResponse::Frame(frame))
            .unwrap();
        assert_eq!(reports, vec![(CameraEvent::Loitering, EventState::Inactive)]);

        assert!(MatrixProtocol
            .parse_events(&model, None, &reply(SUBSCRIBE_EVENTS, 0, &[]))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_event_request_is_shared() {
        let model = CameraModel::default();
        let a = MatrixProtocol.event_request(&model, CameraEvent::MotionDetect).unwrap();
        let b = MatrixProtocol.event_request(&model, CameraEvent::LineCross).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.shape, crate::request::ResponseShape::MultiPart);
    }
}
