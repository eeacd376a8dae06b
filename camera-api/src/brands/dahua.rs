//! Dahua cameras: CGI `key=value` configuration and per-event index polling

use std::collections::HashMap;
use url::form_urlencoded;

use super::{expect_http_body, parse_flag, parse_number};
use crate::brand::{Brand, BrandProtocol, CameraModel};
use crate::error::{ApiError, Result};
use crate::event::{CameraEvent, EventReport, EventState};
use crate::operation::OperationKind;
use crate::request::{EventPollRequest, HttpRequest, WireRequest, WireResponse};
use crate::settings::{ImageSettings, MotionWindow, OsdSettings, PtzAction, PtzCommand, Region};
use crate::stream::{BitRate, BitRateMode, StreamProfile, StreamType};

const CONFIG: &str = "/cgi-bin/configManager.cgi";
const PTZ: &str = "/cgi-bin/ptz.cgi";
const EVENTS: &str = "/cgi-bin/eventManager.cgi";

#[derive(Debug, Clone, Copy, Default)]
pub struct DahuaProtocol;

fn format_key(stream: StreamType) -> &'static str {
    match stream {
        StreamType::Main => "Encode[0].MainFormat[0]",
        StreamType::Sub => "Encode[0].ExtraFormat[0]",
    }
}

fn query<K, V>(path: &str, pairs: impl IntoIterator<Item = (K, V)>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key.as_ref(), value.as_ref());
    }
    format!("{path}?{}", serializer.finish())
}

fn get_config(name: &str) -> WireRequest {
    WireRequest::Http(HttpRequest::get(query(
        CONFIG,
        [("action", "getConfig"), ("name", name)],
    )))
}

fn set_config(pairs: Vec<(String, String)>) -> WireRequest {
    let action = ("action".to_string(), "setConfig".to_string());
    WireRequest::Http(HttpRequest::get(query(
        CONFIG,
        std::iter::once(action).chain(pairs),
    )))
}

/// `table.<key>=<value>` lines keyed without the `table.` prefix
fn parse_table(body: &str) -> HashMap<&str, &str> {
    body.lines()
        .filter_map(|line| line.trim().split_once('='))
        .map(|(key, value)| (key.trim().trim_start_matches("table."), value.trim()))
        .collect()
}

fn event_code(event: CameraEvent) -> Option<&'static str> {
    let code = match event {
        CameraEvent::MotionDetect => "VideoMotion",
        CameraEvent::ViewTamper => "VideoBlind",
        CameraEvent::Sensor1 | CameraEvent::Sensor2 | CameraEvent::Sensor3 => "AlarmLocal",
        CameraEvent::LineCross => "CrossLineDetection",
        CameraEvent::Intrusion => "CrossRegionDetection",
        CameraEvent::AudioException => "AudioAnomaly",
        CameraEvent::MissingObject => "TakenAwayDetection",
        CameraEvent::SuspiciousObject => "LeftDetection",
        CameraEvent::Loitering => "WanderDetection",
        CameraEvent::ObjectCounting => "NumberStat",
        CameraEvent::NoMotion
        | CameraEvent::ConnectionFailure
        | CameraEvent::RecordingFail
        | CameraEvent::CameraOnline
        | CameraEvent::RecordingStart => return None,
    };
    Some(code)
}

fn ptz_code(action: PtzAction) -> &'static str {
    match action {
        PtzAction::Stop | PtzAction::Up => "Up",
        PtzAction::Down => "Down",
        PtzAction::Left => "Left",
        PtzAction::Right => "Right",
        PtzAction::ZoomIn => "ZoomTele",
        PtzAction::ZoomOut => "ZoomWide",
        PtzAction::FocusNear => "FocusNear",
        PtzAction::FocusFar => "FocusFar",
        PtzAction::GotoPreset(_) => "GotoPreset",
    }
}

impl BrandProtocol for DahuaProtocol {
    fn brand(&self) -> Brand {
        Brand::Dahua
    }

    fn build_get_stream(&self, _model: &CameraModel, _stream: StreamType) -> Result<Vec<WireRequest>> {
        Ok(vec![get_config("Encode")])
    }

    fn parse_stream(
        &self,
        _model: &CameraModel,
        stream: StreamType,
        response: &WireResponse,
        profile: &mut StreamProfile,
    ) -> Result<()> {
        let table = parse_table(expect_http_body(response)?);
        let prefix = format_key(stream);
        let get = |field: &str| table.get(format!("{prefix}.{field}").as_str()).copied();

        if let Some(codec) = get("Video.Compression") {
            profile.codec = codec.parse()?;
        }
        if let (Some(width), Some(height)) = (get("Video.Width"), get("Video.Height")) {
            profile.resolution.width = parse_number("width", width)?;
            profile.resolution.height = parse_number("height", height)?;
        }
        if let Some(fps) = get("Video.FPS") {
            // Some firmware reports fractional rates
            let fps: f32 = parse_number("fps", fps)?;
            profile.frame_rate = fps.round().clamp(1.0, 60.0) as u8;
        }
        if let Some(quality) = get("Video.Quality") {
            profile.quality = parse_number::<u8>("quality", quality)?.clamp(1, 5);
        }
        if let Some(mode) = get("Video.BitRateControl") {
            profile.bit_rate_mode = mode.parse()?;
        }
        if let Some(kbps) = get("Video.BitRate") {
            profile.bit_rate = BitRate::from_kbps(parse_number("bitrate", kbps)?);
        }
        if let Some(gop) = get("Video.GOP") {
            profile.gop = parse_number("gop", gop)?;
        }
        if let Some(audio) = get("AudioEnable") {
            profile.audio = parse_flag(audio)?;
        }
        Ok(())
    }

    fn build_set_stream(
        &self,
        _model: &CameraModel,
        stream: StreamType,
        profile: &StreamProfile,
    ) -> Result<Vec<WireRequest>> {
        let prefix = format_key(stream);
        let mode = match profile.bit_rate_mode {
            BitRateMode::Constant => "CBR",
            BitRateMode::Variable => "VBR",
        };
        let fields = [
            ("Video.Compression", profile.codec.as_str().to_string()),
            ("Video.Width", profile.resolution.width.to_string()),
            ("Video.Height", profile.resolution.height.to_string()),
            ("Video.FPS", profile.frame_rate.to_string()),
            ("Video.Quality", profile.quality.to_string()),
            ("Video.BitRateControl", mode.to_string()),
            ("Video.BitRate", profile.bit_rate.kbps().to_string()),
            ("Video.GOP", profile.gop.to_string()),
            ("AudioEnable", profile.audio.to_string()),
        ];
        let pairs = fields
            .into_iter()
            .map(|(field, value)| (format!("{prefix}.{field}"), value))
            .collect();
        Ok(vec![set_config(pairs)])
    }

    fn build_get_image(&self, _model: &CameraModel) -> Result<Vec<WireRequest>> {
        Ok(vec![get_config("VideoColor")])
    }

    fn parse_image(&self, _model: &CameraModel, response: &WireResponse) -> Result<ImageSettings> {
        let table = parse_table(expect_http_body(response)?);
        let defaults = ImageSettings::default();
        let level = |key: &str, default: u8| -> Result<u8> {
            match table.get(format!("VideoColor[0][0].{key}").as_str()) {
                Some(raw) => parse_number(key, raw),
                None => Ok(default),
            }
        };
        Ok(ImageSettings {
            brightness: level("Brightness", defaults.brightness)?,
            contrast: level("Contrast", defaults.contrast)?,
            saturation: level("Saturation", defaults.saturation)?,
            hue: level("Hue", defaults.hue)?,
            sharpness: defaults.sharpness,
        })
    }

    fn build_set_image(&self, _model: &CameraModel, settings: &ImageSettings) -> Result<Vec<WireRequest>> {
        let pairs = vec![
            ("VideoColor[0][0].Brightness".to_string(), settings.brightness.to_string()),
            ("VideoColor[0][0].Contrast".to_string(), settings.contrast.to_string()),
            ("VideoColor[0][0].Saturation".to_string(), settings.saturation.to_string()),
            ("VideoColor[0][0].Hue".to_string(), settings.hue.to_string()),
            ("VideoInSharpness[0][0].Sharpness".to_string(), settings.sharpness.to_string()),
        ];
        Ok(vec![set_config(pairs)])
    }

    fn build_set_osd(&self, _model: &CameraModel, osd: &OsdSettings) -> Result<Vec<WireRequest>> {
        let pairs = vec![
            ("VideoWidget[0].TimeTitle.EncodeBlend".to_string(), osd.show_date_time.to_string()),
            ("VideoWidget[0].ChannelTitle.EncodeBlend".to_string(), osd.show_channel_name.to_string()),
            ("ChannelTitle[0].Name".to_string(), osd.channel_name.clone()),
        ];
        Ok(vec![set_config(pairs)])
    }

    fn build_get_motion_window(&self, _model: &CameraModel) -> Result<Vec<WireRequest>> {
        Ok(vec![get_config("MotionDetect")])
    }

    fn parse_motion_window(&self, _model: &CameraModel, response: &WireResponse) -> Result<MotionWindow> {
        let table = parse_table(expect_http_body(response)?);
        let enabled = table
            .get("MotionDetect[0].Enable")
            .ok_or_else(|| ApiError::ParseError("missing MotionDetect[0].Enable".to_string()))?;

        let mut regions = Vec::new();
        let mut sensitivity = None;
        for index in 0..MotionWindow::MAX_REGIONS {
            let key = format!("MotionDetect[0].MotionDetectWindow[{index}]");
            let Some(window) = table.get(format!("{key}.Window").as_str()) else {
                break;
            };
            let coords = window
                .split(',')
                .map(|v| parse_number::<u16>("window", v))
                .collect::<Result<Vec<_>>>()?;
            let &[x, y, width, height] = coords.as_slice() else {
                return Err(ApiError::ParseError(format!("window '{window}' is not x,y,w,h")));
            };
            regions.push(Region::new(x, y, width, height));
            if sensitivity.is_none() {
                if let Some(raw) = table.get(format!("{key}.Sensitive").as_str()) {
                    sensitivity = Some(parse_number::<u8>("sensitivity", raw)?.div_ceil(10).clamp(1, 10));
                }
            }
        }

        Ok(MotionWindow {
            enabled: parse_flag(enabled)?,
            sensitivity: sensitivity.unwrap_or(5),
            regions,
        })
    }

    fn build_set_motion_window(&self, _model: &CameraModel, window: &MotionWindow) -> Result<Vec<WireRequest>> {
        let mut pairs = vec![("MotionDetect[0].Enable".to_string(), window.enabled.to_string())];
        for (index, region) in window.regions.iter().enumerate() {
            let key = format!("MotionDetect[0].MotionDetectWindow[{index}]");
            pairs.push((
                format!("{key}.Window"),
                format!("{},{},{},{}", region.x, region.y, region.width, region.height),
            ));
            pairs.push((format!("{key}.Sensitive"), (u16::from(window.sensitivity) * 10).to_string()));
        }
        Ok(vec![set_config(pairs)])
    }

    fn build_set_ptz(&self, _model: &CameraModel, command: &PtzCommand) -> Result<Vec<WireRequest>> {
        let action = if command.action == PtzAction::Stop { "stop" } else { "start" };
        let (arg1, arg2) = match command.action {
            PtzAction::GotoPreset(preset) => (0, u16::from(preset)),
            _ => (0, u16::from(command.speed)),
        };
        let path = query(
            PTZ,
            [
                ("action", action.to_string()),
                ("channel", "0".to_string()),
                ("code", ptz_code(command.action).to_string()),
                ("arg1", arg1.to_string()),
                ("arg2", arg2.to_string()),
                ("arg3", "0".to_string()),
            ],
        );
        Ok(vec![WireRequest::Http(HttpRequest::get(path))])
    }

    fn event_request(&self, _model: &CameraModel, event: CameraEvent) -> Result<EventPollRequest> {
        let Some(code) = event_code(event) else {
            return self.unsupported(OperationKind::GetEventUrl);
        };
        let path = query(
            EVENTS,
            [("action", "getEventIndexes"), ("code", code)],
        );
        Ok(EventPollRequest::single_part(
            WireRequest::Http(HttpRequest::get(path)),
            event,
        ))
    }

    /// `channels[n]=<index>` lines list what is active; an `Error` body means nothing is
    fn parse_events(
        &self,
        _model: &CameraModel,
        polled: Option<CameraEvent>,
        response: &WireResponse,
    ) -> Result<Vec<EventReport>> {
        let event = polled.ok_or_else(|| {
            ApiError::InvalidParameter("Dahua event responses need the polled event".to_string())
        })?;
        let WireResponse::Http { status, body } = response else {
            return Err(ApiError::ParseError("expected HTTP event response".to_string()));
        };
        if body.trim_start().starts_with("Error") {
            return Ok(vec![(event, EventState::Inactive)]);
        }
        if !(200..300).contains(status) {
            return Err(ApiError::Rejected(*status));
        }

        let indexes = body
            .lines()
            .filter_map(|line| line.trim().split_once('='))
            .filter(|(key, _)| key.starts_with("channels["))
            .map(|(_, value)| parse_number::<u16>("channel index", value))
            .collect::<Result<Vec<_>>>()?;

        let active = match event.sensor_input() {
            // Alarm inputs are reported zero-based
            Some(input) => indexes.contains(&(u16::from(input) - 1)),
            None => !indexes.is_empty(),
        };
        Ok(vec![(event, EventState::from_active(active))])
    }
}
