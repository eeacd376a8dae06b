//! Hikvision cameras: ISAPI HTTP/XML endpoints and the multi-part alert stream

use serde::Deserialize;
use tracing::debug;
use xmltree::Element;

use super::expect_http_body;
use crate::brand::{Brand, BrandProtocol, CameraModel};
use crate::error::{ApiError, Result};
use crate::event::{CameraEvent, EventReport, EventState};
use crate::operation::OperationKind;
use crate::request::{EventPollRequest, HttpRequest, WireRequest, WireResponse};
use crate::settings::{
    ImageSettings, MotionWindow, OsdSettings, PrivacyMask, PtzAction, PtzCommand, Region,
};
use crate::stream::{BitRate, BitRateMode, Resolution, StreamProfile, StreamType};
use crate::xml::{self, escape};

const ALERT_STREAM: &str = "/ISAPI/Event/notification/alertStream";
const ALERT_BOUNDARY: &str = "boundary";
const IMAGE: &str = "/ISAPI/Image/channels/1";
const OVERLAYS: &str = "/ISAPI/System/Video/inputs/channels/1/overlays";
const MOTION: &str = "/ISAPI/System/Video/inputs/channels/1/motionDetection";
const PRIVACY: &str = "/ISAPI/System/Video/inputs/channels/1/privacyMask";
const PTZ: &str = "/ISAPI/PTZCtrl/channels/1";

#[derive(Debug, Clone, Copy, Default)]
pub struct HikvisionProtocol;

fn channel_path(stream: StreamType) -> &'static str {
    match stream {
        StreamType::Main => "/ISAPI/Streaming/channels/101",
        StreamType::Sub => "/ISAPI/Streaming/channels/102",
    }
}

fn root(response: &WireResponse) -> Result<Element> {
    xml::parse_root(expect_http_body(response)?)
}

/// ISAPI quality is 1..=100; the NVR uses 1..=5
fn quality_from_isapi(raw: u8) -> u8 {
    raw.div_ceil(20).clamp(1, 5)
}

fn regions_xml(tag: &str, regions: &[Region]) -> String {
    regions
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "<{tag}><id>{}</id><x>{}</x><y>{}</y><width>{}</width><height>{}</height></{tag}>",
                i + 1,
                r.x,
                r.y,
                r.width,
                r.height
            )
        })
        .collect()
}

fn parse_regions(root: &Element, tag: &str) -> Result<Vec<Region>> {
    xml::find_all(root, tag)
        .into_iter()
        .map(|region| {
            Ok(Region::new(
                xml::require_text(region, "x")?,
                xml::require_text(region, "y")?,
                xml::require_text(region, "width")?,
                xml::require_text(region, "height")?,
            ))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct EventNotificationAlert {
    #[serde(rename = "eventType")]
    event_type: String,
    #[serde(rename = "eventState", default)]
    event_state: String,
    #[serde(rename = "inputIOPortID", default)]
    input_port: Option<u8>,
}

fn event_from_type(alert: &EventNotificationAlert) -> Option<CameraEvent> {
    let event = match alert.event_type.to_ascii_lowercase().as_str() {
        "vmd" => CameraEvent::MotionDetect,
        "tamperdetection" | "shelteralarm" => CameraEvent::ViewTamper,
        "io" => return CameraEvent::from_sensor_input(alert.input_port?),
        "linedetection" => CameraEvent::LineCross,
        "fielddetection" => CameraEvent::Intrusion,
        "audioexception" => CameraEvent::AudioException,
        "attendedbaggage" => CameraEvent::MissingObject,
        "unattendedbaggage" => CameraEvent::SuspiciousObject,
        "loitering" => CameraEvent::Loitering,
        _ => return None,
    };
    Some(event)
}

impl BrandProtocol for HikvisionProtocol {
    fn brand(&self) -> Brand {
        Brand::Hikvision
    }

    fn build_get_stream(&self, _model: &CameraModel, stream: StreamType) -> Result<Vec<WireRequest>> {
        Ok(vec![WireRequest::Http(HttpRequest::get(channel_path(stream)))])
    }

    fn parse_stream(
        &self,
        _model: &CameraModel,
        _stream: StreamType,
        response: &WireResponse,
        profile: &mut StreamProfile,
    ) -> Result<()> {
        let root = root(response)?;
        let video = xml::find(&root, "Video")
            .ok_or_else(|| ApiError::ParseError("StreamingChannel without <Video>".to_string()))?;

        if let Some(codec) = xml::text(video, "videoCodecType") {
            profile.codec = codec.parse()?;
        }
        if let (Some(width), Some(height)) = (
            xml::parse_text(video, "videoResolutionWidth")?,
            xml::parse_text(video, "videoResolutionHeight")?,
        ) {
            profile.resolution = Resolution::new(width, height);
        }
        if let Some(rate) = xml::parse_text::<u32>(video, "maxFrameRate")? {
            // Reported in hundredths of a frame per second
            profile.frame_rate = u8::try_from(rate / 100).unwrap_or(u8::MAX);
        }
        if let Some(quality) = xml::parse_text::<u8>(video, "fixedQuality")? {
            profile.quality = quality_from_isapi(quality);
        }
        if let Some(mode) = xml::text(video, "videoQualityControlType") {
            profile.bit_rate_mode = mode.parse()?;
        }
        let rate_tag = match profile.bit_rate_mode {
            BitRateMode::Constant => "constantBitRate",
            BitRateMode::Variable => "vbrUpperCap",
        };
        if let Some(kbps) = xml::parse_text(video, rate_tag)? {
            profile.bit_rate = BitRate::from_kbps(kbps);
        }
        if let Some(gop) = xml::parse_text(video, "GovLength")? {
            profile.gop = gop;
        }
        if let Some(audio) = xml::find(&root, "Audio") {
            profile.audio = xml::parse_text(audio, "enabled")?.unwrap_or(false);
        }
        Ok(())
    }

    fn build_set_stream(
        &self,
        _model: &CameraModel,
        stream: StreamType,
        profile: &StreamProfile,
    ) -> Result<Vec<WireRequest>> {
        let (mode, rate_tag) = match profile.bit_rate_mode {
            BitRateMode::Constant => ("CBR", "constantBitRate"),
            BitRateMode::Variable => ("VBR", "vbrUpperCap"),
        };
        let body = format!(
            "<StreamingChannel><Video>\
             <videoCodecType>{codec}</videoCodecType>\
             <videoResolutionWidth>{width}</videoResolutionWidth>\
             <videoResolutionHeight>{height}</videoResolutionHeight>\
             <videoQualityControlType>{mode}</videoQualityControlType>\
             <{rate_tag}>{kbps}</{rate_tag}>\
             <fixedQuality>{quality}</fixedQuality>\
             <maxFrameRate>{fps}</maxFrameRate>\
             <GovLength>{gop}</GovLength>\
             </Video><Audio><enabled>{audio}</enabled></Audio></StreamingChannel>",
            codec = profile.codec.as_str(),
            width = profile.resolution.width,
            height = profile.resolution.height,
            kbps = profile.bit_rate.kbps(),
            quality = u32::from(profile.quality) * 20,
            fps = u32::from(profile.frame_rate) * 100,
            gop = profile.gop,
            audio = profile.audio,
        );
        Ok(vec![WireRequest::Http(HttpRequest::put_xml(channel_path(stream), body))])
    }

    fn build_get_image(&self, _model: &CameraModel) -> Result<Vec<WireRequest>> {
        Ok(vec![WireRequest::Http(HttpRequest::get(IMAGE))])
    }

    fn parse_image(&self, _model: &CameraModel, response: &WireResponse) -> Result<ImageSettings> {
        let root = root(response)?;
        let defaults = ImageSettings::default();
        Ok(ImageSettings {
            brightness: xml::parse_text(&root, "brightnessLevel")?.unwrap_or(defaults.brightness),
            contrast: xml::parse_text(&root, "contrastLevel")?.unwrap_or(defaults.contrast),
            saturation: xml::parse_text(&root, "saturationLevel")?.unwrap_or(defaults.saturation),
            hue: xml::parse_text(&root, "hueValue")?.unwrap_or(defaults.hue),
            sharpness: xml::parse_text(&root, "SharpnessLevel")?.unwrap_or(defaults.sharpness),
        })
    }

    fn build_set_image(&self, _model: &CameraModel, settings: &ImageSettings) -> Result<Vec<WireRequest>> {
        let color = format!(
            "<Color><brightnessLevel>{}</brightnessLevel><contrastLevel>{}</contrastLevel>\
             <saturationLevel>{}</saturationLevel><hueValue>{}</hueValue></Color>",
            settings.brightness, settings.contrast, settings.saturation, settings.hue
        );
        let sharpness = format!(
            "<Sharpness><SharpnessLevel>{}</SharpnessLevel></Sharpness>",
            settings.sharpness
        );
        Ok(vec![
            WireRequest::Http(HttpRequest::put_xml(format!("{IMAGE}/color"), color)),
            WireRequest::Http(HttpRequest::put_xml(format!("{IMAGE}/sharpness"), sharpness)),
        ])
    }

    fn build_set_osd(&self, _model: &CameraModel, osd: &OsdSettings) -> Result<Vec<WireRequest>> {
        let body = format!(
            "<VideoOverlay><DateTimeOverlay><enabled>{}</enabled></DateTimeOverlay>\
             <channelNameOverlay><enabled>{}</enabled><name>{}</name></channelNameOverlay></VideoOverlay>",
            osd.show_date_time,
            osd.show_channel_name,
            escape(&osd.channel_name)
        );
        Ok(vec![WireRequest::Http(HttpRequest::put_xml(OVERLAYS, body))])
    }

    fn build_get_motion_window(&self, _model: &CameraModel) -> Result<Vec<WireRequest>> {
        Ok(vec![WireRequest::Http(HttpRequest::get(MOTION))])
    }

    fn parse_motion_window(&self, _model: &CameraModel, response: &WireResponse) -> Result<MotionWindow> {
        let root = root(response)?;
        let level: u8 = xml::parse_text(&root, "sensitivityLevel")?.unwrap_or(50);
        Ok(MotionWindow {
            enabled: xml::require_text(&root, "enabled")?,
            sensitivity: level.div_ceil(10).clamp(1, 10),
            regions: parse_regions(&root, "Region")?,
        })
    }

    fn build_set_motion_window(&self, _model: &CameraModel, window: &MotionWindow) -> Result<Vec<WireRequest>> {
        let body = format!(
            "<MotionDetection><enabled>{}</enabled><MotionDetectionLayout>\
             <sensitivityLevel>{}</sensitivityLevel><RegionList>{}</RegionList>\
             </MotionDetectionLayout></MotionDetection>",
            window.enabled,
            u16::from(window.sensitivity) * 10,
            regions_xml("Region", &window.regions)
        );
        Ok(vec![WireRequest::Http(HttpRequest::put_xml(MOTION, body))])
    }

    fn build_get_privacy_mask(&self, _model: &CameraModel) -> Result<Vec<WireRequest>> {
        Ok(vec![WireRequest::Http(HttpRequest::get(PRIVACY))])
    }

    fn parse_privacy_mask(&self, _model: &CameraModel, response: &WireResponse) -> Result<PrivacyMask> {
        let root = root(response)?;
        Ok(PrivacyMask {
            enabled: xml::require_text(&root, "enabled")?,
            regions: parse_regions(&root, "PrivacyMaskRegion")?,
        })
    }

    fn build_set_privacy_mask(&self, _model: &CameraModel, mask: &PrivacyMask) -> Result<Vec<WireRequest>> {
        let body = format!(
            "<PrivacyMask><enabled>{}</enabled><PrivacyMaskRegionList>{}</PrivacyMaskRegionList></PrivacyMask>",
            mask.enabled,
            regions_xml("PrivacyMaskRegion", &mask.regions)
        );
        Ok(vec![WireRequest::Http(HttpRequest::put_xml(PRIVACY, body))])
    }

    fn build_set_ptz(&self, _model: &CameraModel, command: &PtzCommand) -> Result<Vec<WireRequest>> {
        let speed = i32::from(command.speed) * 12;
        let (pan, tilt, zoom) = match command.action {
            PtzAction::GotoPreset(preset) => {
                let path = format!("{PTZ}/presets/{preset}/goto");
                return Ok(vec![WireRequest::Http(HttpRequest::put_xml(path, ""))]);
            }
            PtzAction::FocusNear | PtzAction::FocusFar => {
                let focus = if command.action == PtzAction::FocusNear { -speed } else { speed };
                let body = format!("<FocusData><focus>{focus}</focus></FocusData>");
                return Ok(vec![WireRequest::Http(HttpRequest::put_xml(
                    format!("{IMAGE}/focus"),
                    body,
                ))]);
            }
            PtzAction::Stop => (0, 0, 0),
            PtzAction::Up => (0, speed, 0),
            PtzAction::Down => (0, -speed, 0),
            PtzAction::Left => (-speed, 0, 0),
            PtzAction::Right => (speed, 0, 0),
            PtzAction::ZoomIn => (0, 0, speed),
            PtzAction::ZoomOut => (0, 0, -speed),
        };
        let body = format!("<PTZData><pan>{pan}</pan><tilt>{tilt}</tilt><zoom>{zoom}</zoom></PTZData>");
        Ok(vec![WireRequest::Http(HttpRequest::put_xml(
            format!("{PTZ}/continuous"),
            body,
        ))])
    }

    fn event_request(&self, _model: &CameraModel, event: CameraEvent) -> Result<EventPollRequest> {
        if event.is_synthetic() || matches!(event, CameraEvent::NoMotion | CameraEvent::ObjectCounting) {
            return self.unsupported(OperationKind::GetEventUrl);
        }
        Ok(EventPollRequest::multi_part(
            WireRequest::Http(HttpRequest::get(ALERT_STREAM)),
            Some(ALERT_BOUNDARY),
        ))
    }

    fn parse_events(
        &self,
        _model: &CameraModel,
        _polled: Option<CameraEvent>,
        response: &WireResponse,
    ) -> Result<Vec<EventReport>> {
        let body = expect_http_body(response)?;
        if !body.contains("EventNotificationAlert") {
            return Ok(Vec::new());
        }
        let alert: EventNotificationAlert = quick_xml::de::from_str(body)
            .map_err(|e| ApiError::ParseError(format!("alert deserialization failed: {e}")))?;
        let state = EventState::from_active(alert.event_state.eq_ignore_ascii_case("active"));
        match event_from_type(&alert) {
            Some(event) => Ok(vec![(event, state)]),
            None => {
                debug!(event_type = %alert.event_type, "ignoring Hikvision alert");
                Ok(Vec::new())
            }
        }
    }
}
