//! Argument types for image, overlay, privacy and PTZ operations

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};

/// Imaging adjustments, each on a 0..=100 scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSettings {
    pub brightness: u8,
    pub contrast: u8,
    pub saturation: u8,
    pub hue: u8,
    pub sharpness: u8,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            brightness: 50,
            contrast: 50,
            saturation: 50,
            hue: 50,
            sharpness: 50,
        }
    }
}

impl ImageSettings {
    pub fn validate(&self) -> Result<()> {
        let values = [
            ("brightness", self.brightness),
            ("contrast", self.contrast),
            ("saturation", self.saturation),
            ("hue", self.hue),
            ("sharpness", self.sharpness),
        ];
        for (name, value) in values {
            if value > 100 {
                return Err(ApiError::InvalidParameter(format!(
                    "{name} {value} outside 0..=100"
                )));
            }
        }
        Ok(())
    }
}

/// On-screen display overlay
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OsdSettings {
    pub show_date_time: bool,
    pub show_channel_name: bool,
    pub channel_name: String,
}

impl OsdSettings {
    pub const MAX_NAME_LEN: usize = 32;

    pub fn validate(&self) -> Result<()> {
        if self.channel_name.chars().count() > Self::MAX_NAME_LEN {
            return Err(ApiError::InvalidParameter(format!(
                "channel name longer than {} characters",
                Self::MAX_NAME_LEN
            )));
        }
        if self.channel_name.chars().any(char::is_control) {
            return Err(ApiError::InvalidParameter(
                "channel name contains control characters".to_string(),
            ));
        }
        Ok(())
    }
}

/// Rectangle in a normalized 0..=1000 coordinate space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Region {
    pub const EXTENT: u16 = 1000;

    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn full() -> Self {
        Self::new(0, 0, Self::EXTENT, Self::EXTENT)
    }

    pub fn validate(&self) -> Result<()> {
        let fits = |start: u16, len: u16| u32::from(start) + u32::from(len) <= u32::from(Self::EXTENT);
        if self.width == 0 || self.height == 0 || !fits(self.x, self.width) || !fits(self.y, self.height) {
            return Err(ApiError::InvalidParameter(format!(
                "region {},{} {}x{} outside frame",
                self.x, self.y, self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Motion detection area and sensitivity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionWindow {
    pub enabled: bool,
    /// 1 (least sensitive) ..= 10
    pub sensitivity: u8,
    pub regions: Vec<Region>,
}

impl Default for MotionWindow {
    fn default() -> Self {
        Self {
            enabled: true,
            sensitivity: 5,
            regions: vec![Region::full()],
        }
    }
}

impl MotionWindow {
    pub const MAX_REGIONS: usize = 4;

    pub fn validate(&self) -> Result<()> {
        if !(1..=10).contains(&self.sensitivity) {
            return Err(ApiError::InvalidParameter(format!(
                "sensitivity {} outside 1..=10",
                self.sensitivity
            )));
        }
        if self.regions.len() > Self::MAX_REGIONS {
            return Err(ApiError::InvalidParameter(format!(
                "at most {} motion regions",
                Self::MAX_REGIONS
            )));
        }
        self.regions.iter().try_for_each(Region::validate)
    }
}

/// Blanked-out areas of the picture
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PrivacyMask {
    pub enabled: bool,
    pub regions: Vec<Region>,
}

impl PrivacyMask {
    pub const MAX_REGIONS: usize = 4;

    pub fn validate(&self) -> Result<()> {
        if self.regions.len() > Self::MAX_REGIONS {
            return Err(ApiError::InvalidParameter(format!(
                "at most {} privacy regions",
                Self::MAX_REGIONS
            )));
        }
        self.regions.iter().try_for_each(Region::validate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PtzAction {
    Stop,
    Up,
    Down,
    Left,
    Right,
    ZoomIn,
    ZoomOut,
    FocusNear,
    FocusFar,
    GotoPreset(u8),
}

impl PtzAction {
    pub fn is_preset(self) -> bool {
        matches!(self, PtzAction::GotoPreset(_))
    }
}

/// A single pan/tilt/zoom command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtzCommand {
    pub action: PtzAction,
    /// 1 ..= 8
    pub speed: u8,
}

impl PtzCommand {
    pub fn new(action: PtzAction, speed: u8) -> Self {
        Self { action, speed }
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=8).contains(&self.speed) {
            return Err(ApiError::InvalidParameter(format!(
                "ptz speed {} outside 1..=8",
                self.speed
            )));
        }
        if let PtzAction::GotoPreset(preset) = self.action {
            if preset == 0 {
                return Err(ApiError::InvalidParameter("presets are numbered from 1".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_bounds() {
        assert!(Region::full().validate().is_ok());
        assert!(Region::new(900, 0, 200, 100).validate().is_err());
        assert!(Region::new(0, 0, 0, 100).validate().is_err());
    }

    #[test]
    fn test_motion_window_limits() {
        let mut window = MotionWindow::default();
        assert!(window.validate().is_ok());
        window.regions = vec![Region::full(); 5];
        assert!(window.validate().is_err());
        window.regions.truncate(1);
        window.sensitivity = 0;
        assert!(window.validate().is_err());
    }

    #[test]
    fn test_ptz_validation() {
        assert!(PtzCommand::new(PtzAction::Left, 4).validate().is_ok());
        assert!(PtzCommand::new(PtzAction::Left, 0).validate().is_err());
        assert!(PtzCommand::new(PtzAction::GotoPreset(0), 1).validate().is_err());
    }

    #[test]
    fn test_osd_name_length() {
        let osd = OsdSettings {
            channel_name: "x".repeat(33),
            ..Default::default()
        };
        assert!(osd.validate().is_err());
    }
}
