//! Audio device and mode model
//!
//! Devices are identities only: the engine never tracks per-device state, it
//! only cares which categories are physically present.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RouteError, RouteResult};

/// Physical output path category
///
/// Declaration order is the order devices appear in notification lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioDevice {
    /// Built-in earpiece
    Earpiece,
    /// Built-in loudspeaker
    Speaker,
    /// Any wired or USB headset/headphones
    Headphones,
    /// Bluetooth SCO headset
    Bluetooth,
}

impl AudioDevice {
    /// All devices in declaration order
    pub const ALL: [AudioDevice; 4] = [
        AudioDevice::Earpiece,
        AudioDevice::Speaker,
        AudioDevice::Headphones,
        AudioDevice::Bluetooth,
    ];

    /// Wire identifier used by the host application
    pub fn id(&self) -> &'static str {
        match self {
            AudioDevice::Earpiece => "EARPIECE",
            AudioDevice::Speaker => "SPEAKER",
            AudioDevice::Headphones => "HEADPHONES",
            AudioDevice::Bluetooth => "BLUETOOTH",
        }
    }

    /// Default routing priority; higher wins. The earpiece is only ever
    /// reached through an explicit user choice.
    pub fn priority(&self) -> Option<u8> {
        match self {
            AudioDevice::Bluetooth => Some(3),
            AudioDevice::Headphones => Some(2),
            AudioDevice::Speaker => Some(1),
            AudioDevice::Earpiece => None,
        }
    }
}

impl fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for AudioDevice {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AudioDevice::ALL
            .into_iter()
            .find(|device| device.id().eq_ignore_ascii_case(s))
            .ok_or_else(|| RouteError::invalid_argument(format!("Unknown audio device {}", s)))
    }
}

/// Set of currently present devices, replaced wholesale on every hardware report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceSet(BTreeSet<AudioDevice>);

impl DeviceSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Check membership
    pub fn contains(&self, device: AudioDevice) -> bool {
        self.0.contains(&device)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in declaration order
    pub fn iter(&self) -> impl Iterator<Item = AudioDevice> + '_ {
        self.0.iter().copied()
    }

    /// Highest-priority device present, falling back to the speaker which
    /// is always considered available.
    pub fn priority_device(&self) -> AudioDevice {
        self.iter()
            .filter_map(|device| device.priority().map(|p| (p, device)))
            .max_by_key(|(p, _)| *p)
            .map(|(_, device)| device)
            .unwrap_or(AudioDevice::Speaker)
    }
}

impl FromIterator<AudioDevice> for DeviceSet {
    fn from_iter<I: IntoIterator<Item = AudioDevice>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[AudioDevice; N]> for DeviceSet {
    fn from(devices: [AudioDevice; N]) -> Self {
        devices.into_iter().collect()
    }
}

/// Audio mode requested by the application
///
/// - `Default` is used before and after every call and never drives routing.
/// - `AudioCall` is used for audio-only calls.
/// - `VideoCall` is used for video calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioMode {
    Default,
    AudioCall,
    VideoCall,
}

impl AudioMode {
    /// Raw sentinel for "no mode set yet"
    pub const UNSET: i32 = -1;

    /// Raw integer value exported to the host
    pub fn as_raw(&self) -> i32 {
        match self {
            AudioMode::Default => 0,
            AudioMode::AudioCall => 1,
            AudioMode::VideoCall => 2,
        }
    }

    /// Whether this mode carries a call
    pub fn is_call(&self) -> bool {
        !matches!(self, AudioMode::Default)
    }
}

impl TryFrom<i32> for AudioMode {
    type Error = RouteError;

    fn try_from(value: i32) -> RouteResult<Self> {
        match value {
            0 => Ok(AudioMode::Default),
            1 => Ok(AudioMode::AudioCall),
            2 => Ok(AudioMode::VideoCall),
            other => Err(RouteError::invalid_argument(format!("Invalid audio mode {}", other))),
        }
    }
}

impl fmt::Display for AudioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioMode::Default => "DEFAULT",
            AudioMode::AudioCall => "AUDIO_CALL",
            AudioMode::VideoCall => "VIDEO_CALL",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_ids_round_trip_through_from_str() {
        for device in AudioDevice::ALL {
            assert_eq!(device.id().parse::<AudioDevice>().unwrap(), device);
        }
        assert_eq!("bluetooth".parse::<AudioDevice>().unwrap(), AudioDevice::Bluetooth);
        assert!("CAR_KIT".parse::<AudioDevice>().is_err());
    }

    #[test]
    fn test_priority_device() {
        assert_eq!(DeviceSet::new().priority_device(), AudioDevice::Speaker);
        assert_eq!(DeviceSet::from([AudioDevice::Earpiece]).priority_device(), AudioDevice::Speaker);
        assert_eq!(
            DeviceSet::from([AudioDevice::Speaker, AudioDevice::Headphones]).priority_device(),
            AudioDevice::Headphones
        );
        assert_eq!(
            DeviceSet::from([AudioDevice::Headphones, AudioDevice::Bluetooth, AudioDevice::Earpiece])
                .priority_device(),
            AudioDevice::Bluetooth
        );
    }

    #[test]
    fn test_mode_validation() {
        assert_eq!(AudioMode::try_from(0).unwrap(), AudioMode::Default);
        assert_eq!(AudioMode::try_from(2).unwrap(), AudioMode::VideoCall);
        assert!(matches!(AudioMode::try_from(AudioMode::UNSET), Err(RouteError::InvalidArgument { .. })));
        assert!(matches!(AudioMode::try_from(7), Err(RouteError::InvalidArgument { .. })));
    }

    #[test]
    fn test_device_set_serializes_in_declaration_order() {
        let set = DeviceSet::from([AudioDevice::Bluetooth, AudioDevice::Earpiece, AudioDevice::Speaker]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["EARPIECE","SPEAKER","BLUETOOTH"]"#);
    }
}
