//! Simulation script language
//!
//! One command per line; `#` starts a comment.
//!
//! ```text
//! plug <earpiece|speaker|headphones|headset|usb|bluetooth>
//! unplug <kind>
//! mode <default|audio|video|raw integer>
//! select <device id>
//! focus <loss|transient|duck|gain>
//! managed <on|off>
//! route <device id>       # platform-side route change (managed routing only)
//! refresh
//! state
//! ```

use anyhow::{anyhow, bail, Context, Result};

use callroute_core::platform::{FocusChange, PlatformDeviceKind};
use callroute_core::{AudioDevice, AudioMode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptCommand {
    Plug(PlatformDeviceKind),
    Unplug(PlatformDeviceKind),
    /// Raw value so that invalid modes reach the coordinator as-is
    Mode(i32),
    /// Kept as text; unknown ids are the coordinator's business
    Select(String),
    Focus(FocusChange),
    Managed(bool),
    Route(AudioDevice),
    Refresh,
    State,
}

/// Parse a whole script. Errors carry the 1-based line number.
pub fn parse_script(source: &str) -> Result<Vec<ScriptCommand>> {
    source
        .lines()
        .enumerate()
        .filter_map(|(index, line)| {
            parse_line(line)
                .with_context(|| format!("line {}: {}", index + 1, line.trim()))
                .transpose()
        })
        .collect()
}

/// Parse one line; blank lines and comments yield `None`
pub fn parse_line(line: &str) -> Result<Option<ScriptCommand>> {
    let line = line.split('#').next().unwrap_or_default().trim();
    if line.is_empty() {
        return Ok(None);
    }

    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default().to_ascii_lowercase();
    let arg = words.next();
    if let Some(extra) = words.next() {
        bail!("unexpected argument '{}'", extra);
    }

    let command = match (verb.as_str(), arg) {
        ("plug", Some(kind)) => ScriptCommand::Plug(parse_kind(kind)?),
        ("unplug", Some(kind)) => ScriptCommand::Unplug(parse_kind(kind)?),
        ("mode", Some(mode)) => ScriptCommand::Mode(parse_mode(mode)?),
        ("select", Some(device)) => ScriptCommand::Select(device.to_string()),
        ("focus", Some(change)) => ScriptCommand::Focus(parse_focus(change)?),
        ("managed", Some(flag)) => ScriptCommand::Managed(parse_flag(flag)?),
        ("route", Some(device)) => ScriptCommand::Route(device.parse()?),
        ("refresh", None) => ScriptCommand::Refresh,
        ("state", None) => ScriptCommand::State,
        ("refresh" | "state", Some(extra)) => bail!("unexpected argument '{}'", extra),
        (
            "plug" | "unplug" | "mode" | "select" | "focus" | "managed" | "route",
            None,
        ) => bail!("'{}' needs an argument", verb),
        (other, _) => bail!("unknown command '{}'", other),
    };
    Ok(Some(command))
}

fn parse_kind(kind: &str) -> Result<PlatformDeviceKind> {
    match kind.to_ascii_lowercase().as_str() {
        "earpiece" => Ok(PlatformDeviceKind::BuiltinEarpiece),
        "speaker" => Ok(PlatformDeviceKind::BuiltinSpeaker),
        "headphones" => Ok(PlatformDeviceKind::WiredHeadphones),
        "headset" => Ok(PlatformDeviceKind::WiredHeadset),
        "usb" => Ok(PlatformDeviceKind::UsbHeadset),
        "bluetooth" | "bt" => Ok(PlatformDeviceKind::BluetoothSco),
        other => Err(anyhow!("unknown device kind '{}'", other)),
    }
}

fn parse_mode(mode: &str) -> Result<i32> {
    match mode.to_ascii_lowercase().as_str() {
        "default" => Ok(AudioMode::Default.as_raw()),
        "audio" => Ok(AudioMode::AudioCall.as_raw()),
        "video" => Ok(AudioMode::VideoCall.as_raw()),
        raw => raw
            .parse()
            .map_err(|_| anyhow!("mode must be default, audio, video or an integer, got '{}'", mode)),
    }
}

fn parse_focus(change: &str) -> Result<FocusChange> {
    match change.to_ascii_lowercase().as_str() {
        "gain" => Ok(FocusChange::Gain),
        "loss" => Ok(FocusChange::Loss),
        "transient" => Ok(FocusChange::LossTransient),
        "duck" => Ok(FocusChange::LossTransientCanDuck),
        other => Err(anyhow!("unknown focus change '{}'", other)),
    }
}

fn parse_flag(flag: &str) -> Result<bool> {
    match flag.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" => Ok(true),
        "off" | "false" | "no" => Ok(false),
        other => Err(anyhow!("expected on or off, got '{}'", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_line("plug bluetooth").unwrap(),
            Some(ScriptCommand::Plug(PlatformDeviceKind::BluetoothSco))
        );
        assert_eq!(parse_line("  mode VIDEO ").unwrap(), Some(ScriptCommand::Mode(2)));
        assert_eq!(parse_line("mode 9").unwrap(), Some(ScriptCommand::Mode(9)));
        assert_eq!(
            parse_line("select car_kit").unwrap(),
            Some(ScriptCommand::Select("car_kit".to_string()))
        );
        assert_eq!(
            parse_line("focus transient").unwrap(),
            Some(ScriptCommand::Focus(FocusChange::LossTransient))
        );
        assert_eq!(parse_line("managed off").unwrap(), Some(ScriptCommand::Managed(false)));
        assert_eq!(
            parse_line("route speaker").unwrap(),
            Some(ScriptCommand::Route(AudioDevice::Speaker))
        );
        assert_eq!(parse_line("state # dump").unwrap(), Some(ScriptCommand::State));
    }

    #[test]
    fn test_blank_and_comment_lines() {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("   # just a note").unwrap(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_line("plug").is_err());
        assert!(parse_line("plug toaster").is_err());
        assert!(parse_line("refresh now").is_err());
        assert!(parse_line("mode loud").is_err());
        assert!(parse_line("select a b").is_err());
        assert!(parse_line("dance").is_err());
    }

    #[test]
    fn test_script_errors_name_the_line() {
        let err = parse_script("mode audio\n\nfocus sideways\n").unwrap_err();
        assert!(format!("{:#}", err).starts_with("line 3: focus sideways"));

        let commands = parse_script("# setup\nplug usb\nstate\n").unwrap();
        assert_eq!(commands.len(), 2);
    }
}
