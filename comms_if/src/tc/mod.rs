//! # Telecommand module
//!
//! This module provides the commands which can be sent to the rover core, along with the responses
//! the core gives to them.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Serialize, Deserialize};
use std::{fmt, str::FromStr};
use structopt::{StructOpt, clap::AppSettings};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A manual drive command.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveCmd {
    Forward,
    Back,
    Left,
    Right,
    Stop,
}

/// A telecommand as entered at the rover console.
///
/// The drive commands map directly onto [`DriveCmd`], the others manage the rover's mode and
/// report its status.
#[derive(Debug, Clone, StructOpt)]
#[structopt(setting = AppSettings::NoBinaryName)]
pub enum Tc {
    /// Drive forwards, rejected if the forward sector is blocked.
    #[structopt(name = "forward")]
    Forward,

    /// Drive backwards.
    #[structopt(name = "back")]
    Back,

    /// Spin left in place.
    #[structopt(name = "left")]
    Left,

    /// Spin right in place.
    #[structopt(name = "right")]
    Right,

    /// Stop and disable the motors.
    #[structopt(name = "stop")]
    Stop,

    /// Enable or disable the autonomous stop-scan-move loop.
    #[structopt(name = "auto")]
    Auto {
        /// `on` or `off`
        #[structopt(parse(try_from_str = parse_on_off))]
        enabled: bool,
    },

    /// Set the drive speed in percent, clamped to 0..=100.
    #[structopt(name = "speed")]
    Speed {
        #[structopt(allow_hyphen_values = true)]
        speed_pct: i64,
    },

    /// Print the rover status.
    #[structopt(name = "status")]
    Status,

    /// Shut the rover down.
    #[structopt(name = "quit")]
    Quit,
}

/// Possible parsing errors.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum CommandParseError {
    #[error("invalid cmd: {0}")]
    Unknown(String),

    #[error("expected `on` or `off`, found `{0}`")]
    NotOnOff(String),
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Response to a drive command.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CmdResponse {
    pub ok: bool,

    /// The reason the command was rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response to an autonomous mode toggle.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct ModeResponse {
    pub ok: bool,
    pub auto_enabled: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DriveCmd {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriveCmd::Forward => "forward",
            DriveCmd::Back => "back",
            DriveCmd::Left => "left",
            DriveCmd::Right => "right",
            DriveCmd::Stop => "stop",
        }
    }
}

impl FromStr for DriveCmd {
    type Err = CommandParseError;

    /// Parse a command name, ignoring case and surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cmd = s.trim().to_lowercase();

        match cmd.as_str() {
            "forward" => Ok(DriveCmd::Forward),
            "back" => Ok(DriveCmd::Back),
            "left" => Ok(DriveCmd::Left),
            "right" => Ok(DriveCmd::Right),
            "stop" => Ok(DriveCmd::Stop),
            _ => Err(CommandParseError::Unknown(cmd)),
        }
    }
}

impl fmt::Display for DriveCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Tc {
    /// Parse a console line into a telecommand.
    pub fn from_line(line: &str) -> Result<Self, structopt::clap::Error> {
        Tc::from_iter_safe(line.split_whitespace())
    }

    /// The drive command carried by this TC, if it is one.
    pub fn drive_cmd(&self) -> Option<DriveCmd> {
        match self {
            Tc::Forward => Some(DriveCmd::Forward),
            Tc::Back => Some(DriveCmd::Back),
            Tc::Left => Some(DriveCmd::Left),
            Tc::Right => Some(DriveCmd::Right),
            Tc::Stop => Some(DriveCmd::Stop),
            _ => None,
        }
    }
}

impl CmdResponse {
    pub fn ok() -> Self {
        Self { ok: true, error: None }
    }

    pub fn rejected<S: Into<String>>(reason: S) -> Self {
        Self { ok: false, error: Some(reason.into()) }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn parse_on_off(s: &str) -> Result<bool, CommandParseError> {
    match s.trim().to_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => Err(CommandParseError::NotOnOff(other.into())),
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_drive_cmd_from_str() {
        assert_eq!("forward".parse(), Ok(DriveCmd::Forward));
        assert_eq!("  BACK ".parse(), Ok(DriveCmd::Back));
        assert_eq!("Stop".parse(), Ok(DriveCmd::Stop));
        assert_eq!(
            "jump".parse::<DriveCmd>(),
            Err(CommandParseError::Unknown("jump".into()))
        );
        assert_eq!(
            "".parse::<DriveCmd>(),
            Err(CommandParseError::Unknown("".into()))
        );
    }

    #[test]
    fn test_drive_cmd_json() {
        assert_eq!(serde_json::to_string(&DriveCmd::Left).unwrap(), "\"left\"");
        assert_eq!(
            serde_json::from_str::<DriveCmd>("\"right\"").unwrap(),
            DriveCmd::Right
        );
    }

    #[test]
    fn test_tc_from_line() {
        assert_eq!(Tc::from_line("forward").unwrap().drive_cmd(), Some(DriveCmd::Forward));

        match Tc::from_line("auto on").unwrap() {
            Tc::Auto { enabled } => assert!(enabled),
            other => panic!("Expected Tc::Auto, got {:?}", other)
        }
        match Tc::from_line("auto off").unwrap() {
            Tc::Auto { enabled } => assert!(!enabled),
            other => panic!("Expected Tc::Auto, got {:?}", other)
        }
        match Tc::from_line("speed 75").unwrap() {
            Tc::Speed { speed_pct } => assert_eq!(speed_pct, 75),
            other => panic!("Expected Tc::Speed, got {:?}", other)
        }

        assert!(Tc::from_line("auto maybe").is_err());
        assert!(Tc::from_line("fly").is_err());
        assert_eq!(Tc::from_line("status").unwrap().drive_cmd(), None);
    }

    #[test]
    fn test_cmd_response_json() {
        assert_eq!(serde_json::to_string(&CmdResponse::ok()).unwrap(), "{\"ok\":true}");
        assert_eq!(
            serde_json::to_string(&CmdResponse::rejected("busy")).unwrap(),
            "{\"ok\":false,\"error\":\"busy\"}"
        );
    }
}
