//! Message model for the integration protocol.
//!
//! Every protocol line carries a mode character, a command keyword, an
//! integration id, an optional component number, an action number and a
//! positional parameter list:
//!
//! ```text
//! <mode><KEYWORD>,<id>[,<component>],<action>[,<parameter>...]
//! ```
//!
//! Commands and queries are sent by this side; responses are only ever
//! received. The processor also emits responses unsolicited, so the same
//! message shape covers both query replies and spontaneous status reports.

use std::fmt;

/// The role of a protocol line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Execute a command (`#`). Outbound only.
    Execute,
    /// Query current status (`?`). Outbound only.
    Query,
    /// Status report (`~`). Inbound only.
    Response,
}

impl Mode {
    /// Get the leading mode character for this mode.
    pub fn mode_char(&self) -> char {
        match self {
            Mode::Execute => '#',
            Mode::Query => '?',
            Mode::Response => '~',
        }
    }

    /// Parse a mode from its leading character.
    pub fn from_char(c: char) -> Option<Mode> {
        match c {
            '#' => Some(Mode::Execute),
            '?' => Some(Mode::Query),
            '~' => Some(Mode::Response),
            _ => None,
        }
    }
}

/// Command keywords addressing one category of integration.
///
/// The keyword is part of the dispatch key, so a zone and a shade may share
/// the same numeric id without colliding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Dimmer/switch zone output (`OUTPUT`).
    Output,
    /// Single shade (`SHADE`).
    Shade,
    /// Shade group (`SHADEGRP`).
    ShadeGroup,
    /// Scene, addressed as (area id, scene number) (`SCENE`).
    Scene,
    /// Area-level status: current scene and occupancy (`AREA`).
    Area,
}

impl CommandKind {
    /// Get the command keyword string used on the wire.
    pub fn keyword(&self) -> &'static str {
        match self {
            CommandKind::Output => "OUTPUT",
            CommandKind::Shade => "SHADE",
            CommandKind::ShadeGroup => "SHADEGRP",
            CommandKind::Scene => "SCENE",
            CommandKind::Area => "AREA",
        }
    }

    /// Parse a command kind from its keyword.
    pub fn from_keyword(s: &str) -> Option<CommandKind> {
        match s {
            "OUTPUT" => Some(CommandKind::Output),
            "SHADE" => Some(CommandKind::Shade),
            "SHADEGRP" => Some(CommandKind::ShadeGroup),
            "SCENE" => Some(CommandKind::Scene),
            "AREA" => Some(CommandKind::Area),
            _ => None,
        }
    }

    /// Whether this kind uses the component-aware grammar (a component
    /// number between the integration id and the action).
    pub fn component_aware(&self) -> bool {
        matches!(self, CommandKind::Scene)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A fade or delay time, rendered on the wire as `HH:MM:SS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeTime {
    /// Hours component.
    pub hours: u32,
    /// Minutes component (0-59).
    pub minutes: u32,
    /// Seconds component (0-59).
    pub seconds: u32,
}

impl FadeTime {
    /// Zero-length fade (instant).
    pub const ZERO: FadeTime = FadeTime { hours: 0, minutes: 0, seconds: 0 };

    /// Create a fade time from a total number of seconds.
    pub fn from_seconds(total: u32) -> Self {
        FadeTime {
            hours: total / 3600,
            minutes: (total % 3600) / 60,
            seconds: total % 60,
        }
    }
}

impl fmt::Display for FadeTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

/// A positional command parameter with its protocol-specific rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandParameter {
    /// A level in the range `0.0..=1.0`, rendered as a fixed-point
    /// percentage (`0.5` becomes `50.00`).
    Percentage(f32),
    /// A fade or delay time, rendered as `HH:MM:SS`.
    Duration(FadeTime),
    /// An integer value, rendered as its decimal form.
    Integer(u32),
    /// A literal string, rendered as-is.
    Literal(String),
}

impl CommandParameter {
    /// Render the parameter to its wire form.
    pub fn render(&self) -> String {
        match self {
            CommandParameter::Percentage(level) => {
                format!("{:.2}", level.clamp(0.0, 1.0) * 100.0)
            }
            CommandParameter::Duration(time) => time.to_string(),
            CommandParameter::Integer(value) => value.to_string(),
            CommandParameter::Literal(text) => text.clone(),
        }
    }
}

/// A parsed protocol message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// The role of the line.
    pub mode: Mode,
    /// The command keyword.
    pub command: CommandKind,
    /// The addressed integration id.
    pub integration_id: u32,
    /// The component number, present only for component-aware kinds.
    pub component: Option<u32>,
    /// The action number.
    pub action: u32,
    /// Positional parameters, in wire order.
    pub parameters: Vec<String>,
}

impl Message {
    /// Get the first parameter, if any.
    pub fn first_parameter(&self) -> Option<&str> {
        self.parameters.first().map(String::as_str)
    }
}
