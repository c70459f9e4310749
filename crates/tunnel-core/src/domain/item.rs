//! Automation items: kinds, states and the commands each kind accepts.
//!
//! The relay can send free-form command strings such as `"ON"`, `"50"` or
//! `"toggle"`.  Each [`ItemKind`] declares an ordered command vocabulary;
//! a raw string is accepted only if one of those command kinds can parse it.
//! Garbage is rejected here, before anything reaches the automation bus.

use std::fmt;
use std::str::FromStr;

/// The literal command string that asks for the complement of the current state.
pub const TOGGLE: &str = "toggle";

/// State value of an item that has never been initialised.
pub const STATE_NULL: &str = "NULL";

// ── ItemKind ──────────────────────────────────────────────────────────────────

/// The type of an automation item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// Two-state ON/OFF item.
    Switch,
    /// Percentage item that also accepts ON/OFF and INCREASE/DECREASE.
    Dimmer,
    /// Blind or shutter: UP/DOWN, STOP/MOVE, or a position percentage.
    Rollershutter,
    /// Read-only OPEN/CLOSED sensor.
    Contact,
    /// Decimal value.
    Number,
    /// Free text.
    String,
}

impl ItemKind {
    /// Command kinds this item accepts, in parse order.
    pub fn accepted_commands(self) -> &'static [CommandKind] {
        use CommandKind::*;
        match self {
            ItemKind::Switch => &[OnOff, Refresh],
            ItemKind::Dimmer => &[Percent, OnOff, IncreaseDecrease, Refresh],
            ItemKind::Rollershutter => &[UpDown, StopMove, Percent, Refresh],
            ItemKind::Contact => &[Refresh],
            ItemKind::Number => &[Decimal, Refresh],
            ItemKind::String => &[Refresh, Text],
        }
    }
}

impl FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "switch" => Ok(ItemKind::Switch),
            "dimmer" => Ok(ItemKind::Dimmer),
            "rollershutter" => Ok(ItemKind::Rollershutter),
            "contact" => Ok(ItemKind::Contact),
            "number" => Ok(ItemKind::Number),
            "string" => Ok(ItemKind::String),
            other => Err(format!("unknown item kind: {other}")),
        }
    }
}

// ── Command ───────────────────────────────────────────────────────────────────

/// A parsed command ready for the automation bus.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    On,
    Off,
    Up,
    Down,
    Stop,
    Move,
    Increase,
    Decrease,
    /// 0–100 inclusive.
    Percent(f64),
    Decimal(f64),
    Text(String),
    Refresh,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::On => f.write_str("ON"),
            Command::Off => f.write_str("OFF"),
            Command::Up => f.write_str("UP"),
            Command::Down => f.write_str("DOWN"),
            Command::Stop => f.write_str("STOP"),
            Command::Move => f.write_str("MOVE"),
            Command::Increase => f.write_str("INCREASE"),
            Command::Decrease => f.write_str("DECREASE"),
            Command::Percent(p) => write!(f, "{p}"),
            Command::Decimal(d) => write!(f, "{d}"),
            Command::Text(t) => f.write_str(t),
            Command::Refresh => f.write_str("REFRESH"),
        }
    }
}

/// One family of commands, e.g. ON/OFF or a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    OnOff,
    UpDown,
    StopMove,
    IncreaseDecrease,
    Percent,
    Decimal,
    Text,
    Refresh,
}

impl CommandKind {
    /// Parses `raw` as a command of this kind.  Keywords are case-sensitive.
    pub fn parse(self, raw: &str) -> Option<Command> {
        match (self, raw) {
            (CommandKind::OnOff, "ON") => Some(Command::On),
            (CommandKind::OnOff, "OFF") => Some(Command::Off),
            (CommandKind::UpDown, "UP") => Some(Command::Up),
            (CommandKind::UpDown, "DOWN") => Some(Command::Down),
            (CommandKind::StopMove, "STOP") => Some(Command::Stop),
            (CommandKind::StopMove, "MOVE") => Some(Command::Move),
            (CommandKind::IncreaseDecrease, "INCREASE") => Some(Command::Increase),
            (CommandKind::IncreaseDecrease, "DECREASE") => Some(Command::Decrease),
            (CommandKind::Refresh, "REFRESH") => Some(Command::Refresh),
            (CommandKind::Percent, s) => parse_number(s)
                .filter(|p| (0.0..=100.0).contains(p))
                .map(Command::Percent),
            (CommandKind::Decimal, s) => parse_number(s).map(Command::Decimal),
            (CommandKind::Text, s) => Some(Command::Text(s.to_string())),
            _ => None,
        }
    }
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

// ── ItemState ─────────────────────────────────────────────────────────────────

/// Current state of an item in its string form (`"ON"`, `"42.5"`, `"NULL"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemState(pub String);

impl ItemState {
    pub fn null() -> Self {
        ItemState(STATE_NULL.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn as_number(&self) -> Option<f64> {
        parse_number(&self.0)
    }

    /// Whether the state reads as "on": `ON`, or a positive percentage.
    pub fn is_on(&self) -> bool {
        self.0 == "ON" || self.as_number().is_some_and(|v| v > 0.0)
    }

    /// Whether a shutter state reads as fully up: `UP` or 0 %.
    pub fn is_up(&self) -> bool {
        self.0 == "UP" || self.as_number().is_some_and(|v| v == 0.0)
    }

    /// The state an item of `kind` would hold after receiving `command`.
    ///
    /// Returns `None` for commands that do not change state by themselves
    /// (REFRESH, STOP, MOVE) or that do not apply to `kind`.
    pub fn after_command(&self, kind: ItemKind, command: &Command) -> Option<ItemState> {
        let next = match (kind, command) {
            (_, Command::Refresh | Command::Stop | Command::Move) => return None,
            (ItemKind::Switch, Command::On) => "ON".to_string(),
            (ItemKind::Switch, Command::Off) => "OFF".to_string(),
            (ItemKind::Dimmer, Command::On) => "100".to_string(),
            (ItemKind::Dimmer, Command::Off) => "0".to_string(),
            (ItemKind::Dimmer, Command::Increase | Command::Decrease) => {
                let current = self.as_number().unwrap_or(if self.is_on() { 100.0 } else { 0.0 });
                let step = if *command == Command::Increase { 10.0 } else { -10.0 };
                format!("{}", (current + step).clamp(0.0, 100.0))
            }
            (ItemKind::Rollershutter, Command::Up) => "0".to_string(),
            (ItemKind::Rollershutter, Command::Down) => "100".to_string(),
            (ItemKind::Dimmer | ItemKind::Rollershutter, Command::Percent(p)) => format!("{p}"),
            (ItemKind::Number, Command::Decimal(d)) => format!("{d}"),
            (ItemKind::String, Command::Text(t)) => t.clone(),
            _ => return None,
        };
        Some(ItemState(next))
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── ItemSnapshot ──────────────────────────────────────────────────────────────

/// A point-in-time view of one item, as returned by the host's item lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSnapshot {
    pub name: String,
    pub kind: ItemKind,
    pub state: ItemState,
}

impl ItemSnapshot {
    /// Parses `raw` against this item's command vocabulary.
    pub fn parse_command(&self, raw: &str) -> Option<Command> {
        self.kind
            .accepted_commands()
            .iter()
            .find_map(|kind| kind.parse(raw))
    }

    /// The complement of the current state for two-state kinds.
    ///
    /// Switch and Dimmer toggle between ON and OFF; Rollershutter between UP
    /// and DOWN.  Other kinds cannot be toggled.
    pub fn toggle_command(&self) -> Option<Command> {
        match self.kind {
            ItemKind::Switch | ItemKind::Dimmer => Some(if self.state.is_on() {
                Command::Off
            } else {
                Command::On
            }),
            ItemKind::Rollershutter => Some(if self.state.is_up() {
                Command::Down
            } else {
                Command::Up
            }),
            _ => None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
