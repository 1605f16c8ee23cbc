// src/core/protocol/command.rs

//! Parses inbound text frames into typed reader requests and admin commands.
//!
//! Every admin verb is validated against its grammar before anything else
//! happens, so a rejected line never has side effects.

use crate::core::AccessError;
use crate::core::access::RecordKind;
use lazy_static::lazy_static;
use regex::Regex;

/// The separator between door name and credential in a reader frame.
const REQUEST_SEPARATOR: char = ':';

lazy_static! {
    static ref NEW_RECORD: Regex =
        Regex::new(r"^(newDoor|newUser)\s+([A-Za-z0-9_]+)\s+([0-9]+)$").unwrap();
    static ref REMOVE_RECORD: Regex = Regex::new(r"^(rmDoor|rmUser)\s+([A-Za-z0-9_]+)$").unwrap();
    static ref EDIT_RECORD: Regex = Regex::new(
        r"^(mvDoor|mvUser)\s+([A-Za-z0-9_]+)\s+([A-Za-z0-9_]+)(?:\s+([0-9]+))?$"
    )
    .unwrap();
    static ref SYSTEM_LOG: Regex =
        Regex::new(r"^getSystemLog\s+([0-9]{4})[-_]([0-9]{2})[-_]([0-9]{2})$").unwrap();
    static ref NAMED_LOG: Regex =
        Regex::new(r"^(getUserLog|getDoorLog)\s+([A-Za-z0-9_]+)$").unwrap();
}

/// A reader's authorization request, `<doorName>:<credentialId>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRequest {
    pub door: String,
    pub credential: String,
}

impl ClientRequest {
    /// Splits a reader frame at its first separator. A missing separator, or
    /// one at either edge of the frame, is a protocol violation.
    pub fn parse(frame: &str) -> Result<Self, AccessError> {
        match frame.find(REQUEST_SEPARATOR) {
            Some(pos) if pos > 0 && pos < frame.len() - 1 => Ok(Self {
                door: frame[..pos].to_string(),
                credential: frame[pos + 1..].to_string(),
            }),
            _ => Err(AccessError::MalformedRequest),
        }
    }
}

/// Which audit file a log request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    System,
    User,
    Door,
}

/// A fully validated admin console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    NewDoor {
        name: String,
        level: u8,
    },
    NewUser {
        name: String,
        level: u8,
    },
    Remove {
        kind: RecordKind,
        name: String,
    },
    Edit {
        kind: RecordKind,
        old_name: String,
        new_name: String,
        level: Option<u8>,
    },
    GetLog {
        kind: LogKind,
        key: String,
    },
    Exit,
    Shutdown,
    Help,
}

impl AdminCommand {
    /// Parses one admin frame. Known verbs with bad arguments yield
    /// `AccessError::Syntax`; anything else is `AccessError::UnknownCommand`.
    pub fn parse(frame: &str) -> Result<Self, AccessError> {
        let line = frame.trim();
        let verb = line.split_whitespace().next().unwrap_or_default();

        match verb {
            "newDoor" | "newUser" => {
                let caps = NEW_RECORD.captures(line).ok_or(AccessError::Syntax)?;
                let name = caps[2].to_string();
                let level = parse_level(&caps[3])?;
                if &caps[1] == "newDoor" {
                    Ok(AdminCommand::NewDoor { name, level })
                } else {
                    Ok(AdminCommand::NewUser { name, level })
                }
            }
            "rmDoor" | "rmUser" => {
                let caps = REMOVE_RECORD.captures(line).ok_or(AccessError::Syntax)?;
                Ok(AdminCommand::Remove {
                    kind: kind_of(&caps[1]),
                    name: caps[2].to_string(),
                })
            }
            "mvDoor" | "mvUser" => {
                let caps = EDIT_RECORD.captures(line).ok_or(AccessError::Syntax)?;
                let level = caps.get(4).map(|m| parse_level(m.as_str())).transpose()?;
                Ok(AdminCommand::Edit {
                    kind: kind_of(&caps[1]),
                    old_name: caps[2].to_string(),
                    new_name: caps[3].to_string(),
                    level,
                })
            }
            "getSystemLog" => {
                let caps = SYSTEM_LOG.captures(line).ok_or(AccessError::Syntax)?;
                Ok(AdminCommand::GetLog {
                    kind: LogKind::System,
                    key: format!("{}_{}_{}", &caps[1], &caps[2], &caps[3]),
                })
            }
            "getUserLog" | "getDoorLog" => {
                let caps = NAMED_LOG.captures(line).ok_or(AccessError::Syntax)?;
                let kind = if &caps[1] == "getUserLog" {
                    LogKind::User
                } else {
                    LogKind::Door
                };
                Ok(AdminCommand::GetLog {
                    kind,
                    key: caps[2].to_string(),
                })
            }
            "exit" | "shutdown" | "help" if line != verb => Err(AccessError::Syntax),
            "exit" => Ok(AdminCommand::Exit),
            "shutdown" => Ok(AdminCommand::Shutdown),
            "help" => Ok(AdminCommand::Help),
            other => Err(AccessError::UnknownCommand(other.to_string())),
        }
    }

    /// The wire verb, used for metrics labels and logging.
    pub fn verb(&self) -> &'static str {
        match self {
            AdminCommand::NewDoor { .. } => "newDoor",
            AdminCommand::NewUser { .. } => "newUser",
            AdminCommand::Remove {
                kind: RecordKind::Door,
                ..
            } => "rmDoor",
            AdminCommand::Remove {
                kind: RecordKind::User,
                ..
            } => "rmUser",
            AdminCommand::Edit {
                kind: RecordKind::Door,
                ..
            } => "mvDoor",
            AdminCommand::Edit {
                kind: RecordKind::User,
                ..
            } => "mvUser",
            AdminCommand::GetLog {
                kind: LogKind::System,
                ..
            } => "getSystemLog",
            AdminCommand::GetLog {
                kind: LogKind::User,
                ..
            } => "getUserLog",
            AdminCommand::GetLog {
                kind: LogKind::Door,
                ..
            } => "getDoorLog",
            AdminCommand::Exit => "exit",
            AdminCommand::Shutdown => "shutdown",
            AdminCommand::Help => "help",
        }
    }
}

/// The command overview sent in reply to `help`, one frame per line.
pub const HELP_LINES: &[&str] = &[
    "Commands:",
    "newDoor <name> <level>          - Add door",
    "newUser <name> <level>          - Add user (scan credential, then confirm)",
    "rmDoor <name>                   - Remove door (confirm)",
    "rmUser <name>                   - Remove user (confirm)",
    "mvDoor <old> <new> [level]      - Rename or re-level door (confirm)",
    "mvUser <old> <new> [level]      - Rename or re-level user (confirm)",
    "getSystemLog <YYYY_MM_DD>       - Download the log for one day",
    "getUserLog <name>               - Download the log for one user",
    "getDoorLog <name>               - Download the log for one door",
    "exit                            - Close this admin session",
    "shutdown                        - Stop the server",
];

fn kind_of(verb: &str) -> RecordKind {
    if verb.ends_with("Door") {
        RecordKind::Door
    } else {
        RecordKind::User
    }
}

fn parse_level(digits: &str) -> Result<u8, AccessError> {
    Ok(digits.parse::<u8>()?)
}
