// src/core/handler/admin.rs

//! The admin console protocol.
//!
//! A session starts `Unidentified` and must present the configured admin name
//! before anything else. Once bound, commands run one per frame. `newUser`,
//! `rm*` and `mv*` are multi-step: the pending action is carried in the session
//! stage between frames and only committed on an explicit `approved`.

use super::Flow;
use crate::connection::{Connection, ConnectionGuard, ConnectionHandle, ConnectionId};
use crate::core::AccessError;
use crate::core::access::{Record, RecordKind};
use crate::core::audit::AuditEvent;
use crate::core::metrics::ADMIN_COMMANDS_TOTAL;
use crate::core::protocol::{AdminCommand, HELP_LINES};
use crate::core::state::ServerState;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const AWAITING_IDENTIFICATION: &str = "Awaiting identification";
pub const ADMIN_IDENTIFIED: &str = "Admin identified";
pub const SCAN_CREDENTIAL: &str = "Scan credential";
pub const CONFIRM_PROMPT: &str = "Confirm: approved|denied";
pub const OPERATION_CANCELLED: &str = "Operation cancelled";
pub const GOODBYE: &str = "Goodbye";
pub const SHUTTING_DOWN: &str = "Shutting Down...";

const CONFIRM_YES: &str = "approved";
const CONFIRM_NO: &str = "denied";

/// A mutation waiting for the admin's confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    AddUser {
        name: String,
        level: u8,
        credential_id: String,
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
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Unidentified,
    Ready,
    AwaitingCredential { name: String, level: u8 },
    AwaitingConfirmation(PendingAction),
}

/// One outbound reply produced by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminReply {
    Text(String),
    File(PathBuf),
}

/// The replies for one frame and what the connection does next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub replies: Vec<AdminReply>,
    pub flow: Flow,
}

impl Step {
    fn reply(text: impl Into<String>) -> Self {
        Self {
            replies: vec![AdminReply::Text(text.into())],
            flow: Flow::Continue,
        }
    }

    fn close_with(text: impl Into<String>) -> Self {
        Self {
            replies: vec![AdminReply::Text(text.into())],
            flow: Flow::Close,
        }
    }

    fn error(e: AccessError) -> Self {
        Self::reply(e.to_string())
    }
}

/// The per-connection admin state machine. It never touches the socket; the
/// `serve` loop writes whatever each step returns.
#[derive(Debug)]
pub struct AdminSession {
    id: ConnectionId,
    stage: Stage,
    state: Arc<ServerState>,
}

impl AdminSession {
    pub fn new(id: ConnectionId, state: Arc<ServerState>) -> Self {
        Self {
            id,
            stage: Stage::Unidentified,
            state,
        }
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Greets a fresh connection, or turns it away if another admin is bound.
    pub fn on_connect(&self) -> Step {
        if self.state.admin.is_held_by_other(self.id) {
            info!("Rejecting admin connection {}: another admin is bound", self.id);
            return Step::close_with(AccessError::AdminAlreadyBound.to_string());
        }
        Step::reply(AWAITING_IDENTIFICATION)
    }

    pub async fn on_frame(&mut self, frame: &str) -> Step {
        match std::mem::replace(&mut self.stage, Stage::Ready) {
            Stage::Unidentified => self.identify(frame),
            Stage::Ready => self.dispatch(frame).await,
            Stage::AwaitingCredential { name, level } if ends_session(frame) => {
                debug!("Admin left while adding user '{}' (level {})", name, level);
                self.dispatch(frame).await
            }
            Stage::AwaitingCredential { name, level } => {
                let credential_id = frame.trim();
                if credential_id.is_empty() {
                    self.stage = Stage::AwaitingCredential { name, level };
                    return Step::error(AccessError::Syntax);
                }
                self.stage = Stage::AwaitingConfirmation(PendingAction::AddUser {
                    name,
                    level,
                    credential_id: credential_id.to_string(),
                });
                Step::reply(CONFIRM_PROMPT)
            }
            Stage::AwaitingConfirmation(action) => match frame.trim() {
                CONFIRM_YES => self.commit(action).await,
                CONFIRM_NO => {
                    debug!("Admin cancelled {:?}", action);
                    Step::reply(OPERATION_CANCELLED)
                }
                _ if ends_session(frame) => {
                    debug!("Admin left with {:?} unconfirmed", action);
                    self.dispatch(frame).await
                }
                _ => {
                    self.stage = Stage::AwaitingConfirmation(action);
                    Step::error(AccessError::Syntax)
                }
            },
        }
    }

    fn identify(&mut self, frame: &str) -> Step {
        if !self.state.admin.matches(frame) {
            self.stage = Stage::Unidentified;
            return Step::reply(AWAITING_IDENTIFICATION);
        }
        match self.state.admin.try_bind(self.id) {
            Ok(()) => Step::reply(ADMIN_IDENTIFIED),
            Err(e) => {
                self.stage = Stage::Unidentified;
                Step::close_with(e.to_string())
            }
        }
    }

    async fn dispatch(&mut self, frame: &str) -> Step {
        let command = match AdminCommand::parse(frame) {
            Ok(command) => command,
            Err(e) => {
                debug!("Rejected admin frame {:?}: {:?}", frame, e);
                return Step::error(e);
            }
        };
        ADMIN_COMMANDS_TOTAL
            .with_label_values(&[command.verb()])
            .inc();
        info!("Admin command: {}", command.verb());

        let access = &self.state.access;
        match command {
            AdminCommand::NewDoor { name, level } => match access.add_door(&name, level).await {
                Ok(door) => {
                    self.audit("newDoor", Some(&door.name), None, None).await;
                    Step::reply("Door Added Successfully")
                }
                Err(e) => Step::error(e),
            },
            AdminCommand::NewUser { name, level } => {
                if access.user(&name).await.is_some() {
                    return Step::error(AccessError::UserExists);
                }
                self.stage = Stage::AwaitingCredential { name, level };
                Step::reply(SCAN_CREDENTIAL)
            }
            AdminCommand::Remove { kind, name } => {
                if let Err(e) = self.ensure_exists(kind, &name).await {
                    return Step::error(e);
                }
                self.stage = Stage::AwaitingConfirmation(PendingAction::Remove { kind, name });
                Step::reply(CONFIRM_PROMPT)
            }
            AdminCommand::Edit {
                kind,
                old_name,
                new_name,
                level,
            } => {
                if let Err(e) = self.ensure_exists(kind, &old_name).await {
                    return Step::error(e);
                }
                self.stage = Stage::AwaitingConfirmation(PendingAction::Edit {
                    kind,
                    old_name,
                    new_name,
                    level,
                });
                Step::reply(CONFIRM_PROMPT)
            }
            AdminCommand::GetLog { kind, key } => {
                match self.state.audit.log_path(kind, &key).await {
                    Ok(path) => Step {
                        replies: vec![AdminReply::File(path)],
                        flow: Flow::Continue,
                    },
                    Err(e) => Step::error(e),
                }
            }
            AdminCommand::Help => Step {
                replies: HELP_LINES
                    .iter()
                    .map(|line| AdminReply::Text((*line).to_string()))
                    .collect(),
                flow: Flow::Continue,
            },
            AdminCommand::Exit => {
                self.state.admin.release(self.id);
                Step::close_with(GOODBYE)
            }
            AdminCommand::Shutdown => {
                warn!("Shutdown requested from the admin console.");
                self.state.admin.release(self.id);
                self.state.request_shutdown();
                Step::close_with(SHUTTING_DOWN)
            }
        }
    }

    async fn ensure_exists(&self, kind: RecordKind, name: &str) -> Result<(), AccessError> {
        let access = &self.state.access;
        match kind {
            RecordKind::Door if access.door(name).await.is_none() => Err(AccessError::DoorNotFound),
            RecordKind::User if access.user(name).await.is_none() => Err(AccessError::UserNotFound),
            _ => Ok(()),
        }
    }

    async fn commit(&mut self, action: PendingAction) -> Step {
        let access = &self.state.access;
        match action {
            PendingAction::AddUser {
                name,
                level,
                credential_id,
            } => match access.add_user(&name, level, &credential_id).await {
                Ok(user) => {
                    self.audit("newUser", None, Some(&user.name), Some(&user.credential_id))
                        .await;
                    Step::reply("User Added Successfully")
                }
                Err(e) => Step::error(e),
            },
            PendingAction::Remove {
                kind: RecordKind::Door,
                name,
            } => match access.remove_door(&name).await {
                Ok(door) => {
                    self.audit("rmDoor", Some(&door.name), None, None).await;
                    Step::reply("Door Removed Successfully")
                }
                Err(e) => Step::error(e),
            },
            PendingAction::Remove {
                kind: RecordKind::User,
                name,
            } => match access.remove_user(&name).await {
                Ok(user) => {
                    self.audit("rmUser", None, Some(&user.name), Some(&user.credential_id))
                        .await;
                    Step::reply("User Removed Successfully")
                }
                Err(e) => Step::error(e),
            },
            PendingAction::Edit {
                kind,
                old_name,
                new_name,
                level,
            } => match access
                .rename_or_edit(kind, &old_name, &new_name, level)
                .await
            {
                Ok(Record::Door(door)) => {
                    self.audit("mvDoor", Some(&door.name), None, None).await;
                    Step::reply("Door Updated Successfully")
                }
                Ok(Record::User(user)) => {
                    self.audit("mvUser", None, Some(&user.name), Some(&user.credential_id))
                        .await;
                    Step::reply("User Updated Successfully")
                }
                Err(e) => Step::error(e),
            },
        }
    }

    async fn audit(
        &self,
        verb: &str,
        door: Option<&str>,
        user: Option<&str>,
        credential_id: Option<&str>,
    ) {
        self.state
            .audit
            .record(AuditEvent::admin(verb, door, user, credential_id))
            .await;
    }
}

/// Drives one admin connection until it closes.
pub async fn serve(mut conn: Connection, state: Arc<ServerState>) {
    let handle = conn.handle().clone();
    let _guard = ConnectionGuard::new(handle.clone());
    state.stats.increment_total_connections();

    let mut session = AdminSession::new(handle.id(), state.clone());
    if deliver(&handle, session.on_connect()) == Flow::Close {
        return;
    }

    loop {
        let frame = match conn.read_frame().await {
            Ok(frame) => frame,
            Err(e) if e.is_normal_disconnect() => {
                debug!("Admin connection {} disconnected", handle.id());
                break;
            }
            Err(e) => {
                warn!("Admin connection {} dropped: {}", handle.id(), e);
                break;
            }
        };
        state.stats.increment_total_frames();
        let step = session.on_frame(&frame).await;
        if deliver(&handle, step) == Flow::Close {
            break;
        }
    }

    // Freed before the guard closes the socket, so a peer that has seen the
    // close can bind again straight away. The listener's disconnect callback
    // releases it too if this task is torn down.
    state.admin.release(handle.id());
}

/// `exit` and `shutdown` are honoured at any stage; a pending action is dropped.
fn ends_session(frame: &str) -> bool {
    matches!(
        AdminCommand::parse(frame),
        Ok(AdminCommand::Exit | AdminCommand::Shutdown)
    )
}

fn deliver(handle: &ConnectionHandle, step: Step) -> Flow {
    for reply in step.replies {
        let queued = match reply {
            AdminReply::Text(text) => handle.write(text),
            AdminReply::File(path) => handle.write_file(path),
        };
        if queued.is_err() {
            return Flow::Close;
        }
    }
    step.flow
}
