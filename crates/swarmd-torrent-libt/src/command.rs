//! Requests executed on the thread that owns the native session.
//!
//! Native calls touch the filesystem (payload allocation, data deletion), so
//! they run on a dedicated thread instead of an async worker. Each command
//! carries a `oneshot` sender for its reply.

use std::thread;

use anyhow::Result;
use swarmd_torrent_core::FilePriority;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::session::NativeSession;
use crate::types::{AddParams, NativeHandle, RemovalOutcome};

pub(crate) type Reply<T> = oneshot::Sender<Result<T>>;

#[derive(Debug)]
pub(crate) enum SessionCommand {
    Add {
        params: Box<AddParams>,
        respond_to: Reply<NativeHandle>,
    },
    Remove {
        handle: NativeHandle,
        with_data: bool,
        respond_to: Reply<RemovalOutcome>,
    },
    Pause {
        handle: NativeHandle,
        respond_to: Reply<()>,
    },
    Resume {
        handle: NativeHandle,
        respond_to: Reply<()>,
    },
    SetPriorities {
        handle: NativeHandle,
        priorities: Vec<FilePriority>,
        respond_to: Reply<()>,
    },
    QueryPieces {
        handle: NativeHandle,
        respond_to: Reply<Vec<bool>>,
    },
    Shutdown {
        respond_to: Reply<()>,
    },
}

impl SessionCommand {
    const fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add_torrent",
            Self::Remove { .. } => "remove_torrent",
            Self::Pause { .. } => "pause",
            Self::Resume { .. } => "resume",
            Self::SetPriorities { .. } => "set_priorities",
            Self::QueryPieces { .. } => "query_pieces",
            Self::Shutdown { .. } => "shutdown",
        }
    }
}

/// Move `session` onto its own thread and serve `commands` until a shutdown
/// request arrives or every sender is dropped.
pub(crate) fn spawn(
    mut session: Box<dyn NativeSession>,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
) -> std::io::Result<()> {
    thread::Builder::new()
        .name("swarmd-native".into())
        .spawn(move || {
            while let Some(command) = commands.blocking_recv() {
                let last = matches!(command, SessionCommand::Shutdown { .. });
                execute(session.as_mut(), command);
                if last {
                    break;
                }
            }
            if session.is_running()
                && let Err(err) = session.shutdown()
            {
                warn!(error = %err, "native session failed to stop after its owner went away");
            }
            debug!("native command thread exited");
        })
        .map(drop)
}

fn execute(session: &mut dyn NativeSession, command: SessionCommand) {
    let name = command.name();
    let delivered = match command {
        SessionCommand::Add { params, respond_to } => {
            respond_to.send(session.add_torrent(&params)).is_ok()
        }
        SessionCommand::Remove {
            handle,
            with_data,
            respond_to,
        } => respond_to
            .send(session.remove_torrent(handle, with_data))
            .is_ok(),
        SessionCommand::Pause { handle, respond_to } => respond_to.send(session.pause(handle)).is_ok(),
        SessionCommand::Resume { handle, respond_to } => {
            respond_to.send(session.resume(handle)).is_ok()
        }
        SessionCommand::SetPriorities {
            handle,
            priorities,
            respond_to,
        } => respond_to
            .send(session.set_priorities(handle, &priorities))
            .is_ok(),
        SessionCommand::QueryPieces { handle, respond_to } => {
            respond_to.send(session.query_pieces(handle)).is_ok()
        }
        SessionCommand::Shutdown { respond_to } => respond_to.send(session.shutdown()).is_ok(),
    };
    if !delivered {
        debug!(command = name, "caller went away before the reply");
    }
}
