//! Timer and command loop for a running session.
//!
//! Multiplexes the four recurring timers with host commands on the current
//! thread. A tick that runs long simply delays the next one; nothing ever
//! overlaps.

use crate::core::manager::ProctoringManager;
use crate::platform::{PlatformSignal, SignalDisposition};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

const COMMAND_BUFFER: usize = 256;

/// Something the host asks of a running session.
#[derive(Debug)]
pub enum HostCommand {
    /// A host event; the disposition is sent back when `reply` is set
    Signal {
        signal: PlatformSignal,
        reply: Option<oneshot::Sender<SignalDisposition>>,
    },
    AllowStop,
    Stop,
}

pub struct SessionDriver {
    manager: ProctoringManager,
    commands: mpsc::Receiver<HostCommand>,
}

impl SessionDriver {
    /// Wrap a started manager; the returned sender is the host's handle.
    pub fn new(manager: ProctoringManager) -> (Self, mpsc::Sender<HostCommand>) {
        let (sender, commands) = mpsc::channel(COMMAND_BUFFER);
        (Self { manager, commands }, sender)
    }

    /// Run until the session has been stopped, then hand the manager back.
    ///
    /// If every command sender is dropped while the session is still locked,
    /// the timers keep running and the loop never returns.
    pub async fn run(mut self) -> ProctoringManager {
        let timings = self.manager.config().timings.clone();
        let mut presence = interval(timings.presence_interval);
        let mut audio = interval(timings.audio_interval);
        let mut performance = interval(timings.performance_interval);
        let mut heartbeat = interval(timings.heartbeat_interval);
        for timer in [&mut presence, &mut audio, &mut performance, &mut heartbeat] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        let mut commands_closed = false;
        loop {
            tokio::select! {
                command = self.commands.recv(), if !commands_closed => match command {
                    Some(HostCommand::Signal { signal, reply }) => {
                        let disposition = self.manager.handle_signal(&signal);
                        if let Some(reply) = reply {
                            if reply.send(disposition).is_err() {
                                debug!("signal reply receiver dropped");
                            }
                        }
                    }
                    Some(HostCommand::AllowStop) => self.manager.allow_stop(),
                    Some(HostCommand::Stop) => {
                        self.manager.stop().await;
                        if !self.manager.is_active() {
                            break;
                        }
                    }
                    None if self.manager.can_stop() => {
                        self.manager.stop().await;
                        break;
                    }
                    None => {
                        warn!("host command channel closed while monitoring is locked");
                        commands_closed = true;
                    }
                },
                _ = presence.tick() => self.manager.presence_tick(),
                _ = audio.tick() => self.manager.audio_tick(),
                _ = performance.tick() => self.manager.performance_tick(),
                _ = heartbeat.tick() => self.manager.heartbeat(),
            }
        }

        self.manager
    }
}
