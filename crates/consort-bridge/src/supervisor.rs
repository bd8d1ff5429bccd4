//! Child process supervision.
//!
//! Host -> command queue -> bridge thread -> OSC -> child. The audio thread
//! only ever `try_send`s into the queue; the bridge thread does the socket
//! work. Reports flow back through the control channel into
//! [`BridgeShared`].

use crate::config::{BridgeConfig, ENV_BUFFER_SIZE, ENV_SAMPLE_RATE};
use crate::protocol::{BridgeArgs, HostCommand};
use crate::shared::BridgeShared;
use crate::state::BridgeState;
use crate::{BridgeError, Result};
use consort_osc::{ChannelHandle, OscUrl};
use crossbeam_channel::{bounded, Sender, TrySendError};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const COMMAND_QUEUE_SIZE: usize = 512;

/// One running child and the thread that talks to it.
pub struct Supervisor {
    child: Option<Child>,
    /// Held open for the child's lifetime; the child quits on EOF.
    stdin: Option<ChildStdin>,
    shared: Arc<BridgeShared>,
    channel: ChannelHandle,
    config: BridgeConfig,
    commands: Option<Sender<HostCommand>>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("pid", &self.pid())
            .field("state", &self.shared.state())
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Launch the child. Returns once the process exists; the handshake
    /// has only just started.
    pub fn spawn(
        args: &BridgeArgs,
        sample_rate: f64,
        buffer_size: usize,
        shared: Arc<BridgeShared>,
        channel: ChannelHandle,
        config: BridgeConfig,
    ) -> Result<Self> {
        config.validate()?;
        let path = config.resolve_executable()?;
        tracing::debug!(path = %path.display(), label = %args.label, "spawning bridge");

        let mut child = Command::new(&path)
            .args(args.to_args())
            .env(ENV_SAMPLE_RATE, sample_rate.to_string())
            .env(ENV_BUFFER_SIZE, buffer_size.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| BridgeError::Spawn {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let stdin = child.stdin.take();

        let (commands, command_rx) = bounded::<HostCommand>(COMMAND_QUEUE_SIZE);
        let thread_shared = shared.clone();
        let thread_channel = channel.clone();
        let thread = thread::Builder::new()
            .name("consort-bridge".into())
            .spawn(move || {
                for command in command_rx {
                    let Some(url) = thread_shared.child_url() else {
                        tracing::trace!(method = command.method(), "bridge not ready, dropping");
                        continue;
                    };
                    if let Err(e) = thread_channel.send(&url, &command.to_message(&url)) {
                        tracing::warn!(method = command.method(), "bridge send failed: {}", e);
                    }
                }
            });
        let thread = match thread {
            Ok(thread) => thread,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e.into());
            }
        };

        shared.transition(BridgeState::Handshaking)?;
        Ok(Self {
            child: Some(child),
            stdin,
            shared,
            channel,
            config,
            commands: Some(commands),
            thread: Some(thread),
        })
    }

    pub fn shared(&self) -> &Arc<BridgeShared> {
        &self.shared
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Where the child sends its reports.
    pub fn plugin_url(&self) -> OscUrl {
        self.channel.plugin_url(self.shared.id())
    }

    /// Block until the child finished its introspection dump.
    pub fn wait_for_handshake(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.config.handshake_timeout();
        loop {
            match self.shared.state() {
                BridgeState::Ready => return Ok(()),
                BridgeState::Failed => {
                    return Err(BridgeError::Remote(self.shared.error().unwrap_or_default()))
                }
                _ => {}
            }
            if let Some(status) = self.try_wait()? {
                // Its last report may still be in flight.
                thread::sleep(self.config.handshake_step());
                if self.shared.state() == BridgeState::Failed {
                    continue;
                }
                self.shared.fail(format!("child exited with {}", status));
                return Err(BridgeError::ChildExited(status.to_string()));
            }
            if Instant::now() >= deadline {
                self.shared.fail("handshake timed out");
                return Err(BridgeError::HandshakeTimeout(self.config.handshake_timeout_ms));
            }
            thread::sleep(self.config.handshake_step());
        }
    }

    fn try_wait(&mut self) -> Result<Option<std::process::ExitStatus>> {
        match self.child.as_mut() {
            Some(child) => Ok(child.try_wait()?),
            None => Err(BridgeError::ChildExited("already closed".into())),
        }
    }

    /// Queue a command without blocking. Safe on the audio thread; a full
    /// queue drops the command.
    pub fn try_send(&self, command: HostCommand) -> bool {
        self.commands
            .as_ref()
            .is_some_and(|tx| tx.try_send(command).is_ok())
    }

    /// Queue a command, waiting for room. Not for the audio thread.
    pub fn send(&self, command: HostCommand) -> Result<()> {
        let tx = self.commands.as_ref().ok_or(BridgeError::NoChannel)?;
        match tx.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(command)) => {
                tx.send(command).map_err(|_| BridgeError::NoChannel)
            }
            Err(TrySendError::Disconnected(_)) => Err(BridgeError::NoChannel),
        }
    }

    /// Ask the child to flush its state to the host and wait for the
    /// acknowledgement.
    pub fn save(&self) -> Result<()> {
        if !self.shared.state().is_live() {
            return Err(BridgeError::NoChannel);
        }
        self.shared.clear_saved();
        self.send(HostCommand::Save)?;

        let timeout = self.config.save_timeout();
        let step = self.config.save_step();
        let mut waited = Duration::ZERO;
        while waited < timeout {
            if self.shared.is_saved() {
                return Ok(());
            }
            thread::sleep(step);
            waited += step;
        }
        if self.shared.is_saved() {
            return Ok(());
        }
        tracing::warn!(id = self.shared.id(), "bridge did not confirm save");
        Err(BridgeError::Timeout {
            operation: "save".into(),
            duration_ms: self.config.save_timeout_ms,
        })
    }

    /// Stop the child: ask politely, then kill after the grace period.
    /// Idempotent.
    pub fn close(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        let state = self.shared.state();
        let graceful = matches!(state, BridgeState::Ready | BridgeState::Running);
        if graceful {
            let _ = self.shared.transition(BridgeState::Closing);
            let _ = self.try_send(HostCommand::Hide);
            let _ = self.try_send(HostCommand::Quit);
        } else if state != BridgeState::Failed {
            self.shared.fail("closed before the handshake finished");
        }

        // Closing the queue ends the bridge thread once it has flushed.
        self.commands = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("bridge thread panicked");
            }
        }
        self.stdin = None;

        let exited = graceful && wait_with_grace(&mut child, self.config.close_grace());
        if !exited {
            if let Err(e) = child.kill() {
                tracing::debug!("kill bridge: {}", e);
            }
            let _ = child.wait();
        }
        let _ = self.shared.transition(BridgeState::Terminated);
        tracing::debug!(id = self.shared.id(), graceful = exited, "bridge closed");
    }
}

fn wait_with_grace(child: &mut Child, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
            _ => return false,
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.close();
    }
}
