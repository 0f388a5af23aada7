//! [`PlaybackEngine`]: a [`Player`] driven by a read thread.
//!
//! The read thread delivers frames paced by their recorded timestamps,
//! scaled by the playback speed. Seeks and frame queries are commands
//! answered by the read thread between frames, so a command sent while
//! the thread waits for a frame's due time is handled immediately.
//!
//! # Shutdown
//!
//! [`PlaybackEngine::shutdown`] raises the stop flag, wakes the thread
//! with a stop command and waits up to the configured timeout. A thread
//! still busy after that (for example inside a notification callback)
//! is detached rather than joined.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use nirec_core::{CodecFactory, InputStream, NodeId, NodeNotifications};
use nirec_format::ContainerHeader;
use tracing::{debug, error, warn};

use crate::config::{validate_speed, PlaybackConfig};
use crate::error::PlayerError;
use crate::player::{PendingFrame, Player};

type EofCallback = Box<dyn FnMut() + Send>;

// ── Shared ─────────────────────────────────────────────────────────

struct Shared {
    stop: AtomicBool,
    speed_bits: AtomicU64,
    repeat: AtomicBool,
    on_eof: Mutex<Option<EofCallback>>,
}

impl Shared {
    fn speed(&self) -> f64 {
        f64::from_bits(self.speed_bits.load(Ordering::Acquire))
    }
}

enum Command {
    SeekFrame {
        node: NodeId,
        frame: u32,
        reply: Sender<Result<(), PlayerError>>,
    },
    SeekTimestamp {
        timestamp: u64,
        reply: Sender<Result<(), PlayerError>>,
    },
    TellFrame {
        node: NodeId,
        reply: Sender<Result<u32, PlayerError>>,
    },
    Stop,
}

// ── ShutdownReport ─────────────────────────────────────────────────

/// Outcome of [`PlaybackEngine::shutdown`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Total time spent in the shutdown sequence.
    pub total_ms: u64,
    /// Whether the read thread was joined. `false` means it was
    /// detached after the timeout.
    pub joined: bool,
}

// ── PlaybackEngine ─────────────────────────────────────────────────

/// Threaded playback of one container.
pub struct PlaybackEngine {
    header: ContainerHeader,
    shared: Arc<Shared>,
    commands: Option<Sender<Command>>,
    done: Receiver<()>,
    thread: Option<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl PlaybackEngine {
    /// Open the container and start the read thread.
    ///
    /// The header and every announcement before the first frame are
    /// processed on the calling thread, so open errors are returned
    /// here and nodes are known once this returns.
    pub fn open(
        input: Box<dyn InputStream>,
        notifications: Arc<dyn NodeNotifications>,
        codec_factory: Arc<dyn CodecFactory>,
        config: PlaybackConfig,
    ) -> Result<Self, PlayerError> {
        config.validate()?;
        let mut player = Player::open(input, notifications, codec_factory)?;
        player.set_repeat(config.repeat);
        let header = *player.header();

        let shared = Arc::new(Shared {
            stop: AtomicBool::new(false),
            speed_bits: AtomicU64::new(config.speed.to_bits()),
            repeat: AtomicBool::new(config.repeat),
            on_eof: Mutex::new(None),
        });
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);

        let read_loop = ReadLoop {
            player,
            shared: Arc::clone(&shared),
            commands: command_rx,
            pending: None,
            finished: false,
            reference: None,
            reference_speed: config.speed,
        };
        let thread = thread::Builder::new()
            .name("nirec-playback".into())
            .spawn(move || {
                // Dropped on exit, which disconnects `done`.
                let _done = done_tx;
                read_loop.run();
            })?;

        Ok(Self {
            header,
            shared,
            commands: Some(command_tx),
            done: done_rx,
            thread: Some(thread),
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    /// The container header.
    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Seek so the next frame delivered is frame `frame` of `node`.
    ///
    /// Resumes playback if it had reached the end of the file.
    pub fn seek_to_frame(&self, node: NodeId, frame: u32) -> Result<(), PlayerError> {
        self.request(|reply| Command::SeekFrame { node, frame, reply })
    }

    /// Seek to the latest frame recorded at or before `timestamp`.
    pub fn seek_to_timestamp(&self, timestamp: u64) -> Result<(), PlayerError> {
        self.request(|reply| Command::SeekTimestamp { timestamp, reply })
    }

    /// Frame id of the last frame read from `node`.
    pub fn tell_frame(&self, node: NodeId) -> Result<u32, PlayerError> {
        self.request(|reply| Command::TellFrame { node, reply })
    }

    /// Change the playback speed. `0.0` disables pacing.
    pub fn set_speed(&self, speed: f64) -> Result<(), PlayerError> {
        validate_speed(speed)?;
        self.shared
            .speed_bits
            .store(speed.to_bits(), Ordering::Release);
        Ok(())
    }

    /// Current playback speed.
    pub fn speed(&self) -> f64 {
        self.shared.speed()
    }

    /// Turn repeat mode on or off.
    pub fn set_repeat(&self, repeat: bool) {
        self.shared.repeat.store(repeat, Ordering::Release);
    }

    /// Whether repeat mode is on.
    pub fn repeat(&self) -> bool {
        self.shared.repeat.load(Ordering::Acquire)
    }

    /// Register the end-of-file callback, replacing any previous one.
    ///
    /// Runs on the read thread each time the end of the container is
    /// reached, before a repeat rewind. It must not call back into the
    /// engine.
    pub fn on_end_of_file(&self, callback: impl FnMut() + Send + 'static) {
        let mut slot = self
            .shared
            .on_eof
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Box::new(callback));
    }

    fn request<T>(
        &self,
        command: impl FnOnce(Sender<Result<T, PlayerError>>) -> Command,
    ) -> Result<T, PlayerError> {
        let commands = self.commands.as_ref().ok_or(PlayerError::ShutDown)?;
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        commands
            .send(command(reply_tx))
            .map_err(|_| PlayerError::ShutDown)?;
        reply_rx.recv().map_err(|_| PlayerError::ShutDown)?
    }

    /// Stop the read thread. Idempotent.
    pub fn shutdown(&mut self) -> ShutdownReport {
        let Some(handle) = self.thread.take() else {
            return ShutdownReport {
                total_ms: 0,
                joined: true,
            };
        };
        let start = Instant::now();
        self.shared.stop.store(true, Ordering::Release);
        if let Some(commands) = self.commands.take() {
            // Fails only if the thread is already gone.
            let _ = commands.send(Command::Stop);
        }

        let stopped = match self.done.recv_timeout(self.shutdown_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        };
        let joined = if stopped {
            handle.join().is_ok()
        } else {
            warn!(
                timeout_ms = self.shutdown_timeout.as_millis() as u64,
                "playback thread did not stop in time, detaching"
            );
            false
        };

        let total_ms = start.elapsed().as_millis() as u64;
        debug!(total_ms, joined, "playback shut down");
        ShutdownReport { total_ms, joined }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown();
        }
    }
}

// ── ReadLoop ───────────────────────────────────────────────────────

struct ReadLoop {
    player: Player,
    shared: Arc<Shared>,
    commands: Receiver<Command>,
    /// Frame read but not yet delivered because a command arrived.
    pending: Option<PendingFrame>,
    /// End of file (without repeat) or a read error: wait for a seek.
    finished: bool,
    /// Wall-clock instant and recorded timestamp pacing is measured from.
    reference: Option<(Instant, u64)>,
    reference_speed: f64,
}

enum Flow {
    Continue,
    Stop,
}

impl ReadLoop {
    fn run(mut self) {
        debug!("playback thread started");
        while !self.shared.stop.load(Ordering::Acquire) {
            self.player
                .set_repeat(self.shared.repeat.load(Ordering::Acquire));

            if self.finished {
                let flow = match self.commands.recv() {
                    Ok(command) => self.handle(command),
                    Err(_) => Flow::Stop,
                };
                if let Flow::Stop = flow {
                    break;
                }
                continue;
            }

            let frame = match self.pending.take() {
                Some(frame) => frame,
                None => match self.player.next_frame() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        self.end_of_file();
                        continue;
                    }
                    Err(e) => {
                        error!(error = %e, "playback stopped");
                        self.finished = true;
                        continue;
                    }
                },
            };

            let command = match self.wait_for(&frame) {
                Some(wait) => match self.commands.recv_timeout(wait) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match self.commands.try_recv() {
                    Ok(command) => Some(command),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => break,
                },
            };
            if let Some(command) = command {
                self.pending = Some(frame);
                if let Flow::Stop = self.handle(command) {
                    break;
                }
                continue;
            }

            if let Err(e) = self.player.deliver(&frame) {
                error!(error = %e, node = %frame.node, frame = frame.frame_id, "playback stopped");
                self.finished = true;
            }
        }
        if let Err(e) = self.player.close() {
            warn!(error = %e, "closing input failed");
        }
        debug!("playback thread stopped");
    }

    fn handle(&mut self, command: Command) -> Flow {
        match command {
            Command::SeekFrame { node, frame, reply } => {
                let result = self.player.seek_to_frame(node, frame);
                self.after_seek(&result);
                let _ = reply.send(result);
            }
            Command::SeekTimestamp { timestamp, reply } => {
                let result = self.player.seek_to_timestamp(timestamp);
                self.after_seek(&result);
                let _ = reply.send(result);
            }
            Command::TellFrame { node, reply } => {
                let _ = reply.send(self.player.tell_frame(node));
            }
            Command::Stop => return Flow::Stop,
        }
        Flow::Continue
    }

    fn after_seek(&mut self, result: &Result<(), PlayerError>) {
        if result.is_ok() {
            self.pending = None;
            self.reference = None;
            self.finished = false;
        }
    }

    fn end_of_file(&mut self) {
        {
            let mut callback = self
                .shared
                .on_eof
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(callback) = callback.as_mut() {
                callback();
            }
        }
        if self.player.repeat() {
            match self.player.rewind() {
                Ok(()) => {
                    self.reference = None;
                    return;
                }
                Err(e) => warn!(error = %e, "rewind failed, playback stops"),
            }
        }
        self.finished = true;
    }

    /// How long to wait before delivering `frame`, or `None` if it is
    /// due now.
    fn wait_for(&mut self, frame: &PendingFrame) -> Option<Duration> {
        let speed = self.shared.speed();
        if speed != self.reference_speed {
            self.reference = None;
            self.reference_speed = speed;
        }
        if speed == 0.0 {
            return None;
        }
        let Some((start, base)) = self.reference else {
            self.reference = Some((Instant::now(), frame.timestamp));
            return None;
        };
        // Timestamps are microseconds.
        let recorded = frame.timestamp.saturating_sub(base) as f64 / 1_000_000.0;
        let offset = Duration::try_from_secs_f64(recorded / speed).ok()?;
        let due = start.checked_add(offset)?;
        due.checked_duration_since(Instant::now())
            .filter(|wait| !wait.is_zero())
    }
}
