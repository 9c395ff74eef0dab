//! Host frame loop for the `bobfit` binary.
//!
//! A calloop timer ticks the session once per frame interval, a stdin
//! source accepts s-expression commands, and SIGINT/SIGTERM set a global
//! flag checked on every loop iteration.  Events are written to stdout.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bobfit_engine::events::format_event;
use bobfit_engine::ipc;
use bobfit_engine::TrackingSession;
use calloop::generic::Generic;
use calloop::timer::{TimeoutAction, Timer};
use calloop::{EventLoop, Interest, Mode, PostAction};
use tracing::{debug, info, warn};

/// Global flag set by SIGTERM/SIGINT handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Longest partial command line kept while waiting for its newline.
const MAX_COMMAND_LINE: usize = 65_536;

#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Frames per second.
    pub fps: u32,
    /// Stop after this long.
    pub exit_after: Option<Duration>,
    /// Accept commands on stdin.
    pub commands: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            exit_after: None,
            commands: true,
        }
    }
}

struct DriverState {
    session: TrackingSession,
    clock: Instant,
}

impl DriverState {
    fn now_ms(&self) -> f64 {
        self.clock.elapsed().as_secs_f64() * 1000.0
    }

    fn flush_events(&mut self) {
        let events = self.session.drain_events();
        if events.is_empty() {
            return;
        }
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for event in events {
            // a closed stdout only loses output
            let _ = writeln!(out, "{}", event.to_sexp());
        }
        let _ = out.flush();
    }

    fn handle_command(&mut self, line: &str) {
        let now = self.now_ms();
        let response = ipc::handle_message(&mut self.session, line, now);
        println!("{}", response);
    }
}

// ── Command input ──────────────────────────────────────────

/// Newline-framed commands accumulated across non-blocking reads.
#[derive(Debug, Default)]
struct CommandBuffer {
    read_buf: Vec<u8>,
}

impl CommandBuffer {
    fn push(&mut self, bytes: &[u8]) {
        self.read_buf.extend_from_slice(bytes);
    }

    /// Every complete non-blank line, in arrival order.  A trailing partial
    /// line stays buffered.
    fn extract_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.read_buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.read_buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        if self.read_buf.len() > MAX_COMMAND_LINE {
            warn!(len = self.read_buf.len(), "command line exceeds maximum size, discarding");
            self.read_buf.clear();
        }
        lines
    }

    /// The unterminated tail left when input ends.
    fn take_rest(&mut self) -> Option<String> {
        let line = String::from_utf8_lossy(&self.read_buf).trim().to_string();
        self.read_buf.clear();
        (!line.is_empty()).then_some(line)
    }
}

/// Read everything currently available without blocking.  Returns true at
/// end of input.
fn drain_readable(mut input: &File, commands: &mut CommandBuffer) -> io::Result<bool> {
    let mut chunk = [0u8; 4096];
    loop {
        match input.read(&mut chunk) {
            Ok(0) => return Ok(true),
            Ok(n) => commands.push(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Puts a file description in non-blocking mode and restores its flags on
/// drop.  Stdin's description is shared with the parent process.
struct NonBlocking {
    fd: OwnedFd,
    saved_flags: libc::c_int,
}

impl NonBlocking {
    fn set(file: &impl AsFd) -> io::Result<Self> {
        let fd = file.as_fd().try_clone_to_owned()?;
        let raw = fd.as_raw_fd();
        let saved_flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
        if saved_flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if unsafe { libc::fcntl(raw, libc::F_SETFL, saved_flags | libc::O_NONBLOCK) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd, saved_flags })
    }
}

impl Drop for NonBlocking {
    fn drop(&mut self) {
        unsafe {
            libc::fcntl(self.fd.as_raw_fd(), libc::F_SETFL, self.saved_flags);
        }
    }
}

/// Install signal handlers for graceful shutdown (SIGTERM, SIGINT).
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Drive `session` until it stops, a signal arrives, or the exit timer fires.
pub fn run(session: TrackingSession, config: DriverConfig) -> anyhow::Result<()> {
    let mut event_loop = EventLoop::<DriverState>::try_new()?;
    let handle = event_loop.handle();
    let frame_interval = Duration::from_secs_f64(1.0 / f64::from(config.fps.max(1)));

    handle
        .insert_source(Timer::from_duration(frame_interval), move |_deadline, _, state| {
            let now = state.now_ms();
            state.session.tick(now);
            state.flush_events();
            if state.session.is_stopped() {
                TimeoutAction::Drop
            } else {
                TimeoutAction::ToDuration(frame_interval)
            }
        })
        .map_err(|e| anyhow::anyhow!("failed to register frame timer: {}", e.error))?;

    let mut _stdin_mode = None;
    if config.commands {
        let input = File::from(io::stdin().as_fd().try_clone_to_owned()?);
        _stdin_mode = Some(NonBlocking::set(&input)?);
        let mut commands = CommandBuffer::default();
        let source = Generic::new(input, Interest::READ, Mode::Level);
        let inserted = handle.insert_source(source, move |_readiness, input, state| {
            let eof = drain_readable(&**input, &mut commands)?;
            let mut lines = commands.extract_lines();
            if eof {
                lines.extend(commands.take_rest());
            }
            for line in &lines {
                state.handle_command(line);
            }
            state.flush_events();
            if eof {
                debug!("stdin closed, command input disabled");
                return Ok(PostAction::Remove);
            }
            Ok(PostAction::Continue)
        });
        // regular files and /dev/null cannot be polled
        if let Err(e) = inserted {
            warn!("stdin cannot be polled, commands disabled: {}", e.error);
            _stdin_mode = None;
        }
    }

    install_signal_handlers();

    let mut state = DriverState {
        session,
        clock: Instant::now(),
    };
    info!(
        "Frame loop running at {} fps ({:.1}ms interval)",
        config.fps,
        frame_interval.as_secs_f64() * 1000.0
    );

    while !state.session.is_stopped() {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            info!("Shutdown signal received, stopping");
            state.session.stop();
            break;
        }

        if let Some(dur) = config.exit_after {
            if state.clock.elapsed() >= dur {
                info!("Exit timer fired after {}s", dur.as_secs());
                state.session.stop();
                break;
            }
        }

        event_loop.dispatch(Some(frame_interval), &mut state)?;
    }

    let now = state.now_ms();
    let snapshot = state.session.metrics(now);
    state.flush_events();
    println!(
        "{}",
        format_event("session-ended", &[("metrics", snapshot.to_sexp().as_str())])
    );
    info!(
        "Session ended: {} bobs, {} collected, score {}",
        snapshot.bob_count, snapshot.collected, snapshot.score
    );
    Ok(())
}
