//! `bstk run`: start a container and wait for its entry process.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use bootstack_runtime::{Engine, OutputMode};
use clap::Args;

use super::Session;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Image reference or id prefix.
    pub image: String,

    /// Connect the entry process to this terminal instead of its log.
    #[arg(short, long)]
    pub attach: bool,
}

/// Executes the `run` command.
///
/// SIGINT and SIGTERM are forwarded to the entry process as SIGTERM. The
/// handler is installed before the process is spawned; a signal that
/// arrives earlier is delivered as soon as the process exists. Returns the
/// container's exit code.
///
/// # Errors
///
/// Returns an error if the container cannot be created, started, or
/// waited for.
pub fn execute(session: &Session, args: &RunArgs) -> anyhow::Result<i32> {
    let engine = Engine::new(&session.config, session.isolation()?)?;
    let output = if args.attach {
        OutputMode::Attached
    } else {
        OutputMode::Logged
    };

    let relay = Arc::new(SignalRelay::default());
    install_handler(Arc::clone(&relay))?;

    let container = engine.create(&args.image)?;
    let id = container.id.clone();
    let running = engine.start(container, output)?;
    if let Some(pid) = running.pid().and_then(|pid| relay.publish(pid)) {
        forward_termination(pid);
    }
    if !args.attach {
        eprintln!("{}", id.short());
    }

    let container = running.wait()?;
    let code = container.state.exit_code().unwrap_or(1);
    tracing::info!(id = %id.short(), code, "run finished");
    if code != 0 && !args.attach {
        let short = id.short();
        eprintln!("container {short} exited with code {code}; see `bstk logs {short}`");
    }
    Ok(code)
}

/// Hands termination requests to the entry process once its pid is known.
///
/// Whichever of [`SignalRelay::request`] and [`SignalRelay::publish`] runs
/// second returns the pid, so a request is delivered exactly once.
#[derive(Debug, Default)]
struct SignalRelay {
    pid: AtomicU32,
    pending: AtomicBool,
}

impl SignalRelay {
    /// Records a termination request from the signal handler.
    fn request(&self) -> Option<u32> {
        self.pending.store(true, Ordering::SeqCst);
        match self.pid.load(Ordering::SeqCst) {
            0 => None,
            pid => self.pending.swap(false, Ordering::SeqCst).then_some(pid),
        }
    }

    /// Publishes the entry pid, returning it if a request is waiting.
    fn publish(&self, pid: u32) -> Option<u32> {
        self.pid.store(pid, Ordering::SeqCst);
        self.pending.swap(false, Ordering::SeqCst).then_some(pid)
    }
}

fn install_handler(relay: Arc<SignalRelay>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        match relay.request() {
            Some(pid) => forward_termination(pid),
            None => tracing::info!("termination requested before the entry process started"),
        }
    })
    .map_err(|e| anyhow::anyhow!("failed to install signal handler: {e}"))
}

#[cfg(unix)]
fn forward_termination(pid: u32) {
    use bootstack_runtime::engine::forward_signal;
    use nix::sys::signal::Signal;

    if let Err(e) = forward_signal(pid, Signal::SIGTERM) {
        tracing::warn!(pid, error = %e, "signal forwarding failed");
    }
}

#[cfg(not(unix))]
fn forward_termination(pid: u32) {
    tracing::warn!(pid, "signal forwarding is not supported on this platform");
}
