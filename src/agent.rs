//! The orchestrator.
//!
//! Owns the accessibility worker thread (which in turn owns the navigator),
//! the speech scheduler, and the input dispatcher; binds the shortcut surface
//! and forwards frontmost-application changes as retarget commands. The
//! worker serializes navigator actions and delivers accessibility events in
//! OS order, so no two focus moves ever make progress concurrently.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::debug;

use crate::config::EngineConfig;
use crate::gateway::Gateway;
use crate::input::{keycode, ChordKey, InputDispatcher, InputError, KeyState, LockState};
use crate::navigator::Navigator;
use crate::speech::Scheduler;

/// One serialized navigator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ReadFocus,
    FocusParent,
    FocusNextSibling { backwards: bool },
    FocusFirstChild,
    Refocus { pid: i32 },
    DumpSystemWide,
    DumpApplication,
    DumpFocus,
    Shutdown,
}

/// Wires the subsystems together and runs the accessibility worker.
pub struct Agent {
    commands: Sender<Command>,
    dispatcher: Arc<Mutex<InputDispatcher>>,
    worker: Option<JoinHandle<()>>,
}

impl Agent {
    /// Build the engine around a gateway: spawn the accessibility worker,
    /// apply the configured timeout, and bind the shortcut surface.
    pub fn new<G: Gateway>(
        gw: Arc<G>,
        scheduler: Scheduler,
        keys: Arc<dyn KeyState>,
        lock: Box<dyn LockState>,
        config: &EngineConfig,
    ) -> anyhow::Result<Self> {
        let _ = gw.set_global_timeout(config.element_timeout_secs);

        let (tx, rx) = bounded::<Command>(64);
        let navigator = Navigator::new(
            gw,
            scheduler.clone(),
            keys,
            config.dump_dir.clone(),
        );
        let worker = thread::Builder::new()
            .name("accessibility".into())
            .spawn(move || worker_loop(navigator, rx))?;

        let mut dispatcher = InputDispatcher::new(scheduler.clone(), lock);
        dispatcher.set_double_tap_window_ms(config.double_tap_window_ms);
        dispatcher.set_browse_mode(config.browse_mode_at_startup);
        bind_shortcuts(&mut dispatcher, &tx, &scheduler)
            .map_err(|e| anyhow::anyhow!("shortcut table: {e}"))?;

        Ok(Self {
            commands: tx,
            dispatcher: Arc::new(Mutex::new(dispatcher)),
            worker: Some(worker),
        })
    }

    /// Command channel into the accessibility worker.
    pub fn commands(&self) -> Sender<Command> {
        self.commands.clone()
    }

    /// The input dispatcher, for the platform ingestion threads.
    pub fn dispatcher(&self) -> Arc<Mutex<InputDispatcher>> {
        self.dispatcher.clone()
    }

    /// React to the frontmost application changing.
    pub fn frontmost_changed(&self, pid: i32) {
        let _ = self.commands.send(Command::Refocus { pid });
    }

    /// Stop the worker and wait for it.
    pub fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop<G: Gateway>(mut navigator: Navigator<G>, commands: Receiver<Command>) {
    loop {
        // The observer stream is replaced on every retarget, so it is
        // re-resolved each turn of the loop.
        let proceed = match navigator.event_stream() {
            Some(events) => crossbeam_channel::select! {
                recv(commands) -> cmd => match cmd {
                    Ok(cmd) => handle_command(&mut navigator, cmd),
                    Err(_) => false,
                },
                recv(events) -> event => {
                    if let Ok(event) = event {
                        navigator.handle_event(event);
                    }
                    true
                }
            },
            None => match commands.recv() {
                Ok(cmd) => handle_command(&mut navigator, cmd),
                Err(_) => false,
            },
        };
        if !proceed {
            break;
        }
    }
    debug!("accessibility worker stopped");
}

fn handle_command<G: Gateway>(navigator: &mut Navigator<G>, command: Command) -> bool {
    debug!(?command, "navigator command");
    match command {
        Command::ReadFocus => navigator.read_focus(),
        Command::FocusParent => navigator.focus_parent(),
        Command::FocusNextSibling { backwards } => navigator.focus_next_sibling(backwards),
        Command::FocusFirstChild => navigator.focus_first_child(),
        Command::Refocus { pid } => navigator.refocus(pid),
        Command::DumpSystemWide => navigator.dump_system_wide(),
        Command::DumpApplication => navigator.dump_application(),
        Command::DumpFocus => navigator.dump_focus(),
        Command::Shutdown => return false,
    }
    true
}

fn send(tx: &Sender<Command>, command: Command) -> Box<dyn Fn() + Send + Sync> {
    let tx = tx.clone();
    Box::new(move || {
        let _ = tx.send(command);
    })
}

/// The keyboard shortcut surface: every chord requires the lock key held (or
/// browse mode for the navigation set).
fn bind_shortcuts(
    dispatcher: &mut InputDispatcher,
    tx: &Sender<Command>,
    scheduler: &Scheduler,
) -> Result<(), InputError> {
    dispatcher.bind(ChordKey::bare(keycode::TAB), send(tx, Command::ReadFocus))?;
    dispatcher.bind(
        ChordKey::bare(keycode::LEFT),
        send(tx, Command::FocusNextSibling { backwards: true }),
    )?;
    dispatcher.bind(
        ChordKey::bare(keycode::RIGHT),
        send(tx, Command::FocusNextSibling { backwards: false }),
    )?;
    dispatcher.bind(
        ChordKey::bare(keycode::DOWN),
        send(tx, Command::FocusFirstChild),
    )?;
    dispatcher.bind(ChordKey::bare(keycode::UP), send(tx, Command::FocusParent))?;
    dispatcher.bind(
        ChordKey::bare(keycode::SLASH),
        send(tx, Command::DumpSystemWide),
    )?;
    dispatcher.bind(
        ChordKey::bare(keycode::PERIOD),
        send(tx, Command::DumpApplication),
    )?;
    dispatcher.bind(ChordKey::bare(keycode::COMMA), send(tx, Command::DumpFocus))?;

    // Browse mode mirrors the navigation chords without the lock key held.
    dispatcher.bind(ChordKey::browse(keycode::TAB), send(tx, Command::ReadFocus))?;
    dispatcher.bind(
        ChordKey::browse(keycode::LEFT),
        send(tx, Command::FocusNextSibling { backwards: true }),
    )?;
    dispatcher.bind(
        ChordKey::browse(keycode::RIGHT),
        send(tx, Command::FocusNextSibling { backwards: false }),
    )?;
    dispatcher.bind(
        ChordKey::browse(keycode::DOWN),
        send(tx, Command::FocusFirstChild),
    )?;
    dispatcher.bind(ChordKey::browse(keycode::UP), send(tx, Command::FocusParent))?;

    // Lock+B toggles browse mode.
    let browse = dispatcher.browse_flag();
    let browse_scheduler = scheduler.clone();
    dispatcher.bind(
        ChordKey::bare(keycode::B),
        Box::new(move || {
            let on = !browse.load(Ordering::Relaxed);
            browse.store(on, Ordering::Relaxed);
            browse_scheduler.announce(if on { "Browse mode on" } else { "Browse mode off" });
        }),
    )?;
    Ok(())
}
