//! macOS speech device.
//!
//! Speaks through the system `say` tool, one child process per utterance; a
//! watcher thread reports completion back into the scheduler, and stopping
//! kills the child immediately.

use std::process::{Child, Command};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use super::{Scheduler, TtsDevice};

/// Late-bound completion hook: the scheduler is created around the device,
/// so the device learns where to report only afterwards.
#[derive(Clone, Default)]
pub struct CompletionHook {
    scheduler: Arc<Mutex<Option<Scheduler>>>,
}

impl CompletionHook {
    pub fn attach(&self, scheduler: Scheduler) {
        *self.scheduler.lock() = Some(scheduler);
    }

    fn fire(&self) {
        if let Some(scheduler) = self.scheduler.lock().clone() {
            scheduler.utterance_finished();
        }
    }
}

struct Active {
    child: Child,
    /// Utterance generation; a stale watcher must not report completion.
    generation: u64,
}

pub struct SayDevice {
    active: Arc<Mutex<Option<Active>>>,
    completion: CompletionHook,
    generation: u64,
}

impl SayDevice {
    pub fn new() -> (Self, CompletionHook) {
        let completion = CompletionHook::default();
        (
            Self {
                active: Arc::new(Mutex::new(None)),
                completion: completion.clone(),
                generation: 0,
            },
            completion,
        )
    }
}

impl TtsDevice for SayDevice {
    fn speak(&mut self, utterance: &str) {
        self.generation += 1;
        let generation = self.generation;

        let child = match Command::new("/usr/bin/say").arg("--").arg(utterance).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "spawning speech process failed");
                self.completion.fire();
                return;
            }
        };
        *self.active.lock() = Some(Active { child, generation });

        let active = self.active.clone();
        let completion = self.completion.clone();
        std::thread::Builder::new()
            .name("say-watch".into())
            .spawn(move || {
                loop {
                    std::thread::sleep(std::time::Duration::from_millis(20));
                    let mut guard = active.lock();
                    match guard.as_mut() {
                        Some(current) if current.generation == generation => {
                            match current.child.try_wait() {
                                Ok(Some(_status)) => {
                                    *guard = None;
                                    drop(guard);
                                    completion.fire();
                                    return;
                                }
                                Ok(None) => {}
                                Err(e) => {
                                    warn!(error = %e, "waiting on speech process failed");
                                    *guard = None;
                                    drop(guard);
                                    completion.fire();
                                    return;
                                }
                            }
                        }
                        // Superseded or stopped; nothing to report.
                        _ => return,
                    }
                }
            })
            .ok();
    }

    fn stop_immediately(&mut self) {
        if let Some(mut active) = self.active.lock().take() {
            let _ = active.child.kill();
            let _ = active.child.wait();
        }
    }
}
