//! The priority speech scheduler.
//!
//! A serialized queue with two lanes: announcements (high priority) and
//! readouts (low priority). Announcements preempt readouts; a later readout
//! batch replaces an earlier one; a batch submitted while announcements are
//! active is deferred and replayed, in order, once the last announcement
//! finishes. Draining is completion-driven: the TTS device reports each
//! finished utterance back through [`Scheduler::utterance_finished`].

#[cfg(target_os = "macos")]
pub mod macos;

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::tokens::{render_all, OutputToken};

/// The synthesized-speech device contract: speak one utterance, stop
/// immediately, and report completion of each utterance out of band.
pub trait TtsDevice: Send + 'static {
    fn speak(&mut self, utterance: &str);
    fn stop_immediately(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lane {
    Idle,
    Announcement,
    Readout,
}

struct Queues {
    lane: Lane,
    /// Queued announcements, not counting the one being spoken.
    announcements: VecDeque<String>,
    /// Remainder of the active readout batch.
    readout: VecDeque<String>,
    /// Readout batch stashed while announcements play.
    deferred: Option<VecDeque<String>>,
}

enum DeviceCall {
    None,
    Speak(String),
    StopThenSpeak(String),
    Stop,
}

/// Handle onto the scheduler; clones share one queue.
#[derive(Clone)]
pub struct Scheduler {
    queues: Arc<Mutex<Queues>>,
    device: Arc<Mutex<Box<dyn TtsDevice>>>,
}

impl Scheduler {
    pub fn new(device: Box<dyn TtsDevice>) -> Self {
        Self {
            queues: Arc::new(Mutex::new(Queues {
                lane: Lane::Idle,
                announcements: VecDeque::new(),
                readout: VecDeque::new(),
                deferred: None,
            })),
            device: Arc::new(Mutex::new(device)),
        }
    }

    /// Queue a high-priority utterance. Preempts any active readout; multiple
    /// announcements play in order.
    pub fn announce(&self, text: impl Into<String>) {
        let text = text.into();
        debug!(%text, "announce");
        let call = {
            let mut q = self.queues.lock();
            q.announcements.push_back(text);
            if q.lane == Lane::Announcement {
                DeviceCall::None
            } else {
                if q.lane == Lane::Readout {
                    // The interrupted remainder resumes after the announcements.
                    let rest = std::mem::take(&mut q.readout);
                    if !rest.is_empty() && q.deferred.is_none() {
                        q.deferred = Some(rest);
                    }
                }
                q.lane = Lane::Announcement;
                let first = q.announcements.pop_front().expect("just pushed");
                DeviceCall::StopThenSpeak(first)
            }
        };
        self.apply(call);
    }

    /// Render a single token and announce it.
    pub fn announce_token(&self, token: &OutputToken) {
        if let Some(text) = token.render() {
            self.announce(text);
        }
    }

    /// Submit a semantic token batch as a readout. Replaces any readout in
    /// flight; deferred (not dropped) while announcements are active.
    pub fn convey(&self, tokens: &[OutputToken]) {
        self.submit(render_all(tokens));
    }

    /// A scoped readout batch builder.
    pub fn batch(&self) -> SpeechBatch {
        SpeechBatch {
            scheduler: self.clone(),
            items: Vec::new(),
        }
    }

    /// Clear both lanes and silence the device.
    pub fn interrupt(&self) {
        debug!("interrupt");
        {
            let mut q = self.queues.lock();
            q.lane = Lane::Idle;
            q.announcements.clear();
            q.readout.clear();
            q.deferred = None;
        }
        self.apply(DeviceCall::Stop);
    }

    /// Completion callback from the TTS device: one utterance finished.
    /// Drains announcements first, then deferred or remaining readouts.
    pub fn utterance_finished(&self) {
        let call = {
            let mut q = self.queues.lock();
            match q.lane {
                Lane::Idle => DeviceCall::None,
                Lane::Announcement => {
                    if let Some(next) = q.announcements.pop_front() {
                        DeviceCall::Speak(next)
                    } else if let Some(deferred) = q.deferred.take() {
                        q.readout = deferred;
                        self.advance_readout(&mut q)
                    } else if !q.readout.is_empty() {
                        self.advance_readout(&mut q)
                    } else {
                        q.lane = Lane::Idle;
                        DeviceCall::None
                    }
                }
                Lane::Readout => self.advance_readout(&mut q),
            }
        };
        self.apply(call);
    }

    pub fn is_idle(&self) -> bool {
        self.queues.lock().lane == Lane::Idle
    }

    fn advance_readout(&self, q: &mut Queues) -> DeviceCall {
        match q.readout.pop_front() {
            Some(next) => {
                q.lane = Lane::Readout;
                DeviceCall::Speak(next)
            }
            None => {
                q.lane = Lane::Idle;
                DeviceCall::None
            }
        }
    }

    fn submit(&self, utterances: Vec<String>) {
        if utterances.is_empty() {
            return;
        }
        debug!(count = utterances.len(), "readout batch");
        let call = {
            let mut q = self.queues.lock();
            if q.lane == Lane::Announcement {
                // Deferred, not dropped; a later batch replaces an earlier one.
                q.deferred = Some(utterances.into());
                DeviceCall::None
            } else {
                let mut items: VecDeque<String> = utterances.into();
                let first = items.pop_front().expect("non-empty");
                q.readout = items;
                q.lane = Lane::Readout;
                DeviceCall::StopThenSpeak(first)
            }
        };
        self.apply(call);
    }

    // Device calls happen outside the queue lock so a synchronous completion
    // callback cannot deadlock.
    fn apply(&self, call: DeviceCall) {
        let mut device = self.device.lock();
        match call {
            DeviceCall::None => {}
            DeviceCall::Speak(s) => device.speak(&s),
            DeviceCall::StopThenSpeak(s) => {
                device.stop_immediately();
                device.speak(&s);
            }
            DeviceCall::Stop => device.stop_immediately(),
        }
    }
}

/// A readout batch under construction. Obtained from [`Scheduler::batch`];
/// committing consumes the batch, so a flushed handle cannot be reused.
pub struct SpeechBatch {
    scheduler: Scheduler,
    items: Vec<String>,
}

impl SpeechBatch {
    pub fn push(&mut self, utterance: impl Into<String>) {
        self.items.push(utterance.into());
    }

    pub fn push_token(&mut self, token: &OutputToken) {
        if let Some(text) = token.render() {
            self.items.push(text);
        }
    }

    /// Stop the synthesizer and speak each queued utterance in order.
    pub fn flush(self) {
        self.scheduler.submit(self.items);
    }
}

/// Device that records calls instead of speaking; the testing and demo sink.
#[derive(Clone, Default)]
pub struct RecordingDevice {
    log: Arc<Mutex<Vec<DeviceEvent>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Speak(String),
    Stop,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything the device was asked to do, in order.
    pub fn events(&self) -> Vec<DeviceEvent> {
        self.log.lock().clone()
    }

    /// Only the spoken utterances, in order.
    pub fn spoken(&self) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter_map(|e| match e {
                DeviceEvent::Speak(s) => Some(s.clone()),
                DeviceEvent::Stop => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }
}

impl TtsDevice for RecordingDevice {
    fn speak(&mut self, utterance: &str) {
        self.log.lock().push(DeviceEvent::Speak(utterance.into()));
    }

    fn stop_immediately(&mut self) {
        self.log.lock().push(DeviceEvent::Stop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::OutputToken;

    fn scheduler() -> (Scheduler, RecordingDevice) {
        let device = RecordingDevice::new();
        (Scheduler::new(Box::new(device.clone())), device)
    }

    /// Drive the completion callback until the scheduler goes idle.
    fn drain(s: &Scheduler) {
        while !s.is_idle() {
            s.utterance_finished();
        }
    }

    #[test]
    fn readout_tokens_speak_in_order() {
        let (s, d) = scheduler();
        s.convey(&[
            OutputToken::Label("OK".into()),
            OutputToken::Role("button".into()),
        ]);
        drain(&s);
        assert_eq!(d.spoken(), vec!["OK", "button"]);
    }

    #[test]
    fn later_batch_replaces_earlier() {
        let (s, d) = scheduler();
        s.convey(&[
            OutputToken::Label("first".into()),
            OutputToken::Label("never spoken".into()),
        ]);
        // Preempted before completion.
        s.convey(&[OutputToken::Label("second".into())]);
        drain(&s);
        let spoken = d.spoken();
        assert_eq!(spoken, vec!["first", "second"]);
    }

    #[test]
    fn announcements_preempt_and_defer_readouts() {
        let (s, d) = scheduler();
        s.convey(&[
            OutputToken::Label("a".into()),
            OutputToken::Label("b".into()),
        ]);
        // "a" is in flight; announcement preempts, "b" resumes afterwards.
        s.announce("urgent");
        s.utterance_finished(); // "urgent" done
        drain(&s);
        assert_eq!(d.spoken(), vec!["a", "urgent", "b"]);
    }

    #[test]
    fn batch_during_announcement_is_deferred_not_dropped() {
        let (s, d) = scheduler();
        s.announce("one");
        s.announce("two");
        s.convey(&[
            OutputToken::Label("x".into()),
            OutputToken::Label("y".into()),
        ]);
        // Nothing from the batch yet.
        assert_eq!(d.spoken(), vec!["one"]);
        drain(&s);
        assert_eq!(d.spoken(), vec!["one", "two", "x", "y"]);
    }

    #[test]
    fn interrupt_clears_both_lanes() {
        let (s, d) = scheduler();
        s.announce("hello world");
        s.convey(&[OutputToken::Label("pending".into())]);
        s.interrupt();
        assert!(s.is_idle());
        assert_eq!(*d.events().last().unwrap(), DeviceEvent::Stop);
        // Nothing more plays.
        s.utterance_finished();
        assert_eq!(d.spoken(), vec!["hello world"]);
    }

    #[test]
    fn batch_builder_flushes_once() {
        let (s, d) = scheduler();
        let mut batch = s.batch();
        batch.push("alpha");
        batch.push_token(&OutputToken::Boundary); // silent, not queued
        batch.push("beta");
        batch.flush();
        drain(&s);
        assert_eq!(d.spoken(), vec!["alpha", "beta"]);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let (s, d) = scheduler();
        s.convey(&[OutputToken::Boundary]);
        assert!(s.is_idle());
        assert!(d.events().is_empty());
    }

    #[test]
    fn announcement_while_idle_stops_then_speaks() {
        let (s, d) = scheduler();
        s.announce("now");
        assert_eq!(
            d.events(),
            vec![DeviceEvent::Stop, DeviceEvent::Speak("now".into())]
        );
    }
}
