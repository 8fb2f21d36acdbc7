//! Command queue bookkeeping. Writing to the transport is the session's job;
//! this only tracks which command is in flight and who is waiting for it.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use uuid::Uuid;

use super::SessionError;
use super::expectation::{Evaluation, Expectation};
use crate::protocol::Message;

pub type CommandResult = Result<Message, SessionError>;

#[derive(Debug)]
pub struct QueuedCommand {
    pub id: Uuid,
    pub command: String,
    pub expectation: Expectation,
    pub enqueued_at: DateTime<Utc>,
    responder: oneshot::Sender<CommandResult>,
}

impl QueuedCommand {
    pub fn new(command: String, expectation: Expectation) -> (Self, oneshot::Receiver<CommandResult>) {
        let (responder, rx) = oneshot::channel();
        let entry = Self {
            id: Uuid::new_v4(),
            command,
            expectation,
            enqueued_at: Utc::now(),
            responder,
        };
        (entry, rx)
    }

    fn finish(self, result: CommandResult) {
        // The waiter may have given up; nothing to do then.
        let _ = self.responder.send(result);
    }

    pub fn summary(&self) -> QueueEntry {
        QueueEntry {
            id: self.id,
            command: self.command.clone(),
            enqueued_at: self.enqueued_at,
        }
    }
}

/// Caller-facing view of a queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: Uuid,
    pub command: String,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub processing: Option<QueueEntry>,
    pub backlog: Vec<QueueEntry>,
}

/// How a message affected the command in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Untouched,
    Progress { id: Uuid, remaining: usize },
    Completed { id: Uuid },
    Failed { id: Uuid, error: SessionError },
}

#[derive(Debug, Default)]
pub struct CommandQueue {
    backlog: VecDeque<QueuedCommand>,
    processing: Option<QueuedCommand>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: QueuedCommand) {
        self.backlog.push_back(entry);
    }

    pub fn is_processing(&self) -> bool {
        self.processing.is_some()
    }

    pub fn processing(&self) -> Option<&QueuedCommand> {
        self.processing.as_ref()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Promote the head of the backlog when nothing is in flight. Returns the
    /// id and text to write.
    pub fn start_next(&mut self) -> Option<(Uuid, String)> {
        if self.processing.is_some() {
            return None;
        }
        let next = self.backlog.pop_front()?;
        let started = (next.id, next.command.clone());
        self.processing = Some(next);
        Some(started)
    }

    /// Feed one message to the in-flight command's expectation and settle
    /// it when the expectation says so.
    pub fn resolve(&mut self, message: &Message) -> Resolution {
        let Some(current) = self.processing.as_mut() else {
            return Resolution::Untouched;
        };
        match current.expectation.evaluate(message) {
            Evaluation::Ignored => Resolution::Untouched,
            Evaluation::Progress => Resolution::Progress {
                id: current.id,
                remaining: current.expectation.remaining,
            },
            Evaluation::Complete => {
                let Some(done) = self.processing.take() else {
                    return Resolution::Untouched;
                };
                let id = done.id;
                done.finish(Ok(message.clone()));
                Resolution::Completed { id }
            }
            Evaluation::Failed(error) => {
                let Some(failed) = self.processing.take() else {
                    return Resolution::Untouched;
                };
                let id = failed.id;
                failed.finish(Err(error.clone()));
                Resolution::Failed { id, error }
            }
        }
    }

    /// Reject the in-flight command, e.g. when its write failed.
    pub fn fail_current(&mut self, error: SessionError) -> Option<Uuid> {
        let current = self.processing.take()?;
        let id = current.id;
        current.finish(Err(error));
        Some(id)
    }

    /// Drop everything waiting behind the in-flight command.
    pub fn discard_backlog(&mut self) -> Vec<Uuid> {
        self.backlog
            .drain(..)
            .map(|entry| {
                let id = entry.id;
                entry.finish(Err(SessionError::Discarded));
                id
            })
            .collect()
    }

    /// Reject every command, in flight and waiting.
    pub fn fail_all(&mut self, error: SessionError) -> Vec<Uuid> {
        let mut failed = Vec::new();
        if let Some(id) = self.fail_current(error.clone()) {
            failed.push(id);
        }
        for entry in self.backlog.drain(..) {
            failed.push(entry.id);
            entry.finish(Err(error.clone()));
        }
        failed
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            processing: self.processing.as_ref().map(QueuedCommand::summary),
            backlog: self.backlog.iter().map(QueuedCommand::summary).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{classify, parse_command};

    fn entry(text: &str) -> (QueuedCommand, oneshot::Receiver<CommandResult>) {
        let expectation = parse_command(text, 3).unwrap().expectation(3);
        QueuedCommand::new(text.to_string(), expectation)
    }

    #[test]
    fn test_one_command_in_flight_at_a_time() {
        let mut queue = CommandQueue::new();
        let (a, _rx_a) = entry("1:500");
        let (b, _rx_b) = entry("2:500");
        let a_id = a.id;
        queue.push(a);
        queue.push(b);

        assert_eq!(queue.start_next().map(|(id, _)| id), Some(a_id));
        assert!(queue.start_next().is_none());
        assert_eq!(queue.backlog_len(), 1);
    }

    #[test]
    fn test_completion_sends_triggering_message() {
        let mut queue = CommandQueue::new();
        let (a, mut rx) = entry("1:500");
        let id = a.id;
        queue.push(a);
        queue.start_next();

        let reply = classify(r#"{"motor":"Motor1","code":211}"#).unwrap();
        assert_eq!(queue.resolve(&reply), Resolution::Completed { id });
        assert!(!queue.is_processing());
        assert_eq!(rx.try_recv().unwrap(), Ok(reply));
    }

    #[test]
    fn test_progress_keeps_command_in_flight() {
        let mut queue = CommandQueue::new();
        let (a, mut rx) = entry("h");
        let id = a.id;
        queue.push(a);
        queue.start_next();

        let reply = classify(r#"{"motor":"Motor1","code":206}"#).unwrap();
        assert_eq!(queue.resolve(&reply), Resolution::Progress { id, remaining: 2 });
        assert!(queue.is_processing());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_messages_without_command_are_untouched() {
        let mut queue = CommandQueue::new();
        let reply = classify(r#"{"code":211}"#).unwrap();
        assert_eq!(queue.resolve(&reply), Resolution::Untouched);
    }

    #[test]
    fn test_discard_rejects_backlog_only() {
        let mut queue = CommandQueue::new();
        let (a, mut rx_a) = entry("1:500");
        let (b, mut rx_b) = entry("2:500");
        let (c, mut rx_c) = entry("3:500");
        queue.push(a);
        queue.push(b);
        queue.push(c);
        queue.start_next();

        assert_eq!(queue.discard_backlog().len(), 2);
        assert!(queue.is_processing());
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), Err(SessionError::Discarded));
        assert_eq!(rx_c.try_recv().unwrap(), Err(SessionError::Discarded));
    }

    #[test]
    fn test_fail_all_and_snapshot() {
        let mut queue = CommandQueue::new();
        let (a, mut rx_a) = entry("h");
        let (b, mut rx_b) = entry("p");
        queue.push(a);
        queue.push(b);
        queue.start_next();

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.processing.unwrap().command, "h");
        assert_eq!(snapshot.backlog.len(), 1);
        assert_eq!(snapshot.backlog[0].command, "p");

        let lost = SessionError::TransportLost("eof".into());
        assert_eq!(queue.fail_all(lost.clone()).len(), 2);
        assert_eq!(rx_a.try_recv().unwrap(), Err(lost.clone()));
        assert_eq!(rx_b.try_recv().unwrap(), Err(lost));
        assert_eq!(queue.snapshot(), QueueSnapshot::default());
    }
}
