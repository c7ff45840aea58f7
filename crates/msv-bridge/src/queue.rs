//! Call buffer used while a bridge is not yet enabled.

use std::collections::VecDeque;
use std::fmt;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::bridge::{EventOptions, TaskOptions};
use crate::{BridgeError, Payload};

/// Kind of bridge call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Task,
    Event,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task => f.write_str("task"),
            Self::Event => f.write_str("event"),
        }
    }
}

/// Reply slot of a buffered task; resolved exactly once.
pub(crate) type TaskReply = oneshot::Sender<Result<Payload, BridgeError>>;

pub(crate) struct PendingTask {
    pub call_id: Uuid,
    pub name: String,
    pub payload: Payload,
    pub options: TaskOptions,
    pub reply: TaskReply,
}

pub(crate) struct PendingEvent {
    pub call_id: Uuid,
    pub name: String,
    pub payload: Payload,
    pub options: EventOptions,
}

/// Two bounded FIFOs, one per call kind.
pub(crate) struct CallBuffer {
    tasks: VecDeque<PendingTask>,
    events: VecDeque<PendingEvent>,
    capacity: usize,
}

impl CallBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            tasks: VecDeque::new(),
            events: VecDeque::new(),
            capacity,
        }
    }

    pub fn push_task(&mut self, task: PendingTask) -> Result<(), BridgeError> {
        if self.tasks.len() >= self.capacity {
            return Err(BridgeError::BufferFull {
                kind: CallKind::Task,
                capacity: self.capacity,
            });
        }
        self.tasks.push_back(task);
        Ok(())
    }

    pub fn push_event(&mut self, event: PendingEvent) -> Result<(), BridgeError> {
        if self.events.len() >= self.capacity {
            return Err(BridgeError::BufferFull {
                kind: CallKind::Event,
                capacity: self.capacity,
            });
        }
        self.events.push_back(event);
        Ok(())
    }

    pub fn len(&self, kind: CallKind) -> usize {
        match kind {
            CallKind::Task => self.tasks.len(),
            CallKind::Event => self.events.len(),
        }
    }

    /// Empty both FIFOs, returning their contents in submission order.
    pub fn take(&mut self) -> (VecDeque<PendingEvent>, VecDeque<PendingTask>) {
        (
            std::mem::take(&mut self.events),
            std::mem::take(&mut self.tasks),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(name: &str) -> PendingEvent {
        PendingEvent {
            call_id: Uuid::new_v4(),
            name: name.to_string(),
            payload: json!({}),
            options: EventOptions::default(),
        }
    }

    #[test]
    fn test_capacity_is_per_kind() {
        let mut buffer = CallBuffer::new(1);
        buffer.push_event(event("a")).unwrap();
        assert_eq!(
            buffer.push_event(event("b")),
            Err(BridgeError::BufferFull {
                kind: CallKind::Event,
                capacity: 1,
            })
        );

        let (reply, _rx) = oneshot::channel();
        buffer
            .push_task(PendingTask {
                call_id: Uuid::new_v4(),
                name: "t".to_string(),
                payload: json!(null),
                options: TaskOptions::default(),
                reply,
            })
            .unwrap();
        assert_eq!(buffer.len(CallKind::Task), 1);
    }

    #[test]
    fn test_take_preserves_order() {
        let mut buffer = CallBuffer::new(8);
        for name in ["first", "second", "third"] {
            buffer.push_event(event(name)).unwrap();
        }

        let (events, tasks) = buffer.take();
        let names: Vec<_> = events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert!(tasks.is_empty());
        assert_eq!(buffer.len(CallKind::Event), 0);
    }
}
