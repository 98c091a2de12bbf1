//! A visitor that records the calls it receives.

use super::{ProtoVisitor, Scalar};
use crate::error::Result;
use crate::schema::{Field, MessageType};
use crate::value::Value;

/// One recorded visitor call; fields are identified by number
#[derive(Debug, Clone, PartialEq)]
pub enum VisitEvent {
    /// `init` with the root message's full name
    Init(String),
    /// `destroy`
    Destroy,
    /// A scalar value
    Scalar {
        /// Field number
        field: u32,
        /// The value, tagged with its kind
        value: Value,
    },
    /// `enter`
    Enter(u32),
    /// `leave`
    Leave(u32),
    /// `enter_packed`
    EnterPacked(u32),
    /// `leave_packed`
    LeavePacked(u32),
}

/// Captures a traversal as a list of [`VisitEvent`]s
#[derive(Debug, Default, Clone)]
pub struct RecordingVisitor {
    events: Vec<VisitEvent>,
}

impl RecordingVisitor {
    /// Creates an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// The calls recorded so far
    pub fn events(&self) -> &[VisitEvent] {
        &self.events
    }

    /// Consumes the recorder, returning its events
    pub fn into_events(self) -> Vec<VisitEvent> {
        self.events
    }
}

impl ProtoVisitor for RecordingVisitor {
    fn init(&mut self, message: &MessageType) -> Result<()> {
        self.events.push(VisitEvent::Init(message.full_name().to_string()));
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        self.events.push(VisitEvent::Destroy);
        Ok(())
    }

    fn visit_scalar(&mut self, field: &Field, value: Scalar<'_>) -> Result<()> {
        self.events.push(VisitEvent::Scalar {
            field: field.number(),
            value: Value::from(value),
        });
        Ok(())
    }

    fn enter(&mut self, field: &Field) -> Result<()> {
        self.events.push(VisitEvent::Enter(field.number()));
        Ok(())
    }

    fn leave(&mut self, field: &Field) -> Result<()> {
        self.events.push(VisitEvent::Leave(field.number()));
        Ok(())
    }

    fn enter_packed(&mut self, field: &Field) -> Result<()> {
        self.events.push(VisitEvent::EnterPacked(field.number()));
        Ok(())
    }

    fn leave_packed(&mut self, field: &Field) -> Result<()> {
        self.events.push(VisitEvent::LeavePacked(field.number()));
        Ok(())
    }
}
