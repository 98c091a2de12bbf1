//! Fallback routing between two visitors.

use super::{ProtoVisitor, Scalar};
use crate::error::Result;
use crate::schema::{Field, MessageType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Primary,
    Next,
    Drop,
}

/// Routes each top-level field either to a primary visitor or to an
/// optional fallback.
///
/// `owns` decides, per top-level field, whether the primary handles it.
/// Everything nested under an owned field stays with the primary; everything
/// nested under a foreign field goes to the fallback. Without a fallback,
/// foreign fields are dropped. `init` and `destroy` reach both visitors.
pub struct ChainVisitor<'n, P, O> {
    primary: P,
    owns: O,
    next: Option<&'n mut dyn ProtoVisitor>,
    primary_depth: usize,
    foreign_depth: usize,
}

impl<'n, P, O> ChainVisitor<'n, P, O>
where
    P: ProtoVisitor,
    O: Fn(&Field) -> bool,
{
    /// Creates a chain that drops fields the primary does not own
    pub fn new(primary: P, owns: O) -> Self {
        Self {
            primary,
            owns,
            next: None,
            primary_depth: 0,
            foreign_depth: 0,
        }
    }

    /// Sets the fallback for fields the primary does not own
    pub fn with_next(mut self, next: &'n mut dyn ProtoVisitor) -> Self {
        self.next = Some(next);
        self
    }

    /// The primary visitor
    pub fn primary(&self) -> &P {
        &self.primary
    }

    /// Consumes the chain, returning the primary visitor
    pub fn into_primary(self) -> P {
        self.primary
    }

    fn route(&self, field: &Field) -> Route {
        if self.foreign_depth > 0 {
            Route::Next
        } else if self.primary_depth > 0 || (self.owns)(field) {
            Route::Primary
        } else if self.next.is_some() {
            Route::Next
        } else {
            Route::Drop
        }
    }

    fn forward<F>(&mut self, route: Route, call: F) -> Result<()>
    where
        F: FnOnce(&mut dyn ProtoVisitor) -> Result<()>,
    {
        match route {
            Route::Primary => call(&mut self.primary),
            Route::Next => match self.next.as_deref_mut() {
                Some(next) => call(next),
                None => Ok(()),
            },
            Route::Drop => Ok(()),
        }
    }
}

impl<'n, P, O> ProtoVisitor for ChainVisitor<'n, P, O>
where
    P: ProtoVisitor,
    O: Fn(&Field) -> bool,
{
    fn init(&mut self, message: &MessageType) -> Result<()> {
        self.primary_depth = 0;
        self.foreign_depth = 0;
        self.primary.init(message)?;
        if let Some(next) = self.next.as_deref_mut() {
            next.init(message)?;
        }
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        self.primary.destroy()?;
        if let Some(next) = self.next.as_deref_mut() {
            next.destroy()?;
        }
        Ok(())
    }

    fn visit_scalar(&mut self, field: &Field, value: Scalar<'_>) -> Result<()> {
        let route = self.route(field);
        self.forward(route, |v| value.visit(field, v))
    }

    fn enter(&mut self, field: &Field) -> Result<()> {
        let route = self.route(field);
        match route {
            Route::Next | Route::Drop if self.primary_depth == 0 => self.foreign_depth += 1,
            _ => self.primary_depth += 1,
        }
        self.forward(route, |v| v.enter(field))
    }

    fn leave(&mut self, field: &Field) -> Result<()> {
        let route = self.route(field);
        if self.foreign_depth > 0 {
            self.foreign_depth -= 1;
        } else {
            self.primary_depth = self.primary_depth.saturating_sub(1);
        }
        self.forward(route, |v| v.leave(field))
    }

    fn enter_packed(&mut self, field: &Field) -> Result<()> {
        let route = self.route(field);
        self.forward(route, |v| v.enter_packed(field))
    }

    fn leave_packed(&mut self, field: &Field) -> Result<()> {
        let route = self.route(field);
        self.forward(route, |v| v.leave_packed(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, FieldType, MessageId, ScalarKind, Schema, SchemaBuilder};
    use crate::value::Value;
    use crate::visitor::{RecordingVisitor, VisitEvent};
    use pretty_assertions::assert_eq;

    fn schema() -> (Schema, MessageId) {
        let mut builder = SchemaBuilder::new();
        let id = builder.message("test.Envelope");
        let inner = builder.message("test.Inner");
        builder
            .add_field(id, FieldSpec::scalar(1, "id", ScalarKind::Int32))
            .add_field(id, FieldSpec::new(2, "own", FieldType::Message(inner)))
            .add_field(id, FieldSpec::new(3, "extra", FieldType::Message(inner)))
            .add_field(inner, FieldSpec::scalar(1, "x", ScalarKind::Int32));
        (builder.build().unwrap(), id)
    }

    fn drive(schema: &Schema, id: MessageId, visitor: &mut dyn ProtoVisitor) -> Result<()> {
        let envelope = schema.message(id);
        let inner = schema.get_message("test.Inner").unwrap();
        let x = inner.field(1).unwrap();
        visitor.init(envelope)?;
        visitor.visit_int32(envelope.field(1).unwrap(), 10)?;
        for number in [2, 3] {
            let field = envelope.field(number).unwrap();
            visitor.enter(field)?;
            visitor.visit_int32(x, number as i32)?;
            visitor.leave(field)?;
        }
        visitor.destroy()
    }

    #[test]
    fn test_foreign_fields_reach_next() {
        let (schema, id) = schema();
        let mut fallback = RecordingVisitor::new();
        let mut chain = ChainVisitor::new(RecordingVisitor::new(), |f: &Field| f.number() != 3)
            .with_next(&mut fallback);
        drive(&schema, id, &mut chain).unwrap();
        let primary = chain.into_primary();

        assert_eq!(
            primary.events(),
            &[
                VisitEvent::Init("test.Envelope".into()),
                VisitEvent::Scalar { field: 1, value: Value::Int32(10) },
                VisitEvent::Enter(2),
                VisitEvent::Scalar { field: 1, value: Value::Int32(2) },
                VisitEvent::Leave(2),
                VisitEvent::Destroy,
            ]
        );
        assert_eq!(
            fallback.events(),
            &[
                VisitEvent::Init("test.Envelope".into()),
                VisitEvent::Enter(3),
                VisitEvent::Scalar { field: 1, value: Value::Int32(3) },
                VisitEvent::Leave(3),
                VisitEvent::Destroy,
            ]
        );
    }

    #[test]
    fn test_foreign_fields_dropped_without_next() {
        let (schema, id) = schema();
        let mut chain = ChainVisitor::new(RecordingVisitor::new(), |f: &Field| f.number() == 1);
        drive(&schema, id, &mut chain).unwrap();
        assert_eq!(
            chain.primary().events(),
            &[
                VisitEvent::Init("test.Envelope".into()),
                VisitEvent::Scalar { field: 1, value: Value::Int32(10) },
                VisitEvent::Destroy,
            ]
        );
    }
}
