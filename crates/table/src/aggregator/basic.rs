//! Stateless aggregation through a closure.

use super::{AggOp, Aggregator, AggregatorContext, AggregatorType};
use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use tributary_core::{Result, Row, RowTypeRef};
use tributary_sched::Opcode;

type Handler = dyn Fn(&mut AggregatorContext<'_>, AggOp, Opcode, Option<&Row>) -> Result<()>;

/// An aggregator type calling one closure for every hook.
///
/// The closure keeps no per-group state; it recomputes whatever it needs
/// from the group through the context.
#[derive(Clone)]
pub struct BasicAggregatorType {
    name: String,
    result_type: RowTypeRef,
    handler: Rc<Handler>,
}

impl BasicAggregatorType {
    /// Creates an aggregator type.
    pub fn new<F>(name: impl Into<String>, result_type: RowTypeRef, handler: F) -> Self
    where
        F: Fn(&mut AggregatorContext<'_>, AggOp, Opcode, Option<&Row>) -> Result<()> + 'static,
    {
        Self {
            name: name.into(),
            result_type,
            handler: Rc::new(handler),
        }
    }
}

impl AggregatorType for BasicAggregatorType {
    fn name(&self) -> &str {
        &self.name
    }

    fn result_type(&self) -> &RowTypeRef {
        &self.result_type
    }

    fn make_aggregator(&self) -> Box<dyn Aggregator> {
        Box::new(BasicAggregator {
            handler: self.handler.clone(),
        })
    }
}

struct BasicAggregator {
    handler: Rc<Handler>,
}

impl Aggregator for BasicAggregator {
    fn handle(&mut self, ctx: &mut AggregatorContext<'_>, op: AggOp, opcode: Opcode, row: Option<&Row>) -> Result<()> {
        (self.handler)(ctx, op, opcode, row)
    }
}
