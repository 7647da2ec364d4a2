//! Incremental count and sum per group.

use super::{AggOp, Aggregator, AggregatorContext, AggregatorType};
use alloc::boxed::Box;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use tributary_core::{DataType, Error, Errors, Result, Row, RowTypeBuilder, RowTypeRef, Value};
use tributary_sched::Opcode;

/// Maintains, per group, the row count and the sum of one numeric field.
///
/// The result row has the group key fields, then `count` (Int64) and `sum`
/// (Float64). Each mutation of a group deletes the previous result and, if
/// the group is not empty, inserts the new one.
#[derive(Clone)]
pub struct SummaryAggregatorType {
    name: String,
    source: RowTypeRef,
    key_fields: Rc<[usize]>,
    sum_field: usize,
    result_type: RowTypeRef,
}

impl SummaryAggregatorType {
    /// Creates the aggregator type for tables of `row_type`.
    pub fn new(name: impl Into<String>, row_type: &RowTypeRef, key_fields: &[&str], sum_field: &str) -> Result<Self> {
        let mut builder = RowTypeBuilder::new();
        let mut keys = Vec::with_capacity(key_fields.len());
        for &field in key_fields {
            let index = row_type
                .field_index(field)
                .ok_or_else(|| Error::row_type(format!("can not find the key field '{}'", field)))?;
            let data_type = row_type.fields()[index].data_type();
            builder = builder.add_field(field, data_type)?;
            keys.push(index);
        }
        let sum_index = row_type
            .field_index(sum_field)
            .ok_or_else(|| Error::row_type(format!("can not find the sum field '{}'", sum_field)))?;
        if !row_type.fields()[sum_index].data_type().is_numeric() {
            return Err(Error::row_type(format!("the sum field '{}' is not numeric", sum_field)));
        }
        let result_type = builder
            .add_field("count", DataType::Int64)?
            .add_field("sum", DataType::Float64)?
            .build()?;
        Ok(Self {
            name: name.into(),
            source: row_type.clone(),
            key_fields: Rc::from(keys),
            sum_field: sum_index,
            result_type,
        })
    }
}

impl AggregatorType for SummaryAggregatorType {
    fn name(&self) -> &str {
        &self.name
    }

    fn result_type(&self) -> &RowTypeRef {
        &self.result_type
    }

    fn make_aggregator(&self) -> Box<dyn Aggregator> {
        Box::new(SummaryAggregator {
            key_fields: self.key_fields.clone(),
            sum_field: self.sum_field,
            result_type: self.result_type.clone(),
            count: 0,
            sum: 0.0,
            key: None,
            last: None,
        })
    }

    fn check(&self, row_type: &RowTypeRef, errors: &mut Errors) {
        if !row_type.equals(&self.source) {
            errors.append_msg(true, "the aggregator was built for a different row type");
        }
    }
}

struct SummaryAggregator {
    key_fields: Rc<[usize]>,
    sum_field: usize,
    result_type: RowTypeRef,
    count: i64,
    sum: f64,
    key: Option<Vec<Value>>,
    last: Option<Row>,
}

impl SummaryAggregator {
    fn amount(&self, row: &Row) -> f64 {
        row.get_field(self.sum_field).and_then(Value::to_f64).unwrap_or(0.0)
    }

    fn remember_key(&mut self, row: &Row) {
        if self.key.is_none() {
            self.key = Some(
                self.key_fields
                    .iter()
                    .map(|&i| row.get(i).cloned().unwrap_or(Value::Null))
                    .collect(),
            );
        }
    }

    fn publish(&mut self, ctx: &mut AggregatorContext<'_>) -> Result<()> {
        if self.count <= 0 {
            return Ok(());
        }
        let mut values = self.key.clone().unwrap_or_default();
        values.push(Value::Int64(self.count));
        values.push(Value::Float64(self.sum));
        let result = self.result_type.make_row(values)?;
        ctx.send(Opcode::INSERT, result.clone())?;
        self.last = Some(result);
        Ok(())
    }
}

impl Aggregator for SummaryAggregator {
    fn handle(&mut self, ctx: &mut AggregatorContext<'_>, op: AggOp, opcode: Opcode, row: Option<&Row>) -> Result<()> {
        match op {
            AggOp::BeforeMod => {
                if let Some(last) = self.last.take() {
                    ctx.send(Opcode::DELETE, last)?;
                }
            }
            AggOp::AfterDelete => {
                if let Some(row) = row {
                    self.remember_key(row);
                    self.count -= 1;
                    self.sum -= self.amount(row);
                }
                if opcode.is_insert() {
                    self.publish(ctx)?;
                }
            }
            AggOp::AfterInsert => {
                if let Some(row) = row {
                    self.remember_key(row);
                    self.count += 1;
                    self.sum += self.amount(row);
                }
                if opcode.is_insert() {
                    self.publish(ctx)?;
                }
            }
            AggOp::Collapse => {}
        }
        Ok(())
    }
}
