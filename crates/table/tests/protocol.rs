//! Integration tests for the table mutation protocol.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::rc::Rc;
use tributary_core::{DataType, Error, Result, Row, RowTypeBuilder, RowTypeRef, Value};
use tributary_sched::{EnqMode, Label, Opcode, Rowop, Tray, Unit, UnitConfig};
use tributary_table::{
    AggOp, Aggregator, AggregatorContext, AggregatorType, BasicAggregatorType, IndexId, IndexType, KeyField,
    RowHandle, SortCondition, SummaryAggregatorType, Table, TableType,
};

type Log = Rc<RefCell<Vec<String>>>;

fn abc_type() -> RowTypeRef {
    RowTypeBuilder::new()
        .add_field("a", DataType::Int32)
        .unwrap()
        .add_field("b", DataType::Int32)
        .unwrap()
        .add_field("c", DataType::Int32)
        .unwrap()
        .build()
        .unwrap()
}

fn row(rt: &RowTypeRef, a: i32, b: i32, c: i32) -> Row {
    rt.make_row(vec![Value::Int32(a), Value::Int32(b), Value::Int32(c)]).unwrap()
}

fn a_of(rh: &RowHandle) -> i32 {
    rh.row().get_field(0).and_then(|v| v.as_i32()).unwrap()
}

fn make_table(unit: &Unit, tt: TableType) -> Table {
    let mut tt = tt;
    assert!(tt.initialize(), "{}", tt.errors());
    Table::new(&Rc::new(tt), unit, EnqMode::Call, "t").unwrap()
}

/// Chains a recording label to `label`, logging "<label> <opcode> <row>".
fn record(unit: &Unit, label: &Label, log: &Log) {
    let sink = log.clone();
    let rec = Label::new(unit, label.row_type().clone(), "rec", move |_: &Label, rop: &Rowop| {
        sink.borrow_mut()
            .push(format!("{} {} {}", rop.label().name(), rop.opcode(), rop.row()));
        Ok(())
    });
    label.chain(&rec).unwrap();
}

fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

#[test]
fn test_fifo_limit_evicts_oldest() {
    let unit = Unit::new("u");
    let rt = abc_type();
    let t = make_table(&unit, TableType::new(rt.clone()).add_subindex("fifo", IndexType::fifo_limited(2, false, false)));
    let log = new_log();
    record(&unit, t.output_label(), &log);

    for a in 1..=3 {
        assert!(t.insert_row(row(&rt, a, 0, 0)).unwrap());
    }
    assert_eq!(
        *log.borrow(),
        vec![
            "t.out INSERT a=1 b=0 c=0",
            "t.out INSERT a=2 b=0 c=0",
            "t.out DELETE a=1 b=0 c=0",
            "t.out INSERT a=3 b=0 c=0",
        ]
    );
    assert_eq!(t.size(), 2);
}

#[test]
fn test_fifo_jumping_evicts_all() {
    let unit = Unit::new("u");
    let rt = abc_type();
    let t = make_table(&unit, TableType::new(rt.clone()).add_subindex("fifo", IndexType::fifo_limited(2, true, false)));
    let log = new_log();
    record(&unit, t.output_label(), &log);

    for a in 1..=4 {
        t.insert_row(row(&rt, a, 0, 0)).unwrap();
    }
    assert_eq!(
        *log.borrow(),
        vec![
            "t.out INSERT a=1 b=0 c=0",
            "t.out INSERT a=2 b=0 c=0",
            "t.out DELETE a=1 b=0 c=0",
            "t.out DELETE a=2 b=0 c=0",
            "t.out INSERT a=3 b=0 c=0",
            "t.out INSERT a=4 b=0 c=0",
        ]
    );
    assert_eq!(t.size(), 2);
}

#[test]
fn test_fifo_reverse_iteration() {
    let unit = Unit::new("u");
    let rt = abc_type();
    let t = make_table(&unit, TableType::new(rt.clone()).add_subindex("fifo", IndexType::fifo_limited(3, false, true)));
    for a in 1..=4 {
        t.insert_row(row(&rt, a, 0, 0)).unwrap();
    }
    let mut seen = Vec::new();
    let mut cur = t.begin();
    while let Some(rh) = cur {
        seen.push(a_of(&rh));
        cur = t.next(&rh);
    }
    assert_eq!(seen, vec![4, 3, 2]);
    let fifo = t.table_type().find_index("fifo").unwrap();
    assert_eq!(t.last_idx(fifo).map(|rh| a_of(&rh)), Some(2));
}

#[test]
fn test_no_double_eviction() {
    for fifo_first in [false, true] {
        let unit = Unit::new("u");
        let rt = abc_type();
        let primary = IndexType::hashed(&["a"]);
        let fifo = IndexType::fifo_limited(2, false, false);
        let tt = if fifo_first {
            TableType::new(rt.clone())
                .add_subindex("fifo", fifo)
                .add_subindex("primary", primary)
        } else {
            TableType::new(rt.clone())
                .add_subindex("primary", primary)
                .add_subindex("fifo", fifo)
        };
        let t = make_table(&unit, tt);
        let log = new_log();
        t.insert_row(row(&rt, 1, 1, 0)).unwrap();
        t.insert_row(row(&rt, 2, 2, 0)).unwrap();
        record(&unit, t.output_label(), &log);

        assert!(t.insert_row(row(&rt, 1, 3, 0)).unwrap());
        assert_eq!(*log.borrow(), vec!["t.out DELETE a=1 b=1 c=0", "t.out INSERT a=1 b=3 c=0"]);
        assert_eq!(t.size(), 2);

        // a new key now fills the FIFO past its limit
        log.borrow_mut().clear();
        t.insert_row(row(&rt, 3, 4, 0)).unwrap();
        assert_eq!(*log.borrow(), vec!["t.out DELETE a=2 b=2 c=0", "t.out INSERT a=3 b=4 c=0"]);
    }
}

#[test]
fn test_no_double_eviction_across_groups() {
    let unit = Unit::new("u");
    let rt = abc_type();
    let tt = TableType::new(rt.clone())
        .add_subindex("primary", IndexType::hashed(&["a"]))
        .add_subindex(
            "byB",
            IndexType::hashed(&["b"]).add_subindex("fifo", IndexType::fifo_limited(1, false, false)),
        );
    let t = make_table(&unit, tt);
    t.insert_row(row(&rt, 1, 1, 0)).unwrap();
    t.insert_row(row(&rt, 2, 2, 0)).unwrap();
    let log = new_log();
    record(&unit, t.output_label(), &log);

    // the key replacement leaves group b=1, the FIFO of b=2 must not evict too
    assert!(t.insert_row(row(&rt, 1, 2, 0)).unwrap());
    assert_eq!(*log.borrow(), vec!["t.out DELETE a=1 b=1 c=0", "t.out INSERT a=1 b=2 c=0"]);
    assert_eq!(t.size(), 2);

    log.borrow_mut().clear();
    t.insert_row(row(&rt, 3, 2, 0)).unwrap();
    assert_eq!(*log.borrow(), vec!["t.out DELETE a=2 b=2 c=0", "t.out INSERT a=3 b=2 c=0"]);
}

#[test]
fn test_jumping_fifo_with_key_replacement() {
    let unit = Unit::new("u");
    let rt = abc_type();
    let tt = TableType::new(rt.clone())
        .add_subindex("primary", IndexType::hashed(&["a"]))
        .add_subindex("fifo", IndexType::fifo_limited(2, true, false));
    let t = make_table(&unit, tt);
    t.insert_row(row(&rt, 1, 0, 0)).unwrap();
    t.insert_row(row(&rt, 2, 0, 0)).unwrap();
    let log = new_log();
    record(&unit, t.output_label(), &log);

    // replacing a member makes room
    t.insert_row(row(&rt, 2, 1, 0)).unwrap();
    assert_eq!(*log.borrow(), vec!["t.out DELETE a=2 b=0 c=0", "t.out INSERT a=2 b=1 c=0"]);

    log.borrow_mut().clear();
    t.insert_row(row(&rt, 3, 0, 0)).unwrap();
    assert_eq!(
        *log.borrow(),
        vec!["t.out DELETE a=1 b=0 c=0", "t.out DELETE a=2 b=1 c=0", "t.out INSERT a=3 b=0 c=0"]
    );
    assert_eq!(t.size(), 1);
}

#[test]
fn test_large_fifo_limit() {
    let unit = Unit::new("u");
    let rt = abc_type();
    let t = make_table(
        &unit,
        TableType::new(rt.clone()).add_subindex("fifo", IndexType::fifo_limited(1_000_000_000, false, false)),
    );
    for a in 0..20_000 {
        t.insert_row(row(&rt, a, 0, 0)).unwrap();
    }
    assert_eq!(t.size(), 20_000);
    assert_eq!(t.begin().map(|rh| a_of(&rh)), Some(0));
}

fn nested_type(rt: &RowTypeRef) -> TableType {
    TableType::new(rt.clone()).add_subindex(
        "byB",
        IndexType::hashed(&["b"]).add_subindex("byC", IndexType::hashed(&["c"])),
    )
}

#[test]
fn test_nested_grouping() {
    let unit = Unit::new("u");
    let rt = abc_type();
    let t = make_table(&unit, nested_type(&rt));
    for a in 0..20 {
        assert!(t.insert_row(row(&rt, a, a % 3, a % 7)).unwrap());
    }
    assert_eq!(t.size(), 20);

    let by_b = t.table_type().find_index("byB").unwrap();
    let by_c = t.table_type().find_index("byB.byC").unwrap();
    assert_eq!(t.group_count(by_b), 3);
    assert_eq!(t.find_group(by_b, &row(&rt, 0, 1, 0)), Some(7));

    let mut bs = Vec::new();
    let mut cur = t.begin();
    while let Some(rh) = cur {
        bs.push(rh.row().get_field(1).and_then(|v| v.as_i32()).unwrap());
        cur = t.next(&rh);
    }
    assert_eq!(bs.len(), 20);
    let switches = bs.windows(2).filter(|w| w[0] != w[1]).count();
    assert_eq!(switches, 2);

    let rh = t.find(by_c, &row(&rt, 0, 1, 4)).unwrap();
    assert_eq!(a_of(&rh), 4);
    assert_eq!(t.group_size_idx(by_c, &rh), 7);
}

#[test]
fn test_collapse_removes_empty_groups() {
    let unit = Unit::new("u");
    let rt = abc_type();
    let t = make_table(&unit, nested_type(&rt));
    for a in 0..9 {
        t.insert_row(row(&rt, a, a % 3, a)).unwrap();
    }
    let by_b = t.table_type().find_index("byB").unwrap();
    for a in [1, 4, 7] {
        let rh = t.find(t.table_type().find_index("byB.byC").unwrap(), &row(&rt, 0, 1, a)).unwrap();
        assert!(t.remove(&rh).unwrap());
    }
    assert_eq!(t.group_count(by_b), 2);
    assert_eq!(t.find_group(by_b, &row(&rt, 0, 1, 0)), None);
    assert_eq!(t.size(), 6);
}

struct StickyType {
    allow: Rc<Cell<bool>>,
    log: Log,
    rt: RowTypeRef,
}

struct Sticky {
    allow: Rc<Cell<bool>>,
    log: Log,
}

impl AggregatorType for StickyType {
    fn name(&self) -> &str {
        "sticky"
    }

    fn result_type(&self) -> &RowTypeRef {
        &self.rt
    }

    fn make_aggregator(&self) -> Box<dyn Aggregator> {
        Box::new(Sticky {
            allow: self.allow.clone(),
            log: self.log.clone(),
        })
    }
}

impl Aggregator for Sticky {
    fn handle(&mut self, ctx: &mut AggregatorContext<'_>, op: AggOp, opcode: Opcode, row: Option<&Row>) -> Result<()> {
        let a = row
            .and_then(|r| r.get_field(0))
            .map_or_else(|| String::from("-"), |v| v.to_string());
        self.log
            .borrow_mut()
            .push(format!("{} {} {} size={}", op, opcode, a, ctx.group_size()));
        Ok(())
    }

    fn allow_collapse(&self, _ctx: &AggregatorContext<'_>) -> bool {
        self.allow.get()
    }
}

fn sticky_table(unit: &Unit, rt: &RowTypeRef, allow: bool, limit: usize) -> (Table, Rc<Cell<bool>>, Log) {
    let allow = Rc::new(Cell::new(allow));
    let log = new_log();
    let agg = StickyType {
        allow: allow.clone(),
        log: log.clone(),
        rt: rt.clone(),
    };
    let tt = TableType::new(rt.clone()).add_subindex(
        "byB",
        IndexType::hashed(&["b"]).add_subindex("fifo", IndexType::fifo_limited(limit, false, false).set_aggregator(agg)),
    );
    (make_table(unit, tt), allow, log)
}

#[test]
fn test_collapse_veto_keeps_group() {
    let unit = Unit::new("u");
    let rt = abc_type();
    let (t, allow, log) = sticky_table(&unit, &rt, false, 10);
    let by_b = t.table_type().find_index("byB").unwrap();

    let rh = t.make_row_handle(row(&rt, 1, 5, 0)).unwrap();
    t.insert(&rh).unwrap();
    t.remove(&rh).unwrap();
    assert_eq!(t.group_count(by_b), 1);
    assert_eq!(t.find_group(by_b, &row(&rt, 0, 5, 0)), Some(0));
    assert!(!log.borrow().iter().any(|l| l.starts_with("collapse")));

    assert!(!t.collapse(std::slice::from_ref(&rh)).unwrap());
    allow.set(true);
    assert!(t.collapse(std::slice::from_ref(&rh)).unwrap());
    assert_eq!(t.group_count(by_b), 0);
    assert_eq!(log.borrow().last().map(String::as_str), Some("collapse NOP - size=0"));

    // the handle goes back in and brings its group back
    t.insert(&rh).unwrap();
    assert_eq!(t.group_count(by_b), 1);
}

#[test]
fn test_hook_order() {
    let unit = Unit::new("u");
    let rt = abc_type();
    let (t, _, log) = sticky_table(&unit, &rt, true, 2);

    let r1 = t.make_row_handle(row(&rt, 1, 1, 0)).unwrap();
    let r2 = t.make_row_handle(row(&rt, 2, 1, 0)).unwrap();
    let r3 = t.make_row_handle(row(&rt, 3, 1, 0)).unwrap();
    t.insert(&r1).unwrap();
    t.insert(&r2).unwrap();
    t.insert(&r3).unwrap();
    t.remove(&r2).unwrap();
    t.remove(&r3).unwrap();
    assert_eq!(
        *log.borrow(),
        vec![
            "after-insert INSERT 1 size=1",
            "before-mod DELETE - size=1",
            "after-insert INSERT 2 size=2",
            "before-mod DELETE - size=2",
            "after-delete NOP 1 size=2",
            "after-insert INSERT 3 size=2",
            "before-mod DELETE - size=2",
            "after-delete INSERT 2 size=1",
            "before-mod DELETE - size=1",
            "after-delete INSERT 3 size=0",
            "collapse NOP - size=0",
        ]
    );
}

#[test]
fn test_empty_collapse_is_noop() {
    let unit = Unit::new("u");
    let rt = abc_type();
    let (t, _, log) = sticky_table(&unit, &rt, false, 10);
    let rh = t.make_row_handle(row(&rt, 1, 1, 0)).unwrap();
    t.insert(&rh).unwrap();
    log.borrow_mut().clear();

    assert!(t.collapse(&[]).unwrap());
    assert!(t.collapse(std::slice::from_ref(&rh)).unwrap());
    assert_eq!(t.size(), 1);
    assert!(log.borrow().is_empty());
}

struct PositiveOnly;

impl SortCondition for PositiveOnly {
    fn compare(&self, a: &Row, b: &Row) -> Ordering {
        a.get_field(0).cmp(&b.get_field(0))
    }

    fn allow_insert(&self, row: &Row) -> bool {
        row.get_field(0).and_then(|v| v.as_i32()).map_or(false, |a| a >= 0)
    }
}

#[test]
fn test_veto_unwinds_speculative_groups() {
    let unit = Unit::new("u");
    let rt = abc_type();
    let summary = SummaryAggregatorType::new("sum", &rt, &["b"], "c").unwrap();
    let tt = TableType::new(rt.clone()).add_subindex(
        "byB",
        IndexType::hashed(&["b"]).add_subindex("s", IndexType::sorted("positive", PositiveOnly).set_aggregator(summary)),
    );
    let t = make_table(&unit, tt);
    let by_b = t.table_type().find_index("byB").unwrap();
    let log = new_log();
    record(&unit, t.output_label(), &log);
    record(&unit, t.aggregator_label("sum").unwrap(), &log);

    assert!(!t.insert_row(row(&rt, -1, 5, 3)).unwrap());
    assert_eq!(t.size(), 0);
    assert_eq!(t.group_count(by_b), 0);
    assert!(log.borrow().is_empty());

    assert!(t.insert_row(row(&rt, 1, 5, 3)).unwrap());
    assert_eq!(t.group_count(by_b), 1);
    assert_eq!(
        *log.borrow(),
        vec!["t.out INSERT a=1 b=5 c=3", "t.sum INSERT b=5 count=1 sum=3"]
    );
}

#[test]
fn test_definition_errors_refuse_table() {
    let unit = Unit::new("u");
    let mut tt = TableType::new(abc_type()).add_subindex("primary", IndexType::hashed(&["x"]));
    assert!(!tt.initialize());
    let err = Table::new(&Rc::new(tt), &unit, EnqMode::Call, "t").unwrap_err();
    assert_eq!(
        err.to_string(),
        "definition errors:\nindex error:\n  nested index 1 'primary':\n    can not find the key field 'x'\n"
    );
}

#[test]
fn test_input_label() {
    let unit = Unit::new("u");
    let rt = abc_type();
    let t = make_table(&unit, TableType::new(rt.clone()).add_subindex("primary", IndexType::hashed(&["a"])));
    let log = new_log();
    record(&unit, t.output_label(), &log);

    let input = t.input_label();
    unit.schedule(input.make_rowop(Opcode::INSERT, row(&rt, 1, 2, 3)).unwrap())
        .unwrap();
    unit.schedule(input.make_rowop(Opcode::NOP, row(&rt, 2, 0, 0)).unwrap())
        .unwrap();
    assert_eq!(t.size(), 0);
    unit.drain().unwrap();
    assert_eq!(t.size(), 1);

    unit.schedule(input.make_rowop(Opcode::DELETE, row(&rt, 1, 0, 0)).unwrap())
        .unwrap();
    unit.drain().unwrap();
    assert!(t.is_empty());
    assert_eq!(*log.borrow(), vec!["t.out INSERT a=1 b=2 c=3", "t.out DELETE a=1 b=2 c=3"]);
}

#[test]
fn test_output_feeds_back_into_table() {
    let config = UnitConfig {
        max_recursion_depth: Some(8),
        ..UnitConfig::default()
    };
    let unit = Unit::with_config("u", config);
    let rt = abc_type();
    let t = make_table(&unit, TableType::new(rt.clone()).add_subindex("primary", IndexType::hashed(&["a"])));
    let table = t.clone();
    let echo = Label::new(&unit, rt.clone(), "echo", move |_: &Label, rop: &Rowop| {
        let a = rop.row().get_field(0).and_then(|v| v.as_i32()).unwrap_or(0);
        if rop.is_insert() && a < 3 {
            let next = rop.row().row_type().make_row(vec![Value::Int32(a + 1), Value::Int32(0), Value::Int32(0)])?;
            table.insert_row(next)?;
        }
        Ok(())
    });
    t.output_label().chain(&echo).unwrap();
    t.insert_row(row(&rt, 0, 0, 0)).unwrap();
    assert_eq!(t.size(), 4);
    echo.clear();
}

#[test]
fn test_dump_all() {
    let unit = Unit::new("u");
    let rt = abc_type();
    let t = make_table(
        &unit,
        TableType::new(rt.clone())
            .add_subindex("desc", IndexType::ordered([KeyField::desc("a")]))
            .add_subindex("fifo", IndexType::fifo()),
    );
    for a in [2, 3, 1] {
        t.insert_row(row(&rt, a, 0, 0)).unwrap();
    }
    let log = new_log();
    record(&unit, t.dump_label(), &log);
    t.dump_all(Opcode::INSERT).unwrap();
    assert_eq!(
        *log.borrow(),
        vec!["t.dump INSERT a=3 b=0 c=0", "t.dump INSERT a=2 b=0 c=0", "t.dump INSERT a=1 b=0 c=0"]
    );

    log.borrow_mut().clear();
    let fifo = t.table_type().find_index("fifo").unwrap();
    t.dump_all_idx(fifo, Opcode::DELETE).unwrap();
    assert_eq!(
        *log.borrow(),
        vec!["t.dump DELETE a=2 b=0 c=0", "t.dump DELETE a=3 b=0 c=0", "t.dump DELETE a=1 b=0 c=0"]
    );
    assert_eq!(t.size(), 3);
}

#[test]
fn test_summary_aggregator() {
    let unit = Unit::new("u");
    let rt = abc_type();
    let summary = SummaryAggregatorType::new("sum", &rt, &["b"], "c").unwrap();
    let tt = TableType::new(rt.clone()).add_subindex(
        "byB",
        IndexType::hashed(&["b"]).add_subindex("primary", IndexType::hashed(&["a"]).set_aggregator(summary)),
    );
    let t = make_table(&unit, tt);
    let log = new_log();
    record(&unit, t.output_label(), &log);
    record(&unit, t.aggregator_label("sum").unwrap(), &log);

    t.insert_row(row(&rt, 1, 1, 10)).unwrap();
    t.insert_row(row(&rt, 2, 1, 5)).unwrap();
    t.insert_row(row(&rt, 1, 1, 7)).unwrap();
    t.delete_row(&row(&rt, 2, 1, 0)).unwrap();
    t.delete_row(&row(&rt, 1, 1, 0)).unwrap();
    assert_eq!(
        *log.borrow(),
        vec![
            "t.out INSERT a=1 b=1 c=10",
            "t.sum INSERT b=1 count=1 sum=10",
            "t.out INSERT a=2 b=1 c=5",
            "t.sum DELETE b=1 count=1 sum=10",
            "t.sum INSERT b=1 count=2 sum=15",
            "t.out DELETE a=1 b=1 c=10",
            "t.out INSERT a=1 b=1 c=7",
            "t.sum DELETE b=1 count=2 sum=15",
            "t.sum INSERT b=1 count=2 sum=12",
            "t.out DELETE a=2 b=1 c=5",
            "t.sum DELETE b=1 count=2 sum=12",
            "t.sum INSERT b=1 count=1 sum=7",
            "t.out DELETE a=1 b=1 c=7",
            "t.sum DELETE b=1 count=1 sum=7",
        ]
    );
    assert!(t.is_empty());
}

#[test]
fn test_copy_tray_collects_everything() {
    let unit = Unit::new("u");
    let rt = abc_type();
    let summary = SummaryAggregatorType::new("sum", &rt, &[], "c").unwrap();
    let t = make_table(
        &unit,
        TableType::new(rt.clone()).add_subindex("primary", IndexType::hashed(&["a"]).set_aggregator(summary)),
    );
    let first = t.make_row_handle(row(&rt, 1, 0, 4)).unwrap();
    t.insert(&first).unwrap();

    let mut copy = Tray::new();
    let rh = t.make_row_handle(row(&rt, 1, 0, 6)).unwrap();
    assert!(t.insert_with_copy(&rh, &mut copy).unwrap());
    let seen: Vec<String> = copy
        .iter()
        .map(|rop| format!("{} {} {}", rop.label().name(), rop.opcode(), rop.row()))
        .collect();
    assert_eq!(
        seen,
        vec![
            "t.out DELETE a=1 b=0 c=4",
            "t.out INSERT a=1 b=0 c=6",
            "t.sum DELETE count=1 sum=4",
            "t.sum INSERT count=1 sum=6",
        ]
    );

    copy.clear();
    assert!(t.remove_with_copy(&rh, &mut copy).unwrap());
    assert_eq!(copy.len(), 2);
}

#[test]
fn test_aggregator_sees_group_rows() {
    let unit = Unit::new("u");
    let rt = abc_type();
    let last = BasicAggregatorType::new("last", rt.clone(), |ctx: &mut AggregatorContext<'_>, op, opcode, _row| {
        if op == AggOp::BeforeMod || !opcode.is_insert() {
            return Ok(());
        }
        assert_eq!(ctx.rows().len(), ctx.group_size());
        match ctx.last() {
            Some(last) => ctx.send(Opcode::INSERT, last),
            None => Ok(()),
        }
    });
    let tt = TableType::new(rt.clone()).add_subindex(
        "byB",
        IndexType::hashed(&["b"]).add_subindex("fifo", IndexType::fifo().set_aggregator(last)),
    );
    let t = make_table(&unit, tt);
    let log = new_log();
    record(&unit, t.aggregator_label("last").unwrap(), &log);

    t.insert_row(row(&rt, 1, 1, 0)).unwrap();
    t.insert_row(row(&rt, 2, 1, 0)).unwrap();
    t.insert_row(row(&rt, 3, 2, 0)).unwrap();
    let r2 = t.find(t.table_type().find_index("byB.fifo").unwrap(), &row(&rt, 2, 1, 0)).unwrap();
    t.remove(&r2).unwrap();
    assert_eq!(
        *log.borrow(),
        vec![
            "t.last INSERT a=1 b=1 c=0",
            "t.last INSERT a=2 b=1 c=0",
            "t.last INSERT a=3 b=2 c=0",
            "t.last INSERT a=1 b=1 c=0",
        ]
    );
}

#[test]
fn test_group_row_keeps_key_after_creator_leaves() {
    let unit = Unit::new("u");
    let rt = abc_type();
    let keys = BasicAggregatorType::new("keys", rt.clone(), |ctx: &mut AggregatorContext<'_>, op, _opcode, _row| {
        if op != AggOp::Collapse {
            return Ok(());
        }
        match ctx.group_row().cloned() {
            Some(key_row) => ctx.send(Opcode::INSERT, key_row),
            None => Ok(()),
        }
    });
    let tt = TableType::new(rt.clone()).add_subindex(
        "byB",
        IndexType::hashed(&["b"]).add_subindex("fifo", IndexType::fifo().set_aggregator(keys)),
    );
    let t = make_table(&unit, tt);
    let log = new_log();
    record(&unit, t.aggregator_label("keys").unwrap(), &log);

    let r1 = t.make_row_handle(row(&rt, 1, 4, 0)).unwrap();
    let r2 = t.make_row_handle(row(&rt, 2, 4, 0)).unwrap();
    t.insert(&r1).unwrap();
    t.insert(&r2).unwrap();
    t.remove(&r1).unwrap();
    t.remove(&r2).unwrap();
    // the creating row, gone from the table, still carries the key b=4
    assert_eq!(*log.borrow(), vec!["t.keys INSERT a=1 b=4 c=0"]);
}

#[test]
fn test_aggregator_error_reported_after_mutation() {
    let unit = Unit::new("u");
    let rt = abc_type();
    let failing = BasicAggregatorType::new("bad", rt.clone(), |_ctx: &mut AggregatorContext<'_>, op, _opcode, _row| {
        if op == AggOp::AfterInsert {
            return Err(Error::Label {
                label: String::from("bad"),
                message: String::from("refused"),
            });
        }
        Ok(())
    });
    let t = make_table(
        &unit,
        TableType::new(rt.clone()).add_subindex("primary", IndexType::hashed(&["a"]).set_aggregator(failing)),
    );
    let log = new_log();
    record(&unit, t.output_label(), &log);

    let err = t.insert_row(row(&rt, 1, 0, 0)).unwrap_err();
    assert_eq!(err.to_string(), "label 'bad': refused");
    assert_eq!(t.size(), 1);
    assert_eq!(*log.borrow(), vec!["t.out INSERT a=1 b=0 c=0"]);
}

#[test]
fn test_navigation() {
    let unit = Unit::new("u");
    let rt = abc_type();
    let tt = TableType::new(rt.clone())
        .add_subindex(
            "byB",
            IndexType::ordered([KeyField::asc("b")]).add_subindex("byA", IndexType::ordered([KeyField::asc("a")])),
        )
        .add_subindex("fifo", IndexType::fifo());
    let t = make_table(&unit, tt);
    for a in [3, 1, 5, 2, 4] {
        t.insert_row(row(&rt, a, (a + 1) / 2, 0)).unwrap();
    }
    let tt = t.table_type().clone();
    let by_b = tt.find_index("byB").unwrap();
    let by_a = tt.find_index("byB.byA").unwrap();
    let fifo = tt.find_index("fifo").unwrap();

    let order = |idx: IndexId| {
        let mut out = Vec::new();
        let mut cur = t.begin_idx(idx);
        while let Some(rh) = cur {
            out.push(a_of(&rh));
            cur = t.next_idx(idx, &rh);
        }
        out
    };
    assert_eq!(order(by_a), vec![1, 2, 3, 4, 5]);
    assert_eq!(order(by_b), vec![1, 2, 3, 4, 5]);
    assert_eq!(order(fifo), vec![3, 1, 5, 2, 4]);
    assert_eq!(t.last_idx(by_a).map(|rh| a_of(&rh)), Some(5));
    assert_eq!(t.last_idx(fifo).map(|rh| a_of(&rh)), Some(4));

    let r4 = t.find(by_a, &row(&rt, 4, 2, 0)).unwrap();
    assert_eq!(a_of(&r4), 4);
    assert_eq!(t.first_of_group_idx(by_a, &r4).map(|rh| a_of(&rh)), Some(3));
    assert_eq!(t.last_of_group_idx(by_a, &r4).map(|rh| a_of(&rh)), Some(4));
    assert_eq!(t.next_group_idx(by_a, &r4).map(|rh| a_of(&rh)), Some(5));
    let r5 = t.find(by_a, &row(&rt, 5, 3, 0)).unwrap();
    assert!(t.next_group_idx(by_a, &r5).is_none());
    assert_eq!(t.group_size_idx(by_a, &r4), 2);
    assert_eq!(t.find(by_b, &row(&rt, 0, 2, 0)).map(|rh| a_of(&rh)), Some(3));

    // a row that is not in the table has no successor
    let outsider = t.make_row_handle(row(&rt, 9, 1, 0)).unwrap();
    assert!(t.next(&outsider).is_none());
    assert_eq!(t.group_size_idx(by_a, &outsider), 2);
}
