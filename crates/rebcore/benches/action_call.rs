//! Benchmarks the action call protocol's hot path (spec §4.4): argument
//! fulfillment, typechecking, and native dispatch, repeated enough times that
//! one-shot setup cost (paramlist allocation, interning) does not dominate.
//!
//! Grounded on the teacher's `arithmetic_non_foldable.rs`: non-foldable
//! bodies (arguments computed at each iteration rather than embedded as
//! literals the optimizer could fold) so the measured time reflects runtime
//! argument fulfillment rather than constant-propagation. Unlike the teacher,
//! there is no CPython comparison or CodSpeed variant here — this engine has
//! no peer implementation to benchmark against (see `DESIGN.md`).

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rebcore::{Array, Cell, Flavor, InfixMode, ParamClass, Sigil};
use rebcore::api::Engine;
use rebcore::executors::action::NativeId;
use rebcore::resource::NoLimitTracker;
use rebcore::tracer::NoopTracer;

type E = Engine<NoLimitTracker, NoopTracer>;

fn bound_word(e: &mut E, name: &str) -> Cell {
    let sym = e.world_mut().interns.intern(name);
    let mut c = Cell::word(sym, Sigil::Plain);
    c.binding = Some(e.root().varlist);
    c
}

fn binary_params() -> [(&'static str, ParamClass, bool, bool); 2] {
    [("left", ParamClass::Normal, false, false), ("right", ParamClass::Normal, false, false)]
}

/// A tight, chained arithmetic expression: `a + b * c - d`. Each run uses a
/// freshly allocated program array so the benchmark measures dispatch, not
/// array reuse.
fn run_chain(e: &mut E, plus: &Cell, star: &Cell, minus: &Cell, a: i64, b: i64, c: i64, d: i64) -> i64 {
    let cells = vec![
        Cell::integer(a),
        plus.clone(),
        Cell::integer(b),
        star.clone(),
        Cell::integer(c),
        minus.clone(),
        Cell::integer(d),
    ];
    let array = Array::from_cells(Flavor::PlainList, cells);
    let id = {
        let w = e.world_mut();
        let id = w.arrays.allocate(array, &mut w.tracker).expect("NoLimitTracker cannot fail");
        w.arrays.make_managed(id);
        id
    };
    let handle = e.reb_value(id).expect("arithmetic chain must evaluate");
    let result = e.reb_unbox_integer(handle).expect("result is an integer");
    e.reb_release(handle).expect("handles release LIFO");
    result
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut engine: E = Engine::default();
    engine.register_native("+", &binary_params(), NativeId::Add, true, InfixMode::Tight).unwrap();
    engine.register_native("*", &binary_params(), NativeId::Multiply, true, InfixMode::Tight).unwrap();
    engine.register_native("-", &binary_params(), NativeId::Subtract, true, InfixMode::Tight).unwrap();

    let plus = bound_word(&mut engine, "+");
    let star = bound_word(&mut engine, "*");
    let minus = bound_word(&mut engine, "-");

    c.bench_function("tight_infix_chain__rebcore", |b| {
        b.iter(|| {
            let v = run_chain(&mut engine, &plus, &star, &minus, black_box(1), black_box(2), black_box(3), black_box(4));
            black_box(v);
        });
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
