//! Demo pages driven by the `rerunkit` binary
//!
//! Each page is ordinary code that runs top to bottom once per rerun, the
//! way a script-style app page does: the counter page keeps its value in
//! session state, the square and table pages lean on memoized functions.

use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::Rng;

use crate::cache::{CachePolicy, InvokeError, Memoized};
use crate::session::RerunContext;
use crate::state::StateError;

/// State key the counter page stores its value under
pub const COUNTER_KEY: &str = "counter";

/// Button pressed before a counter rerun
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterAction {
    /// Plain rerun, no button pressed
    None,
    Increment,
    Reset,
}

/// Counter page: initializes the counter once, then applies the action
pub fn counter_page(ctx: &mut RerunContext<'_>, action: CounterAction) -> Result<i64, StateError> {
    let state = ctx.state_mut();
    state.get_or_insert_with(COUNTER_KEY, || 0.into());

    match action {
        CounterAction::Increment => {
            let next = state.get_as::<i64>(COUNTER_KEY)? + 1;
            state.set(COUNTER_KEY, next);
        }
        CounterAction::Reset => state.set(COUNTER_KEY, 0),
        CounterAction::None => {}
    }

    state.get_as(COUNTER_KEY)
}

/// Memoized square with a counter of how often its body actually ran
pub struct SquareDemo {
    calls: Arc<AtomicU64>,
    square: Memoized<i64, i64>,
}

impl SquareDemo {
    pub fn new(policy: CachePolicy) -> Self {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let square = Memoized::infallible("slow_square", move |x: &i64| {
            counter.fetch_add(1, Ordering::SeqCst);
            tracing::info!(x, "Computing square");
            x * x
        })
        .with_policy(policy);
        Self { calls, square }
    }

    pub fn square(&self, x: i64) -> Result<i64, InvokeError<Infallible>> {
        self.square.invoke(&x)
    }

    /// Times the body has run
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn cache(&self) -> &Memoized<i64, i64> {
        &self.square
    }
}

/// Synthetic three-column table, standing in for a slow data load
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: [&'static str; 3],
    pub rows: Vec<[f64; 3]>,
}

impl Table {
    pub fn head(&self, n: usize) -> &[[f64; 3]] {
        &self.rows[..n.min(self.rows.len())]
    }
}

/// Generate `rows` rows of random values. Every call produces new data.
pub fn generate_table(rows: usize) -> Table {
    let mut rng = rand::rng();
    Table {
        columns: ["A", "B", "C"],
        rows: (0..rows)
            .map(|_| {
                [
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                ]
            })
            .collect(),
    }
}

/// Memoized table loader. Tables are shared, not copied, on each hit.
pub fn table_loader(policy: CachePolicy) -> Memoized<usize, Table> {
    Memoized::infallible("load_data", |rows: &usize| {
        tracing::info!(rows, "Loading data");
        generate_table(*rows)
    })
    .with_policy(policy)
}
