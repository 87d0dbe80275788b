#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;

/// Payload that records how many times it has been dropped.
pub struct Tracked {
    pub value: i32,
    drops: Rc<Cell<usize>>,
}

impl Tracked {
    pub fn new(value: i32) -> (Self, Rc<Cell<usize>>) {
        let drops = Rc::new(Cell::new(0));
        (
            Self {
                value,
                drops: drops.clone(),
            },
            drops,
        )
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

/// Route `tracing` output through the test harness; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
