//! Fault injection for the local ledger
//!
//! Lets tests make chunk creation or chunk fetches fail by index a given
//! number of times before succeeding again.

use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct FaultPlan {
    create: Mutex<HashMap<u32, usize>>,
    fetch: Mutex<HashMap<u32, usize>>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` creations of chunk `index`
    pub fn fail_create(&self, index: u32, times: usize) {
        self.create.lock().insert(index, times);
    }

    /// Fail the next `times` fetches of chunk `index`
    pub fn fail_fetch(&self, index: u32, times: usize) {
        self.fetch.lock().insert(index, times);
    }

    pub fn clear(&self) {
        self.create.lock().clear();
        self.fetch.lock().clear();
    }

    pub(crate) fn should_fail_create(&self, index: u32) -> bool {
        take(&self.create, index)
    }

    pub(crate) fn should_fail_fetch(&self, index: u32) -> bool {
        take(&self.fetch, index)
    }
}

fn take(plan: &Mutex<HashMap<u32, usize>>, index: u32) -> bool {
    let mut plan = plan.lock();
    match plan.get_mut(&index) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            if *remaining == 0 {
                plan.remove(&index);
            }
            true
        }
        _ => false,
    }
}
