//! Shared GPIO line handles
//!
//! Several sensors may gate on the same presence or enable line. The cache
//! opens each line once and hands out [`LineLease`] guards; the line is
//! released when the last lease is dropped. Access is confined to the event
//! loop thread, so the counts are plain integers.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::error::Result;

struct Slot<L> {
    line: Rc<L>,
    refs: usize,
}

type Slots<L> = Rc<RefCell<HashMap<String, Slot<L>>>>;

/// Arena of open lines keyed by line name
pub struct LineCache<L> {
    slots: Slots<L>,
}

impl<L> LineCache<L> {
    pub fn new() -> Self {
        Self {
            slots: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Lease `name`, opening it with `open` if nobody holds it yet
    pub fn acquire<F>(&self, name: &str, open: F) -> Result<LineLease<L>>
    where
        F: FnOnce(&str) -> Result<L>,
    {
        let mut slots = self.slots.borrow_mut();
        let line = match slots.get_mut(name) {
            Some(slot) => {
                slot.refs += 1;
                Rc::clone(&slot.line)
            }
            None => {
                let line = Rc::new(open(name)?);
                debug!(line = %name, "GPIO line opened");
                slots.insert(
                    name.to_string(),
                    Slot {
                        line: Rc::clone(&line),
                        refs: 1,
                    },
                );
                line
            }
        };

        Ok(LineLease {
            name: name.to_string(),
            line,
            slots: Rc::clone(&self.slots),
        })
    }

    /// Number of leases currently held on `name`
    pub fn ref_count(&self, name: &str) -> usize {
        self.slots.borrow().get(name).map_or(0, |s| s.refs)
    }

    pub fn is_open(&self, name: &str) -> bool {
        self.slots.borrow().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<L> Default for LineCache<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L> Clone for LineCache<L> {
    fn clone(&self) -> Self {
        Self {
            slots: Rc::clone(&self.slots),
        }
    }
}

/// Scoped hold on a cached line; dropping it releases the reference
pub struct LineLease<L> {
    name: String,
    line: Rc<L>,
    slots: Slots<L>,
}

impl<L> LineLease<L> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn line(&self) -> &L {
        &self.line
    }
}

impl<L> fmt::Debug for LineLease<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineLease").field("name", &self.name).finish()
    }
}

impl<L> Drop for LineLease<L> {
    fn drop(&mut self) {
        let mut slots = self.slots.borrow_mut();
        let release = match slots.get_mut(&self.name) {
            Some(slot) => {
                slot.refs = slot.refs.saturating_sub(1);
                slot.refs == 0
            }
            None => false,
        };
        if release {
            slots.remove(&self.name);
            debug!(line = %self.name, "GPIO line released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SensorError;
    use std::cell::Cell;

    struct FakeLine {
        released: Rc<Cell<u32>>,
    }

    impl Drop for FakeLine {
        fn drop(&mut self) {
            self.released.set(self.released.get() + 1);
        }
    }

    #[test]
    fn test_shared_line_opened_once() {
        let cache = LineCache::new();
        let opens = Cell::new(0);
        let released = Rc::new(Cell::new(0));
        let open = |_: &str| {
            opens.set(opens.get() + 1);
            Ok(FakeLine { released: released.clone() })
        };

        let a = cache.acquire("PS_PWROK", open).unwrap();
        let b = cache.acquire("PS_PWROK", open).unwrap();
        assert_eq!(opens.get(), 1);
        assert_eq!(cache.ref_count("PS_PWROK"), 2);

        drop(a);
        assert!(cache.is_open("PS_PWROK"));
        assert_eq!(released.get(), 0);

        drop(b);
        assert!(!cache.is_open("PS_PWROK"));
        assert_eq!(released.get(), 1);
    }

    #[test]
    fn test_open_failure_leaves_no_slot() {
        let cache: LineCache<FakeLine> = LineCache::new();
        let err = cache
            .acquire("MISSING", |name| Err(SensorError::generic(format!("no line {}", name))))
            .unwrap_err();
        assert!(err.to_string().contains("MISSING"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lease_outlives_cache_handle() {
        let released = Rc::new(Cell::new(0));
        let lease = {
            let cache = LineCache::new();
            cache
                .acquire("FAN_PRSNT", |_| Ok(FakeLine { released: released.clone() }))
                .unwrap()
        };
        assert_eq!(lease.name(), "FAN_PRSNT");
        drop(lease);
        assert_eq!(released.get(), 1);
    }
}
