use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

type Callback<T> = Rc<dyn Fn(&T)>;

struct CellState<T> {
    value: T,
    next_id: u64,
    subscribers: BTreeMap<u64, Callback<T>>,
}

/// Observable value that replays its latest value to every new subscriber.
///
/// Single-threaded; clones share the same value. Subscribers are notified in
/// subscription order and may read the cell (or subscribe/unsubscribe) from
/// inside their callback.
pub struct ReplayCell<T> {
    state: Rc<RefCell<CellState<T>>>,
}

impl<T> Clone for ReplayCell<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ReplayCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ReplayCell")
            .field("value", &state.value)
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}

impl<T: Clone + 'static> ReplayCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            state: Rc::new(RefCell::new(CellState {
                value,
                next_id: 0,
                subscribers: BTreeMap::new(),
            })),
        }
    }

    pub fn get(&self) -> T {
        self.state.borrow().value.clone()
    }

    /// Stores `value` and notifies every subscriber, even if it is unchanged.
    pub fn set(&self, value: T) {
        let callbacks: Vec<Callback<T>> = {
            let mut state = self.state.borrow_mut();
            state.value = value.clone();
            state.subscribers.values().cloned().collect()
        };
        for cb in callbacks {
            cb(&value);
        }
    }

    /// Registers `f` and calls it immediately with the current value.
    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> Subscription {
        let cb: Callback<T> = Rc::new(f);
        let (id, current) = {
            let mut state = self.state.borrow_mut();
            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.insert(id, Rc::clone(&cb));
            (id, state.value.clone())
        };
        cb(&current);

        let weak: Weak<RefCell<CellState<T>>> = Rc::downgrade(&self.state);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(state) = weak.upgrade() {
                    state.borrow_mut().subscribers.remove(&id);
                }
            })),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.borrow().subscribers.len()
    }
}

/// Handle returned by [`ReplayCell::subscribe`]; dropping it unsubscribes.
pub struct Subscription {
    detach: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.detach.is_some())
            .finish()
    }
}
