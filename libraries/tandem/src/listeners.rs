use std::rc::Rc;

use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Identifies a registered listener, so it can be unregistered later.
    pub struct ListenerKey;
}

pub(crate) type Listener<T> = Rc<dyn Fn(&Rc<T>)>;

/// Callbacks interested in a collection's value.
///
/// Listeners are never invoked while the collection's state is borrowed: callers take a
/// [`Listeners::snapshot`] under the borrow, release it, then call them. Many listeners call
/// straight back into the collection.
pub(crate) struct Listeners<T> {
    listeners: SlotMap<ListenerKey, Listener<T>>,
}

impl<T> Listeners<T> {
    pub(crate) fn new() -> Self {
        Self {
            listeners: SlotMap::with_key(),
        }
    }

    pub(crate) fn register(&mut self, listener: impl Fn(&Rc<T>) + 'static) -> ListenerKey {
        self.listeners.insert(Rc::new(listener))
    }

    pub(crate) fn unregister(&mut self, key: ListenerKey) {
        self.listeners.remove(key);
    }

    pub(crate) fn clear(&mut self) {
        self.listeners.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }

    pub(crate) fn snapshot(&self) -> Vec<Listener<T>> {
        self.listeners.values().cloned().collect()
    }
}

/// Listeners to call once the state borrow has been released, along with the value to pass them.
#[must_use]
pub(crate) struct Notification<T> {
    listeners: Vec<Listener<T>>,
    value: Rc<T>,
}

impl<T> Notification<T> {
    pub(crate) fn new(listeners: &Listeners<T>, value: Rc<T>) -> Self {
        Self {
            listeners: listeners.snapshot(),
            value,
        }
    }

    pub(crate) fn send(self) {
        for listener in self.listeners {
            listener(&self.value);
        }
    }
}
