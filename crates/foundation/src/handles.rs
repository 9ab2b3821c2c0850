/// Generational handle: `(index, generation)`.
///
/// Used for GPU-side objects owned by a render context (textures). A handle
/// whose generation no longer matches its slot refers to a released object.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u32, u32);

impl Handle {
    pub fn new(index: u32, generation: u32) -> Self {
        Handle(index, generation)
    }

    pub fn index(self) -> u32 {
        self.0
    }

    pub fn generation(self) -> u32 {
        self.1
    }
}

/// Slot allocator handing out [`Handle`]s and rejecting stale ones.
#[derive(Debug)]
pub struct HandleSlots<T> {
    slots: Vec<(u32, Option<T>)>,
    free: Vec<u32>,
}

impl<T> Default for HandleSlots<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T> HandleSlots<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: T) -> Handle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.0 = slot.0.wrapping_add(1);
            slot.1 = Some(value);
            return Handle::new(index, slot.0);
        }
        let index = self.slots.len() as u32;
        self.slots.push((0, Some(value)));
        Handle::new(index, 0)
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        match self.slots.get(handle.index() as usize) {
            Some((generation, Some(value))) if *generation == handle.generation() => Some(value),
            _ => None,
        }
    }

    /// Removes the value; stale or already-removed handles return `None`.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.0 != handle.generation() {
            return None;
        }
        let value = slot.1.take()?;
        self.free.push(handle.index());
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|(_, v)| v.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every live value, in slot order.
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(value) = slot.1.take() {
                self.free.push(index as u32);
                out.push(value);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::HandleSlots;

    #[test]
    fn reused_slot_rejects_stale_handle() {
        let mut slots = HandleSlots::new();
        let a = slots.insert("a");
        assert_eq!(slots.remove(a), Some("a"));
        let b = slots.insert("b");
        assert_eq!(a.index(), b.index());
        assert!(slots.get(a).is_none());
        assert_eq!(slots.get(b), Some(&"b"));
    }

    #[test]
    fn double_remove_is_none() {
        let mut slots = HandleSlots::new();
        let a = slots.insert(1);
        assert_eq!(slots.remove(a), Some(1));
        assert_eq!(slots.remove(a), None);
        assert!(slots.is_empty());
    }

    #[test]
    fn drain_empties_all_slots() {
        let mut slots = HandleSlots::new();
        slots.insert(1);
        slots.insert(2);
        assert_eq!(slots.drain(), vec![1, 2]);
        assert_eq!(slots.len(), 0);
    }
}
