/// Index into a [`SlotMap`]. The generation makes a key go stale once its slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    idx: u32,
    generation: u32,
}
impl Key {
    pub fn index(self) -> usize {
        self.idx as usize
    }
}
impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.idx, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    // Err holds the next free slot
    value: Result<T, u32>,
}

#[derive(Debug)]
pub struct SlotMap<T> {
    head: u32,
    len: usize,
    entries: Vec<Slot<T>>,
}
impl<T> Default for SlotMap<T> {
    fn default() -> Self {
        Self::new()
    }
}
impl<T> SlotMap<T> {
    pub fn new() -> Self {
        Self {
            head: u32::MAX,
            len: 0,
            entries: vec![],
        }
    }
    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
    pub fn get(&self, key: Key) -> Option<&T> {
        self.entries.get(key.index())
            .filter(|s| s.generation == key.generation)
            .and_then(|s| s.value.as_ref().ok())
    }
    pub fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        self.entries.get_mut(key.index())
            .filter(|s| s.generation == key.generation)
            .and_then(|s| s.value.as_mut().ok())
    }
    /// The live key occupying slot `idx`, if any. Used to map poller event keys back.
    pub fn key_at(&self, idx: usize) -> Option<Key> {
        self.entries.get(idx)
            .filter(|s| s.value.is_ok())
            .map(|s| Key { idx: idx as u32, generation: s.generation })
    }
    pub fn next_idx(&self) -> usize {
        if self.head == u32::MAX {
            self.entries.len()
        } else {
            self.head as usize
        }
    }
    pub fn insert(&mut self, value: T) -> Key {
        self.len += 1;
        if self.head == u32::MAX {
            let idx = self.entries.len() as u32;
            self.entries.push(Slot { generation: 0, value: Ok(value) });
            Key { idx, generation: 0 }
        } else {
            let idx = self.head;
            let slot = &mut self.entries[idx as usize];
            match core::mem::replace(&mut slot.value, Ok(value)) {
                Err(next) => self.head = next,
                Ok(_) => unreachable!("corrupted slotmap"),
            }
            Key { idx, generation: slot.generation }
        }
    }
    /// Removes the entry under `key`. Releasing a stale or free key is a no-op.
    pub fn release(&mut self, key: Key) -> Option<T> {
        let slot = self.entries.get_mut(key.index())
            .filter(|s| s.generation == key.generation && s.value.is_ok())?;
        let value = core::mem::replace(&mut slot.value, Err(self.head)).ok();
        slot.generation = slot.generation.wrapping_add(1);
        self.head = key.idx;
        self.len -= 1;
        value
    }
    pub fn keys(&self) -> Vec<Key> {
        self.entries.iter().enumerate()
            .filter(|(_, s)| s.value.is_ok())
            .map(|(i, s)| Key { idx: i as u32, generation: s.generation })
            .collect()
    }
}
