use crate::value::StringValue;
use std::fmt::{Debug, Formatter};

/// Open-addressing hash table with linear probing, keyed by strings and
/// indexed with their cached hash. Entries are never removed.
pub struct Table<V> {
    count: usize,
    entries: Vec<Entry<V>>,
}

enum Entry<V> {
    Vacant,
    Occupied { key: StringValue, value: V },
}

impl<V> Table<V> {
    const MAX_LOAD: f64 = 0.75;

    pub fn new() -> Self {
        Self {
            count: 0,
            entries: Vec::new(),
        }
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &StringValue) -> Option<&V> {
        if self.is_empty() {
            return None;
        }
        match &self.entries[Self::find_entry(&self.entries, key)] {
            Entry::Occupied { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: &StringValue) -> Option<&mut V> {
        if self.is_empty() {
            return None;
        }
        let index = Self::find_entry(&self.entries, key);
        match &mut self.entries[index] {
            Entry::Occupied { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &StringValue) -> bool {
        self.get(key).is_some()
    }

    /// Returns true if `key` was not present before.
    pub fn insert(&mut self, key: StringValue, value: V) -> bool {
        if (self.count + 1) as f64 > (self.capacity() as f64) * Self::MAX_LOAD {
            let new_capacity = self.grow_capacity();
            self.adjust_capacity(new_capacity)
        }

        let index = Self::find_entry(&self.entries, &key);
        let entry = &mut self.entries[index];
        let is_new_key = matches!(entry, Entry::Vacant);
        if is_new_key {
            self.count += 1;
        }
        *entry = Entry::Occupied { key, value };
        is_new_key
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StringValue, &V)> {
        self.entries.iter().filter_map(|e| match e {
            Entry::Occupied { key, value } => Some((key, value)),
            _ => None,
        })
    }

    fn grow_capacity(&self) -> usize {
        if self.capacity() < 8 {
            8
        } else {
            self.capacity() * 2
        }
    }

    fn adjust_capacity(&mut self, new_capacity: usize) {
        let mut entries = Vec::with_capacity(new_capacity);
        entries.resize_with(new_capacity, || Entry::Vacant);
        let old = std::mem::replace(&mut self.entries, entries);

        self.count = 0;
        for entry in old {
            if let Entry::Occupied { key, value } = entry {
                let index = Self::find_entry(&self.entries, &key);
                self.entries[index] = Entry::Occupied { key, value };
                self.count += 1;
            }
        }
    }

    /// Index of the slot holding `key`, or of the vacant slot that ended its
    /// probe sequence. `entries` must not be empty.
    fn find_entry(entries: &[Entry<V>], key: &StringValue) -> usize {
        let capacity = entries.len();
        let mut index = key.hash() as usize % capacity;
        loop {
            match &entries[index] {
                Entry::Vacant => return index,
                Entry::Occupied { key: entry_key, .. } if entry_key == key => return index,
                Entry::Occupied { .. } => {}
            }
            index = (index + 1) % capacity;
        }
    }
}

impl<V> Default for Table<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Debug> Debug for Table<V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
