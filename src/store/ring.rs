use parking_lot::Mutex;

/// Fixed-capacity circular store. Pushing past capacity overwrites the oldest
/// entry. One store-local lock guards head/len and every slot, so a snapshot
/// never observes a half-applied push.
pub struct BoundedStore<T> {
    inner: Mutex<Ring<T>>,
    capacity: usize,
}

struct Ring<T> {
    slots: Vec<Option<T>>,
    /// Index of the next write.
    head: usize,
    len: usize,
}

impl<T: Clone> BoundedStore<T> {
    /// Create a store holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            inner: Mutex::new(Ring {
                slots,
                head: 0,
                len: 0,
            }),
            capacity,
        }
    }

    /// Append an item. Returns the evicted oldest item if the store was full.
    pub fn push(&self, item: T) -> Option<T> {
        let mut ring = self.inner.lock();
        let head = ring.head;
        let evicted = ring.slots[head].replace(item);
        ring.head = (head + 1) % self.capacity;
        if ring.len < self.capacity {
            ring.len += 1;
        }
        evicted
    }

    /// Consistent oldest-to-newest copy of the current contents.
    pub fn snapshot(&self) -> Vec<T> {
        let ring = self.inner.lock();
        let start = (ring.head + self.capacity - ring.len) % self.capacity;
        (0..ring.len)
            .filter_map(|i| ring.slots[(start + i) % self.capacity].clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
