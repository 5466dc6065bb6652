//! Key/value backends behind the HTTP cache.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use xxhash_rust::xxh3::xxh3_64;

/// Byte store the HTTP cache persists encoded entries into. Individual
/// operations must be atomic; nothing else is assumed.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Bytes>;
    fn put(&self, key: &str, value: Bytes);
    fn delete(&self, key: &str);
    fn name(&self) -> &'static str;
}

const NIL: usize = usize::MAX;

struct Node {
    key: String,
    value: Bytes,
    prev: usize,
    next: usize,
}

/// Doubly linked recency list over a slab of nodes, indexed by key hash.
/// Head is the most recently used entry, tail the eviction candidate.
struct LruList {
    nodes: Vec<Node>,
    free: Vec<usize>,
    index: HashMap<u64, usize>,
    head: usize,
    tail: usize,
    size_bytes: usize,
}

impl LruList {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: NIL,
            tail: NIL,
            size_bytes: 0,
        }
    }

    fn weight(key: &str, value: &Bytes) -> usize {
        key.len() + value.len()
    }

    fn unlink(&mut self, i: usize) {
        let (prev, next) = (self.nodes[i].prev, self.nodes[i].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.nodes[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.nodes[next].prev = prev;
        }
        self.nodes[i].prev = NIL;
        self.nodes[i].next = NIL;
    }

    fn push_front(&mut self, i: usize) {
        self.nodes[i].next = self.head;
        self.nodes[i].prev = NIL;
        if self.head != NIL {
            self.nodes[self.head].prev = i;
        } else {
            self.tail = i;
        }
        self.head = i;
    }

    /// Slot holding exactly `key`; a hash collision counts as absent.
    fn find(&self, key: &str) -> Option<usize> {
        let i = *self.index.get(&xxh3_64(key.as_bytes()))?;
        (self.nodes[i].key == key).then_some(i)
    }

    fn get(&mut self, key: &str) -> Option<Bytes> {
        let i = self.find(key)?;
        self.unlink(i);
        self.push_front(i);
        Some(self.nodes[i].value.clone())
    }

    fn insert(&mut self, key: &str, value: Bytes) {
        let hash = xxh3_64(key.as_bytes());
        if let Some(&i) = self.index.get(&hash) {
            self.remove_slot(i, hash);
        }
        self.size_bytes += Self::weight(key, &value);
        let node = Node {
            key: key.to_string(),
            value,
            prev: NIL,
            next: NIL,
        };
        let i = match self.free.pop() {
            Some(i) => {
                self.nodes[i] = node;
                i
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        self.index.insert(hash, i);
        self.push_front(i);
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.find(key) {
            Some(i) => {
                self.remove_slot(i, xxh3_64(key.as_bytes()));
                true
            }
            None => false,
        }
    }

    fn remove_slot(&mut self, i: usize, hash: u64) {
        self.unlink(i);
        self.index.remove(&hash);
        let node = &mut self.nodes[i];
        self.size_bytes -= Self::weight(&node.key, &node.value);
        node.key = String::new();
        node.value = Bytes::new();
        self.free.push(i);
    }

    fn pop_tail(&mut self) -> bool {
        if self.tail == NIL {
            return false;
        }
        let i = self.tail;
        let hash = xxh3_64(self.nodes[i].key.as_bytes());
        self.remove_slot(i, hash);
        true
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

/// In-process LRU bounded by total key + value bytes.
pub struct LruStore {
    capacity_bytes: usize,
    list: Mutex<LruList>,
    evictions: std::sync::atomic::AtomicU64,
}

impl LruStore {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            capacity_bytes,
            list: Mutex::new(LruList::new()),
            evictions: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.list.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn size_bytes(&self) -> usize {
        self.list.lock().size_bytes
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn clear(&self) {
        *self.list.lock() = LruList::new();
    }
}

impl CacheStore for LruStore {
    fn get(&self, key: &str) -> Option<Bytes> {
        self.list.lock().get(key)
    }

    /// Values larger than the whole capacity are not stored.
    fn put(&self, key: &str, value: Bytes) {
        if LruList::weight(key, &value) > self.capacity_bytes {
            self.delete(key);
            return;
        }
        let mut list = self.list.lock();
        list.insert(key, value);
        let mut evicted = 0;
        while list.size_bytes > self.capacity_bytes && list.pop_tail() {
            evicted += 1;
        }
        if evicted > 0 {
            self.evictions
                .fetch_add(evicted, std::sync::atomic::Ordering::Relaxed);
        }
    }

    fn delete(&self, key: &str) {
        self.list.lock().remove(key);
    }

    fn name(&self) -> &'static str {
        "LruStore"
    }
}
