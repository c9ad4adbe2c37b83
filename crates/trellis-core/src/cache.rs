//! Size-capped LRU cache
//!
//! Keys map to values with an estimated byte size; inserting past the cap
//! evicts least-recently-used entries until the tracked size fits again.
//! `CacheFull` is never surfaced: eviction absorbs all pressure, including
//! a single entry larger than the cap (it is evicted right after insertion
//! and the cache stays functional).

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use crate::model::{CallInfo, Element, ExportInfo, FileAnalysis, ImportInfo, Parameter};

/// Constant per-field overhead used by the structural size estimate.
const FIELD_OVERHEAD: usize = 8;

/// Recursive structural byte-size estimate for cacheable values.
pub trait EstimateSize {
    fn estimate_size(&self) -> usize;
}

impl EstimateSize for String {
    fn estimate_size(&self) -> usize {
        self.len() + FIELD_OVERHEAD
    }
}

impl EstimateSize for u32 {
    fn estimate_size(&self) -> usize {
        FIELD_OVERHEAD
    }
}

impl EstimateSize for u64 {
    fn estimate_size(&self) -> usize {
        FIELD_OVERHEAD
    }
}

impl EstimateSize for bool {
    fn estimate_size(&self) -> usize {
        FIELD_OVERHEAD
    }
}

impl<T: EstimateSize> EstimateSize for Option<T> {
    fn estimate_size(&self) -> usize {
        match self {
            Some(value) => value.estimate_size(),
            None => FIELD_OVERHEAD,
        }
    }
}

impl<T: EstimateSize> EstimateSize for Vec<T> {
    fn estimate_size(&self) -> usize {
        FIELD_OVERHEAD + self.iter().map(EstimateSize::estimate_size).sum::<usize>()
    }
}

impl EstimateSize for Parameter {
    fn estimate_size(&self) -> usize {
        self.name.estimate_size() + 3 * FIELD_OVERHEAD
    }
}

impl EstimateSize for Element {
    fn estimate_size(&self) -> usize {
        self.name.estimate_size()
            + self.file.estimate_size()
            + self.parameters.estimate_size()
            + self.calls.estimate_size()
            + 4 * FIELD_OVERHEAD
    }
}

impl EstimateSize for CallInfo {
    fn estimate_size(&self) -> usize {
        self.callee_function.estimate_size()
            + self.callee_object.as_ref().map_or(0, EstimateSize::estimate_size)
            + self.caller_function.as_ref().map_or(0, EstimateSize::estimate_size)
            + self.caller_class.as_ref().map_or(0, EstimateSize::estimate_size)
            + 2 * FIELD_OVERHEAD
    }
}

impl EstimateSize for ImportInfo {
    fn estimate_size(&self) -> usize {
        self.source.estimate_size() + self.specifiers.estimate_size() + 2 * FIELD_OVERHEAD
    }
}

impl EstimateSize for ExportInfo {
    fn estimate_size(&self) -> usize {
        self.specifiers.estimate_size() + 2 * FIELD_OVERHEAD
    }
}

impl EstimateSize for FileAnalysis {
    fn estimate_size(&self) -> usize {
        self.file.estimate_size()
            + self.elements.estimate_size()
            + self.calls.estimate_size()
            + self.imports.estimate_size()
            + self.exports.estimate_size()
    }
}

/// Cache occupancy counters.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub current_size: usize,
    pub max_size: usize,
    pub utilization_percent: f64,
}

struct CacheSlot<V> {
    value: V,
    size: usize,
}

/// Size-capped LRU keyed by `K`.
///
/// Not synchronized; shared users wrap it in a `Mutex` (the LRU ordering
/// requires exclusive access on `get` as well as `set`).
pub struct BoundedCache<K, V> {
    slots: HashMap<K, CacheSlot<V>>,
    /// Front is least-recently-used, back is most-recently-used.
    order: VecDeque<K>,
    max_size: usize,
    current_size: usize,
}

impl<K: Eq + Hash + Clone, V: EstimateSize> BoundedCache<K, V> {
    pub fn new(max_size: usize) -> Self {
        BoundedCache {
            slots: HashMap::new(),
            order: VecDeque::new(),
            max_size,
            current_size: 0,
        }
    }

    /// Look up `key`, promoting it to most-recently-used on a hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if !self.slots.contains_key(key) {
            return None;
        }
        self.promote(key);
        self.slots.get(key).map(|slot| &slot.value)
    }

    /// Insert or replace `key`. Replacement adjusts the tracked size to the
    /// new estimate instead of double-counting; insertion evicts LRU entries
    /// until `current_size <= max_size` holds again.
    pub fn set(&mut self, key: K, value: V, size_override: Option<usize>) {
        let size = size_override.unwrap_or_else(|| value.estimate_size());

        if let Some(slot) = self.slots.get_mut(&key) {
            self.current_size = self.current_size - slot.size + size;
            slot.value = value;
            slot.size = size;
            self.promote(&key);
        } else {
            self.current_size += size;
            self.order.push_back(key.clone());
            self.slots.insert(key, CacheSlot { value, size });
        }

        while self.current_size > self.max_size {
            let Some(victim) = self.order.pop_front() else {
                break;
            };
            if let Some(slot) = self.slots.remove(&victim) {
                self.current_size -= slot.size;
            }
        }
    }

    pub fn has(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    pub fn delete(&mut self, key: &K) -> bool {
        match self.slots.remove(key) {
            Some(slot) => {
                self.current_size -= slot.size;
                self.order.retain(|k| k != key);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.order.clear();
        self.current_size = 0;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let utilization_percent = if self.max_size == 0 {
            0.0
        } else {
            self.current_size as f64 / self.max_size as f64 * 100.0
        };
        CacheStats {
            entries: self.slots.len(),
            current_size: self.current_size,
            max_size: self.max_size,
            utilization_percent,
        }
    }

    fn promote(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.clone());
    }
}
