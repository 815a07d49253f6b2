//! LRU cache for decoded objects.

use std::num::NonZeroUsize;

use grit_hash::ObjectId;
use lru::LruCache;

use crate::Object;

/// LRU cache of decoded objects, keyed by id.
///
/// Sized in object count; commit walks and tree diffs hit the same few
/// hundred objects repeatedly.
pub struct ObjectCache {
    cache: LruCache<ObjectId, Object>,
}

impl ObjectCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
            ),
        }
    }

    /// Get a cached object, promoting it to most-recently-used.
    pub fn get(&mut self, id: &ObjectId) -> Option<&Object> {
        self.cache.get(id)
    }

    /// Insert an object; returns the evicted entry when full.
    pub fn insert(&mut self, id: ObjectId, obj: Object) -> Option<(ObjectId, Object)> {
        self.cache.push(id, obj)
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Blob;

    fn blob(n: u8) -> Object {
        Object::Blob(Blob::new(vec![n]))
    }

    fn id(n: u8) -> ObjectId {
        let mut raw = [0u8; 20];
        raw[19] = n;
        ObjectId::Sha1(raw)
    }

    #[test]
    fn insert_and_get() {
        let mut cache = ObjectCache::new(4);
        cache.insert(id(1), blob(1));
        assert_eq!(cache.get(&id(1)), Some(&blob(1)));
        assert_eq!(cache.get(&id(2)), None);
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = ObjectCache::new(2);
        cache.insert(id(1), blob(1));
        cache.insert(id(2), blob(2));
        cache.get(&id(1)); // promote 1
        cache.insert(id(3), blob(3)); // evicts 2
        assert!(cache.get(&id(1)).is_some());
        assert!(cache.get(&id(2)).is_none());
        assert!(cache.get(&id(3)).is_some());
    }

    #[test]
    fn zero_capacity_clamps_to_one() {
        let mut cache = ObjectCache::new(0);
        cache.insert(id(1), blob(1));
        assert_eq!(cache.len(), 1);
    }
}
