//! Type aliases for commonly used complex types.
//!
//! Hubs, peripherals and listener tables are shared between the tasks of a
//! running system; these aliases name the handful of shapes that recur.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared, read-mostly map.
pub type ThreadSafeRwMap<K, V> = Arc<RwLock<HashMap<K, V>>>;

/// A callback receiving one value by reference.
pub type DataCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Create an empty [`ThreadSafeRwMap`].
pub fn thread_safe_rw_map<K, V>() -> ThreadSafeRwMap<K, V> {
    Arc::new(RwLock::new(HashMap::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_safe_rw_map() {
        let map: ThreadSafeRwMap<u8, &str> = thread_safe_rw_map();
        map.write().insert(1, "one");
        assert_eq!(map.read().get(&1), Some(&"one"));
    }

    #[test]
    fn test_data_callback() {
        let total = Arc::new(RwLock::new(0usize));
        let sink = total.clone();
        let cb: DataCallback<Vec<u8>> = Arc::new(move |v| *sink.write() += v.len());
        cb(&vec![1, 2, 3]);
        assert_eq!(*total.read(), 3);
    }
}
