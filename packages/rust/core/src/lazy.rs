//! A value built at most once, on first successful use.

use std::future::Future;

use tokio::sync::OnceCell;

/// Lazily initialized, then immutable, shared resource.
///
/// Concurrent first callers of [`get_or_try_init`](Self::get_or_try_init)
/// race for a single factory run; the rest wait for its result. A failed
/// factory leaves the resource empty so a later call can retry. Once set,
/// reads do not lock.
#[derive(Debug)]
pub struct LazyResource<T> {
    cell: OnceCell<T>,
}

impl<T> Default for LazyResource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LazyResource<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// The value, if already built.
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    /// Return the value, building it with `factory` if nobody has yet.
    pub async fn get_or_try_init<E, F, Fut>(&self, factory: F) -> Result<&T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cell.get_or_try_init(factory).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn builds_once_under_contention() {
        let resource = Arc::new(LazyResource::<u64>::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let resource = Arc::clone(&resource);
            let runs = Arc::clone(&runs);
            handles.push(tokio::spawn(async move {
                let value = resource
                    .get_or_try_init(|| async {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, ()>(42)
                    })
                    .await
                    .copied();
                value
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(resource.get(), Some(&42));
    }

    #[tokio::test]
    async fn failed_init_leaves_it_empty_for_retry() {
        let resource = LazyResource::<String>::new();

        let first = resource
            .get_or_try_init(|| async { Err::<String, _>("not yet") })
            .await;
        assert_eq!(first, Err("not yet"));
        assert!(!resource.is_initialized());

        let second = resource
            .get_or_try_init(|| async { Ok::<_, &str>("ready".to_string()) })
            .await;
        assert_eq!(second.map(String::as_str), Ok("ready"));

        let third = resource
            .get_or_try_init(|| async { Ok::<_, &str>("ignored".to_string()) })
            .await;
        assert_eq!(third.map(String::as_str), Ok("ready"));
    }
}
