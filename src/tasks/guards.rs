use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Shared liveness flag for a UI-owned object.
///
/// The owner keeps one clone and calls [`AliveFlag::kill`] in its teardown;
/// every pending callback holds another clone and checks it right before
/// touching the object.
#[derive(Debug, Clone)]
pub struct AliveFlag(Arc<AtomicBool>);

impl AliveFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn kill(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Wrap `callback` so it becomes a no-op once the flag is dead.
    pub fn guard<T, F>(&self, callback: F) -> impl FnOnce(T) + Send + 'static
    where
        T: 'static,
        F: FnOnce(T) + Send + 'static,
    {
        let flag = self.clone();
        move |value| {
            if flag.is_alive() {
                callback(value);
            }
        }
    }
}

impl Default for AliveFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic counter for bulk invalidation of outstanding callbacks.
#[derive(Debug, Clone, Default)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Invalidate every token issued so far. Returns the new generation.
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Capture the generation active right now.
    pub fn token(&self) -> GenerationToken {
        GenerationToken {
            captured: self.current(),
            counter: self.clone(),
        }
    }
}

/// Generation value captured when a callback was scheduled
#[derive(Debug, Clone)]
pub struct GenerationToken {
    captured: u64,
    counter: Generation,
}

impl GenerationToken {
    pub fn is_current(&self) -> bool {
        self.counter.current() == self.captured
    }

    /// Wrap `callback` so it is silently dropped if the generation moved on.
    pub fn guard<T, F>(self, callback: F) -> impl FnOnce(T) + Send + 'static
    where
        T: 'static,
        F: FnOnce(T) + Send + 'static,
    {
        move |value| {
            if self.is_current() {
                callback(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_alive_flag_suppresses_after_kill() {
        let flag = AliveFlag::new();
        let hits = Arc::new(Mutex::new(Vec::new()));

        let sink = hits.clone();
        let first = flag.guard(move |v: u32| sink.lock().unwrap().push(v));
        let sink = hits.clone();
        let second = flag.guard(move |v: u32| sink.lock().unwrap().push(v));

        first(1);
        flag.kill();
        second(2);

        assert!(!flag.is_alive());
        assert_eq!(*hits.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_stale_generation_dropped() {
        let generation = Generation::new();
        let stale = generation.token();
        assert!(stale.is_current());

        assert_eq!(generation.bump(), 1);
        let fresh = generation.token();

        assert!(!stale.is_current());
        assert!(fresh.is_current());

        let hits = Arc::new(Mutex::new(0));
        let sink = hits.clone();
        stale.guard(move |_: ()| *sink.lock().unwrap() += 1)(());
        let sink = hits.clone();
        fresh.guard(move |_: ()| *sink.lock().unwrap() += 10)(());

        assert_eq!(*hits.lock().unwrap(), 10);
    }
}
