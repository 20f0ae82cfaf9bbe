use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug)]
struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Per-key quiescence timers. Scheduling a key replaces its timer; a timer
/// that survives its full delay sends a message on the session channel.
#[derive(Debug)]
pub struct Debouncer<K> {
    delay: Duration,
    timers: HashMap<K, Timer>,
    generation: u64,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + std::fmt::Debug + 'static,
{
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            timers: HashMap::new(),
            generation: 0,
        }
    }

    /// (Re)starts the timer for `key`. After `delay` of quiet, `message(key,
    /// generation)` is sent on `tx`.
    pub fn schedule<M, F>(&mut self, key: K, tx: &mpsc::UnboundedSender<M>, message: F)
    where
        M: Send + 'static,
        F: FnOnce(K, u64) -> M + Send + 'static,
    {
        if let Some(old) = self.timers.remove(&key) {
            old.handle.abort();
        }
        self.generation += 1;
        let generation = self.generation;
        let delay = self.delay;
        let tx = tx.clone();
        let fire_key = key.clone();
        tracing::debug!(key = ?key, generation, "debounce scheduled");
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(message(fire_key, generation));
        });
        self.timers.insert(key, Timer { generation, handle });
    }

    /// Claims a fired timer. Returns false for a stale generation, in which
    /// case the key stays pending under its newer timer. An aborted task may
    /// already have sent before the abort landed.
    pub fn complete(&mut self, key: &K, generation: u64) -> bool {
        match self.timers.get(key) {
            Some(timer) if timer.generation == generation => {
                self.timers.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self, key: &K) -> bool {
        match self.timers.remove(key) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Stops every timer and returns the keys that were still waiting, so the
    /// caller can flush them right away.
    pub fn drain(&mut self) -> Vec<K> {
        self.timers
            .drain()
            .map(|(key, timer)| {
                timer.handle.abort();
                key
            })
            .collect()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.timers.contains_key(key)
    }

    pub fn pending(&self) -> usize {
        self.timers.len()
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        for timer in self.timers.values() {
            timer.handle.abort();
        }
    }
}
