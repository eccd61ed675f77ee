use std::sync::{Arc, Mutex, MutexGuard};

use crate::store::KvStore;

pub const RECEIVED_KEY: &str = "receivedData";
pub const SENT_KEY: &str = "sentData";
pub const MESSAGE_LOG_CAP: usize = 50;

struct Logs {
    received: Vec<String>,
    sent: Vec<String>,
}

/// Received and sent message logs, newest first, persisted under fixed keys.
#[derive(Clone)]
pub struct MessageLog {
    store: Arc<KvStore>,
    logs: Arc<Mutex<Logs>>,
}

impl MessageLog {
    pub fn load(store: Arc<KvStore>) -> Self {
        let mut received: Vec<String> = store.get(RECEIVED_KEY).unwrap_or_default();
        let mut sent: Vec<String> = store.get(SENT_KEY).unwrap_or_default();
        received.truncate(MESSAGE_LOG_CAP);
        sent.truncate(MESSAGE_LOG_CAP);

        Self {
            store,
            logs: Arc::new(Mutex::new(Logs { received, sent })),
        }
    }

    pub fn received(&self) -> Vec<String> {
        self.lock().received.clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    pub fn push_received(&self, entry: impl Into<String>) {
        let snapshot = {
            let mut logs = self.lock();
            prepend_capped(&mut logs.received, entry.into());
            logs.received.clone()
        };
        self.persist(RECEIVED_KEY, &snapshot);
    }

    pub fn push_sent(&self, entry: impl Into<String>) {
        let snapshot = {
            let mut logs = self.lock();
            prepend_capped(&mut logs.sent, entry.into());
            logs.sent.clone()
        };
        self.persist(SENT_KEY, &snapshot);
    }

    pub fn clear_received(&self) {
        self.lock().received.clear();
        if let Err(err) = self.store.remove(RECEIVED_KEY) {
            log::error!("Failed to clear persisted received log: {err:#}");
        }
    }

    fn persist(&self, key: &str, entries: &[String]) {
        if let Err(err) = self.store.set(key, &entries) {
            log::error!("Failed to persist {key}: {err:#}");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Logs> {
        self.logs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn prepend_capped(entries: &mut Vec<String>, entry: String) {
    entries.insert(0, entry);
    entries.truncate(MESSAGE_LOG_CAP);
}
