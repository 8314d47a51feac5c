//! Wallet access mutex.
//!
//! Serializes every read or derive step against wallet and ledger state.
//! Backed by `tokio::sync::Mutex`, so waiters are served in arrival order.
//! Never hold it across a hardware device call.

use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Clone, Default)]
pub struct WalletAccessMutex {
    inner: Arc<Mutex<()>>,
}

impl WalletAccessMutex {
    pub fn new() -> Self { Self::default() }

    pub async fn lock(&self) -> MutexGuard<'_, ()> { self.inner.lock().await }

    pub fn is_locked(&self) -> bool { self.inner.try_lock().is_err() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "current_thread")]
    async fn test_waiters_served_fifo() {
        let mutex = WalletAccessMutex::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let guard = mutex.lock().await;

        let mut handles = Vec::new();
        for i in 0..4 {
            let (mutex, order) = (mutex.clone(), order.clone());
            handles.push(tokio::spawn(async move {
                let _g = mutex.lock().await;
                order.lock().unwrap().push(i);
            }));
            // Let each task enqueue before the next is spawned.
            tokio::task::yield_now().await;
        }
        assert!(mutex.is_locked());
        drop(guard);
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
        assert!(!mutex.is_locked());
    }
}
