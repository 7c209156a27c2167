//! Scoped folder locks.
//!
//! A [`FolderLock`] holds a process-wide per-folder mutex so two runs against
//! the same account and folder never interleave. Release is idempotent. An
//! awaited [`FolderLock::release`] finishes the release callback before it
//! returns; dropping a held lock hands the callback to the runtime instead,
//! which covers early returns and cancelled futures.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

static GLOBAL: LazyLock<FolderLocks> = LazyLock::new(FolderLocks::default);

/// Registry of per-folder async mutexes, keyed by an account-qualified name.
#[derive(Debug, Default)]
pub struct FolderLocks {
    folders: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FolderLocks {
    /// Registry shared by every session in this process.
    pub fn global() -> &'static FolderLocks {
        &GLOBAL
    }

    /// Wait until no one else holds `key`, then hold it.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut folders = self.folders.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(folders.entry(key.to_string()).or_default())
        };
        mutex.lock_owned().await
    }

    /// Whether `key` is currently held.
    pub fn is_locked(&self, key: &str) -> bool {
        let folders = self.folders.lock().unwrap_or_else(PoisonError::into_inner);
        folders.get(key).is_some_and(|m| m.try_lock().is_err())
    }
}

type Releaser = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Exclusive hold on one folder for the duration of a scan.
pub struct FolderLock {
    folder: String,
    guard: Option<OwnedMutexGuard<()>>,
    on_release: Option<Releaser>,
}

impl FolderLock {
    pub fn new(folder: impl Into<String>, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            folder: folder.into(),
            guard: Some(guard),
            on_release: None,
        }
    }

    /// Run `f` once, when the lock is released. The folder stays locked
    /// until the future it returns completes.
    pub fn on_release<F, Fut>(mut self, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_release = Some(Box::new(move || f().boxed()));
        self
    }

    pub fn is_held(&self) -> bool {
        self.guard.is_some()
    }

    /// Release the folder. Returns `false` if it was already released.
    pub async fn release(&mut self) -> bool {
        let Some(guard) = self.guard.take() else {
            return false;
        };
        if let Some(on_release) = self.on_release.take() {
            on_release().await;
        }
        drop(guard);
        debug!(folder = %self.folder, "Folder lock released");
        true
    }
}

impl Drop for FolderLock {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        let Some(on_release) = self.on_release.take() else {
            debug!(folder = %self.folder, "Folder lock released on drop");
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let folder = self.folder.clone();
                handle.spawn(async move {
                    on_release().await;
                    drop(guard);
                    debug!(%folder, "Folder lock released on drop");
                });
            }
            Err(_) => {
                debug!(folder = %self.folder, "No runtime, folder released without callback");
            }
        }
    }
}

impl std::fmt::Debug for FolderLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderLock")
            .field("folder", &self.folder)
            .field("held", &self.is_held())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn release_is_idempotent() {
        let locks = FolderLocks::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut lock = FolderLock::new("INBOX", locks.acquire("a/INBOX").await).on_release(
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        assert!(lock.is_held());
        assert!(locks.is_locked("a/INBOX"));

        assert!(lock.release().await);
        assert!(!lock.release().await);
        drop(lock);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!locks.is_locked("a/INBOX"));
    }

    #[tokio::test]
    async fn drop_releases() {
        let locks = FolderLocks::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        {
            let _lock = FolderLock::new("INBOX", locks.acquire("a/INBOX").await).on_release(
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
            );
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!locks.is_locked("a/INBOX"));
    }

    #[tokio::test]
    async fn release_waits_for_callback() {
        let locks = Arc::new(FolderLocks::default());
        let done = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&done);

        let mut lock = FolderLock::new("INBOX", locks.acquire("a/INBOX").await).on_release(
            move || async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                flag.fetch_add(1, Ordering::SeqCst);
            },
        );

        // The folder stays locked while the callback runs.
        let watch = Arc::clone(&locks);
        let releasing = tokio::spawn(async move { lock.release().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(watch.is_locked("a/INBOX"));

        assert!(releasing.await.unwrap());
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert!(!locks.is_locked("a/INBOX"));
    }

    #[test]
    fn drop_without_runtime_still_unlocks() {
        let locks = FolderLocks::default();
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let guard = runtime.block_on(locks.acquire("a/INBOX"));
        drop(runtime);

        let lock = FolderLock::new("INBOX", guard).on_release(|| async {});
        assert!(locks.is_locked("a/INBOX"));
        drop(lock);
        assert!(!locks.is_locked("a/INBOX"));
    }

    #[tokio::test]
    async fn same_folder_serialized() {
        let locks = Arc::new(FolderLocks::default());
        let first = FolderLock::new("INBOX", locks.acquire("a/INBOX").await);

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move { locks.acquire("a/INBOX").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // Other folders are independent.
        let _other = locks.acquire("a/Alerts").await;

        drop(first);
        let guard = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should get the lock")
            .unwrap();
        drop(guard);
    }
}
