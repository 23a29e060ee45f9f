//! Filesystem notifications for the spool directory.

use std::path::Path;

use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::warn;

/// Wakes the dispatcher when something may have been added to the spool.
///
/// Notifications carry no data. Each one means "list the directory again",
/// so bursts are coalesced into a single pending wakeup.
pub struct SpoolWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<()>,
}

impl SpoolWatcher {
    /// Starts watching `dir`, which must exist.
    pub fn spawn(dir: &Path) -> notify::Result<Self> {
        let (tx, rx) = mpsc::channel(1);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let wake = match res {
                Ok(event) => is_arrival(&event.kind),
                Err(e) => {
                    warn!(error = %e, "Spool watch error");
                    true
                }
            };
            if wake {
                // Full means a wakeup is already pending.
                let _ = tx.try_send(());
            }
        })?;

        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        Ok(SpoolWatcher {
            _watcher: watcher,
            rx,
        })
    }

    /// Waits for the next wakeup. Returns `false` if the watcher has stopped.
    pub async fn changed(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}

/// Whether an event can mean a new entry appeared.
///
/// Entries appear by link (a create) and some platforms report that as a
/// rename. Removals, which the dispatcher causes itself, do not wake it.
fn is_arrival(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_)) | EventKind::Any | EventKind::Other
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, RemoveKind, RenameMode};
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn arrivals_wake_removals_do_not() {
        assert!(is_arrival(&EventKind::Create(CreateKind::File)));
        assert!(is_arrival(&EventKind::Modify(ModifyKind::Name(RenameMode::To))));
        assert!(!is_arrival(&EventKind::Remove(RemoveKind::File)));
        assert!(!is_arrival(&EventKind::Access(AccessKind::Any)));
    }

    #[tokio::test]
    async fn wakes_on_new_file() {
        let dir = tempdir().unwrap();
        let mut watcher = SpoolWatcher::spawn(dir.path()).unwrap();

        std::fs::write(dir.path().join("codenames-20240101_000000-aaaaaaa"), b"{}").unwrap();

        let woke = tokio::time::timeout(Duration::from_secs(5), watcher.changed()).await;
        assert_eq!(woke.ok(), Some(true));
    }

    #[test]
    fn spawn_fails_for_missing_directory() {
        let dir = tempdir().unwrap();
        assert!(SpoolWatcher::spawn(&dir.path().join("missing")).is_err());
    }
}
