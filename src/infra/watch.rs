use notify::event::EventKind;
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::Path;
use std::sync::mpsc::{Receiver, RecvTimeoutError, channel};
use std::time::Duration;
use thiserror::Error;

#[derive(Clone, Debug)]
pub enum WatchSignal {
    Changed,
    Error(String),
}

/// Watches the parent directory of a record file so atomic replaces are seen too.
#[derive(Debug)]
pub struct SourceWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<WatchSignal>,
}

impl SourceWatcher {
    /// Blocks up to `timeout`; `None` on timeout or when the watcher has shut down.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<WatchSignal> {
        match self.rx.recv_timeout(timeout) {
            Ok(signal) => Some(signal),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drops signals queued behind the one already handled.
    pub fn drain(&self) {
        while self.rx.try_recv().is_ok() {}
    }
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("cannot watch {0}: not a file path")]
    NotAFile(String),

    #[error("watch error: {0}")]
    Notify(#[from] notify::Error),
}

pub fn watch_source_file(path: &Path) -> Result<SourceWatcher, WatchError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .ok_or_else(|| WatchError::NotAFile(path.display().to_string()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };

    let (tx, rx) = channel::<WatchSignal>();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                if should_trigger_reload(&event, &file_name) {
                    let _ = tx.send(WatchSignal::Changed);
                }
            }
            Err(error) => {
                let _ = tx.send(WatchSignal::Error(error.to_string()));
            }
        },
        Config::default(),
    )?;

    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    tracing::debug!(dir = %dir.display(), "watching record source");

    Ok(SourceWatcher {
        _watcher: watcher,
        rx,
    })
}

fn should_trigger_reload(event: &notify::Event, file_name: &OsString) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    if event.paths.is_empty() {
        return true;
    }

    event
        .paths
        .iter()
        .any(|path| path.file_name() == Some(file_name.as_os_str()))
}
