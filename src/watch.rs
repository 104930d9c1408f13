//! Live watch sessions, one per source root.
//!
//! A session owns a `notify` watcher whose callback only forwards raw events
//! into an unbounded channel, so a long copy never stalls the notification
//! thread. [`WatchSession::run`] then drains the channel in arrival order and
//! dispatches each change to the shared [`Mirror`].
//!
//! The native backend subscribes each directory separately, down to the
//! watch depth, so the bound also caps kernel watch descriptors; directories
//! that appear later are subscribed as their creation is seen. The poll
//! backend scans the whole tree and relies on event filtering alone.

use crate::config::{DEFAULT_POLL_INTERVAL, WatchBackend};
use crate::error::{Error, Result};
use crate::mapper::RootBinding;
use crate::mirror::Mirror;
use notify::event::{MetadataKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// What a notification means for the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Source path gained or changed content.
    ///
    /// `created` is false for in-place modifications, which are ignored for
    /// directories (a directory's own mtime moving says nothing new).
    Upsert { path: PathBuf, created: bool },
    /// Source path went away.
    Remove(PathBuf),
    /// Source path was renamed in an unknown direction; resolved against
    /// the filesystem when applied.
    Renamed(PathBuf),
}

impl Change {
    pub fn path(&self) -> &Path {
        match self {
            Self::Upsert { path, .. } | Self::Remove(path) | Self::Renamed(path) => path,
        }
    }
}

/// Map a raw notification onto changes, one per affected path.
pub fn classify(event: &Event) -> Vec<Change> {
    let upsert = |created| -> Vec<Change> {
        event
            .paths
            .iter()
            .map(|path| Change::Upsert {
                path: path.clone(),
                created,
            })
            .collect()
    };

    match event.kind {
        EventKind::Create(_) => upsert(true),
        EventKind::Modify(
            ModifyKind::Any
            | ModifyKind::Data(_)
            | ModifyKind::Metadata(MetadataKind::Any | MetadataKind::WriteTime),
        ) => upsert(false),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => upsert(true),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) | EventKind::Remove(_) => {
            event.paths.iter().cloned().map(Change::Remove).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Any | RenameMode::Other)) => {
            event.paths.iter().cloned().map(Change::Renamed).collect()
        }
        // Both-ended renames arrive again as separate From and To events
        _ => Vec::new(),
    }
}

/// Backend a session ended up running on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveBackend {
    Native,
    Poll(Duration),
    /// Native was requested but could not be set up.
    PollFallback { interval: Duration, reason: String },
}

impl fmt::Display for ActiveBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => f.write_str("native"),
            Self::Poll(interval) => write!(f, "poll every {}ms", interval.as_millis()),
            Self::PollFallback { interval, reason } => write!(
                f,
                "poll every {}ms, native unavailable: {reason}",
                interval.as_millis()
            ),
        }
    }
}

type RawEvent = notify::Result<Event>;

/// Routes changes for one root to the mirror.
#[derive(Debug)]
struct Dispatcher {
    binding: RootBinding,
    mirror: Mirror,
    depth: usize,
}

/// A live subscription for one source root.
pub struct WatchSession {
    dispatcher: Dispatcher,
    backend: ActiveBackend,
    events: mpsc::UnboundedReceiver<RawEvent>,
    watcher: Box<dyn Watcher + Send>,
}

impl fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSession")
            .field("root", &self.dispatcher.binding.source_root())
            .field("depth", &self.dispatcher.depth)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl WatchSession {
    /// Subscribe to changes under `binding`'s root.
    ///
    /// Pre-existing content produces no events. Changes deeper than `depth`
    /// directories below the root are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Watch`] if the root is gone or no backend can watch
    /// it, and [`Error::NotADirectory`] if the root is no longer a directory.
    pub fn start(binding: RootBinding, mirror: Mirror, depth: usize, backend: WatchBackend) -> Result<Self> {
        let root = binding.source_root().to_path_buf();

        // The poll backend only reports a missing root through its event
        // handler, so check up front
        match std::fs::metadata(&root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(Error::NotADirectory(root)),
            Err(e) => {
                return Err(Error::Watch {
                    source: notify::Error::io(e).add_path(root.clone()),
                    path: root,
                });
            }
        }

        let (tx, events) = mpsc::unbounded_channel();

        let (watcher, backend) = match backend {
            WatchBackend::Native => match native_watcher(&root, depth, tx.clone()) {
                Ok(watcher) => (watcher, ActiveBackend::Native),
                Err(e) => {
                    tracing::warn!(root = %root.display(), "native watcher unavailable, polling: {e}");
                    let watcher = poll_watcher(&root, tx, DEFAULT_POLL_INTERVAL)?;
                    let backend = ActiveBackend::PollFallback {
                        interval: DEFAULT_POLL_INTERVAL,
                        reason: e.to_string(),
                    };
                    (watcher, backend)
                }
            },
            WatchBackend::Poll(interval) => (poll_watcher(&root, tx, interval)?, ActiveBackend::Poll(interval)),
        };

        tracing::debug!(root = %root.display(), %backend, depth, "watch session started");
        Ok(Self {
            dispatcher: Dispatcher {
                binding,
                mirror,
                depth,
            },
            backend,
            events,
            watcher,
        })
    }

    pub fn binding(&self) -> &RootBinding {
        &self.dispatcher.binding
    }

    pub fn backend(&self) -> &ActiveBackend {
        &self.backend
    }

    /// Process notifications until the watcher goes away.
    pub async fn run(self) {
        let Self {
            dispatcher,
            backend,
            mut events,
            mut watcher,
        } = self;
        let bounded = backend == ActiveBackend::Native;

        while let Some(raw) = events.recv().await {
            match raw {
                Ok(event) => {
                    tracing::trace!(?event, "notification");
                    for change in classify(&event) {
                        if bounded && matches!(change, Change::Upsert { created: true, .. } | Change::Renamed(_)) {
                            dispatcher.subscribe(&mut *watcher, change.path());
                        }
                        dispatcher.apply(change).await;
                    }
                }
                Err(e) => {
                    dispatcher
                        .mirror
                        .note(&format!(
                            "ERROR watching {}: {e}",
                            dispatcher.binding.source_root().display()
                        ))
                        .await;
                }
            }
        }
    }

    /// Apply one change through the mirror and record the outcome.
    pub async fn apply(&self, change: Change) {
        self.dispatcher.apply(change).await;
    }
}

impl Dispatcher {
    /// Extend a bounded subscription over a directory that just appeared.
    fn subscribe(&self, watcher: &mut dyn Watcher, dir: &Path) {
        if !self.binding.contains(dir) || !dir.is_dir() {
            return;
        }
        let Some(depth) = self.binding.depth_of(dir) else {
            return;
        };
        // Its children would sit at depth + 1
        if depth >= self.depth {
            return;
        }
        if let Err(e) = watch_tree(watcher, dir, self.depth - depth - 1) {
            tracing::warn!(path = %dir.display(), "cannot watch new directory: {e}");
        }
    }

    async fn apply(&self, change: Change) {
        let path = change.path();
        if !self.binding.contains(path) {
            tracing::debug!(path = %path.display(), "ignoring event outside root");
            return;
        }
        if self.mirror.log().is_log_file(path) {
            tracing::trace!(path = %path.display(), "ignoring activity log change");
            return;
        }
        match self.binding.depth_of(path) {
            None => return,
            Some(depth) if depth > self.depth => {
                tracing::debug!(path = %path.display(), depth, "ignoring event beyond watch depth");
                return;
            }
            Some(_) => {}
        }

        let change = match change {
            Change::Renamed(path) => match tokio::fs::symlink_metadata(&path).await {
                Ok(_) => Change::Upsert { path, created: true },
                Err(_) => Change::Remove(path),
            },
            change => change,
        };

        let outcome = match change {
            Change::Upsert { path, created } => {
                match tokio::fs::metadata(&path).await {
                    Ok(meta) if meta.is_dir() && !created => return,
                    Ok(meta) if !meta.is_dir() && !meta.is_file() => {
                        tracing::debug!(path = %path.display(), "skipping special file");
                        return;
                    }
                    // Vanished sources fall through so the failure is recorded
                    _ => self.mirror.replicate(&self.binding, &path).await,
                }
            }
            Change::Remove(path) => self.mirror.retract(&self.binding, &path).await,
            Change::Renamed(_) => return,
        };

        self.mirror.record(&outcome).await;
    }
}

fn forward(tx: mpsc::UnboundedSender<RawEvent>) -> impl FnMut(RawEvent) + Send + 'static {
    move |event| {
        // The receiver only closes when the session is dropped
        let _ = tx.send(event);
    }
}

/// Watch `dir` and its subdirectories `levels` deep, one non-recursive
/// subscription per directory. Directories that vanish meanwhile are skipped.
fn watch_tree(watcher: &mut dyn Watcher, dir: &Path, levels: usize) -> notify::Result<()> {
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    if levels == 0 {
        return Ok(());
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(path = %dir.display(), "cannot list directory to watch: {e}");
            return Ok(());
        }
    };
    for entry in entries.flatten() {
        if !entry.file_type().is_ok_and(|t| t.is_dir()) {
            continue;
        }
        match watch_tree(watcher, &entry.path(), levels - 1) {
            Err(e) if vanished(&e) => {}
            other => other?,
        }
    }
    Ok(())
}

fn vanished(error: &notify::Error) -> bool {
    match &error.kind {
        notify::ErrorKind::PathNotFound => true,
        notify::ErrorKind::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
        _ => false,
    }
}

fn native_watcher(
    root: &Path,
    depth: usize,
    tx: mpsc::UnboundedSender<RawEvent>,
) -> Result<Box<dyn Watcher + Send>> {
    let watch_error = |source| Error::Watch {
        path: root.to_path_buf(),
        source,
    };
    let mut watcher = notify::recommended_watcher(forward(tx)).map_err(watch_error)?;
    watch_tree(&mut watcher, root, depth).map_err(watch_error)?;
    Ok(Box::new(watcher))
}

fn poll_watcher(
    root: &Path,
    tx: mpsc::UnboundedSender<RawEvent>,
    interval: Duration,
) -> Result<Box<dyn Watcher + Send>> {
    let watch_error = |source| Error::Watch {
        path: root.to_path_buf(),
        source,
    };
    let config = notify::Config::default().with_poll_interval(interval);
    let mut watcher = PollWatcher::new(forward(tx), config).map_err(watch_error)?;
    watcher.watch(root, RecursiveMode::Recursive).map_err(watch_error)?;
    Ok(Box::new(watcher))
}
