//! In-memory remote tree with scripted failures.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{RemoteEntry, RemoteSession};
use crate::error::{Error, Result};
use crate::types::RemotePath;

/// Failure to inject into a remote call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultKind {
    /// Transport error (retryable)
    Transient,
    /// Path not found (permanent)
    NotFound,
    /// Access denied (permanent)
    PermissionDenied,
    /// The call panics
    Panic,
}

#[derive(Default)]
struct State {
    files: HashMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    list_faults: HashMap<String, (FaultKind, u32)>,
    fetch_faults: HashMap<String, (FaultKind, u32)>,
    remove_faults: HashMap<String, (FaultKind, u32)>,
    fetch_calls: HashMap<String, u32>,
    remove_calls: HashMap<String, u32>,
    list_calls: HashMap<String, u32>,
}

/// Remote server held entirely in memory
///
/// Useful for dry runs of a pipeline configuration and for exercising retry
/// and isolation behavior deterministically.
#[derive(Default)]
pub struct MemoryRemote {
    state: Mutex<State>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl MemoryRemote {
    /// Empty tree containing only `/`
    pub fn new() -> Self {
        let remote = Self::default();
        remote.lock().dirs.insert("/".to_string());
        remote
    }

    /// Delay every list/fetch call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Add a file (and all its parent directories)
    pub fn add_file(&self, path: &str, content: impl Into<Vec<u8>>) -> &Self {
        let mut state = self.lock();
        let mut parent = path;
        while let Some((dir, _)) = parent.rsplit_once('/') {
            let dir = if dir.is_empty() { "/" } else { dir };
            state.dirs.insert(dir.to_string());
            if dir == "/" {
                break;
            }
            parent = dir;
        }
        state.files.insert(path.to_string(), content.into());
        self
    }

    /// Add an empty directory
    pub fn add_dir(&self, path: &str) -> &Self {
        self.lock().dirs.insert(path.trim_end_matches('/').to_string());
        self
    }

    /// Fail the next `times` fetches of `path` with `kind`
    pub fn fail_fetch(&self, path: &str, kind: FaultKind, times: u32) -> &Self {
        self.lock()
            .fetch_faults
            .insert(path.to_string(), (kind, times));
        self
    }

    /// Fail the next `times` listings of `path` with `kind`
    pub fn fail_list(&self, path: &str, kind: FaultKind, times: u32) -> &Self {
        self.lock()
            .list_faults
            .insert(path.to_string(), (kind, times));
        self
    }

    /// Fail the next `times` removals of `path` with `kind`
    pub fn fail_remove(&self, path: &str, kind: FaultKind, times: u32) -> &Self {
        self.lock()
            .remove_faults
            .insert(path.to_string(), (kind, times));
        self
    }

    /// Whether a file currently exists at `path`
    pub fn has_file(&self, path: &str) -> bool {
        self.lock().files.contains_key(path)
    }

    /// Number of remove calls made for `path`
    pub fn remove_calls(&self, path: &str) -> u32 {
        self.lock().remove_calls.get(path).copied().unwrap_or(0)
    }

    /// Number of fetch calls made for `path`
    pub fn fetch_calls(&self, path: &str) -> u32 {
        self.lock().fetch_calls.get(path).copied().unwrap_or(0)
    }

    /// Number of list calls made for `path`
    pub fn list_calls(&self, path: &str) -> u32 {
        self.lock().list_calls.get(path).copied().unwrap_or(0)
    }

    /// Highest number of list/fetch calls observed in flight at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Number of times `close` was called
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Whether the session has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // a panic injected by FaultKind::Panic never holds this lock
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        InFlight(&self.in_flight)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Transport("session is closed".to_string()));
        }
        Ok(())
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Consume one scripted fault for `path`, if any remain
fn take_fault(faults: &mut HashMap<String, (FaultKind, u32)>, path: &str) -> Option<FaultKind> {
    let entry = faults.get_mut(path)?;
    if entry.1 == 0 {
        return None;
    }
    entry.1 -= 1;
    Some(entry.0)
}

fn fault_error(kind: FaultKind, op: &str, path: &str) -> Error {
    match kind {
        FaultKind::Transient => Error::Transport(format!("{op} {path}: connection reset")),
        FaultKind::NotFound => Error::NotFound(path.to_string()),
        FaultKind::PermissionDenied => Error::PermissionDenied(path.to_string()),
        FaultKind::Panic => panic!("injected panic during {op} {path}"),
    }
}

#[async_trait]
impl RemoteSession for MemoryRemote {
    async fn list(&self, path: &RemotePath) -> Result<Vec<RemoteEntry>> {
        let _guard = self.enter().await;
        self.ensure_open()?;

        let dir = path.as_str().trim_end_matches('/');
        let dir = if dir.is_empty() { "/" } else { dir };

        let fault = {
            let mut state = self.lock();
            *state.list_calls.entry(dir.to_string()).or_default() += 1;
            take_fault(&mut state.list_faults, dir)
        };
        if let Some(kind) = fault {
            return Err(fault_error(kind, "list", dir));
        }

        let state = self.lock();
        if !state.dirs.contains(dir) {
            return Err(Error::NotFound(dir.to_string()));
        }

        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{dir}/")
        };
        let is_child = |candidate: &str| {
            candidate
                .strip_prefix(&prefix)
                .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
        };

        let mut entries: Vec<RemoteEntry> = state
            .dirs
            .iter()
            .filter(|d| is_child(d))
            .map(|d| RemoteEntry::dir(d.as_str()))
            .collect();
        entries.extend(
            state
                .files
                .keys()
                .filter(|f| is_child(f))
                .map(|f| RemoteEntry::file(f.as_str())),
        );
        Ok(entries)
    }

    async fn fetch(&self, path: &RemotePath) -> Result<Vec<u8>> {
        let _guard = self.enter().await;
        self.ensure_open()?;

        let fault = {
            let mut state = self.lock();
            *state.fetch_calls.entry(path.as_str().to_string()).or_default() += 1;
            take_fault(&mut state.fetch_faults, path.as_str())
        };
        if let Some(kind) = fault {
            return Err(fault_error(kind, "fetch", path.as_str()));
        }

        self.lock()
            .files
            .get(path.as_str())
            .cloned()
            .ok_or_else(|| Error::NotFound(path.as_str().to_string()))
    }

    async fn remove(&self, path: &RemotePath) -> Result<()> {
        self.ensure_open()?;

        let mut state = self.lock();
        *state.remove_calls.entry(path.as_str().to_string()).or_default() += 1;
        if let Some(kind) = take_fault(&mut state.remove_faults, path.as_str()) {
            drop(state);
            return Err(fault_error(kind, "remove", path.as_str()));
        }

        state
            .files
            .remove(path.as_str())
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(path.as_str().to_string()))
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn paths(entries: &[RemoteEntry]) -> Vec<(String, bool)> {
        let mut out: Vec<_> = entries
            .iter()
            .map(|e| (e.path.as_str().to_string(), e.is_dir))
            .collect();
        out.sort();
        out
    }

    #[tokio::test]
    async fn lists_direct_children_only() {
        let remote = MemoryRemote::new();
        remote
            .add_file("/data/a/rpt1.csv", "x")
            .add_file("/data/a/other.txt", "y")
            .add_file("/data/top.csv", "z");

        let root = remote.list(&RemotePath::new("/data")).await.unwrap();
        assert_eq!(
            paths(&root),
            vec![("/data/a".into(), true), ("/data/top.csv".into(), false)]
        );

        let slash = remote.list(&RemotePath::new("/")).await.unwrap();
        assert_eq!(paths(&slash), vec![("/data".into(), true)]);
    }

    #[tokio::test]
    async fn missing_paths_are_not_found() {
        let remote = MemoryRemote::new();
        assert!(matches!(
            remote.list(&RemotePath::new("/nope")).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            remote.fetch(&RemotePath::new("/nope.csv")).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn scripted_faults_are_consumed_in_order() {
        let remote = MemoryRemote::new();
        remote
            .add_file("/data/a.csv", "content")
            .fail_fetch("/data/a.csv", FaultKind::Transient, 2);
        let path = RemotePath::new("/data/a.csv");

        assert!(matches!(remote.fetch(&path).await, Err(Error::Transport(_))));
        assert!(matches!(remote.fetch(&path).await, Err(Error::Transport(_))));
        assert_eq!(remote.fetch(&path).await.unwrap(), b"content".to_vec());
        assert_eq!(remote.fetch_calls("/data/a.csv"), 3);
    }

    #[tokio::test]
    async fn remove_deletes_once_then_reports_not_found() {
        let remote = MemoryRemote::new();
        remote
            .add_file("/data/a.csv", "content")
            .fail_remove("/data/a.csv", FaultKind::Transient, 1);
        let path = RemotePath::new("/data/a.csv");

        assert!(matches!(remote.remove(&path).await, Err(Error::Transport(_))));
        assert!(remote.has_file("/data/a.csv"));

        remote.remove(&path).await.unwrap();
        assert!(!remote.has_file("/data/a.csv"));
        assert!(matches!(remote.remove(&path).await, Err(Error::NotFound(_))));
        assert_eq!(remote.remove_calls("/data/a.csv"), 3);

        // The parent directory stays listable
        assert!(remote.list(&RemotePath::new("/data")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_session_rejects_calls_and_close_is_idempotent() {
        let remote = MemoryRemote::new();
        remote.add_file("/data/a.csv", "content");
        remote.close().await.unwrap();
        remote.close().await.unwrap();

        assert!(remote.is_closed());
        assert_eq!(remote.close_calls(), 2);
        assert!(matches!(
            remote.fetch(&RemotePath::new("/data/a.csv")).await,
            Err(Error::Transport(_))
        ));
    }
}
