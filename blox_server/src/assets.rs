//! Mesh loading for collision shapes.
//!
//! Fetching a mesh is the one long-running operation the tick depends on.
//! Systems call [`MeshLoader::poll`] every tick; the first call starts a
//! background fetch and later calls pick up the result once it is there.
//! Concurrent requests for one URL share a single fetch and the result is
//! cached for the life of the loader.

use anyhow::Context;
use async_trait::async_trait;
use blox_shared::math::Vec3;
use serde::Deserialize;
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, error};

pub type MeshPoints = Arc<[Vec3]>;

/// Where mesh vertices come from.
#[async_trait]
pub trait MeshSource: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<Vec3>>;
}

#[derive(Debug, Deserialize)]
struct MeshFile {
    vertices: Vec<[f32; 3]>,
}

/// Reads `{"vertices": [[x, y, z], ...]}` JSON files below a root directory.
#[derive(Debug, Clone)]
pub struct FileMeshSource {
    root: PathBuf,
}

impl FileMeshSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl MeshSource for FileMeshSource {
    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<Vec3>> {
        let path = self.root.join(url.trim_start_matches('/'));
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("read mesh {}", path.display()))?;
        let mesh: MeshFile = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse mesh {}", path.display()))?;
        Ok(mesh
            .vertices
            .into_iter()
            .map(|[x, y, z]| Vec3::new(x, y, z))
            .collect())
    }
}

/// In-memory meshes keyed by URL. Counts fetches.
#[derive(Debug, Default)]
pub struct StaticMeshSource {
    meshes: HashMap<String, Vec<Vec3>>,
    fetches: AtomicUsize,
}

impl StaticMeshSource {
    pub fn with_mesh(mut self, url: impl Into<String>, points: Vec<Vec3>) -> Self {
        self.meshes.insert(url.into(), points);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MeshSource for StaticMeshSource {
    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<Vec3>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.meshes
            .get(url)
            .cloned()
            .with_context(|| format!("unknown mesh {url}"))
    }
}

/// The eight corners of a box centered on the origin.
pub fn box_mesh(half: Vec3) -> Vec<Vec3> {
    let mut points = Vec::with_capacity(8);
    for sx in [-1.0, 1.0] {
        for sy in [-1.0, 1.0] {
            for sz in [-1.0, 1.0] {
                points.push(Vec3::new(sx * half.x, sy * half.y, sz * half.z));
            }
        }
    }
    points
}

#[derive(Debug, Clone, PartialEq)]
pub enum MeshStatus {
    Pending,
    Ready(MeshPoints),
    Failed(String),
}

enum MeshEntry {
    Loading(oneshot::Receiver<Result<MeshPoints, String>>),
    Ready(MeshPoints),
    Failed(String),
}

/// Deduplicating, caching front of a [`MeshSource`].
pub struct MeshLoader {
    source: Arc<dyn MeshSource>,
    entries: HashMap<String, MeshEntry>,
}

impl MeshLoader {
    pub fn new(source: Arc<dyn MeshSource>) -> Self {
        Self {
            source,
            entries: HashMap::new(),
        }
    }

    /// Current state of `url`, starting a fetch on first sight.
    pub fn poll(&mut self, url: &str) -> MeshStatus {
        if !self.entries.contains_key(url) {
            let entry = self.start(url);
            let status = Self::status_of(&entry);
            self.entries.insert(url.to_string(), entry);
            return status;
        }
        let Some(entry) = self.entries.get_mut(url) else {
            return MeshStatus::Pending;
        };

        if let MeshEntry::Loading(rx) = entry {
            let resolved = match rx.try_recv() {
                Ok(Ok(points)) => MeshEntry::Ready(points),
                Ok(Err(e)) => MeshEntry::Failed(e),
                Err(TryRecvError::Empty) => return MeshStatus::Pending,
                Err(TryRecvError::Closed) => {
                    MeshEntry::Failed("mesh fetch ended without a result".to_string())
                }
            };
            *entry = resolved;
        }
        Self::status_of(entry)
    }

    /// Fetches still outstanding.
    pub fn in_flight(&self) -> usize {
        self.entries
            .values()
            .filter(|e| matches!(e, MeshEntry::Loading(_)))
            .count()
    }

    fn status_of(entry: &MeshEntry) -> MeshStatus {
        match entry {
            MeshEntry::Loading(_) => MeshStatus::Pending,
            MeshEntry::Ready(p) => MeshStatus::Ready(p.clone()),
            MeshEntry::Failed(e) => MeshStatus::Failed(e.clone()),
        }
    }

    fn start(&self, url: &str) -> MeshEntry {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(%url, "No async runtime to fetch mesh on");
            return MeshEntry::Failed("no async runtime".to_string());
        };
        let (tx, rx) = oneshot::channel();
        let source = self.source.clone();
        let url = url.to_string();
        debug!(%url, "Fetching mesh");
        runtime.spawn(async move {
            let result = source
                .fetch(&url)
                .await
                .map(MeshPoints::from)
                .map_err(|e| format!("{e:#}"));
            // The loader may have been dropped; nothing to report to.
            let _ = tx.send(result);
        });
        MeshEntry::Loading(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetra() -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        ]
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_fetch() {
        let source = Arc::new(StaticMeshSource::default().with_mesh("car.json", tetra()));
        let mut loader = MeshLoader::new(source.clone());

        assert_eq!(loader.poll("car.json"), MeshStatus::Pending);
        assert_eq!(loader.poll("car.json"), MeshStatus::Pending);
        assert_eq!(loader.in_flight(), 1);

        settle().await;
        let MeshStatus::Ready(points) = loader.poll("car.json") else {
            panic!("mesh not ready");
        };
        assert_eq!(points.len(), 4);
        assert!(matches!(loader.poll("car.json"), MeshStatus::Ready(_)));
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(loader.in_flight(), 0);
    }

    #[tokio::test]
    async fn failed_fetch_is_reported_and_cached() {
        let source = Arc::new(StaticMeshSource::default());
        let mut loader = MeshLoader::new(source.clone());
        loader.poll("missing.json");
        settle().await;
        let MeshStatus::Failed(msg) = loader.poll("missing.json") else {
            panic!("expected failure");
        };
        assert!(msg.contains("missing.json"));
        loader.poll("missing.json");
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn file_source_reads_json_vertices() -> anyhow::Result<()> {
        let dir = std::env::temp_dir().join(format!("blox-mesh-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join("rock.json"), r#"{"vertices": [[0,0,0],[1,0,0],[0,1,0],[0,0,1]]}"#)
            .await?;
        let points = FileMeshSource::new(&dir).fetch("/rock.json").await?;
        assert_eq!(points, tetra());
        assert!(FileMeshSource::new(&dir).fetch("nope.json").await.is_err());
        tokio::fs::remove_dir_all(&dir).await?;
        Ok(())
    }

    #[test]
    fn poll_without_runtime_fails_softly() {
        let mut loader = MeshLoader::new(Arc::new(StaticMeshSource::default()));
        assert!(matches!(loader.poll("a.json"), MeshStatus::Failed(_)));
    }
}
