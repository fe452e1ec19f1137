use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::settings::RecoveryPolicy;

const ARTIFACT_EXTENSION: &str = "mp4";

/// Opaque public handle of an artifact. Backed by a random v4 UUID so it
/// cannot be guessed or enumerated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArtifactId(Uuid);

impl ArtifactId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_simple())
    }
}

impl FromStr for ArtifactId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Clone, Debug)]
pub struct Artifact {
    pub id: ArtifactId,
    pub path: PathBuf,
    pub created_at: OffsetDateTime,
}

impl Artifact {
    pub fn expires_at(&self, ttl: time::Duration) -> OffsetDateTime {
        self.created_at + ttl
    }

    pub fn is_expired(&self, now: OffsetDateTime, ttl: time::Duration) -> bool {
        now - self.created_at > ttl
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Index entries dropped because they outlived the TTL.
    pub expired: usize,
    /// Backing files that could not be deleted; left for the janitor.
    pub failed: usize,
    /// Unindexed stale files deleted from the artifact directory.
    pub orphans: usize,
}

/// Index of generated artifacts. The store owns every file it has indexed;
/// nothing else may modify or delete them.
#[derive(Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    ttl: time::Duration,
    index: Arc<RwLock<HashMap<ArtifactId, Artifact>>>,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl: time::Duration::seconds(ttl.as_secs() as i64),
            index: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn ttl(&self) -> time::Duration {
        self.ttl
    }

    fn path_for(&self, id: &ArtifactId) -> PathBuf {
        self.dir.join(format!("{id}.{ARTIFACT_EXTENSION}"))
    }

    /// Takes ownership of the file at `location`: moves it into the artifact
    /// directory under a fresh identifier and indexes it.
    pub async fn put(&self, location: &Path) -> io::Result<Artifact> {
        let id = ArtifactId::generate();
        let path = self.path_for(&id);
        move_file(location, &path).await?;

        let artifact = Artifact {
            id,
            path,
            created_at: OffsetDateTime::now_utc(),
        };
        self.index.write().await.insert(id, artifact.clone());

        info!(artifact_id = %id, "Artifact registered");
        Ok(artifact)
    }

    /// Resolves an identifier. Expired entries are reported as absent even
    /// if the sweeper has not reached them yet.
    pub async fn get(&self, id: &ArtifactId) -> Option<Artifact> {
        let index = self.index.read().await;
        index
            .get(id)
            .filter(|a| !a.is_expired(OffsetDateTime::now_utc(), self.ttl))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    /// Evicts every artifact older than the TTL, then reaps stale files that
    /// are not in the index.
    pub async fn sweep(&self, now: OffsetDateTime) -> SweepReport {
        let mut expired = Vec::new();
        {
            let mut index = self.index.write().await;
            index.retain(|_, artifact| {
                if artifact.is_expired(now, self.ttl) {
                    expired.push(artifact.clone());
                    false
                } else {
                    true
                }
            });
        }

        let mut report = SweepReport {
            expired: expired.len(),
            ..SweepReport::default()
        };

        // Entries are already gone from the index, so no reader can resolve
        // a file that is being deleted.
        for artifact in expired {
            match fs::remove_file(&artifact.path).await {
                Ok(()) => debug!(artifact_id = %artifact.id, "Artifact expired"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    error!(artifact_id = %artifact.id, "Failed to delete expired artifact: {}", e);
                    report.failed += 1;
                }
            }
        }

        match self.reap_orphans(now).await {
            Ok(count) => report.orphans = count,
            Err(e) => error!("Failed to scan {}: {}", self.dir.display(), e),
        }

        report
    }

    async fn reap_orphans(&self, now: OffsetDateTime) -> io::Result<usize> {
        let mut reaped = 0;
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if let Some(id) = parse_artifact_name(&path) {
                if self.index.read().await.contains_key(&id) {
                    continue;
                }
            }

            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let modified = match metadata.modified() {
                Ok(t) => OffsetDateTime::from(t),
                Err(_) => continue,
            };
            if now - modified <= self.ttl {
                continue;
            }

            match fs::remove_file(&path).await {
                Ok(()) => {
                    warn!(path = %path.display(), "Removed orphaned artifact file");
                    reaped += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => error!(path = %path.display(), "Failed to remove orphan: {}", e),
            }
        }

        Ok(reaped)
    }

    /// Applies the startup policy to files left over from a previous process.
    /// Returns the number of artifacts re-indexed (always 0 for `Discard`).
    pub async fn recover(&self, policy: RecoveryPolicy) -> io::Result<usize> {
        fs::create_dir_all(&self.dir).await?;

        let mut recovered = 0;
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut index = self.index.write().await;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }

            match policy {
                RecoveryPolicy::Discard => {
                    if let Err(e) = fs::remove_file(&path).await {
                        warn!(path = %path.display(), "Failed to discard artifact: {}", e);
                    }
                }
                RecoveryPolicy::Rebuild => {
                    let Some(id) = parse_artifact_name(&path) else {
                        continue;
                    };
                    let created_at = metadata
                        .modified()
                        .map(OffsetDateTime::from)
                        .unwrap_or_else(|_| OffsetDateTime::now_utc());
                    index.insert(id, Artifact { id, path, created_at });
                    recovered += 1;
                }
            }
        }

        info!(?policy, recovered, "Artifact directory recovered");
        Ok(recovered)
    }
}

fn parse_artifact_name(path: &Path) -> Option<ArtifactId> {
    if path.extension()? != ARTIFACT_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// Rename, falling back to copy + delete when the upload and artifact
/// directories live on different filesystems.
async fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!("Cross-device move {} -> {}", src.display(), dst.display());
            let staging = dst.with_extension("partial");
            fs::copy(src, &staging).await?;
            fs::rename(&staging, dst).await?;
            fs::remove_file(src).await
        }
        Err(e) => Err(e),
    }
}
