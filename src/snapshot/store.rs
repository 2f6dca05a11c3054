use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::config::{SNAPSHOT_FRESHNESS_SECS, SNAPSHOT_KEEP_PER_KEY, SNAPSHOT_LIST_LIMIT};
use crate::error::{AppError, Result};
use crate::snapshot::artifact::{parse_pattern, SnapshotArtifact, SnapshotName};
use crate::types::now_ms;

/// Timestamp-named snapshot files in one shared directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    export_bin: String,
    freshness: Duration,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, export_bin: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            export_bin: export_bin.into(),
            freshness: Duration::from_secs(SNAPSHOT_FRESHNESS_SECS),
        }
    }

    /// Snapshot file names for the key, newest first, at most ten.
    pub async fn list(&self, league_id: u64, gameweek: u32) -> Result<Vec<String>> {
        let mut names: Vec<SnapshotName> = self
            .scan()
            .await?
            .into_iter()
            .filter(|n| n.key() == (league_id, gameweek))
            .collect();
        names.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        Ok(names
            .into_iter()
            .take(SNAPSHOT_LIST_LIMIT)
            .map(|n| n.file_name())
            .collect())
    }

    /// `list` driven by a `gw{g}-league{l}-*` pattern.
    pub async fn list_pattern(&self, pattern: &str) -> Result<Vec<String>> {
        let (league_id, gameweek) = parse_pattern(pattern).ok_or_else(|| {
            AppError::Validation(format!("pattern must look like gw{{gameweek}}-league{{id}}-*, got {pattern}"))
        })?;
        self.list(league_id, gameweek).await
    }

    pub async fn find_fresh(&self, league_id: u64, gameweek: u32) -> Result<Option<SnapshotArtifact>> {
        self.find_fresh_at(league_id, gameweek, now_ms()).await
    }

    /// First artifact, newest first, whose embedded timestamp is within the freshness
    /// window of `now`. Unreadable files are skipped.
    pub async fn find_fresh_at(
        &self,
        league_id: u64,
        gameweek: u32,
        now: u64,
    ) -> Result<Option<SnapshotArtifact>> {
        let freshness_ms = self.freshness.as_millis() as u64;
        for file_name in self.list(league_id, gameweek).await? {
            let artifact = match self.load(&file_name).await {
                Ok(a) => a,
                Err(e) => {
                    warn!(file = %file_name, "[SNAPSHOT] skipping unreadable artifact: {e}");
                    continue;
                }
            };
            if artifact.is_fresh(now, freshness_ms) {
                debug!(file = %file_name, "[SNAPSHOT] fresh artifact found");
                return Ok(Some(artifact));
            }
        }
        Ok(None)
    }

    pub async fn load(&self, file_name: &str) -> Result<SnapshotArtifact> {
        let bytes = self.read(file_name).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Raw file contents. Names outside the snapshot scheme read as not found.
    pub async fn read(&self, file_name: &str) -> Result<Vec<u8>> {
        if SnapshotName::parse(file_name).is_none() {
            return Err(AppError::NotFound(file_name.to_string()));
        }
        match tokio::fs::read(self.dir.join(file_name)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(file_name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write via a temp file and rename, so readers never see a partial artifact.
    pub async fn write(&self, artifact: &SnapshotArtifact) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let file_name = artifact.name().file_name();
        let tmp = self.dir.join(format!(".{file_name}.tmp"));
        let path = self.dir.join(&file_name);

        tokio::fs::write(&tmp, serde_json::to_vec_pretty(artifact)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        info!(file = %file_name, teams = artifact.metadata.total_teams, "[SNAPSHOT] artifact written");
        Ok(path)
    }

    /// Launch the exporter for the key and return without waiting for it.
    pub fn generate(&self, league_id: u64, gameweek: u32) -> Result<()> {
        let mut child = Command::new(&self.export_bin)
            .arg(league_id.to_string())
            .arg(gameweek.to_string())
            .env("SNAPSHOT_DIR", &self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()?;
        info!(league_id, gameweek, bin = %self.export_bin, "[SNAPSHOT] export started");

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    info!(league_id, gameweek, "[SNAPSHOT] export finished")
                }
                Ok(status) => warn!(league_id, gameweek, %status, "[SNAPSHOT] export exited with failure"),
                Err(e) => error!(league_id, gameweek, "[SNAPSHOT] export wait failed: {e}"),
            }
        });
        Ok(())
    }

    pub async fn cleanup(&self) -> Result<usize> {
        self.cleanup_at(now_ms()).await
    }

    /// Per key, keep the newest two artifacts; delete older ones only once they are
    /// past the freshness window. Returns the number of files deleted.
    pub async fn cleanup_at(&self, now: u64) -> Result<usize> {
        let freshness_ms = self.freshness.as_millis() as u64;
        let mut by_key: HashMap<(u64, u32), Vec<SnapshotName>> = HashMap::new();
        for name in self.scan().await? {
            by_key.entry(name.key()).or_default().push(name);
        }

        let mut deleted = 0;
        for names in by_key.values_mut() {
            names.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
            for name in names.iter().skip(SNAPSHOT_KEEP_PER_KEY) {
                if now.saturating_sub(name.generated_at) <= freshness_ms {
                    continue;
                }
                let file_name = name.file_name();
                match tokio::fs::remove_file(self.dir.join(&file_name)).await {
                    Ok(()) => deleted += 1,
                    Err(e) => warn!(file = %file_name, "[SNAPSHOT] delete failed: {e}"),
                }
            }
        }
        if deleted > 0 {
            info!(deleted, "[SNAPSHOT] cleanup removed old artifacts");
        }
        Ok(deleted)
    }

    /// Every well-named artifact in the directory. A missing directory is empty.
    async fn scan(&self) -> Result<Vec<SnapshotName>> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if let Some(name) = entry.file_name().to_str().and_then(SnapshotName::parse) {
                names.push(name);
            }
        }
        Ok(names)
    }
}
