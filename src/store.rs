use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::aggregate::LostObject;
use crate::report::ReportOutcome;
use crate::settings::VideoAnalysisSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl VideoStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Analysis record for one uploaded video, as shown by the dashboard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoAnalysis {
    pub id: String,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
    pub status: VideoStatus,
    /// 0..=100
    pub progress: u8,
    pub duration_s: f64,
    pub settings: VideoAnalysisSettings,
    /// Detections that passed class and confidence filtering.
    pub detected_objects: usize,
    pub lost_objects: Vec<LostObject>,
    #[serde(default)]
    pub report_outcomes: Vec<ReportOutcome>,
    #[serde(default)]
    pub error: Option<String>,
}

impl VideoAnalysis {
    pub fn new(id: &str, filename: &str, settings: VideoAnalysisSettings) -> Self {
        Self {
            id: id.to_string(),
            filename: filename.to_string(),
            uploaded_at: Utc::now(),
            status: VideoStatus::Queued,
            progress: 0,
            duration_s: 0.0,
            settings,
            detected_objects: 0,
            lost_objects: Vec::new(),
            report_outcomes: Vec::new(),
            error: None,
        }
    }

    /// Drop previous results ahead of a re-run.
    pub fn reset(&mut self) {
        self.status = VideoStatus::Queued;
        self.progress = 0;
        self.detected_objects = 0;
        self.lost_objects.clear();
        self.report_outcomes.clear();
        self.error = None;
    }

    pub fn lost_object_mut(&mut self, object_id: &str) -> Option<&mut LostObject> {
        self.lost_objects.iter_mut().find(|o| o.id == object_id)
    }
}

/// Registry of video analyses shared by concurrent jobs.
pub trait VideoStore: Send + Sync {
    /// Fails when the id already exists.
    fn insert(&self, video: VideoAnalysis) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<VideoAnalysis>>;

    /// Apply `apply` atomically. Returns the updated record, or `None` if it is gone.
    fn update(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut VideoAnalysis),
    ) -> Result<Option<VideoAnalysis>>;

    fn remove(&self, id: &str) -> Result<Option<VideoAnalysis>>;

    /// Newest upload first.
    fn list(&self) -> Result<Vec<VideoAnalysis>>;
}

#[derive(Debug, Default)]
pub struct InMemoryVideoStore {
    videos: Mutex<HashMap<String, VideoAnalysis>>,
}

impl InMemoryVideoStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, VideoAnalysis>>> {
        self.videos
            .lock()
            .map_err(|_| anyhow!("video store lock poisoned"))
    }
}

impl VideoStore for InMemoryVideoStore {
    fn insert(&self, video: VideoAnalysis) -> Result<()> {
        let mut videos = self.lock()?;
        if videos.contains_key(&video.id) {
            return Err(anyhow!("video {} already exists", video.id));
        }
        videos.insert(video.id.clone(), video);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<VideoAnalysis>> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn update(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut VideoAnalysis),
    ) -> Result<Option<VideoAnalysis>> {
        let mut videos = self.lock()?;
        Ok(videos.get_mut(id).map(|video| {
            apply(video);
            video.clone()
        }))
    }

    fn remove(&self, id: &str) -> Result<Option<VideoAnalysis>> {
        Ok(self.lock()?.remove(id))
    }

    fn list(&self) -> Result<Vec<VideoAnalysis>> {
        let mut out: Vec<_> = self.lock()?.values().cloned().collect();
        out.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(out)
    }
}

/// SQLite-backed store. One row per video, record kept as JSON.
pub struct SqliteVideoStore {
    conn: Mutex<Connection>,
}

impl SqliteVideoStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let db_path = if db_path == ":memory:" {
            crate::shared_memory_uri()
        } else {
            db_path.to_string()
        };
        let conn = crate::open_db_connection(&db_path)
            .with_context(|| format!("failed to open video store {}", db_path))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS video_analyses (
              id TEXT PRIMARY KEY,
              uploaded_at INTEGER NOT NULL,
              status TEXT NOT NULL,
              payload_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_videos_uploaded ON video_analyses(uploaded_at);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("video store lock poisoned"))
    }
}

fn status_label(status: VideoStatus) -> Result<String> {
    match serde_json::to_value(status)? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(anyhow!("unexpected status encoding {}", other)),
    }
}

fn decode(payload: &str) -> Result<VideoAnalysis> {
    serde_json::from_str(payload).context("corrupt video record")
}

impl VideoStore for SqliteVideoStore {
    fn insert(&self, video: VideoAnalysis) -> Result<()> {
        let payload_json = serde_json::to_string(&video)?;
        let conn = self.conn()?;
        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO video_analyses(id, uploaded_at, status, payload_json)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                video.id,
                video.uploaded_at.timestamp_millis(),
                status_label(video.status)?,
                payload_json
            ],
        )?;
        if inserted == 0 {
            return Err(anyhow!("video {} already exists", video.id));
        }
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<VideoAnalysis>> {
        let conn = self.conn()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload_json FROM video_analyses WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        payload.as_deref().map(decode).transpose()
    }

    fn update(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut VideoAnalysis),
    ) -> Result<Option<VideoAnalysis>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let payload: Option<String> = tx
            .query_row(
                "SELECT payload_json FROM video_analyses WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(payload) = payload else {
            return Ok(None);
        };
        let mut video = decode(&payload)?;
        apply(&mut video);
        video.id = id.to_string();
        tx.execute(
            "UPDATE video_analyses SET status = ?1, payload_json = ?2 WHERE id = ?3",
            params![
                status_label(video.status)?,
                serde_json::to_string(&video)?,
                id
            ],
        )?;
        tx.commit()?;
        Ok(Some(video))
    }

    fn remove(&self, id: &str) -> Result<Option<VideoAnalysis>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let payload: Option<String> = tx
            .query_row(
                "SELECT payload_json FROM video_analyses WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(payload) = payload else {
            return Ok(None);
        };
        tx.execute("DELETE FROM video_analyses WHERE id = ?1", params![id])?;
        tx.commit()?;
        decode(&payload).map(Some)
    }

    fn list(&self) -> Result<Vec<VideoAnalysis>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT payload_json FROM video_analyses ORDER BY uploaded_at DESC, id DESC",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let payload: String = row.get(0)?;
            out.push(decode(&payload)?);
        }
        Ok(out)
    }
}
