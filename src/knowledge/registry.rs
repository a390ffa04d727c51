//! Ingest Registry - rusqlite 기반 수집 파일 기록
//!
//! 어떤 파일을 어떤 내용 해시로 수집했는지 기록합니다.
//! 해시가 같으면 재수집을 건너뛰고, 해시가 바뀌면 기존 청크를 교체합니다.
//! 저장 위치: `<data_dir>/registry.db`

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::Serialize;

use super::vector::SourceType;

// ============================================================================
// Types
// ============================================================================

/// 수집된 파일 엔트리
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestedFile {
    pub filename: String,
    pub lender_name: String,
    pub source_type: SourceType,
    /// 파일 내용 SHA-256 (hex)
    pub sha256: String,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

/// 레지스트리 통계
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub file_count: usize,
    pub lender_count: usize,
    pub chunk_count: usize,
    pub last_ingested_at: Option<DateTime<Utc>>,
    pub db_path: PathBuf,
}

// ============================================================================
// IngestRegistry
// ============================================================================

pub struct IngestRegistry {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl IngestRegistry {
    /// 레지스트리 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create registry directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let registry = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        registry.initialize()?;
        Ok(registry)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS ingested_files (
                filename TEXT PRIMARY KEY,
                lender_name TEXT NOT NULL,
                source_type TEXT NOT NULL,
                sha256 TEXT NOT NULL,
                chunk_count INTEGER NOT NULL,
                ingested_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create ingested_files table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_ingested_files_lender ON ingested_files(lender_name)",
            [],
        )
        .context("Failed to create lender index")?;

        tracing::debug!("Ingest registry initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 파일 기록 추가 또는 교체
    pub fn upsert(&self, file: &IngestedFile) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "INSERT OR REPLACE INTO ingested_files
                (filename, lender_name, source_type, sha256, chunk_count, ingested_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                file.filename,
                file.lender_name,
                file.source_type.as_str(),
                file.sha256,
                file.chunk_count as i64,
                file.ingested_at.to_rfc3339(),
            ],
        )
        .context("Failed to upsert ingested file")?;

        Ok(())
    }

    /// 파일명으로 조회
    pub fn get(&self, filename: &str) -> Result<Option<IngestedFile>> {
        let conn = self.lock()?;

        conn.query_row(
            "SELECT filename, lender_name, source_type, sha256, chunk_count, ingested_at
             FROM ingested_files WHERE filename = ?1",
            params![filename],
            row_to_file,
        )
        .optional()
        .context("Failed to query ingested file")
    }

    /// 전체 목록 (대출기관, 파일명 순)
    pub fn list(&self) -> Result<Vec<IngestedFile>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT filename, lender_name, source_type, sha256, chunk_count, ingested_at
             FROM ingested_files
             ORDER BY lender_name, filename",
        )?;

        let rows = stmt.query_map([], row_to_file)?;
        let files = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list ingested files")?;
        Ok(files)
    }

    /// 파일 기록 삭제
    pub fn remove(&self, filename: &str) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "DELETE FROM ingested_files WHERE filename = ?1",
            params![filename],
        )?;
        Ok(rows > 0)
    }

    pub fn stats(&self) -> Result<RegistryStats> {
        let conn = self.lock()?;

        let (file_count, lender_count, chunk_count, last): (i64, i64, i64, Option<String>) = conn
            .query_row(
                "SELECT COUNT(*), COUNT(DISTINCT lender_name),
                        COALESCE(SUM(chunk_count), 0), MAX(ingested_at)
                 FROM ingested_files",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .context("Failed to compute registry stats")?;

        Ok(RegistryStats {
            file_count: file_count as usize,
            lender_count: lender_count as usize,
            chunk_count: chunk_count as usize,
            last_ingested_at: last.map(parse_datetime),
            db_path: self.db_path.clone(),
        })
    }
}

fn row_to_file(row: &Row<'_>) -> rusqlite::Result<IngestedFile> {
    let source_type: String = row.get(2)?;
    Ok(IngestedFile {
        filename: row.get(0)?,
        lender_name: row.get(1)?,
        source_type: SourceType::parse(&source_type).unwrap_or(SourceType::Text),
        sha256: row.get(3)?,
        chunk_count: row.get::<_, i64>(4)? as usize,
        ingested_at: parse_datetime(row.get::<_, String>(5)?),
    })
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================
