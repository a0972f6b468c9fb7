//! Persisted retrieval index lifecycle.
//!
//! The index for a guideline document lives in a directory named after the
//! document's base name, under `[index].dir`:
//!
//! ```text
//! <dir>/<stem>/index.sqlite   chunk texts + embedding vectors
//! <dir>/<stem>/meta.json      build metadata; written last, marks validity
//! ```
//!
//! [`RetrievalIndex::ensure`] loads the persisted index when both files
//! exist and builds it otherwise. Loading performs no embedding calls.
//! Builds are staged through a temporary
//! database file and `meta.json` is written only after the rename, so a
//! failed build never leaves a directory a later run would treat as valid.
//!
//! Once constructed the index is read-only; the server shares it across
//! handlers as an `Arc<RetrievalIndex>`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

use crate::chunk;
use crate::config::Config;
use crate::embedding;
use crate::error::{AssistError, AssistResult};
use crate::models::ScoredChunk;

const DB_FILE: &str = "index.sqlite";
const DB_TMP_FILE: &str = "index.sqlite.tmp";
const META_FILE: &str = "meta.json";

/// Build metadata persisted beside the database. Its presence marks the
/// index as complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub source_path: PathBuf,
    /// SHA-256 of the source document at build time.
    pub source_hash: String,
    pub embedding_model: String,
    pub dims: usize,
    pub chunk_count: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A ready-to-query index over one guideline document.
pub struct RetrievalIndex {
    pool: SqlitePool,
    meta: IndexMeta,
    embedding: crate::config::EmbeddingConfig,
    dir: PathBuf,
}

/// Directory holding the persisted index for the configured source document,
/// named after the document's base name.
pub fn index_dir(config: &Config) -> PathBuf {
    let stem = config
        .guidelines
        .source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "index".to_string());
    config.index.dir.join(stem)
}

impl RetrievalIndex {
    /// Load the persisted index if present (and fresh, per policy),
    /// otherwise build and persist it.
    pub async fn ensure(config: &Config) -> AssistResult<Self> {
        let dir = index_dir(config);
        let db_path = dir.join(DB_FILE);
        let meta_path = dir.join(META_FILE);

        if db_path.exists() && meta_path.exists() {
            let meta = read_meta(&meta_path)?;

            if config.index.freshness == "checksum" {
                let current = hash_file(&config.guidelines.source).map_err(AssistError::Storage)?;
                if current != meta.source_hash {
                    info!(
                        dir = %dir.display(),
                        "source document changed, rebuilding index"
                    );
                    return Self::build(config, &dir).await;
                }
            }

            info!(dir = %dir.display(), chunks = meta.chunk_count, "loading persisted index");
            return Self::open(config, &dir, meta).await;
        }

        Self::build(config, &dir).await
    }

    /// Delete any persisted index and build from scratch.
    pub async fn rebuild(config: &Config) -> AssistResult<Self> {
        let dir = index_dir(config);
        for file in [
            DB_FILE,
            META_FILE,
            DB_TMP_FILE,
            "index.sqlite-wal",
            "index.sqlite-shm",
            "index.sqlite.tmp-wal",
            "index.sqlite.tmp-shm",
            "index.sqlite.tmp-journal",
        ] {
            let path = dir.join(file);
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))
                    .map_err(AssistError::Storage)?;
            }
        }
        Self::build(config, &dir).await
    }

    /// Open an already-persisted index. Issues no embedding calls.
    async fn open(config: &Config, dir: &Path, meta: IndexMeta) -> AssistResult<Self> {
        if config.embedding.is_enabled() {
            let configured_dims = config.embedding.dims.unwrap_or(0);
            if configured_dims != meta.dims {
                warn!(
                    index = meta.dims,
                    configured = configured_dims,
                    "embedding dims differ from the persisted index; \
                     queries will not match unless the same model is used"
                );
            }
        }

        let pool = connect(&dir.join(DB_FILE), false, SqliteJournalMode::Wal)
            .await
            .map_err(AssistError::Storage)?;

        Ok(Self {
            pool,
            meta,
            embedding: config.embedding.clone(),
            dir: dir.to_path_buf(),
        })
    }

    /// Read the source document, chunk it, embed every chunk, and persist.
    async fn build(config: &Config, dir: &Path) -> AssistResult<Self> {
        let source = &config.guidelines.source;
        let text = std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read source document: {}", source.display()))
            .map_err(AssistError::Storage)?;
        let source_hash = hash_file(source).map_err(AssistError::Storage)?;

        let chunks = chunk::chunk_text(&text, config.index.chunk_size, config.index.chunk_overlap);
        info!(
            source = %source.display(),
            chunks = chunks.len(),
            "building retrieval index"
        );

        let provider =
            embedding::create_provider(&config.embedding).map_err(AssistError::EmbeddingService)?;

        // Embed everything before touching the filesystem, so an embedding
        // failure leaves no trace on disk.
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        for batch in texts.chunks(config.embedding.batch_size) {
            let batch_vectors =
                embedding::embed_texts(provider.as_ref(), &config.embedding, batch)
                    .await
                    .map_err(AssistError::EmbeddingService)?;
            vectors.extend(batch_vectors);
        }

        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index directory: {}", dir.display()))
            .map_err(AssistError::Storage)?;

        let tmp_path = dir.join(DB_TMP_FILE);
        let db_path = dir.join(DB_FILE);

        let write_result = write_database(&tmp_path, &chunks, &vectors).await;
        if let Err(e) = write_result {
            let _ = std::fs::remove_file(&tmp_path);
            let _ = std::fs::remove_file(dir.join("index.sqlite.tmp-journal"));
            return Err(AssistError::Storage(e));
        }

        std::fs::rename(&tmp_path, &db_path)
            .with_context(|| format!("Failed to move index into place: {}", db_path.display()))
            .map_err(AssistError::Storage)?;

        // Verify the renamed database before marking the index valid.
        let pool = connect(&db_path, false, SqliteJournalMode::Wal)
            .await
            .map_err(AssistError::Storage)?;
        let stored: i64 = match sqlx::query_scalar("SELECT count(*) FROM chunks")
            .fetch_one(&pool)
            .await
        {
            Ok(n) => n,
            Err(e) => {
                let _ = std::fs::remove_file(&db_path);
                return Err(AssistError::Storage(
                    anyhow::Error::new(e).context("Persisted index is not readable"),
                ));
            }
        };
        if stored as usize != chunks.len() {
            let _ = std::fs::remove_file(&db_path);
            return Err(AssistError::Storage(anyhow::anyhow!(
                "Persisted index holds {} chunks, expected {}",
                stored,
                chunks.len()
            )));
        }

        let meta = IndexMeta {
            source_path: source.clone(),
            source_hash,
            embedding_model: provider.model_name().to_string(),
            dims: provider.dims(),
            chunk_count: chunks.len(),
            chunk_size: config.index.chunk_size,
            chunk_overlap: config.index.chunk_overlap,
            created_at: chrono::Utc::now(),
        };

        // The marker goes last: a directory without meta.json is rebuilt.
        let meta_json =
            serde_json::to_string_pretty(&meta).context("Failed to serialize index metadata");
        let meta_json = match meta_json {
            Ok(j) => j,
            Err(e) => {
                let _ = std::fs::remove_file(&db_path);
                return Err(AssistError::Storage(e));
            }
        };
        if let Err(e) = std::fs::write(dir.join(META_FILE), meta_json) {
            let _ = std::fs::remove_file(&db_path);
            return Err(AssistError::Storage(
                anyhow::Error::new(e).context("Failed to write index metadata"),
            ));
        }

        info!(dir = %dir.display(), chunks = meta.chunk_count, "index persisted");

        Ok(Self {
            pool,
            meta,
            embedding: config.embedding.clone(),
            dir: dir.to_path_buf(),
        })
    }

    /// Embed `query` and return the `k` nearest chunks, nearest first.
    /// An empty index yields an empty result.
    pub async fn search(&self, query: &str, k: usize) -> AssistResult<Vec<ScoredChunk>> {
        let provider =
            embedding::create_provider(&self.embedding).map_err(AssistError::EmbeddingService)?;
        let query_vec = embedding::embed_query(provider.as_ref(), &self.embedding, query)
            .await
            .map_err(AssistError::EmbeddingService)?;

        let rows = sqlx::query(
            r#"
            SELECT c.chunk_index, c.text, v.embedding
            FROM chunks c
            JOIN chunk_vectors v ON v.chunk_id = c.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AssistError::Storage(e.into()))?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = embedding::blob_to_vec(&blob);
                let similarity = embedding::cosine_similarity(&query_vec, &vec) as f64;
                ScoredChunk {
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    score: similarity,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        Ok(scored)
    }

    /// Retrieve the top-k chunk texts joined with a line break, nearest
    /// first. This is the grounding context block for a generation prompt.
    pub async fn search_context(&self, query: &str, k: usize) -> AssistResult<String> {
        let results = self.search(query, k).await?;
        Ok(results
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn chunk_count(&self) -> usize {
        self.meta.chunk_count
    }

    pub fn location(&self) -> &Path {
        &self.dir
    }
}

async fn connect(db_path: &Path, create: bool, journal: SqliteJournalMode) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(create)
        .journal_mode(journal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create the database at `path` and insert all chunks and vectors in one
/// transaction. The pool is closed before returning so the file can be
/// renamed. The rollback journal (not WAL) keeps every committed page in the
/// main file; a WAL-mode stage can still hold the data in a `-wal` sidecar
/// when the pool reports closed, and the renamed file would be empty.
async fn write_database(
    path: &Path,
    chunks: &[crate::models::Chunk],
    vectors: &[Vec<f32>],
) -> Result<()> {
    let pool = connect(path, true, SqliteJournalMode::Delete).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            chunk_index INTEGER NOT NULL UNIQUE,
            text TEXT NOT NULL,
            hash TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id TEXT PRIMARY KEY,
            embedding BLOB NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    let mut tx = pool.begin().await?;

    for (c, vec) in chunks.iter().zip(vectors.iter()) {
        sqlx::query("INSERT INTO chunks (id, chunk_index, text, hash) VALUES (?, ?, ?, ?)")
            .bind(&c.id)
            .bind(c.chunk_index)
            .bind(&c.text)
            .bind(&c.hash)
            .execute(&mut *tx)
            .await?;

        let blob = embedding::vec_to_blob(vec);
        sqlx::query("INSERT INTO chunk_vectors (chunk_id, embedding) VALUES (?, ?)")
            .bind(&c.id)
            .bind(blob)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    pool.close().await;

    Ok(())
}

fn read_meta(path: &Path) -> AssistResult<IndexMeta> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read index metadata: {}", path.display()))
        .map_err(AssistError::Storage)?;
    serde_json::from_str(&content)
        .with_context(|| format!("Corrupt index metadata: {}", path.display()))
        .map_err(AssistError::Storage)
}

fn hash_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read source document: {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        Config, EmbeddingConfig, GenerationConfig, GuidelinesConfig, IndexConfig, RetrievalConfig,
        ServerConfig,
    };

    fn test_config(root: &Path, provider: &str) -> Config {
        Config {
            guidelines: GuidelinesConfig {
                source: root.join("guide.txt"),
            },
            index: IndexConfig {
                dir: root.join("data"),
                chunk_size: 120,
                chunk_overlap: 30,
                freshness: "trust".to_string(),
            },
            embedding: EmbeddingConfig {
                provider: provider.to_string(),
                model: None,
                dims: Some(64),
                url: None,
                batch_size: 8,
                max_retries: 0,
                timeout_secs: 5,
            },
            generation: GenerationConfig::default(),
            retrieval: RetrievalConfig::default(),
            server: ServerConfig::default(),
        }
    }

    fn guideline_text() -> String {
        [
            "Every image element must carry alternative text describing its content.",
            "Form controls require programmatically associated label elements.",
            "Data tables should mark header cells so screen readers can announce them.",
            "Color alone must not convey information; provide a textual cue as well.",
            "Provide captions and transcripts for prerecorded audio and video media.",
        ]
        .join("\n\n")
    }

    #[tokio::test]
    async fn test_build_then_reload_without_embedding_calls() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = test_config(tmp.path(), "hash");
        std::fs::write(&cfg.guidelines.source, guideline_text()).unwrap();

        let built = RetrievalIndex::ensure(&cfg).await.unwrap();
        let count = built.chunk_count();
        assert!(count > 1);
        drop(built);

        // Reopening with the embedding provider disabled must still succeed:
        // the load path never calls the embedding service.
        let mut cold = test_config(tmp.path(), "disabled");
        cold.embedding.dims = None;
        let loaded = RetrievalIndex::ensure(&cold).await.unwrap();
        assert_eq!(loaded.chunk_count(), count);
    }

    #[tokio::test]
    async fn test_trust_policy_ignores_source_changes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = test_config(tmp.path(), "hash");
        std::fs::write(&cfg.guidelines.source, guideline_text()).unwrap();

        let built = RetrievalIndex::ensure(&cfg).await.unwrap();
        let original_hash = built.meta().source_hash.clone();
        drop(built);

        std::fs::write(&cfg.guidelines.source, "Entirely new document.").unwrap();
        let reloaded = RetrievalIndex::ensure(&cfg).await.unwrap();
        assert_eq!(reloaded.meta().source_hash, original_hash);
    }

    #[tokio::test]
    async fn test_checksum_policy_rebuilds_on_source_change() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut cfg = test_config(tmp.path(), "hash");
        cfg.index.freshness = "checksum".to_string();
        std::fs::write(&cfg.guidelines.source, guideline_text()).unwrap();

        let built = RetrievalIndex::ensure(&cfg).await.unwrap();
        let original_hash = built.meta().source_hash.clone();
        drop(built);

        std::fs::write(
            &cfg.guidelines.source,
            "Entirely new guideline document, much shorter.",
        )
        .unwrap();
        let rebuilt = RetrievalIndex::ensure(&cfg).await.unwrap();
        assert_ne!(rebuilt.meta().source_hash, original_hash);
        assert_eq!(rebuilt.chunk_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_build_leaves_no_valid_index() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = test_config(tmp.path(), "disabled");
        std::fs::write(&cfg.guidelines.source, guideline_text()).unwrap();

        let result = RetrievalIndex::ensure(&cfg).await;
        assert!(matches!(result, Err(AssistError::EmbeddingService(_))));

        let dir = index_dir(&cfg);
        assert!(!dir.join(META_FILE).exists());
        assert!(!dir.join(DB_FILE).exists());
        assert!(!dir.join(DB_TMP_FILE).exists());

        // A later run with a working provider builds cleanly.
        let cfg = test_config(tmp.path(), "hash");
        let built = RetrievalIndex::ensure(&cfg).await.unwrap();
        assert!(built.chunk_count() > 0);
    }

    #[tokio::test]
    async fn test_search_returns_at_most_k_in_decreasing_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = test_config(tmp.path(), "hash");
        std::fs::write(&cfg.guidelines.source, guideline_text()).unwrap();

        let index = RetrievalIndex::ensure(&cfg).await.unwrap();
        let results = index
            .search("alternative text for image elements", 3)
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert!(results.len() <= 3);
        for window in results.windows(2) {
            assert!(
                window[0].score >= window[1].score,
                "results not ordered by decreasing similarity"
            );
        }
        assert!(results[0].text.contains("alternative text"));
    }

    #[tokio::test]
    async fn test_search_context_joins_nearest_first() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = test_config(tmp.path(), "hash");
        std::fs::write(&cfg.guidelines.source, guideline_text()).unwrap();

        let index = RetrievalIndex::ensure(&cfg).await.unwrap();
        let query = "label elements for form controls";
        let results = index.search(query, 2).await.unwrap();
        let context = index.search_context(query, 2).await.unwrap();

        assert!(context.contains("label"));
        // Nearest chunk comes first in the joined context.
        assert!(context.starts_with(&results[0].text));
        assert_eq!(
            context,
            results
                .iter()
                .map(|r| r.text.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        );
    }

    #[tokio::test]
    async fn test_build_persists_all_data_in_main_database_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = test_config(tmp.path(), "hash");
        std::fs::write(&cfg.guidelines.source, guideline_text()).unwrap();

        let index = RetrievalIndex::ensure(&cfg).await.unwrap();
        let dir = index_dir(&cfg);

        // No staging artifacts remain and the main file carries the data.
        assert!(!dir.join(DB_TMP_FILE).exists());
        assert!(!dir.join("index.sqlite.tmp-wal").exists());
        assert!(!dir.join("index.sqlite.tmp-shm").exists());
        let size = std::fs::metadata(dir.join(DB_FILE)).unwrap().len();
        assert!(size > 0, "main database file is empty");

        // Search must work in the same process, right after the build.
        let results = index.search("alternative text", 3).await.unwrap();
        assert!(!results.is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_clears_stale_staging_sidecars() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = test_config(tmp.path(), "hash");
        std::fs::write(&cfg.guidelines.source, guideline_text()).unwrap();

        let first = RetrievalIndex::ensure(&cfg).await.unwrap();
        drop(first);

        // Orphans from an interrupted earlier build must not survive.
        let dir = index_dir(&cfg);
        std::fs::write(dir.join("index.sqlite.tmp-wal"), b"stale").unwrap();
        std::fs::write(dir.join("index.sqlite.tmp-shm"), b"stale").unwrap();

        let rebuilt = RetrievalIndex::rebuild(&cfg).await.unwrap();
        assert!(!dir.join("index.sqlite.tmp-wal").exists());
        assert!(!dir.join("index.sqlite.tmp-shm").exists());

        let results = rebuilt.search("label elements", 2).await.unwrap();
        assert!(!results.is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_replaces_index() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = test_config(tmp.path(), "hash");
        std::fs::write(&cfg.guidelines.source, guideline_text()).unwrap();

        let first = RetrievalIndex::ensure(&cfg).await.unwrap();
        let first_created = first.meta().created_at;
        drop(first);

        std::fs::write(&cfg.guidelines.source, "One short replacement line.").unwrap();
        let rebuilt = RetrievalIndex::rebuild(&cfg).await.unwrap();
        assert_eq!(rebuilt.chunk_count(), 1);
        assert!(rebuilt.meta().created_at >= first_created);
    }

    #[test]
    fn test_index_dir_named_after_source_stem() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = test_config(tmp.path(), "hash");
        let dir = index_dir(&cfg);
        assert_eq!(dir, tmp.path().join("data").join("guide"));
    }
}
