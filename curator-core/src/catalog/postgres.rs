use async_trait::async_trait;
use curator_model::{
    ItemKind, LibraryItem, LibraryItemId, MediaFile, MediaFileId, MediaInfo, Quality,
    RootFolder, RootFolderId,
};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::path::{MAIN_SEPARATOR, Path, PathBuf};
use uuid::Uuid;

use super::ports::{LibraryItemRepository, MediaFileRepository, RootFolderRepository};
use crate::error::{MediaError, Result};

const MEDIA_FILE_COLUMNS: &str = r#"
    id, item_id, path, relative_path, size, date_added, modified,
    scene_name, release_group, quality_name, quality_revision, media_info, matched
"#;

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Prefix that matches paths strictly below `base`.
fn base_prefix(base: &Path) -> String {
    let mut prefix = path_text(base);
    if !prefix.ends_with(MAIN_SEPARATOR) {
        prefix.push(MAIN_SEPARATOR);
    }
    prefix
}

fn map_write_error(context: &str, err: sqlx::Error) -> MediaError {
    if let sqlx::Error::Database(db) = &err
        && db.is_unique_violation()
    {
        return MediaError::Conflict(format!("{context}: {db}"));
    }
    MediaError::Internal(format!("{context}: {err}"))
}

fn media_file_from_row(row: &PgRow) -> Result<MediaFile> {
    let media_info: Option<Json<MediaInfo>> = row.try_get("media_info")?;
    Ok(MediaFile {
        id: MediaFileId(row.try_get("id")?),
        item_id: LibraryItemId(row.try_get("item_id")?),
        path: PathBuf::from(row.try_get::<String, _>("path")?),
        relative_path: PathBuf::from(row.try_get::<String, _>("relative_path")?),
        size: row.try_get::<i64, _>("size")?.max(0) as u64,
        date_added: row.try_get("date_added")?,
        modified: row.try_get("modified")?,
        scene_name: row.try_get("scene_name")?,
        release_group: row.try_get("release_group")?,
        quality: Quality::new(
            row.try_get::<String, _>("quality_name")?,
            row.try_get::<i32, _>("quality_revision")?.max(0) as u32,
        ),
        media_info: media_info.map(|Json(info)| info),
        matched: row.try_get("matched")?,
    })
}

#[derive(Clone, Debug)]
pub struct PostgresMediaFileRepository {
    pool: PgPool,
}

impl PostgresMediaFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_with<'e, E>(executor: E, file: &MediaFile) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        let sql = format!(
            "INSERT INTO media_files ({MEDIA_FILE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        );
        sqlx::query(&sql)
            .bind(file.id.as_uuid())
            .bind(file.item_id.as_uuid())
            .bind(path_text(&file.path))
            .bind(path_text(&file.relative_path))
            .bind(file.size as i64)
            .bind(file.date_added)
            .bind(file.modified)
            .bind(&file.scene_name)
            .bind(&file.release_group)
            .bind(&file.quality.name)
            .bind(file.quality.revision as i32)
            .bind(file.media_info.as_ref().map(Json))
            .bind(file.matched)
            .execute(executor)
            .await
            .map_err(|e| map_write_error("Failed to insert media file", e))?;
        Ok(())
    }

    async fn update_with<'e, E>(executor: E, file: &MediaFile) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE media_files SET
                item_id = $2,
                path = $3,
                relative_path = $4,
                size = $5,
                modified = $6,
                scene_name = $7,
                release_group = $8,
                quality_name = $9,
                quality_revision = $10,
                media_info = $11,
                matched = $12
            WHERE id = $1
            "#,
        )
        .bind(file.id.as_uuid())
        .bind(file.item_id.as_uuid())
        .bind(path_text(&file.path))
        .bind(path_text(&file.relative_path))
        .bind(file.size as i64)
        .bind(file.modified)
        .bind(&file.scene_name)
        .bind(&file.release_group)
        .bind(&file.quality.name)
        .bind(file.quality.revision as i32)
        .bind(file.media_info.as_ref().map(Json))
        .bind(file.matched)
        .execute(executor)
        .await
        .map_err(|e| map_write_error("Failed to update media file", e))?;

        if result.rows_affected() == 0 {
            return Err(MediaError::NotFound(format!("media file {}", file.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaFileRepository for PostgresMediaFileRepository {
    async fn insert(&self, file: &MediaFile) -> Result<()> {
        Self::insert_with(self.pool(), file).await
    }

    async fn insert_many(&self, files: &[MediaFile]) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        for file in files {
            Self::insert_with(&mut *tx, file).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update(&self, file: &MediaFile) -> Result<()> {
        Self::update_with(self.pool(), file).await
    }

    async fn update_many(&self, files: &[MediaFile]) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        for file in files {
            Self::update_with(&mut *tx, file).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: MediaFileId) -> Result<()> {
        sqlx::query("DELETE FROM media_files WHERE id = $1")
            .bind(id.as_uuid())
            .execute(self.pool())
            .await
            .map_err(|e| MediaError::Internal(format!("Failed to delete media file: {}", e)))?;
        Ok(())
    }

    async fn delete_many(&self, ids: &[MediaFileId]) -> Result<()> {
        let ids: Vec<Uuid> = ids.iter().map(MediaFileId::to_uuid).collect();
        sqlx::query("DELETE FROM media_files WHERE id = ANY($1)")
            .bind(&ids)
            .execute(self.pool())
            .await
            .map_err(|e| MediaError::Internal(format!("Failed to delete media files: {}", e)))?;
        Ok(())
    }

    async fn get(&self, id: MediaFileId) -> Result<Option<MediaFile>> {
        let sql = format!("SELECT {MEDIA_FILE_COLUMNS} FROM media_files WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(|e| MediaError::Internal(format!("Database query failed: {}", e)))?;
        row.as_ref().map(media_file_from_row).transpose()
    }

    async fn get_many(&self, ids: &[MediaFileId]) -> Result<Vec<MediaFile>> {
        let ids: Vec<Uuid> = ids.iter().map(MediaFileId::to_uuid).collect();
        let sql = format!("SELECT {MEDIA_FILE_COLUMNS} FROM media_files WHERE id = ANY($1)");
        let rows = sqlx::query(&sql)
            .bind(&ids)
            .fetch_all(self.pool())
            .await
            .map_err(|e| MediaError::Internal(format!("Database query failed: {}", e)))?;
        rows.iter().map(media_file_from_row).collect()
    }

    async fn files_for_item(&self, item_id: LibraryItemId) -> Result<Vec<MediaFile>> {
        let sql = format!(
            "SELECT {MEDIA_FILE_COLUMNS} FROM media_files WHERE item_id = $1 ORDER BY path"
        );
        let rows = sqlx::query(&sql)
            .bind(item_id.as_uuid())
            .fetch_all(self.pool())
            .await
            .map_err(|e| MediaError::Internal(format!("Database query failed: {}", e)))?;
        rows.iter().map(media_file_from_row).collect()
    }

    async fn files_with_base_path(&self, base: &Path) -> Result<Vec<MediaFile>> {
        let sql = format!(
            "SELECT {MEDIA_FILE_COLUMNS} FROM media_files WHERE starts_with(path, $1) ORDER BY path"
        );
        let rows = sqlx::query(&sql)
            .bind(base_prefix(base))
            .fetch_all(self.pool())
            .await
            .map_err(|e| MediaError::Internal(format!("Database query failed: {}", e)))?;
        rows.iter().map(media_file_from_row).collect()
    }

    async fn file_with_path(&self, path: &Path) -> Result<Option<MediaFile>> {
        let sql = format!("SELECT {MEDIA_FILE_COLUMNS} FROM media_files WHERE path = $1");
        let row = sqlx::query(&sql)
            .bind(path_text(path))
            .fetch_optional(self.pool())
            .await
            .map_err(|e| MediaError::Internal(format!("Database query failed: {}", e)))?;
        row.as_ref().map(media_file_from_row).transpose()
    }
}

#[derive(Clone, Debug)]
pub struct PostgresLibraryItemRepository {
    pool: PgPool,
}

impl PostgresLibraryItemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn item_from_row(row: &PgRow) -> Result<LibraryItem> {
        let kind: String = row.try_get("kind")?;
        Ok(LibraryItem {
            id: LibraryItemId(row.try_get("id")?),
            kind: kind
                .parse::<ItemKind>()
                .map_err(|e| MediaError::Internal(format!("Unknown item kind: {}", e)))?,
            title: row.try_get("title")?,
            path: PathBuf::from(row.try_get::<String, _>("path")?),
            release_date: row.try_get("release_date")?,
        })
    }
}

#[async_trait]
impl LibraryItemRepository for PostgresLibraryItemRepository {
    async fn get(&self, id: LibraryItemId) -> Result<Option<LibraryItem>> {
        let row = sqlx::query(
            "SELECT id, kind, title, path, release_date FROM library_items WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MediaError::Internal(format!("Database query failed: {}", e)))?;
        row.as_ref().map(Self::item_from_row).transpose()
    }

    async fn all(&self) -> Result<Vec<LibraryItem>> {
        let rows = sqlx::query(
            "SELECT id, kind, title, path, release_date FROM library_items ORDER BY path",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MediaError::Internal(format!("Database query failed: {}", e)))?;
        rows.iter().map(Self::item_from_row).collect()
    }

    async fn items_under_root(&self, root: &Path) -> Result<Vec<LibraryItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, title, path, release_date
            FROM library_items
            WHERE starts_with(path, $1)
            ORDER BY path
            "#,
        )
        .bind(base_prefix(root))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MediaError::Internal(format!("Database query failed: {}", e)))?;
        rows.iter().map(Self::item_from_row).collect()
    }

    async fn upsert(&self, item: &LibraryItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO library_items (id, kind, title, path, release_date)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                kind = EXCLUDED.kind,
                title = EXCLUDED.title,
                path = EXCLUDED.path,
                release_date = EXCLUDED.release_date,
                updated_at = NOW()
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.kind.as_str())
        .bind(&item.title)
        .bind(path_text(&item.path))
        .bind(item.release_date)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error("Failed to save library item", e))?;
        Ok(())
    }

    async fn delete(&self, id: LibraryItemId) -> Result<()> {
        sqlx::query("DELETE FROM library_items WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| MediaError::Internal(format!("Failed to delete library item: {}", e)))?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct PostgresRootFolderRepository {
    pool: PgPool,
}

impl PostgresRootFolderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn root_from_row(row: &PgRow) -> Result<RootFolder> {
        Ok(RootFolder {
            id: RootFolderId(row.try_get("id")?),
            path: PathBuf::from(row.try_get::<String, _>("path")?),
        })
    }
}

#[async_trait]
impl RootFolderRepository for PostgresRootFolderRepository {
    async fn all(&self) -> Result<Vec<RootFolder>> {
        let rows = sqlx::query("SELECT id, path FROM root_folders ORDER BY path")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MediaError::Internal(format!("Database query failed: {}", e)))?;
        rows.iter().map(Self::root_from_row).collect()
    }

    async fn get(&self, id: RootFolderId) -> Result<Option<RootFolder>> {
        let row = sqlx::query("SELECT id, path FROM root_folders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MediaError::Internal(format!("Database query failed: {}", e)))?;
        row.as_ref().map(Self::root_from_row).transpose()
    }

    async fn insert(&self, root: &RootFolder) -> Result<()> {
        sqlx::query("INSERT INTO root_folders (id, path) VALUES ($1, $2)")
            .bind(root.id.as_uuid())
            .bind(path_text(&root.path))
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error("Failed to add root folder", e))?;
        Ok(())
    }

    async fn delete(&self, id: RootFolderId) -> Result<()> {
        sqlx::query("DELETE FROM root_folders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| MediaError::Internal(format!("Failed to delete root folder: {}", e)))?;
        Ok(())
    }
}
