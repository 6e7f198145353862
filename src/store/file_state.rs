use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::core::record::{FileMetadata, FileRecord};

use super::{ChangeStore, StoreError};

/// Current-state view over a [`ChangeStore`]: one record per (project, path).
#[derive(Clone)]
pub struct FileStateStore {
    store: Arc<dyn ChangeStore>,
}

impl FileStateStore {
    pub fn new(store: Arc<dyn ChangeStore>) -> Self {
        Self { store }
    }

    pub async fn upsert(
        &self,
        project_id: &str,
        path: &str,
        metadata: &FileMetadata,
    ) -> Result<(), StoreError> {
        self.store.upsert_file(project_id, path, metadata).await
    }

    pub async fn soft_delete(
        &self,
        project_id: &str,
        path: &str,
        who: &str,
        when: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.store.soft_delete_file(project_id, path, who, when).await
    }

    pub async fn get(&self, project_id: &str, path: &str) -> Result<Option<FileRecord>, StoreError> {
        self.store.get_file(project_id, path).await
    }

    pub async fn list(
        &self,
        project_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<FileRecord>, StoreError> {
        self.store.list_files(project_id, include_deleted).await
    }
}

impl std::fmt::Debug for FileStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStateStore").finish_non_exhaustive()
    }
}
