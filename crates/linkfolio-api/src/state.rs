use std::sync::Arc;

use linkfolio_db::Database;

use crate::storage::ImageStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub images: ImageStore,
}

impl AppStateInner {
    pub fn new(db: Database, images: ImageStore) -> AppState {
        Arc::new(Self { db, images })
    }
}
