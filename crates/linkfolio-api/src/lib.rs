//! HTTP handlers for account profiles, link lists and profile images.

pub mod accounts;
pub mod error;
pub mod images;
pub mod links;
pub mod state;
pub mod storage;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::services::ServeDir;

pub use error::ApiError;
pub use state::{AppState, AppStateInner};
pub use storage::ImageStore;

/// All `/api/accounts` routes plus the static `/images` mount.
pub fn router(state: AppState) -> Router {
    let images_dir = state.images.dir().to_path_buf();

    Router::new()
        .route("/api/accounts/check/{email}", get(accounts::check_account))
        .route("/api/accounts/checkusername/{username}", get(accounts::check_username))
        .route("/api/accounts/additionalinfo/{email}", put(accounts::update_additional_info))
        .route("/api/accounts/userdata/{email}", get(accounts::user_data))
        .route("/api/accounts/image/{image_value}", get(images::serve_image))
        .route("/api/accounts/rewardlink/{email}", post(links::set_reward_links))
        .route("/api/accounts/getrewardlink/{email}", get(links::get_reward_links))
        .route("/api/accounts/secondarylink/{email}", post(links::set_secondary_links))
        .route("/api/accounts/getsecondarylink/{email}", get(links::get_secondary_links))
        .route("/api/accounts/getuserdatadetails", get(accounts::user_data_details))
        .route("/health", get(health))
        .nest_service("/images", ServeDir::new(images_dir))
        .with_state(state)
}

/// GET /health: liveness check.
pub async fn health() -> &'static str {
    "ok"
}
