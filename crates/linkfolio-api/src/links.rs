use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use tracing::warn;

use linkfolio_types::api::{MessageResponse, RewardLinksRequest, SecondaryLinksRequest};
use linkfolio_types::models::LinkEntry;

use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/accounts/rewardlink/{email}: body `{customLinks: [{type, link}]}`.
pub async fn set_reward_links(
    State(state): State<AppState>,
    Path(email): Path<String>,
    body: Result<Json<RewardLinksRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(req) = body.map_err(invalid_request)?;

    state
        .db
        .set_reward_links(&email, &req.custom_links)
        .await
        .map_err(ApiError::backend("An error occurred while updating reward links"))?;

    Ok(Json(MessageResponse {
        message: "Reward links updated successfully".to_string(),
    }))
}

/// GET /api/accounts/getrewardlink/{email}: links reshaped to `{type: link}`.
pub async fn get_reward_links(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<BTreeMap<String, String>>, ApiError> {
    let links = state
        .db
        .reward_links(&email)
        .await
        .map_err(ApiError::backend("An error occurred while fetching reward links"))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(links_by_type(links)))
}

/// POST /api/accounts/secondarylink/{email}: body `{Links: [{type, link}]}`.
pub async fn set_secondary_links(
    State(state): State<AppState>,
    Path(email): Path<String>,
    body: Result<Json<SecondaryLinksRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(req) = body.map_err(invalid_request)?;

    state
        .db
        .set_secondary_links(&email, &req.links)
        .await
        .map_err(ApiError::backend(
            "An error occurred while updating secondary custom links",
        ))?;

    Ok(Json(MessageResponse {
        message: "Secondary custom links updated successfully".to_string(),
    }))
}

/// GET /api/accounts/getsecondarylink/{email}: the stored array as-is.
pub async fn get_secondary_links(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<Vec<LinkEntry>>, ApiError> {
    let links = state
        .db
        .secondary_links(&email)
        .await
        .map_err(ApiError::backend("An error occurred while fetching secondary links"))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(links))
}

/// Later entries of the same type overwrite earlier ones. Entries missing
/// either field have nothing to contribute and are skipped.
pub fn links_by_type(links: Vec<LinkEntry>) -> BTreeMap<String, String> {
    let mut by_type = BTreeMap::new();
    for entry in links {
        if let (Some(link_type), Some(link)) = (entry.link_type, entry.link) {
            by_type.insert(link_type, link);
        }
    }
    by_type
}

fn invalid_request(rejection: JsonRejection) -> ApiError {
    warn!("Rejected link update: {}", rejection.body_text());
    ApiError::BadRequest("Invalid request".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_duplicate_type_wins() {
        let map = links_by_type(vec![
            LinkEntry::new("shop", "https://a.example"),
            LinkEntry::new("blog", "https://b.example"),
            LinkEntry::new("shop", "https://c.example"),
        ]);
        assert_eq!(map.len(), 2);
        assert_eq!(map["shop"], "https://c.example");
        assert_eq!(map["blog"], "https://b.example");
    }

    #[test]
    fn partial_entries_are_skipped() {
        let map = links_by_type(vec![
            LinkEntry::new("shop", "https://a.example"),
            LinkEntry {
                link_type: Some("shop".to_string()),
                link: None,
            },
            LinkEntry {
                link_type: None,
                link: Some("https://b.example".to_string()),
            },
        ]);
        assert_eq!(map.len(), 1);
        assert_eq!(map["shop"], "https://a.example");
    }

    #[test]
    fn empty_list_is_empty_map() {
        assert!(links_by_type(vec![]).is_empty());
    }
}
