use serde::{Deserialize, Serialize};

use crate::models::LinkEntry;

// -- Accounts --

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckAccountResponse {
    pub message: String,
    #[serde(rename = "accountId")]
    pub account_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsernameExistsResponse {
    pub exists: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountUpdatedResponse {
    pub message: String,
    pub email: String,
}

// -- Links --

#[derive(Debug, Deserialize)]
pub struct RewardLinksRequest {
    #[serde(rename = "customLinks")]
    pub custom_links: Vec<LinkEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SecondaryLinksRequest {
    #[serde(rename = "Links")]
    pub links: Vec<LinkEntry>,
}

// -- Generic --

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
