use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::Field},
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use tracing::{debug, info, warn};

use linkfolio_db::{CheckOutcome, ProfileUpdate, Step, UpdateOutcome};
use linkfolio_types::api::{AccountUpdatedResponse, CheckAccountResponse, UsernameExistsResponse};
use linkfolio_types::models::{Account, ProfileSummary};

use crate::error::ApiError;
use crate::state::AppState;
use crate::storage::{IMAGE_FIELD, ImageStore};

const ACCOUNT_EXISTS_MESSAGE: &str =
    "checked email: new user will be created and if the user already exist the account wont be created.";

/// GET /api/accounts/check/{email}: create the account on first sight.
pub async fn check_account(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .db
        .check_or_create_account(&email)
        .await
        .map_err(|e| match e.downcast_ref::<Step>().copied() {
            Some(Step::Insert) => ApiError::backend("An error occurred while creating account")(e),
            _ => ApiError::backend("An error occurred while checking account")(e),
        })?;

    let (status, message, account_id) = match outcome {
        CheckOutcome::Created(id) => (StatusCode::CREATED, "Account created successfully", id),
        CheckOutcome::Existing(id) => (StatusCode::OK, ACCOUNT_EXISTS_MESSAGE, id),
    };

    Ok((
        status,
        Json(CheckAccountResponse {
            message: message.to_string(),
            account_id,
        }),
    ))
}

/// GET /api/accounts/checkusername/{username}
pub async fn check_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<UsernameExistsResponse>, ApiError> {
    let exists = state
        .db
        .username_exists(&username)
        .await
        .map_err(ApiError::backend("An error occurred while checking username"))?;

    Ok(Json(UsernameExistsResponse { exists }))
}

/// Text fields and the optional image of an additional-info upload.
#[derive(Debug, Default)]
struct ProfileForm {
    username: Option<String>,
    niche: Option<String>,
    name: Option<String>,
    aboutme: Option<String>,
    image: Option<(String, Bytes)>,
}

impl ProfileForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = ProfileForm::default();

        while let Some(field) = multipart.next_field().await.map_err(malformed)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match name.as_str() {
                "username" => form.username = Some(field.text().await.map_err(malformed)?),
                "niche" => form.niche = Some(field.text().await.map_err(malformed)?),
                "name" => form.name = Some(field.text().await.map_err(malformed)?),
                "aboutme" => form.aboutme = Some(field.text().await.map_err(malformed)?),
                IMAGE_FIELD => form.image = read_image(field).await?,
                other => debug!("Ignoring multipart field {}", other),
            }
        }

        Ok(form)
    }

    /// username, niche and name must all be present and non-empty.
    fn into_update(self) -> Result<(ProfileUpdate, Option<Bytes>), ApiError> {
        let required = |v: Option<String>| v.filter(|s| !s.is_empty());
        let (Some(username), Some(niche), Some(name)) =
            (required(self.username), required(self.niche), required(self.name))
        else {
            return Err(ApiError::BadRequest(
                "username, niche, and name are required".to_string(),
            ));
        };

        let (image, data) = match self.image {
            Some((filename, data)) => (Some(filename), Some(data)),
            None => (None, None),
        };

        Ok((
            ProfileUpdate {
                username,
                niche,
                name,
                aboutme: self.aboutme,
                image,
            },
            data,
        ))
    }
}

/// An image part without a filename (an empty file input) counts as no upload.
async fn read_image(field: Field<'_>) -> Result<Option<(String, Bytes)>, ApiError> {
    let original = field.file_name().unwrap_or_default().to_string();
    if original.is_empty() {
        return Ok(None);
    }

    let filename = ImageStore::generate_filename(IMAGE_FIELD, &original).map_err(|e| {
        warn!("Rejected upload {:?}: {}", original, e);
        ApiError::BadRequest(e.to_string())
    })?;
    let data = field.bytes().await.map_err(malformed)?;
    Ok(Some((filename, data)))
}

fn malformed(e: axum::extract::multipart::MultipartError) -> ApiError {
    warn!("Malformed multipart body: {}", e);
    ApiError::BadRequest("Invalid request".to_string())
}

/// PUT /api/accounts/additionalinfo/{email}: multipart profile update with
/// an optional `image` file. Without a new image the stored one is kept.
pub async fn update_additional_info(
    State(state): State<AppState>,
    Path(email): Path<String>,
    multipart: Multipart,
) -> Result<Json<AccountUpdatedResponse>, ApiError> {
    let (update, image_data) = ProfileForm::read(multipart).await?.into_update()?;

    if let (Some(filename), Some(data)) = (update.image.as_deref(), image_data.as_ref()) {
        state
            .images
            .save(filename, data)
            .await
            .map_err(ApiError::backend("An error occurred while saving image"))?;
    }

    let outcome = state
        .db
        .update_profile(&email, &update)
        .await
        .map_err(|e| match e.downcast_ref::<Step>().copied() {
            Some(Step::FetchImage) => {
                ApiError::backend("An error occurred while fetching current image filename")(e)
            }
            _ => ApiError::backend("An error occurred while updating account")(e),
        })?;

    match outcome {
        UpdateOutcome::Updated { image } => {
            info!("Account {} updated (image: {:?})", email, image);
            Ok(Json(AccountUpdatedResponse {
                message: "Account updated successfully".to_string(),
                email,
            }))
        }
        UpdateOutcome::NotFound => {
            if let Some(filename) = update.image.as_deref() {
                if let Err(e) = state.images.remove(filename).await {
                    warn!("Failed to remove orphaned upload {}: {:#}", filename, e);
                }
            }
            Err(ApiError::NotFound("Account not found".to_string()))
        }
    }
}

/// GET /api/accounts/userdata/{email}
pub async fn user_data(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<Account>, ApiError> {
    state
        .db
        .find_account_by_email(&email)
        .await
        .map_err(ApiError::backend("An error occurred while fetching user data"))?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("User data not found".to_string()))
}

/// GET /api/accounts/getuserdatadetails: every profile, all or nothing.
pub async fn user_data_details(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProfileSummary>>, ApiError> {
    let profiles = state
        .db
        .list_profiles()
        .await
        .map_err(ApiError::backend("Error fetching user data"))?;

    Ok(Json(profiles))
}
