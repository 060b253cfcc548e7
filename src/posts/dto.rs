use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub caption: String,
    pub image: String,
}

/// Only caption and image are updatable; everything else in the body is
/// ignored by construction.
#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    pub caption: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub post_id: Uuid,
    pub liked: bool,
}
