use serde::{Deserialize, Serialize};

use super::repo::Tag;

#[derive(Debug, Deserialize)]
pub struct TagNameRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct TagListResponse {
    pub message: String,
    pub data: Vec<Tag>,
}

#[derive(Debug, Serialize)]
pub struct TagResponse {
    pub message: String,
    pub data: Tag,
}

#[derive(Debug, Serialize)]
pub struct TagDeletedResponse {
    pub id: i64,
    pub message: String,
}
