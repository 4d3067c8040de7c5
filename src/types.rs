// src/types.rs
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct AuthReq {
    pub src: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

#[derive(Serialize)]
pub struct AuthRes {
    pub url: String,
}

#[derive(Serialize)]
pub struct ErrorRes {
    pub code: &'static str,
    pub message: String,
}
