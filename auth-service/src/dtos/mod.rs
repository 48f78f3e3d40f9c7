pub mod auth;

use serde::Serialize;
use utoipa::ToSchema;

pub use auth::*;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
