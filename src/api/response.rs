use log::error;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::Request;
use serde::Serialize;

use crate::api::AppState;

/// The envelope of every API response
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        })
    }

    pub fn ok_with_message(data: T, message: &str) -> Json<Self> {
        Json(ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            message: Some(message.to_string()),
        })
    }
}

/// Body of error responses
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn new(error: &str) -> Self {
        ErrorBody {
            success: false,
            error: error.to_string(),
            details: Vec::new(),
            message: None,
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    /// Missing or invalid input (400)
    BadRequest { error: String, details: Vec<String> },
    /// 404 with the given error text
    NotFound(String),
    /// Unhandled failure (500); the message is only shown outside production
    Internal { error: String, message: String },
}

impl ApiError {
    pub fn bad_request(error: &str) -> Self {
        ApiError::BadRequest {
            error: error.to_string(),
            details: Vec::new(),
        }
    }

    pub fn validation(details: Vec<String>) -> Self {
        ApiError::BadRequest {
            error: "Validation error".to_string(),
            details,
        }
    }

    pub fn not_found(error: &str) -> Self {
        ApiError::NotFound(error.to_string())
    }

    pub fn internal(error: &str, cause: impl std::fmt::Display) -> Self {
        ApiError::Internal {
            error: error.to_string(),
            message: cause.to_string(),
        }
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let production = request
            .rocket()
            .state::<AppState>()
            .is_some_and(|state| state.config.is_production());

        let (status, body) = match self {
            ApiError::BadRequest { error, details } => (
                Status::BadRequest,
                ErrorBody {
                    details,
                    ..ErrorBody::new(&error)
                },
            ),
            ApiError::NotFound(error) => (Status::NotFound, ErrorBody::new(&error)),
            ApiError::Internal { error, message } => {
                error!("{} {}: {}: {}", request.method(), request.uri(), error, message);
                (
                    Status::InternalServerError,
                    ErrorBody {
                        message: (!production).then_some(message),
                        ..ErrorBody::new(&error)
                    },
                )
            }
        };
        Custom(status, Json(body)).respond_to(request)
    }
}
