use axum::{http::StatusCode, response::IntoResponse};
use std::fmt::Display;

use crate::cache::durable::StoreError;

pub type AppResult<T> = Result<T, AppErr>;

#[derive(thiserror::Error, Debug)]
pub enum AppErr {
    #[error("Bad request: {0}")]
    Bad(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("DB: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Store: {0}")]
    Store(#[from] StoreError),

    #[error("Env: {0}")]
    Env(#[from] std::env::VarError),

    #[error("Config: {key} = {value:?}: {reason}")]
    Config { key: &'static str, value: String, reason: String },
}

impl IntoResponse for AppErr {
    fn into_response(self) -> axum::response::Response {
        let (code, body) = match self {
            AppErr::Bad(msg) => (StatusCode::BAD_REQUEST, msg),
            other            => {
                tracing::error!(error = %other, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        };
        (code, body).into_response()
    }
}

/* ── helper: turn any displayable error into Bad ── */
pub fn bad<E: Display>(e: E) -> AppErr { AppErr::Bad(e.to_string()) }
