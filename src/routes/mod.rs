use axum::Router;

pub mod rooms;
pub mod ws;

pub fn router() -> Router {
    Router::new()
        .merge(rooms::router())
        .merge(ws::router())
}
