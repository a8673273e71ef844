//! HTTP/JSON surface over the postbox engine. Every handler identifies the
//! caller from the bearer token and runs the engine call on the blocking pool.

pub mod error;
pub mod messages;
pub mod middleware;

use std::sync::Arc;

use postbox_engine::Postbox;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub postbox: Arc<Postbox>,
    pub jwt_secret: String,
}
