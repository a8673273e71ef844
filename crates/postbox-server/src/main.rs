mod webhook;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use postbox_api::middleware::require_auth;
use postbox_api::{AppState, AppStateInner, messages};
use postbox_db::Database;
use postbox_engine::{
    EngineConfig, LogNotifier, NotificationDispatcher, NotificationSender, Postbox, SqlDirectory,
};

use crate::webhook::WebhookNotifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "postbox=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("POSTBOX_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("POSTBOX_DB_PATH").unwrap_or_else(|_| "postbox.db".into());
    let host = std::env::var("POSTBOX_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("POSTBOX_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let webhook = std::env::var("POSTBOX_NOTIFY_WEBHOOK").ok();
    let engine_config = EngineConfig::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&PathBuf::from(&db_path))?);
    let directory = Arc::new(SqlDirectory::new(db.clone(), engine_config.quota_exempt_roles.clone()));

    let postbox = Postbox::new(db, directory.clone(), directory, engine_config);

    // `postbox sweep` runs the maintenance pass and exits.
    if std::env::args().nth(1).as_deref() == Some("sweep") {
        return sweep(&postbox);
    }

    let sender: Arc<dyn NotificationSender> = match webhook {
        Some(url) => {
            info!("Notifications go to webhook {}", url);
            Arc::new(WebhookNotifier::new(url, tokio::runtime::Handle::current())?)
        }
        None => Arc::new(LogNotifier),
    };
    let dispatcher = Arc::new(NotificationDispatcher::spawn(sender)?);
    let postbox = Arc::new(postbox.with_notifier(dispatcher));

    // Shared state
    let app_state: AppState = Arc::new(AppStateInner { postbox, jwt_secret });

    // Routes
    let protected_routes = Router::new()
        .route("/messages", post(messages::send_message))
        .route("/messages/{message_id}/recipients", put(messages::edit_recipients))
        .route("/inbox", get(messages::list_inbox).delete(messages::delete_all))
        .route("/inbox/unread", get(messages::unread_count))
        .route(
            "/inbox/{message_id}",
            get(messages::open_message).delete(messages::delete_message),
        )
        .route("/inbox/{message_id}/read", post(messages::mark_read))
        .route("/inbox/{message_id}/reply", post(messages::reply_to_sender))
        .route("/inbox/{message_id}/reply-all", post(messages::reply_to_all))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state);

    let app = Router::new()
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Postbox server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn sweep(postbox: &Postbox) -> anyhow::Result<()> {
    let report = postbox.sweep_orphans()?;
    info!(
        vanished_users = report.vanished_users.len(),
        entries_removed = report.entries_removed,
        messages_deleted = report.messages_deleted,
        "Sweep complete"
    );
    for (user, held) in postbox.users_over_quota()? {
        warn!(user_id = %user, held, "Inbox at or over quota");
    }
    Ok(())
}
