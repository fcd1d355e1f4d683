use backend::shared::config::{get_database_path, load_config};
use backend::shared::data::db::initialize_database;
use backend::shared::state::AppState;
use backend::system::auth::jwt::{load_or_create_secret, JwtKeys};
use backend::system::initialization::ensure_admin_user_exists;
use backend::system::tasks::initialization::initialize_scheduled_tasks;
use backend::system::verification::sms::LoggingSmsSender;
use backend::{routes, system};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    system::tracing::initialize()?;

    let config = load_config()?;
    let db_path = get_database_path(&config)?;
    let db = initialize_database(&db_path)
        .await
        .map_err(|e| anyhow::anyhow!("db init failed: {e}"))?;

    let secret = load_or_create_secret(&db, config.auth.jwt_secret.as_deref()).await?;
    let jwt = JwtKeys::from_secret(&secret, config.auth.token_lifetime_hours);

    ensure_admin_user_exists(&db, &config.auth).await?;

    let worker = initialize_scheduled_tasks(db.clone(), &config.scheduler)?;
    tokio::spawn(worker.run_loop());

    let addr: SocketAddr = (config.server.host, config.server.port).into();
    let state = AppState::new(db, config, jwt, Arc::new(LoggingSmsSender));
    let app = routes::configure_routes(state);

    tracing::info!("Attempting to bind server to http://{}", addr);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => {
            tracing::info!("Server successfully bound to {}", addr);
            listener
        }
        Err(e) => {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                tracing::error!(
                    "Port {} is already in use. Please ensure no other process is using this port.",
                    addr.port()
                );
            } else {
                tracing::error!("Failed to bind to {}. Error: {}", addr, e);
            }
            return Err(e.into());
        }
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

