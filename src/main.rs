use splitledger::{
    auth::TokenMinter,
    config::ServerConfig,
    error::ServerError,
    schemas::{Group, Payment, User},
    store::FileStore,
    EventLoop, LedgerService, ServerDispatcher,
};
use tokio::sync::watch;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("splitledger=info,splitledger_server=info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    info!(db = %config.db_path.display(), "using the following database path");

    let users = FileStore::<User>::open(config.users_dir())?;
    let groups = FileStore::<Group>::open(config.groups_dir())?;
    let payments = FileStore::<Payment>::open(config.payments_dir())?;
    let service = LedgerService::new(users, groups, payments, TokenMinter::new(&config.token_secret));

    let (stop, shutdown) = watch::channel(false);
    let event_loop = EventLoop::bind(
        (config.host.as_str(), config.port),
        ServerDispatcher::new(service),
        shutdown,
    )
    .await?;

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received interrupt"),
            Err(err) => error!(%err, "could not listen for interrupt"),
        }
        request_shutdown(&stop);
    });

    event_loop.run().await?;
    Ok(())
}

/// Tells the event loop to stop. Returns `false` if it had already gone.
fn request_shutdown(stop: &watch::Sender<bool>) -> bool {
    match stop.send(true) {
        Ok(()) => true,
        Err(_) => {
            debug!("event loop already stopped");
            false
        }
    }
}
