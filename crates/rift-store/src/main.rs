use clap::Parser;
use rift_store::admin_api::{AdminApiServer, AdminState};
use rift_store::config::{init_tracing, Args, Settings};
use rift_store::create_repository;
use rift_store::matcher::JsonPredicateMatcher;
use rift_store::validation::DefaultStubValidator;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load(Args::parse())?;
    init_tracing(&settings.log_level, settings.log_format);

    let storage = settings.storage();
    info!("Using {:?} storage", storage);
    let repo = create_repository(&storage);
    let state = Arc::new(AdminState::new(
        Arc::clone(&repo),
        Arc::new(DefaultStubValidator::new(settings.allow_injection)),
        Arc::new(JsonPredicateMatcher),
    ));

    let server = AdminApiServer::bind(settings.admin_addr()?, state).await?;
    tokio::select! {
        result = server.run() => {
            if let Err(e) = &result {
                error!("Admin API stopped: {}", e);
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down, removing stored imposters");
            repo.delete_all_sync()?;
        }
    }
    Ok(())
}
