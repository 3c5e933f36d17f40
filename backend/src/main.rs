mod catalog;
mod config;
mod controller;
mod error;
mod job_controller;
mod pipeline;
mod services;
mod store;

use crate::config::AppConfig;
use crate::controller::ImportController;
use crate::job_controller::state::{start_drain_scheduler, SIGNAL_BUFFER};
use crate::store::Store;
use actix_web::{web, App, HttpServer};
use env_logger::Env;
use log::{error, info, warn};
use std::io;
use tokio::sync::mpsc;

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));
    let config = AppConfig::from_env();

    let store = Store::open(&config.database).map_err(|e| {
        error!("cannot open database {}: {}", config.database.display(), e);
        io::Error::other(e.to_string())
    })?;
    info!("using database {}", store.path().display());
    match store.recover_claimed_items() {
        Ok(0) => {}
        Ok(n) => warn!("returned {} interrupted rows to the import queue", n),
        Err(e) => error!("could not recover interrupted rows: {}", e),
    }

    // Drain scheduler stands in for an external cron.
    let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
    let controller = ImportController::new(store, &config, tx);

    let scheduler_controller = controller.clone();
    let interval = config.drain_interval;
    tokio::spawn(async move {
        start_drain_scheduler(scheduler_controller, rx, interval).await;
    });

    let url = format!("http://{}:{}", config.host, config.port);
    info!("Server running at {}", url);

    HttpServer::new(move || {
        App::new()
            .app_data(web::JsonConfig::default().limit(10 * 1024 * 1024)) // 10 MB
            .app_data(web::Data::new(controller.clone()))
            .service(services::imports::configure_routes())
            .service(services::mapping::configure_routes())
            .service(services::settings::configure_routes())
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
