use std::path::PathBuf;

use photo_queue::{ConnectivityConfig, ConnectivityMonitor, Dispatcher, UploadQueue};
use serial_scan::SerialScanner;

use sitesnap::config::AgentConfig;
use sitesnap::database;
use sitesnap::error::AppError;
use sitesnap::services::{agent::SyncAgent, capture_service, settings_service};

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = AgentConfig::load();
    if let Err(e) = run(config).await {
        log::error!("Agent failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: AgentConfig) -> Result<(), AppError> {
    let db = database::init_database(&config.data_dir)?;

    let (settings, device_id) = {
        let conn = db
            .lock()
            .map_err(|_| AppError::Other("database connection poisoned".to_string()))?;
        let settings = settings_service::ensure_settings(&conn, &config)?;
        let device_id = settings_service::get_device_id(&conn)?;
        (settings, device_id)
    };

    if !settings.enabled {
        log::warn!("Background draining is disabled in settings, exiting");
        return Ok(());
    }

    let queue = UploadQueue::with_connection(db.clone())?;
    let dispatcher = Dispatcher::new(queue.clone());
    let monitor = ConnectivityMonitor::new(ConnectivityConfig::new(settings.probe_url()));
    let scanner = SerialScanner::with_default_recognizer();

    let agent = SyncAgent::new(queue.clone(), dispatcher.clone(), monitor);
    let trigger = agent.trigger_handle();

    // Reconcile loop: confirmed deliveries stamp the settings row so the
    // status output can show when the queue last moved.
    let mut deliveries = dispatcher.subscribe_deliveries();
    let notice_db = db.clone();
    let notice_task = tokio::spawn(async move {
        while deliveries.changed().await.is_ok() {
            let notice = deliveries.borrow_and_update().clone();
            if let Some(notice) = notice {
                log::info!(
                    "Delivered capture {} as entry {:?}",
                    notice.queue_id,
                    notice.entry_id
                );
                if let Ok(conn) = notice_db.lock() {
                    if let Err(e) = settings_service::update_last_drain(&conn) {
                        log::error!("Cannot record drain time: {}", e);
                    }
                }
            }
        }
    });

    // Spool intake: captured photos dropped as
    // <jobId>__<categoryId>__<name>.jpg are queued and trigger a drain.
    let spool_dir = PathBuf::from(&config.spool_dir);
    let spool_queue = queue.clone();
    let spool_dispatcher = dispatcher.clone();
    let spool_trigger = trigger.clone();
    let spool_settings = settings.clone();
    let spool_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(5));
        loop {
            ticker.tick().await;
            match capture_service::ingest_spool(
                &spool_queue,
                &spool_dispatcher,
                &scanner,
                &spool_settings,
                &spool_dir,
            )
            .await
            {
                Ok(n) if n > 0 => spool_trigger.request_drain(),
                Ok(_) => {}
                Err(e) => log::error!("Spool scan failed: {}", e),
            }
        }
    });

    log::info!(
        "sitesnap agent ready (device {}, server {})",
        device_id,
        settings.server_url
    );

    tokio::select! {
        _ = agent.run() => {}
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupt received, shutting down");
        }
    }

    spool_task.abort();
    notice_task.abort();
    Ok(())
}
