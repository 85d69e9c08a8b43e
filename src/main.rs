use p1meter2mqtt::{Config, MqttManager, P1Manager};
use tokio::task::JoinHandle;
use std::time::Duration;
use log::{error, info};


#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    let default_filter = std::env::var("P1M_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            return Err(std::io::Error::other(e));
        }
    };

    // the P1 side sends its readings through this channel
    let (mut mqtt, tx) = MqttManager::new(&config.mqtt);

    let mut p1 = match P1Manager::new(tx, config.p1.clone()) {
        Ok(p1) => p1,
        Err(e) => {
            error!("Invalid metric configuration: {}", e);
            return Err(std::io::Error::other(e));
        }
    };

    let mut threads: Vec<JoinHandle<()>> = Vec::new();

    threads.push(tokio::spawn(async move {
        mqtt.start_thread().await;
    }));

    threads.push(tokio::spawn(async move {
        p1.start_thread().await;
    }));

    info!("All modules started, now waiting for a signal to exit");
    loop {
        tokio::time::sleep(Duration::from_secs(10)).await;
        let kill_all_tasks = threads.iter().any(|task| task.is_finished());

        if kill_all_tasks {
            for task in threads.iter_mut() {
                task.abort();
            }
            break;
        }
    }
    info!("A module stopped, exiting");
    Ok(())
}
