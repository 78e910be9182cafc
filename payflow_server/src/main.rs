use dotenvy::dotenv;
use log::{error, info};
use payflow_server::{config::ServerConfig, server::run_server};

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let config = ServerConfig::from_env_or_default();
    if !preflight_check(&config) {
        eprintln!("🚀️ Preflight check failed. Exiting. Check the logs for details.");
        std::process::exit(1);
    }

    info!("🚀️ STARTUP PayFlow server on {}:{}", config.host, config.port);
    info!(
        "🚀️ STARTUP relay: poll {}ms, batch {}; worker: {} retries, {}ms back-off; broker: {} partitions",
        config.poll_interval_ms, config.batch_size, config.max_retries, config.retry_backoff_ms, config.broker_partitions
    );
    match run_server(config).await {
        Ok(_) => println!("Bye!"),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        },
    }
}

fn preflight_check(config: &ServerConfig) -> bool {
    let mut result = true;
    info!("🚦️ Running preflight checks...");
    if config.database_url.is_empty() {
        error!("🚦️ PF_DATABASE_URL is not set. Please set it to the URL for the PayFlow database.");
        result = false;
    }
    if !(0.0..=1.0).contains(&config.payment_failure_rate) {
        error!("🚦️ PF_PAYMENT_FAILURE_RATE must be between 0 and 1.");
        result = false;
    }
    if result {
        info!("🚦️ Preflight check PASSED.");
    } else {
        error!("🚦️ Preflight check FAILED: Please fix the issues above before starting the server.");
    }
    result
}
