//! lwnet - Entry Point
//!
//! Starts the FTP and Telnet servers and runs them until Ctrl-C.

use std::process;
use std::sync::Arc;

use log::{error, info};

use lwnet::utils::logging::{self, LogQueue};
use lwnet::{Server, ServerConfig};

#[tokio::main]
async fn main() {
    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            process::exit(1);
        }
    };

    // console output honours RUST_LOG, dmesg always gets info and above
    let log_queue = Arc::new(LogQueue::new(config.log_queue_size));
    if let Err(e) = logging::init(Arc::clone(&log_queue)) {
        eprintln!("cannot install logger: {}", e);
        process::exit(1);
    }

    info!("Launching {} servers...", config.hostname);

    if let Err(e) = Server::new(config, log_queue).run().await {
        error!("server failed: {}", e);
        process::exit(1);
    }
}
