use std::process;

use log::{error, info};
use lossmon::logger::init_logger;
use lossmon::{LossServer, ServerConfig};

fn usage() -> ! {
    println!("Usage: lossmon [<address> [<port> [<window-size>]]]");
    process::exit(1);
}

#[tokio::main]
async fn main() {
    init_logger();

    let config = match ServerConfig::from_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            usage()
        }
    };

    let server = match LossServer::bind(config) {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    let stats = server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for ctrl-c: {}", e);
            }
        })
        .await;
    info!(
        "received {} messages, lost {}, sent {} replies",
        stats.received, stats.lost, stats.sent
    );
}
