use std::process;
use std::time::Duration;

use log::{error, info, warn};
use lossmon::client::SequenceSender;
use lossmon::logger::init_logger;

const PAYLOAD_SIZE: usize = 512;
const REPLY_SIZE: usize = 100;

fn usage() -> ! {
    println!("Usage: lossgen <address> <port> <count> [<drop-every>] [<interval-ms>]");
    process::exit(1);
}

fn parse<T: std::str::FromStr>(arg: Option<String>, default: Option<T>) -> T {
    match arg {
        Some(s) => s.parse().unwrap_or_else(|_| usage()),
        None => default.unwrap_or_else(|| usage()),
    }
}

#[tokio::main]
async fn main() {
    init_logger();

    let mut args = std::env::args().skip(1);
    let addr: String = parse(args.next(), None);
    let port: u16 = parse(args.next(), None);
    let count: u32 = parse(args.next(), None);
    // 0 disables dropping.
    let drop_every: u32 = parse(args.next(), Some(0));
    let interval = Duration::from_millis(parse(args.next(), Some(10)));

    let mut sender = match SequenceSender::connect((addr.as_str(), port), PAYLOAD_SIZE).await {
        Ok(sender) => sender,
        Err(e) => {
            error!("failed to connect to {}:{}: {}", addr, port, e);
            process::exit(1);
        }
    };

    let mut dropped = 0u32;
    for seq in 0..count {
        if drop_every > 0 && seq % drop_every == drop_every - 1 {
            dropped += 1;
            continue;
        }
        if let Err(e) = sender.send(seq).await {
            error!("send of seq {} failed: {}", seq, e);
            process::exit(1);
        }
        tokio::time::sleep(interval).await;
    }
    info!("sent {} of {} sequence numbers ({} dropped)", count - dropped, count, dropped);

    let mut reply = [0u8; REPLY_SIZE];
    match tokio::time::timeout(Duration::from_secs(1), sender.read_reply(&mut reply)).await {
        Ok(Ok(n)) => info!("got {} byte reply from {}", n, sender.peer_addr()),
        Ok(Err(e)) => warn!("reading reply failed: {}", e),
        Err(_) => warn!("no reply within 1s"),
    }

    if let Err(e) = sender.shutdown().await {
        warn!("shutdown failed: {}", e);
    }
}
