//! Stentor push-to-talk signalling server binary.

use stentor::{api::client::server, log, log::prelude::*, Conf};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();

    let conf = match Conf::parse() {
        Ok(conf) => conf,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let _log_guard = log::init();

    let (server, _addrs) = server::run(conf)?;
    server.await?;

    info!("Shutting down");
    Ok(())
}
