use std::process;

use radiocast::config::{self, Settings};
use radiocast::error::{RadioError, Result};
use radiocast::services;
use radiocast::station::RadioStation;
use radiocast::handlers;

#[rocket::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    let port = match parse_args(std::env::args().skip(1)) {
        Ok(port) => port,
        Err(message) => {
            eprintln!("{}", message);
            process::exit(2);
        }
    };

    if let Err(e) = run(port).await {
        log::error!("{}", e);
        process::exit(1);
    }
}

/// Minimal CLI: `--port <N>` (default 8000). Unknown arguments are rejected.
fn parse_args(mut args: impl Iterator<Item = String>) -> std::result::Result<u16, String> {
    let mut port = config::DEFAULT_PORT;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--port" | "-p" => {
                let value = args.next().ok_or("Error: --port needs a value")?;
                port = value
                    .parse()
                    .map_err(|_| format!("Error: invalid port '{}'", value))?;
            }
            other => return Err(format!("Error: unknown argument '{}'", other)),
        }
    }
    Ok(port)
}

async fn run(port: u16) -> Result<()> {
    config::ensure_directories()?;
    let settings = Settings::load_or_create(&config::SETTINGS_FILE);
    let station = RadioStation::new(settings);

    // The public port must bind before anything else spins up; failure here
    // aborts the process.
    let public = tokio::net::TcpListener::bind((config::HOST, port))
        .await
        .map_err(|e| RadioError::Startup(format!("cannot bind {}:{}: {}", config::HOST, port, e)))?;

    // The HTTP backend lives on loopback one port up; the dispatcher proxies
    // browser and admin traffic to it so that one public port serves
    // listeners, the admin API and Icecast source clients alike.
    let http_port = port
        .checked_add(1)
        .ok_or_else(|| RadioError::Startup(format!("port {} leaves no room for the HTTP backend", port)))?;

    services::broadcaster::spawn(station.clone());
    services::autodj::spawn(station.clone());
    services::watcher::spawn(station.clone());
    services::dispatcher::spawn(public, station.clone(), http_port);

    log::info!(
        "{} on {}:{} (streams, admin API and live ingest share this port)",
        station.radio_name(),
        config::HOST,
        port
    );

    let figment = rocket::Config::figment()
        .merge(("address", "127.0.0.1"))
        .merge(("port", http_port))
        .merge(("cli_colors", false));

    rocket::custom(figment)
        .manage(station)
        .mount("/", handlers::routes())
        .register("/", handlers::catchers())
        .launch()
        .await
        .map_err(|e| RadioError::Startup(format!("HTTP backend failed: {}", e)))?;

    log::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args<'a>(list: &'a [&'a str]) -> impl Iterator<Item = String> + 'a {
        list.iter().map(|s| s.to_string())
    }

    #[test]
    fn test_default_port() {
        assert_eq!(parse_args(args(&[])).unwrap(), 8000);
    }

    #[test]
    fn test_port_flag() {
        assert_eq!(parse_args(args(&["--port", "9100"])).unwrap(), 9100);
        assert_eq!(parse_args(args(&["-p", "9100"])).unwrap(), 9100);
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(parse_args(args(&["--port"])).is_err());
        assert!(parse_args(args(&["--port", "not-a-number"])).is_err());
        assert!(parse_args(args(&["--volume", "11"])).is_err());
    }
}
