// CLI entry point for the tictac session server.
//
// Hosts exactly one two-player game. The process exits 0 on every normal
// termination path (quit, decisive rematch vote, idle timeout) and
// non-zero for malformed arguments or a failed bind.
//
// Usage:
//   tictac-server [OPTIONS]
//     --host <HOST>           Bind address (default: 127.0.0.1)
//     --port <PORT>           Listen port (default: 9999)
//     --idle-timeout <SECS>   Shut down after this much inactivity
//                             (default: 300)

use std::time::Duration;

use log::info;

use tictac_server::server::{ServerConfig, serve};

fn main() {
    env_logger::init();
    let config = parse_args();

    match serve(config) {
        Ok(reason) => {
            info!("server exited: {reason}");
        }
        Err(e) => {
            eprintln!("Failed to start server: {e}");
            std::process::exit(1);
        }
    }
}

/// Parse command-line arguments into a `ServerConfig`. Uses simple
/// `std::env::args()` matching — no clap dependency.
fn parse_args() -> ServerConfig {
    let mut config = ServerConfig::default();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                i += 1;
                config.host = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--host requires a value");
                    std::process::exit(1);
                });
            }
            "--port" => {
                i += 1;
                config.port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                });
            }
            "--idle-timeout" => {
                i += 1;
                let secs: u64 = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--idle-timeout requires a number of seconds");
                    std::process::exit(1);
                });
                config.idle_timeout = Duration::from_secs(secs);
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn print_usage() {
    println!("Usage: tictac-server [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --host <HOST>           Bind address (default: 127.0.0.1)");
    println!("  --port <PORT>           Listen port (default: 9999)");
    println!("  --idle-timeout <SECS>   Shut down after this much inactivity (default: 300)");
    println!("  --help, -h              Show this help");
}
