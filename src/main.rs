use tracing::error;
use tracing_subscriber::EnvFilter;

use marlin_redis::rdb::load_rdb_file;
use marlin_redis::server::RedisServer;

/// Parses the command-line flags, loads the RDB snapshot if one exists, and
/// runs the server. Startup failures (bad flags, an unreadable snapshot, a
/// port that cannot be bound) exit with code 1.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let server = match RedisServer::new(std::env::args()) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "failed to parse command line flags");
            std::process::exit(1);
        }
    };

    let snapshot = match load_rdb_file(&server.rdb_directory, &server.rdb_filename).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!(error = %e, "failed to load RDB snapshot");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run(snapshot).await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }
}
