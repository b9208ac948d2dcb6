// Logging setup for the manager and its helper commands
use std::io::Write;

/// Dependencies that stay at Info even with --verbose
const QUIET_DEPENDENCIES: &[&str] = &["reqwest", "hyper", "hyper_util", "h2", "tokio", "tower_http"];

/// Initialize env_logger.
///
/// Info is the default since the manager runs unattended and its log is the
/// main record of a run. `--quiet` keeps errors only, `--verbose` turns on
/// Debug for this crate. `RUST_LOG` replaces all of it.
pub fn init_logger(verbose: bool, quiet: bool) {
    if std::env::var_os("RUST_LOG").is_some() {
        env_logger::init();
        return;
    }

    let level = match (quiet, verbose) {
        (true, _) => log::LevelFilter::Error,
        (false, true) => log::LevelFilter::Debug,
        (false, false) => log::LevelFilter::Info,
    };

    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(log::LevelFilter::Info.min(level))
        .filter_module(env!("CARGO_CRATE_NAME"), level)
        .format(|buf, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            match record.level() {
                log::Level::Info => writeln!(buf, "{} {}", ts, record.args()),
                other => writeln!(buf, "{} [{}] {}", ts, other, record.args()),
            }
        });

    for module in QUIET_DEPENDENCIES {
        builder.filter_module(module, log::LevelFilter::Info.min(level));
    }

    builder.init();
}
