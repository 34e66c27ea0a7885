mod app;
mod assets;
mod config;
mod shell;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use gtk::glib;
use log::{error, info};

use crate::config::ShellConfig;

fn main() -> glib::ExitCode {
    let config = match ShellConfig::discover() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {e}", app::APP_TITLE);
            return glib::ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.paths.ensure_dirs() {
        eprintln!("{}: {e}", app::APP_TITLE);
        return glib::ExitCode::FAILURE;
    }

    init_logging(&config.paths.log_file());
    info!("Starting {} in {}", app::APP_TITLE, config.paths.root().display());

    if let Err(e) = assets::install(&config.paths) {
        error!("Bundled pages unavailable: {e}");
    }

    let server = match server::start(&config.server, config.paths.root()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!("Local server failed, serving pages from disk: {e}");
            None
        }
    };
    let pages_base = match &server {
        Some(handle) => handle.base_url(),
        None => assets::file_uri(config.paths.root()),
    };

    let code = app::run(config, pages_base);

    if let Some(server) = server {
        server.shutdown();
    }
    info!("{} exited", app::APP_TITLE);
    code
}

/// Sends log records to `Logs/browser.log`, or stderr if it cannot be opened.
/// `RUST_LOG` overrides the default `info` level.
fn init_logging(log_file: &Path) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} - {} - {}",
            buf.timestamp_millis(),
            record.level(),
            record.args()
        )
    });

    match OpenOptions::new().create(true).append(true).open(log_file) {
        Ok(file) => {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        Err(e) => eprintln!("Cannot open {}: {e}; logging to stderr", log_file.display()),
    }

    if let Err(e) = builder.try_init() {
        eprintln!("Logger already initialised: {e}");
    }
}
