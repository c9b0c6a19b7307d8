use std::io::Write;
use std::path::Path;

use chrono::Local;
use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};

/// Installs the global logger: timestamp, colored level, `file:line`, message.
/// Defaults to `Info`; `RUST_LOG` overrides it.
pub fn init_logger() {
    Builder::new()
        .format(|buf, record| {
            let file = record.file().unwrap_or("unknown");
            let line = record.line().unwrap_or(0);
            let base_path = Path::new(env!("CARGO_MANIFEST_DIR"));
            let relative_path = Path::new(file)
                .strip_prefix(base_path)
                .map(|path| path.to_str().unwrap_or(file))
                .unwrap_or(file);

            let timestamp = Local::now()
                .format("%Y-%m-%dT%H:%M:%S%.3f")
                .to_string()
                .yellow();

            let level_colored = match record.level() {
                Level::Error => "ERROR".bright_red().bold(),
                Level::Warn => "WARN".yellow().bold(),
                Level::Info => "INFO".green().bold(),
                Level::Debug => "DEBUG".cyan(),
                Level::Trace => "TRACE".bright_white(),
            };

            let location = format!("{}:{}", relative_path.blue(), line);

            writeln!(
                buf,
                "{} [{}] [{}] - {}",
                timestamp,
                level_colored,
                location,
                record.args()
            )
        })
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
}
