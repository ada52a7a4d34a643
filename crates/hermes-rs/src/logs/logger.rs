use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;
use once_cell::sync::OnceCell;
use std::env;
use std::io::Write;

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Configures the process-wide logger.
///
/// Timestamped, level-colored console output. Colors are dropped when
/// `NO_COLOR` is set; `RUST_LOG` overrides the default `info` filter.
/// Safe to call more than once (tests do), only the first call takes
/// effect.
pub fn configure_logger() {
    LOGGER_INIT.get_or_init(|| {
        let no_color = env::var("NO_COLOR").is_ok();

        Builder::new()
            .format(move |buf, record| {
                let level = record.level();
                let level_display = if no_color {
                    format!("{:<5}", level)
                } else {
                    let color = match level {
                        log::Level::Error => "\x1b[31m", // red
                        log::Level::Warn => "\x1b[33m",  // yellow
                        log::Level::Info => "\x1b[32m",  // green
                        log::Level::Debug => "\x1b[34m", // blue
                        log::Level::Trace => "\x1b[35m", // magenta
                    };
                    format!("{}{:<5}\x1b[0m", color, level)
                };

                writeln!(
                    buf,
                    "{} | {} | {} | {}",
                    Local::now().format("%b %d %y %I:%M:%S %p"),
                    level_display,
                    record.target(),
                    record.args(),
                )
            })
            .filter_level(LevelFilter::Info)
            .parse_default_env()
            .init();
    });
}
