use std::{fs, path::Path, sync::OnceLock};

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub mod file;
pub mod format;

pub use file::*;
pub use format::*;

use crate::configs::Config;

pub(crate) static GLOBAL_FILE_WRITER: OnceLock<CappedFileWriter> = OnceLock::new();

/// Print a line to stdout and mirror it into the log file, for output that
/// has to happen before the subscriber is installed (config load, banner).
#[macro_export]
macro_rules! log_println {
    () => {{
        std::println!();
        $crate::common::logger::append_to_file_raw("\n");
    }};
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        std::println!("{}", msg);
        $crate::common::logger::append_to_file_raw(&format!("{}\n", msg));
    }};
}

pub fn append_to_file_raw(msg: &str) {
    if let Some(mut writer) = GLOBAL_FILE_WRITER.get().cloned() {
        use std::io::Write;
        let clean = strip_ansi_escapes(msg);
        let _ = writer.write_all(clean.as_bytes());
    }
}

pub fn init(config: &Config) {
    let logging = config.logging.as_ref();

    let level = logging
        .and_then(|l| l.level.as_deref())
        .unwrap_or("info");
    let filters = logging
        .and_then(|l| l.filters.as_deref())
        .unwrap_or("");

    let filter_str = if filters.is_empty() {
        format!("{},log=error", level)
    } else {
        format!("{},log=error,{}", level, filters)
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_str));

    let stdout_layer = fmt::layer()
        .event_format(EventFormat::new(true))
        .with_ansi(true);

    let file_layer = logging.and_then(|l| l.file.as_ref()).map(|file_config| {
        if let Some(parent) = Path::new(&file_config.path).parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("Failed to create log directory: {}", e);
            }
        }

        let writer = CappedFileWriter::new(file_config.path.clone(), file_config.max_lines);
        let _ = GLOBAL_FILE_WRITER.set(writer.clone());
        fmt::layer()
            .with_writer(writer)
            .event_format(EventFormat::new(false))
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}
