use std::{
    env,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt::MakeWriter, prelude::*, registry, EnvFilter};

/// Log an error-level event flagged as critical.
///
/// Used immediately before the process terminates on a fatal condition.
#[macro_export]
macro_rules! critical {
    ($($arg:tt)*) => {
        $crate::__tracing::error!(critical = true, $($arg)*)
    };
}

#[doc(hidden)]
pub use tracing as __tracing;

// --- Custom "Tee" Writer ---
struct Tee<A, B> {
    a: A,
    b: B,
}

impl<A, B> Write for Tee<A, B>
where
    A: Write,
    B: Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let res_a = self.a.write(buf);
        let res_b = self.b.write(buf);
        res_a.or(res_b)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.a.flush()?;
        self.b.flush()
    }
}

#[derive(Clone)]
struct MakeTee<A, B> {
    make_a: A,
    make_b: B,
}

impl<'a, A, B, W1, W2> MakeWriter<'a> for MakeTee<A, B>
where
    A: MakeWriter<'a, Writer = W1>,
    B: MakeWriter<'a, Writer = W2>,
    W1: Write + 'a,
    W2: Write + 'a,
{
    type Writer = Tee<W1, W2>;
    fn make_writer(&'a self) -> Self::Writer {
        Tee {
            a: self.make_a.make_writer(),
            b: self.make_b.make_writer(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    File,
    Both,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Pretty,
    Json,
}

/// Logging settings, read from `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT` and
/// `LOG_FILE_PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub output: LogOutput,
    pub format: LogFormat,
    pub file_path: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: LogOutput::Both,
            format: LogFormat::Human,
            file_path: PathBuf::from("fleet.log"),
        }
    }
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup. Unknown values fall
    /// back to the defaults.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let output = match lookup("LOG_OUTPUT").as_deref() {
            Some("console") => LogOutput::Console,
            Some("file") => LogOutput::File,
            Some("none") | Some("off") => LogOutput::Off,
            _ => defaults.output,
        };

        let format = match lookup("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            Some("pretty") => LogFormat::Pretty,
            _ => defaults.format,
        };

        Self {
            level: lookup("LOG_LEVEL").unwrap_or(defaults.level),
            output,
            format,
            file_path: lookup("LOG_FILE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.file_path),
        }
    }

    /// Raise the level to `debug` (the `--debug` flag).
    pub fn with_debug(mut self, debug: bool) -> Self {
        if debug {
            self.level = "debug".to_string();
        }
        self
    }
}

/// Initializes the global tracing subscriber.
///
/// The returned guard flushes the file sink when dropped and must be held
/// for the lifetime of the process.
pub fn init_with_settings(settings: &LogSettings) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let subscriber = registry().with(env_filter);
    let mut guard: Option<WorkerGuard> = None;

    let log_path = settings.file_path.as_path();
    let log_dir = match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let log_filename = log_path.file_name().unwrap_or("fleet.log".as_ref());

    let result = match settings.output {
        LogOutput::Both => {
            let file_appender = tracing_appender::rolling::never(log_dir, log_filename);
            let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
            guard = Some(_guard);

            let tee_writer = MakeTee {
                make_a: std::io::stdout,
                make_b: non_blocking,
            };

            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(tee_writer);
            match settings.format {
                LogFormat::Json => subscriber.with(fmt_layer.json()).try_init(),
                LogFormat::Pretty => subscriber.with(fmt_layer.pretty()).try_init(),
                LogFormat::Human => subscriber.with(fmt_layer.compact()).try_init(),
            }
        }
        LogOutput::Console => {
            let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);
            match settings.format {
                LogFormat::Json => subscriber.with(fmt_layer.json()).try_init(),
                LogFormat::Pretty => subscriber.with(fmt_layer.pretty()).try_init(),
                LogFormat::Human => subscriber.with(fmt_layer.compact()).try_init(),
            }
        }
        LogOutput::File => {
            let file_appender = tracing_appender::rolling::never(log_dir, log_filename);
            let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
            guard = Some(_guard);

            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking);
            match settings.format {
                LogFormat::Json => subscriber.with(fmt_layer.json()).try_init(),
                LogFormat::Pretty => subscriber.with(fmt_layer.pretty()).try_init(),
                LogFormat::Human => subscriber.with(fmt_layer.compact()).try_init(),
            }
        }
        LogOutput::Off => subscriber.try_init(),
    };

    if let Err(e) = result {
        eprintln!("Failed to initialize logging: {e}");
    }

    guard
}
