//! This is a simple library used for structured logging.
//!
//! Use as follows:
//!
//! ```ignore
//! log!(logger, Severity::Debug, event = "STOP", attempt = 3)
//! ```
//!
//! Any value serializable by `serde` can be logged.
//!
//! If the name and value are the same, you can pass it by name:
//!
//! ```ignore
//! log!(logger, Severity::Info, service)
//! ```
//!
//! There are helpers for the various severity levels:
//!
//! ```ignore
//! warning!(logger, event = "SOFT_LIMIT", attempt)
//! ```
//!
//! You can log errors too. They also need to be serializable, but there is a
//! helper method, `log()`, for `std::io::Error` and a few other types:
//!
//! ```ignore
//! error!(logger, event = "PAYLOAD", error = err.log())
//! ```
//!
//! Every record carries the timestamp, taken from the logger's clock, and the
//! host the logger was constructed with. Nothing is read from the ambient
//! environment while logging.

use std::io::Write;
use std::sync::Mutex;

use lazy_static::lazy_static;

pub trait Loggable {
    type Serialized;

    fn log(&self) -> Self::Serialized;
}

impl Loggable for std::io::Error {
    type Serialized = LoggableIoError;

    fn log(&self) -> Self::Serialized {
        self.into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LoggableIoError {
    kind: String,
    message: String,
}

impl From<&std::io::Error> for LoggableIoError {
    fn from(value: &std::io::Error) -> Self {
        Self {
            kind: format!("{:?}", value.kind()),
            message: value.to_string(),
        }
    }
}

impl From<std::io::Error> for LoggableIoError {
    fn from(value: std::io::Error) -> Self {
        (&value).into()
    }
}

impl std::fmt::Display for LoggableIoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Severity levels, for logging.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    fn as_fixed_length_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO ",
            Severity::Warning => "WARN ",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

/// Log at TRACE severity.
///
/// ```ignore
/// trace!(logger, name = "value", ...)
/// ```
#[allow(unused_macros)]
macro_rules! trace {
    ( $logger:expr, $($tokens:tt)+ ) => {
        $crate::log::log!($logger, $crate::log::Severity::Trace, $($tokens)+)
    };
}

/// Log at DEBUG severity.
///
/// ```ignore
/// debug!(logger, name = "value", ...)
/// ```
#[allow(unused_macros)]
macro_rules! debug {
    ( $logger:expr, $($tokens:tt)+ ) => {
        $crate::log::log!($logger, $crate::log::Severity::Debug, $($tokens)+)
    };
}

/// LOG at INFO severity.
///
/// ```ignore
/// info!(logger, name = "value", ...)
/// ```
#[allow(unused_macros)]
macro_rules! info {
    ( $logger:expr, $($tokens:tt)+ ) => {
        $crate::log::log!($logger, $crate::log::Severity::Info, $($tokens)+)
    };
}

/// LOG at WARNING severity.
///
/// ```ignore
/// warning!(logger, name = "value", ...)
/// ```
#[allow(unused_macros)]
macro_rules! warning {
    ( $logger:expr, $($tokens:tt)+ ) => {
        $crate::log::log!($logger, $crate::log::Severity::Warning, $($tokens)+)
    };
}

/// LOG at ERROR severity.
///
/// ```ignore
/// error!(logger, name = "value", ...)
/// ```
#[allow(unused_macros)]
macro_rules! error {
    ( $logger:expr, $($tokens:tt)+ ) => {
        $crate::log::log!($logger, $crate::log::Severity::Error, $($tokens)+)
    };
}

/// LOG at FATAL severity.
///
/// ```ignore
/// fatal!(logger, name = "value", ...)
/// ```
#[allow(unused_macros)]
macro_rules! fatal {
    ( $logger:expr, $($tokens:tt)+ ) => {
        $crate::log::log!($logger, $crate::log::Severity::Fatal, $($tokens)+)
    };
}

/// Log the values given with the given severity, stamped with the logger's
/// clock and host.
///
/// All values must be serializable with `serde`.
///
/// ```ignore
/// log!(logger, Severity::Debug, name = "value", ...)
/// ```
macro_rules! log {
    ( $logger:expr, $severity:expr, $($rest:tt)+ ) => {{
        #[allow(unused_imports)]
        use $crate::log::Loggable;
        let logger: &$crate::log::Logger = &$logger;
        let severity: $crate::log::Severity = $severity;
        if logger.is_enabled(severity) {
            #[allow(clippy::vec_init_then_push)]
            let mut writer = logger.new_writer(severity);
            $crate::log::add_log_pairs!(writer, $($rest)+);
            logger.emit(&*writer);
        }
    }};
}

#[doc(hidden)]
macro_rules! add_log_pairs {
    // Adds the name/value pair to the builder, and proceeds.
    //
    //     add_log_pairs!(builder, name = "value", ...)
    ( $builder:ident, $name: ident = $value:expr, $($rest:tt)* ) => {
        $crate::log::add_log_pairs!($builder, $name = $value);
        $crate::log::add_log_pairs!($builder, $($rest)*)
    };

    // Adds the name/value pair to the builder, and stops.
    //
    //     add_log_pairs!(builder, name = "value")
    ( $builder:ident, $name: ident = $value:expr ) => {
        $builder.add(
            stringify!($name).to_owned(),
            &$value,
        );
    };

    // Adds the value to the builder, using its name, and proceeds.
    //
    //     add_log_pairs!(builder, name, ...)
    ( $builder:ident, $name: ident, $($rest:tt)* ) => {
        $crate::log::add_log_pairs!($builder, $name);
        $crate::log::add_log_pairs!($builder, $($rest)*)
    };

    // Adds the value to the builder, using its name, and stops.
    //
    //     add_log_pairs!(builder, name)
    ( $builder:ident, $name: ident ) => {
        $crate::log::add_log_pairs!($builder, $name = $name);
    };

    // If the user leaves a trailing comma, this swallows it.
    ( $builder:ident, ) => {};
}

pub(crate) use add_log_pairs;
pub(crate) use log;

#[allow(unused_imports)]
pub(crate) use debug;
#[allow(unused_imports)]
pub(crate) use error;
#[allow(unused_imports)]
pub(crate) use fatal;
#[allow(unused_imports)]
pub(crate) use info;
#[allow(unused_imports)]
pub(crate) use trace;
#[allow(unused_imports)]
pub(crate) use warning;

/// The textual format used when writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    /// Text on a terminal, JSON everywhere else.
    pub fn detect() -> Self {
        if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
            LogFormat::Text
        } else {
            LogFormat::Json
        }
    }

    /// Constructs the underlying writer.
    pub fn new_writer(
        self,
        timestamp: chrono::DateTime<impl chrono::TimeZone>,
        host: &str,
        severity: Severity,
    ) -> Box<dyn LogWriter> {
        match self {
            Self::Json => Box::new(JsonLogWriter::new(timestamp, host, severity)),
            Self::Text => Box::new(TextLogWriter::new(timestamp, host, severity)),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            _ => Err(format!("unknown log format {:?}; expected json or text", s)),
        }
    }
}

/// Builds a set of values and writes them to a writer.
pub trait LogWriter {
    /// Adds a new key-value pair.
    fn add(&mut self, name: String, value: &dyn erased_serde::Serialize);

    /// Writes the values to the writer.
    fn write(&self, writer: &mut dyn Write) -> std::io::Result<()>;
}

/// Writes the given values in JSON format.
pub struct JsonLogWriter {
    object: serde_json::map::Map<String, serde_json::Value>,
}

impl JsonLogWriter {
    fn new(
        timestamp: chrono::DateTime<impl chrono::TimeZone>,
        host: &str,
        severity: Severity,
    ) -> Self {
        let mut object = serde_json::map::Map::new();
        object.insert(
            "timestamp".to_owned(),
            serde_json::Value::String(
                timestamp
                    .fixed_offset()
                    .to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
            ),
        );
        object.insert("host".to_owned(), serde_json::Value::String(host.to_owned()));
        object.insert(
            "severity".to_owned(),
            serde_json::to_value(severity).unwrap_or(serde_json::Value::Null),
        );
        Self { object }
    }
}

impl LogWriter for JsonLogWriter {
    fn add(&mut self, name: String, value: &dyn erased_serde::Serialize) {
        let value = serde_json::to_value(value)
            .unwrap_or_else(|error| serde_json::Value::String(format!("<{}>", error)));
        self.object.insert(name, value);
    }

    fn write(&self, writer: &mut dyn Write) -> std::io::Result<()> {
        let mut serializer = serde_json::Serializer::new(&mut *writer);
        serde::Serialize::serialize(&self.object, &mut serializer)?;
        writeln!(writer)
    }
}

/// Writes the given values in a pleasing text format.
pub struct TextLogWriter {
    timestamp: chrono::DateTime<chrono::FixedOffset>,
    host: String,
    severity: Severity,
    pairs: Vec<(String, String)>,
}

impl TextLogWriter {
    fn new(
        timestamp: chrono::DateTime<impl chrono::TimeZone>,
        host: &str,
        severity: Severity,
    ) -> Self {
        Self {
            timestamp: timestamp.fixed_offset(),
            host: host.to_owned(),
            severity,
            pairs: Vec::new(),
        }
    }
}

impl LogWriter for TextLogWriter {
    fn add(&mut self, name: String, value: &dyn erased_serde::Serialize) {
        let value_string = TEXT_SERIALIZER
            .to_string(value)
            .unwrap_or_else(|error| format!("<{}>", error));
        self.pairs.push((name, value_string))
    }

    fn write(&self, writer: &mut dyn Write) -> std::io::Result<()> {
        write!(
            writer,
            "{} {} [{}]",
            self.timestamp
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.host,
            self.severity.as_fixed_length_str()
        )?;
        let mut pairs_iter = self.pairs.iter();
        if let Some((name, value)) = pairs_iter.next() {
            write!(writer, " {} = {}", name, value)?;
        }
        for (name, value) in pairs_iter {
            write!(writer, ", {} = {}", name, value)?;
        }
        writeln!(writer)
    }
}

lazy_static! {
    static ref TEXT_SERIALIZER: ron::Options = ron::Options::default()
        .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
        .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
        .with_default_extension(ron::extensions::Extensions::UNWRAP_VARIANT_NEWTYPES);
}

pub type Clock = fn() -> chrono::DateTime<chrono::Utc>;

/// Where records go, and what they are stamped with.
pub struct Logger {
    host: String,
    format: LogFormat,
    minimum: Severity,
    clock: Clock,
    sink: Mutex<Box<dyn Write + Send>>,
}

impl Logger {
    pub fn new(host: impl Into<String>, format: LogFormat, sink: Box<dyn Write + Send>) -> Self {
        Self {
            host: host.into(),
            format,
            minimum: Severity::Info,
            clock: chrono::Utc::now,
            sink: Mutex::new(sink),
        }
    }

    pub fn to_stderr(host: impl Into<String>, format: LogFormat) -> Self {
        Self::new(host, format, Box::new(std::io::stderr()))
    }

    /// Appends to the file at the given path, creating it if necessary.
    pub fn to_file(
        host: impl Into<String>,
        format: LogFormat,
        path: &std::path::Path,
    ) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::new(host, format, Box::new(file)))
    }

    pub fn with_minimum(mut self, minimum: Severity) -> Self {
        self.minimum = minimum;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_enabled(&self, severity: Severity) -> bool {
        severity >= self.minimum
    }

    /// Internal; subject to change.
    #[doc(hidden)]
    pub fn new_writer(&self, severity: Severity) -> Box<dyn LogWriter> {
        self.format
            .new_writer((self.clock)(), &self.host, severity)
    }

    /// Internal; subject to change.
    #[doc(hidden)]
    pub fn emit(&self, writer: &dyn LogWriter) {
        // a poisoned lock still holds a usable sink
        let mut sink = match self.sink.lock() {
            Ok(sink) => sink,
            Err(poisoned) => poisoned.into_inner(),
        };
        // there is nowhere left to report a failure to log
        let _ = writer.write(&mut **sink).and_then(|()| sink.flush());
    }
}
