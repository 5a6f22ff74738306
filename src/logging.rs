//! The logging fan-out.
//!
//! Every run of an [`App`][crate::App] routes the records of the [`log`] facade into up to three
//! kinds of destinations:
//!
//! * A *diagnostic* stream (`stdlog`), receiving everything below the error severity.
//! * An *error* stream (`stderr`), receiving errors and fatal records only.
//! * Any number of remote sinks ([`NetSink`]), receiving everything.
//!
//! All of them see only records passing the threshold derived from the verbosity (see
//! [`threshold`]).
//!
//! The sinks are built with [`fern`] and installed into the facade through [`log_reroute`], so
//! they can be replaced and removed at runtime. The [`Attachment`] guard removes them once
//! dropped.

use std::cmp;
use std::fmt::{self, Display, Formatter, Result as FmtResult};
use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use fern::{Dispatch, FormatCallback};
use log::{debug, Level, LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;

use crate::utils::NetAddress;

/// The log target marking fatal records.
///
/// See the [`fatal`][macro@crate::fatal] macro.
pub const FATAL_TARGET: &str = "fatal";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const RETRY_START: Duration = Duration::from_secs(1);
const RETRY_MAX: Duration = Duration::from_secs(30);

/// Severity of a log record.
///
/// This is the [`log::Level`] extended with the fatal severity on top.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Severity {
    /// Very detailed tracing.
    Trace,
    /// Debugging detail.
    Debug,
    /// Informational messages.
    Info,
    /// Warnings.
    Warn,
    /// Errors.
    Error,
    /// Errors the application can't continue after.
    Fatal,
}

impl Severity {
    /// Severity of a record with the given metadata.
    pub fn of(metadata: &Metadata) -> Self {
        match metadata.level() {
            Level::Error if metadata.target() == FATAL_TARGET => Severity::Fatal,
            Level::Error => Severity::Error,
            Level::Warn => Severity::Warn,
            Level::Info => Severity::Info,
            Level::Debug => Severity::Debug,
            Level::Trace => Severity::Trace,
        }
    }

    /// The most verbose [`LevelFilter`] that lets records of this severity through.
    pub fn level_filter(self) -> LevelFilter {
        match self {
            Severity::Fatal | Severity::Error => LevelFilter::Error,
            Severity::Warn => LevelFilter::Warn,
            Severity::Info => LevelFilter::Info,
            Severity::Debug => LevelFilter::Debug,
            Severity::Trace => LevelFilter::Trace,
        }
    }

    pub(crate) fn record_parts(self, target: &str) -> (Level, &str) {
        match self {
            Severity::Fatal => (Level::Error, FATAL_TARGET),
            Severity::Error => (Level::Error, target),
            Severity::Warn => (Level::Warn, target),
            Severity::Info => (Level::Info, target),
            Severity::Debug => (Level::Debug, target),
            Severity::Trace => (Level::Trace, target),
        }
    }
}

impl Display for Severity {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        let name = match self {
            Severity::Fatal => "FATAL",
            Severity::Error => "ERROR",
            Severity::Warn => "WARNING",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
            Severity::Trace => "TRACE",
        };
        fmt.write_str(name)
    }
}

/// Translates the verbosity (number of `-v` flags) to the minimal severity that gets logged.
///
/// | verbosity | surfaces                 |
/// |-----------|--------------------------|
/// | 0         | fatal                    |
/// | 1         | error and above          |
/// | 2         | warning and above        |
/// | 3         | informational and above  |
/// | 4 or more | everything               |
pub fn threshold(verbosity: i64) -> Severity {
    match verbosity {
        v if v <= 0 => Severity::Fatal,
        1 => Severity::Error,
        2 => Severity::Warn,
        3 => Severity::Info,
        _ => Severity::Trace,
    }
}

/// An in-memory output shared between clones.
///
/// Useful to capture what an application prints or logs, mostly in tests.
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded as UTF-8.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// Is there nothing written yet?
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    /// Throws away everything written so far.
    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A local output an application prints or logs into.
#[derive(Clone, Debug)]
pub enum Stream {
    /// The standard output of the process.
    Stdout,
    /// The standard error output of the process.
    Stderr,
    /// An in-memory buffer.
    Buffer(SharedBuffer),
}

impl Stream {
    /// Opens a new writer into the stream.
    pub fn writer(&self) -> Box<dyn Write + Send> {
        match self {
            Stream::Stdout => Box::new(io::stdout()),
            Stream::Stderr => Box::new(io::stderr()),
            Stream::Buffer(buffer) => Box::new(buffer.clone()),
        }
    }
}

impl From<SharedBuffer> for Stream {
    fn from(buffer: SharedBuffer) -> Self {
        Stream::Buffer(buffer)
    }
}

/// A fire-and-forget TCP log sink.
///
/// The connection is opened lazily, on the first record. While the remote side is unreachable,
/// records are thrown away and reconnection is attempted with an exponential backoff (starting at
/// a second, up to half a minute). Writing into the sink never fails.
#[derive(Debug)]
pub struct NetSink {
    address: NetAddress,
    conn: Option<TcpStream>,
    retry_at: Option<Instant>,
    retry_delay: Duration,
}

impl NetSink {
    /// Creates a sink sending to the given address.
    ///
    /// No connection is made yet.
    pub fn new(address: NetAddress) -> Self {
        Self {
            address,
            conn: None,
            retry_at: None,
            retry_delay: RETRY_START,
        }
    }

    /// The address the sink sends to.
    pub fn address(&self) -> &NetAddress {
        &self.address
    }

    /// Is there a live connection?
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn open(&self) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in (self.address.host.as_str(), self.address.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(conn) => return Ok(conn),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "Host resolved to no address")
        }))
    }

    // Note: no logging in here, we are called from inside the logger.
    fn connection(&mut self) -> Option<&mut TcpStream> {
        if self.conn.is_none() {
            let now = Instant::now();
            if self.retry_at.map(|at| now < at).unwrap_or(false) {
                return None;
            }
            match self.open() {
                Ok(conn) => {
                    self.conn = Some(conn);
                    self.retry_at = None;
                    self.retry_delay = RETRY_START;
                }
                Err(_) => {
                    self.retry_at = Some(now + self.retry_delay);
                    self.retry_delay = cmp::min(self.retry_delay * 2, RETRY_MAX);
                }
            }
        }
        self.conn.as_mut()
    }
}

impl Write for NetSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let failed = match self.connection() {
            Some(conn) => conn.write_all(buf).is_err(),
            None => false,
        };
        if failed {
            self.conn = None;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let failed = match self.conn.as_mut() {
            Some(conn) => conn.flush().is_err(),
            None => false,
        };
        if failed {
            self.conn = None;
        }
        Ok(())
    }
}

fn format_record(out: FormatCallback, message: &fmt::Arguments, record: &Record, app_id: &str) {
    out.finish(format_args!(
        "[pid: {} | log: {} | level: {} | time: {}]\n\t>>> {}",
        process::id(),
        app_id,
        Severity::of(record.metadata()),
        Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
        message,
    ))
}

struct Detached;

impl Log for Detached {
    fn enabled(&self, _: &Metadata) -> bool {
        false
    }
    fn log(&self, _: &Record) {}
    fn flush(&self) {}
}

/// Description of where the logs of one application go.
///
/// This is owned by the application, the sinks are created from it for each run by
/// [`attach`][FanOut::attach].
#[derive(Clone, Debug)]
pub struct FanOut {
    app_id: String,
    stdlog: Option<Stream>,
    stderr: Option<Stream>,
    attached: Arc<AtomicUsize>,
}

impl FanOut {
    /// Creates the fan-out.
    ///
    /// The `app_id` is put into every record. Passing `None` as a stream disables the
    /// corresponding sink.
    pub fn new<I: Into<String>>(app_id: I, stdlog: Option<Stream>, stderr: Option<Stream>) -> Self {
        Self {
            app_id: app_id.into(),
            stdlog,
            stderr,
            attached: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// How many sinks are currently attached to the logging facade.
    pub fn attached(&self) -> usize {
        self.attached.load(Ordering::Relaxed)
    }

    /// Creates the sinks and installs them into the logging facade.
    ///
    /// They stay installed until the returned guard is dropped. Only records with at least the
    /// `threshold` severity are let through. A remote sink is created for each of the `remotes`.
    pub fn attach(&self, threshold: Severity, remotes: &[NetAddress]) -> Attachment {
        let sinks = self.install(threshold, remotes);
        self.attached.fetch_add(sinks, Ordering::Relaxed);
        Attachment {
            fanout: self.clone(),
            sinks,
        }
    }

    fn dispatch(&self, threshold: Severity, remotes: &[NetAddress]) -> (Dispatch, usize) {
        let mut sinks = 0;
        let mut logger = Dispatch::new()
            .level(LevelFilter::Trace)
            .filter(move |metadata| Severity::of(metadata) >= threshold);
        if let Some(stdlog) = &self.stdlog {
            let app_id = self.app_id.clone();
            logger = logger.chain(
                Dispatch::new()
                    .filter(|metadata| Severity::of(metadata) < Severity::Error)
                    .format(move |out, message, record| {
                        format_record(out, message, record, &app_id)
                    })
                    .chain(stdlog.writer()),
            );
            sinks += 1;
        }
        if let Some(stderr) = &self.stderr {
            let app_id = self.app_id.clone();
            logger = logger.chain(
                Dispatch::new()
                    .filter(|metadata| Severity::of(metadata) >= Severity::Error)
                    .format(move |out, message, record| {
                        format_record(out, message, record, &app_id)
                    })
                    .chain(stderr.writer()),
            );
            sinks += 1;
        }
        for remote in remotes {
            let app_id = self.app_id.clone();
            let sink = NetSink::new(remote.clone());
            logger = logger.chain(
                Dispatch::new()
                    .format(move |out, message, record| {
                        format_record(out, message, record, &app_id)
                    })
                    .chain(Box::new(sink) as Box<dyn Write + Send>),
            );
            sinks += 1;
        }
        (logger, sinks)
    }

    fn install(&self, threshold: Severity, remotes: &[NetAddress]) -> usize {
        let (logger, sinks) = self.dispatch(threshold, remotes);
        let (_, logger) = logger.into_log();
        // Fails if it is already initialized, which is fine.
        let _ = log_reroute::init();
        log_reroute::reroute_boxed(logger);
        log::set_max_level(threshold.level_filter());
        debug!(
            "Attached {} log sinks with threshold {} for {}",
            sinks, threshold, self.app_id
        );
        sinks
    }
}

/// Keeps the sinks of a [`FanOut`] installed.
///
/// Dropping it detaches all the sinks from the logging facade.
#[must_use = "The sinks are detached right away if the attachment is dropped"]
#[derive(Debug)]
pub struct Attachment {
    fanout: FanOut,
    sinks: usize,
}

impl Attachment {
    /// Number of sinks held by this attachment.
    pub fn sinks(&self) -> usize {
        self.sinks
    }

    /// Replaces the attached sinks with ones with a different threshold and remote sinks.
    pub fn reconfigure(&mut self, threshold: Severity, remotes: &[NetAddress]) {
        let sinks = self.fanout.install(threshold, remotes);
        self.fanout.attached.fetch_sub(self.sinks, Ordering::Relaxed);
        self.fanout.attached.fetch_add(sinks, Ordering::Relaxed);
        self.sinks = sinks;
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        debug!("Detaching {} log sinks of {}", self.sinks, self.fanout.app_id);
        log::logger().flush();
        log_reroute::reroute(Detached);
        log::set_max_level(LevelFilter::Off);
        self.fanout.attached.fetch_sub(self.sinks, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::net::TcpListener;

    use log::{error, info, warn};

    use super::*;

    #[test]
    fn verbosity_mapping() {
        assert_eq!(Severity::Fatal, threshold(-1));
        assert_eq!(Severity::Fatal, threshold(0));
        assert_eq!(Severity::Error, threshold(1));
        assert_eq!(Severity::Warn, threshold(2));
        assert_eq!(Severity::Info, threshold(3));
        assert_eq!(Severity::Trace, threshold(4));
        assert_eq!(Severity::Trace, threshold(42));
        assert!(threshold(4) <= Severity::Debug);
    }

    #[test]
    fn fatal_records() {
        let fatal = Metadata::builder()
            .level(Level::Error)
            .target(FATAL_TARGET)
            .build();
        let error = Metadata::builder()
            .level(Level::Error)
            .target("ceremony::app")
            .build();
        assert_eq!(Severity::Fatal, Severity::of(&fatal));
        assert_eq!(Severity::Error, Severity::of(&error));
        assert!(Severity::Fatal > Severity::Error);
    }

    #[test]
    fn routing() {
        let _serial = crate::tests::serial();
        let stdlog = SharedBuffer::new();
        let stderr = SharedBuffer::new();
        let fanout = FanOut::new(
            "acme.routing.1-0",
            Some(stdlog.clone().into()),
            Some(stderr.clone().into()),
        );
        let attachment = fanout.attach(Severity::Warn, &[]);
        assert_eq!(2, attachment.sinks());
        assert_eq!(2, fanout.attached());

        warn!("routing-warn-marker");
        info!("routing-info-marker");
        error!("routing-error-marker");
        crate::fatal!("routing-fatal-marker");

        let diag = stdlog.contents();
        let errs = stderr.contents();
        assert!(diag.contains("routing-warn-marker"));
        assert!(diag.contains("level: WARNING"));
        assert!(diag.contains("log: acme.routing.1-0"));
        assert!(!diag.contains("routing-info-marker"));
        assert!(!diag.contains("routing-error-marker"));
        assert!(errs.contains("routing-error-marker"));
        assert!(errs.contains("routing-fatal-marker"));
        assert!(errs.contains("level: FATAL"));
        assert!(!errs.contains("routing-warn-marker"));

        drop(attachment);
        assert_eq!(0, fanout.attached());
        crate::fatal!("routing-after-marker");
        assert!(!stderr.contents().contains("routing-after-marker"));
    }

    #[test]
    fn reconfigure_keeps_count() {
        let _serial = crate::tests::serial();
        let stderr = SharedBuffer::new();
        let fanout = FanOut::new("acme.reconf.1-0", None, Some(stderr.clone().into()));
        let mut attachment = fanout.attach(Severity::Fatal, &[]);
        error!("reconf-hidden-marker");
        assert_eq!(1, fanout.attached());

        attachment.reconfigure(Severity::Error, &[NetAddress::new("127.0.0.1", 1)]);
        assert_eq!(2, attachment.sinks());
        assert_eq!(2, fanout.attached());
        error!("reconf-shown-marker");

        drop(attachment);
        assert_eq!(0, fanout.attached());
        let errs = stderr.contents();
        assert!(!errs.contains("reconf-hidden-marker"));
        assert!(errs.contains("reconf-shown-marker"));
    }

    #[test]
    fn net_sink_delivers() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut sink = NetSink::new(NetAddress::new("127.0.0.1", port));
        assert!(!sink.is_connected());
        sink.write_all(b"hello over the wire\n").unwrap();
        sink.flush().unwrap();
        assert!(sink.is_connected());
        let (mut conn, _) = listener.accept().unwrap();
        drop(sink);
        let mut received = String::new();
        conn.read_to_string(&mut received).unwrap();
        assert_eq!("hello over the wire\n", received);
    }

    #[test]
    fn net_sink_unreachable() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut sink = NetSink::new(NetAddress::new("127.0.0.1", port));
        assert_eq!(5, sink.write(b"lost\n").unwrap());
        assert!(!sink.is_connected());
        // Backing off, doesn't even try now.
        assert_eq!(5, sink.write(b"lost\n").unwrap());
        assert!(sink.retry_at.is_some());
        assert_eq!(RETRY_START * 2, sink.retry_delay);
    }

    #[test]
    fn shared_buffer() {
        let buffer = SharedBuffer::new();
        assert!(buffer.is_empty());
        let mut writer = Stream::from(buffer.clone()).writer();
        writeln!(writer, "printed").unwrap();
        assert_eq!("printed\n", buffer.contents());
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
