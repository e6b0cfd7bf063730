//! Broker-backed sink.
//!
//! Records are encoded as newline-delimited JSON envelopes and queued for a writer task that
//! owns the TCP connection. `write` never waits on the network; it fails when the queue is full or
//! the connection is gone, and the writer task flips the sink to not-ready as soon as the broker
//! hangs up so the registry can fall back.

use std::{
    io,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use serde::Serialize;
use serde_json::Value;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, BufWriter},
    net::TcpStream,
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
    time::timeout,
};

use super::{BrokerError, Level, Record, Sink, SinkError, SinkName};

pub const BROKER: &str = "Broker";

/// Records from one process share a key, so they stay in send order on the broker side.
const PARTITION_KEY: &str = "0";
const UNKNOWN_FILE: &str = "UNKNOWN FILE";
const CREATED_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Tried in order; the first one that accepts a connection is used.
    pub brokers: Vec<String>,
    pub topic: String,
    pub name: String,
    pub call_depth: usize,
    pub connect_timeout: Duration,
    /// Longest a single write may stall before the connection is given up.
    pub write_timeout: Duration,
    pub queue_capacity: usize,
}

impl BrokerConfig {
    pub fn new(brokers: Vec<String>, topic: impl Into<String>) -> Self {
        Self {
            brokers,
            topic: topic.into(),
            name: BROKER.to_string(),
            call_depth: 2,
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            queue_capacity: 1024,
        }
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }

    pub fn with_call_depth(self, call_depth: usize) -> Self {
        Self { call_depth, ..self }
    }

    pub fn with_connect_timeout(self, connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..self
        }
    }

    pub fn with_write_timeout(self, write_timeout: Duration) -> Self {
        Self {
            write_timeout,
            ..self
        }
    }

    pub fn with_queue_capacity(self, queue_capacity: usize) -> Self {
        Self {
            queue_capacity,
            ..self
        }
    }
}

#[derive(Serialize)]
struct BrokerMessage<'a> {
    loglevel: Level,
    created: String,
    file: &'a str,
    line: u32,
    log_message: &'a Value,
}

#[derive(Serialize)]
struct Envelope<'a> {
    topic: &'a str,
    key: &'a str,
    value: BrokerMessage<'a>,
}

/// Logs transport failures and forwards them to whoever subscribed.
#[derive(Clone, Default)]
struct ErrorReporter {
    subscriber: Arc<Mutex<Option<mpsc::UnboundedSender<BrokerError>>>>,
}

impl ErrorReporter {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<BrokerError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.subscriber.lock().unwrap_or_else(PoisonError::into_inner) = Some(sender);
        receiver
    }

    fn report(&self, sink: &SinkName, err: BrokerError) {
        tracing::warn!(target: "logswitch", sink = %sink, "failed to write log entry: {}", err);

        let subscriber = self.subscriber.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(subscriber) = subscriber.as_ref() {
            // A dropped receiver just means nobody is listening anymore.
            let _ = subscriber.send(err);
        }
    }
}

pub struct BrokerSink {
    name: SinkName,
    topic: String,
    addr: String,
    sender: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    ready: Arc<AtomicBool>,
    errors: ErrorReporter,
    call_depth: AtomicUsize,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl BrokerSink {
    /// Connects to the first reachable broker and starts the writer task on the current runtime.
    pub async fn connect(config: BrokerConfig) -> Result<Self, SinkError> {
        let name = SinkName::or_default(config.name, BROKER);
        let (stream, addr) = connect_any(&config.brokers, config.connect_timeout)
            .await
            .map_err(|e| {
                SinkError::unavailable(format!("broker {}", config.brokers.join(",")), e)
            })?;

        tracing::info!(target: "logswitch", sink = %name, addr = %addr, topic = %config.topic, "connected to broker");

        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let ready = Arc::new(AtomicBool::new(true));
        let errors = ErrorReporter::default();

        let writer = tokio::spawn(produce(
            stream,
            receiver,
            ready.clone(),
            errors.clone(),
            name.clone(),
            addr.clone(),
            config.write_timeout,
        ));

        Ok(Self {
            name,
            topic: config.topic,
            addr,
            sender: Mutex::new(Some(sender)),
            ready,
            errors,
            call_depth: AtomicUsize::new(config.call_depth),
            writer: Mutex::new(Some(writer)),
        })
    }

    /// Address of the broker this sink is connected to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Stream of transport failures from now on. Subscribing again replaces the previous stream.
    pub fn errors(&self) -> mpsc::UnboundedReceiver<BrokerError> {
        self.errors.subscribe()
    }

    /// Resolves once the writer task has drained the queue and closed the connection, which
    /// happens after [`Sink::shutdown`] or when the broker goes away.
    pub async fn closed(&self) {
        let writer = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(writer) = writer {
            if let Err(err) = writer.await {
                tracing::warn!(target: "logswitch", sink = %self.name, "broker producer task failed: {}", err);
            }
        }
    }

    fn encode(&self, record: &Record, call_depth: usize) -> Result<Vec<u8>, serde_json::Error> {
        let (file, line) = match record.location_for(call_depth) {
            Some(location) => (location.file(), location.line()),
            None => (UNKNOWN_FILE, 0),
        };

        let envelope = Envelope {
            topic: &self.topic,
            key: PARTITION_KEY,
            value: BrokerMessage {
                loglevel: record.level(),
                created: record.created().format(CREATED_FORMAT).to_string(),
                file,
                line,
                log_message: record.message(),
            },
        };

        let mut bytes = serde_json::to_vec(&envelope)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

impl Sink for BrokerSink {
    fn name(&self) -> &SinkName {
        &self.name
    }

    fn write_with_call_depth(&self, record: &Record, call_depth: usize) -> bool {
        let bytes = match self.encode(record, call_depth) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.errors.report(&self.name, err.into());
                return false;
            }
        };

        let result = {
            let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
            match sender.as_ref() {
                Some(sender) if self.is_ready() => Some(sender.try_send(bytes)),
                _ => None,
            }
        };

        let Some(result) = result else {
            self.errors.report(&self.name, BrokerError::Closed);
            return false;
        };

        match result {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.errors.report(&self.name, BrokerError::QueueFull);
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.ready.store(false, Ordering::SeqCst);
                self.errors.report(&self.name, BrokerError::Closed);
                false
            }
        }
    }

    fn set_call_depth(&self, call_depth: usize) {
        self.call_depth.store(call_depth, Ordering::Relaxed);
    }

    fn call_depth(&self) -> usize {
        self.call_depth.load(Ordering::Relaxed)
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Closes the queue; the writer task drains what is left, flushes and closes the connection.
    fn shutdown(&self) {
        self.ready.store(false, Ordering::SeqCst);

        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_some() {
            tracing::debug!(target: "logswitch", sink = %self.name, "closing broker producer");
        }
    }
}

async fn connect_any(brokers: &[String], connect_timeout: Duration) -> io::Result<(TcpStream, String)> {
    let mut last_err = io::Error::new(io::ErrorKind::InvalidInput, "no brokers configured");

    for addr in brokers {
        match timeout(connect_timeout, TcpStream::connect(addr.as_str())).await {
            Ok(Ok(stream)) => return Ok((stream, addr.clone())),
            Ok(Err(err)) => {
                tracing::debug!(target: "logswitch", addr = %addr, "broker connect failed: {}", err);
                last_err = err;
            }
            Err(_) => {
                tracing::debug!(target: "logswitch", addr = %addr, "broker connect timed out");
                last_err = io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connecting to {} timed out after {:?}", addr, connect_timeout),
                );
            }
        }
    }

    Err(last_err)
}

async fn produce(
    stream: TcpStream,
    mut receiver: mpsc::Receiver<Vec<u8>>,
    ready: Arc<AtomicBool>,
    errors: ErrorReporter,
    name: SinkName,
    addr: String,
    write_timeout: Duration,
) {
    let (mut read_half, write_half) = stream.into_split();
    let mut writer = BufWriter::new(write_half);
    let mut scratch = [0u8; 512];

    let failure = loop {
        tokio::select! {
            message = receiver.recv() => {
                let Some(message) = message else {
                    break None;
                };

                let written = timeout(write_timeout, async {
                    writer.write_all(&message).await?;
                    writer.flush().await
                })
                .await
                .unwrap_or_else(|_| Err(timed_out(write_timeout)));

                if let Err(source) = written {
                    break Some(source);
                }
            }
            read = read_half.read(&mut scratch) => {
                // Brokers don't talk back on this connection; EOF or an error means it's gone.
                match read {
                    Ok(0) => {
                        break Some(io::Error::new(io::ErrorKind::ConnectionAborted, "broker closed the connection"));
                    }
                    Ok(_) => {}
                    Err(source) => break Some(source),
                }
            }
        }
    };

    if let Some(source) = failure {
        ready.store(false, Ordering::SeqCst);
        errors.report(&name, BrokerError::Write { addr, source });

        receiver.close();
        let mut abandoned = 0;
        while receiver.try_recv().is_ok() {
            abandoned += 1;
        }
        if abandoned > 0 {
            errors.report(&name, BrokerError::Abandoned { count: abandoned });
        }
        return;
    }

    match timeout(write_timeout, writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::warn!(target: "logswitch", sink = %name, "failed closing broker connection: {}", err);
        }
        Err(_) => {
            tracing::warn!(target: "logswitch", sink = %name, "closing broker connection timed out");
        }
    }
    tracing::debug!(target: "logswitch", sink = %name, "broker producer stopped");
}

fn timed_out(after: Duration) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("broker stopped reading for {:?}", after),
    )
}
