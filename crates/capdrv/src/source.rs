use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::BytesMut;
use capdrv_frame::{decode_frame, encode_frame, proto, Frame, HopRecord, KeyedObject};
use capdrv_transport::{ControlTransport, TransportEvents};

use crate::config::DriverConfig;
use crate::definition::SourceDefinition;
use crate::sink::{LogMessageSink, LogPacketSink, MessageSink, PacketSink, MSG_ERROR};
use crate::state::{ListedInterface, SourcePrototype, SourceState};
use crate::timer::{ThreadTimers, TimerId, TimerService};
use crate::tracker::{
    AckCallback, CommandKind, CommandTracker, Completion, ListCallback, PendingCommand,
};

pub(crate) const ERR_NOT_PROBE_CAPABLE: &str = "Driver not capable of probing";
pub(crate) const ERR_NOT_LOCAL_CAPABLE: &str = "Driver does not support direct capture";
pub(crate) const ERR_NOT_TUNE_CAPABLE: &str = "Driver not capable of changing channel";
pub(crate) const ERR_MALFORMED_DEFINITION: &str = "Malformed source config";
pub(crate) const ERR_WRITE_FAILED: &str = "unable to generate command frame";
pub(crate) const ERR_COMMAND_TIMEOUT: &str = "command timed out";
pub(crate) const CLOSE_REASON: &str = "Closing source";

/// Work collected under the driver lock and run after it is released:
/// completion callbacks, message-bus and packet-chain deliveries.
///
/// The original design runs callbacks while holding a reentrant lock;
/// without reentrancy the drain pattern keeps same-thread re-entry safe
/// while preserving arrival order.
pub(crate) type Deferred = Vec<Box<dyn FnOnce() + Send>>;

pub(crate) struct Inner {
    pub(crate) state: SourceState,
    pub(crate) tracker: CommandTracker,
    pub(crate) transport: Option<Box<dyn ControlTransport>>,
    /// Accumulator repopulated by each list response.
    pub(crate) listed: Vec<ListedInterface>,
    pub(crate) retry_timer: Option<TimerId>,
}

pub(crate) struct Shared {
    pub(crate) prototype: SourcePrototype,
    pub(crate) config: DriverConfig,
    pub(crate) timers: Arc<dyn TimerService>,
    pub(crate) packets: Arc<dyn PacketSink>,
    pub(crate) messages: Arc<dyn MessageSink>,
    pub(crate) inner: Mutex<Inner>,
}

/// Host-side driver endpoint for one capture source.
///
/// A `CaptureSource` manages exactly one control session: it emits
/// list/probe/open/configure commands, matches responses by sequence,
/// applies state updates, streams captured frames to the packet sink, and
/// supervises errors with optional automatic re-open.
///
/// All public operations are callback-based and non-blocking. Completion
/// callbacks run on whichever thread observed the response (typically the
/// transport's read thread) after internal locks are released, so a
/// callback may safely call back into the driver. Callbacks must not
/// block waiting on another thread that itself calls into the driver.
#[derive(Clone)]
pub struct CaptureSource {
    pub(crate) shared: Arc<Shared>,
}

impl CaptureSource {
    /// Create a driver with default config, thread timers, and log sinks.
    pub fn new(prototype: SourcePrototype) -> Self {
        Self::with_parts(
            prototype,
            DriverConfig::default(),
            Arc::new(ThreadTimers::new()),
            Arc::new(LogPacketSink),
            Arc::new(LogMessageSink),
        )
    }

    /// Create a driver wired to the host's timer service and sinks.
    pub fn with_parts(
        prototype: SourcePrototype,
        config: DriverConfig,
        timers: Arc<dyn TimerService>,
        packets: Arc<dyn PacketSink>,
        messages: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                prototype,
                config,
                timers,
                packets,
                messages,
                inner: Mutex::new(Inner {
                    state: SourceState::default(),
                    tracker: CommandTracker::new(),
                    transport: None,
                    listed: Vec::new(),
                    retry_timer: None,
                }),
            }),
        }
    }

    /// Attach a connected transport. The host also registers this driver
    /// as the transport's event target so `bytes_available` reaches it.
    pub fn connect_transport(&self, transport: Box<dyn ControlTransport>) {
        self.run_locked(|inner, _| {
            inner.transport = Some(transport);
        });
    }

    /// Snapshot of the observable source attributes.
    pub fn state(&self) -> SourceState {
        self.run_locked(|inner, _| inner.state.clone())
    }

    /// The interfaces reported by the most recent list response.
    pub fn listed_interfaces(&self) -> Vec<ListedInterface> {
        self.run_locked(|inner, _| inner.listed.clone())
    }

    pub fn prototype(&self) -> &SourcePrototype {
        &self.shared.prototype
    }

    /// Ask the remote for its capturable interfaces. The source closes
    /// itself once the response arrives.
    pub fn list_interfaces(&self, transaction: u32, callback: Option<ListCallback>) {
        self.run_locked(|inner, deferred| {
            if !self.shared.prototype.list_capable {
                if let Some(cb) = callback {
                    deferred.push(Box::new(move || cb(transaction, Vec::new())));
                }
                return;
            }

            self.send_command(
                inner,
                deferred,
                proto::CMD_LIST_DEVICE,
                Vec::new(),
                transaction,
                CommandKind::List,
                callback.map(Completion::List),
            );
        });
    }

    /// Ask the remote whether `definition` is usable. The source closes
    /// itself once the response arrives.
    pub fn probe_interface(
        &self,
        definition: &str,
        transaction: u32,
        callback: Option<AckCallback>,
    ) {
        self.run_locked(|inner, deferred| {
            if !self.shared.prototype.probe_capable {
                fail_sync(deferred, callback, transaction, ERR_NOT_PROBE_CAPABLE);
                return;
            }

            let parsed = match SourceDefinition::parse(definition) {
                Ok(parsed) => parsed,
                Err(err) => {
                    tracing::warn!(definition, error = %err, "rejecting probe definition");
                    fail_sync(deferred, callback, transaction, ERR_MALFORMED_DEFINITION);
                    return;
                }
            };
            inner.state.apply_definition(&parsed);

            let objects = vec![KeyedObject::new(
                proto::KEY_DEFINITION,
                definition.as_bytes().to_vec(),
            )];
            self.send_command(
                inner,
                deferred,
                proto::CMD_PROBE_DEVICE,
                objects,
                transaction,
                CommandKind::Probe,
                callback.map(Completion::Probe),
            );
        });
    }

    /// Open `definition` for capture. On success the source streams data
    /// frames until closed or errored.
    pub fn open_interface(
        &self,
        definition: &str,
        transaction: u32,
        callback: Option<AckCallback>,
    ) {
        self.run_locked(|inner, deferred| {
            if !self.shared.prototype.local_capable {
                fail_sync(deferred, callback, transaction, ERR_NOT_LOCAL_CAPABLE);
                return;
            }

            // A scheduled retry is superseded by an explicit open.
            if let Some(timer) = inner.retry_timer.take() {
                self.shared.timers.cancel(timer);
            }

            let parsed = match SourceDefinition::parse(definition) {
                Ok(parsed) => parsed,
                Err(err) => {
                    tracing::warn!(definition, error = %err, "rejecting open definition");
                    fail_sync(deferred, callback, transaction, ERR_MALFORMED_DEFINITION);
                    return;
                }
            };
            inner.state.apply_definition(&parsed);

            let objects = vec![KeyedObject::new(
                proto::KEY_DEFINITION,
                definition.as_bytes().to_vec(),
            )];
            self.send_command(
                inner,
                deferred,
                proto::CMD_OPEN_DEVICE,
                objects,
                transaction,
                CommandKind::Open,
                callback.map(Completion::Open),
            );
        });
    }

    /// Tune the source to a single channel.
    pub fn set_channel(&self, channel: &str, transaction: u32, callback: Option<AckCallback>) {
        self.run_locked(|inner, deferred| {
            if !self.shared.prototype.tune_capable {
                fail_sync(deferred, callback, transaction, ERR_NOT_TUNE_CAPABLE);
                return;
            }

            let objects = vec![KeyedObject::new(
                proto::KEY_CHANSET_CMD,
                channel.as_bytes().to_vec(),
            )];
            self.send_command(
                inner,
                deferred,
                proto::CMD_CONFIGURE,
                objects,
                transaction,
                CommandKind::Configure,
                callback.map(Completion::Configure),
            );
        });
    }

    /// Configure channel hopping over `channels` at `rate` channels per
    /// second.
    pub fn set_channel_hop(
        &self,
        rate: f64,
        channels: Vec<String>,
        transaction: u32,
        callback: Option<AckCallback>,
    ) {
        self.run_locked(|inner, deferred| {
            if !self.shared.prototype.tune_capable {
                fail_sync(deferred, callback, transaction, ERR_NOT_TUNE_CAPABLE);
                return;
            }

            let record = HopRecord { rate, channels };
            let objects = vec![KeyedObject::new(proto::KEY_CHANHOP_CMD, record.encode())];
            self.send_command(
                inner,
                deferred,
                proto::CMD_CONFIGURE,
                objects,
                transaction,
                CommandKind::Configure,
                callback.map(Completion::Configure),
            );
        });
    }

    /// Change only the hop rate, keeping the current hop pattern.
    pub fn set_channel_hop_rate(&self, rate: f64, transaction: u32, callback: Option<AckCallback>) {
        let channels = self.run_locked(|inner, _| inner.state.hop_channels.clone());
        self.set_channel_hop(rate, channels, transaction, callback);
    }

    /// Change only the hop pattern, keeping the current hop rate.
    pub fn set_channel_hop_list(
        &self,
        channels: Vec<String>,
        transaction: u32,
        callback: Option<AckCallback>,
    ) {
        let rate = self.run_locked(|inner, _| inner.state.hop_rate);
        self.set_channel_hop(rate, channels, transaction, callback);
    }

    /// Tear the session down: cancel any retry, fail every pending command,
    /// and close the transport.
    pub fn close_source(&self) {
        self.run_locked(|inner, deferred| {
            self.close_locked(inner, deferred, CLOSE_REASON);
        });
    }

    pub(crate) fn run_locked<R>(&self, f: impl FnOnce(&mut Inner, &mut Deferred) -> R) -> R {
        let mut deferred: Deferred = Vec::new();
        let result = {
            let mut inner = lock_inner(&self.shared.inner);
            f(&mut inner, &mut deferred)
        };
        for task in deferred {
            task();
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn send_command(
        &self,
        inner: &mut Inner,
        deferred: &mut Deferred,
        tag: &str,
        objects: Vec<KeyedObject>,
        transaction: u32,
        kind: CommandKind,
        completion: Option<Completion>,
    ) {
        let sequence = inner.tracker.allocate();

        let mut frame = Frame::new(tag, sequence);
        frame.objects = objects;

        let mut wire = BytesMut::new();
        let written = match encode_frame(&frame, &mut wire, self.shared.config.max_frame_size) {
            Ok(()) => match inner.transport.as_mut() {
                Some(transport) => match transport.put(&wire) {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::warn!(tag, sequence, error = %err, "command write failed");
                        false
                    }
                },
                None => {
                    tracing::warn!(tag, sequence, "no transport connected for command");
                    false
                }
            },
            Err(err) => {
                tracing::warn!(tag, sequence, error = %err, "command encode failed");
                false
            }
        };

        if !written {
            if let Some(completion) = completion {
                deferred.push(completion.into_failure(transaction, ERR_WRITE_FAILED));
            }
            return;
        }

        tracing::debug!(tag, sequence, transaction, "command sent");

        let mut command = PendingCommand::new(transaction, sequence, kind, completion);
        if let Some(timeout) = self.shared.config.command_timeout {
            let weak = Arc::downgrade(&self.shared);
            command.timer = Some(self.shared.timers.schedule(
                timeout,
                Box::new(move || {
                    if let Some(shared) = weak.upgrade() {
                        CaptureSource { shared }.cancel_command(sequence, ERR_COMMAND_TIMEOUT);
                    }
                }),
            ));
        }
        inner.tracker.register(command);
    }

    /// Fail a single pending command, leaving the session up. This is the
    /// timeout path.
    pub(crate) fn cancel_command(&self, sequence: u32, reason: &str) {
        self.run_locked(|inner, deferred| {
            if let Some(mut command) = inner.tracker.remove(sequence) {
                if let Some(timer) = command.timer.take() {
                    self.shared.timers.cancel(timer);
                }
                tracing::debug!(sequence, reason, "cancelling pending command");
                if let Some(completion) = command.take_completion() {
                    deferred.push(completion.into_failure(command.transaction, reason));
                }
            }
        });
    }

    pub(crate) fn cancel_all_locked(
        &self,
        inner: &mut Inner,
        deferred: &mut Deferred,
        reason: &str,
    ) {
        for mut command in inner.tracker.drain() {
            if let Some(timer) = command.timer.take() {
                self.shared.timers.cancel(timer);
            }
            if let Some(completion) = command.take_completion() {
                deferred.push(completion.into_failure(command.transaction, reason));
            }
        }
    }

    pub(crate) fn close_locked(&self, inner: &mut Inner, deferred: &mut Deferred, reason: &str) {
        if let Some(timer) = inner.retry_timer.take() {
            self.shared.timers.cancel(timer);
        }
        self.cancel_all_locked(inner, deferred, reason);
        if let Some(mut transport) = inner.transport.take() {
            transport.close(reason);
        }
        inner.state.running = false;
    }

    /// Terminal error path: fail everything pending, close the transport,
    /// latch the error state, and schedule a re-open when retry is on.
    pub(crate) fn trigger_error_locked(
        &self,
        inner: &mut Inner,
        deferred: &mut Deferred,
        reason: &str,
    ) {
        tracing::error!(source = %inner.state.name, reason, "source error");

        self.cancel_all_locked(inner, deferred, reason);
        if let Some(mut transport) = inner.transport.take() {
            transport.close(reason);
        }

        inner.state.error = true;
        inner.state.error_reason = reason.to_string();
        inner.state.running = false;

        self.schedule_retry_locked(inner, deferred);
    }

    fn schedule_retry_locked(&self, inner: &mut Inner, deferred: &mut Deferred) {
        if !inner.state.retry {
            let text = format!(
                "Source {} has encountered an error and is not configured to retry; it will remain closed",
                inner.state.name
            );
            self.deliver_message(deferred, text, MSG_ERROR);
            return;
        }

        inner.state.retry_attempts += 1;
        let text = format!(
            "Source {} has encountered an error, re-opening in {:?} ({} failures)",
            inner.state.name,
            self.shared.config.retry_delay,
            inner.state.retry_attempts
        );
        self.deliver_message(deferred, text, MSG_ERROR);

        if let Some(timer) = inner.retry_timer.take() {
            self.shared.timers.cancel(timer);
        }

        let definition = inner.state.definition.clone();
        let weak = Arc::downgrade(&self.shared);
        inner.retry_timer = Some(self.shared.timers.schedule(
            self.shared.config.retry_delay,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    CaptureSource { shared }.open_interface(&definition, 0, None);
                }
            }),
        ));
    }

    pub(crate) fn deliver_message(&self, deferred: &mut Deferred, text: String, flags: u32) {
        let messages = Arc::clone(&self.shared.messages);
        deferred.push(Box::new(move || messages.message(&text, flags)));
    }

    /// Drain complete frames from the transport until the decoder reports
    /// need-more. Frames leave the buffer whole or not at all.
    fn pump(&self) {
        self.run_locked(|inner, deferred| loop {
            enum Step {
                Idle,
                Frame(Frame),
                Fatal(String),
            }

            let step = {
                let Some(transport) = inner.transport.as_mut() else {
                    return;
                };
                let available = transport.available();
                if available == 0 {
                    Step::Idle
                } else {
                    let mut buf = vec![0u8; available];
                    match transport.peek(&mut buf) {
                        Err(err) => Step::Fatal(err.to_string()),
                        Ok(n) => match decode_frame(&buf[..n], self.shared.config.max_frame_size) {
                            Ok(None) => Step::Idle,
                            Ok(Some((frame, size))) => match transport.consume(size) {
                                Ok(()) => Step::Frame(frame),
                                Err(err) => Step::Fatal(err.to_string()),
                            },
                            Err(err) => {
                                Step::Fatal(format!("source sent an invalid control frame: {err}"))
                            }
                        },
                    }
                }
            };

            match step {
                Step::Idle => return,
                Step::Frame(frame) => self.dispatch_frame(inner, deferred, frame),
                Step::Fatal(reason) => {
                    self.trigger_error_locked(inner, deferred, &reason);
                    return;
                }
            }
        });
    }
}

impl TransportEvents for CaptureSource {
    fn bytes_available(&self, _amount: usize) {
        self.pump();
    }

    fn transport_error(&self, reason: &str) {
        self.run_locked(|inner, deferred| {
            self.trigger_error_locked(inner, deferred, reason);
        });
    }
}

fn fail_sync(
    deferred: &mut Deferred,
    callback: Option<AckCallback>,
    transaction: u32,
    reason: &'static str,
) {
    if let Some(cb) = callback {
        deferred.push(Box::new(move || cb(transaction, false, reason.to_string())));
    }
}

fn lock_inner(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}
