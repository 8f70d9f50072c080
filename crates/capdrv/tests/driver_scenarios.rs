//! End-to-end driver scenarios against the in-memory loopback transport.
//!
//! The remote half of the loopback stands in for the capture process:
//! tests read the driver's emitted command frames, craft response frames,
//! and pump `bytes_available` by hand so partial reads and timer firings
//! stay fully deterministic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use capdrv::{
    AckCallback, CaptureSource, CapturedFrame, DriverConfig, ListCallback, ListedInterface,
    MessageSink, PacketSink, SourcePrototype, TimerId, TimerService, TransportEvents,
};
use capdrv_frame::{
    decode_frame, encode_frame, Frame, GpsRecord, HopRecord, InterfaceEntry, InterfaceListRecord,
    MessageRecord, PacketRecord, SignalRecord, SuccessRecord, DEFAULT_MAX_FRAME_SIZE,
};
use capdrv_transport::{loopback, LoopbackRemote};

struct ScheduledTask {
    id: TimerId,
    delay: Duration,
    task: Option<Box<dyn FnOnce() + Send>>,
}

/// Timer service that only fires when the test says so.
#[derive(Default)]
struct ManualTimers {
    next_id: AtomicU64,
    tasks: Mutex<Vec<ScheduledTask>>,
}

impl ManualTimers {
    fn last_delay(&self) -> Option<Duration> {
        self.tasks.lock().unwrap().last().map(|t| t.delay)
    }

    fn armed(&self) -> usize {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.task.is_some())
            .count()
    }

    /// Fire every armed task. Tasks run outside the lock so they may
    /// schedule or cancel timers themselves.
    fn fire_all(&self) -> usize {
        let ready: Vec<_> = self
            .tasks
            .lock()
            .unwrap()
            .iter_mut()
            .filter_map(|t| t.task.take())
            .collect();
        let count = ready.len();
        for task in ready {
            task();
        }
        count
    }
}

impl TimerService for ManualTimers {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> TimerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.tasks.lock().unwrap().push(ScheduledTask {
            id,
            delay,
            task: Some(task),
        });
        id
    }

    fn cancel(&self, id: TimerId) {
        for entry in self.tasks.lock().unwrap().iter_mut() {
            if entry.id == id {
                entry.task = None;
            }
        }
    }
}

#[derive(Default)]
struct RecordingPackets {
    frames: Mutex<Vec<CapturedFrame>>,
}

impl PacketSink for RecordingPackets {
    fn deliver(&self, frame: CapturedFrame) {
        self.frames.lock().unwrap().push(frame);
    }
}

#[derive(Default)]
struct RecordingMessages {
    entries: Mutex<Vec<(String, u32)>>,
}

impl MessageSink for RecordingMessages {
    fn message(&self, msg: &str, flags: u32) {
        self.entries.lock().unwrap().push((msg.to_string(), flags));
    }
}

struct Harness {
    source: CaptureSource,
    remote: LoopbackRemote,
    timers: Arc<ManualTimers>,
    packets: Arc<RecordingPackets>,
    messages: Arc<RecordingMessages>,
}

fn full_prototype() -> SourcePrototype {
    SourcePrototype::new("testwifi")
        .list_capable(true)
        .probe_capable(true)
        .local_capable(true)
        .tune_capable(true)
}

fn harness(prototype: SourcePrototype) -> Harness {
    harness_with(prototype, DriverConfig::default())
}

fn harness_with(prototype: SourcePrototype, config: DriverConfig) -> Harness {
    let timers = Arc::new(ManualTimers::default());
    let packets = Arc::new(RecordingPackets::default());
    let messages = Arc::new(RecordingMessages::default());

    let source = CaptureSource::with_parts(
        prototype,
        config,
        timers.clone(),
        packets.clone(),
        messages.clone(),
    );

    let (transport, remote) = loopback();
    source.connect_transport(Box::new(transport));

    Harness {
        source,
        remote,
        timers,
        packets,
        messages,
    }
}

fn pump(h: &Harness) {
    h.source.bytes_available(h.remote.pending_len());
}

/// Drain and decode the single command frame the driver just wrote.
fn sent_command(h: &Harness) -> Frame {
    let wire = h.remote.drain_sent();
    let (frame, size) = decode_frame(&wire, DEFAULT_MAX_FRAME_SIZE)
        .unwrap()
        .unwrap();
    assert_eq!(size, wire.len(), "driver wrote a partial or extra frame");
    frame
}

fn inject(h: &Harness, frame: &Frame) {
    let mut wire = BytesMut::new();
    encode_frame(frame, &mut wire, DEFAULT_MAX_FRAME_SIZE).unwrap();
    h.remote.inject(&wire);
    pump(h);
}

fn success_object(ok: bool, sequence: u32) -> bytes::Bytes {
    SuccessRecord {
        success: ok,
        sequence,
    }
    .encode()
}

type AckLog = Arc<Mutex<Vec<(u32, bool, String)>>>;

fn ack_recorder() -> (AckLog, AckCallback) {
    let log: AckLog = Arc::default();
    let slot = Arc::clone(&log);
    (
        log,
        Box::new(move |tx, ok, msg| slot.lock().unwrap().push((tx, ok, msg))),
    )
}

type ListLog = Arc<Mutex<Vec<(u32, Vec<ListedInterface>)>>>;

fn list_recorder() -> (ListLog, ListCallback) {
    let log: ListLog = Arc::default();
    let slot = Arc::clone(&log);
    (
        log,
        Box::new(move |tx, interfaces| slot.lock().unwrap().push((tx, interfaces))),
    )
}

#[test]
fn list_reports_interfaces_in_order_then_closes() {
    let h = harness(full_prototype());
    let (log, cb) = list_recorder();

    h.source.list_interfaces(7, Some(cb));
    let cmd = sent_command(&h);
    assert_eq!(cmd.type_tag, "LISTDEVICE");

    let mut resp = Frame::new("LISTRESP", 0);
    resp.push(
        "interfacelist",
        InterfaceListRecord {
            interfaces: vec![
                InterfaceEntry {
                    interface: "wlan0".to_string(),
                    flags: String::new(),
                },
                InterfaceEntry {
                    interface: "wlan1".to_string(),
                    flags: "monitor".to_string(),
                },
            ],
        }
        .encode(),
    );
    resp.push("success", success_object(true, cmd.sequence));
    inject(&h, &resp);

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    let (tx, interfaces) = &log[0];
    assert_eq!(*tx, 7);
    assert_eq!(interfaces.len(), 2);
    assert_eq!(interfaces[0].interface, "wlan0");
    assert_eq!(interfaces[0].flags, "");
    assert_eq!(interfaces[1].interface, "wlan1");
    assert_eq!(interfaces[1].flags, "monitor");
    assert_eq!(interfaces[0].prototype.source_type, "testwifi");

    // Listing is single-shot; the source closes behind it.
    assert_eq!(h.remote.close_reason().as_deref(), Some("Closing source"));
    assert!(!h.source.state().running);
}

#[test]
fn open_applies_state_and_sticky_uuid_wins() {
    let h = harness(full_prototype());
    let (log, cb) = ack_recorder();
    let definition = "wlan0:name=radio0,uuid=00000000-0000-0000-0000-000000000001";

    h.source.open_interface(definition, 1, Some(cb));
    let cmd = sent_command(&h);
    assert_eq!(cmd.type_tag, "OPENDEVICE");
    assert_eq!(
        cmd.kv_map().get("definition").unwrap().as_ref(),
        definition.as_bytes()
    );

    let mut resp = Frame::new("OPENRESP", 0);
    resp.push("uuid", "00000000-0000-0000-0000-000000000002");
    resp.push("chanset", "6");
    resp.push("success", success_object(true, cmd.sequence));
    inject(&h, &resp);

    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[(1, true, String::new())]
    );

    let state = h.source.state();
    assert_eq!(state.name, "radio0");
    assert_eq!(state.interface, "wlan0");
    assert_eq!(
        state.uuid.unwrap().to_string(),
        "00000000-0000-0000-0000-000000000001"
    );
    assert!(state.uuid_locked);
    assert_eq!(state.channel, "6");
    assert!(!state.hopping);
    assert!(state.running);
    assert!(!state.error);
}

#[test]
fn remote_uuid_installs_when_not_pinned() {
    let h = harness(full_prototype());

    h.source.open_interface("wlan0", 1, None);
    let cmd = sent_command(&h);

    let mut resp = Frame::new("OPENRESP", 0);
    resp.push("uuid", "00000000-0000-0000-0000-000000000002");
    resp.push("success", success_object(true, cmd.sequence));
    inject(&h, &resp);

    assert_eq!(
        h.source.state().uuid.unwrap().to_string(),
        "00000000-0000-0000-0000-000000000002"
    );
}

#[test]
fn bad_checksum_is_terminal_and_fails_pending_commands() {
    let h = harness(full_prototype());
    let (log, cb) = ack_recorder();

    h.source.open_interface("wlan0", 2, Some(cb));
    let _cmd = sent_command(&h);

    let mut resp = Frame::new("OPENRESP", 0);
    resp.push("success", success_object(true, 1234));
    let mut wire = BytesMut::new();
    encode_frame(&resp, &mut wire, DEFAULT_MAX_FRAME_SIZE).unwrap();
    let stored = u32::from_be_bytes(wire[4..8].try_into().unwrap());
    wire[4..8].copy_from_slice(&stored.wrapping_add(1).to_be_bytes());

    h.remote.inject(&wire);
    pump(&h);

    let state = h.source.state();
    assert!(state.error);
    assert!(state.error_reason.contains("invalid checksum"));
    assert!(!state.running);

    // No event reached the packet chain, and the pending open failed.
    assert!(h.packets.frames.lock().unwrap().is_empty());
    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].0, 2);
    assert!(!log[0].1);
    assert!(log[0].2.contains("invalid checksum"));
}

#[test]
fn hop_configure_roundtrip() {
    let h = harness(full_prototype());
    let (log, cb) = ack_recorder();
    let channels = vec!["1".to_string(), "6".to_string(), "11".to_string()];

    h.source.set_channel_hop(5.0, channels.clone(), 3, Some(cb));
    let cmd = sent_command(&h);
    assert_eq!(cmd.type_tag, "CONFIGURE");

    let sent_hop = HopRecord::decode(cmd.kv_map().get("chanhop").unwrap()).unwrap();
    assert_eq!(sent_hop.rate, 5.0);
    assert_eq!(sent_hop.channels, channels);

    let mut resp = Frame::new("CONFIGRESP", 0);
    resp.push(
        "chanhop",
        HopRecord {
            rate: 5.0,
            channels: channels.clone(),
        }
        .encode(),
    );
    resp.push("success", success_object(true, cmd.sequence));
    inject(&h, &resp);

    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[(3, true, String::new())]
    );

    let state = h.source.state();
    assert!(state.hopping);
    assert_eq!(state.hop_rate, 5.0);
    assert_eq!(state.hop_channels, channels);
    assert!(state.channel.is_empty());
}

#[test]
fn remote_error_schedules_retry_with_original_definition() {
    let h = harness(full_prototype());
    let definition = "wlan0:retry=true";

    h.source.open_interface(definition, 1, None);
    let cmd = sent_command(&h);
    let mut resp = Frame::new("OPENRESP", 0);
    resp.push("success", success_object(true, cmd.sequence));
    inject(&h, &resp);
    assert!(h.source.state().running);

    let mut error_frame = Frame::new("ERROR", 0);
    error_frame.push(
        "message",
        MessageRecord {
            msg: "radio died".to_string(),
            flags: 8,
        }
        .encode(),
    );
    inject(&h, &error_frame);

    let state = h.source.state();
    assert!(state.error);
    assert_eq!(state.error_reason, "radio died");
    assert_eq!(state.retry_attempts, 1);
    assert!(!state.running);
    assert_eq!(h.timers.last_delay(), Some(Duration::from_secs(5)));
    assert_eq!(h.timers.armed(), 1);

    let messages = h.messages.entries.lock().unwrap().clone();
    assert!(messages.iter().any(|(msg, flags)| msg == "radio died" && *flags == 8));
    assert!(messages.iter().any(|(msg, _)| msg.contains("re-opening")));

    // Host re-attaches a transport; the retry timer re-opens with the
    // original definition and no callback.
    let (transport, remote2) = loopback();
    h.source.connect_transport(Box::new(transport));
    assert_eq!(h.timers.fire_all(), 1);

    let wire = remote2.drain_sent();
    let (reopen, _) = decode_frame(&wire, DEFAULT_MAX_FRAME_SIZE)
        .unwrap()
        .unwrap();
    assert_eq!(reopen.type_tag, "OPENDEVICE");
    assert_eq!(
        reopen.kv_map().get("definition").unwrap().as_ref(),
        definition.as_bytes()
    );
}

#[test]
fn consecutive_errors_increment_retry_attempts() {
    let h = harness(full_prototype());

    h.source.open_interface("wlan0:retry=true", 1, None);
    let _ = sent_command(&h);

    let error_frame = Frame::new("ERROR", 0);
    inject(&h, &error_frame);
    assert_eq!(h.source.state().retry_attempts, 1);
    assert_eq!(h.source.state().error_reason, "received error frame");

    // Retry fires into a fresh transport, the remote errors again.
    let (transport, remote2) = loopback();
    h.source.connect_transport(Box::new(transport));
    h.timers.fire_all();
    assert!(!remote2.drain_sent().is_empty());

    h.source.transport_error("connection reset");
    let state = h.source.state();
    assert_eq!(state.retry_attempts, 2);
    assert_eq!(state.error_reason, "connection reset");
}

#[test]
fn successful_reopen_resets_retry_attempts() {
    let h = harness(full_prototype());

    h.source.open_interface("wlan0:retry=true", 1, None);
    let _ = sent_command(&h);
    inject(&h, &Frame::new("ERROR", 0));
    assert_eq!(h.source.state().retry_attempts, 1);

    let (transport, remote2) = loopback();
    h.source.connect_transport(Box::new(transport));
    h.timers.fire_all();

    let wire = remote2.drain_sent();
    let (reopen, _) = decode_frame(&wire, DEFAULT_MAX_FRAME_SIZE)
        .unwrap()
        .unwrap();
    let mut resp = Frame::new("OPENRESP", 0);
    resp.push("success", success_object(true, reopen.sequence));
    let mut resp_wire = BytesMut::new();
    encode_frame(&resp, &mut resp_wire, DEFAULT_MAX_FRAME_SIZE).unwrap();
    remote2.inject(&resp_wire);
    h.source.bytes_available(remote2.pending_len());

    let state = h.source.state();
    assert!(state.running);
    assert!(!state.error);
    assert_eq!(state.retry_attempts, 0);
}

#[test]
fn set_channel_not_capable_fails_synchronously() {
    let prototype = SourcePrototype::new("rtl433").local_capable(true);
    let h = harness(prototype);
    let (log, cb) = ack_recorder();

    h.source.set_channel("6", 9, Some(cb));

    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[(
            9,
            false,
            "Driver not capable of changing channel".to_string()
        )]
    );
    assert_eq!(h.remote.sent_len(), 0, "no bytes may be emitted");
}

#[test]
fn list_not_capable_returns_empty_vector() {
    let prototype = SourcePrototype::new("rtl433").local_capable(true);
    let h = harness(prototype);
    let (log, cb) = list_recorder();

    h.source.list_interfaces(4, Some(cb));

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].0, 4);
    assert!(log[0].1.is_empty());
    assert_eq!(h.remote.sent_len(), 0);
}

#[test]
fn malformed_definition_rejected_without_emitting() {
    let h = harness(full_prototype());
    let (log, cb) = ack_recorder();

    h.source.open_interface("wlan0:uuid=not-a-uuid", 5, Some(cb));

    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[(5, false, "Malformed source config".to_string())]
    );
    assert_eq!(h.remote.sent_len(), 0);
}

#[test]
fn partial_frames_consume_nothing() {
    let h = harness(full_prototype());
    let (log, cb) = ack_recorder();

    h.source.open_interface("wlan0", 1, Some(cb));
    let cmd = sent_command(&h);

    let mut resp = Frame::new("OPENRESP", 0);
    resp.push("chanset", "11");
    resp.push("success", success_object(true, cmd.sequence));
    let mut wire = BytesMut::new();
    encode_frame(&resp, &mut wire, DEFAULT_MAX_FRAME_SIZE).unwrap();

    let split = wire.len() / 2;
    h.remote.inject(&wire[..split]);
    pump(&h);
    assert_eq!(h.remote.pending_len(), split, "partial frame was consumed");
    assert!(log.lock().unwrap().is_empty());

    h.remote.inject(&wire[split..]);
    pump(&h);
    assert_eq!(h.remote.pending_len(), 0);
    assert_eq!(log.lock().unwrap().len(), 1);
    assert_eq!(h.source.state().channel, "11");
}

#[test]
fn two_frames_in_one_burst_both_dispatch() {
    let h = harness(full_prototype());

    h.source.open_interface("wlan0", 1, None);
    let cmd = sent_command(&h);

    let mut open_resp = Frame::new("OPENRESP", 0);
    open_resp.push("success", success_object(true, cmd.sequence));

    let mut data = Frame::new("DATA", 0);
    data.push(
        "packet",
        PacketRecord {
            ts_sec: 1_700_000_000,
            ts_usec: 1,
            dlt: 127,
            data: bytes::Bytes::from_static(&[0x80, 0x00]),
        }
        .encode(),
    );

    let mut wire = BytesMut::new();
    encode_frame(&open_resp, &mut wire, DEFAULT_MAX_FRAME_SIZE).unwrap();
    encode_frame(&data, &mut wire, DEFAULT_MAX_FRAME_SIZE).unwrap();
    h.remote.inject(&wire);
    pump(&h);

    assert!(h.source.state().running);
    assert_eq!(h.packets.frames.lock().unwrap().len(), 1);
    assert_eq!(h.remote.pending_len(), 0);
}

#[test]
fn data_frame_delivers_packet_with_metadata() {
    let h = harness(full_prototype());

    h.source.open_interface("wlan0", 1, None);
    let cmd = sent_command(&h);
    let mut resp = Frame::new("OPENRESP", 0);
    resp.push("success", success_object(true, cmd.sequence));
    inject(&h, &resp);

    let mut data = Frame::new("DATA", 0);
    data.push(
        "packet",
        PacketRecord {
            ts_sec: 1_700_000_000,
            ts_usec: 250_000,
            dlt: 127,
            data: bytes::Bytes::from_static(&[0x80, 0x00, 0x00, 0x00]),
        }
        .encode(),
    );
    data.push(
        "signal",
        SignalRecord {
            signal_dbm: Some(-40),
            channel: Some("6".to_string()),
            ..SignalRecord::default()
        }
        .encode(),
    );
    data.push(
        "gps",
        GpsRecord {
            lat: Some(42.36),
            lon: Some(-71.05),
            fix: Some(3),
            ..GpsRecord::default()
        }
        .encode(),
    );
    inject(&h, &data);

    let frames = h.packets.frames.lock().unwrap();
    assert_eq!(frames.len(), 1);
    let frame = &frames[0];
    assert_eq!(frame.ts_sec, 1_700_000_000);
    assert_eq!(frame.ts_usec, 250_000);
    assert_eq!(frame.dlt, 127);
    assert_eq!(frame.data.as_ref(), &[0x80, 0x00, 0x00, 0x00]);
    assert_eq!(frame.signal.as_ref().unwrap().signal_dbm, Some(-40));
    assert_eq!(frame.gps.as_ref().unwrap().fix, Some(3));
    assert!(!h.source.state().error);
}

#[test]
fn data_frame_without_packet_is_ignored() {
    let h = harness(full_prototype());

    h.source.open_interface("wlan0", 1, None);
    let cmd = sent_command(&h);
    let mut resp = Frame::new("OPENRESP", 0);
    resp.push("success", success_object(true, cmd.sequence));
    inject(&h, &resp);

    let data = Frame::new("DATA", 0);
    inject(&h, &data);

    assert!(h.packets.frames.lock().unwrap().is_empty());
    assert!(!h.source.state().error);
    assert!(h.source.state().running);
}

#[test]
fn malformed_packet_object_is_terminal() {
    let h = harness(full_prototype());

    h.source.open_interface("wlan0", 1, None);
    let cmd = sent_command(&h);
    let mut resp = Frame::new("OPENRESP", 0);
    resp.push("success", success_object(true, cmd.sequence));
    inject(&h, &resp);

    let mut data = Frame::new("DATA", 0);
    data.push("packet", &b"\xFFgarbage"[..]);
    inject(&h, &data);

    let state = h.source.state();
    assert!(state.error);
    assert!(state.error_reason.contains("packet"));
    assert!(h.packets.frames.lock().unwrap().is_empty());
}

#[test]
fn missing_success_record_is_terminal() {
    let h = harness(full_prototype());
    let (log, cb) = ack_recorder();

    h.source.open_interface("wlan0", 1, Some(cb));
    let _ = sent_command(&h);

    let resp = Frame::new("OPENRESP", 0);
    inject(&h, &resp);

    let state = h.source.state();
    assert!(state.error);
    assert!(state.error_reason.contains("no success record"));

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert!(!log[0].1);
}

#[test]
fn unknown_frame_types_are_ignored() {
    let h = harness(full_prototype());

    h.source.open_interface("wlan0", 1, None);
    let cmd = sent_command(&h);

    inject(&h, &Frame::new("FUTURETYPE", 99));
    assert!(!h.source.state().error);

    // The session still works afterwards.
    let mut resp = Frame::new("OPENRESP", 0);
    resp.push("success", success_object(true, cmd.sequence));
    inject(&h, &resp);
    assert!(h.source.state().running);
}

#[test]
fn failed_open_response_is_terminal() {
    let h = harness(full_prototype());
    let (log, cb) = ack_recorder();

    h.source.open_interface("wlan0", 1, Some(cb));
    let cmd = sent_command(&h);

    let mut resp = Frame::new("OPENRESP", 0);
    resp.push(
        "message",
        MessageRecord {
            msg: "no such interface".to_string(),
            flags: 4,
        }
        .encode(),
    );
    resp.push("success", success_object(false, cmd.sequence));
    inject(&h, &resp);

    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[(1, false, "no such interface".to_string())]
    );
    let state = h.source.state();
    assert!(state.error);
    assert_eq!(state.error_reason, "no such interface");
}

#[test]
fn probe_closes_after_response() {
    let h = harness(full_prototype());
    let (log, cb) = ack_recorder();

    h.source.probe_interface("wlan0", 4, Some(cb));
    let cmd = sent_command(&h);
    assert_eq!(cmd.type_tag, "PROBEDEVICE");

    let mut resp = Frame::new("PROBERESP", 0);
    resp.push(
        "channels",
        capdrv_frame::ChannelsRecord {
            channels: vec!["1".to_string(), "6".to_string()],
        }
        .encode(),
    );
    resp.push("success", success_object(true, cmd.sequence));
    inject(&h, &resp);

    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[(4, true, String::new())]
    );
    assert_eq!(
        h.source.state().channels,
        vec!["1".to_string(), "6".to_string()]
    );
    assert_eq!(h.remote.close_reason().as_deref(), Some("Closing source"));
}

#[test]
fn close_source_cancels_pending_commands() {
    let h = harness(full_prototype());
    let (log, cb) = ack_recorder();

    h.source.open_interface("wlan0", 1, Some(cb));
    let _ = sent_command(&h);

    h.source.close_source();

    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[(1, false, "Closing source".to_string())]
    );
    assert_eq!(h.remote.close_reason().as_deref(), Some("Closing source"));
    assert!(!h.source.state().error, "close is not an error");
}

#[test]
fn command_timeout_fails_only_that_command() {
    let config = DriverConfig {
        command_timeout: Some(Duration::from_secs(1)),
        ..DriverConfig::default()
    };
    let h = harness_with(full_prototype(), config);
    let (log, cb) = ack_recorder();

    h.source.open_interface("wlan0", 1, Some(cb));
    let _ = sent_command(&h);
    assert_eq!(h.timers.armed(), 1);

    h.timers.fire_all();

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].0, 1);
    assert!(!log[0].1);
    assert!(log[0].2.contains("timed out"));

    // The session survives a command timeout.
    assert!(!h.source.state().error);
    assert!(h.remote.close_reason().is_none());
}

#[test]
fn resolved_command_cancels_its_timeout() {
    let config = DriverConfig {
        command_timeout: Some(Duration::from_secs(1)),
        ..DriverConfig::default()
    };
    let h = harness_with(full_prototype(), config);
    let (log, cb) = ack_recorder();

    h.source.open_interface("wlan0", 1, Some(cb));
    let cmd = sent_command(&h);

    let mut resp = Frame::new("OPENRESP", 0);
    resp.push("success", success_object(true, cmd.sequence));
    inject(&h, &resp);
    assert_eq!(h.timers.armed(), 0);

    // Firing anything left over must not double-complete.
    h.timers.fire_all();
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[test]
fn error_cascade_blocks_the_next_operation() {
    let h = harness(full_prototype());

    h.source.open_interface("wlan0", 1, None);
    let _ = sent_command(&h);
    inject(&h, &Frame::new("ERROR", 0));
    assert!(h.source.state().error);

    // Transport is gone; a tune-capable op now fails at the write path.
    let (log, cb) = ack_recorder();
    h.source.set_channel("6", 9, Some(cb));
    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[(9, false, "unable to generate command frame".to_string())]
    );
    assert!(h.source.state().error);
}

#[test]
fn driver_sequences_are_consecutive_on_the_wire() {
    let h = harness(full_prototype());

    h.source.set_channel("1", 1, None);
    h.source.set_channel("6", 2, None);
    h.source.set_channel("11", 3, None);

    let wire = h.remote.drain_sent();
    let (first, used1) = decode_frame(&wire, DEFAULT_MAX_FRAME_SIZE)
        .unwrap()
        .unwrap();
    let (second, used2) = decode_frame(&wire[used1..], DEFAULT_MAX_FRAME_SIZE)
        .unwrap()
        .unwrap();
    let (third, _) = decode_frame(&wire[used1 + used2..], DEFAULT_MAX_FRAME_SIZE)
        .unwrap()
        .unwrap();

    assert_eq!(second.sequence, first.sequence.wrapping_add(1));
    assert_eq!(third.sequence, first.sequence.wrapping_add(2));
}
