//! Inbound frame routing and response handling.
//!
//! Every response type runs the same path: optional message, state
//! mutations in a fixed key order, then the success record that resolves
//! the pending command and drives the terminal policy for that response
//! kind.

use std::sync::Arc;

use capdrv_frame::{
    proto, ChannelsRecord, Frame, GpsRecord, HopRecord, InterfaceListRecord, KvMap, MessageRecord,
    PacketRecord, SignalRecord, SuccessRecord,
};
use uuid::Uuid;

use crate::sink::CapturedFrame;
use crate::source::{CaptureSource, Deferred, Inner, CLOSE_REASON};
use crate::state::ListedInterface;
use crate::tracker::{CommandKind, Completion};

impl CaptureSource {
    pub(crate) fn dispatch_frame(&self, inner: &mut Inner, deferred: &mut Deferred, frame: Frame) {
        let tag = frame.type_tag.to_ascii_lowercase();
        let kv = frame.kv_map();

        match tag.as_str() {
            proto::RESP_LIST => self.handle_response(inner, deferred, CommandKind::List, &kv),
            proto::RESP_PROBE => self.handle_response(inner, deferred, CommandKind::Probe, &kv),
            proto::RESP_OPEN => self.handle_response(inner, deferred, CommandKind::Open, &kv),
            proto::RESP_CONFIGURE => {
                self.handle_response(inner, deferred, CommandKind::Configure, &kv)
            }
            proto::RESP_DATA => self.handle_data(inner, deferred, &kv),
            proto::RESP_MESSAGE => self.handle_message_frame(inner, deferred, &kv),
            proto::RESP_ERROR => self.handle_error_frame(inner, deferred, &kv),
            other => {
                // Unknown types are forward compatibility, not errors.
                tracing::debug!(type_tag = other, "ignoring unknown frame type");
            }
        }
    }

    fn handle_response(
        &self,
        inner: &mut Inner,
        deferred: &mut Deferred,
        kind: CommandKind,
        kv: &KvMap,
    ) {
        let mut message = String::new();
        if let Some(bytes) = kv.get(proto::KEY_MESSAGE) {
            match MessageRecord::decode(bytes) {
                Ok(record) => {
                    self.deliver_message(deferred, record.msg.clone(), record.flags);
                    message = record.msg;
                }
                Err(err) => {
                    self.trigger_error_locked(inner, deferred, &err.to_string());
                    return;
                }
            }
        }

        if !self.apply_state_objects(inner, deferred, kv) {
            return;
        }

        let Some(bytes) = kv.get(proto::KEY_SUCCESS) else {
            let reason = format!("no success record in {kind} response");
            self.trigger_error_locked(inner, deferred, &reason);
            return;
        };
        let success = match SuccessRecord::decode(bytes) {
            Ok(success) => success,
            Err(err) => {
                self.trigger_error_locked(inner, deferred, &err.to_string());
                return;
            }
        };

        if let Some(mut command) = inner.tracker.remove(success.sequence) {
            if let Some(timer) = command.timer.take() {
                self.shared.timers.cancel(timer);
            }
            if let Some(completion) = command.take_completion() {
                let transaction = command.transaction;
                deferred.push(match completion {
                    Completion::List(cb) => {
                        let interfaces = inner.listed.clone();
                        Box::new(move || cb(transaction, interfaces))
                    }
                    Completion::Probe(cb) | Completion::Open(cb) | Completion::Configure(cb) => {
                        let ok = success.success;
                        let msg = message.clone();
                        Box::new(move || cb(transaction, ok, msg))
                    }
                });
            }
        } else {
            tracing::debug!(sequence = success.sequence, "response for unknown sequence");
        }

        match kind {
            // List and probe are single-shot lifecycles.
            CommandKind::List | CommandKind::Probe => {
                self.close_locked(inner, deferred, CLOSE_REASON);
            }
            CommandKind::Open => {
                if success.success {
                    inner.state.running = true;
                    inner.state.error = false;
                    inner.state.error_reason.clear();
                    inner.state.retry_attempts = 0;
                } else {
                    let reason = fallback(&message, "open request failed");
                    self.trigger_error_locked(inner, deferred, reason);
                }
            }
            CommandKind::Configure => {
                if !success.success {
                    let reason = fallback(&message, "configure request failed");
                    self.trigger_error_locked(inner, deferred, reason);
                }
            }
        }
    }

    /// Apply state-mutation objects in their fixed priority order. Returns
    /// false when a malformed object ended the session.
    fn apply_state_objects(
        &self,
        inner: &mut Inner,
        deferred: &mut Deferred,
        kv: &KvMap,
    ) -> bool {
        if let Some(bytes) = kv.get(proto::KEY_CHANNELS) {
            match ChannelsRecord::decode(bytes) {
                Ok(record) => inner.state.channels = record.channels,
                Err(err) => {
                    self.trigger_error_locked(inner, deferred, &err.to_string());
                    return false;
                }
            }
        }

        if let Some(bytes) = kv.get(proto::KEY_CHANSET) {
            match std::str::from_utf8(bytes) {
                Ok(channel) => inner.state.set_channel(channel.to_string()),
                Err(_) => {
                    self.trigger_error_locked(
                        inner,
                        deferred,
                        "chanset object is not valid UTF-8",
                    );
                    return false;
                }
            }
        }

        if let Some(bytes) = kv.get(proto::KEY_CHANHOP) {
            match HopRecord::decode(bytes) {
                Ok(record) => inner.state.set_hop(record.rate, record.channels),
                Err(err) => {
                    self.trigger_error_locked(inner, deferred, &err.to_string());
                    return false;
                }
            }
        }

        if let Some(bytes) = kv.get(proto::KEY_UUID) {
            let parsed = std::str::from_utf8(bytes)
                .ok()
                .and_then(|text| Uuid::parse_str(text.trim()).ok());
            match parsed {
                Some(uuid) => inner.state.install_uuid(uuid),
                None => {
                    self.trigger_error_locked(inner, deferred, "unable to parse UUID in response");
                    return false;
                }
            }
        }

        if let Some(bytes) = kv.get(proto::KEY_INTERFACE_LIST) {
            match InterfaceListRecord::decode(bytes) {
                Ok(record) => {
                    inner.listed = record
                        .interfaces
                        .into_iter()
                        .map(|entry| ListedInterface {
                            interface: entry.interface,
                            flags: entry.flags,
                            prototype: self.shared.prototype.clone(),
                        })
                        .collect();
                }
                Err(err) => {
                    // A partial list is worse than none.
                    inner.listed.clear();
                    self.trigger_error_locked(inner, deferred, &err.to_string());
                    return false;
                }
            }
        }

        true
    }

    fn handle_data(&self, inner: &mut Inner, deferred: &mut Deferred, kv: &KvMap) {
        if let Some(bytes) = kv.get(proto::KEY_MESSAGE) {
            match MessageRecord::decode(bytes) {
                Ok(record) => self.deliver_message(deferred, record.msg, record.flags),
                Err(err) => {
                    self.trigger_error_locked(inner, deferred, &err.to_string());
                    return;
                }
            }
        }

        let Some(bytes) = kv.get(proto::KEY_PACKET) else {
            tracing::debug!("data frame without packet object");
            return;
        };
        let packet = match PacketRecord::decode(bytes) {
            Ok(packet) => packet,
            Err(err) => {
                self.trigger_error_locked(inner, deferred, &err.to_string());
                return;
            }
        };

        let signal = match kv.get(proto::KEY_SIGNAL).map(|b| SignalRecord::decode(b)) {
            None => None,
            Some(Ok(record)) => Some(record),
            Some(Err(err)) => {
                self.trigger_error_locked(inner, deferred, &err.to_string());
                return;
            }
        };

        let gps = match kv.get(proto::KEY_GPS).map(|b| GpsRecord::decode(b)) {
            None => None,
            Some(Ok(record)) => Some(record),
            Some(Err(err)) => {
                self.trigger_error_locked(inner, deferred, &err.to_string());
                return;
            }
        };

        let frame = CapturedFrame {
            ts_sec: packet.ts_sec,
            ts_usec: packet.ts_usec,
            dlt: packet.dlt,
            data: packet.data,
            signal,
            gps,
        };
        let sink = Arc::clone(&self.shared.packets);
        deferred.push(Box::new(move || sink.deliver(frame)));
    }

    fn handle_message_frame(&self, inner: &mut Inner, deferred: &mut Deferred, kv: &KvMap) {
        if let Some(bytes) = kv.get(proto::KEY_MESSAGE) {
            match MessageRecord::decode(bytes) {
                Ok(record) => self.deliver_message(deferred, record.msg, record.flags),
                Err(err) => self.trigger_error_locked(inner, deferred, &err.to_string()),
            }
        }
    }

    fn handle_error_frame(&self, inner: &mut Inner, deferred: &mut Deferred, kv: &KvMap) {
        let mut reason = "received error frame".to_string();
        if let Some(bytes) = kv.get(proto::KEY_MESSAGE) {
            match MessageRecord::decode(bytes) {
                Ok(record) => {
                    self.deliver_message(deferred, record.msg.clone(), record.flags);
                    reason = record.msg;
                }
                Err(err) => reason = err.to_string(),
            }
        }
        self.trigger_error_locked(inner, deferred, &reason);
    }
}

fn fallback<'a>(message: &'a str, default: &'a str) -> &'a str {
    if message.is_empty() {
        default
    } else {
        message
    }
}
