//! Typed views over the recognized keyed-object payloads.
//!
//! Each record decodes from the raw object bytes and encodes back to them;
//! the structured ones go through the [`Value`](crate::value::Value) codec,
//! `success` is a fixed-layout 5-byte record.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::{FrameError, Result};
use crate::proto;
use crate::value::{Value, ValueError};

/// Fixed-size acknowledgement carried by every command response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuccessRecord {
    pub success: bool,
    /// Sequence number of the command being acknowledged.
    pub sequence: u32,
}

impl SuccessRecord {
    pub const WIRE_SIZE: usize = 5;

    /// Decode the fixed record. Any other size is a structural failure.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::WIRE_SIZE {
            return Err(FrameError::BadFrame(format!(
                "success object is {} bytes, expected {}",
                bytes.len(),
                Self::WIRE_SIZE
            )));
        }
        let mut buf = bytes;
        let success = buf.get_u8() != 0;
        let sequence = buf.get_u32();
        Ok(Self { success, sequence })
    }

    pub fn encode(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(Self::WIRE_SIZE);
        dst.put_u8(self.success as u8);
        dst.put_u32(self.sequence);
        dst.freeze()
    }
}

/// Human-readable message with severity flags, forwarded to the host
/// message bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub msg: String,
    pub flags: u32,
}

impl MessageRecord {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let dict = decode_map(proto::KEY_MESSAGE, bytes)?;
        let msg = require_str(proto::KEY_MESSAGE, &dict, "msg")?;
        let flags = require_u64(proto::KEY_MESSAGE, &dict, "flags")? as u32;
        Ok(Self { msg, flags })
    }

    pub fn encode(&self) -> Bytes {
        Value::Map(vec![
            ("msg".to_string(), Value::str(&self.msg)),
            ("flags".to_string(), Value::UInt(self.flags as u64)),
        ])
        .to_bytes()
    }
}

/// Supported-channel advertisement; replaces the driver's channel list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelsRecord {
    pub channels: Vec<String>,
}

impl ChannelsRecord {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let dict = decode_map(proto::KEY_CHANNELS, bytes)?;
        let channels = require_str_array(proto::KEY_CHANNELS, &dict, "channels")?;
        Ok(Self { channels })
    }

    pub fn encode(&self) -> Bytes {
        Value::Map(vec![(
            "channels".to_string(),
            Value::Array(self.channels.iter().map(Value::str).collect()),
        )])
        .to_bytes()
    }
}

/// Channel-hop configuration: rotation rate and the hop pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct HopRecord {
    /// Hop rate in channels per second; 0 means a static channel.
    pub rate: f64,
    pub channels: Vec<String>,
}

impl HopRecord {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let dict = decode_map(proto::KEY_CHANHOP, bytes)?;
        let channels = require_str_array(proto::KEY_CHANHOP, &dict, "channels")?;
        let rate = dict
            .get("rate")
            .ok_or_else(|| FrameError::keyed(proto::KEY_CHANHOP, ValueError::Missing("rate")))?
            .as_f64()
            .ok_or_else(|| {
                FrameError::keyed(
                    proto::KEY_CHANHOP,
                    ValueError::WrongType {
                        field: "rate",
                        expected: "number",
                    },
                )
            })?;
        Ok(Self { rate, channels })
    }

    pub fn encode(&self) -> Bytes {
        Value::Map(vec![
            ("rate".to_string(), Value::Float(self.rate)),
            (
                "channels".to_string(),
                Value::Array(self.channels.iter().map(Value::str).collect()),
            ),
        ])
        .to_bytes()
    }
}

/// One interface reported by a list response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceEntry {
    pub interface: String,
    /// Free-form option flags; empty when the remote sent none.
    pub flags: String,
}

/// Interface inventory from a list response; replaces the accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceListRecord {
    pub interfaces: Vec<InterfaceEntry>,
}

impl InterfaceListRecord {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value = Value::decode(bytes).map_err(|e| FrameError::keyed(proto::KEY_INTERFACE_LIST, e))?;
        let items = value.as_array().ok_or_else(|| {
            FrameError::keyed(
                proto::KEY_INTERFACE_LIST,
                ValueError::WrongType {
                    field: "interfacelist",
                    expected: "array",
                },
            )
        })?;

        let mut interfaces = Vec::with_capacity(items.len());
        for item in items {
            let interface = item
                .get("interface")
                .ok_or_else(|| {
                    FrameError::keyed(proto::KEY_INTERFACE_LIST, ValueError::Missing("interface"))
                })?
                .as_str()
                .ok_or_else(|| {
                    FrameError::keyed(
                        proto::KEY_INTERFACE_LIST,
                        ValueError::WrongType {
                            field: "interface",
                            expected: "string",
                        },
                    )
                })?
                .to_string();

            let flags = match item.get("flags") {
                Some(v) => v
                    .as_str()
                    .ok_or_else(|| {
                        FrameError::keyed(
                            proto::KEY_INTERFACE_LIST,
                            ValueError::WrongType {
                                field: "flags",
                                expected: "string",
                            },
                        )
                    })?
                    .to_string(),
                None => String::new(),
            };

            interfaces.push(InterfaceEntry { interface, flags });
        }

        Ok(Self { interfaces })
    }

    pub fn encode(&self) -> Bytes {
        Value::Array(
            self.interfaces
                .iter()
                .map(|entry| {
                    Value::Map(vec![
                        ("interface".to_string(), Value::str(&entry.interface)),
                        ("flags".to_string(), Value::str(&entry.flags)),
                    ])
                })
                .collect(),
        )
        .to_bytes()
    }
}

/// A captured link-layer frame with its capture timestamp and DLT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketRecord {
    pub ts_sec: u64,
    pub ts_usec: u64,
    /// Link type of the raw bytes, passed through undecoded.
    pub dlt: u64,
    pub data: Bytes,
}

impl PacketRecord {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let dict = decode_map(proto::KEY_PACKET, bytes)?;
        let ts_sec = require_u64(proto::KEY_PACKET, &dict, "tv_sec")?;
        let ts_usec = require_u64(proto::KEY_PACKET, &dict, "tv_usec")?;
        let dlt = require_u64(proto::KEY_PACKET, &dict, "dlt")?;
        let size = require_u64(proto::KEY_PACKET, &dict, "size")?;

        let data = dict
            .get("packet")
            .ok_or_else(|| FrameError::keyed(proto::KEY_PACKET, ValueError::Missing("packet")))?
            .as_bin()
            .ok_or_else(|| {
                FrameError::keyed(
                    proto::KEY_PACKET,
                    ValueError::WrongType {
                        field: "packet",
                        expected: "binary",
                    },
                )
            })?;

        if data.len() as u64 != size {
            return Err(FrameError::keyed(
                proto::KEY_PACKET,
                "packet size did not match data size",
            ));
        }

        Ok(Self {
            ts_sec,
            ts_usec,
            dlt,
            data: Bytes::copy_from_slice(data),
        })
    }

    pub fn encode(&self) -> Bytes {
        Value::Map(vec![
            ("tv_sec".to_string(), Value::UInt(self.ts_sec)),
            ("tv_usec".to_string(), Value::UInt(self.ts_usec)),
            ("dlt".to_string(), Value::UInt(self.dlt)),
            ("size".to_string(), Value::UInt(self.data.len() as u64)),
            ("packet".to_string(), Value::Bin(self.data.clone())),
        ])
        .to_bytes()
    }
}

/// Radio-layer metadata attached to a captured frame. Every field is
/// optional; sources report whichever measurements they have.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignalRecord {
    pub signal_dbm: Option<i32>,
    pub noise_dbm: Option<i32>,
    pub signal_rssi: Option<i32>,
    pub noise_rssi: Option<i32>,
    pub freq_khz: Option<f64>,
    pub channel: Option<String>,
    pub datarate: Option<f64>,
}

impl SignalRecord {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let dict = decode_map(proto::KEY_SIGNAL, bytes)?;
        Ok(Self {
            signal_dbm: optional_i32(proto::KEY_SIGNAL, &dict, "signal_dbm")?,
            noise_dbm: optional_i32(proto::KEY_SIGNAL, &dict, "noise_dbm")?,
            signal_rssi: optional_i32(proto::KEY_SIGNAL, &dict, "signal_rssi")?,
            noise_rssi: optional_i32(proto::KEY_SIGNAL, &dict, "noise_rssi")?,
            freq_khz: optional_f64(proto::KEY_SIGNAL, &dict, "freq_khz")?,
            channel: optional_string(proto::KEY_SIGNAL, &dict, "channel")?,
            datarate: optional_f64(proto::KEY_SIGNAL, &dict, "datarate")?,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut entries = Vec::new();
        push_i32(&mut entries, "signal_dbm", self.signal_dbm);
        push_i32(&mut entries, "noise_dbm", self.noise_dbm);
        push_i32(&mut entries, "signal_rssi", self.signal_rssi);
        push_i32(&mut entries, "noise_rssi", self.noise_rssi);
        push_f64(&mut entries, "freq_khz", self.freq_khz);
        if let Some(channel) = &self.channel {
            entries.push(("channel".to_string(), Value::str(channel)));
        }
        push_f64(&mut entries, "datarate", self.datarate);
        Value::Map(entries).to_bytes()
    }
}

/// Geolocation metadata attached to a captured frame. All fields optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GpsRecord {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub precision: Option<f64>,
    pub fix: Option<i32>,
    pub time: Option<u64>,
    pub name: Option<String>,
}

impl GpsRecord {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let dict = decode_map(proto::KEY_GPS, bytes)?;
        Ok(Self {
            lat: optional_f64(proto::KEY_GPS, &dict, "lat")?,
            lon: optional_f64(proto::KEY_GPS, &dict, "lon")?,
            alt: optional_f64(proto::KEY_GPS, &dict, "alt")?,
            speed: optional_f64(proto::KEY_GPS, &dict, "speed")?,
            heading: optional_f64(proto::KEY_GPS, &dict, "heading")?,
            precision: optional_f64(proto::KEY_GPS, &dict, "precision")?,
            fix: optional_i32(proto::KEY_GPS, &dict, "fix")?,
            time: optional_u64(proto::KEY_GPS, &dict, "time")?,
            name: optional_string(proto::KEY_GPS, &dict, "name")?,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut entries = Vec::new();
        push_f64(&mut entries, "lat", self.lat);
        push_f64(&mut entries, "lon", self.lon);
        push_f64(&mut entries, "alt", self.alt);
        push_f64(&mut entries, "speed", self.speed);
        push_f64(&mut entries, "heading", self.heading);
        push_f64(&mut entries, "precision", self.precision);
        push_i32(&mut entries, "fix", self.fix);
        if let Some(time) = self.time {
            entries.push(("time".to_string(), Value::UInt(time)));
        }
        if let Some(name) = &self.name {
            entries.push(("name".to_string(), Value::str(name)));
        }
        Value::Map(entries).to_bytes()
    }
}

fn decode_map(key: &str, bytes: &[u8]) -> Result<Value> {
    let value = Value::decode(bytes).map_err(|e| FrameError::keyed(key, e))?;
    match value {
        Value::Map(_) => Ok(value),
        _ => Err(FrameError::keyed(
            key,
            ValueError::WrongType {
                field: "payload",
                expected: "map",
            },
        )),
    }
}

fn require_str(key: &str, dict: &Value, field: &'static str) -> Result<String> {
    dict.get(field)
        .ok_or_else(|| FrameError::keyed(key, ValueError::Missing(field)))?
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| {
            FrameError::keyed(
                key,
                ValueError::WrongType {
                    field,
                    expected: "string",
                },
            )
        })
}

fn require_u64(key: &str, dict: &Value, field: &'static str) -> Result<u64> {
    dict.get(field)
        .ok_or_else(|| FrameError::keyed(key, ValueError::Missing(field)))?
        .as_u64()
        .ok_or_else(|| {
            FrameError::keyed(
                key,
                ValueError::WrongType {
                    field,
                    expected: "unsigned integer",
                },
            )
        })
}

fn require_str_array(key: &str, dict: &Value, field: &'static str) -> Result<Vec<String>> {
    let items = dict
        .get(field)
        .ok_or_else(|| FrameError::keyed(key, ValueError::Missing(field)))?
        .as_array()
        .ok_or_else(|| {
            FrameError::keyed(
                key,
                ValueError::WrongType {
                    field,
                    expected: "array",
                },
            )
        })?;

    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_owned).ok_or_else(|| {
                FrameError::keyed(
                    key,
                    ValueError::WrongType {
                        field,
                        expected: "array of strings",
                    },
                )
            })
        })
        .collect()
}

fn optional_f64(key: &str, dict: &Value, field: &'static str) -> Result<Option<f64>> {
    match dict.get(field) {
        None => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or_else(|| {
            FrameError::keyed(
                key,
                ValueError::WrongType {
                    field,
                    expected: "number",
                },
            )
        }),
    }
}

fn optional_i32(key: &str, dict: &Value, field: &'static str) -> Result<Option<i32>> {
    match dict.get(field) {
        None => Ok(None),
        Some(v) => v
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| {
                FrameError::keyed(
                    key,
                    ValueError::WrongType {
                        field,
                        expected: "32-bit integer",
                    },
                )
            }),
    }
}

fn optional_u64(key: &str, dict: &Value, field: &'static str) -> Result<Option<u64>> {
    match dict.get(field) {
        None => Ok(None),
        Some(v) => v.as_u64().map(Some).ok_or_else(|| {
            FrameError::keyed(
                key,
                ValueError::WrongType {
                    field,
                    expected: "unsigned integer",
                },
            )
        }),
    }
}

fn optional_string(key: &str, dict: &Value, field: &'static str) -> Result<Option<String>> {
    match dict.get(field) {
        None => Ok(None),
        Some(v) => v.as_str().map(|s| Some(s.to_owned())).ok_or_else(|| {
            FrameError::keyed(
                key,
                ValueError::WrongType {
                    field,
                    expected: "string",
                },
            )
        }),
    }
}

fn push_f64(entries: &mut Vec<(String, Value)>, field: &str, value: Option<f64>) {
    if let Some(v) = value {
        entries.push((field.to_string(), Value::Float(v)));
    }
}

fn push_i32(entries: &mut Vec<(String, Value)>, field: &str, value: Option<i32>) {
    if let Some(v) = value {
        entries.push((field.to_string(), Value::Int(v as i64)));
    }
}
