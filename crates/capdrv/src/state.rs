use serde::Serialize;
use uuid::Uuid;

use crate::definition::SourceDefinition;

/// Capability record for a source type, declared by the driver's builder.
/// Operations gate on these before anything touches the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourcePrototype {
    /// Source type name, e.g. `linuxwifi`.
    pub source_type: String,
    pub list_capable: bool,
    pub probe_capable: bool,
    pub local_capable: bool,
    pub tune_capable: bool,
}

impl SourcePrototype {
    pub fn new(source_type: impl Into<String>) -> Self {
        Self {
            source_type: source_type.into(),
            list_capable: false,
            probe_capable: false,
            local_capable: false,
            tune_capable: false,
        }
    }

    pub fn list_capable(mut self, capable: bool) -> Self {
        self.list_capable = capable;
        self
    }

    pub fn probe_capable(mut self, capable: bool) -> Self {
        self.probe_capable = capable;
        self
    }

    pub fn local_capable(mut self, capable: bool) -> Self {
        self.local_capable = capable;
        self
    }

    pub fn tune_capable(mut self, capable: bool) -> Self {
        self.tune_capable = capable;
        self
    }
}

/// One interface reported by a list operation, paired with the prototype
/// that can drive it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedInterface {
    pub interface: String,
    pub flags: String,
    pub prototype: SourcePrototype,
}

/// Externally readable source attributes. Snapshots are cheap clones taken
/// under the driver lock.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceState {
    /// Display name (definition `name=` option, default interface).
    pub name: String,
    pub interface: String,
    /// The definition string exactly as supplied.
    pub definition: String,
    pub uuid: Option<Uuid>,
    /// True when the UUID came from the definition and must not be
    /// overwritten by the remote.
    pub uuid_locked: bool,
    /// Channels the source reports it can tune.
    pub channels: Vec<String>,
    /// Hop pattern when hopping.
    pub hop_channels: Vec<String>,
    /// Hop rate in channels per second; 0 means static.
    pub hop_rate: f64,
    /// Current channel when not hopping.
    pub channel: String,
    pub hopping: bool,
    /// Streaming capture data after a successful open.
    pub running: bool,
    pub error: bool,
    pub error_reason: String,
    pub retry: bool,
    /// Consecutive unsuccessful retry attempts.
    pub retry_attempts: u32,
}

impl SourceState {
    pub(crate) fn apply_definition(&mut self, def: &SourceDefinition) {
        self.definition = def.raw.clone();
        self.interface = def.interface.clone();
        self.name = def.name.clone();
        self.retry = def.retry;
        self.uuid_locked = false;
        if let Some(uuid) = def.uuid {
            self.uuid = Some(uuid);
            self.uuid_locked = true;
        }
    }

    pub(crate) fn set_channel(&mut self, channel: String) {
        self.channel = channel;
        self.hopping = false;
    }

    pub(crate) fn set_hop(&mut self, rate: f64, channels: Vec<String>) {
        self.hopping = rate > 0.0 && !channels.is_empty();
        self.hop_rate = rate;
        self.hop_channels = channels;
        if self.hopping {
            self.channel.clear();
        }
    }

    /// Install a remote-supplied UUID unless the definition pinned one.
    pub(crate) fn install_uuid(&mut self, uuid: Uuid) {
        if !self.uuid_locked {
            self.uuid = Some(uuid);
        }
    }
}
