//! Command and response type tags plus the recognized keyed-object keys.
//!
//! Tags and keys are matched case-insensitively on the wire; outbound
//! frames use the canonical spellings below. Unknown inbound tags and keys
//! are ignored for forward compatibility.

/// Outbound: request the list of capturable interfaces.
pub const CMD_LIST_DEVICE: &str = "LISTDEVICE";
/// Outbound: probe whether a definition is usable.
pub const CMD_PROBE_DEVICE: &str = "PROBEDEVICE";
/// Outbound: open a definition for capture.
pub const CMD_OPEN_DEVICE: &str = "OPENDEVICE";
/// Outbound: reconfigure a running source (channel or hop pattern).
pub const CMD_CONFIGURE: &str = "CONFIGURE";

/// Inbound response tags, lowercase for dispatch after case folding.
pub const RESP_LIST: &str = "listresp";
pub const RESP_PROBE: &str = "proberesp";
pub const RESP_OPEN: &str = "openresp";
pub const RESP_CONFIGURE: &str = "configresp";
pub const RESP_DATA: &str = "data";
pub const RESP_MESSAGE: &str = "message";
pub const RESP_ERROR: &str = "error";

/// Keyed-object keys (lowercase canonical form for lookup).
pub const KEY_SUCCESS: &str = "success";
pub const KEY_MESSAGE: &str = "message";
pub const KEY_CHANNELS: &str = "channels";
pub const KEY_CHANSET: &str = "chanset";
pub const KEY_CHANHOP: &str = "chanhop";
pub const KEY_UUID: &str = "uuid";
pub const KEY_INTERFACE_LIST: &str = "interfacelist";
pub const KEY_PACKET: &str = "packet";
pub const KEY_SIGNAL: &str = "signal";
pub const KEY_GPS: &str = "gps";

/// Outbound keyed-object keys.
pub const KEY_DEFINITION: &str = "DEFINITION";
pub const KEY_CHANSET_CMD: &str = "CHANSET";
pub const KEY_CHANHOP_CMD: &str = "CHANHOP";
