//! Source definition strings: `interface[:key=value,key=value,...]`.

use std::collections::HashMap;
use std::str::FromStr;

use uuid::Uuid;

/// Errors from definition parsing. A definition is accepted whole or
/// rejected whole.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("definition has an empty interface")]
    EmptyInterface,

    #[error("malformed option segment '{0}' (expected key=value)")]
    MalformedOption(String),

    #[error("invalid retry flag '{0}'")]
    InvalidRetry(String),

    #[error("invalid uuid '{value}'")]
    InvalidUuid {
        value: String,
        #[source]
        source: uuid::Error,
    },
}

/// A parsed source definition.
///
/// Recognized options are lifted into fields; everything else is retained
/// verbatim in `options` for source-type-specific layers to consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDefinition {
    /// The definition exactly as the user supplied it.
    pub raw: String,
    pub interface: String,
    /// Display name; defaults to the interface.
    pub name: String,
    /// User-pinned UUID. When present it is sticky: the remote must not
    /// overwrite it.
    pub uuid: Option<Uuid>,
    /// Re-open automatically after an error.
    pub retry: bool,
    /// Unrecognized options, keys lowercased.
    pub options: HashMap<String, String>,
}

impl SourceDefinition {
    pub fn parse(raw: &str) -> Result<Self, DefinitionError> {
        let (interface, opts) = match raw.split_once(':') {
            Some((interface, opts)) => (interface, Some(opts)),
            None => (raw, None),
        };

        if interface.is_empty() {
            return Err(DefinitionError::EmptyInterface);
        }

        let mut def = Self {
            raw: raw.to_string(),
            interface: interface.to_string(),
            name: interface.to_string(),
            uuid: None,
            retry: false,
            options: HashMap::new(),
        };

        let Some(opts) = opts else {
            return Ok(def);
        };

        for segment in opts.split(',') {
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| DefinitionError::MalformedOption(segment.to_string()))?;
            if key.is_empty() {
                return Err(DefinitionError::MalformedOption(segment.to_string()));
            }

            match key.to_ascii_lowercase().as_str() {
                "name" => def.name = value.to_string(),
                "uuid" => {
                    let parsed =
                        Uuid::parse_str(value).map_err(|source| DefinitionError::InvalidUuid {
                            value: value.to_string(),
                            source,
                        })?;
                    def.uuid = Some(parsed);
                }
                "retry" => def.retry = parse_bool(value)?,
                other => {
                    def.options.insert(other.to_string(), value.to_string());
                }
            }
        }

        Ok(def)
    }
}

impl FromStr for SourceDefinition {
    type Err = DefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_bool(value: &str) -> Result<bool, DefinitionError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(DefinitionError::InvalidRetry(value.to_string())),
    }
}
