use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::FrameError;

use super::DESTINATIONS_ARG;

/// Operation a frame asks the integration to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    #[serde(rename = "create/update")]
    CreateUpdate,
    #[serde(rename = "remove")]
    Remove,
}

/// One frame on the wire. A file transfer is one or more of these in order,
/// with `last_chunk` set only on the final one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeMessage {
    /// Base name of the file.
    pub name: String,
    /// Destination-relative directory, always rooted with a leading `/`.
    pub path: String,
    /// Opaque pass-through configuration, e.g. the destination list.
    #[serde(default)]
    pub arguments: BTreeMap<String, String>,
    /// Base64 of this chunk's bytes. Empty for removes.
    #[serde(default)]
    pub contents: String,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    #[serde(default)]
    pub last_chunk: bool,
}

impl ChangeMessage {
    /// Build a `create/update` frame carrying `chunk` encoded as base64.
    pub fn chunk(
        name: &str,
        path: &str,
        arguments: &BTreeMap<String, String>,
        chunk: &[u8],
        last_chunk: bool,
    ) -> Self {
        Self {
            name: name.to_owned(),
            path: path.to_owned(),
            arguments: arguments.clone(),
            contents: STANDARD.encode(chunk),
            change_type: ChangeType::CreateUpdate,
            last_chunk,
        }
    }

    /// Build the single frame of a remove.
    pub fn remove(name: &str, path: &str, arguments: &BTreeMap<String, String>) -> Self {
        Self {
            name: name.to_owned(),
            path: path.to_owned(),
            arguments: arguments.clone(),
            contents: String::new(),
            change_type: ChangeType::Remove,
            last_chunk: true,
        }
    }

    /// Reverse the base64 applied by the sender.
    pub fn decode_contents(&self) -> Result<Vec<u8>, FrameError> {
        STANDARD
            .decode(self.contents.as_bytes())
            .map_err(|source| FrameError::Contents {
                name: self.name.clone(),
                source,
            })
    }

    /// Destination roots from the `destinations` argument, empty entries skipped.
    ///
    /// Entries are taken verbatim: there is no escaping, and surrounding spaces are part
    /// of the path.
    pub fn destinations(&self) -> Result<Vec<&str>, FrameError> {
        let raw = self
            .arguments
            .get(DESTINATIONS_ARG)
            .ok_or_else(|| FrameError::NoDestinations {
                name: self.name.clone(),
            })?;
        let list: Vec<&str> = raw
            .split(',')
            .filter(|d| !d.is_empty())
            .collect();
        if list.is_empty() {
            return Err(FrameError::NoDestinations {
                name: self.name.clone(),
            });
        }
        Ok(list)
    }
}
