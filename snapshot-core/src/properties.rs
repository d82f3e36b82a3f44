/*!
Snapshot property persistence.

Snapshot properties are a small key/value set written as a content object
inside the source space, one `key=value` pair per line. Keys are written in
sorted order. Backslash escapes keep keys and values containing `=`, `\`,
line breaks or a leading `#` intact.
*/

use crate::constants::{SNAPSHOT_PROPS_CONTENT_ID, SNAPSHOT_PROPS_CONTENT_TYPE};
use crate::storage::StorageProvider;
use crate::{Result, SnapshotError};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Snapshot property set
pub type SnapshotProperties = BTreeMap<String, String>;

fn escape(text: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '=' if is_key => out.push_str("\\="),
            '#' | '!' if is_key && i == 0 => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Encode a property set into the line format
pub fn encode_properties(props: &SnapshotProperties) -> String {
    let mut text = String::new();
    for (key, value) in props {
        text.push_str(&escape(key, true));
        text.push('=');
        text.push_str(&escape(value, false));
        text.push('\n');
    }
    text
}

/// Split one line into its unescaped key and value
fn parse_line(line: &str, line_no: usize) -> Result<(String, String)> {
    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        let target = if in_value { &mut value } else { &mut key };
        match c {
            '\\' => match chars.next() {
                Some('n') => target.push('\n'),
                Some('r') => target.push('\r'),
                Some(other) => target.push(other),
                None => {
                    return Err(SnapshotError::storage(format!(
                        "dangling escape on properties line {line_no}"
                    )))
                }
            },
            '=' if !in_value => in_value = true,
            _ => target.push(c),
        }
    }

    if !in_value {
        return Err(SnapshotError::storage(format!(
            "properties line {line_no} has no '=' separator"
        )));
    }
    Ok((key, value))
}

/// Decode the line format back into a property set
///
/// Blank lines and lines starting with `#` or `!` are skipped.
pub fn decode_properties(text: &str) -> Result<SnapshotProperties> {
    let mut props = SnapshotProperties::new();
    for (idx, line) in text.lines().enumerate() {
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let (key, value) = parse_line(line, idx + 1)?;
        props.insert(key, value);
    }
    Ok(props)
}

/// SHA-256 of the encoded properties, hex encoded
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Writes and reads the snapshot properties object of a space
pub struct PropertyPersister<'a> {
    provider: &'a dyn StorageProvider,
}

impl<'a> PropertyPersister<'a> {
    pub fn new(provider: &'a dyn StorageProvider) -> Self {
        Self { provider }
    }

    /// Write `props` under the reserved content id, replacing any earlier object
    pub fn store_properties(&self, space_id: &str, props: &SnapshotProperties) -> Result<()> {
        let text = encode_properties(props);
        let data = text.as_bytes();
        let checksum = compute_checksum(data);

        debug!(
            space_id = %space_id,
            size = data.len(),
            checksum = %checksum,
            "Writing snapshot properties"
        );
        self.provider.add_content(
            space_id,
            SNAPSHOT_PROPS_CONTENT_ID,
            SNAPSHOT_PROPS_CONTENT_TYPE,
            data.len() as u64,
            &checksum,
            data,
        )?;

        info!(space_id = %space_id, entries = props.len(), "Snapshot properties stored");
        Ok(())
    }

    /// Read back the properties written by [`Self::store_properties`]
    pub fn load_properties(&self, space_id: &str) -> Result<SnapshotProperties> {
        let data = self.provider.get_content(space_id, SNAPSHOT_PROPS_CONTENT_ID)?;
        let text = String::from_utf8(data).map_err(|e| {
            SnapshotError::storage(format!("snapshot properties in {space_id} are not UTF-8: {e}"))
        })?;
        decode_properties(&text)
    }

    /// Whether a snapshot of `space_id` is still outstanding
    ///
    /// A missing properties object means no snapshot is in progress; any
    /// other read failure is passed on.
    pub fn has_properties(&self, space_id: &str) -> Result<bool> {
        match self.provider.get_content(space_id, SNAPSHOT_PROPS_CONTENT_ID) {
            Ok(_) => Ok(true),
            Err(SnapshotError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn remove_properties(&self, space_id: &str) -> Result<()> {
        self.provider.delete_content(space_id, SNAPSHOT_PROPS_CONTENT_ID)
    }
}
