/*!
Task envelope codec.

Task parameters and results cross the generic task extension point as flat
JSON strings. Every typed parameter and result struct in [`crate::task`]
implements [`TaskPayload`], which ties it to the task it belongs to so that a
parse failure can name the task it happened in.
*/

use crate::task::TaskName;
use crate::{Result, SnapshotError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// A typed parameter or result body carried through the task envelope
pub trait TaskPayload: Serialize + DeserializeOwned {
    /// The task this payload belongs to
    const TASK: TaskName;

    /// Encode into the envelope string
    fn to_envelope(&self) -> Result<String> {
        encode(Self::TASK, self)
    }

    /// Decode from the envelope string
    fn from_envelope(text: &str) -> Result<Self> {
        decode(Self::TASK, text)
    }
}

/// Encode a typed payload for `task`
pub fn encode<T: Serialize>(task: TaskName, value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| SnapshotError::malformed(task.as_str(), e.to_string()))
}

/// Decode a typed payload for `task`
///
/// Missing required fields and fields of the wrong shape fail with
/// [`SnapshotError::MalformedPayload`]. An empty or blank body is treated as
/// `{}` so tasks without parameters can be invoked with an empty string.
pub fn decode<T: DeserializeOwned>(task: TaskName, text: &str) -> Result<T> {
    let body = if text.trim().is_empty() { "{}" } else { text };
    serde_json::from_str(body).map_err(|e| SnapshotError::malformed(task.as_str(), e.to_string()))
}

/// Accept an integer encoded either as a JSON number or as a numeric string
///
/// The bridge reports some ids as strings (`"restoreId" : "1000"`).
pub fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid integer '{s}': {e}"))),
    }
}

/// Optional variant of [`lenient_u64`]
pub fn lenient_opt_u64<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "lenient_u64")] u64);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(n)| n))
}
