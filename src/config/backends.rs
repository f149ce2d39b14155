use serde::{Deserialize, Serialize};

/// One configured backend. The URL string is the sole reload identity key:
/// two entries whose URLs match character-for-character are the same
/// backend; any difference forces teardown and reconstruction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackendEntry {
    pub id: String,

    /// Entries default to enabled; deployed configs only spell the field
    /// out to turn a backend off without deleting it.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    pub url: String,
}

fn default_enabled() -> bool {
    true
}
