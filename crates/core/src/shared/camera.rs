use serde::{Deserialize, Serialize};

/// A camera as listed by the registry.
///
/// Fetched fresh on every poll and never mutated locally. Only `id` and
/// `rtsp_url` are required; the registry may omit or null the rest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Camera {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub rtsp_url: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl Camera {
    pub fn new(id: impl Into<String>, rtsp_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            rtsp_url: rtsp_url.into(),
            status: None,
            location: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Name for log lines; falls back to the identifier.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().filter(|n| !n.is_empty()).unwrap_or(&self.id)
    }
}
