use crawlgrid_core::{MissionId, Target};
use serde::{Deserialize, Serialize};

/// A record extracted from a fetched page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Extractor-defined category, e.g. `"page"` or `"category"`.
    pub kind: String,
    /// Target the entity was extracted from.
    pub source: Target,
    pub mission_id: MissionId,
    pub data: serde_json::Value,
}

impl Entity {
    pub fn new(kind: impl Into<String>, source: impl Into<Target>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            source: source.into(),
            mission_id: 0,
            data,
        }
    }

    /// Stamp the owning mission. Missions do this before saving.
    pub fn with_mission(mut self, mission_id: MissionId) -> Self {
        self.mission_id = mission_id;
        self
    }
}
