/// Unique identifier of a submitted work item, assigned at submission time.
pub type WorkItemId = uuid::Uuid;

/// Identity of a registered mission. Used only for routing results.
pub type MissionId = u32;

/// Fixed position of an executor within the pool (`0..N`).
pub type SlotId = usize;

/// Opaque addressable resource descriptor, usually a URL.
///
/// The dispatch engine never inspects or deduplicates targets.
pub type Target = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
