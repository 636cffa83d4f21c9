use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Weekday::Monday => "monday",
            Weekday::Tuesday => "tuesday",
            Weekday::Wednesday => "wednesday",
            Weekday::Thursday => "thursday",
            Weekday::Friday => "friday",
            Weekday::Saturday => "saturday",
            Weekday::Sunday => "sunday",
        }
    }

    pub fn from_name(value: &str) -> Option<Self> {
        match value {
            "monday" => Some(Weekday::Monday),
            "tuesday" => Some(Weekday::Tuesday),
            "wednesday" => Some(Weekday::Wednesday),
            "thursday" => Some(Weekday::Thursday),
            "friday" => Some(Weekday::Friday),
            "saturday" => Some(Weekday::Saturday),
            "sunday" => Some(Weekday::Sunday),
            _ => None,
        }
    }

    /// Day-of-week token for cron expressions.
    pub fn cron_token(self) -> &'static str {
        match self {
            Weekday::Monday => "MON",
            Weekday::Tuesday => "TUE",
            Weekday::Wednesday => "WED",
            Weekday::Thursday => "THU",
            Weekday::Friday => "FRI",
            Weekday::Saturday => "SAT",
            Weekday::Sunday => "SUN",
        }
    }
}

/// A configured publication opportunity: fire time plus the prompt
/// template the slot generates with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub weekday: Weekday,
    pub hour: u8,
    pub minute: u8,
    /// Names the prompt template used when this slot generates a draft.
    pub label: String,
    pub description: String,
    pub enabled: bool,
}

/// Partial slot edit; `None` fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct SlotUpdate {
    pub hour: Option<u8>,
    pub minute: Option<u8>,
    pub label: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
}

/// An approved post parked against a future weekday. At most one exists
/// per weekday; a later `put` overwrites it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledPost {
    pub weekday: Weekday,
    pub text: String,
    pub media: Vec<String>,
    pub created_at: String,
    pub created_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Generate,
    Edit,
    PublishNow,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Generate => "generate",
            RecordKind::Edit => "edit",
            RecordKind::PublishNow => "publish_now",
        }
    }

    pub fn from_name(value: &str) -> Option<Self> {
        match value {
            "generate" => Some(RecordKind::Generate),
            "edit" => Some(RecordKind::Edit),
            "publish_now" => Some(RecordKind::PublishNow),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Completed,
    Failed,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Completed => "completed",
            RecordStatus::Failed => "failed",
        }
    }

    pub fn from_name(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RecordStatus::Pending),
            "completed" => Some(RecordStatus::Completed),
            "failed" => Some(RecordStatus::Failed),
            _ => None,
        }
    }
}

/// Append-only audit entry for one generation or edit request. Updated in
/// place by id until it reaches a terminal status; never read back into
/// control flow except as optional prompt context.
#[derive(Debug, Clone)]
pub struct GenerationRecord {
    pub id: String,
    pub kind: RecordKind,
    pub prompt: String,
    pub source_text: Option<String>,
    pub result_text: Option<String>,
    pub status: RecordStatus,
    pub error: Option<String>,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_name_round_trip() {
        for day in Weekday::ALL {
            assert_eq!(Weekday::from_name(day.as_str()), Some(day));
        }
        assert_eq!(Weekday::from_name("someday"), None);
    }

    #[test]
    fn record_enums_round_trip() {
        for kind in [RecordKind::Generate, RecordKind::Edit, RecordKind::PublishNow] {
            assert_eq!(RecordKind::from_name(kind.as_str()), Some(kind));
        }
        for status in [
            RecordStatus::Pending,
            RecordStatus::Completed,
            RecordStatus::Failed,
        ] {
            assert_eq!(RecordStatus::from_name(status.as_str()), Some(status));
        }
    }
}
