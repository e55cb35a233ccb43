use serde::Serialize;

/// Expected result of an admission operation.
///
/// None of these are faults; callers branch on them the way an HTTP layer
/// maps them to response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionStatus {
    Success,
    InvalidData,
    NotFound,
    Forbidden,
    TeamNotFound,
    UserNotFound,
    AlreadyMember,
    AlreadyProcessed,
    InviteExpired,
    MaxUsesReached,
}

impl AdmissionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, AdmissionStatus::Success)
    }
}

impl std::fmt::Display for AdmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            AdmissionStatus::Success => "success",
            AdmissionStatus::InvalidData => "invalid_data",
            AdmissionStatus::NotFound => "not_found",
            AdmissionStatus::Forbidden => "forbidden",
            AdmissionStatus::TeamNotFound => "team_not_found",
            AdmissionStatus::UserNotFound => "user_not_found",
            AdmissionStatus::AlreadyMember => "already_member",
            AdmissionStatus::AlreadyProcessed => "already_processed",
            AdmissionStatus::InviteExpired => "invite_expired",
            AdmissionStatus::MaxUsesReached => "max_uses_reached",
        };
        f.write_str(text)
    }
}

/// Status plus the resulting record, if the operation has one to show.
///
/// `data` is set on success and on terminal non-success outcomes such as
/// `AlreadyProcessed`, where it carries the record's current state.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    pub status: AdmissionStatus,
    pub data: Option<T>,
}

impl<T> Outcome<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: AdmissionStatus::Success,
            data: Some(data),
        }
    }

    pub fn with_data(status: AdmissionStatus, data: T) -> Self {
        Self {
            status,
            data: Some(data),
        }
    }

    pub fn status(status: AdmissionStatus) -> Self {
        Self { status, data: None }
    }

    pub fn invalid_data() -> Self {
        Self::status(AdmissionStatus::InvalidData)
    }

    pub fn not_found() -> Self {
        Self::status(AdmissionStatus::NotFound)
    }

    pub fn forbidden() -> Self {
        Self::status(AdmissionStatus::Forbidden)
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            status: self.status,
            data: self.data.map(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_constructors() {
        let outcome = Outcome::success(7);
        assert!(outcome.is_success());
        assert_eq!(outcome.data, Some(7));

        let denied: Outcome<i32> = Outcome::forbidden();
        assert_eq!(denied.status, AdmissionStatus::Forbidden);
        assert_eq!(denied.data, None);

        let mapped = Outcome::with_data(AdmissionStatus::AlreadyProcessed, 2).map(|n| n * 10);
        assert_eq!(mapped.status, AdmissionStatus::AlreadyProcessed);
        assert_eq!(mapped.data, Some(20));
    }

    #[test]
    fn test_status_serializes_as_snake_case() {
        let json = serde_json::to_string(&AdmissionStatus::MaxUsesReached).unwrap();
        assert_eq!(json, "\"max_uses_reached\"");
        assert_eq!(AdmissionStatus::InviteExpired.to_string(), "invite_expired");
    }
}
