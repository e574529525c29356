use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status shared by job and step executions.
///
/// Variants are declared in upgrade order: a later variant is "further along"
/// than an earlier one when two statuses are combined with [`BatchStatus::upgrade_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Completed,
    Starting,
    Started,
    Stopping,
    Stopped,
    Failed,
    Abandoned,
    Unknown,
}

impl BatchStatus {
    pub const ALL: [BatchStatus; 8] = [
        BatchStatus::Completed,
        BatchStatus::Starting,
        BatchStatus::Started,
        BatchStatus::Stopping,
        BatchStatus::Stopped,
        BatchStatus::Failed,
        BatchStatus::Abandoned,
        BatchStatus::Unknown,
    ];

    pub fn is_running(self) -> bool {
        matches!(
            self,
            BatchStatus::Starting | BatchStatus::Started | BatchStatus::Stopping
        )
    }

    pub fn is_unsuccessful(self) -> bool {
        self >= BatchStatus::Failed
    }

    /// Combine two statuses.
    ///
    /// Once either side is past `Started` the greater one wins. Otherwise a
    /// `Completed` on either side wins over a running status.
    pub fn upgrade_to(self, other: BatchStatus) -> BatchStatus {
        if self > BatchStatus::Started || other > BatchStatus::Started {
            return self.max(other);
        }
        if self == BatchStatus::Completed || other == BatchStatus::Completed {
            return BatchStatus::Completed;
        }
        self.max(other)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::Starting => "STARTING",
            BatchStatus::Started => "STARTED",
            BatchStatus::Stopping => "STOPPING",
            BatchStatus::Stopped => "STOPPED",
            BatchStatus::Failed => "FAILED",
            BatchStatus::Abandoned => "ABANDONED",
            BatchStatus::Unknown => "UNKNOWN",
        }
    }

    pub fn from_name(name: &str) -> Option<BatchStatus> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exit code plus free text describing how an execution ended.
///
/// The framework codes are the constants below; any other code is a custom
/// code chosen by job logic and is the most severe when combined.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExitStatus {
    pub exit_code: String,
    #[serde(default)]
    pub exit_description: String,
}

impl ExitStatus {
    pub const UNKNOWN_CODE: &'static str = "UNKNOWN";
    pub const EXECUTING_CODE: &'static str = "EXECUTING";
    pub const COMPLETED_CODE: &'static str = "COMPLETED";
    pub const NOOP_CODE: &'static str = "NOOP";
    pub const FAILED_CODE: &'static str = "FAILED";
    pub const STOPPED_CODE: &'static str = "STOPPED";

    const FRAMEWORK_CODES: [&'static str; 6] = [
        Self::UNKNOWN_CODE,
        Self::EXECUTING_CODE,
        Self::COMPLETED_CODE,
        Self::NOOP_CODE,
        Self::FAILED_CODE,
        Self::STOPPED_CODE,
    ];

    pub fn new(exit_code: impl Into<String>) -> Self {
        Self::with_description(exit_code, "")
    }

    pub fn with_description(exit_code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            exit_code: exit_code.into(),
            exit_description: description.into(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(Self::UNKNOWN_CODE)
    }

    pub fn executing() -> Self {
        Self::new(Self::EXECUTING_CODE)
    }

    pub fn completed() -> Self {
        Self::new(Self::COMPLETED_CODE)
    }

    pub fn failed() -> Self {
        Self::new(Self::FAILED_CODE)
    }

    pub fn stopped() -> Self {
        Self::new(Self::STOPPED_CODE)
    }

    /// The default exit status for an execution that ended with `status`.
    pub fn for_status(status: BatchStatus) -> Self {
        Self::new(status.as_str())
    }

    fn severity(&self) -> u8 {
        match self.exit_code.as_str() {
            Self::EXECUTING_CODE => 1,
            Self::COMPLETED_CODE => 2,
            Self::NOOP_CODE => 3,
            Self::STOPPED_CODE => 4,
            Self::FAILED_CODE => 5,
            Self::UNKNOWN_CODE => 6,
            _ => 7,
        }
    }

    /// True when the code was set by job logic rather than left at a framework code.
    pub fn is_custom(&self) -> bool {
        !Self::FRAMEWORK_CODES.contains(&self.exit_code.as_str())
    }

    pub fn is_running(&self) -> bool {
        self.exit_code == Self::EXECUTING_CODE || self.exit_code == Self::UNKNOWN_CODE
    }

    /// Combine with another exit status: the more severe code wins and the
    /// descriptions are concatenated. Ties keep this status' code.
    pub fn and(&self, other: &ExitStatus) -> ExitStatus {
        let code = if other.severity() > self.severity() {
            &other.exit_code
        } else {
            &self.exit_code
        };
        ExitStatus {
            exit_code: code.clone(),
            exit_description: self.joined_description(&other.exit_description),
        }
    }

    fn joined_description(&self, other: &str) -> String {
        match (self.exit_description.is_empty(), other.is_empty()) {
            (_, true) => self.exit_description.clone(),
            (true, false) => other.to_string(),
            (false, false) if self.exit_description == other => other.to_string(),
            (false, false) => format!("{}; {}", self.exit_description, other),
        }
    }
}

impl Default for ExitStatus {
    fn default() -> Self {
        Self::unknown()
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exit_description.is_empty() {
            write!(f, "{}", self.exit_code)
        } else {
            write!(f, "{} ({})", self.exit_code, self.exit_description)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_and_unsuccessful() {
        assert!(BatchStatus::Starting.is_running());
        assert!(BatchStatus::Stopping.is_running());
        assert!(!BatchStatus::Stopped.is_running());
        assert!(BatchStatus::Failed.is_unsuccessful());
        assert!(BatchStatus::Unknown.is_unsuccessful());
        assert!(!BatchStatus::Stopped.is_unsuccessful());
        assert!(!BatchStatus::Completed.is_unsuccessful());
    }

    #[test]
    fn upgrade_rules() {
        assert_eq!(
            BatchStatus::Started.upgrade_to(BatchStatus::Completed),
            BatchStatus::Completed
        );
        assert_eq!(
            BatchStatus::Completed.upgrade_to(BatchStatus::Starting),
            BatchStatus::Completed
        );
        assert_eq!(
            BatchStatus::Completed.upgrade_to(BatchStatus::Failed),
            BatchStatus::Failed
        );
        assert_eq!(
            BatchStatus::Starting.upgrade_to(BatchStatus::Started),
            BatchStatus::Started
        );
        assert_eq!(
            BatchStatus::Stopped.upgrade_to(BatchStatus::Started),
            BatchStatus::Stopped
        );
    }

    #[test]
    fn status_names_round_trip() {
        for status in BatchStatus::ALL {
            assert_eq!(BatchStatus::from_name(status.as_str()), Some(status));
        }
        assert_eq!(BatchStatus::from_name("nope"), None);
        assert_eq!(BatchStatus::Stopped.to_string(), "STOPPED");
    }

    #[test]
    fn and_picks_the_more_severe_code() {
        let combined = ExitStatus::executing().and(&ExitStatus::completed());
        assert_eq!(combined.exit_code, "COMPLETED");

        let combined = ExitStatus::failed().and(&ExitStatus::completed());
        assert_eq!(combined.exit_code, "FAILED");

        let combined = ExitStatus::completed().and(&ExitStatus::new("CUSTOM"));
        assert_eq!(combined.exit_code, "CUSTOM");
    }

    #[test]
    fn and_joins_descriptions() {
        let a = ExitStatus::with_description("FAILED", "first");
        let b = ExitStatus::with_description("COMPLETED", "second");
        assert_eq!(a.and(&b).exit_description, "first; second");
        assert_eq!(a.and(&ExitStatus::failed()).exit_description, "first");
    }

    #[test]
    fn custom_codes() {
        assert!(ExitStatus::new("CUSTOM").is_custom());
        assert!(!ExitStatus::completed().is_custom());
        assert!(!ExitStatus::unknown().is_custom());
    }

    #[test]
    fn for_status_uses_the_status_name() {
        assert_eq!(
            ExitStatus::for_status(BatchStatus::Abandoned).exit_code,
            "ABANDONED"
        );
        assert_eq!(ExitStatus::for_status(BatchStatus::Stopped), ExitStatus::stopped());
    }

    #[test]
    fn display() {
        assert_eq!(ExitStatus::completed().to_string(), "COMPLETED");
        assert_eq!(
            ExitStatus::with_description("FAILED", "boom").to_string(),
            "FAILED (boom)"
        );
    }
}
