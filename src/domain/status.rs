use std::error::Error;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    #[default]
    Pending,
    Completed,
    Deleted,
    Waiting,
    Recurring,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Pending,
        Status::Completed,
        Status::Deleted,
        Status::Waiting,
        Status::Recurring,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Completed => "completed",
            Status::Deleted => "deleted",
            Status::Waiting => "waiting",
            Status::Recurring => "recurring",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Deleted)
    }

    /// Statuses whose tasks live in the pending file and carry an id.
    pub fn belongs_in_pending(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let status = match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Status::Pending,
            "completed" => Status::Completed,
            "deleted" => Status::Deleted,
            "waiting" => Status::Waiting,
            "recurring" => Status::Recurring,
            _ => {
                return Err(ParseStatusError {
                    value: value.to_string(),
                });
            }
        };
        Ok(status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError {
    value: String,
}

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid task status '{}': expected one of {}",
            self.value,
            Status::ALL
                .iter()
                .map(|status| status.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl Error for ParseStatusError {}

#[cfg(test)]
mod tests {
    use super::Status;

    #[test]
    fn statuses_round_trip_through_text() {
        for status in Status::ALL {
            assert_eq!(status.as_str().parse::<Status>(), Ok(status));
        }
        assert_eq!(" Completed ".parse::<Status>(), Ok(Status::Completed));
    }

    #[test]
    fn terminal_statuses_leave_the_pending_file() {
        assert!(Status::Completed.is_terminal());
        assert!(Status::Deleted.is_terminal());
        assert!(Status::Waiting.belongs_in_pending());
        assert!(Status::Recurring.belongs_in_pending());
    }

    #[test]
    fn unknown_status_lists_the_choices() {
        let err = "open".parse::<Status>().expect_err("unknown status should fail");
        let message = err.to_string();
        assert!(message.contains("'open'"));
        assert!(message.contains("pending, completed, deleted, waiting, recurring"));
    }
}
