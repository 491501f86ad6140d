use std::fmt;

/// Machine-readable error codes shared by every failure the tool can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    UnknownGrouping,
    OutputNotConfigured,
    InputUnreadable,
    MissingColumn,
    InvalidTimestamp,
    NonexistentLocalTime,
    InvertedInterval,
    OverlappingInterval,
    TimestampOutOfRange,
    OutputWriteFailed,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::UnknownGrouping => "E1002",
            Self::OutputNotConfigured => "E1003",
            Self::InputUnreadable => "E2001",
            Self::MissingColumn => "E2002",
            Self::InvalidTimestamp => "E2003",
            Self::NonexistentLocalTime => "E2004",
            Self::InvertedInterval => "E2005",
            Self::OverlappingInterval => "E3001",
            Self::TimestampOutOfRange => "E3002",
            Self::OutputWriteFailed => "E5001",
            Self::LockContention => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::UnknownGrouping => "Unknown grouping mode",
            Self::OutputNotConfigured => "Output destination not usable",
            Self::InputUnreadable => "Input file unreadable",
            Self::MissingColumn => "Required input column missing",
            Self::InvalidTimestamp => "Unparseable date/time",
            Self::NonexistentLocalTime => "Local time does not exist",
            Self::InvertedInterval => "Interval ends before it starts",
            Self::OverlappingInterval => "Intervals overlap",
            Self::TimestampOutOfRange => "Timestamp out of range",
            Self::OutputWriteFailed => "Output write failed",
            Self::LockContention => "Lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in mtrack.toml and retry."),
            Self::UnknownGrouping => Some("Use one of: id, date, all."),
            Self::OutputNotConfigured => {
                Some("Check that the output directory exists or can be created.")
            }
            Self::InputUnreadable => Some("Check the input path and that it is a CSV file."),
            Self::MissingColumn => {
                Some("The header needs ID, ONDate, ONTime, OFFDate, OFFTime, endX and endY.")
            }
            Self::InvalidTimestamp => Some("Dates must look like 2020/01/31 and times like 13:05:00."),
            Self::NonexistentLocalTime => {
                Some("The time falls in a daylight-saving gap; use --timezone utc or fix the row.")
            }
            Self::InvertedInterval => Some("Swap or fix the ON/OFF columns of the reported row."),
            Self::OverlappingInterval => {
                Some("Fix the overlapping rows or pass --allow-overlap to resolve them as-is.")
            }
            Self::TimestampOutOfRange => None,
            Self::OutputWriteFailed => Some("Check disk space and write permissions."),
            Self::LockContention => Some("Retry after the other `mtrack` process finishes."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
