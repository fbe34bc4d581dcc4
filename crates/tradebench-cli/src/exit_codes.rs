#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more scenarios failed.
    ScenarioFailures = 1,

    /// The run finished but its report or comparison could not be written.
    ReportingFailed = 2,

    /// Invalid CLI flags or configuration file.
    InvalidInput = 30,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Reporting failures take precedence over scenario failures.
    #[must_use]
    pub fn from_run(all_passed: bool, reporting_ok: bool) -> Self {
        match (all_passed, reporting_ok) {
            (_, false) => Self::ReportingFailed,
            (false, true) => Self::ScenarioFailures,
            (true, true) => Self::Success,
        }
    }
}
