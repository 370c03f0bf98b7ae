//! Process exit codes

use std::fmt;

use crate::models::SuiteResult;

/// Process exit status of a run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    ExecutionFailed,
    ParseFailed,
    ValidationFailed,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::ExecutionFailed => 1,
            ExitCode::ParseFailed => 2,
            ExitCode::ValidationFailed => 3,
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

/// Exit code for a finished run; a failed parse stage wins over failures
pub fn exit_code(result: &SuiteResult, parse_ok: bool) -> ExitCode {
    if !parse_ok {
        ExitCode::ParseFailed
    } else if result.is_failed {
        ExitCode::ExecutionFailed
    } else {
        ExitCode::Success
    }
}

/// Exit code for a run that found nothing to execute
pub fn empty_run_exit_code(parse_ok: bool) -> ExitCode {
    exit_code(&SuiteResult::new(vec![], 0), parse_ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Failure, ScenarioResult, SpecResult, Status};
    use crate::testing;

    #[test]
    fn test_codes() {
        assert_eq!(ExitCode::Success.code(), 0);
        assert_eq!(ExitCode::ExecutionFailed.code(), 1);
        assert_eq!(ExitCode::ParseFailed.code(), 2);
        assert_eq!(ExitCode::ValidationFailed.code(), 3);
    }

    #[test]
    fn test_exit_code_mapping() {
        let passed = SuiteResult::new(vec![], 0);
        let failed = SuiteResult::new(vec![], 0).with_failure(Some(Failure::message("hook")));

        assert_eq!(exit_code(&passed, true), ExitCode::Success);
        assert_eq!(exit_code(&failed, true), ExitCode::ExecutionFailed);
        assert_eq!(exit_code(&failed, false), ExitCode::ParseFailed);
    }

    fn suite_of(statuses: &[Status]) -> SuiteResult {
        let spec = testing::spec("run", &[("a", &["x"]), ("b", &["y"])]);
        let scenarios = statuses
            .iter()
            .zip(&spec.scenarios)
            .map(|(status, scenario)| ScenarioResult::new(scenario, None, *status, 1, vec![]))
            .collect();
        SuiteResult::new(vec![SpecResult::new(&spec, scenarios, None, 2)], 2)
    }

    #[test]
    fn test_exit_code_scenarios() {
        assert_eq!(empty_run_exit_code(true), ExitCode::Success);
        assert_eq!(empty_run_exit_code(false), ExitCode::ParseFailed);

        let with_failure = suite_of(&[Status::Passed, Status::Failed]);
        assert_eq!(exit_code(&with_failure, true), ExitCode::ExecutionFailed);

        let all_pass = suite_of(&[Status::Passed, Status::Passed]);
        assert_eq!(exit_code(&all_pass, true), ExitCode::Success);
    }
}
