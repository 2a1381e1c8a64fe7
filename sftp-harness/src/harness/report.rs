use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CaseOutcome {
    pub name: String,
    pub passed_assertions: usize,
    pub failures: Vec<String>,
    pub duration: Duration,
}

impl CaseOutcome {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub outcomes: Vec<CaseOutcome>,
}

impl RunReport {
    pub fn ran(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failed(&self) -> impl Iterator<Item = &CaseOutcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }

    pub fn success(&self) -> bool {
        self.failed().next().is_none()
    }

    pub fn exit_code(&self) -> u8 {
        if self.success() { 0 } else { 1 }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in self.failed() {
            writeln!(f, "FAIL {}", outcome.name)?;
            for failure in &outcome.failures {
                writeln!(f, "  - {}", failure)?;
            }
        }
        writeln!(f, "Ran {} tests.", self.ran())?;
        let failures = self.failed().count();
        if failures == 0 {
            write!(f, "OK")
        } else {
            write!(f, "FAILED (failures={})", failures)
        }
    }
}
