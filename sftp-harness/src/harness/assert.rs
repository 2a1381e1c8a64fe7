//! Assertion recording
//!
//! Failed assertions do not abort the case; they are collected and
//! reported once the case has been torn down.

use std::fmt::Debug;

#[derive(Debug, Default)]
pub struct Assertions {
    passed: usize,
    failures: Vec<String>,
}

impl Assertions {
    pub fn assert_true(&mut self, condition: bool, message: &str) -> bool {
        if condition {
            self.passed += 1;
        } else {
            self.fail(message);
        }
        condition
    }

    pub fn assert_false(&mut self, condition: bool, message: &str) -> bool {
        self.assert_true(!condition, message)
    }

    pub fn assert_equals<T: PartialEq + Debug + ?Sized>(
        &mut self,
        expected: &T,
        actual: &T,
        message: &str,
    ) -> bool {
        if expected == actual {
            self.passed += 1;
            true
        } else {
            self.fail(&format!("{}: expected {:?}, got {:?}", message, expected, actual));
            false
        }
    }

    pub fn assert_contains(&mut self, haystack: &str, needle: &str, message: &str) -> bool {
        if haystack.contains(needle) {
            self.passed += 1;
            true
        } else {
            self.fail(&format!("{}: {:?} not found in {:?}", message, needle, haystack));
            false
        }
    }

    pub fn fail(&mut self, message: &str) {
        tracing::error!("ASSERT: {}", message);
        self.failures.push(message.to_string());
    }

    pub fn passed(&self) -> usize {
        self.passed
    }

    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    pub fn into_parts(self) -> (usize, Vec<String>) {
        (self.passed, self.failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_passes_and_failures() {
        let mut a = Assertions::default();
        assert!(a.assert_true(true, "ok"));
        assert!(!a.assert_true(false, "user missing"));
        assert!(a.assert_false(false, "not ready"));
        assert!(a.assert_equals("uid=1", "uid=1", "id"));
        assert!(!a.assert_equals(&0, &1, "exit code"));
        assert!(!a.assert_contains("uid=1(u)", "gid=", "id"));

        assert_eq!(a.passed(), 3);
        assert_eq!(a.failures().len(), 3);
        assert_eq!(a.failures()[0], "user missing");
        assert_eq!(a.failures()[1], "exit code: expected 0, got 1");
    }

    #[test]
    fn test_assert_false_returns_whether_it_passed() {
        let mut a = Assertions::default();
        assert!(a.assert_false(false, "not ready"));
        assert!(!a.assert_false(true, "ready too early"));
        assert_eq!(a.into_parts(), (1, vec!["ready too early".to_string()]));
    }
}
