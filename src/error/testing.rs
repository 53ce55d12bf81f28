#[cfg(test)]
/// # Panics
/// Panics if the result is `Ok` or the error is of another kind.
pub fn assert_error_kind<T: std::fmt::Debug>(
    result: crate::TriggerResult<T>,
    expected: crate::ErrorKind,
) {
    match result {
        Err(e) => {
            assert_eq!(
                e.kind(),
                expected,
                "Expected {expected:?} error, got {:?}: {e}",
                e.kind()
            );
        }
        Ok(value) => {
            panic!("Expected {expected:?} error, but operation succeeded with {value:?}");
        }
    }
}

#[cfg(test)]
/// # Panics
/// Panics if the result is `Ok` (operation succeeded when error was expected).
pub fn assert_error_contains<T: std::fmt::Debug>(
    result: crate::TriggerResult<T>,
    expected_substring: &str,
) {
    match result {
        Err(e) => {
            let message = e.to_string();
            assert!(
                message.contains(expected_substring),
                "Error message '{message}' does not contain '{expected_substring}'"
            );
        }
        Ok(value) => {
            panic!(
                "Expected error containing '{expected_substring}', \
                 but operation succeeded with {value:?}"
            );
        }
    }
}
