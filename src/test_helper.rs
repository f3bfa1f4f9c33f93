//! Helper functions used to simplify unit tests.
//!
//! **Note**: This module is only compiled during testing.
use log::Level;

/// Assert that exactly the given warnings were logged since `testing_logger::setup()`.
pub fn check_warnings(expected_warnings: Vec<&str>) {
    testing_logger::validate(|captured_logs| {
        let warnings: Vec<_> = captured_logs
            .iter()
            .filter(|l| l.level == Level::Warn)
            .collect();
        assert_eq!(warnings.len(), expected_warnings.len());
        for (log, expected) in warnings.iter().zip(expected_warnings.iter()) {
            assert_eq!(log.body, *expected);
        }
    });
}

