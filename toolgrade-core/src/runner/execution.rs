use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures::FutureExt;

use crate::validation::panic_message;
use crate::{Connection, ResponseValidator, TestCase, TestResult};

/// Executes `cases` one at a time against `connection`.
///
/// Produces exactly one [`TestResult`] per case, in order. An invocation that
/// outlives `timeout` is abandoned, not cancelled: the server may still finish
/// the call, but its reply is discarded. A panic while running a case becomes
/// a failing result and the remaining cases still run.
pub async fn run_test_cases<C: Connection>(
    connection: &mut C,
    cases: &[TestCase],
    validator: &ResponseValidator,
    timeout: Duration,
) -> Vec<TestResult> {
    let mut results = Vec::with_capacity(cases.len());
    for case in cases {
        results.push(run_test_case(connection, case, validator, timeout).await);
    }
    results
}

async fn run_test_case<C: Connection>(
    connection: &mut C,
    case: &TestCase,
    validator: &ResponseValidator,
    timeout: Duration,
) -> TestResult {
    let started = Instant::now();
    let invocation = tokio::time::timeout(
        timeout,
        connection.invoke(&case.tool_name, case.inputs.clone()),
    );
    let outcome = AssertUnwindSafe(invocation).catch_unwind().await;
    let elapsed = Some(elapsed_ms(started));
    match outcome {
        Ok(Ok(response)) => {
            let verdict = validator.validate(&response, case);
            if !verdict.valid {
                log::warn!(
                    "tool '{}' test {} failed: {}",
                    case.tool_name,
                    case.id,
                    verdict.errors.join("; ")
                );
            }
            TestResult {
                test_case: case.clone(),
                passed: verdict.valid,
                response: Some(response),
                validation_errors: verdict.errors,
                execution_time_ms: elapsed,
            }
        }
        Ok(Err(_)) => {
            log::warn!(
                "tool '{}' test {} timed out after {}ms",
                case.tool_name,
                case.id,
                timeout.as_millis()
            );
            synthetic_failure(
                case,
                format!("test timed out after {}ms", timeout.as_millis()),
                elapsed,
            )
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::warn!(
                "tool '{}' test {} raised an unexpected failure: {message}",
                case.tool_name,
                case.id
            );
            synthetic_failure(
                case,
                format!("test execution failed unexpectedly: {message}"),
                elapsed,
            )
        }
    }
}

fn synthetic_failure(case: &TestCase, message: String, elapsed: Option<u64>) -> TestResult {
    TestResult {
        test_case: case.clone(),
        passed: false,
        response: None,
        validation_errors: vec![message],
        execution_time_ms: elapsed,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
