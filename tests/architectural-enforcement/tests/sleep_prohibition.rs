//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT sleep. The request path waits only on
//! I/O, channels and timeouts.
//! **Exceptions**: the reset scheduler waiting for the next daily boundary,
//! periodic tasks driven by `tokio::time::interval`, test code.

use architectural_enforcement::scan;

/// Check if sleep waits for a computed reset boundary
fn is_reset_boundary_wait(lines: &[(usize, &str)], current: usize) -> bool {
    lines[current.saturating_sub(5)..current]
        .iter()
        .any(|(_, code)| code.contains("duration_until_next_reset"))
}

/// Check if this is tokio::time::interval pattern (acceptable for periodic tasks)
fn is_interval_pattern(lines: &[(usize, &str)], current: usize) -> bool {
    lines[current.saturating_sub(20)..current]
        .iter()
        .any(|(_, code)| code.contains("ticker.tick()") || code.contains("tokio::time::interval"))
}

fn is_sleep(code: &str) -> bool {
    code.contains("::sleep(") || code.contains(".sleep(")
}

#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan(|_, lines, idx| {
        is_sleep(lines[idx].1)
            && !is_reset_boundary_wait(lines, idx)
            && !is_interval_pattern(lines, idx)
    });

    if !violations.is_empty() {
        eprintln!("\nSleep calls found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nAcceptable: waiting for the daily reset boundary, tokio::time::interval");
        eprintln!("Forbidden: polling loops, sleep as synchronization\n");
        panic!(
            "\nFound {} sleep violation(s) in production code.",
            violations.len()
        );
    }
}

#[test]
fn test_never_blocks_a_runtime_thread() {
    let violations = scan(|_, lines, idx| {
        let code = lines[idx].1;
        code.contains("std::thread::sleep") || code.contains("reqwest::blocking")
    });
    assert!(
        violations.is_empty(),
        "blocking calls in production code:\n{}",
        violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    );
}

#[test]
fn test_detector_flags_plain_sleep() {
    let lines = vec![
        (1, "async fn poll() {"),
        (2, "    tokio::time::sleep(Duration::from_millis(10)).await;"),
        (3, "}"),
    ];
    assert!(is_sleep(lines[1].1));
    assert!(!is_reset_boundary_wait(&lines, 1));
    assert!(!is_interval_pattern(&lines, 1));
}

#[test]
fn test_detector_allows_boundary_wait() {
    let lines = vec![
        (1, "let wait = duration_until_next_reset(Utc::now(), hour);"),
        (2, "tokio::time::sleep(wait).await;"),
    ];
    assert!(is_reset_boundary_wait(&lines, 1));
}
