//! Parser for the interception CLI's `list` output.
//!
//! This is the only place that knows the CLI's text format. Expected shape:
//!
//! ```text
//! deployment orders-staging-7f9c : replaced
//!    Intercepting     : 10.0.0.5 -> 127.0.0.1
//!        8080 -> 5001 TCP
//! deployment payments-staging-9d2e : ready to engage (traffic-agent not yet installed)
//! ```

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::{InterceptionRecord, RecordStatus};

/// Status texts that mean the deployment's traffic is being redirected.
const INTERCEPTED_MARKERS: &[&str] = &["replaced", "intercepted"];

struct Patterns {
    header: Regex,
    routing: Regex,
    ports: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        header: Regex::new(r"^\s*deployment\s+(\S+?)\s*:\s*(.*?)\s*$").unwrap(),
        routing: Regex::new(r"(\d{1,3}(?:\.\d{1,3}){3})\s*->\s*127\.0\.0\.1").unwrap(),
        ports: Regex::new(r"(\d+)\s*->\s*(\d+)\s+TCP").unwrap(),
    })
}

/// Parses `list` output into one record per deployment block.
///
/// Unrecognized lines are skipped. An intercepted deployment without detail
/// lines keeps its status with the IP and ports left empty.
pub fn parse_interceptions(output: &str, namespace: &str) -> Vec<InterceptionRecord> {
    let patterns = patterns();
    let mut records = Vec::new();
    let mut current: Option<InterceptionRecord> = None;
    let mut in_details = false;

    for line in output.lines() {
        if let Some(caps) = patterns.header.captures(line) {
            records.extend(current.take());

            let status = status_from_text(&caps[2]);
            in_details = status == RecordStatus::Intercepted;
            current = Some(InterceptionRecord::new(&caps[1], namespace, status));
            continue;
        }

        if !in_details {
            continue;
        }
        let Some(record) = current.as_mut() else {
            continue;
        };

        if let Some(caps) = patterns.ports.captures(line) {
            record.target_port = caps[1].parse().ok();
            record.local_port = caps[2].parse().ok();
            // The port line closes the detail block.
            in_details = false;
        } else if let Some(caps) = patterns.routing.captures(line) {
            record.cluster_ip = Some(caps[1].to_string());
        }
    }

    records.extend(current);
    records
}

fn status_from_text(text: &str) -> RecordStatus {
    let lower = text.to_lowercase();
    if INTERCEPTED_MARKERS.iter().any(|m| lower.contains(m)) {
        RecordStatus::Intercepted
    } else {
        RecordStatus::Available
    }
}
