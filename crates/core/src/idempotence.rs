//! Idempotence evaluation of `ansible-playbook` output
//!
//! Scans the PLAY RECAP section for host summary lines such as
//! `web : ok=5 changed=0 unreachable=0 failed=0 skipped=1` and decides whether the
//! run made no changes and had no failures. Evaluation fails closed: missing recap
//! lines or malformed counters are a failed verdict, never a pass.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static RECAP_PAIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z_]+)=(\S*)").expect("Valid regex pattern"));

/// SGR color sequences that `--tty` runs wrap around non-zero counters
static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*m").expect("Valid regex pattern"));

/// Why a recap could not be evaluated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecapParseError {
    /// No line carried both `ok=` and `changed=`
    NoRecap,
    /// A required counter was absent from a recap line
    MissingCounter { key: &'static str, line: String },
    /// A counter was present but not a non-negative integer
    InvalidCounter {
        key: &'static str,
        value: String,
        line: String,
    },
}

impl std::fmt::Display for RecapParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoRecap => write!(f, "no recap line found in output"),
            Self::MissingCounter { key, line } => {
                write!(f, "recap line has no '{}=' counter: {}", key, line)
            }
            Self::InvalidCounter { key, value, line } => {
                write!(f, "recap counter '{}={}' is not a number: {}", key, value, line)
            }
        }
    }
}

impl std::error::Error for RecapParseError {}

/// Summed counters over every host in a recap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecapTotals {
    /// Number of host lines that were summed
    pub hosts: usize,
    pub changed: u64,
    pub failed: u64,
}

impl RecapTotals {
    /// A run is idempotent when nothing changed and nothing failed
    pub fn is_idempotent(&self) -> bool {
        self.changed == 0 && self.failed == 0
    }
}

fn is_recap_line(line: &str) -> bool {
    line.contains("ok=") && line.contains("changed=")
}

fn counter(
    pairs: &HashMap<&str, &str>,
    key: &'static str,
    line: &str,
) -> Result<u64, RecapParseError> {
    let value = pairs.get(key).ok_or_else(|| RecapParseError::MissingCounter {
        key,
        line: line.trim().to_string(),
    })?;

    value.parse::<u64>().map_err(|_| RecapParseError::InvalidCounter {
        key,
        value: value.to_string(),
        line: line.trim().to_string(),
    })
}

/// Sum `changed=` and `failed=` over every recap line in `output`
pub fn parse_recap(output: &str) -> Result<RecapTotals, RecapParseError> {
    let mut totals = RecapTotals::default();

    for raw in output.lines() {
        let line = ANSI_ESCAPE.replace_all(raw, "");
        if !is_recap_line(&line) {
            continue;
        }
        let line: &str = &line;
        let pairs: HashMap<&str, &str> = RECAP_PAIR
            .captures_iter(line)
            .filter_map(|caps| Some((caps.get(1)?.as_str(), caps.get(2)?.as_str())))
            .collect();

        totals.changed += counter(&pairs, "changed", line)?;
        totals.failed += counter(&pairs, "failed", line)?;
        totals.hosts += 1;
    }

    if totals.hosts == 0 {
        return Err(RecapParseError::NoRecap);
    }

    Ok(totals)
}

/// Verdict for the output of a second playbook run
///
/// Returns `true` only when a recap was found and every host reports
/// `changed=0` and `failed=0`.
pub fn evaluate(output: &str) -> bool {
    match parse_recap(output) {
        Ok(totals) => totals.is_idempotent(),
        Err(err) => {
            tracing::warn!("Idempotence evaluation failed: {}", err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_recap_passes() {
        assert!(evaluate("ok=5 changed=0 unreachable=0 failed=0"));
    }

    #[test]
    fn test_changed_recap_fails() {
        assert!(!evaluate("ok=5 changed=2 unreachable=0 failed=0"));
    }

    #[test]
    fn test_failed_recap_fails() {
        assert!(!evaluate("ok=5 changed=0 unreachable=0 failed=1"));
    }

    #[test]
    fn test_missing_recap_fails_closed() {
        assert!(!evaluate("PLAY [all] ****\nTASK [Gathering Facts] ****\n"));
        assert!(!evaluate(""));
        assert_eq!(parse_recap("nothing here"), Err(RecapParseError::NoRecap));
    }

    #[test]
    fn test_non_numeric_counter_fails_closed() {
        let err = parse_recap("ok=5 changed=two unreachable=0 failed=0").unwrap_err();
        assert!(matches!(
            err,
            RecapParseError::InvalidCounter { key: "changed", .. }
        ));
        assert!(!evaluate("ok=5 changed=two unreachable=0 failed=0"));
    }

    #[test]
    fn test_missing_failed_counter_fails_closed() {
        let err = parse_recap("ok=5 changed=0 unreachable=0").unwrap_err();
        assert!(matches!(
            err,
            RecapParseError::MissingCounter { key: "failed", .. }
        ));
    }

    #[test]
    fn test_full_ansible_output() {
        let output = "\
PLAY [all] *********************************************************************

TASK [Gathering Facts] *********************************************************
ok: [localhost]

TASK [role_under_test : install package] ***************************************
ok: [localhost]

PLAY RECAP *********************************************************************
localhost                  : ok=2    changed=0    unreachable=0    failed=0    skipped=0    rescued=0    ignored=0
";
        let totals = parse_recap(output).unwrap();
        assert_eq!(totals.hosts, 1);
        assert!(totals.is_idempotent());
        assert!(evaluate(output));
    }

    #[test]
    fn test_colored_recap_from_tty() {
        let line = "web : \x1b[0;32mok=5   \x1b[0m \x1b[0;33mchanged=1   \x1b[0m unreachable=0    failed=0";
        let totals = parse_recap(line).unwrap();
        assert_eq!(totals.changed, 1);
        assert!(!evaluate(line));

        let clean = "\x1b[0;32mweb\x1b[0m : \x1b[0;32mok=5   \x1b[0m changed=0    unreachable=0    failed=0";
        assert_eq!(parse_recap(clean).unwrap().changed, 0);
        assert!(evaluate(clean));
    }

    #[test]
    fn test_colored_invalid_counter_reports_clean_line() {
        let err = parse_recap("web : ok=5 \x1b[0;33mchanged=x\x1b[0m failed=0").unwrap_err();
        match err {
            RecapParseError::InvalidCounter { key, value, line } => {
                assert_eq!(key, "changed");
                assert_eq!(value, "x");
                assert!(!line.contains('\x1b'));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_counters_summed_across_hosts() {
        let output = "\
PLAY RECAP *****
web1 : ok=3 changed=0 unreachable=0 failed=0
web2 : ok=3 changed=1 unreachable=0 failed=0
";
        let totals = parse_recap(output).unwrap();
        assert_eq!(totals.hosts, 2);
        assert_eq!(totals.changed, 1);
        assert!(!evaluate(output));
    }

    #[test]
    fn test_key_order_does_not_matter() {
        assert!(evaluate("host : failed=0 unreachable=0 changed=0 ok=7"));
        assert!(!evaluate("host : failed=0 changed=3 ok=7"));
    }

    #[test]
    fn test_verdict_matches_counters() {
        for ok in [0u64, 1, 12] {
            for changed in [0u64, 1, 7] {
                for failed in [0u64, 2] {
                    let line = format!(
                        "ok={} changed={} unreachable=0 failed={}",
                        ok, changed, failed
                    );
                    assert_eq!(evaluate(&line), changed == 0 && failed == 0, "{}", line);
                }
            }
        }
    }
}
