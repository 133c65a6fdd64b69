//! Compatibility validation of parsed constraints.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use super::parser::{keys, Constraint, ConstraintValue};

/// Rule family a violation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    OutOfRange,
    Conflict,
    MissingDependency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    /// Constraint key (or protocol name) the rule fired on.
    pub subject: String,
    pub message: String,
}

impl Violation {
    fn new(kind: ViolationKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            message: message.into(),
        }
    }
}

/// Checker verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityReport {
    pub violations: Vec<Violation>,
}

impl CompatibilityReport {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// JSON form proposed to the `validated` space.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "valid": self.is_valid(),
            "violations": self.violations,
        })
    }
}

/// Validates a set of constraints before an agent proposes them.
pub trait CompatibilityChecker: Send + Sync {
    fn check(&self, constraints: &[Constraint]) -> CompatibilityReport;
}

/// Conflicts and required interfaces of one protocol.
#[derive(Debug, Clone, Copy)]
struct ProtocolRule {
    name: &'static str,
    conflicts: &'static [&'static str],
    requires: &'static str,
}

const PROTOCOL_RULES: [ProtocolRule; 4] = [
    ProtocolRule {
        name: "modbus_rtu",
        conflicts: &["profinet", "ethernet_ip"],
        requires: "rs485",
    },
    ProtocolRule {
        name: "modbus_tcp",
        conflicts: &[],
        requires: "ethernet",
    },
    ProtocolRule {
        name: "profinet",
        conflicts: &["modbus_rtu"],
        requires: "ethernet",
    },
    ProtocolRule {
        name: "ethernet_ip",
        conflicts: &["modbus_rtu"],
        requires: "ethernet",
    },
];

/// Built-in hardware rules: I/O capacity, protocol exclusivity and interface
/// dependencies, CPU and memory ranges, real-time CPU floor.
#[derive(Debug, Clone)]
pub struct RuleCompatibilityChecker {
    pub max_digital_io: u64,
    pub max_analog_io: u64,
    pub cpu_mhz: RangeInclusive<f64>,
    pub memory_mb: RangeInclusive<f64>,
    pub real_time_min_cpu_mhz: f64,
}

impl Default for RuleCompatibilityChecker {
    fn default() -> Self {
        Self {
            max_digital_io: 64,
            max_analog_io: 32,
            cpu_mhz: 100.0..=5000.0,
            memory_mb: 1.0..=16384.0,
            real_time_min_cpu_mhz: 500.0,
        }
    }
}

impl CompatibilityChecker for RuleCompatibilityChecker {
    fn check(&self, constraints: &[Constraint]) -> CompatibilityReport {
        let facts = Facts::collect(constraints);
        let mut violations = Vec::new();

        for (signal, total, max) in [
            ("digital", facts.digital, self.max_digital_io),
            ("analog", facts.analog, self.max_analog_io),
        ] {
            if total > max {
                violations.push(Violation::new(
                    ViolationKind::OutOfRange,
                    format!("io.{signal}"),
                    format!("{total} {signal} points exceed the maximum of {max}"),
                ));
            }
        }

        for (key, value, range) in [
            (keys::CPU_MHZ, facts.cpu_mhz, &self.cpu_mhz),
            (keys::MEMORY_MB, facts.memory_mb, &self.memory_mb),
        ] {
            if let Some(v) = value.filter(|v| !range.contains(v)) {
                violations.push(Violation::new(
                    ViolationKind::OutOfRange,
                    key,
                    format!("{v} outside {}..={}", range.start(), range.end()),
                ));
            }
        }

        violations.extend(protocol_violations(&facts));

        if facts.real_time {
            if let Some(cpu) = facts.cpu_mhz.filter(|cpu| *cpu < self.real_time_min_cpu_mhz) {
                violations.push(Violation::new(
                    ViolationKind::MissingDependency,
                    keys::REAL_TIME,
                    format!(
                        "real-time operation needs at least {} MHz, got {cpu}",
                        self.real_time_min_cpu_mhz
                    ),
                ));
            }
        }

        CompatibilityReport { violations }
    }
}

fn protocol_violations(facts: &Facts) -> Vec<Violation> {
    let mut out = Vec::new();
    for rule in PROTOCOL_RULES
        .iter()
        .filter(|rule| facts.protocols.contains(rule.name))
    {
        for other in rule.conflicts.iter().filter(|other| {
            // Report each pair once, from the alphabetically first side.
            facts.protocols.contains(**other) && rule.name < **other
        }) {
            out.push(Violation::new(
                ViolationKind::Conflict,
                rule.name,
                format!("{} cannot be combined with {other}", rule.name),
            ));
        }
        // Interfaces are only checked once the requirement names any.
        if !facts.interfaces.is_empty() && !facts.interfaces.contains(rule.requires) {
            out.push(Violation::new(
                ViolationKind::MissingDependency,
                rule.name,
                format!("{} requires a {} interface", rule.name, rule.requires),
            ));
        }
    }
    out
}

/// Constraint values folded per key: counts and amounts keep the maximum.
#[derive(Debug, Default)]
struct Facts {
    digital: u64,
    analog: u64,
    cpu_mhz: Option<f64>,
    memory_mb: Option<f64>,
    real_time: bool,
    protocols: BTreeSet<String>,
    interfaces: BTreeSet<String>,
}

impl Facts {
    fn collect(constraints: &[Constraint]) -> Self {
        let count = |key: &str| {
            constraints
                .iter()
                .filter(|c| c.key == key)
                .filter_map(|c| match c.value {
                    ConstraintValue::Count(n) => Some(n),
                    _ => None,
                })
                .max()
                .unwrap_or(0)
        };
        let amount = |key: &str| {
            constraints
                .iter()
                .filter(|c| c.key == key)
                .filter_map(|c| c.value.as_f64())
                .reduce(f64::max)
        };
        let names = |key: &str| {
            constraints
                .iter()
                .filter(|c| c.key == key)
                .filter_map(|c| match &c.value {
                    ConstraintValue::Name(n) => Some(n.clone()),
                    _ => None,
                })
                .collect::<BTreeSet<_>>()
        };

        Self {
            digital: [keys::DIGITAL_INPUTS, keys::DIGITAL_OUTPUTS, keys::DIGITAL_IO]
                .into_iter()
                .map(count)
                .fold(0, u64::saturating_add),
            analog: [keys::ANALOG_INPUTS, keys::ANALOG_OUTPUTS, keys::ANALOG_IO]
                .into_iter()
                .map(count)
                .fold(0, u64::saturating_add),
            cpu_mhz: amount(keys::CPU_MHZ),
            memory_mb: amount(keys::MEMORY_MB),
            real_time: constraints
                .iter()
                .any(|c| c.key == keys::REAL_TIME && c.value == ConstraintValue::Flag(true)),
            protocols: names(keys::PROTOCOL),
            interfaces: names(keys::INTERFACE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::parser::{PatternRequirementParser, RequirementParser};

    fn check(text: &str) -> CompatibilityReport {
        let parsed = PatternRequirementParser.parse(text);
        RuleCompatibilityChecker::default().check(&parsed.constraints)
    }

    fn kinds(report: &CompatibilityReport) -> Vec<ViolationKind> {
        report.violations.iter().map(|v| v.kind).collect()
    }

    #[test]
    fn test_valid_requirement() {
        let report = check("16 digital inputs and 8 analog inputs. Modbus RTU over an RS-485 port.");
        assert!(report.is_valid(), "{report:?}");
        assert_eq!(
            report.to_json(),
            serde_json::json!({"valid": true, "violations": []})
        );
    }

    #[test]
    fn test_io_capacity_limits() {
        let report = check("48 digital inputs and 24 digital outputs. 40 analog inputs.");
        assert_eq!(kinds(&report), vec![ViolationKind::OutOfRange, ViolationKind::OutOfRange]);
        assert_eq!(report.violations.first().map(|v| v.subject.as_str()), Some("io.digital"));
    }

    #[test]
    fn test_exclusive_protocols_reported_once() {
        let report = check("Support Modbus RTU and Profinet.");
        assert_eq!(kinds(&report), vec![ViolationKind::Conflict]);
    }

    #[test]
    fn test_missing_interface_dependency() {
        let report = check("Use Profinet over a serial port.");
        assert_eq!(kinds(&report), vec![ViolationKind::MissingDependency]);

        let without_interfaces = check("Use Profinet.");
        assert!(without_interfaces.is_valid());
    }

    #[test]
    fn test_system_ranges_and_real_time_floor() {
        let report = check("The CPU runs at 50 MHz. Real-time control is required.");
        assert_eq!(
            kinds(&report),
            vec![ViolationKind::OutOfRange, ViolationKind::MissingDependency]
        );

        assert!(check("The CPU runs at 800 MHz with 512 MB of memory. Real-time control.").is_valid());
    }
}
