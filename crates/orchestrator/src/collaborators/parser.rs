//! Requirement parsing: natural-language requirement text to typed constraints.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Blackboard keys produced for parsed constraints.
pub mod keys {
    pub const DIGITAL_INPUTS: &str = "io.digital_inputs";
    pub const DIGITAL_OUTPUTS: &str = "io.digital_outputs";
    pub const DIGITAL_IO: &str = "io.digital_io";
    pub const ANALOG_INPUTS: &str = "io.analog_inputs";
    pub const ANALOG_OUTPUTS: &str = "io.analog_outputs";
    pub const ANALOG_IO: &str = "io.analog_io";
    pub const TOTAL_POINTS: &str = "io.total_points";
    pub const EXPANSION_MODULES: &str = "io.expansion_modules";

    pub const PROTOCOL: &str = "communication.protocol";
    pub const INTERFACE: &str = "communication.interface";
    pub const SPEED_KBPS: &str = "communication.speed_kbps";

    pub const CPU_MHZ: &str = "system.cpu_mhz";
    pub const MEMORY_MB: &str = "system.memory_mb";
    pub const REAL_TIME: &str = "system.real_time";
    pub const RESPONSE_TIME_MS: &str = "system.response_time_ms";
}

/// Domain a constraint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintCategory {
    Io,
    System,
    Communication,
}

impl ConstraintCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Io => "io",
            Self::System => "system",
            Self::Communication => "communication",
        }
    }
}

impl std::fmt::Display for ConstraintCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized constraint value. Amounts are already converted to the unit the key names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstraintValue {
    Count(u64),
    Amount(f64),
    Flag(bool),
    Name(String),
}

impl ConstraintValue {
    /// JSON form, with whole amounts rendered as integers.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Count(n) => serde_json::json!(n),
            Self::Amount(x) => {
                whole(*x).map_or_else(|| serde_json::json!(x), |n| serde_json::json!(n))
            }
            Self::Flag(b) => serde_json::json!(b),
            Self::Name(s) => serde_json::json!(s),
        }
    }

    /// Numeric value, if any.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Count(n) => Some(*n as f64),
            Self::Amount(x) => Some(*x),
            Self::Flag(_) | Self::Name(_) => None,
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole(x: f64) -> Option<u64> {
    (x.fract() == 0.0 && (0.0..9.0e15).contains(&x)).then(|| x as u64)
}

/// One fact extracted from a requirement sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub category: ConstraintCategory,
    pub key: String,
    pub value: ConstraintValue,
    /// Sentence the constraint came from.
    pub source: String,
}

impl Constraint {
    pub fn new(
        category: ConstraintCategory,
        key: impl Into<String>,
        value: ConstraintValue,
        source: impl Into<String>,
    ) -> Self {
        Self {
            category,
            key: key.into(),
            value,
            source: source.into(),
        }
    }
}

/// Parser output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedRequirement {
    pub constraints: Vec<Constraint>,
    /// Sentences no pattern recognised.
    pub uncategorized: Vec<String>,
    /// Share of sentences that yielded at least one constraint, `0.0..=1.0`.
    pub confidence: f64,
}

impl ParsedRequirement {
    /// Constraints of one category, in extraction order.
    pub fn in_category(&self, category: ConstraintCategory) -> impl Iterator<Item = &Constraint> {
        self.constraints
            .iter()
            .filter(move |c| c.category == category)
    }

    /// Sentences that yielded a constraint of `category`.
    pub fn sentences_in(&self, category: ConstraintCategory) -> impl Iterator<Item = &str> {
        let mut seen = Vec::new();
        self.in_category(category)
            .map(|c| c.source.as_str())
            .filter(move |s| {
                let fresh = !seen.contains(s);
                if fresh {
                    seen.push(*s);
                }
                fresh
            })
    }
}

/// Turns raw requirement text into structured constraints.
pub trait RequirementParser: Send + Sync {
    fn parse(&self, raw: &str) -> ParsedRequirement;
}

// Hardcoded patterns; `regex_patterns_compile` exercises every one.
macro_rules! pattern {
    ($name:ident, $re:expr) => {
        #[allow(clippy::expect_used)]
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($re).expect("hardcoded regex pattern is valid"));
    };
}

pattern!(SENTENCE_BREAK, r"[.!?]+\s+");
pattern!(
    IO_TYPED,
    r"(?i)\b(\d+)[\s-]*(?:point\s+)?(digital|analog)\b(?:\s+(?:i/o|io)\b)?(?:\s+(input|output)s?\b)?"
);
pattern!(IO_TOTAL, r"(?i)\b(\d+)[\s-]*(?:i/o|io)\b");
pattern!(
    PROTOCOL,
    r"(?i)\b(modbus(?:[\s-]?(?:rtu|tcp))?|profinet|ethernet/ip|canopen|devicenet|profibus)\b"
);
pattern!(
    INTERFACE,
    r"(?i)\b(serial|ethernet|usb|rs-?232|rs-?485)\s*(?:interface|connection|port)s?\b"
);
pattern!(
    SPEED,
    r"(?i)\b(?:communication|protocol|network)\s*(?:speed|rate)\s*(?:of\s*)?(\d+(?:\.\d+)?)\s*(kbps|mbps|gbps)\b"
);
pattern!(CPU, r"(?i)\b(?:cpu|processor)\b.*?(\d+(?:\.\d+)?)\s*(mhz|ghz)\b");
pattern!(CPU_LEADING, r"(?i)\b(\d+(?:\.\d+)?)\s*(mhz|ghz)\s+(?:cpu|processor)\b");
pattern!(MEMORY, r"(?i)\b(?:memory|ram)\b.*?(\d+(?:\.\d+)?)\s*(kb|mb|gb)\b");
pattern!(
    MEMORY_LEADING,
    r"(?i)\b(\d+(?:\.\d+)?)\s*(kb|mb|gb)\s+(?:of\s+)?(?:memory|ram)\b"
);
pattern!(REAL_TIME, r"(?i)\breal[\s-]?time\b");
pattern!(
    RESPONSE_TIME,
    r"(?i)\bresponse\s+time\b.*?(\d+(?:\.\d+)?)\s*(ms|s)\b"
);

/// Regex extraction of I/O counts, protocols, interfaces and system figures.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternRequirementParser;

impl RequirementParser for PatternRequirementParser {
    fn parse(&self, raw: &str) -> ParsedRequirement {
        let sentences: Vec<&str> = SENTENCE_BREAK
            .split(raw)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        let (constraints, uncategorized) = sentences.iter().fold(
            (Vec::new(), Vec::new()),
            |(mut constraints, mut uncategorized), sentence| {
                let found = extract(sentence);
                if found.is_empty() {
                    uncategorized.push((*sentence).to_string());
                } else {
                    constraints.extend(found);
                }
                (constraints, uncategorized)
            },
        );

        let confidence = if sentences.is_empty() {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let ratio = sentences.len().saturating_sub(uncategorized.len()) as f64
                / sentences.len() as f64;
            ratio
        };

        ParsedRequirement {
            constraints,
            uncategorized,
            confidence,
        }
    }
}

fn extract(sentence: &str) -> Vec<Constraint> {
    let mut out = Vec::new();
    out.extend(io_constraints(sentence));
    out.extend(communication_constraints(sentence));
    out.extend(system_constraints(sentence));
    out
}

fn io_constraints(sentence: &str) -> Vec<Constraint> {
    let typed = IO_TYPED.captures_iter(sentence).filter_map(|caps| {
        let count = caps.get(1)?.as_str().parse::<u64>().ok()?;
        let signal = caps.get(2)?.as_str().to_lowercase();
        let direction = match caps.get(3).map(|d| d.as_str().to_lowercase()) {
            Some(d) if d == "input" => "inputs",
            Some(_) => "outputs",
            None => "io",
        };
        Some(Constraint::new(
            ConstraintCategory::Io,
            format!("io.{signal}_{direction}"),
            ConstraintValue::Count(count),
            sentence,
        ))
    });

    let total = IO_TOTAL.captures_iter(sentence).filter_map(|caps| {
        let count = caps.get(1)?.as_str().parse::<u64>().ok()?;
        Some(Constraint::new(
            ConstraintCategory::Io,
            keys::TOTAL_POINTS,
            ConstraintValue::Count(count),
            sentence,
        ))
    });

    typed.chain(total).collect()
}

fn communication_constraints(sentence: &str) -> Vec<Constraint> {
    let mut out = named(&PROTOCOL, sentence, keys::PROTOCOL, normalize_protocol);
    out.extend(named(&INTERFACE, sentence, keys::INTERFACE, normalize_interface));
    out.extend(
        amount(&SPEED, sentence, |unit| match unit {
            "mbps" => 1_000.0,
            "gbps" => 1_000_000.0,
            _ => 1.0,
        })
        .map(|kbps| {
            Constraint::new(
                ConstraintCategory::Communication,
                keys::SPEED_KBPS,
                ConstraintValue::Amount(kbps),
                sentence,
            )
        }),
    );
    out
}

fn named(
    re: &Regex,
    sentence: &str,
    key: &str,
    normalize: fn(&str) -> String,
) -> Vec<Constraint> {
    re.captures_iter(sentence)
        .filter_map(|caps| caps.get(1).map(|m| normalize(m.as_str())))
        .map(|name| {
            Constraint::new(
                ConstraintCategory::Communication,
                key,
                ConstraintValue::Name(name),
                sentence,
            )
        })
        .collect()
}

fn system_constraints(sentence: &str) -> Vec<Constraint> {
    let system = |key: &'static str, value: ConstraintValue| {
        Constraint::new(ConstraintCategory::System, key, value, sentence)
    };

    let cpu = amount(&CPU, sentence, mhz_factor)
        .or_else(|| amount(&CPU_LEADING, sentence, mhz_factor))
        .map(|mhz| system(keys::CPU_MHZ, ConstraintValue::Amount(mhz)));
    let memory = amount(&MEMORY, sentence, mb_factor)
        .or_else(|| amount(&MEMORY_LEADING, sentence, mb_factor))
        .map(|mb| system(keys::MEMORY_MB, ConstraintValue::Amount(mb)));
    let real_time = REAL_TIME
        .is_match(sentence)
        .then(|| system(keys::REAL_TIME, ConstraintValue::Flag(true)));
    let response = amount(&RESPONSE_TIME, sentence, |unit| if unit == "s" { 1_000.0 } else { 1.0 })
        .map(|ms| system(keys::RESPONSE_TIME_MS, ConstraintValue::Amount(ms)));

    [cpu, memory, real_time, response].into_iter().flatten().collect()
}

fn mhz_factor(unit: &str) -> f64 {
    if unit == "ghz" {
        1_000.0
    } else {
        1.0
    }
}

fn mb_factor(unit: &str) -> f64 {
    match unit {
        "kb" => 1.0 / 1024.0,
        "gb" => 1024.0,
        _ => 1.0,
    }
}

/// First `(number, unit)` match, scaled by the unit's factor.
fn amount(re: &Regex, sentence: &str, factor: fn(&str) -> f64) -> Option<f64> {
    let caps = re.captures(sentence)?;
    let number = caps.get(1)?.as_str().parse::<f64>().ok()?;
    let unit = caps.get(2)?.as_str().to_lowercase();
    Some(number * factor(&unit))
}

fn normalize_protocol(raw: &str) -> String {
    let compact: String = raw
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_lowercase();
    match compact.as_str() {
        "modbusrtu" => "modbus_rtu".to_string(),
        "modbustcp" => "modbus_tcp".to_string(),
        "ethernetip" => "ethernet_ip".to_string(),
        _ => compact,
    }
}

fn normalize_interface(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(parsed: &ParsedRequirement, key: &str) -> Vec<ConstraintValue> {
        parsed
            .constraints
            .iter()
            .filter(|c| c.key == key)
            .map(|c| c.value.clone())
            .collect()
    }

    #[test]
    fn regex_patterns_compile() {
        for re in [
            &*SENTENCE_BREAK,
            &*IO_TYPED,
            &*IO_TOTAL,
            &*PROTOCOL,
            &*INTERFACE,
            &*SPEED,
            &*CPU,
            &*CPU_LEADING,
            &*MEMORY,
            &*MEMORY_LEADING,
            &*REAL_TIME,
            &*RESPONSE_TIME,
        ] {
            assert!(!re.as_str().is_empty());
        }
    }

    #[test]
    fn test_io_counts_by_signal_and_direction() {
        let parsed = PatternRequirementParser
            .parse("We need 16 digital inputs and 8 digital outputs. Add 4 analog inputs.");

        assert_eq!(values(&parsed, keys::DIGITAL_INPUTS), vec![ConstraintValue::Count(16)]);
        assert_eq!(values(&parsed, keys::DIGITAL_OUTPUTS), vec![ConstraintValue::Count(8)]);
        assert_eq!(values(&parsed, keys::ANALOG_INPUTS), vec![ConstraintValue::Count(4)]);
        assert!(parsed.uncategorized.is_empty());
    }

    #[test]
    fn test_io_points_without_direction() {
        let parsed = PatternRequirementParser.parse("The system must have at least 16 digital I/O points.");
        assert_eq!(values(&parsed, keys::DIGITAL_IO), vec![ConstraintValue::Count(16)]);
        assert!(values(&parsed, keys::TOTAL_POINTS).is_empty());

        let parsed = PatternRequirementParser.parse("Provide 32 I/O points");
        assert_eq!(values(&parsed, keys::TOTAL_POINTS), vec![ConstraintValue::Count(32)]);
    }

    #[test]
    fn test_protocols_and_interfaces_are_normalized() {
        let parsed = PatternRequirementParser
            .parse("It should support Modbus RTU and EtherNet/IP over an RS-485 port.");

        assert_eq!(
            values(&parsed, keys::PROTOCOL),
            vec![
                ConstraintValue::Name("modbus_rtu".into()),
                ConstraintValue::Name("ethernet_ip".into())
            ]
        );
        assert_eq!(values(&parsed, keys::INTERFACE), vec![ConstraintValue::Name("rs485".into())]);
    }

    #[test]
    fn test_system_figures_are_converted() {
        let parsed = PatternRequirementParser.parse(
            "The processor must run at 1.5 GHz with 2 GB of RAM. Real-time response time under 10 ms. Network speed of 100 Mbps.",
        );

        assert_eq!(values(&parsed, keys::CPU_MHZ), vec![ConstraintValue::Amount(1500.0)]);
        assert_eq!(values(&parsed, keys::MEMORY_MB), vec![ConstraintValue::Amount(2048.0)]);
        assert_eq!(values(&parsed, keys::REAL_TIME), vec![ConstraintValue::Flag(true)]);
        assert_eq!(values(&parsed, keys::RESPONSE_TIME_MS), vec![ConstraintValue::Amount(10.0)]);
        assert_eq!(values(&parsed, keys::SPEED_KBPS), vec![ConstraintValue::Amount(100_000.0)]);
    }

    #[test]
    fn test_confidence_counts_recognised_sentences() {
        let parsed = PatternRequirementParser.parse("Use 8 analog inputs. Paint it blue.");
        assert_eq!(parsed.uncategorized, vec!["Paint it blue.".to_string()]);
        assert!((parsed.confidence - 0.5).abs() < f64::EPSILON);

        let empty = PatternRequirementParser.parse("   ");
        assert!(empty.constraints.is_empty());
        assert!(empty.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn test_whole_amounts_render_as_integers() {
        assert_eq!(ConstraintValue::Amount(500.0).to_json(), serde_json::json!(500));
        assert_eq!(ConstraintValue::Amount(0.5).to_json(), serde_json::json!(0.5));
    }

    #[test]
    fn test_sentences_in_category_are_unique() {
        let parsed = PatternRequirementParser.parse("16 digital inputs and 8 digital outputs via Profinet.");
        let io: Vec<_> = parsed.sentences_in(ConstraintCategory::Io).collect();
        assert_eq!(io.len(), 1);
    }
}
