//! Implicit tag resolution and core-schema scalar decoding.
//!
//! Resolution is dispatched on the scalar's first character: each rule is
//! registered under every first character it can possibly start with
//! (mirroring the reference resolver's own indexing trick), so a plain
//! scalar only has to test the handful of regexes that could conceivably
//! match instead of the whole rule set.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use regex::Regex;

use crate::error::{Error, Result};
use crate::mark::Mark;

pub(crate) const TAG_NULL: &str = "tag:yaml.org,2002:null";
pub(crate) const TAG_BOOL: &str = "tag:yaml.org,2002:bool";
pub(crate) const TAG_INT: &str = "tag:yaml.org,2002:int";
pub(crate) const TAG_FLOAT: &str = "tag:yaml.org,2002:float";
pub(crate) const TAG_TIMESTAMP: &str = "tag:yaml.org,2002:timestamp";
pub(crate) const TAG_MERGE: &str = "tag:yaml.org,2002:merge";
pub(crate) const TAG_STR: &str = "tag:yaml.org,2002:str";
pub(crate) const TAG_BINARY: &str = "tag:yaml.org,2002:binary";
pub(crate) const TAG_SEQ: &str = "tag:yaml.org,2002:seq";
pub(crate) const TAG_MAP: &str = "tag:yaml.org,2002:map";
pub(crate) const TAG_SET: &str = "tag:yaml.org,2002:set";
pub(crate) const TAG_OMAP: &str = "tag:yaml.org,2002:omap";
pub(crate) const TAG_PAIRS: &str = "tag:yaml.org,2002:pairs";

struct Rule {
    tag: String,
    pattern: Regex,
}

/// Decides which tag an unquoted (or, for `!!`, any) scalar implicitly
/// carries, and decodes core-schema scalars into their typed form.
pub struct Resolver {
    rules: HashMap<Option<char>, Vec<Rule>>,
}

impl Default for Resolver {
    fn default() -> Self {
        let mut resolver = Resolver { rules: HashMap::new() };
        resolver.add_implicit_rule(TAG_NULL, r"^(?:~|null|Null|NULL|)$", Some("~nN"));
        resolver.add_implicit_rule(TAG_BOOL, r"^(?:yes|Yes|YES|no|No|NO|true|True|TRUE|false|False|FALSE|on|On|ON|off|Off|OFF)$", Some("yYnNtTfFoO"));
        resolver.add_implicit_rule(
            TAG_INT,
            r"^(?:[-+]?0b[0-1_]+|[-+]?0[0-7_]+|[-+]?(?:0|[1-9][0-9_]*)|[-+]?0x[0-9a-fA-F_]+|[-+]?[1-9][0-9_]*(?::[0-5]?[0-9])+)$",
            Some("-+0123456789"),
        );
        resolver.add_implicit_rule(
            TAG_FLOAT,
            r"^(?:[-+]?(?:[0-9][0-9_]*)\.[0-9_]*(?:[eE][-+]?[0-9]+)?|\.[0-9][0-9_]*(?:[eE][-+]?[0-9]+)?|[-+]?[0-9][0-9_]*(?::[0-5]?[0-9])+\.[0-9_]*|[-+]?\.(?:inf|Inf|INF)|\.(?:nan|NaN|NAN))$",
            Some("-+0123456789."),
        );
        resolver.add_implicit_rule(
            TAG_TIMESTAMP,
            r"^(?:[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]|[0-9][0-9][0-9][0-9]-[0-9][0-9]?-[0-9][0-9]?(?:[Tt]|[ \t]+)[0-9][0-9]?:[0-9][0-9]:[0-9][0-9](?:\.[0-9]*)?(?:[ \t]*(?:Z|[-+][0-9][0-9]?(?::[0-9][0-9])?))?)$",
            Some("0123456789"),
        );
        resolver.add_implicit_rule(TAG_MERGE, r"^<<$", Some("<"));
        resolver
    }
}

impl Resolver {
    pub fn new() -> Self {
        Resolver::default()
    }

    /// Register an additional implicit-resolution rule. `first_chars` lists
    /// every character the scalar may start with for the rule to be worth
    /// trying; `None` registers it against every scalar regardless of its
    /// first character (the `str` fallback's slot, effectively).
    pub fn add_implicit_rule(&mut self, tag: impl Into<String>, pattern: &str, first_chars: Option<&str>) {
        let tag = tag.into();
        let regex = Regex::new(pattern).expect("resolver pattern must be a valid regex");
        match first_chars {
            Some(chars) => {
                for ch in chars.chars() {
                    self.rules.entry(Some(ch)).or_default().push(Rule { tag: tag.clone(), pattern: regex.clone() });
                }
            }
            None => {
                self.rules.entry(None).or_default().push(Rule { tag, pattern: regex });
            }
        }
    }

    /// The implicit tag for a plain scalar, or `!!str` if nothing matches.
    pub fn resolve_scalar(&self, value: &str) -> &str {
        let first = value.chars().next();
        if let Some(ch) = first {
            if let Some(rules) = self.rules.get(&Some(ch)) {
                for rule in rules {
                    if rule.pattern.is_match(value) {
                        return &rule.tag;
                    }
                }
            }
        }
        if let Some(rules) = self.rules.get(&None) {
            for rule in rules {
                if rule.pattern.is_match(value) {
                    return &rule.tag;
                }
            }
        }
        if first.is_none() {
            return TAG_NULL;
        }
        TAG_STR
    }
}

fn strip_underscores(value: &str) -> String {
    value.chars().filter(|c| *c != '_').collect()
}

pub fn construct_bool(value: &str) -> Option<bool> {
    match value {
        "yes" | "Yes" | "YES" | "true" | "True" | "TRUE" | "on" | "On" | "ON" => Some(true),
        "no" | "No" | "NO" | "false" | "False" | "FALSE" | "off" | "Off" | "OFF" => Some(false),
        _ => None,
    }
}

/// Decode a `!!int` scalar: decimal, `0x`/`0b`/`0`-prefixed hex/binary/octal,
/// underscores as digit separators, and YAML 1.1's sexagesimal (`1:30:00`).
pub fn construct_int(value: &str) -> Option<i64> {
    let (sign, body) = match value.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, value.strip_prefix('+').unwrap_or(value)),
    };
    let body = strip_underscores(body);
    if let Some(rest) = body.strip_prefix("0b") {
        return i64::from_str_radix(rest, 2).ok().map(|n| sign * n);
    }
    if let Some(rest) = body.strip_prefix("0x") {
        return i64::from_str_radix(rest, 16).ok().map(|n| sign * n);
    }
    if body.contains(':') {
        let mut acc: i64 = 0;
        for part in body.split(':') {
            let digit: i64 = part.parse().ok()?;
            acc = acc * 60 + digit;
        }
        return Some(sign * acc);
    }
    if body.len() > 1 && body.starts_with('0') {
        return i64::from_str_radix(&body, 8).ok().map(|n| sign * n);
    }
    body.parse::<i64>().ok().map(|n| sign * n)
}

/// Decode a `!!float` scalar, including `.inf`/`.nan` and sexagesimal floats.
pub fn construct_float(value: &str) -> Option<f64> {
    let lower = value.to_ascii_lowercase();
    match lower.as_str() {
        ".inf" | "+.inf" => return Some(f64::INFINITY),
        "-.inf" => return Some(f64::NEG_INFINITY),
        ".nan" => return Some(f64::NAN),
        _ => {}
    }
    let (sign, body) = match value.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, value.strip_prefix('+').unwrap_or(value)),
    };
    let body = strip_underscores(body);
    if body.contains(':') {
        let mut parts = body.splitn(2, '.');
        let whole = parts.next().unwrap();
        let frac = parts.next();
        let mut acc: f64 = 0.0;
        for part in whole.split(':') {
            let digit: f64 = part.parse().ok()?;
            acc = acc * 60.0 + digit;
        }
        if let Some(frac) = frac {
            let frac_val: f64 = format!("0.{frac}").parse().ok()?;
            acc += frac_val;
        }
        return Some(sign * acc);
    }
    body.parse::<f64>().ok().map(|n| sign * n)
}

/// Decode a `!!binary` scalar: base64, with embedded whitespace stripped
/// (block scalars commonly wrap long base64 text across lines).
pub fn construct_binary(value: &str, mark: Mark) -> Result<Vec<u8>> {
    use base64::Engine as _;
    let cleaned: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(cleaned)
        .map_err(|e| Error::constructor(format!("invalid base64 in a !!binary scalar: {e}"), mark))
}

/// Decode a `!!timestamp` scalar: RFC 3339, a bare date, or PyYAML's
/// canonical `YYYY-MM-DD hh:mm:ss[.ffff][ +hh[:mm]]` form.
pub fn construct_timestamp(value: &str, mark: Mark) -> Result<DateTime<FixedOffset>> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0).unwrap();
        return Ok(Utc.from_utc_datetime(&naive).fixed_offset());
    }
    static CANONICAL: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let re = CANONICAL.get_or_init(|| {
        Regex::new(
            r"^([0-9][0-9][0-9][0-9])-([0-9][0-9]?)-([0-9][0-9]?)(?:[Tt]|[ \t]+)([0-9][0-9]?):([0-9][0-9]):([0-9][0-9])(?:\.([0-9]*))?(?:[ \t]*(Z|[-+][0-9][0-9]?(?::[0-9][0-9])?))?$",
        )
        .unwrap()
    });
    if let Some(caps) = re.captures(trimmed) {
        let year: i32 = caps[1].parse().unwrap();
        let month: u32 = caps[2].parse().unwrap();
        let day: u32 = caps[3].parse().unwrap();
        let hour: u32 = caps[4].parse().unwrap();
        let minute: u32 = caps[5].parse().unwrap();
        let second: u32 = caps[6].parse().unwrap();
        let nanos: u32 = caps
            .get(7)
            .map(|frac| {
                let mut digits = frac.as_str().to_string();
                digits.truncate(9);
                while digits.len() < 9 {
                    digits.push('0');
                }
                digits.parse().unwrap_or(0)
            })
            .unwrap_or(0);
        let naive = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_nano_opt(hour, minute, second, nanos))
            .ok_or_else(|| Error::constructor("invalid timestamp components", mark.clone()))?;
        let offset = match caps.get(8).map(|m| m.as_str()) {
            None | Some("Z") | Some("z") => FixedOffset::east_opt(0).unwrap(),
            Some(tz) => parse_offset(tz).ok_or_else(|| Error::constructor("invalid timestamp offset", mark.clone()))?,
        };
        return offset
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| Error::constructor("ambiguous local timestamp", mark));
    }
    Err(Error::constructor(format!("could not parse {value:?} as a timestamp"), mark))
}

fn parse_offset(tz: &str) -> Option<FixedOffset> {
    let (sign, rest) = tz.split_at(1);
    let sign = if sign == "-" { -1 } else { 1 };
    let mut parts = rest.splitn(2, ':');
    let hours: i32 = parts.next()?.parse().ok()?;
    let minutes: i32 = parts.next().unwrap_or("0").parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_core_schema_tags() {
        let r = Resolver::new();
        assert_eq!(r.resolve_scalar("null"), TAG_NULL);
        assert_eq!(r.resolve_scalar("~"), TAG_NULL);
        assert_eq!(r.resolve_scalar("true"), TAG_BOOL);
        assert_eq!(r.resolve_scalar("42"), TAG_INT);
        assert_eq!(r.resolve_scalar("-0x1A"), TAG_INT);
        assert_eq!(r.resolve_scalar("3.14"), TAG_FLOAT);
        assert_eq!(r.resolve_scalar(".inf"), TAG_FLOAT);
        assert_eq!(r.resolve_scalar("2002-12-14"), TAG_TIMESTAMP);
        assert_eq!(r.resolve_scalar("<<"), TAG_MERGE);
        assert_eq!(r.resolve_scalar("hello world"), TAG_STR);
    }

    #[test]
    fn decodes_sexagesimal_int_and_float() {
        assert_eq!(construct_int("1:30:00"), Some(5400));
        assert_eq!(construct_float("1:30.5").map(|f| (f * 10.0).round()), Some(905.0));
    }

    #[test]
    fn decodes_hex_and_octal() {
        assert_eq!(construct_int("0x1A"), Some(26));
        assert_eq!(construct_int("017"), Some(15));
        assert_eq!(construct_int("-0x1A"), Some(-26));
    }

    #[test]
    fn decodes_binary_scalar() {
        let bytes = construct_binary("aGVsbG8=", Mark::unknown()).unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn decodes_canonical_timestamp() {
        let dt = construct_timestamp("2001-12-14 21:59:43.10 -5", Mark::unknown()).unwrap();
        assert_eq!(dt.to_rfc3339(), "2001-12-14T21:59:43.100000000-05:00");
    }
}
