//! Port types with validation and parsing.
//!
//! The `Port` newtype ensures values are always valid port numbers (1-65535).
//! `PortRange` and `PortSpec` handle the textual port specification, and
//! `PortSet` is the resolved, duplicate-free sequence a scan iterates over.
//! Deserializing either type goes through the same validation as parsing.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// A validated network port number (1-65535).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Port(u16);

impl Port {
    /// Minimum valid port number.
    pub const MIN: u16 = 1;
    /// Maximum valid port number.
    pub const MAX: u16 = 65535;

    /// Create a new Port from a u16, returning None if invalid.
    #[inline]
    pub const fn new(port: u16) -> Option<Self> {
        if port >= Self::MIN {
            Some(Self(port))
        } else {
            None
        }
    }

    /// Get the raw port number.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for Port {
    type Error = PortError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(PortError::OutOfRange(u32::from(value)))
    }
}

impl From<Port> for u16 {
    fn from(port: Port) -> Self {
        port.0
    }
}

/// Error type for port parsing and validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("port {0} is out of valid range (1-65535)")]
    OutOfRange(u32),
    #[error("invalid port number: '{0}'")]
    InvalidFormat(String),
    #[error("invalid port range: start ({0}) > end ({1})")]
    InvalidRange(u16, u16),
    #[error("empty port specification")]
    Empty,
    #[error("port {0} is listed more than once")]
    Duplicate(u16),
}

/// A range of ports (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    start: Port,
    end: Port,
}

impl PortRange {
    /// Create a new port range.
    pub fn new(start: Port, end: Port) -> Result<Self, PortError> {
        if start > end {
            Err(PortError::InvalidRange(start.0, end.0))
        } else {
            Ok(Self { start, end })
        }
    }

    /// Create a range containing a single port.
    pub const fn single(port: Port) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    /// Get the number of ports in this range.
    pub const fn len(&self) -> usize {
        (self.end.0 - self.start.0) as usize + 1
    }

    /// A valid range always holds at least one port.
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Iterate over all ports in this range, ascending.
    pub fn iter(&self) -> impl Iterator<Item = Port> {
        (self.start.0..=self.end.0).map(Port)
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// A parsed port specification: the ranges in the order they were written.
///
/// Supports formats like:
/// - Single port: "80"
/// - Comma-separated: "80,443,8080"
/// - Range: "1-1000"
/// - Mixed: "22,80,443,8000-9000"
/// - Keywords: "all" (1-65535) and "top" (see [`PortSet::top`])
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortSpec {
    ranges: Vec<PortRange>,
}

impl PortSpec {
    /// Create an empty port specification.
    pub const fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Add a port range to the specification.
    pub fn add_range(&mut self, range: PortRange) {
        self.ranges.push(range);
    }

    /// Parse one more token (which may itself be a comma list) into this spec.
    pub fn push_token(&mut self, token: &str) -> Result<(), PortError> {
        for part in token.split(',') {
            let part = part.trim();
            match part {
                "" => {}
                "all" => self.add_range(PortRange::new(Port(Port::MIN), Port(Port::MAX))?),
                "top" => PortSet::top()
                    .iter()
                    .for_each(|port| self.add_range(PortRange::single(port))),
                _ => self.add_range(parse_item(part)?),
            }
        }
        Ok(())
    }

    /// The ranges, in specification order.
    pub fn ranges(&self) -> &[PortRange] {
        &self.ranges
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl FromStr for PortSpec {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut spec = Self::new();
        spec.push_token(s)?;
        if spec.is_empty() {
            return Err(PortError::Empty);
        }
        Ok(spec)
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.ranges.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Parse a single item: either `N` or `START-END`.
fn parse_item(part: &str) -> Result<PortRange, PortError> {
    match part.split_once('-') {
        Some((start, end)) => {
            let start = parse_port(start)?;
            let end = parse_port(end)?;
            PortRange::new(start, end)
        }
        None => parse_port(part).map(PortRange::single),
    }
}

fn parse_port(value: &str) -> Result<Port, PortError> {
    let value = value.trim();
    // Parse wide so that 70000 reports as out of range instead of malformed.
    let number: u32 = value
        .parse()
        .map_err(|_| PortError::InvalidFormat(value.to_string()))?;
    u16::try_from(number)
        .ok()
        .and_then(Port::new)
        .ok_or(PortError::OutOfRange(number))
}

/// A resolved, duplicate-free sequence of ports.
///
/// Iteration order is the first-occurrence order of the specification, so
/// the same input always yields the same dispatch order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Port>", into = "Vec<Port>")]
pub struct PortSet {
    ports: Vec<Port>,
}

impl PortSet {
    /// Expand port tokens into a `PortSet`.
    ///
    /// Each token is a single port, an inclusive `start-end` range, or a
    /// comma-separated list of those. Overlaps are removed keeping the first
    /// occurrence of every port.
    pub fn resolve<I, S>(tokens: I) -> Result<Self, PortError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut spec = PortSpec::new();
        for token in tokens {
            spec.push_token(token.as_ref())?;
        }
        if spec.is_empty() {
            return Err(PortError::Empty);
        }
        Ok(Self::from_spec(&spec))
    }

    /// Flatten a parsed specification, dropping repeated ports.
    pub fn from_spec(spec: &PortSpec) -> Self {
        let mut seen = HashSet::new();
        let ports = spec
            .ranges()
            .iter()
            .flat_map(|range| range.iter())
            .filter(|port| seen.insert(*port))
            .collect();
        Self { ports }
    }

    /// A short list of commonly exposed service ports.
    pub fn top() -> Self {
        const TOP: [u16; 24] = [
            21, 22, 23, 25, 53, 80, 110, 111, 135, 139, 143, 443, 445, 993, 995, 1723, 3306,
            3389, 5432, 5900, 6379, 8080, 8443, 27017,
        ];
        Self {
            ports: TOP.iter().copied().filter_map(Port::new).collect(),
        }
    }

    /// Number of ports in the set.
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// Check if the set holds no ports.
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Iterate over the ports in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = Port> + '_ {
        self.ports.iter().copied()
    }

}

impl TryFrom<Vec<Port>> for PortSet {
    type Error = PortError;

    /// Accept an already resolved list; it must be non-empty and free of repeats.
    fn try_from(ports: Vec<Port>) -> Result<Self, Self::Error> {
        if ports.is_empty() {
            return Err(PortError::Empty);
        }
        let mut seen = HashSet::new();
        if let Some(repeated) = ports.iter().find(|port| !seen.insert(**port)) {
            return Err(PortError::Duplicate(repeated.0));
        }
        Ok(Self { ports })
    }
}

impl From<PortSet> for Vec<Port> {
    fn from(set: PortSet) -> Self {
        set.ports
    }
}

impl FromStr for PortSet {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve([s])
    }
}

impl FromIterator<Port> for PortSet {
    fn from_iter<T: IntoIterator<Item = Port>>(iter: T) -> Self {
        let mut seen = HashSet::new();
        Self {
            ports: iter.into_iter().filter(|port| seen.insert(*port)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(set: &PortSet) -> Vec<u16> {
        set.iter().map(Port::as_u16).collect()
    }

    #[test]
    fn test_port_validation() {
        assert!(Port::new(0).is_none());
        assert!(Port::new(1).is_some());
        assert!(Port::new(65535).is_some());
        assert!(Port::try_from(0).is_err());
    }

    #[test]
    fn test_port_range() {
        let range = PortRange::new(Port(1), Port(100)).unwrap();
        assert_eq!(range.len(), 100);
        assert_eq!(range.to_string(), "1-100");
        assert!(PortRange::new(Port(10), Port(5)).is_err());
    }

    #[test]
    fn test_resolve_dedups_overlap_in_first_seen_order() {
        let set = PortSet::resolve(["80", "82-84", "82"]).unwrap();
        assert_eq!(numbers(&set), vec![80, 82, 83, 84]);
    }

    #[test]
    fn test_resolve_keeps_input_order() {
        let set = PortSet::resolve(["443", "22", "80-81", "22"]).unwrap();
        assert_eq!(numbers(&set), vec![443, 22, 80, 81]);
    }

    #[test]
    fn test_resolve_comma_lists() {
        let set = PortSet::resolve(["22,80", "100-102,80"]).unwrap();
        assert_eq!(numbers(&set), vec![22, 80, 100, 101, 102]);
    }

    #[test]
    fn test_resolve_is_idempotent_on_normalized_input() {
        let first = PortSet::resolve(["1-5", "7", "9"]).unwrap();
        let tokens: Vec<String> = first.iter().map(|p| p.to_string()).collect();
        let second = PortSet::resolve(&tokens).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_resolve_bounds() {
        let set = PortSet::resolve(["65530-65535", "1"]).unwrap();
        assert!(set.iter().all(|p| p.as_u16() >= 1));
        assert_eq!(set.len(), 7);
    }

    #[test]
    fn test_resolve_errors() {
        assert_eq!(
            PortSet::resolve(["0"]).unwrap_err(),
            PortError::OutOfRange(0)
        );
        assert_eq!(
            PortSet::resolve(["70000"]).unwrap_err(),
            PortError::OutOfRange(70000)
        );
        assert_eq!(
            PortSet::resolve(["100-50"]).unwrap_err(),
            PortError::InvalidRange(100, 50)
        );
        assert!(matches!(
            PortSet::resolve(["http"]),
            Err(PortError::InvalidFormat(_))
        ));
        assert!(matches!(
            PortSet::resolve(["1-2-3"]),
            Err(PortError::InvalidFormat(_))
        ));
        assert_eq!(
            PortSet::resolve(Vec::<String>::new()).unwrap_err(),
            PortError::Empty
        );
        assert_eq!(PortSet::resolve([" , "]).unwrap_err(), PortError::Empty);
    }

    #[test]
    fn test_port_spec_display() {
        let spec: PortSpec = "22,80,8000-8010".parse().unwrap();
        assert_eq!(spec.to_string(), "22,80,8000-8010");
        assert_eq!(PortSet::from_spec(&spec).len(), 13);
    }

    #[test]
    fn test_keywords() {
        let all = PortSet::resolve(["all"]).unwrap();
        assert_eq!(all.len(), 65535);
        assert_eq!(all.iter().next(), Some(Port(1)));

        let top = PortSet::resolve(["top,22,9999"]).unwrap();
        assert_eq!(top.len(), 25);
        assert_eq!(top.iter().next(), Some(Port(21)));
        assert_eq!(top.iter().last(), Some(Port(9999)));
    }

    #[test]
    fn test_deserialize_validates_ports() {
        assert_eq!(serde_json::from_str::<Port>("443").unwrap(), Port(443));
        assert!(serde_json::from_str::<Port>("0").is_err());
        assert!(serde_json::from_str::<Port>("70000").is_err());
        assert_eq!(serde_json::to_string(&Port(22)).unwrap(), "22");
    }

    #[test]
    fn test_deserialize_validates_port_sets() {
        let set: PortSet = serde_json::from_str("[443,22]").unwrap();
        assert_eq!(numbers(&set), vec![443, 22]);
        assert_eq!(serde_json::to_string(&set).unwrap(), "[443,22]");

        assert!(serde_json::from_str::<PortSet>("[]").is_err());
        assert!(serde_json::from_str::<PortSet>("[80,0]").is_err());
        assert_eq!(
            PortSet::try_from(vec![Port(80), Port(81), Port(80)]).unwrap_err(),
            PortError::Duplicate(80)
        );
    }
}
