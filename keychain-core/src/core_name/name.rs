//! Hierarchical names
//!
//! A `Name` is an ordered list of opaque `Component`s. Identities, keys and
//! certificates are all addressed by names; the URI form (`/alice/KEY/...`)
//! is what the stores persist and what users type.

use super::tlv::{self, types, TlvError, TlvReader};
use super::NameError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Marker byte prefixed to version components
pub const VERSION_MARKER: u8 = 0xFD;

/// A single name component
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Component(Vec<u8>);

impl Component {
    /// Create a component from raw bytes
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Component(bytes.into())
    }

    /// Create a component holding a non-negative integer
    pub fn from_number(n: u64) -> Self {
        Component(tlv::encode_nonneg_integer(n))
    }

    /// Create a version component (marker + non-negative integer)
    pub fn from_version(version: u64) -> Self {
        let mut bytes = vec![VERSION_MARKER];
        bytes.extend(tlv::encode_nonneg_integer(version));
        Component(bytes)
    }

    /// Parse one URI-escaped component
    pub fn from_escaped(s: &str) -> Result<Self, NameError> {
        // a component of only periods carries three extra periods in URI form
        if !s.is_empty() && s.bytes().all(|b| b == b'.') {
            if s.len() < 3 {
                return Err(NameError::InvalidUri(format!(
                    "illegal component '{}'",
                    s
                )));
            }
            return Ok(Component(s.as_bytes()[3..].to_vec()));
        }

        let bytes = s.as_bytes();
        let mut out = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' {
                let hex_digits = s
                    .get(i + 1..i + 3)
                    .ok_or_else(|| NameError::InvalidUri(format!("truncated escape in '{}'", s)))?;
                if !hex_digits.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(NameError::InvalidUri(format!("bad escape in '{}'", s)));
                }
                let byte = u8::from_str_radix(hex_digits, 16)
                    .map_err(|_| NameError::InvalidUri(format!("bad escape in '{}'", s)))?;
                out.push(byte);
                i += 3;
            } else {
                out.push(bytes[i]);
                i += 1;
            }
        }
        Ok(Component(out))
    }

    /// Raw component bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the raw bytes start with `prefix`
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }

    /// Interpret as a non-negative integer
    pub fn to_number(&self) -> Result<u64, NameError> {
        tlv::decode_nonneg_integer(&self.0).map_err(|e| NameError::InvalidNumber(e.to_string()))
    }

    pub fn is_version(&self) -> bool {
        self.0.first() == Some(&VERSION_MARKER)
            && tlv::decode_nonneg_integer(&self.0[1..]).is_ok()
    }

    /// Interpret as a version component
    pub fn to_version(&self) -> Result<u64, NameError> {
        if self.0.first() != Some(&VERSION_MARKER) {
            return Err(NameError::InvalidNumber("missing version marker".to_string()));
        }
        tlv::decode_nonneg_integer(&self.0[1..])
            .map_err(|e| NameError::InvalidNumber(e.to_string()))
    }

    /// URI-escaped form
    pub fn to_uri(&self) -> String {
        if self.0.iter().all(|b| *b == b'.') {
            return format!("...{}", ".".repeat(self.0.len()));
        }
        let mut out = String::with_capacity(self.0.len());
        for b in &self.0 {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
                out.push(*b as char);
            } else {
                out.push_str(&format!("%{:02X}", b));
            }
        }
        out
    }

    /// TLV encoding of this component
    pub fn wire_encode(&self) -> Vec<u8> {
        tlv::encode_tlv(types::NAME_COMPONENT, &self.0)
    }
}

impl From<&str> for Component {
    fn from(s: &str) -> Self {
        Component(s.as_bytes().to_vec())
    }
}

impl From<String> for Component {
    fn from(s: String) -> Self {
        Component(s.into_bytes())
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.to_uri())
    }
}

/// A hierarchical name
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name(Vec<Component>);

impl Name {
    /// The empty (root) name
    pub fn new() -> Self {
        Name(Vec::new())
    }

    /// Parse a URI such as `/alice/KEY/ksk-1`
    pub fn from_uri(uri: &str) -> Result<Self, NameError> {
        let trimmed = uri.trim();
        let path = trimmed.strip_prefix("ndn:").unwrap_or(trimmed);
        let path = path.strip_prefix('/').unwrap_or(path);

        let components = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(Component::from_escaped)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Name(components))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn components(&self) -> &[Component] {
        &self.0
    }

    /// Component at `index`; negative indices count from the end
    pub fn get(&self, index: isize) -> Option<&Component> {
        let idx = if index < 0 {
            self.0.len().checked_sub(index.unsigned_abs())?
        } else {
            index as usize
        };
        self.0.get(idx)
    }

    /// Last component, if any
    pub fn last(&self) -> Option<&Component> {
        self.0.last()
    }

    /// First `n` components; negative `n` drops components from the end
    pub fn prefix(&self, n: isize) -> Name {
        let count = if n < 0 {
            self.0.len().saturating_sub(n.unsigned_abs())
        } else {
            (n as usize).min(self.0.len())
        };
        Name(self.0[..count].to_vec())
    }

    /// `len` components starting at `start` (or all remaining when `None`)
    pub fn sub_name(&self, start: usize, len: Option<usize>) -> Name {
        let start = start.min(self.0.len());
        let end = match len {
            Some(len) => start.saturating_add(len).min(self.0.len()),
            None => self.0.len(),
        };
        Name(self.0[start..end].to_vec())
    }

    /// Whether this name is a prefix of (or equal to) `other`
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.0.len() <= other.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| a == b)
    }

    /// Append a component in place
    pub fn push(&mut self, component: impl Into<Component>) -> &mut Self {
        self.0.push(component.into());
        self
    }

    /// Append a component, builder style
    pub fn append(mut self, component: impl Into<Component>) -> Self {
        self.0.push(component.into());
        self
    }

    /// Append all components of `other`
    pub fn append_name(mut self, other: &Name) -> Self {
        self.0.extend(other.0.iter().cloned());
        self
    }

    pub fn append_number(self, n: u64) -> Self {
        self.append(Component::from_number(n))
    }

    /// Append a version component; `None` uses wall-clock milliseconds
    pub fn append_version(self, version: Option<u64>) -> Self {
        let version = version.unwrap_or_else(next_version);
        self.append(Component::from_version(version))
    }

    /// Position of the first component equal to `marker`
    pub fn position(&self, marker: &[u8]) -> Option<usize> {
        self.0.iter().position(|c| c.as_bytes() == marker)
    }

    /// Position of the last component equal to `marker`
    pub fn rposition(&self, marker: &[u8]) -> Option<usize> {
        self.0.iter().rposition(|c| c.as_bytes() == marker)
    }

    pub fn to_uri(&self) -> String {
        if self.0.is_empty() {
            return "/".to_string();
        }
        self.0.iter().map(|c| format!("/{}", c.to_uri())).collect()
    }

    /// Concatenated component TLVs (the value of the Name TLV)
    pub fn encode_components(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for component in &self.0 {
            tlv::write_tlv(&mut out, types::NAME_COMPONENT, component.as_bytes());
        }
        out
    }

    /// Full Name TLV
    pub fn wire_encode(&self) -> Vec<u8> {
        tlv::encode_tlv(types::NAME, &self.encode_components())
    }

    /// Decode from the value of a Name TLV
    pub fn decode_components(value: &[u8]) -> Result<Self, TlvError> {
        let mut components = Vec::new();
        for element in TlvReader::new(value) {
            let (tlv_type, bytes) = element?;
            if tlv_type != types::NAME_COMPONENT {
                return Err(TlvError::UnexpectedType {
                    expected: types::NAME_COMPONENT,
                    found: tlv_type,
                });
            }
            components.push(Component::from_bytes(bytes));
        }
        Ok(Name(components))
    }

    /// Decode a full Name TLV
    pub fn wire_decode(wire: &[u8]) -> Result<Self, TlvError> {
        let value = TlvReader::new(wire).expect(types::NAME)?;
        Self::decode_components(value)
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Name::from_uri(s)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.to_uri())
    }
}

impl From<Vec<Component>> for Name {
    fn from(components: Vec<Component>) -> Self {
        Name(components)
    }
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

static LAST_VERSION: AtomicU64 = AtomicU64::new(0);

/// A fresh version number: wall-clock milliseconds, bumped past the last
/// one handed out in this process
pub fn next_version() -> u64 {
    let now = now_millis();
    let previous = LAST_VERSION
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(if now <= last { last + 1 } else { now })
        })
        .unwrap_or(now);
    if now <= previous {
        previous + 1
    } else {
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Name {
        Name::from_uri(uri).unwrap()
    }

    #[test]
    fn test_parse_and_format() {
        let n = name("/alice/KEY/ksk-123");
        assert_eq!(n.len(), 3);
        assert_eq!(n.to_uri(), "/alice/KEY/ksk-123");
        assert_eq!(name("ndn:/a/b"), name("/a/b"));
        assert_eq!(Name::new().to_uri(), "/");
        assert!(name("/").is_empty());
    }

    #[test]
    fn test_escaping() {
        let n = Name::new().append(Component::from_bytes(vec![0x00, b'a', b' ']));
        assert_eq!(n.to_uri(), "/%00a%20");
        assert_eq!(name("/%00a%20"), n);
        assert!(Name::from_uri("/bad%2").is_err());
        assert!(Name::from_uri("/bad%zz").is_err());
    }

    #[test]
    fn test_versions_strictly_increase() {
        let mut previous = next_version();
        for _ in 0..1000 {
            let version = next_version();
            assert!(version > previous);
            previous = version;
        }
        let appended = Name::new().append_version(None);
        assert!(appended.get(-1).unwrap().to_version().unwrap() > previous);
    }

    #[test]
    fn test_signed_escape_is_rejected() {
        assert!(matches!(
            Component::from_escaped("%+F"),
            Err(NameError::InvalidUri(_))
        ));
        assert!(Name::from_uri("/a/%+f/b").is_err());
        assert!(Name::from_uri("/a/%-1").is_err());
        assert_eq!(Component::from_escaped("%0f").unwrap().as_bytes(), &[0x0F]);
    }

    #[test]
    fn test_period_components() {
        let n = Name::new().append(Component::from_bytes(b".".to_vec()));
        assert_eq!(n.to_uri(), "/....");
        assert_eq!(name("/...."), n);
        assert_eq!(name("/..."), Name::new().append(Component::from_bytes(Vec::new())));
        assert!(Name::from_uri("/..").is_err());
    }

    #[test]
    fn test_negative_indexing() {
        let n = name("/a/b/c");
        assert_eq!(n.get(-1).unwrap().to_uri(), "c");
        assert_eq!(n.get(0).unwrap().to_uri(), "a");
        assert!(n.get(-4).is_none());
        assert_eq!(n.prefix(-1), name("/a/b"));
        assert_eq!(n.prefix(-5), Name::new());
        assert_eq!(n.prefix(10), n);
        assert_eq!(n.sub_name(1, None), name("/b/c"));
        assert_eq!(n.sub_name(1, Some(1)), name("/b"));
    }

    #[test]
    fn test_prefix_relation() {
        assert!(name("/a").is_prefix_of(&name("/a/b")));
        assert!(name("/a/b").is_prefix_of(&name("/a/b")));
        assert!(!name("/a/c").is_prefix_of(&name("/a/b")));
        assert!(!name("/a/b/c").is_prefix_of(&name("/a/b")));
        assert!(Name::new().is_prefix_of(&name("/a")));
    }

    #[test]
    fn test_number_and_version_components() {
        let c = Component::from_number(1_414_000_000_000);
        assert_eq!(c.to_number().unwrap(), 1_414_000_000_000);
        assert!(!c.is_version());

        let v = Component::from_version(7);
        assert!(v.is_version());
        assert_eq!(v.to_version().unwrap(), 7);
        assert_eq!(v.to_uri(), "%FD%07");
    }

    #[test]
    fn test_wire_roundtrip() {
        let n = name("/test/key/locator");
        let wire = n.wire_encode();
        assert_eq!(wire[0], 0x07);
        assert_eq!(wire[1] as usize, wire.len() - 2);
        assert_eq!(Name::wire_decode(&wire).unwrap(), n);
    }

    #[test]
    fn test_marker_positions() {
        let n = name("/a/KEY/b/KEY/c/ID-CERT/v");
        assert_eq!(n.position(b"KEY"), Some(1));
        assert_eq!(n.rposition(b"KEY"), Some(3));
        assert_eq!(n.rposition(b"ID-CERT"), Some(5));
        assert_eq!(n.position(b"missing"), None);
    }
}
