use serde::{Serialize, Serializer};
use smallvec::SmallVec;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Byte that joins path segments unless configured otherwise
pub const PATH_SEPARATOR: u8 = b'\n';

/// A registered field location, e.g. `b"properties\nSTREET"`.
///
/// Cloning is cheap: every record produced for the same registration shares
/// one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path(Arc<[u8]>);

impl Path {
    pub fn new(bytes: impl AsRef<[u8]>) -> Self {
        Path(Arc::from(bytes.as_ref()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Split the path into its segments
    pub fn segments(&self, separator: u8) -> impl Iterator<Item = &[u8]> {
        self.0.split(move |b| *b == separator)
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl AsRef<[u8]> for Path {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Path::new(s)
    }
}

impl From<&[u8]> for Path {
    fn from(bytes: &[u8]) -> Self {
        Path::new(bytes)
    }
}

impl From<Vec<u8>> for Path {
    fn from(bytes: Vec<u8>) -> Self {
        Path(Arc::from(bytes))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string_lossy())
    }
}

/// Position of a value inside one enclosing array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ArrayPos {
    /// Ordinal of the array within the document, starting at 1.
    /// Every array entered during a traversal gets a fresh ordinal.
    pub array: u32,

    /// 1-based position of the element within that array
    pub pos: u32,
}

impl ArrayPos {
    pub fn new(array: u32, pos: u32) -> Self {
        ArrayPos { array, pos }
    }
}

/// Enclosing array positions, outermost first
pub type ArrayTrail = SmallVec<[ArrayPos; 4]>;

/// One extracted occurrence of a registered path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldRecord {
    /// The full registered path that matched
    pub path: Path,

    /// The raw encoded token: strings keep their quotes, numbers their text
    #[serde(serialize_with = "serialize_raw")]
    pub value: Vec<u8>,

    /// Empty unless the value sits inside one or more arrays
    pub array_trail: ArrayTrail,
}

impl FieldRecord {
    pub fn new(path: Path, value: impl Into<Vec<u8>>) -> Self {
        FieldRecord {
            path,
            value: value.into(),
            array_trail: ArrayTrail::new(),
        }
    }

    pub fn with_trail(mut self, trail: &[ArrayPos]) -> Self {
        self.array_trail = ArrayTrail::from_slice(trail);
        self
    }

    pub fn value_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

fn serialize_raw<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(value))
}

/// Configuration shared by index construction and traversal
#[derive(Debug, Clone)]
pub struct FlattenConfig {
    /// Byte joining segments of registered paths
    pub separator: u8,

    /// Deepest combined object/array nesting the flattener will descend into
    pub max_nesting: usize,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        FlattenConfig {
            separator: PATH_SEPARATOR,
            max_nesting: 128,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_segments() {
        let path = Path::from("properties\nSTREET");
        let segments: Vec<&[u8]> = path.segments(PATH_SEPARATOR).collect();
        assert_eq!(segments, vec![&b"properties"[..], &b"STREET"[..]]);
    }

    #[test]
    fn test_record_serializes_raw_value() {
        let record = FieldRecord::new(Path::from("a\nb"), &b"\"x\""[..])
            .with_trail(&[ArrayPos::new(1, 2)]);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["path"], "a\nb");
        assert_eq!(json["value"], "\"x\"");
        assert_eq!(json["array_trail"][0]["array"], 1);
        assert_eq!(json["array_trail"][0]["pos"], 2);
    }
}
