use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Separator between the field section and the name section of a key.
const NAME_SEPARATOR: &str = "--";

/// Content key of an immutable object, e.g. `MD5E-s1024-S512-C2--d41d8cd98f.dat`.
///
/// The layout is `<backend>-<fields>--<name>`. The store only looks at the
/// size fields:
///
/// - `s<N>`: total size of the content in bytes
/// - `S<N>`: chunk size, present on chunk keys
/// - `C<N>`: chunk number (1-based), present on chunk keys
///
/// Everything else (the backend, the hash in the name section, `m<N>`
/// mtime fields) is carried along verbatim.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentKey(String);

/// Size-related fields decoded from a key. A field whose value is not a
/// decimal number is reported as absent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyFields {
    pub size: Option<u64>,
    pub chunk_size: Option<u64>,
    pub chunk_number: Option<u64>,
}

impl ContentKey {
    /// Validate and wrap a key string.
    ///
    /// Keys end up as file and directory names, so anything that could
    /// escape or break a path component is rejected.
    pub fn parse(key: &str) -> Result<Self, TypeError> {
        if key.is_empty() {
            return Err(TypeError::key(key, "key must not be empty"));
        }
        if key == "." || key == ".." {
            return Err(TypeError::key(key, "key must not be a relative path component"));
        }
        if key.contains('/') {
            return Err(TypeError::key(key, "key must not contain '/'"));
        }
        if let Some(ch) = key.chars().find(|c| c.is_whitespace() || c.is_control()) {
            return Err(TypeError::key(key, format!("contains forbidden character: {ch:?}")));
        }
        Ok(Self(key.to_string()))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key backend name (`SHA256E`, `MD5E`, `URL`, ...).
    pub fn backend(&self) -> &str {
        self.field_section().split('-').next().unwrap_or_default()
    }

    /// Decode the size-related fields.
    pub fn fields(&self) -> KeyFields {
        let mut fields = KeyFields::default();
        for field in self.field_section().split('-').skip(1) {
            let Some(tag) = field.chars().next() else { continue };
            let value = parse_number(&field[tag.len_utf8()..]);
            match tag {
                's' => fields.size = value,
                'S' => fields.chunk_size = value,
                'C' => fields.chunk_number = value,
                _ => {}
            }
        }
        fields
    }

    /// Number of bytes of the object stored under this key, if the key
    /// records it.
    ///
    /// For a plain key this is the total size. For a chunk key it is the
    /// size of that one chunk: every chunk carries `S` bytes except the
    /// final one, which carries the remainder `s mod S`. Chunk numbers are
    /// 1-based, so the chunk at zero-based index `C - 1` is the final one
    /// when `C - 1 == floor(s / S)`.
    ///
    /// Returns `Ok(None)` when the total size is not recorded and an error
    /// when the chunk fields are inconsistent.
    pub fn expected_size(&self) -> Result<Option<u64>, TypeError> {
        let KeyFields {
            size,
            chunk_size,
            chunk_number,
        } = self.fields();
        let Some(total) = size else {
            return Ok(None);
        };
        match (chunk_size, chunk_number) {
            (None, None) => Ok(Some(total)),
            (Some(chunk), Some(number)) => chunk_length(total, chunk, number)
                .map(Some)
                .ok_or_else(|| {
                    TypeError::key(
                        &self.0,
                        format!("chunk {number} of size {chunk} does not fit a total of {total} bytes"),
                    )
                }),
            _ => Err(TypeError::key(
                &self.0,
                "chunk size and chunk number must be given together",
            )),
        }
    }

    /// The key with chunk fields (`S`, `C`) removed.
    ///
    /// All chunks of one object hash into the same directory bucket, which
    /// is computed from this form.
    pub fn non_chunk(&self) -> String {
        let (fields, name) = match self.0.split_once(NAME_SEPARATOR) {
            Some((fields, name)) => (fields, Some(name)),
            None => (self.0.as_str(), None),
        };
        let kept: Vec<&str> = fields
            .split('-')
            .enumerate()
            .filter(|(idx, field)| *idx == 0 || !is_chunk_field(field))
            .map(|(_, field)| field)
            .collect();
        let mut out = kept.join("-");
        if let Some(name) = name {
            out.push_str(NAME_SEPARATOR);
            out.push_str(name);
        }
        out
    }

    fn field_section(&self) -> &str {
        self.0
            .split_once(NAME_SEPARATOR)
            .map(|(fields, _)| fields)
            .unwrap_or(&self.0)
    }
}

/// Byte length of the 1-based chunk `number` of an object of `total` bytes
/// split into chunks of `chunk` bytes. `None` if no such chunk exists.
fn chunk_length(total: u64, chunk: u64, number: u64) -> Option<u64> {
    if chunk == 0 || number == 0 {
        return None;
    }
    let index = number - 1;
    let full_chunks = total / chunk;
    let remainder = total % chunk;
    if index < full_chunks {
        Some(chunk)
    } else if index == full_chunks && remainder != 0 {
        Some(remainder)
    } else {
        None
    }
}

fn is_chunk_field(field: &str) -> bool {
    let mut chars = field.chars();
    matches!(chars.next(), Some('S' | 'C')) && parse_number(chars.as_str()).is_some()
}

fn parse_number(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentKey({})", self.0)
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContentKey {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContentKey> for String {
    fn from(key: ContentKey) -> Self {
        key.0
    }
}

impl AsRef<str> for ContentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
