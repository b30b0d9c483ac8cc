//! The tagged binary tree format used for registry-style payloads.
//!
//! Unlike the rest of the protocol, strings here carry a big-endian `u16` length, and lists
//! and arrays an `i32` count. Compounds keep their insertion order so the bytes we write
//! are stable.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NbtError {
    #[error("unexpected end of input at byte {0}")]
    UnexpectedEnd(usize),
    #[error("unknown tag kind {0}")]
    UnknownTag(u8),
    #[error("negative length {0}")]
    NegativeLength(i32),
    #[error("string is not valid utf-8")]
    InvalidString,
    #[error("list of {expected:?} can't hold a {found:?}")]
    MixedList { expected: Kind, found: Kind },
    #[error("{0} bytes is too long for a length prefix")]
    TooLong(usize),
    #[error("nested too deeply")]
    TooDeep,
}
pub type Result<T, E = NbtError> = std::result::Result<T, E>;

pub const MAX_DEPTH: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Kind {
    End = 0,
    Byte = 1,
    Short = 2,
    Int = 3,
    Long = 4,
    Float = 5,
    Double = 6,
    ByteArray = 7,
    String = 8,
    List = 9,
    Compound = 10,
    IntArray = 11,
    LongArray = 12,
}
impl TryFrom<u8> for Kind {
    type Error = NbtError;
    fn try_from(b: u8) -> Result<Self> {
        Ok(match b {
            0 => Kind::End,
            1 => Kind::Byte,
            2 => Kind::Short,
            3 => Kind::Int,
            4 => Kind::Long,
            5 => Kind::Float,
            6 => Kind::Double,
            7 => Kind::ByteArray,
            8 => Kind::String,
            9 => Kind::List,
            10 => Kind::Compound,
            11 => Kind::IntArray,
            12 => Kind::LongArray,
            b => return Err(NbtError::UnknownTag(b)),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<i8>),
    String(String),
    List(List),
    Compound(Compound),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}
impl Tag {
    pub fn kind(&self) -> Kind {
        match self {
            Tag::Byte(_) => Kind::Byte,
            Tag::Short(_) => Kind::Short,
            Tag::Int(_) => Kind::Int,
            Tag::Long(_) => Kind::Long,
            Tag::Float(_) => Kind::Float,
            Tag::Double(_) => Kind::Double,
            Tag::ByteArray(_) => Kind::ByteArray,
            Tag::String(_) => Kind::String,
            Tag::List(_) => Kind::List,
            Tag::Compound(_) => Kind::Compound,
            Tag::IntArray(_) => Kind::IntArray,
            Tag::LongArray(_) => Kind::LongArray,
        }
    }
}
macro_rules! tag_from {
    ($($t:ty => $v:ident),*) => {$(
        impl From<$t> for Tag {
            fn from(v: $t) -> Self {
                Tag::$v(v)
            }
        }
    )*};
}
tag_from!(i8 => Byte, i16 => Short, i32 => Int, i64 => Long, f32 => Float, f64 => Double,
          String => String, List => List, Compound => Compound);
impl From<bool> for Tag {
    fn from(v: bool) -> Self {
        Tag::Byte(v as i8)
    }
}
impl From<&str> for Tag {
    fn from(v: &str) -> Self {
        Tag::String(v.to_owned())
    }
}

/// A list whose elements all share one kind. An empty list has kind `End`.
#[derive(Debug, Clone, PartialEq)]
pub struct List {
    kind: Kind,
    items: Vec<Tag>,
}
impl List {
    pub fn new() -> Self {
        Self { kind: Kind::End, items: vec![] }
    }
    pub fn of(items: impl IntoIterator<Item = impl Into<Tag>>) -> Result<Self> {
        let mut list = Self::new();
        for item in items {
            list.push(item.into())?;
        }
        Ok(list)
    }
    pub fn push(&mut self, tag: Tag) -> Result<()> {
        if self.items.is_empty() {
            self.kind = tag.kind();
        } else if tag.kind() != self.kind {
            return Err(NbtError::MixedList { expected: self.kind, found: tag.kind() });
        }
        self.items.push(tag);
        Ok(())
    }
    pub fn kind(&self) -> Kind {
        self.kind
    }
    pub fn len(&self) -> usize {
        self.items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.items.iter()
    }
}
impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Compound(Vec<(String, Tag)>);
impl Compound {
    pub fn new() -> Self {
        Self(vec![])
    }
    /// Replaces any existing entry of the same name in place.
    pub fn insert(&mut self, name: impl Into<String>, tag: impl Into<Tag>) {
        let name = name.into();
        let tag = tag.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = tag,
            None => self.0.push((name, tag)),
        }
    }
    pub fn get(&self, name: &str) -> Option<&Tag> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tag)> {
        self.0.iter().map(|(n, t)| (n.as_str(), t))
    }
}

/// Builds a [`Compound`] in the order the entries are written.
#[macro_export]
macro_rules! compound {
    ($($key:literal : $v:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut c = $crate::nbt::Compound::new();
        $(c.insert($key, $v);)*
        c
    }};
}

/// Appends encoded tags at a cursor. The backing buffer starts at 1KiB and doubles
/// whenever a write would run past its end.
#[derive(Debug)]
pub struct Writer {
    buf: Vec<u8>,
    offset: usize,
    written: usize,
}
impl Writer {
    pub fn new() -> Self {
        Self { buf: vec![0; 1024], offset: 0, written: 0 }
    }
    pub fn offset(&self) -> usize {
        self.offset
    }
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
    /// Moves the cursor. Seeking past what has been written fills the gap with zeroes.
    pub fn seek(&mut self, offset: usize) {
        self.reserve_to(offset);
        self.offset = offset;
    }
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.buf.truncate(self.written.max(self.offset));
        self.buf
    }

    fn reserve_to(&mut self, end: usize) {
        if end > self.buf.len() {
            let mut len = self.buf.len().max(1);
            while len < end {
                len *= 2;
            }
            self.buf.resize(len, 0);
        }
    }
    fn put(&mut self, bytes: &[u8]) {
        let end = self.offset + bytes.len();
        self.reserve_to(end);
        self.buf[self.offset..end].copy_from_slice(bytes);
        self.offset = end;
        self.written = self.written.max(end);
    }
    fn put_len(&mut self, len: usize) -> Result<()> {
        let len = i32::try_from(len).map_err(|_| NbtError::TooLong(len))?;
        self.put(&len.to_be_bytes());
        Ok(())
    }

    pub fn write_kind(&mut self, kind: Kind) {
        self.put(&[kind as u8]);
    }
    pub fn write_string(&mut self, s: &str) -> Result<()> {
        let len = u16::try_from(s.len()).map_err(|_| NbtError::TooLong(s.len()))?;
        self.put(&len.to_be_bytes());
        self.put(s.as_bytes());
        Ok(())
    }
    pub fn write_named(&mut self, name: &str, tag: &Tag) -> Result<()> {
        self.write_kind(tag.kind());
        self.write_string(name)?;
        self.write_payload(tag)
    }
    pub fn write_payload(&mut self, tag: &Tag) -> Result<()> {
        match tag {
            Tag::Byte(v) => self.put(&v.to_be_bytes()),
            Tag::Short(v) => self.put(&v.to_be_bytes()),
            Tag::Int(v) => self.put(&v.to_be_bytes()),
            Tag::Long(v) => self.put(&v.to_be_bytes()),
            Tag::Float(v) => self.put(&v.to_be_bytes()),
            Tag::Double(v) => self.put(&v.to_be_bytes()),
            Tag::ByteArray(v) => {
                self.put_len(v.len())?;
                for b in v {
                    self.put(&b.to_be_bytes());
                }
            }
            Tag::String(s) => self.write_string(s)?,
            Tag::List(list) => {
                self.write_kind(list.kind);
                self.put_len(list.len())?;
                for item in &list.items {
                    self.write_payload(item)?;
                }
            }
            Tag::Compound(c) => self.write_compound(c)?,
            Tag::IntArray(v) => {
                self.put_len(v.len())?;
                for n in v {
                    self.put(&n.to_be_bytes());
                }
            }
            Tag::LongArray(v) => {
                self.put_len(v.len())?;
                for n in v {
                    self.put(&n.to_be_bytes());
                }
            }
        }
        Ok(())
    }
    fn write_compound(&mut self, c: &Compound) -> Result<()> {
        for (name, tag) in &c.0 {
            self.write_named(name, tag)?;
        }
        self.write_kind(Kind::End);
        Ok(())
    }
}
impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

/// A root compound with a name, as stored on disk.
pub fn named_root(name: &str, root: &Compound) -> Result<Vec<u8>> {
    let mut w = Writer::new();
    w.write_kind(Kind::Compound);
    w.write_string(name)?;
    w.write_compound(root)?;
    Ok(w.into_bytes())
}
/// A root compound without a name, as sent over the network.
pub fn network_root(root: &Compound) -> Result<Vec<u8>> {
    let mut w = Writer::new();
    w.write_kind(Kind::Compound);
    w.write_compound(root)?;
    Ok(w.into_bytes())
}

#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
    depth: usize,
}
impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0, depth: 0 }
    }
    pub fn offset(&self) -> usize {
        self.offset
    }
    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.offset..]
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.offset.checked_add(n).filter(|&end| end <= self.buf.len())
            .ok_or(NbtError::UnexpectedEnd(self.buf.len()))?;
        let bytes = &self.buf[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }
    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
    /// An `i32` count whose elements of `size` bytes must all fit in what is left.
    fn take_len(&mut self, size: usize) -> Result<usize> {
        let len = i32::from_be_bytes(self.take_array()?);
        let len = usize::try_from(len).map_err(|_| NbtError::NegativeLength(len))?;
        if len.saturating_mul(size) > self.buf.len() - self.offset {
            return Err(NbtError::UnexpectedEnd(self.buf.len()));
        }
        Ok(len)
    }

    pub fn read_kind(&mut self) -> Result<Kind> {
        Kind::try_from(self.take(1)?[0])
    }
    pub fn read_string(&mut self) -> Result<String> {
        let len = u16::from_be_bytes(self.take_array()?);
        let bytes = self.take(len as usize)?;
        core::str::from_utf8(bytes).map(str::to_owned).map_err(|_| NbtError::InvalidString)
    }
    pub fn read_payload(&mut self, kind: Kind) -> Result<Tag> {
        Ok(match kind {
            Kind::End => return Err(NbtError::UnknownTag(0)),
            Kind::Byte => Tag::Byte(i8::from_be_bytes(self.take_array()?)),
            Kind::Short => Tag::Short(i16::from_be_bytes(self.take_array()?)),
            Kind::Int => Tag::Int(i32::from_be_bytes(self.take_array()?)),
            Kind::Long => Tag::Long(i64::from_be_bytes(self.take_array()?)),
            Kind::Float => Tag::Float(f32::from_be_bytes(self.take_array()?)),
            Kind::Double => Tag::Double(f64::from_be_bytes(self.take_array()?)),
            Kind::ByteArray => {
                let len = self.take_len(1)?;
                Tag::ByteArray(self.take(len)?.iter().map(|&b| b as i8).collect())
            }
            Kind::String => Tag::String(self.read_string()?),
            Kind::List => {
                self.descend()?;
                let kind = self.read_kind()?;
                let len = self.take_len(0)?;
                let mut list = List::new();
                if kind == Kind::End && len > 0 {
                    return Err(NbtError::UnknownTag(0));
                }
                for _ in 0..len {
                    list.push(self.read_payload(kind)?)?;
                }
                self.depth -= 1;
                Tag::List(list)
            }
            Kind::Compound => Tag::Compound(self.read_compound()?),
            Kind::IntArray => {
                let len = self.take_len(4)?;
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(i32::from_be_bytes(self.take_array()?));
                }
                Tag::IntArray(v)
            }
            Kind::LongArray => {
                let len = self.take_len(8)?;
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(i64::from_be_bytes(self.take_array()?));
                }
                Tag::LongArray(v)
            }
        })
    }
    fn descend(&mut self) -> Result<()> {
        if self.depth >= MAX_DEPTH {
            return Err(NbtError::TooDeep);
        }
        self.depth += 1;
        Ok(())
    }
    fn read_compound(&mut self) -> Result<Compound> {
        self.descend()?;
        let mut c = Compound::new();
        loop {
            let kind = self.read_kind()?;
            if kind == Kind::End {
                break;
            }
            let name = self.read_string()?;
            let tag = self.read_payload(kind)?;
            c.0.push((name, tag));
        }
        self.depth -= 1;
        Ok(c)
    }
    fn expect_compound(&mut self) -> Result<()> {
        match self.read_kind()? {
            Kind::Compound => Ok(()),
            kind => Err(NbtError::UnknownTag(kind as u8)),
        }
    }

    pub fn read_named_root(&mut self) -> Result<(String, Compound)> {
        self.expect_compound()?;
        let name = self.read_string()?;
        Ok((name, self.read_compound()?))
    }
    pub fn read_network_root(&mut self) -> Result<Compound> {
        self.expect_compound()?;
        self.read_compound()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_fastnbt_for_a_simple_compound() {
        let ours = named_root("", &compound! { "name": "Notch" }).unwrap();
        let theirs = fastnbt::to_bytes(&fastnbt::nbt!({ "name": "Notch" })).unwrap();
        assert_eq!(ours, theirs);
        assert_eq!(ours, [
            0x0a, 0, 0,
            0x08, 0, 4, b'n', b'a', b'm', b'e', 0, 5, b'N', b'o', b't', b'c', b'h',
            0x00,
        ]);
    }

    #[test]
    fn reads_fastnbt_arrays() {
        let bytes = fastnbt::to_bytes(&fastnbt::nbt!({
            "heights": fastnbt::LongArray::new(vec![1, -2, i64::MAX])
        })).unwrap();
        let (name, root) = Reader::new(&bytes).read_named_root().unwrap();
        assert_eq!(name, "");
        assert_eq!(root.get("heights"), Some(&Tag::LongArray(vec![1, -2, i64::MAX])));
    }

    #[test]
    fn nested_values_survive() {
        let root = compound! {
            "flag": true,
            "scale": 1.0f64,
            "list": List::of([1i32, 2, 3]).unwrap(),
            "inner": compound! { "min_y": -64i32, "ints": Tag::IntArray(vec![7, 8]) },
            "empty": List::new(),
        };
        let bytes = network_root(&root).unwrap();
        assert_eq!(bytes[0], Kind::Compound as u8);
        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_network_root().unwrap(), root);
        assert!(r.remaining().is_empty());
    }

    #[test]
    fn lists_are_homogeneous() {
        let mut list = List::of([1i8]).unwrap();
        assert_eq!(list.push(Tag::Int(1)), Err(NbtError::MixedList { expected: Kind::Byte, found: Kind::Int }));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn writer_doubles_and_seeks() {
        let mut w = Writer::new();
        assert_eq!(w.capacity(), 1024);
        w.write_string(&"x".repeat(1500)).unwrap();
        assert_eq!(w.capacity(), 2048);
        assert_eq!(w.offset(), 1502);
        w.seek(0);
        w.write_kind(Kind::Int);
        assert_eq!(w.into_bytes().len(), 1502);

        let mut w = Writer::new();
        assert_eq!(w.write_string(&"y".repeat(70_000)), Err(NbtError::TooLong(70_000)));
    }

    #[test]
    fn malformed_input() {
        assert_eq!(Reader::new(&[0x0a, 0, 0, 0x08, 0, 4, b'n']).read_named_root(), Err(NbtError::UnexpectedEnd(7)));
        assert_eq!(Reader::new(&[0x0a, 0x0d]).read_network_root(), Err(NbtError::UnknownTag(0x0d)));
        assert_eq!(Reader::new(&[0x0a, 0x07, 0, 0, 0xff, 0xff, 0xff, 0xff]).read_network_root(),
                   Err(NbtError::NegativeLength(-1)));
        assert_eq!(Reader::new(&[0x0a, 0x08, 0, 2, 0xff, 0xfe]).read_network_root(),
                   Err(NbtError::InvalidString));
        assert_eq!(Reader::new(&[0x0a, 0x07, 0, 0, 0x7f, 0, 0, 0]).read_network_root(),
                   Err(NbtError::UnexpectedEnd(8)));
    }

    #[test]
    fn depth_is_bounded() {
        let mut bytes = vec![0x0a];
        for _ in 0..MAX_DEPTH + 1 {
            bytes.extend([0x0a, 0, 0]);
        }
        assert_eq!(Reader::new(&bytes).read_network_root(), Err(NbtError::TooDeep));
    }
}
