//! Name-tagged state snapshots for save-states, rewind buffers and TAS tooling.
//!
//! Every stateful component implements [`Snapshot`] and declares its fields, in
//! a fixed order, through a [`Serializer`]. The same `transfer` routine both
//! saves and loads; the serializer decides the direction. Composite components
//! call [`Serializer::nested`] on their children, so a console's state is the
//! recursive union of its components' states without any global registry.
//!
//! Stream layout (all integers little-endian):
//!
//! ```text
//! header  "QZSS" version:u16
//! field   0x01 name_len:u8 name kind:u8 payload_len:u32 payload
//! begin   0x02 name_len:u8 name
//! end     0x03
//! ```
//!
//! Fields are matched by name in declaration order. A field appended to a
//! component after a stream was written loads as its type's default, because
//! the reader finds the end of that component's scope instead. A field that was
//! removed or reordered leaves an unexpected entry at the cursor and fails the
//! whole load.

mod value;

use thiserror::Error;

pub use quartz_macros::Snapshot;
pub use value::{SnapshotValue, ValueKind};

use value::ARRAY_FLAG;

const MAGIC: [u8; 4] = *b"QZSS";
const HEADER_LEN: usize = MAGIC.len() + 2;

/// Stream format version. Bumped only for layout changes, not for new fields.
pub const FORMAT_VERSION: u16 = 1;

const TAG_FIELD: u8 = 0x01;
const TAG_BEGIN: u8 = 0x02;
const TAG_END: u8 = 0x03;

/// A component whose mutable state can be saved and restored.
pub trait Snapshot {
    /// Write or read every persisted field, in a fixed order.
    fn transfer(&mut self, s: &mut Serializer<'_>) -> Result<(), SnapshotError>;
}

/// Why a state stream could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("not a save state (bad header)")]
    BadHeader,

    #[error("unsupported save state format version {0}")]
    UnsupportedVersion(u16),

    #[error("save state truncated at byte {0}")]
    Truncated(usize),

    #[error("corrupt entry at byte {0}")]
    Corrupt(usize),

    #[error("expected `{expected}`, found `{found}`")]
    FieldMismatch { expected: String, found: String },

    #[error("field `{field}` has kind {found:#04x}, expected {expected:#04x}")]
    TypeMismatch { field: String, expected: u8, found: u8 },

    #[error("field `{field}` holds {found} bytes, expected {expected}")]
    LengthMismatch {
        field: String,
        expected: usize,
        found: usize,
    },

    #[error("field `{field}` holds an invalid value")]
    InvalidValue { field: String },

    #[error("unconsumed entry `{0}` at end of state")]
    TrailingData(String),
}

/// Save a component into a fresh buffer.
pub fn save<S: Snapshot + ?Sized>(component: &mut S) -> Result<Vec<u8>, SnapshotError> {
    save_into(component, Vec::new())
}

/// Save a component, reusing `buffer`'s allocation (rewind/greenzone buffers).
pub fn save_into<S: Snapshot + ?Sized>(
    component: &mut S,
    buffer: Vec<u8>,
) -> Result<Vec<u8>, SnapshotError> {
    let mut s = Serializer::saving_into(buffer);
    component.transfer(&mut s)?;
    Ok(s.into_bytes())
}

/// Load a component from `data`. On error the component may be partially
/// updated; callers that need atomicity restore a backup (see the console).
pub fn load<S: Snapshot + ?Sized>(component: &mut S, data: &[u8]) -> Result<(), SnapshotError> {
    let mut s = Serializer::loading(data)?;
    component.transfer(&mut s)?;
    s.end()
}

enum Entry<'a> {
    Field {
        name: &'a str,
        kind: u8,
        payload: &'a [u8],
    },
    Begin {
        name: &'a str,
    },
    End,
    Eof,
}

impl Entry<'_> {
    fn describe(&self) -> String {
        match self {
            Entry::Field { name, .. } => (*name).to_string(),
            Entry::Begin { name } => format!("{name} {{"),
            Entry::End => "}".to_string(),
            Entry::Eof => "end of stream".to_string(),
        }
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Decode the entry at the cursor without consuming it. Returns the entry
    /// and the cursor position just past it.
    fn peek(&self) -> Result<(Entry<'a>, usize), SnapshotError> {
        let data = self.data;
        let Some(&tag) = data.get(self.pos) else {
            return Ok((Entry::Eof, self.pos));
        };
        let pos = self.pos + 1;
        match tag {
            TAG_END => Ok((Entry::End, pos)),
            TAG_BEGIN => {
                let (name, pos) = read_name(data, pos)?;
                Ok((Entry::Begin { name }, pos))
            }
            TAG_FIELD => {
                let (name, pos) = read_name(data, pos)?;
                let kind = *data.get(pos).ok_or(SnapshotError::Truncated(pos))?;
                let len_start = pos + 1;
                let len_bytes: [u8; 4] = data
                    .get(len_start..len_start + 4)
                    .and_then(|b| b.try_into().ok())
                    .ok_or(SnapshotError::Truncated(len_start))?;
                let len = u32::from_le_bytes(len_bytes) as usize;
                let start = len_start + 4;
                let end = start
                    .checked_add(len)
                    .ok_or(SnapshotError::Corrupt(self.pos))?;
                let payload = data.get(start..end).ok_or(SnapshotError::Truncated(start))?;
                Ok((
                    Entry::Field {
                        name,
                        kind,
                        payload,
                    },
                    end,
                ))
            }
            _ => Err(SnapshotError::Corrupt(self.pos)),
        }
    }
}

fn read_name(data: &[u8], pos: usize) -> Result<(&str, usize), SnapshotError> {
    let len = *data.get(pos).ok_or(SnapshotError::Truncated(pos))? as usize;
    let start = pos + 1;
    let bytes = data
        .get(start..start + len)
        .ok_or(SnapshotError::Truncated(start))?;
    let name = std::str::from_utf8(bytes).map_err(|_| SnapshotError::Corrupt(pos))?;
    Ok((name, start + len))
}

fn field_path(scopes: &[&'static str], name: &str) -> String {
    let mut path = String::new();
    for scope in scopes {
        path.push_str(scope);
        path.push('.');
    }
    path.push_str(name);
    path
}

enum Mode<'a> {
    Save(Vec<u8>),
    Load(Reader<'a>),
}

/// What the reader found where a field was expected.
enum Found<'a> {
    Field(u8, &'a [u8], usize),
    Missing,
}

/// Bidirectional state stream handed to [`Snapshot::transfer`].
pub struct Serializer<'a> {
    mode: Mode<'a>,
    scopes: Vec<&'static str>,
}

impl Serializer<'static> {
    /// A serializer that writes a new stream.
    pub fn saving() -> Self {
        Self::saving_into(Vec::new())
    }

    /// A serializer that writes into `buffer`, keeping its capacity.
    pub fn saving_into(mut buffer: Vec<u8>) -> Self {
        buffer.clear();
        buffer.extend_from_slice(&MAGIC);
        buffer.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        Self {
            mode: Mode::Save(buffer),
            scopes: Vec::new(),
        }
    }
}

impl<'a> Serializer<'a> {
    /// A serializer that reads `data`. Fails if the header is not a save state
    /// of this format version.
    pub fn loading(data: &'a [u8]) -> Result<Self, SnapshotError> {
        if data.len() < HEADER_LEN || data[..MAGIC.len()] != MAGIC {
            return Err(SnapshotError::BadHeader);
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(version));
        }
        Ok(Self {
            mode: Mode::Load(Reader {
                data,
                pos: HEADER_LEN,
            }),
            scopes: Vec::new(),
        })
    }

    pub fn is_saving(&self) -> bool {
        matches!(self.mode, Mode::Save(_))
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.mode, Mode::Load(_))
    }

    /// Finished stream bytes. Empty when loading.
    pub fn into_bytes(self) -> Vec<u8> {
        match self.mode {
            Mode::Save(out) => out,
            Mode::Load(_) => Vec::new(),
        }
    }

    /// Check that a load consumed the whole stream. No-op when saving.
    pub fn end(&self) -> Result<(), SnapshotError> {
        if let Mode::Load(reader) = &self.mode {
            let (entry, _) = reader.peek()?;
            if !matches!(entry, Entry::Eof) {
                return Err(SnapshotError::TrailingData(entry.describe()));
            }
        }
        Ok(())
    }

    /// Transfer one primitive field.
    pub fn value<T: SnapshotValue>(
        &mut self,
        name: &'static str,
        value: &mut T,
    ) -> Result<(), SnapshotError> {
        match &mut self.mode {
            Mode::Save(out) => {
                write_field_header(out, name, T::KIND.code(), T::SIZE);
                value.encode(out);
            }
            Mode::Load(_) => match self.locate(name)? {
                Found::Field(kind, payload, next) => {
                    self.check_kind(name, kind, T::KIND.code())?;
                    *value = T::decode(payload).ok_or_else(|| SnapshotError::InvalidValue {
                        field: field_path(&self.scopes, name),
                    })?;
                    self.advance(next);
                }
                Found::Missing => *value = T::default(),
            },
        }
        Ok(())
    }

    /// Transfer a fixed-length byte region (RAM, caches). The length is owned
    /// by the component; a stream holding a different length fails the load.
    pub fn bytes(&mut self, name: &'static str, data: &mut [u8]) -> Result<(), SnapshotError> {
        match &mut self.mode {
            Mode::Save(out) => {
                write_field_header(out, name, ValueKind::Bytes.code(), data.len());
                out.extend_from_slice(data);
            }
            Mode::Load(_) => match self.locate(name)? {
                Found::Field(kind, payload, next) => {
                    self.check_kind(name, kind, ValueKind::Bytes.code())?;
                    if payload.len() != data.len() {
                        return Err(SnapshotError::LengthMismatch {
                            field: field_path(&self.scopes, name),
                            expected: data.len(),
                            found: payload.len(),
                        });
                    }
                    data.copy_from_slice(payload);
                    self.advance(next);
                }
                Found::Missing => data.fill(0),
            },
        }
        Ok(())
    }

    /// Transfer a fixed-length array of primitive values (register files).
    pub fn array<T: SnapshotValue, const N: usize>(
        &mut self,
        name: &'static str,
        values: &mut [T; N],
    ) -> Result<(), SnapshotError> {
        let kind = ARRAY_FLAG | T::KIND.code();
        match &mut self.mode {
            Mode::Save(out) => {
                write_field_header(out, name, kind, N * T::SIZE);
                for v in values.iter() {
                    v.encode(out);
                }
            }
            Mode::Load(_) => match self.locate(name)? {
                Found::Field(found, payload, next) => {
                    self.check_kind(name, found, kind)?;
                    if payload.len() != N * T::SIZE {
                        return Err(SnapshotError::LengthMismatch {
                            field: field_path(&self.scopes, name),
                            expected: N * T::SIZE,
                            found: payload.len(),
                        });
                    }
                    for (slot, chunk) in values.iter_mut().zip(payload.chunks_exact(T::SIZE)) {
                        *slot = T::decode(chunk).ok_or_else(|| SnapshotError::InvalidValue {
                            field: field_path(&self.scopes, name),
                        })?;
                    }
                    self.advance(next);
                }
                Found::Missing => values.fill(T::default()),
            },
        }
        Ok(())
    }

    /// Transfer a named group of fields. A scope that is absent from an older
    /// stream runs `f` with every field defaulted.
    pub fn scope<F>(&mut self, name: &'static str, f: F) -> Result<(), SnapshotError>
    where
        F: FnOnce(&mut Self) -> Result<(), SnapshotError>,
    {
        if let Mode::Save(out) = &mut self.mode {
            out.push(TAG_BEGIN);
            write_name(out, name);
            self.scopes.push(name);
            f(self)?;
            self.scopes.pop();
            if let Mode::Save(out) = &mut self.mode {
                out.push(TAG_END);
            }
            return Ok(());
        }

        let (entry, next) = self.reader_peek()?;
        match entry {
            Entry::Begin { name: found } if found == name => {
                self.advance(next);
                self.scopes.push(name);
                f(self)?;
                let (entry, next) = self.reader_peek()?;
                if !matches!(entry, Entry::End) {
                    return Err(SnapshotError::FieldMismatch {
                        expected: format!("end of {}", field_path(&self.scopes, "")),
                        found: entry.describe(),
                    });
                }
                self.scopes.pop();
                self.advance(next);
                Ok(())
            }
            Entry::End => {
                self.scopes.push(name);
                f(self)?;
                self.scopes.pop();
                Ok(())
            }
            Entry::Eof if self.scopes.is_empty() => {
                self.scopes.push(name);
                f(self)?;
                self.scopes.pop();
                Ok(())
            }
            Entry::Eof => Err(SnapshotError::Truncated(self.reader_pos())),
            other => Err(SnapshotError::FieldMismatch {
                expected: format!("{} {{", field_path(&self.scopes, name)),
                found: other.describe(),
            }),
        }
    }

    /// Transfer a child component inside its own scope.
    pub fn nested<S: Snapshot + ?Sized>(
        &mut self,
        name: &'static str,
        child: &mut S,
    ) -> Result<(), SnapshotError> {
        self.scope(name, |s| child.transfer(s))
    }

    /// Error for a field whose loaded value is out of range for its type.
    pub fn invalid(&self, name: &str) -> SnapshotError {
        SnapshotError::InvalidValue {
            field: field_path(&self.scopes, name),
        }
    }

    fn reader_peek(&self) -> Result<(Entry<'a>, usize), SnapshotError> {
        match &self.mode {
            Mode::Load(reader) => reader.peek(),
            Mode::Save(_) => Ok((Entry::Eof, 0)),
        }
    }

    fn reader_pos(&self) -> usize {
        match &self.mode {
            Mode::Load(reader) => reader.pos,
            Mode::Save(out) => out.len(),
        }
    }

    fn advance(&mut self, next: usize) {
        if let Mode::Load(reader) = &mut self.mode {
            reader.pos = next;
        }
    }

    fn locate(&self, name: &str) -> Result<Found<'a>, SnapshotError> {
        let (entry, next) = self.reader_peek()?;
        match entry {
            Entry::Field {
                name: found,
                kind,
                payload,
            } if found == name => Ok(Found::Field(kind, payload, next)),
            Entry::End => Ok(Found::Missing),
            Entry::Eof if self.scopes.is_empty() => Ok(Found::Missing),
            Entry::Eof => Err(SnapshotError::Truncated(self.reader_pos())),
            other => Err(SnapshotError::FieldMismatch {
                expected: field_path(&self.scopes, name),
                found: other.describe(),
            }),
        }
    }

    fn check_kind(&self, name: &str, found: u8, expected: u8) -> Result<(), SnapshotError> {
        if found == expected {
            Ok(())
        } else {
            Err(SnapshotError::TypeMismatch {
                field: field_path(&self.scopes, name),
                expected,
                found,
            })
        }
    }
}

fn write_name(out: &mut Vec<u8>, name: &str) {
    debug_assert!(name.len() <= u8::MAX as usize, "field name too long: {name}");
    out.push(name.len() as u8);
    out.extend_from_slice(name.as_bytes());
}

fn write_field_header(out: &mut Vec<u8>, name: &str, kind: u8, len: usize) {
    out.push(TAG_FIELD);
    write_name(out, name);
    out.push(kind);
    out.extend_from_slice(&(len as u32).to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Debug, PartialEq)]
    struct Regs {
        a: u8,
        pc: u16,
        carry: bool,
    }

    impl Snapshot for Regs {
        fn transfer(&mut self, s: &mut Serializer<'_>) -> Result<(), SnapshotError> {
            s.value("a", &mut self.a)?;
            s.value("pc", &mut self.pc)?;
            s.value("carry", &mut self.carry)
        }
    }

    /// Same component after a field was appended.
    #[derive(Default, Debug, PartialEq)]
    struct RegsV2 {
        a: u8,
        pc: u16,
        carry: bool,
        cycles: u64,
    }

    impl Snapshot for RegsV2 {
        fn transfer(&mut self, s: &mut Serializer<'_>) -> Result<(), SnapshotError> {
            s.value("a", &mut self.a)?;
            s.value("pc", &mut self.pc)?;
            s.value("carry", &mut self.carry)?;
            s.value("cycles", &mut self.cycles)
        }
    }

    /// Same component with fields reordered.
    #[derive(Default)]
    struct RegsReordered {
        a: u8,
        pc: u16,
        carry: bool,
    }

    impl Snapshot for RegsReordered {
        fn transfer(&mut self, s: &mut Serializer<'_>) -> Result<(), SnapshotError> {
            s.value("pc", &mut self.pc)?;
            s.value("a", &mut self.a)?;
            s.value("carry", &mut self.carry)
        }
    }

    #[derive(Default)]
    struct Board {
        cpu: Regs,
        ram: [u8; 8],
        r: [u16; 4],
    }

    impl Snapshot for Board {
        fn transfer(&mut self, s: &mut Serializer<'_>) -> Result<(), SnapshotError> {
            s.nested("cpu", &mut self.cpu)?;
            s.bytes("ram", &mut self.ram)?;
            s.array("r", &mut self.r)
        }
    }

    fn sample() -> Regs {
        Regs {
            a: 0x42,
            pc: 0x8000,
            carry: true,
        }
    }

    #[test]
    fn round_trip_restores_every_field() {
        let mut board = Board {
            cpu: sample(),
            ram: [1, 2, 3, 4, 5, 6, 7, 8],
            r: [0x1111, 0x2222, 0x3333, 0x4444],
        };
        let bytes = save(&mut board).unwrap();

        let mut restored = Board::default();
        load(&mut restored, &bytes).unwrap();
        assert_eq!(restored.cpu, board.cpu);
        assert_eq!(restored.ram, board.ram);
        assert_eq!(restored.r, board.r);
    }

    #[test]
    fn identical_state_gives_identical_bytes() {
        let a = save(&mut sample()).unwrap();
        let b = save(&mut sample()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn saving_into_reuses_buffer() {
        let first = save(&mut sample()).unwrap();
        let capacity = first.capacity();
        let second = save_into(&mut sample(), first).unwrap();
        assert!(second.capacity() >= capacity);
        assert_eq!(second, save(&mut sample()).unwrap());
    }

    #[test]
    fn appended_field_defaults_when_loading_old_stream() {
        let old = save(&mut sample()).unwrap();
        let mut newer = RegsV2 {
            cycles: 999,
            ..Default::default()
        };
        load(&mut newer, &old).unwrap();
        assert_eq!(newer.a, 0x42);
        assert_eq!(newer.pc, 0x8000);
        assert!(newer.carry);
        assert_eq!(newer.cycles, 0);
    }

    #[test]
    fn appended_field_in_nested_scope_defaults() {
        #[derive(Default)]
        struct BoardV2 {
            cpu: RegsV2,
            ram: [u8; 8],
            r: [u16; 4],
        }
        impl Snapshot for BoardV2 {
            fn transfer(&mut self, s: &mut Serializer<'_>) -> Result<(), SnapshotError> {
                s.nested("cpu", &mut self.cpu)?;
                s.bytes("ram", &mut self.ram)?;
                s.array("r", &mut self.r)
            }
        }

        let mut board = Board {
            cpu: sample(),
            ram: [9; 8],
            r: [7; 4],
        };
        let bytes = save(&mut board).unwrap();
        let mut newer = BoardV2::default();
        load(&mut newer, &bytes).unwrap();
        assert_eq!(newer.cpu.pc, 0x8000);
        assert_eq!(newer.cpu.cycles, 0);
        assert_eq!(newer.ram, [9; 8]);
        assert_eq!(newer.r, [7; 4]);
    }

    #[test]
    fn removed_field_is_rejected() {
        let newer = save(&mut RegsV2::default()).unwrap();
        let err = load(&mut Regs::default(), &newer).unwrap_err();
        assert_eq!(err, SnapshotError::TrailingData("cycles".to_string()));
    }

    #[test]
    fn reordered_fields_are_rejected() {
        let bytes = save(&mut sample()).unwrap();
        let err = load(&mut RegsReordered::default(), &bytes).unwrap_err();
        assert!(matches!(err, SnapshotError::FieldMismatch { ref expected, .. } if expected == "pc"));
    }

    #[test]
    fn type_change_is_rejected() {
        struct Wide {
            a: u16,
        }
        impl Snapshot for Wide {
            fn transfer(&mut self, s: &mut Serializer<'_>) -> Result<(), SnapshotError> {
                s.value("a", &mut self.a)
            }
        }
        let bytes = save(&mut sample()).unwrap();
        let err = load(&mut Wide { a: 0 }, &bytes).unwrap_err();
        assert!(matches!(err, SnapshotError::TypeMismatch { .. }));
    }

    #[test]
    fn byte_region_length_must_match() {
        struct Small {
            ram: [u8; 4],
        }
        impl Snapshot for Small {
            fn transfer(&mut self, s: &mut Serializer<'_>) -> Result<(), SnapshotError> {
                s.nested("cpu", &mut Regs::default())?;
                s.bytes("ram", &mut self.ram)
            }
        }
        let bytes = save(&mut Board::default()).unwrap();
        let err = load(&mut Small { ram: [0; 4] }, &bytes).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::LengthMismatch {
                expected: 4,
                found: 8,
                ..
            }
        ));
    }

    #[test]
    fn header_is_checked() {
        assert_eq!(
            load(&mut Regs::default(), b"nope").unwrap_err(),
            SnapshotError::BadHeader
        );
        let mut bytes = save(&mut sample()).unwrap();
        bytes[4] = 0xFF;
        assert!(matches!(
            load(&mut Regs::default(), &bytes),
            Err(SnapshotError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let mut board = Board::default();
        let bytes = save(&mut board).unwrap();
        let cut = &bytes[..bytes.len() - 3];
        assert!(load(&mut Board::default(), cut).is_err());
    }

    #[test]
    fn invalid_bool_is_rejected() {
        let mut bytes = save(&mut sample()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] = 7;
        assert!(matches!(
            load(&mut Regs::default(), &bytes),
            Err(SnapshotError::InvalidValue { .. })
        ));
    }
}
