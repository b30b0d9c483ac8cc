use super::wire::{self, Wire};

/// A cursor over one complete frame. The declared length and packet id are read up
/// front; every `get_*` consumes the next field, or returns `None` and consumes nothing.
#[derive(Debug, Clone, Copy)]
pub struct ParsedPacket<'a> {
    frame: &'a [u8],
    length: i32,
    id: i32,
    rest: &'a [u8],
}
impl<'a> ParsedPacket<'a> {
    pub fn parse(frame: &'a [u8]) -> Option<Self> {
        let (length, rest) = wire::varint(frame)?;
        let (id, rest) = wire::varint(rest)?;
        Some(Self { frame, length, id, rest })
    }
    pub fn length(&self) -> i32 {
        self.length
    }
    pub fn id(&self) -> i32 {
        self.id
    }
    pub fn frame(&self) -> &'a [u8] {
        self.frame
    }
    pub fn remaining(&self) -> &'a [u8] {
        self.rest
    }
    pub fn is_exhausted(&self) -> bool {
        self.rest.is_empty()
    }

    pub fn get<T: Wire<'a>>(&mut self) -> Option<T> {
        let (value, rest) = T::decode(self.rest)?;
        self.rest = rest;
        Some(value)
    }
    pub fn get_var_int(&mut self) -> Option<i32> {
        self.get::<wire::var<i32>>().map(|v| v.0)
    }
    pub fn get_string(&mut self) -> Option<String> {
        self.get()
    }
    pub fn get_boolean(&mut self) -> Option<bool> {
        self.get()
    }
    pub fn get_uuid(&mut self) -> Option<uuid::Uuid> {
        self.get()
    }
    pub fn get_ushort(&mut self) -> Option<u16> {
        self.get()
    }
    pub fn get_long(&mut self) -> Option<i64> {
        self.get()
    }
    pub fn get_ulong(&mut self) -> Option<u64> {
        self.get()
    }
}
