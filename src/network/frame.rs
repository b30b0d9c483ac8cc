use super::wire;

/// The largest payload a client may declare (a 3-byte length prefix).
pub const MAX_FRAME_LEN: usize = 2_097_151;

/// Where a frame stands after a byte has been pushed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Progress {
    Partial,
    Complete,
    /// The length prefix can never describe a frame: it's negative, too large, or runs
    /// past five bytes. Nothing after it can be framed either.
    Malformed,
}

/// Bytes received for the one packet currently in flight on a connection.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    data: Vec<u8>,
}
impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }
    /// Appends one byte and reports whether that finished (or broke) the frame.
    pub fn push(&mut self, byte: u8) -> Progress {
        self.data.push(byte);
        if self.is_complete() {
            Progress::Complete
        } else if self.is_malformed() {
            Progress::Malformed
        } else {
            Progress::Partial
        }
    }
    /// The declared payload length and the size of its prefix, once the prefix has arrived.
    pub fn expected_len(&self) -> Option<(usize, usize)> {
        let (declared, rem) = wire::varint(&self.data)?;
        Some((usize::try_from(declared).ok()?, self.data.len() - rem.len()))
    }
    pub fn is_complete(&self) -> bool {
        match self.expected_len() {
            Some((declared, prefix)) => declared <= MAX_FRAME_LEN && self.data.len() - prefix == declared,
            None => false,
        }
    }
    pub fn is_malformed(&self) -> bool {
        match wire::varint(&self.data) {
            Some((declared, _)) => usize::try_from(declared).map_or(true, |len| len > MAX_FRAME_LEN),
            None => self.data.len() >= 5,
        }
    }
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    /// Hands out the accumulated bytes and leaves a fresh, empty buffer behind.
    pub fn take(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.data)
    }
}
