//! Encoders for the protocol's primitive types. Everything appends to a growing `Vec<u8>`.

use super::chat::Chat;
use super::wire::var;

pub trait ToWire {
    fn encode(&self, pkt: &mut Vec<u8>);
}
impl ToWire for () {
    fn encode(&self, _: &mut Vec<u8>) {}
}
impl<T: ToWire + ?Sized> ToWire for &'_ T {
    fn encode(&self, pkt: &mut Vec<u8>) {
        (**self).encode(pkt)
    }
}
/// Length-prefixed sequence.
impl<T: ToWire> ToWire for [T] {
    fn encode(&self, pkt: &mut Vec<u8>) {
        var(self.len()).encode(pkt);
        for v in self {
            v.encode(pkt);
        }
    }
}
impl<T: ToWire> ToWire for Vec<T> {
    fn encode(&self, pkt: &mut Vec<u8>) {
        self.as_slice().encode(pkt)
    }
}
impl<T: ToWire, const N: usize> ToWire for [T; N] {
    fn encode(&self, pkt: &mut Vec<u8>) {
        for v in self {
            v.encode(pkt);
        }
    }
}
impl ToWire for bool {
    fn encode(&self, pkt: &mut Vec<u8>) {
        (*self as u8).encode(pkt)
    }
}
impl ToWire for str {
    fn encode(&self, pkt: &mut Vec<u8>) {
        self.as_bytes().encode(pkt)
    }
}
impl ToWire for String {
    fn encode(&self, pkt: &mut Vec<u8>) {
        self.as_str().encode(pkt)
    }
}
impl ToWire for uuid::Uuid {
    fn encode(&self, pkt: &mut Vec<u8>) {
        pkt.extend_from_slice(self.as_bytes())
    }
}
impl ToWire for Chat {
    fn encode(&self, pkt: &mut Vec<u8>) {
        self.to_json().encode(pkt)
    }
}
impl<T: ToWire> ToWire for Option<T> {
    fn encode(&self, pkt: &mut Vec<u8>) {
        match self {
            None => false.encode(pkt),
            Some(v) => (true, v).encode(pkt),
        }
    }
}

const SEGMENT_BITS: u64 = 0b0111_1111;
const CONTINUE_BIT: u8 = 0b1000_0000;
fn encode_var(mut n: u64, pkt: &mut Vec<u8>) {
    while n & !SEGMENT_BITS != 0 {
        pkt.push(n as u8 & !CONTINUE_BIT | CONTINUE_BIT);
        n >>= 7;
    }
    pkt.push(n as u8);
}
impl var<u32> {
    pub fn byte_len(&self) -> usize {
        let mut i = 1;
        let mut n = self.0;
        while n & !(SEGMENT_BITS as u32) != 0 {
            i += 1;
            n >>= 7;
        }
        i
    }
}
impl ToWire for var<u32> {
    fn encode(&self, pkt: &mut Vec<u8>) {
        encode_var(self.0 as u64, pkt)
    }
}
impl ToWire for var<i32> {
    fn encode(&self, pkt: &mut Vec<u8>) {
        var(self.0 as u32).encode(pkt)
    }
}
impl ToWire for var<usize> {
    fn encode(&self, pkt: &mut Vec<u8>) {
        var(self.0 as u32).encode(pkt)
    }
}
impl ToWire for var<i64> {
    fn encode(&self, pkt: &mut Vec<u8>) {
        encode_var(self.0 as u64, pkt)
    }
}

macro_rules! impl_tuple {
    ($a:ident $b:ident) => {
        impl<$a: ToWire, $b: ToWire> ToWire for ($a, $b) {
            fn encode(&self, pkt: &mut Vec<u8>) {
                self.0.encode(pkt);
                self.1.encode(pkt);
            }
        }
    };
    ($i:ident $($t:tt)*) => {
        impl<$i: ToWire, $($t: ToWire),*> ToWire for ($i, $($t),*) {
            #[allow(non_snake_case)]
            fn encode(&self, pkt: &mut Vec<u8>) {
                let ($i, $($t),*) = self;
                $i.encode(pkt);
                $($t.encode(pkt);)*
            }
        }
        impl_tuple!($($t)*);
    }
}
impl_tuple!(A B C D E F G H);
macro_rules! impl_n {
    ($($t:ident)*) => {$(
        impl ToWire for $t {
            fn encode(&self, pkt: &mut Vec<u8>) {
                pkt.extend_from_slice(&self.to_be_bytes());
            }
        }
    )*};
}
impl_n!(u8 i8 u16 i16 u32 i32 i64 u64 f32 f64);

/// Bytes written as-is, without a length prefix.
#[derive(Debug, Clone, Copy)]
pub struct Raw<'a>(pub &'a [u8]);
impl ToWire for Raw<'_> {
    fn encode(&self, pkt: &mut Vec<u8>) {
        pkt.extend_from_slice(self.0)
    }
}

/// Wraps an encoded payload (`id ++ fields`) in its length prefix.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 5);
    var(payload.len()).encode(&mut out);
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(v: impl ToWire) -> Vec<u8> {
        let mut out = vec![];
        v.encode(&mut out);
        out
    }

    #[test]
    fn varints_are_minimal() {
        assert_eq!(bytes(var(0u32)), [0x00]);
        assert_eq!(bytes(var(127u32)), [0x7f]);
        assert_eq!(bytes(var(128u32)), [0x80, 0x01]);
        assert_eq!(bytes(var(25565i32)), [0xdd, 0xc7, 0x01]);
        assert_eq!(bytes(var(-1i32)), [0xff, 0xff, 0xff, 0xff, 0x0f]);
        assert_eq!(var(-1i32 as u32).byte_len(), 5);
        assert_eq!(var(300u32).byte_len(), 2);
    }

    #[test]
    fn strings_and_options() {
        assert_eq!(bytes("hi"), [2, b'h', b'i']);
        assert_eq!(bytes(None::<u8>), [0]);
        assert_eq!(bytes(Some(7u8)), [1, 7]);
        assert_eq!(bytes((1u16, true, -1i8)), [0, 1, 1, 0xff]);
    }

    #[test]
    fn frames_carry_their_length() {
        assert_eq!(frame(&[0x01, 0xaa]), [2, 0x01, 0xaa]);
        let big = vec![0u8; 200];
        let framed = frame(&big);
        assert_eq!(&framed[..2], &[0xc8, 0x01]);
        assert_eq!(framed.len(), 202);
    }

    #[test]
    fn chat_is_a_json_string() {
        let out = bytes(Chat::text("bye"));
        assert_eq!(super::super::wire::chat(&out).map(|c| c.0), Some(Chat::text("bye")));
    }
}
