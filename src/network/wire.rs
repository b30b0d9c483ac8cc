//! Decoders for the protocol's primitive types.
//!
//! Every decoder takes the remaining bytes of a packet and returns the value along with
//! whatever follows it. `None` means the bytes don't hold a complete, well-formed value.

use super::chat::Chat;

/// Marks a value that travels as a variable-length integer.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct var<T>(pub T);

pub trait Wire<'a>: Sized {
    fn decode(pkt: &'a [u8]) -> Option<(Self, &'a [u8])>;
}
macro_rules! impl_wire {
    {} => {};
    {$t:ident $($rt:ident)*} => {
        impl<'a, $t: Wire<'a>, $($rt: Wire<'a>),*> Wire<'a> for ($t,$($rt,)*) {
            #[allow(non_snake_case)]
            fn decode(pkt: &'a [u8]) -> Option<(Self, &'a [u8])> {
                let ($t, pkt) = $t::decode(pkt)?;
                $(let ($rt, pkt) = $rt::decode(pkt)?;)*
                Some((($t, $($rt,)*), pkt))
            }
        }
        impl_wire!($($rt)*);
    }
}
impl_wire!(A B C D E F);

impl Wire<'_> for var<i32> {
    fn decode(pkt: &[u8]) -> Option<(Self, &[u8])> {
        varint(pkt).map(|(n, rem)| (Self(n), rem))
    }
}
impl Wire<'_> for var<i64> {
    fn decode(pkt: &[u8]) -> Option<(Self, &[u8])> {
        varlong(pkt).map(|(n, rem)| (Self(n), rem))
    }
}
impl Wire<'_> for u8 {
    fn decode(pkt: &[u8]) -> Option<(Self, &[u8])> {
        byte(pkt)
    }
}
impl Wire<'_> for bool {
    fn decode(pkt: &[u8]) -> Option<(Self, &[u8])> {
        bool(pkt)
    }
}
impl<'a> Wire<'a> for &'a [u8] {
    fn decode(pkt: &'a [u8]) -> Option<(Self, &'a [u8])> {
        str(pkt)
    }
}
impl<'a> Wire<'a> for &'a str {
    fn decode(pkt: &'a [u8]) -> Option<(Self, &'a [u8])> {
        string(pkt)
    }
}
impl Wire<'_> for String {
    fn decode(pkt: &[u8]) -> Option<(Self, &[u8])> {
        string(pkt).map(|(s, rem)| (s.to_owned(), rem))
    }
}
impl Wire<'_> for uuid::Uuid {
    fn decode(pkt: &[u8]) -> Option<(Self, &[u8])> {
        uuid(pkt)
    }
}
impl Wire<'_> for Chat {
    fn decode(pkt: &[u8]) -> Option<(Self, &[u8])> {
        chat(pkt)
    }
}
impl<'a, T: Wire<'a>> Wire<'a> for Option<T> {
    fn decode(pkt: &'a [u8]) -> Option<(Self, &'a [u8])> {
        let (present, pkt) = bool(pkt)?;
        if present {
            let (value, pkt) = T::decode(pkt)?;
            Some((Some(value), pkt))
        } else {
            Some((None, pkt))
        }
    }
}

pub fn byte(buf: &[u8]) -> Option<(u8, &[u8])> {
    buf.split_first().map(|(&b, r)| (b, r))
}
pub fn bool(buf: &[u8]) -> Option<(bool, &[u8])> {
    byte(buf).map(|(b, r)| (b != 0, r))
}
macro_rules! be {
    { $($i:ident : $n:literal)* } => {
        $(
            pub fn $i(buf: &[u8]) -> Option<($i, &[u8])> {
                let (n, rem) = buf.split_first_chunk::<$n>()?;
                Some(($i::from_be_bytes(*n), rem))
            }
            impl Wire<'_> for $i {
                fn decode(pkt: &[u8]) -> Option<(Self, &[u8])> {
                    $i(pkt)
                }
            }
        )*
    }
}
be! { i8:1 u16:2 i16:2 u32:4 i32:4 i64:8 u64:8 f32:4 f64:8 }

const SEGMENT_BITS: u8 = 0b0111_1111;
const CONTINUE_BIT: u8 = 0b1000_0000;

/// At most 5 bytes; a fifth byte that still carries the continuation bit is malformed.
pub fn varint(buf: &[u8]) -> Option<(i32, &[u8])> {
    let mut n = 0u32;
    for i in 0..5 {
        let b = *buf.get(i)?;
        n |= ((b & SEGMENT_BITS) as u32) << (7 * i);
        if b & CONTINUE_BIT == 0 {
            return Some((n as i32, &buf[i + 1..]));
        }
    }
    None
}
pub fn varlong(buf: &[u8]) -> Option<(i64, &[u8])> {
    let mut n = 0u64;
    for i in 0..10 {
        let b = *buf.get(i)?;
        n |= ((b & SEGMENT_BITS) as u64) << (7 * i);
        if b & CONTINUE_BIT == 0 {
            return Some((n as i64, &buf[i + 1..]));
        }
    }
    None
}
/// Length-prefixed raw bytes.
pub fn str(buf: &[u8]) -> Option<(&[u8], &[u8])> {
    let (l, rem) = varint(buf)?;
    let l = usize::try_from(l).ok()?;
    (l <= rem.len()).then(|| rem.split_at(l))
}
pub fn string(buf: &[u8]) -> Option<(&str, &[u8])> {
    let (s, rem) = str(buf)?;
    Some((core::str::from_utf8(s).ok()?, rem))
}
pub fn uuid(buf: &[u8]) -> Option<(uuid::Uuid, &[u8])> {
    let (bytes, rem) = buf.split_first_chunk::<16>()?;
    Some((uuid::Uuid::from_bytes(*bytes), rem))
}
pub fn chat(buf: &[u8]) -> Option<(Chat, &[u8])> {
    let (s, rem) = string(buf)?;
    Some((Chat::from_json(s).ok()?, rem))
}
