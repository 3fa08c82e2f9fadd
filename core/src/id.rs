/*!
Trace and span identifiers.

A [`TraceId`] is a 128-bit value formatted as 32 lowercase hex characters. A [`SpanId`] is a 64-bit value formatted as 16 lowercase hex characters. Neither can be zero.
*/

use core::{
    fmt,
    num::{NonZeroU128, NonZeroU64},
    str,
    str::FromStr,
};

use rand::Rng as _;

/**
A 128-bit trace identifier.
*/
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(NonZeroU128);

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(str::from_utf8(&self.to_hex()).map_err(|_| fmt::Error)?)
    }
}

impl FromStr for TraceId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TraceId::try_from_hex(s)
    }
}

impl TraceId {
    pub fn new(v: NonZeroU128) -> Self {
        TraceId(v)
    }

    pub fn from_u128(v: u128) -> Option<Self> {
        Some(TraceId(NonZeroU128::new(v)?))
    }

    /**
    Generate a new random trace id.
    */
    pub fn random() -> Self {
        loop {
            if let Some(id) = TraceId::from_u128(rand::thread_rng().gen()) {
                return id;
            }
        }
    }

    pub fn to_u128(&self) -> u128 {
        self.0.get()
    }

    pub fn to_hex(&self) -> [u8; 32] {
        let mut dst = [0; 32];
        let src: [u8; 16] = self.0.get().to_be_bytes();

        for (i, b) in src.into_iter().enumerate() {
            dst[i * 2] = HEX[(b >> 4) as usize];
            dst[i * 2 + 1] = HEX[(b & 0x0f) as usize];
        }

        dst
    }

    /**
    Parse a trace id from 32 hex characters.

    Trace ids are also commonly formatted as hyphenated UUIDs, so hyphens are ignored.
    */
    pub fn try_from_hex(hex: &str) -> Result<Self, ParseIdError> {
        TraceId::from_u128(parse_hex(hex, 32)?).ok_or(ParseIdError::Zero)
    }
}

/**
A 64-bit span identifier.
*/
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(NonZeroU64);

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(str::from_utf8(&self.to_hex()).map_err(|_| fmt::Error)?)
    }
}

impl FromStr for SpanId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SpanId::try_from_hex(s)
    }
}

impl SpanId {
    pub fn new(v: NonZeroU64) -> Self {
        SpanId(v)
    }

    pub fn from_u64(v: u64) -> Option<Self> {
        Some(SpanId(NonZeroU64::new(v)?))
    }

    /**
    Generate a new random span id.
    */
    pub fn random() -> Self {
        loop {
            if let Some(id) = SpanId::from_u64(rand::thread_rng().gen()) {
                return id;
            }
        }
    }

    pub fn to_u64(&self) -> u64 {
        self.0.get()
    }

    pub fn to_hex(&self) -> [u8; 16] {
        let mut dst = [0; 16];
        let src: [u8; 8] = self.0.get().to_be_bytes();

        for (i, b) in src.into_iter().enumerate() {
            dst[i * 2] = HEX[(b >> 4) as usize];
            dst[i * 2 + 1] = HEX[(b & 0x0f) as usize];
        }

        dst
    }

    pub fn try_from_hex(hex: &str) -> Result<Self, ParseIdError> {
        let v = parse_hex(hex, 16)?;

        // `parse_hex` never returns more than `digits * 4` bits
        SpanId::from_u64(v as u64).ok_or(ParseIdError::Zero)
    }
}

const HEX: [u8; 16] = [
    b'0', b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'a', b'b', b'c', b'd', b'e', b'f',
];

fn parse_hex(hex: &str, digits: usize) -> Result<u128, ParseIdError> {
    let mut v = 0u128;
    let mut seen = 0;

    for b in hex.bytes().filter(|b| *b != b'-') {
        if seen == digits {
            return Err(ParseIdError::Length);
        }

        let d = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => return Err(ParseIdError::Digit),
        };

        v = (v << 4) | d as u128;
        seen += 1;
    }

    if seen != digits {
        return Err(ParseIdError::Length);
    }

    Ok(v)
}

/**
An error attempting to parse a [`TraceId`] or [`SpanId`].
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseIdError {
    /**
    The input had the wrong number of hex digits.
    */
    Length,
    /**
    The input contained a non-hex character.
    */
    Digit,
    /**
    The input parsed to zero, which isn't a valid id.
    */
    Zero,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseIdError::Length => f.write_str("the id has the wrong number of hex digits"),
            ParseIdError::Digit => f.write_str("the id contains a non-hex character"),
            ParseIdError::Zero => f.write_str("the id is zero"),
        }
    }
}

impl std::error::Error for ParseIdError {}
