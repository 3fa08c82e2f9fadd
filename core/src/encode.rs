/*!
Encoding items into their JSON wire form.

Items implement [`sval::Value`] by hand and are streamed straight into a byte buffer with `sval_json`, without building an intermediate document.
*/

use std::fmt;

/**
An error encoding an item.
*/
pub struct EncodeError {
    reason: String,
}

impl EncodeError {
    fn new(reason: impl fmt::Display) -> Self {
        EncodeError {
            reason: reason.to_string(),
        }
    }
}

impl fmt::Debug for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodeError")
            .field("reason", &self.reason)
            .finish()
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to encode item: {}", self.reason)
    }
}

impl std::error::Error for EncodeError {}

/**
Encode a value as JSON.
*/
pub fn encode(value: &(impl sval::Value + ?Sized)) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    encode_to(&mut buf, value)?;

    Ok(buf)
}

/**
Encode a value as JSON onto the end of `buf`.

If encoding fails then `buf` is truncated back to its original length.
*/
pub fn encode_to(buf: &mut Vec<u8>, value: &(impl sval::Value + ?Sized)) -> Result<(), EncodeError> {
    let start = buf.len();

    match sval_json::stream_to_io_write(&mut *buf, value) {
        Ok(()) => Ok(()),
        Err(err) => {
            buf.truncate(start);

            Err(EncodeError::new(err))
        }
    }
}

// JSON has no representation for NaN or infinities
pub(crate) fn stream_f64<'sval, S: sval::Stream<'sval> + ?Sized>(
    stream: &mut S,
    value: f64,
) -> sval::Result {
    if !value.is_finite() {
        return Err(sval::Error::new());
    }

    stream.f64(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::attribute::Attribute;

    #[test]
    fn encode_to_truncates_on_failure() {
        let mut buf = b"prefix".to_vec();

        assert!(encode_to(&mut buf, &Attribute::Double(f64::NAN)).is_err());
        assert_eq!(b"prefix", &*buf);

        encode_to(&mut buf, &Attribute::Integer(1)).unwrap();
        assert_eq!(br#"prefix{"value":1,"type":"integer"}"#, &*buf);
    }
}
