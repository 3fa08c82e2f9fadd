/*!
The [`Buffer`] trait and the in-memory [`BatchBuffer`].

A buffer accumulates encoded items and produces a single batch document from them on demand:

```text
{"items":[e1,e2,...,en]}
```

With no items the document is exactly `{"items":[]}`.
*/

use satchel_core::encode;

use crate::Error;

/**
The batch document produced by a buffer with no items.
*/
pub const EMPTY_BATCH: &[u8] = b"{\"items\":[]}";

pub(crate) const BATCH_PREFIX: &[u8] = b"{\"items\":[";
pub(crate) const BATCH_SUFFIX: &[u8] = b"]}";
pub(crate) const BATCH_SEPARATOR: u8 = b',';

/**
A container of encoded items that can be serialized into a batch document.
*/
pub trait Buffer {
    /**
    Append an already encoded item.

    Returns `false` without changing the buffer if the item doesn't fit.
    */
    fn push(&mut self, encoded: &[u8]) -> bool;

    /**
    The number of buffered items.
    */
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /**
    The number of bytes the buffered items occupy inside the batch array, including separators.

    This excludes the fixed framing around the array.
    */
    fn size_bytes(&self) -> usize;

    /**
    Serialize the buffered items into a batch document.
    */
    fn batched_data(&self) -> Vec<u8>;

    /**
    Remove all buffered items.
    */
    fn clear(&mut self);
}

impl<'a, T: Buffer + ?Sized> Buffer for &'a mut T {
    fn push(&mut self, encoded: &[u8]) -> bool {
        (**self).push(encoded)
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn size_bytes(&self) -> usize {
        (**self).size_bytes()
    }

    fn batched_data(&self) -> Vec<u8> {
        (**self).batched_data()
    }

    fn clear(&mut self) {
        (**self).clear()
    }
}

impl<T: Buffer + ?Sized> Buffer for Box<T> {
    fn push(&mut self, encoded: &[u8]) -> bool {
        (**self).push(encoded)
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn size_bytes(&self) -> usize {
        (**self).size_bytes()
    }

    fn batched_data(&self) -> Vec<u8> {
        (**self).batched_data()
    }

    fn clear(&mut self) {
        (**self).clear()
    }
}

/**
A growable in-memory [`Buffer`].

Items are kept pre-joined as the body of the batch array, so producing the batch document is a single copy. The size of the buffer is tracked exactly: each item adds its encoded length, plus one separator byte for every item after the first.
*/
#[derive(Debug, Clone, Default)]
pub struct BatchBuffer {
    body: Vec<u8>,
    len: usize,
    max_size_bytes: Option<usize>,
}

impl BatchBuffer {
    /**
    Create an unbounded buffer.
    */
    pub fn new() -> Self {
        BatchBuffer {
            body: Vec::new(),
            len: 0,
            max_size_bytes: None,
        }
    }

    /**
    Create a buffer that rejects items once its [`Buffer::size_bytes`] would exceed `max_size_bytes`.
    */
    pub fn bounded(max_size_bytes: usize) -> Self {
        BatchBuffer {
            body: Vec::new(),
            len: 0,
            max_size_bytes: Some(max_size_bytes),
        }
    }

    /**
    Encode and append an item.

    If the item fails to encode, or doesn't fit, the buffer is left unchanged.
    */
    pub fn append(&mut self, item: &(impl sval::Value + ?Sized)) -> Result<(), Error> {
        let start = self.body.len();

        if self.len > 0 {
            self.body.push(BATCH_SEPARATOR);
        }

        if let Err(err) = encode::encode_to(&mut self.body, item) {
            self.body.truncate(start);

            return Err(Error::encode(err));
        }

        if !self.fits(self.body.len()) {
            let rejected = self.body.len() - start;
            self.body.truncate(start);

            return Err(Error::capacity(rejected));
        }

        self.len += 1;

        Ok(())
    }

    /**
    The number of buffered items.
    */
    pub fn items_count(&self) -> usize {
        self.len
    }

    fn fits(&self, size_bytes: usize) -> bool {
        self.max_size_bytes
            .map(|max| size_bytes <= max)
            .unwrap_or(true)
    }
}

impl Buffer for BatchBuffer {
    fn push(&mut self, encoded: &[u8]) -> bool {
        let separator = if self.len > 0 { 1 } else { 0 };

        if !self.fits(self.body.len() + separator + encoded.len()) {
            return false;
        }

        if separator > 0 {
            self.body.push(BATCH_SEPARATOR);
        }

        self.body.extend_from_slice(encoded);
        self.len += 1;

        true
    }

    fn len(&self) -> usize {
        self.len
    }

    fn size_bytes(&self) -> usize {
        self.body.len()
    }

    fn batched_data(&self) -> Vec<u8> {
        let mut batch =
            Vec::with_capacity(BATCH_PREFIX.len() + self.body.len() + BATCH_SUFFIX.len());

        batch.extend_from_slice(BATCH_PREFIX);
        batch.extend_from_slice(&self.body);
        batch.extend_from_slice(BATCH_SUFFIX);

        batch
    }

    fn clear(&mut self) {
        self.body.clear();
        self.len = 0;
    }
}
