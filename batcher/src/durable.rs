/*!
A fixed-capacity [`Buffer`] that never allocates after construction.

The [`DurableBuffer`] is meant to survive an ungraceful process teardown: all of its storage is reserved up-front in two contiguous regions, one for item bytes and one for the `(offset, length)` slot of each item, plus two counters. Adding an item writes its bytes and slot in place before bumping the counters, so the buffered contents are always consistent between calls and can be read back from the regions alone.
*/

use crate::buffer::{Buffer, BATCH_PREFIX, BATCH_SEPARATOR, BATCH_SUFFIX};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
struct Slot {
    offset: usize,
    len: usize,
}

/**
A crash-durable buffer with a fixed byte and item capacity.
*/
#[derive(Debug)]
#[repr(C)]
pub struct DurableBuffer {
    item_count: usize,
    data_size: usize,
    data: Box<[u8]>,
    slots: Box<[Slot]>,
}

impl DurableBuffer {
    /**
    Reserve storage for up to `items_capacity` items totalling at most `data_capacity` bytes.
    */
    pub fn new(data_capacity: usize, items_capacity: usize) -> Self {
        DurableBuffer {
            item_count: 0,
            data_size: 0,
            data: vec![0; data_capacity].into_boxed_slice(),
            slots: vec![Slot::default(); items_capacity].into_boxed_slice(),
        }
    }

    /**
    Copy an item into the buffer.

    An empty item is ignored and reported as accepted. Returns `false` without changing anything if the item would exceed either capacity.
    */
    pub fn add_item(&mut self, item: &[u8]) -> bool {
        if item.is_empty() {
            return true;
        }

        if self.item_count >= self.slots.len() {
            return false;
        }

        let offset = self.data_size;
        let end = match offset.checked_add(item.len()) {
            Some(end) if end <= self.data.len() => end,
            _ => return false,
        };

        self.data[offset..end].copy_from_slice(item);
        self.slots[self.item_count] = Slot {
            offset,
            len: item.len(),
        };

        self.data_size = end;
        self.item_count += 1;

        true
    }

    /**
    Iterate over the buffered items in insertion order.
    */
    pub fn items(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.slots[..self.item_count]
            .iter()
            .map(move |slot| &self.data[slot.offset..slot.offset + slot.len])
    }

    /**
    Copy out the buffered items in insertion order.
    */
    pub fn get_all_items(&self) -> Vec<Vec<u8>> {
        self.items().map(|item| item.to_vec()).collect()
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    /**
    The total number of item bytes buffered, excluding separators.
    */
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    pub fn data_capacity(&self) -> usize {
        self.data.len()
    }

    pub fn items_capacity(&self) -> usize {
        self.slots.len()
    }

    /**
    Forget all buffered items.

    Storage is retained; only the counters are reset.
    */
    pub fn clear(&mut self) {
        self.item_count = 0;
        self.data_size = 0;
    }
}

impl Buffer for DurableBuffer {
    fn push(&mut self, encoded: &[u8]) -> bool {
        self.add_item(encoded)
    }

    fn len(&self) -> usize {
        self.item_count
    }

    fn size_bytes(&self) -> usize {
        self.data_size + self.item_count.saturating_sub(1)
    }

    fn batched_data(&self) -> Vec<u8> {
        let mut batch = Vec::with_capacity(
            BATCH_PREFIX.len() + self.size_bytes() + BATCH_SUFFIX.len(),
        );

        batch.extend_from_slice(BATCH_PREFIX);

        for (i, item) in self.items().enumerate() {
            if i > 0 {
                batch.push(BATCH_SEPARATOR);
            }

            batch.extend_from_slice(item);
        }

        batch.extend_from_slice(BATCH_SUFFIX);

        batch
    }

    fn clear(&mut self) {
        DurableBuffer::clear(self)
    }
}
