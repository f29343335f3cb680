//! Element classification.
//!
//! Walks the input sequence once, recording each valid element's address,
//! byte length and bucket key. Nothing here touches generated code.

use crate::config::KeyMode;

/// Number of buckets visited by the generated counting sort. Only elements
/// whose key is below this value end up in the output.
pub const BUCKET_COUNT: usize = 256;

/// Caller-supplied sizing function: byte length of the element at the given
/// address, or zero for "invalid or end of sequence".
pub type SizeFn<'f> = &'f dyn Fn(*const u8) -> usize;

/// How elements are laid out in memory.
#[derive(Clone, Copy)]
pub enum Layout<'f> {
    /// `count` elements of `size` bytes each.
    Fixed { size: usize, count: usize },
    /// `count` slots spaced `stride` bytes apart; each slot's length comes
    /// from the sizing function.
    Strided {
        stride: usize,
        count: usize,
        sizing: SizeFn<'f>,
    },
    /// Elements placed back to back, each starting where the previous one
    /// ended. `limit` caps the number of elements when set.
    Packed {
        limit: Option<usize>,
        sizing: SizeFn<'f>,
    },
}

impl<'f> Layout<'f> {
    /// Pick a layout from the raw generation arguments. Returns `None` when
    /// neither a usable size/count pair nor a sizing function is given.
    pub fn resolve(size: usize, count: usize, sizing: Option<SizeFn<'f>>) -> Option<Self> {
        let fixed_usable = size > 0 && count > 0;
        match sizing {
            None if fixed_usable => Some(Layout::Fixed { size, count }),
            None => None,
            Some(sizing) if fixed_usable => Some(Layout::Strided {
                stride: size,
                count,
                sizing,
            }),
            Some(sizing) => Some(Layout::Packed {
                limit: (count > 0).then_some(count),
                sizing,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Layout::Fixed { .. } => "fixed",
            Layout::Strided { .. } => "strided",
            Layout::Packed { .. } => "packed",
        }
    }
}

impl std::fmt::Debug for Layout<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layout::Fixed { size, count } => f
                .debug_struct("Fixed")
                .field("size", size)
                .field("count", count)
                .finish(),
            Layout::Strided { stride, count, .. } => f
                .debug_struct("Strided")
                .field("stride", stride)
                .field("count", count)
                .finish_non_exhaustive(),
            Layout::Packed { limit, .. } => f
                .debug_struct("Packed")
                .field("limit", limit)
                .finish_non_exhaustive(),
        }
    }
}

/// One valid element of the input sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element {
    pub addr: *const u8,
    pub len: usize,
    pub key: u64,
}

impl Element {
    /// Bucket index, or `None` when the key falls outside the bucket range.
    pub fn bucket(&self) -> Option<usize> {
        usize::try_from(self.key)
            .ok()
            .filter(|&key| key < BUCKET_COUNT)
    }
}

/// Result of classifying an input sequence.
#[derive(Debug, Default)]
pub struct Classification {
    elements: Vec<Element>,
    valid_bytes: usize,
    placed_bytes: usize,
    max_len: usize,
    dropped: usize,
}

impl Classification {
    /// Valid elements in input order, including those whose key is out of
    /// range.
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Sum of the lengths of all valid elements; this is the size of the
    /// output buffer.
    pub fn valid_bytes(&self) -> usize {
        self.valid_bytes
    }

    /// Sum of the lengths of the elements that land in a bucket; the output
    /// buffer is written up to here.
    pub fn placed_bytes(&self) -> usize {
        self.placed_bytes
    }

    /// Length of the longest valid element.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Number of valid elements whose key is outside the bucket range.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Elements in output order: ascending bucket, then input order.
    pub fn bucket_order(&self) -> Vec<&Element> {
        let mut buckets: Vec<Vec<&Element>> = vec![Vec::new(); BUCKET_COUNT];
        for element in &self.elements {
            if let Some(bucket) = element.bucket() {
                buckets[bucket].push(element);
            }
        }
        buckets.into_iter().flatten().collect()
    }

    fn push(&mut self, element: Element) {
        self.valid_bytes += element.len;
        if element.bucket().is_some() {
            self.placed_bytes += element.len;
        } else {
            self.dropped += 1;
        }
        self.max_len = self.max_len.max(element.len);
        self.elements.push(element);
    }
}

/// Derive the bucket key of the `len`-byte element at `addr`.
///
/// In `Integer` mode an element of up to 8 bytes yields the little-endian
/// integer of exactly its bytes; a longer element yields its first 8 bytes.
///
/// # Safety
/// `addr` must be readable for `min(len, 8)` bytes and `len` must be non-zero.
pub unsafe fn byte_key(addr: *const u8, len: usize, mode: KeyMode) -> u64 {
    match mode {
        KeyMode::Integer => {
            let mut bytes = [0u8; 8];
            let width = len.min(8);
            unsafe {
                std::ptr::copy_nonoverlapping(addr, bytes.as_mut_ptr(), width);
            }
            u64::from_le_bytes(bytes)
        }
        KeyMode::LeadingByte => unsafe { u64::from(*addr) },
    }
}

/// Classify every valid element of the sequence starting at `base`.
///
/// With a sizing function, classification stops at the first element it
/// reports as zero-length.
///
/// # Safety
/// `base` must point to a sequence laid out as `layout` describes, readable
/// for every element the layout and sizing function yield.
pub unsafe fn classify(base: *const u8, layout: Layout<'_>, mode: KeyMode) -> Classification {
    let mut out = Classification::default();

    let mut record = |addr: *const u8, len: usize| {
        let key = unsafe { byte_key(addr, len, mode) };
        out.push(Element { addr, len, key });
    };

    match layout {
        Layout::Fixed { size, count } => {
            for i in 0..count {
                record(base.wrapping_add(i * size), size);
            }
        }
        Layout::Strided {
            stride,
            count,
            sizing,
        } => {
            for i in 0..count {
                let addr = base.wrapping_add(i * stride);
                let len = sizing(addr);
                if len == 0 {
                    break;
                }
                record(addr, len);
            }
        }
        Layout::Packed { limit, sizing } => {
            let mut addr = base;
            let mut seen = 0usize;
            while limit.is_none_or(|limit| seen < limit) {
                let len = sizing(addr);
                if len == 0 {
                    break;
                }
                record(addr, len);
                addr = addr.wrapping_add(len);
                seen += 1;
            }
        }
    }

    out
}
