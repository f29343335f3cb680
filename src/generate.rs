//! Sort routine generation.
//!
//! `Generator` drives classification, emission and finalization. The safe
//! entry points take borrowed slices; the raw ones take addresses and leave
//! the layout contract to the caller.

use log::debug;

use crate::classify::{BUCKET_COUNT, Layout, SizeFn, classify};
use crate::config::GenerateConfig;
use crate::error::{GenerateError, GenerateResult};
use crate::jit::ImageBuilder;
use crate::routine::{EntryPoint, SortRoutine};

/// Fixed-width element types whose every byte is initialized.
///
/// # Safety
/// Implementors must have no padding bytes.
pub unsafe trait PlainBytes: Copy {}

unsafe impl PlainBytes for u8 {}
unsafe impl PlainBytes for i8 {}
unsafe impl PlainBytes for u16 {}
unsafe impl PlainBytes for i16 {}
unsafe impl PlainBytes for u32 {}
unsafe impl PlainBytes for i32 {}
unsafe impl PlainBytes for u64 {}
unsafe impl PlainBytes for i64 {}
unsafe impl PlainBytes for usize {}
unsafe impl PlainBytes for isize {}
unsafe impl<const N: usize> PlainBytes for [u8; N] {}

/// Generates sort routines with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct Generator {
    config: GenerateConfig,
}

impl Generator {
    pub fn new(config: GenerateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GenerateConfig {
        &self.config
    }

    /// Generate a routine that sorts `items` by their byte key.
    pub fn sort_slice<'a, T: PlainBytes>(&self, items: &'a [T]) -> GenerateResult<SortRoutine<'a>> {
        // SAFETY: the slice is borrowed for 'a and every byte is initialized.
        unsafe {
            self.generate_raw(
                items.as_ptr() as *const u8,
                std::mem::size_of::<T>(),
                items.len(),
                None,
            )
        }
    }

    /// Generate a routine over `bytes` split into `element_size`-byte
    /// elements. A trailing partial element is ignored.
    pub fn sort_fixed<'a>(
        &self,
        bytes: &'a [u8],
        element_size: usize,
    ) -> GenerateResult<SortRoutine<'a>> {
        let count = bytes.len().checked_div(element_size).unwrap_or(0);
        // SAFETY: `count * element_size` never exceeds the borrowed slice.
        unsafe { self.generate_raw(bytes.as_ptr(), element_size, count, None) }
    }

    /// Generate a routine over variable-length records packed back to back
    /// in `bytes`. `sizing` sees the bytes from a record's start to the end
    /// of the slice and returns the record length, or zero to stop. A length
    /// running past the end of the slice also stops the walk. `limit` caps the
    /// number of records.
    pub fn sort_packed<'a, F>(
        &self,
        bytes: &'a [u8],
        limit: Option<usize>,
        sizing: F,
    ) -> GenerateResult<SortRoutine<'a>>
    where
        F: Fn(&[u8]) -> usize,
    {
        let base = bytes.as_ptr();
        let bounded = |addr: *const u8| {
            let offset = (addr as usize).wrapping_sub(base as usize);
            let Some(rest) = bytes.get(offset..) else {
                return 0;
            };
            if rest.is_empty() {
                return 0;
            }
            let len = sizing(rest);
            if len > rest.len() { 0 } else { len }
        };
        // SAFETY: `bounded` never reports a record that leaves the slice.
        unsafe { self.generate_raw(base, 0, limit.unwrap_or(0), Some(&bounded)) }
    }

    /// Generate a routine from raw generation arguments.
    ///
    /// # Safety
    /// `base` must address a sequence laid out as the arguments describe
    /// (see `Layout::resolve`), readable for every element the layout and
    /// `sizing` yield, and it must stay valid and unchanged for the returned
    /// routine's lifetime `'a`, which the caller chooses.
    pub unsafe fn generate_raw<'a>(
        &self,
        base: *const u8,
        element_size: usize,
        element_count: usize,
        sizing: Option<SizeFn<'_>>,
    ) -> GenerateResult<SortRoutine<'a>> {
        if base.is_null() {
            return Err(GenerateError::InvalidInput {
                reason: "null base address",
            });
        }
        let layout = Layout::resolve(element_size, element_count, sizing).ok_or(
            GenerateError::InvalidInput {
                reason: "need a non-zero element size and count, or a sizing function",
            },
        )?;
        ensure_supported_target()?;

        debug!("classifying {:?} sequence at {:p}", layout, base);
        let classification = unsafe { classify(base, layout, self.config.key_mode) };
        if classification.dropped() > 0 {
            debug!(
                "{} of {} elements have keys outside 0..{} and are left out",
                classification.dropped(),
                classification.elements().len(),
                BUCKET_COUNT
            );
        }

        let image = ImageBuilder::new(&self.config).build(&classification)?;
        Ok(SortRoutine::new(image, self.config.primitives.free_fn()))
    }
}

fn ensure_supported_target() -> GenerateResult<()> {
    if cfg!(target_arch = "x86_64") {
        Ok(())
    } else {
        Err(GenerateError::UnsupportedTarget {
            arch: std::env::consts::ARCH,
        })
    }
}

/// Generate a routine with the default configuration and leak its region.
///
/// Returns `None` for invalid input or when no code region can be mapped.
/// The output of each call must be released with `libc::free`.
///
/// # Safety
/// Same contract as `Generator::generate_raw`, with the source and the libc
/// primitives required to outlive every call of the returned entry point.
pub unsafe fn generate(
    base: *const u8,
    element_size: usize,
    element_count: usize,
    sizing: Option<SizeFn<'_>>,
) -> Option<EntryPoint> {
    let generator = Generator::default();
    match unsafe { generator.generate_raw(base, element_size, element_count, sizing) } {
        Ok(routine) => Some(routine.leak()),
        Err(e) => {
            debug!("generation failed: {}", e);
            None
        }
    }
}

/// Generate a routine for `items` with the default configuration.
pub fn sort_slice<T: PlainBytes>(items: &[T]) -> GenerateResult<SortRoutine<'_>> {
    Generator::default().sort_slice(items)
}
