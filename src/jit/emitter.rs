//! Copy-call emission.
//!
//! `CopyEmitter` is the seam between the bucket walk and the instruction
//! encoding: the walk decides offsets, the emitter decides bytes.

use log::trace;

use super::codebuf::CodeBuffer;
use super::x86_64::{Reg, X86_64Assembler};
use crate::classify::Classification;

/// Encodes the three parts of a sort routine.
pub trait CopyEmitter {
    /// Save callee-saved registers, call `alloc(total_bytes)` and keep the
    /// returned base in a register that survives the copy calls.
    fn prologue(&mut self, total_bytes: u64, alloc_addr: u64);

    /// Copy `len` bytes from `src_addr` to `base + dest_offset` by calling
    /// the primitive at `copy_addr`.
    fn copy_group(&mut self, dest_offset: u64, src_addr: u64, len: u64, copy_addr: u64);

    /// Return the output base and restore the saved registers.
    fn epilogue(&mut self);
}

/// Summary of an emitted body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BodyStats {
    pub groups: usize,
    pub bytes_copied: u64,
}

/// Emit one copy group per bucketed element, ascending key then input order.
pub fn emit_body<E: CopyEmitter>(
    emitter: &mut E,
    classification: &Classification,
    copy_addr: u64,
) -> BodyStats {
    let mut dest = 0u64;
    let mut groups = 0usize;

    for element in classification.bucket_order() {
        trace!(
            "group {}: key={} len={} src={:p} dest+{}",
            groups, element.key, element.len, element.addr, dest
        );
        emitter.copy_group(dest, element.addr as usize as u64, element.len as u64, copy_addr);
        dest += element.len as u64;
        groups += 1;
    }

    BodyStats {
        groups,
        bytes_copied: dest,
    }
}

/// Label bound at the start of the epilogue.
const EPILOGUE_LABEL: &str = "epilogue";

/// System V x86-64 encoding.
///
/// Register use: r12 holds the output base for the whole routine, r13 is the
/// destination cursor (offsets are baked into each group), rdi/rsi/rdx/rax
/// are argument and call-target scratch. A null base from the allocation
/// primitive skips every copy group and is returned as is.
pub struct X86_64CopyEmitter<'a> {
    asm: X86_64Assembler<'a>,
}

impl<'a> X86_64CopyEmitter<'a> {
    /// Bytes emitted by `prologue`.
    pub const PROLOGUE_LEN: usize = 53;
    /// Bytes emitted by `epilogue`.
    pub const EPILOGUE_LEN: usize = 14;
    /// Upper bound on the bytes emitted by one `copy_group`.
    pub const MAX_GROUP_LEN: usize = 48;

    pub fn new(buf: &'a mut CodeBuffer) -> Self {
        Self {
            asm: X86_64Assembler::new(buf),
        }
    }

    /// Capacity hint for a routine with `groups` copy groups.
    pub fn estimate_len(groups: usize) -> usize {
        Self::PROLOGUE_LEN + groups * Self::MAX_GROUP_LEN + Self::EPILOGUE_LEN
    }
}

impl CopyEmitter for X86_64CopyEmitter<'_> {
    fn prologue(&mut self, total_bytes: u64, alloc_addr: u64) {
        let asm = &mut self.asm;
        asm.push(Reg::Rbp);
        asm.mov_rr(Reg::Rbp, Reg::Rsp);
        asm.push(Reg::Rbx);
        asm.push(Reg::R12);
        asm.push(Reg::R13);
        // Four pushes plus the return address leave rsp 8 bytes off a
        // 16-byte boundary at every call below.
        asm.sub_ri32(Reg::Rsp, 8);

        asm.mov_ri64(Reg::Rdi, total_bytes);
        asm.mov_ri64(Reg::Rax, alloc_addr);
        asm.call_r(Reg::Rax);
        asm.mov_rr(Reg::R12, Reg::Rax);
        asm.test_rr(Reg::Rax, Reg::Rax);
        asm.je_label(EPILOGUE_LABEL);

        asm.mov_r32_i32(Reg::R13, 0);
    }

    fn copy_group(&mut self, dest_offset: u64, src_addr: u64, len: u64, copy_addr: u64) {
        let asm = &mut self.asm;
        asm.mov_rr(Reg::Rdi, Reg::R12);
        if dest_offset != 0 {
            match i32::try_from(dest_offset) {
                Ok(imm) => asm.add_ri32(Reg::Rdi, imm),
                Err(_) => {
                    asm.mov_ri64(Reg::Rax, dest_offset);
                    asm.add_rr(Reg::Rdi, Reg::Rax);
                }
            }
        }
        asm.mov_ri64(Reg::Rsi, src_addr);
        asm.mov_ri64(Reg::Rdx, len);
        asm.mov_ri64(Reg::Rax, copy_addr);
        asm.call_r(Reg::Rax);
    }

    fn epilogue(&mut self) {
        let asm = &mut self.asm;
        asm.bind(EPILOGUE_LABEL);
        asm.add_ri32(Reg::Rsp, 8);
        asm.mov_rr(Reg::Rax, Reg::R12);
        asm.pop(Reg::R13);
        asm.pop(Reg::R12);
        asm.pop(Reg::Rbx);
        asm.pop(Reg::Rbp);
        asm.ret();
    }
}
