//! x86-64 instruction encoding for generated sort routines.
//!
//! Only the handful of instructions a copy-only routine needs: register
//! moves, immediates, stack frame management, indirect calls and one
//! forward conditional branch.
//! Uses System V AMD64 ABI conventions.

use super::codebuf::CodeBuffer;

/// x86-64 general-purpose registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Reg {
    // Caller-saved (scratch) registers
    Rax = 0,  // Return value
    Rcx = 1,  // 4th argument
    Rdx = 2,  // 3rd argument
    Rbx = 3,  // Callee-saved
    Rsp = 4,  // Stack pointer
    Rbp = 5,  // Frame pointer (callee-saved)
    Rsi = 6,  // 2nd argument
    Rdi = 7,  // 1st argument
    R8 = 8,   // 5th argument
    R9 = 9,   // 6th argument
    R10 = 10, // Caller-saved
    R11 = 11, // Caller-saved
    R12 = 12, // Callee-saved
    R13 = 13, // Callee-saved
    R14 = 14, // Callee-saved
    R15 = 15, // Callee-saved
}

impl Reg {
    /// Get the register code (lower 3 bits).
    pub fn code(self) -> u8 {
        (self as u8) & 0x7
    }

    /// Check if this register requires REX.B or REX.R extension.
    pub fn needs_rex_ext(self) -> bool {
        (self as u8) >= 8
    }

    /// Get the REX.B bit for this register (when used as base/rm).
    pub fn rex_b(self) -> u8 {
        if self.needs_rex_ext() { 0x01 } else { 0x00 }
    }

    /// Get the REX.R bit for this register (when used as reg).
    pub fn rex_r(self) -> u8 {
        if self.needs_rex_ext() { 0x04 } else { 0x00 }
    }
}

/// x86-64 assembler.
pub struct X86_64Assembler<'a> {
    buf: &'a mut CodeBuffer,
}

impl<'a> X86_64Assembler<'a> {
    pub fn new(buf: &'a mut CodeBuffer) -> Self {
        Self { buf }
    }

    // ==================== REX prefix helpers ====================

    /// Emit REX.W prefix for 64-bit operations.
    fn emit_rex_w(&mut self, reg: Reg, rm: Reg) {
        let rex = 0x48 | reg.rex_r() | rm.rex_b();
        self.buf.emit_u8(rex);
    }

    /// Emit REX.W prefix for single register operations.
    fn emit_rex_w_single(&mut self, rm: Reg) {
        let rex = 0x48 | rm.rex_b();
        self.buf.emit_u8(rex);
    }

    // ==================== ModR/M helpers ====================

    /// Encode ModR/M byte.
    /// mod: 2 bits, reg: 3 bits, rm: 3 bits
    fn modrm(mode: u8, reg: u8, rm: u8) -> u8 {
        ((mode & 0x3) << 6) | ((reg & 0x7) << 3) | (rm & 0x7)
    }

    // ==================== Data Movement ====================

    /// MOV r64, r64 (register to register)
    pub fn mov_rr(&mut self, dst: Reg, src: Reg) {
        self.emit_rex_w(src, dst);
        self.buf.emit_u8(0x89); // MOV r/m64, r64
        self.buf.emit_u8(Self::modrm(0b11, src.code(), dst.code()));
    }

    /// MOV r64, imm64 (move 64-bit immediate to register)
    pub fn mov_ri64(&mut self, dst: Reg, imm: u64) {
        self.emit_rex_w_single(dst);
        self.buf.emit_u8(0xB8 + dst.code()); // MOV r64, imm64
        self.buf.emit_u64(imm);
    }

    /// MOV r32, imm32 (zero-extends to 64-bit)
    pub fn mov_r32_i32(&mut self, dst: Reg, imm: u32) {
        if dst.needs_rex_ext() {
            self.buf.emit_u8(0x41); // REX.B
        }
        self.buf.emit_u8(0xB8 + dst.code()); // MOV r32, imm32
        self.buf.emit_u32(imm);
    }

    // ==================== Arithmetic Operations ====================

    /// ADD r64, r64
    pub fn add_rr(&mut self, dst: Reg, src: Reg) {
        self.emit_rex_w(src, dst);
        self.buf.emit_u8(0x01); // ADD r/m64, r64
        self.buf.emit_u8(Self::modrm(0b11, src.code(), dst.code()));
    }

    /// ADD r64, imm32 (sign-extended), using the imm8 form when it fits
    pub fn add_ri32(&mut self, dst: Reg, imm: i32) {
        self.emit_rex_w_single(dst);
        if (-128..=127).contains(&imm) {
            self.buf.emit_u8(0x83); // ADD r/m64, imm8
            self.buf.emit_u8(Self::modrm(0b11, 0, dst.code()));
            self.buf.emit_u8(imm as u8);
        } else {
            self.buf.emit_u8(0x81); // ADD r/m64, imm32
            self.buf.emit_u8(Self::modrm(0b11, 0, dst.code()));
            self.buf.emit_u32(imm as u32);
        }
    }

    /// SUB r64, imm32 (sign-extended), using the imm8 form when it fits
    pub fn sub_ri32(&mut self, dst: Reg, imm: i32) {
        self.emit_rex_w_single(dst);
        if (-128..=127).contains(&imm) {
            self.buf.emit_u8(0x83); // SUB r/m64, imm8
            self.buf.emit_u8(Self::modrm(0b11, 5, dst.code()));
            self.buf.emit_u8(imm as u8);
        } else {
            self.buf.emit_u8(0x81); // SUB r/m64, imm32
            self.buf.emit_u8(Self::modrm(0b11, 5, dst.code()));
            self.buf.emit_u32(imm as u32);
        }
    }

    /// TEST r64, r64 (bitwise AND, set flags, discard result)
    pub fn test_rr(&mut self, dst: Reg, src: Reg) {
        self.emit_rex_w(src, dst);
        self.buf.emit_u8(0x85); // TEST r/m64, r64
        self.buf.emit_u8(Self::modrm(0b11, src.code(), dst.code()));
    }

    // ==================== Stack Operations ====================

    /// PUSH r64
    pub fn push(&mut self, reg: Reg) {
        if reg.needs_rex_ext() {
            self.buf.emit_u8(0x41); // REX.B
        }
        self.buf.emit_u8(0x50 + reg.code());
    }

    /// POP r64
    pub fn pop(&mut self, reg: Reg) {
        if reg.needs_rex_ext() {
            self.buf.emit_u8(0x41); // REX.B
        }
        self.buf.emit_u8(0x58 + reg.code());
    }

    // ==================== Control Flow ====================

    /// CALL r64 (indirect call through register)
    pub fn call_r(&mut self, reg: Reg) {
        if reg.needs_rex_ext() {
            self.buf.emit_u8(0x41); // REX.B
        }
        self.buf.emit_u8(0xFF); // CALL r/m64
        self.buf.emit_u8(Self::modrm(0b11, 2, reg.code()));
    }

    /// JE rel32 (jump if equal/zero) to a label patched at finalization
    pub fn je_label(&mut self, label: &'static str) {
        self.buf.emit_u8(0x0F); // Two-byte opcode prefix
        self.buf.emit_u8(0x84); // JE rel32
        self.buf.emit_forward_ref(label);
    }

    /// Bind `label` to the next instruction.
    pub fn bind(&mut self, label: &'static str) {
        self.buf.define_label(label);
    }

    /// RET (return)
    pub fn ret(&mut self) {
        self.buf.emit_u8(0xC3);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mov_rr() {
        let mut buf = CodeBuffer::new();
        let mut asm = X86_64Assembler::new(&mut buf);
        asm.mov_rr(Reg::Rax, Reg::Rbx);

        // MOV RAX, RBX = 48 89 D8
        assert_eq!(buf.code(), &[0x48, 0x89, 0xD8]);
    }

    #[test]
    fn test_mov_rr_extended_source() {
        let mut buf = CodeBuffer::new();
        let mut asm = X86_64Assembler::new(&mut buf);
        asm.mov_rr(Reg::Rdi, Reg::R12);
        asm.mov_rr(Reg::Rax, Reg::R12);

        // MOV RDI, R12 = 4C 89 E7
        // MOV RAX, R12 = 4C 89 E0
        assert_eq!(buf.code(), &[0x4C, 0x89, 0xE7, 0x4C, 0x89, 0xE0]);
    }

    #[test]
    fn test_mov_rr_extended_dest() {
        let mut buf = CodeBuffer::new();
        let mut asm = X86_64Assembler::new(&mut buf);
        asm.mov_rr(Reg::R12, Reg::Rax);

        // MOV R12, RAX = 49 89 C4
        assert_eq!(buf.code(), &[0x49, 0x89, 0xC4]);
    }

    #[test]
    fn test_mov_ri64() {
        let mut buf = CodeBuffer::new();
        let mut asm = X86_64Assembler::new(&mut buf);
        asm.mov_ri64(Reg::Rax, 0x123456789ABCDEF0);

        // MOV RAX, imm64 = 48 B8 F0 DE BC 9A 78 56 34 12
        assert_eq!(
            buf.code(),
            &[0x48, 0xB8, 0xF0, 0xDE, 0xBC, 0x9A, 0x78, 0x56, 0x34, 0x12]
        );
    }

    #[test]
    fn test_mov_ri64_argument_registers() {
        let mut buf = CodeBuffer::new();
        let mut asm = X86_64Assembler::new(&mut buf);
        asm.mov_ri64(Reg::Rdi, 1);
        asm.mov_ri64(Reg::Rsi, 2);
        asm.mov_ri64(Reg::Rdx, 3);

        let code = buf.code();
        assert_eq!(&code[0..2], &[0x48, 0xBF]);
        assert_eq!(&code[10..12], &[0x48, 0xBE]);
        assert_eq!(&code[20..22], &[0x48, 0xBA]);
        assert_eq!(code.len(), 30);
    }

    #[test]
    fn test_mov_r32_i32_r13() {
        let mut buf = CodeBuffer::new();
        let mut asm = X86_64Assembler::new(&mut buf);
        asm.mov_r32_i32(Reg::R13, 0);

        // MOV R13D, 0 = 41 BD 00 00 00 00
        assert_eq!(buf.code(), &[0x41, 0xBD, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_ret() {
        let mut buf = CodeBuffer::new();
        let mut asm = X86_64Assembler::new(&mut buf);
        asm.ret();

        assert_eq!(buf.code(), &[0xC3]);
    }

    #[test]
    fn test_push_pop() {
        let mut buf = CodeBuffer::new();
        let mut asm = X86_64Assembler::new(&mut buf);
        asm.push(Reg::Rbx);
        asm.push(Reg::R12);
        asm.pop(Reg::R12);
        asm.pop(Reg::Rbx);

        // PUSH RBX = 53
        // PUSH R12 = 41 54
        // POP R12 = 41 5C
        // POP RBX = 5B
        assert_eq!(buf.code(), &[0x53, 0x41, 0x54, 0x41, 0x5C, 0x5B]);
    }

    #[test]
    fn test_add_rr() {
        let mut buf = CodeBuffer::new();
        let mut asm = X86_64Assembler::new(&mut buf);
        asm.add_rr(Reg::Rdi, Reg::Rax);

        // ADD RDI, RAX = 48 01 C7
        assert_eq!(buf.code(), &[0x48, 0x01, 0xC7]);
    }

    #[test]
    fn test_add_ri32_imm8() {
        let mut buf = CodeBuffer::new();
        let mut asm = X86_64Assembler::new(&mut buf);
        asm.add_ri32(Reg::Rdi, 16);

        // ADD RDI, 16 = 48 83 C7 10
        assert_eq!(buf.code(), &[0x48, 0x83, 0xC7, 0x10]);
    }

    #[test]
    fn test_add_ri32_imm32() {
        let mut buf = CodeBuffer::new();
        let mut asm = X86_64Assembler::new(&mut buf);
        asm.add_ri32(Reg::Rdi, 128);

        // ADD RDI, 128 = 48 81 C7 80 00 00 00
        assert_eq!(buf.code(), &[0x48, 0x81, 0xC7, 0x80, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_stack_adjust() {
        let mut buf = CodeBuffer::new();
        let mut asm = X86_64Assembler::new(&mut buf);
        asm.sub_ri32(Reg::Rsp, 8);
        asm.add_ri32(Reg::Rsp, 8);

        // SUB RSP, 8 = 48 83 EC 08
        // ADD RSP, 8 = 48 83 C4 08
        assert_eq!(
            buf.code(),
            &[0x48, 0x83, 0xEC, 0x08, 0x48, 0x83, 0xC4, 0x08]
        );
    }

    #[test]
    fn test_test_rr() {
        let mut buf = CodeBuffer::new();
        let mut asm = X86_64Assembler::new(&mut buf);
        asm.test_rr(Reg::Rax, Reg::Rax);

        // TEST RAX, RAX = 48 85 C0
        assert_eq!(buf.code(), &[0x48, 0x85, 0xC0]);
    }

    #[test]
    fn test_je_label_forward() {
        let mut buf = CodeBuffer::new();
        let mut asm = X86_64Assembler::new(&mut buf);
        asm.je_label("out");
        asm.ret();
        asm.bind("out");
        asm.ret();
        buf.patch_forward_refs().unwrap();

        // JE +1 = 0F 84 01 00 00 00
        assert_eq!(buf.code(), &[0x0F, 0x84, 0x01, 0x00, 0x00, 0x00, 0xC3, 0xC3]);
    }

    #[test]
    fn test_call_r() {
        let mut buf = CodeBuffer::new();
        let mut asm = X86_64Assembler::new(&mut buf);
        asm.call_r(Reg::Rax);

        // CALL RAX = FF D0
        assert_eq!(buf.code(), &[0xFF, 0xD0]);
    }

    #[test]
    fn test_call_r_r12() {
        let mut buf = CodeBuffer::new();
        let mut asm = X86_64Assembler::new(&mut buf);
        asm.call_r(Reg::R12);

        // CALL R12 = 41 FF D4
        assert_eq!(buf.code(), &[0x41, 0xFF, 0xD4]);
    }
}
