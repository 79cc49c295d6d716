/*!
alu.rs - Arithmetic/logic kernel.

Overview
========
One function per architectural primitive. Each takes the operand(s) it
needs and mutates `CpuState` in place, matching the flag-affecting
contract documented per-operation below. Flag rules that would otherwise
be duplicated across ADD/ADC/SUB/SBB/CMP are factored through
`apply_add`/`apply_sub`, which is the inline-function replacement for the
reference implementation's shared macro body.
*/

use crate::cpu::state::CpuState;
use crate::cpu::tables::{add_half_carry, sub_half_carry};

#[inline]
fn apply_add(state: &mut CpuState, operand: u8, carry_in: u8, write_back: bool) {
    let a = state.a;
    let sum16 = a as u16 + operand as u16 + carry_in as u16;
    let result = sum16 as u8;
    state.carry = sum16 > 0xFF;
    state.half_carry = add_half_carry(a, operand, result);
    state.update_szp(result);
    if write_back {
        state.a = result;
    }
}

#[inline]
fn apply_sub(state: &mut CpuState, operand: u8, borrow_in: u8, write_back: bool) {
    let a = state.a;
    let diff16 = a as i32 - operand as i32 - borrow_in as i32;
    let result = diff16 as u8;
    state.carry = diff16 < 0;
    state.half_carry = sub_half_carry(a, operand, result);
    state.update_szp(result);
    if write_back {
        state.a = result;
    }
}

/// ADD: A <- A + operand. S,Z,P,H,C all updated.
#[inline]
pub(crate) fn add(state: &mut CpuState, operand: u8) {
    apply_add(state, operand, 0, true);
}

/// ADC: A <- A + operand + carry. S,Z,P,H,C all updated.
#[inline]
pub(crate) fn adc(state: &mut CpuState, operand: u8) {
    let carry_in = state.carry as u8;
    apply_add(state, operand, carry_in, true);
}

/// SUB: A <- A - operand. S,Z,P,H,C all updated.
#[inline]
pub(crate) fn sub(state: &mut CpuState, operand: u8) {
    apply_sub(state, operand, 0, true);
}

/// SBB: A <- A - operand - carry. S,Z,P,H,C all updated.
#[inline]
pub(crate) fn sbb(state: &mut CpuState, operand: u8) {
    let borrow_in = state.carry as u8;
    apply_sub(state, operand, borrow_in, true);
}

/// CMP: like SUB but A is not written back.
#[inline]
pub(crate) fn cmp(state: &mut CpuState, operand: u8) {
    apply_sub(state, operand, 0, false);
}

/// ANA: A <- A & operand. C cleared. H set per the documented 8080 quirk:
/// the OR of the two operands' bit 3, not simply forced to 1.
#[inline]
pub(crate) fn ana(state: &mut CpuState, operand: u8) {
    let pre = state.a | operand;
    let result = state.a & operand;
    state.half_carry = pre & 0x08 != 0;
    state.carry = false;
    state.update_szp(result);
    state.a = result;
}

/// ORA: A <- A | operand. H and C cleared.
#[inline]
pub(crate) fn ora(state: &mut CpuState, operand: u8) {
    let result = state.a | operand;
    state.half_carry = false;
    state.carry = false;
    state.update_szp(result);
    state.a = result;
}

/// XRA: A <- A ^ operand. H and C cleared.
#[inline]
pub(crate) fn xra(state: &mut CpuState, operand: u8) {
    let result = state.a ^ operand;
    state.half_carry = false;
    state.carry = false;
    state.update_szp(result);
    state.a = result;
}

/// INR: r <- r + 1. Carry is left unchanged (unlike ADD).
#[inline]
pub(crate) fn inr(state: &mut CpuState, value: u8) -> u8 {
    let result = value.wrapping_add(1);
    state.half_carry = result & 0x0F == 0x00;
    state.update_szp(result);
    result
}

/// DCR: r <- r - 1. Carry is left unchanged (unlike SUB).
#[inline]
pub(crate) fn dcr(state: &mut CpuState, value: u8) -> u8 {
    let result = value.wrapping_sub(1);
    state.half_carry = result & 0x0F != 0x0F;
    state.update_szp(result);
    result
}

/// DAD: HL <- HL + pair. Only carry is affected.
#[inline]
pub(crate) fn dad(state: &mut CpuState, pair: u16) {
    let hl = state.hl();
    let sum = hl as u32 + pair as u32;
    state.carry = sum > 0xFFFF;
    state.set_hl(sum as u16);
}

/// DAA: decimal-adjust the accumulator after a BCD addition.
///
/// Computes the correction and the resulting carry first, applies it
/// through the shared add path (which sets S,Z,H,P), then overwrites
/// carry with the value computed up front. This sequencing, including
/// the overwrite-after-add step, follows the reference decimal-adjust
/// routine exactly.
#[inline]
pub(crate) fn daa(state: &mut CpuState) {
    let mut correction: u8 = 0;
    let mut carry = state.carry;

    let lo = state.a & 0x0F;
    let hi = state.a >> 4;

    if state.half_carry || lo > 9 {
        correction |= 0x06;
    }
    if state.carry || hi > 9 || (hi >= 9 && lo > 9) {
        correction |= 0x60;
        carry = true;
    }

    apply_add(state, correction, 0, true);
    state.carry = carry;
}

/// RLC: rotate A left by 1; carry <- old bit 7; new bit 0 <- old bit 7.
#[inline]
pub(crate) fn rlc(state: &mut CpuState) {
    let carry_out = state.a & 0x80 != 0;
    state.a = state.a.rotate_left(1);
    state.carry = carry_out;
}

/// RRC: rotate A right by 1; carry <- old bit 0; new bit 7 <- old bit 0.
#[inline]
pub(crate) fn rrc(state: &mut CpuState) {
    let carry_out = state.a & 0x01 != 0;
    state.a = state.a.rotate_right(1);
    state.carry = carry_out;
}

/// RAL: rotate A left through carry (9-bit rotate).
#[inline]
pub(crate) fn ral(state: &mut CpuState) {
    let carry_out = state.a & 0x80 != 0;
    state.a = (state.a << 1) | (state.carry as u8);
    state.carry = carry_out;
}

/// RAR: rotate A right through carry (9-bit rotate).
#[inline]
pub(crate) fn rar(state: &mut CpuState) {
    let carry_out = state.a & 0x01 != 0;
    state.a = (state.a >> 1) | ((state.carry as u8) << 7);
    state.carry = carry_out;
}
