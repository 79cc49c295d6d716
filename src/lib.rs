#![doc = r#"
Intel 8080 (KR580VM80A) core emulator library.

This crate exposes the CPU core: register file, ALU, and decoder/
dispatcher. It does not provide a memory backing store, display,
keyboard, tape, or CLI - those are the responsibility of a host that
implements the `Hal` trait.

Modules:
- hal: the host abstraction layer trait (`Hal`) a host must implement
- cpu: `Cpu8080`, the core facade, its register/flag state type, and
  `cpu::flags::Flags` for inspecting condition flags without peeling
  bits out of the packed status byte

In tests, a minimal flat-memory `Hal` implementation is available under
`crate::test_support`.
"#]

pub mod cpu;
pub mod hal;

pub use cpu::Cpu8080;
pub use hal::Hal;

// Shared test fixture (only compiled for tests)
#[cfg(test)]
mod test_support;
