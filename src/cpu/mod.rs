// Copyright 2021 Nir H. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
//! Gameboy's processor emulation.

pub mod alu;
pub mod state;
pub mod decode;
pub mod interrupts;
pub mod instructions;

use num::PrimInt;
use core::mem::size_of;
use core::ops::{AddAssign, Shl};

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use state::*;
use state::registers::*;
use instructions::{Instruction, enter_interrupt};

use crate::GameboyError;
use crate::config::Config;
use crate::bus::joypad::Controller;

use crate::bus::Bus;
use crate::bus::cartridge::Cartridge;
use crate::cpu::interrupts::*;

/// The cpu's run state.
#[derive(Clone, Copy, PartialEq)]
pub enum Mode {
	/// Fetching and executing instructions normally.
	Running,
	/// Suspended by `HALT`. Resumes when any enabled interrupt becomes pending,
	/// regardless of IME.
	Halted,
	/// Suspended by `STOP`. Resumes only on a pending Joypad interrupt.
	Stopped,
}

/// The gameboy's processor.
///
/// This struct contains the complete emulator's state.
pub struct Cpu<'a> {
	/// The cpu's registers.
	registers: CpuState<'a>,
	/// The devices' memory mapping.
	pub mmap: Bus<'a>,
	/// The emulator's configuration.
	pub config: &'a Config,

	mode: Mode,
	/// Remaining M-cycles before the next fetch; decremented once per tick.
	wait: usize,
	/// The original hardware fetches the byte after a HALT twice if IME was
	/// clear and an interrupt was already pending when HALT executed.
	halt_bug: bool,
	/// Counts down the one-instruction delay between `EI`/`DI` and IME
	/// actually flipping. `None` when no toggle is pending.
	ime_delay: Option<u8>,

	#[cfg(feature = "alloc")]
	breakpoints: Vec<u16>,
	#[cfg(feature = "alloc")]
	breakpoint_hit: bool,
}

impl<'a> Cpu<'a> {
	/// Initializes a new virtual cpu over the given cartridge ROM image.
	#[inline(always)]
	pub fn new(config: &'a Config, rom: &'a [u8]) -> Self {
		Cpu {
			registers: CpuState::new(config),
			mmap: Bus::new(config, rom),
			config,
			mode: Mode::Running,
			wait: 0,
			halt_bug: false,
			ime_delay: None,
			#[cfg(feature = "alloc")]
			breakpoints: Vec::new(),
			#[cfg(feature = "alloc")]
			breakpoint_hit: false,
		}
	}

	/// Suspend the cpu as if `HALT` had just been executed.
	///
	/// `pending` is the caller's `IE & IF` snapshot at the moment `HALT`
	/// executed, used to detect the halt bug.
	pub fn halt(&mut self, pending: InterruptMask) {
		self.mode = Mode::Halted;

		if !self.registers.ime() && pending != 0 {
			self.halt_bug = true;
		}
	}

	/// Suspend the cpu as if `STOP` had just been executed.
	pub fn stop(&mut self) {
		self.mode = Mode::Stopped;
	}

	/// Arm the one-instruction-delayed IME enable used by `EI`.
	pub fn arm_ime_delay(&mut self) {
		self.ime_delay = Some(2);
	}

	/// Cancel a pending `EI` delay. Used by `DI`, which takes effect
	/// immediately and supersedes any armed toggle.
	pub fn cancel_ime_delay(&mut self) {
		self.ime_delay = None;
	}

	/// Register a breakpoint address.
	#[cfg(feature = "alloc")]
	pub fn add_breakpoint(&mut self, address: u16) {
		if !self.breakpoints.contains(&address) {
			self.breakpoints.push(address);
		}
	}

	/// Remove a previously registered breakpoint, if present.
	#[cfg(feature = "alloc")]
	pub fn remove_breakpoint(&mut self, address: u16) {
		self.breakpoints.retain(|&bp| bp != address);
	}

	/// The currently registered breakpoint addresses.
	#[cfg(feature = "alloc")]
	pub fn breakpoints(&self) -> &[u16] {
		&self.breakpoints
	}

	/// Whether the program counter landed on a breakpoint since the last
	/// time this was queried. Clears the flag on read.
	#[cfg(feature = "alloc")]
	pub fn take_breakpoint_hit(&mut self) -> bool {
		let hit = self.breakpoint_hit;
		self.breakpoint_hit = false;
		hit
	}

	/// Apply the given closure to the game controller.
	pub fn with_controller<F>(&mut self, closure: F)
		where F: FnOnce(&mut dyn Controller) -> () {
			self.mmap.with_joypad(closure);
	}

	/// Reads the next instruction bytes and increments the program counter appropriately.
	///
	/// The function works in little-endian, that is, when reading 2 bytes,
	/// the first byte will be the least-significant one.
	pub fn fetch<T: PrimInt + AddAssign + Shl<Output=T>>(&mut self) -> Result<T, GameboyError> {
		let mut result: T = num::cast(0).unwrap();

		for i in 0..size_of::<T>() {
			// Read the next byte.
			let pc: u16 = self.registers.get(Register::PC);
			let data: T = num::cast::<u8, T>(self.mmap.read(pc)?).unwrap();

			// We're using little-endianity.
			result += data << num::cast::<usize, T>(8 * i).unwrap();

			if self.halt_bug {
				// The halt bug prevents the program counter from being incremented once.
				self.halt_bug = false;
			} else {
				// Move the PC forward.
				self.registers.set(Register::PC, pc + 1);
			}
		}

		Ok(result)
	}

	/// The display's current frame buffer, as 160x144 palette indices.
	pub fn frame_buffer(&self) -> &[u8] {
		self.mmap.frame_buffer()
	}

	/// Advance the cpu by a single M-cycle.
	///
	/// Implements the fetch/decode/execute/interrupt-service protocol: a
	/// nonzero wait counter is simply decremented; otherwise a pending,
	/// enabled interrupt is serviced (waking a halted cpu even when IME is
	/// clear); otherwise, if running, one instruction is fetched and
	/// executed and the wait counter is set from its cycle cost.
	pub fn tick(&mut self) -> Result<(), GameboyError> {
		if self.wait > 0 {
			self.wait -= 1;
			return Ok(());
		}

		if self.service_interrupt()? {
			return Ok(());
		}

		if self.mode != Mode::Running {
			return Ok(());
		}

		let pc = self.registers.get(Register::PC);
		let opcode: u8 = self.fetch()?;

		let insn: Instruction = self.decode(opcode).map_err(|err| {
			log::warn!("undefined opcode 0x{:02x} at 0x{:04x}", opcode, pc);
			err
		})?;

		let cycles = insn(self)?;
		self.wait = (cycles / 4).saturating_sub(1);

		#[cfg(feature = "alloc")]
		{
			let new_pc = self.registers.get(Register::PC);
			if self.breakpoints.contains(&new_pc) {
				log::debug!("breakpoint hit at 0x{:04x}", new_pc);
				self.breakpoint_hit = true;
			}
		}

		self.tick_ime_delay();

		Ok(())
	}

	fn tick_ime_delay(&mut self) {
		if let Some(counter) = self.ime_delay {
			if counter <= 1 {
				self.registers.set_ime(true);
				self.ime_delay = None;
			} else {
				self.ime_delay = Some(counter - 1);
			}
		}
	}

	/// Wakes a halted/stopped cpu on a relevant pending interrupt, and
	/// services the highest-priority pending, IME-enabled interrupt if any.
	/// Returns whether an interrupt was serviced this tick.
	fn service_interrupt(&mut self) -> Result<bool, GameboyError> {
		let ie = self.mmap.interrupt_enable();
		let pending = ie & self.mmap.interrupt_flag();

		if self.mode == Mode::Halted && pending != 0 {
			self.mode = Mode::Running;
		}

		if self.mode == Mode::Stopped && (pending & Interrupt::Joypad.value()) != 0 {
			self.mode = Mode::Running;
		}

		if !self.registers.ime() || pending == 0 {
			return Ok(false);
		}

		if let Some(interrupt) = self.mmap.fetch_interrupt(ie) {
			log::trace!("servicing interrupt 0x{:04x}", interrupt.vector());

			let cycles = enter_interrupt(self, interrupt.vector())?;
			self.wait = (cycles / 4).saturating_sub(1);

			return Ok(true);
		}

		Ok(false)
	}
}

#[cfg(test)]
#[cfg(feature = "alloc")]
pub mod tests {
	use super::*;
	use crate::bus::cartridge;

	/// With-closure for running logic with an initialized cpu instance.
	pub fn with_cpu<F>(callback: F) -> Result<(), GameboyError>
		where F: FnOnce(&mut Cpu) -> Result<(), GameboyError> {
		let config = Config::default();
		let rom = cartridge::tests::empty();

		let mut cpu = Cpu::new(&config, &rom);

		callback(&mut cpu)
	}

	#[test]
	fn test_fetch() -> Result<(), GameboyError> {
		with_cpu(|cpu| {
			// Move the program counter to the RAM bank.
			cpu.registers.set(Register::PC, 0xA000);

			// Write arbitrary data to the memory starting from the program counter.
			let data: &[u8] = &[1, 2, 3];
			cpu.mmap.write_all(cpu.registers.get(Register::PC), data)?;

			// Make sure that fetch works as expected.
			assert!(cpu.fetch::<u16>()? == 0x0201);
			assert!(cpu.fetch::<u8>()? == 0x03);

			Ok(())
		})
	}

	#[test]
	fn test_ei_delay() -> Result<(), GameboyError> {
		with_cpu(|cpu| {
			assert!(!cpu.registers.ime());

			cpu.arm_ime_delay();
			cpu.tick_ime_delay();
			assert!(!cpu.registers.ime());

			cpu.tick_ime_delay();
			assert!(cpu.registers.ime());

			Ok(())
		})
	}

	#[test]
	fn test_di_cancels_pending_ei() -> Result<(), GameboyError> {
		with_cpu(|cpu| {
			cpu.arm_ime_delay();
			cpu.cancel_ime_delay();
			cpu.tick_ime_delay();
			cpu.tick_ime_delay();

			assert!(!cpu.registers.ime());

			Ok(())
		})
	}

	#[test]
	fn test_halt_bug_triggers_on_pending_interrupt_with_ime_clear() -> Result<(), GameboyError> {
		with_cpu(|cpu| {
			cpu.registers.set_ime(false);
			cpu.halt(Interrupt::Timer.value());

			assert!(cpu.halt_bug);
			assert!(cpu.mode == Mode::Halted);

			Ok(())
		})
	}
}
