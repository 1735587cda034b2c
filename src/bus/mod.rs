// Copyright 2021 Nir H. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
//! Emulate the gameboy's memory mapping and bus access.
//!
//! The Bus is the single owner of all addressable storage. It exposes that
//! storage through several differently-behaved "ports": the CPU's reads and
//! writes (this module's [`Memory`] impl for [`Bus`]) apply MMIO side
//! effects (DIV reset on write, boot-overlay disable, echo mirroring); the
//! audit port ([`Bus::audit_read`]/[`Bus::audit_write`]) is side-effect-free
//! and is meant for debuggers/monitors; and the scheduler drives Timer/PPU
//! directly via [`Bus::tick_timer`]/[`Bus::tick_ppu`], which mutate their
//! own register state without going through the CPU's write side effects.

#[macro_use]
pub mod memory_range;
pub mod cartridge;
pub mod joypad;
pub mod timer;
pub mod ram;
pub mod ppu;
pub mod io;

use io::*;
use ram::*;
use ppu::*;
use timer::*;
use joypad::*;
use joypad::Controller;
use cartridge::*;
use memory_range::*;
use timer::consts::MMAP_IO_TIMER;
use ppu::consts::MMAP_IO_DISPLAY;

use crate::GameboyError;
use crate::config::Config;
use crate::cpu::interrupts::*;

/// Bus locations-related constants.
#[allow(missing_docs)]
pub mod consts {
	use super::*;

	pub const MMAP_ROM_BANK0: MemoryRange = make_range!(0x0000, 0x3FFF);
	/// Switchable ROM bank.
	pub const MMAP_ROM_BANK_SW: MemoryRange = make_range!(0x4000, 0x7FFF);
	pub const MMAP_VIDEO_RAM: MemoryRange = make_range!(0x8000, 0x9FFF);
	/// Switchable RAM bank.
	pub const MMAP_RAM_BANK_SW: MemoryRange = make_range!(0xA000, 0xBFFF);
	pub const MMAP_RAM_INTERNAL: MemoryRange = make_range!(0xC000, 0xDFFF);
	/// Maps to the same physical memory as the internal ram.
	pub const MMAP_RAM_ECHO: MemoryRange = make_range!(0xE000, 0xFDFF);
	/// Sprite/Object attribute memory.
	pub const MMAP_SPRITE_OAM: MemoryRange = make_range!(0xFE00, 0xFE9F);
	/// Reads return 0xFF, writes are ignored.
	pub const MMAP_PROHIBITED: MemoryRange = make_range!(0xFEA0, 0xFEFF);
	pub const MMAP_IO_PORTS: MemoryRange = make_range!(0xFF00, 0xFF7F);
	/// High RAM.
	pub const MMAP_RAM_HIGH: MemoryRange = make_range!(0xFF80, 0xFFFE);

	/// Boot-ROM overlay, active over the bottom of bank 0 until disabled.
	pub const MMAP_BOOT_ROM: MemoryRange = make_range!(0x0000, 0x00FF);

	pub const REGISTER_DIV: u16 = 0xFF04;
	pub const REGISTER_BOOT: u16 = 0xFF50;
	pub const REGISTER_DMA: u16 = 0xFF46;
	pub const REGISTER_IF: u16 = 0xFF0F;
	pub const REGISTER_IE: u16 = 0xFFFF;

	/// Upper three bits of IF/IE always read back as 1.
	pub const INTERRUPT_MASK_UNUSED_BITS: u8 = 0xE0;
}

use consts::*;

/// A peripheral that can be written and read by the cpu.
pub trait Memory {
	/// Write a 8-bit value to the peripheral.
	///
	/// * `address` - The absolute memory address to write into.
	/// * `value` - The value to write.
	fn write(&mut self, address: u16, value: u8) -> Result<(), GameboyError>;

	/// Read a 8-bit value from this peripheral.
	///
	/// * `address` - The absolute memory address to read from.
	fn read(&self, address: u16) -> Result<u8, GameboyError>;
}

/// A virtual representation of Gameboy memory bus; the single owner of all
/// addressable storage.
pub struct Bus<'a> {
	cartridge: Cartridge<'a>,
	ppu: Ppu,
	io: IoPorts,
	timer: Timer,
	joypad: Joypad,
	ram: InternalRam,
	boot_rom: [u8; 256],

	/// The IF register. Only the low 5 bits are meaningful.
	interrupt_flag: InterruptMask,
	/// The IE register. Only the low 5 bits are meaningful.
	interrupt_enable: InterruptMask,
}

/// An abstraction for fetching mutable and immutable regions.
macro_rules! get_region {
	($name:tt $(,$mut_:tt)*) => {
		fn $name(&$($mut_)* self, address: u16) -> Result<&$($mut_)* dyn Memory, GameboyError> {
			match address {
				// Cartridge-mapped offsets
				memory_range!(MMAP_ROM_BANK0) |
				memory_range!(MMAP_ROM_BANK_SW) |
				memory_range!(MMAP_RAM_BANK_SW) => {
					Ok(&$($mut_)* self.cartridge)
				}

				// Internal RAM (echo mirroring is handled one level up, not here)
				memory_range!(MMAP_RAM_INTERNAL) |
				memory_range!(MMAP_RAM_ECHO) |
				memory_range!(MMAP_RAM_HIGH) => {
					Ok(&$($mut_)* self.ram)
				}

				// Timer
				memory_range!(MMAP_IO_TIMER) => {
					Ok(&$($mut_)* self.timer)
				}

				// Display
				memory_range!(MMAP_IO_DISPLAY) |
				memory_range!(MMAP_VIDEO_RAM) |
				memory_range!(MMAP_SPRITE_OAM) => {
					Ok(&$($mut_)* self.ppu)
				}

				// Joypad
				joypad::consts::IO_P1 => {
					Ok(&$($mut_)* self.joypad)
				}

				// Remaining I/O registers (serial, sound, boot latch)
				memory_range!(MMAP_IO_PORTS) => {
					Ok(&$($mut_)* self.io)
				}
				_ => {
					Err(GameboyError::BadAddress(address))
				}
			}
		}
	}
}

impl<'a> Bus<'a> {
	/// Initialize a new address space over the given ROM image.
	pub fn new(config: &Config, rom: &'a [u8]) -> Self {
		Bus {
			cartridge: Cartridge::new(rom),
			ppu: Ppu::new(),
			io: IoPorts::new(config),
			timer: Timer::new(config),
			joypad: Joypad::new(),
			ram: InternalRam::new(),
			boot_rom: [0; 256],
			interrupt_flag: 0,
			interrupt_enable: 0,
		}
	}

	/// Install a boot-ROM image to overlay 0x0000-0x00FF until disabled.
	pub fn load_boot_rom(&mut self, data: &[u8; 256]) {
		self.boot_rom.copy_from_slice(data);
	}

	/// Whether the boot-ROM overlay is still active over 0x0000-0x00FF.
	fn boot_rom_active(&self) -> bool {
		!self.io.boot_disabled()
	}

	// Get an immutable region
	get_region!(region);

	// Get a mutable region
	get_region!(region_mut, mut);

	/// Advance the timer by one M-cycle.
	pub fn tick_timer(&mut self) {
		self.timer.tick();
		self.interrupt_flag |= self.timer.interrupts();
		self.timer.clear();
	}

	/// Advance the ppu by one dot (call four times per M-cycle).
	pub fn tick_ppu(&mut self) {
		self.ppu.tick(self.interrupt_enable);
		self.interrupt_flag |= self.ppu.interrupts();
		self.ppu.clear();
	}

	/// Advance the joypad's edge-detection state by one M-cycle.
	pub fn tick_joypad(&mut self) {
		self.interrupt_flag |= self.joypad.interrupts();
		self.joypad.clear();
	}

	/// Apply a closure to the joypad controller (key up/down events).
	pub fn with_joypad<F>(&mut self, f: F)
		where F: FnOnce(&mut dyn Controller) -> () {
		f(&mut self.joypad);
	}

	/// The display's current frame buffer, as 160x144 palette indices.
	pub fn frame_buffer(&self) -> &[u8] {
		&self.ppu.frame_buffer()[..]
	}

	/// Returns a waiting interrupt and removes it from the IF register,
	/// without regard to IE - used by the CPU's interrupt-service logic,
	/// which applies the IE mask itself.
	pub fn fetch_interrupt(&mut self, mask: InterruptMask) -> Option<Interrupt> {
		let mut iter = InterruptIter::new(self.interrupt_flag & mask);
		let interrupt = iter.next();

		if let Some(ref i) = interrupt {
			self.interrupt_flag &= !i.value();
		}

		interrupt
	}

	/// The current IF register value (for polling, e.g. to wake a halted cpu).
	pub fn interrupt_flag(&self) -> InterruptMask {
		self.interrupt_flag
	}

	/// The current IE register value.
	pub fn interrupt_enable(&self) -> InterruptMask {
		self.interrupt_enable
	}

	fn do_dma_transfer(&mut self, value: u8) -> Result<(), GameboyError> {
		let source: u16 = (value as u16) << 8;

		for i in 0..0xa0u16 {
			let data = self.read(source + i)?;
			self.ppu.oam_mut()[i as usize] = data;
		}

		Ok(())
	}

	/// Pure, side-effect-free read used by debuggers/monitors (the audit
	/// port). Reads never alter state.
	pub fn audit_read(&self, address: u16) -> Result<u8, GameboyError> {
		match address {
			memory_range!(MMAP_BOOT_ROM) if self.boot_rom_active() => {
				Ok(self.boot_rom[address as usize])
			}
			memory_range!(MMAP_PROHIBITED) => Ok(0xFF),
			REGISTER_IF => Ok(self.interrupt_flag | INTERRUPT_MASK_UNUSED_BITS),
			REGISTER_IE => Ok(self.interrupt_enable | INTERRUPT_MASK_UNUSED_BITS),
			REGISTER_DMA => Ok(0),
			_ => self.region(address)?.read(address),
		}
	}

	/// Pure, side-effect-free write used by debuggers/monitors (the audit
	/// port): no DIV reset, no boot-overlay latch, no DMA trigger.
	pub fn audit_write(&mut self, address: u16, value: u8) -> Result<(), GameboyError> {
		match address {
			memory_range!(MMAP_BOOT_ROM) if self.boot_rom_active() => Ok(()),
			memory_range!(MMAP_PROHIBITED) => Ok(()),
			REGISTER_IF => {
				self.interrupt_flag = value & !INTERRUPT_MASK_UNUSED_BITS;
				Ok(())
			}
			REGISTER_IE => {
				self.interrupt_enable = value & !INTERRUPT_MASK_UNUSED_BITS;
				Ok(())
			}
			REGISTER_DMA => Ok(()),
			_ => self.region_mut(address)?.write(address, value),
		}
	}
}

/// CPU-port semantics: full side effects (DIV reset, boot-overlay disable,
/// echo mirroring, prohibited-region handling).
impl<'a> Memory for Bus<'a> {
	fn write(&mut self, address: u16, value: u8) -> Result<(), GameboyError> {
		match address {
			memory_range!(MMAP_PROHIBITED) => Ok(()),

			REGISTER_DIV => self.timer.write(REGISTER_DIV, value),

			REGISTER_BOOT => self.io.write(REGISTER_BOOT, value),

			REGISTER_DMA => self.do_dma_transfer(value),

			REGISTER_IF => {
				self.interrupt_flag = value & !INTERRUPT_MASK_UNUSED_BITS;
				Ok(())
			}

			REGISTER_IE => {
				self.interrupt_enable = value & !INTERRUPT_MASK_UNUSED_BITS;
				Ok(())
			}

			// Writes to ROM regions are silently ignored (handled by Cartridge).
			memory_range!(MMAP_ROM_BANK0) | memory_range!(MMAP_ROM_BANK_SW) => Ok(()),

			// Echo of work RAM: mirror into 0xC000-0xDDFF.
			memory_range!(MMAP_RAM_ECHO) => {
				let mirrored = address - (range_start!(MMAP_RAM_ECHO) as u16)
					+ (range_start!(MMAP_RAM_INTERNAL) as u16);
				self.ram.write(mirrored, value)
			}

			_ => self.region_mut(address)?.write(address, value),
		}
	}

	fn read(&self, address: u16) -> Result<u8, GameboyError> {
		match address {
			memory_range!(MMAP_BOOT_ROM) if self.boot_rom_active() => {
				Ok(self.boot_rom[address as usize])
			}

			memory_range!(MMAP_PROHIBITED) => Ok(0xFF),

			REGISTER_DMA => Ok(0),

			REGISTER_IF => Ok(self.interrupt_flag | INTERRUPT_MASK_UNUSED_BITS),

			REGISTER_IE => Ok(self.interrupt_enable | INTERRUPT_MASK_UNUSED_BITS),

			_ => self.region(address)?.read(address),
		}
	}
}

#[cfg(test)]
impl<'a> Bus<'a> {
	/// Writes the complete array's bytes to the relevant memory region.
	pub fn write_all(&mut self, address: u16, array: &[u8]) -> Result<(), GameboyError> {
		for (index, value) in array.iter().enumerate() {
			self.write(address + (index as u16), *value)?;
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use cartridge::tests::empty;

	fn bus(rom: &[u8]) -> Bus {
		Bus::new(&Config::default(), rom)
	}

	#[test]
	fn test_ram_echo_mirrors() {
		let rom = empty();
		let mut b = bus(&rom);

		b.write(0xC010, 0x42).unwrap();
		assert_eq!(0x42, b.read(0xE010).unwrap());

		b.write(0xE020, 0x11).unwrap();
		assert_eq!(0x11, b.read(0xC020).unwrap());
	}

	#[test]
	fn test_prohibited_region_reads_ff() {
		let rom = empty();
		let mut b = bus(&rom);

		b.write(0xFEA5, 0x99).unwrap();
		assert_eq!(0xFF, b.read(0xFEA5).unwrap());
	}

	#[test]
	fn test_div_write_resets_register() {
		let rom = empty();
		let mut b = bus(&rom);

		for _ in 0..(64 * 4) {
			b.tick_timer();
		}
		// Timer is disabled by default (TAC bit 2 clear), so DIV won't have
		// moved yet; enable it first via the CPU port.
		b.write(timer::consts::IO_TAC, 0x04).unwrap();
		for _ in 0..64 {
			b.tick_timer();
		}
		assert_eq!(1, b.read(timer::consts::IO_DIV).unwrap());

		b.write(REGISTER_DIV, 0xAB).unwrap();
		assert_eq!(0, b.read(timer::consts::IO_DIV).unwrap());
	}

	#[test]
	fn test_boot_overlay_disable() {
		let rom = empty();
		let mut b = bus(&rom);
		b.load_boot_rom(&[0xAA; 256]);

		assert_eq!(0xAA, b.read(0x0000).unwrap());

		b.write(REGISTER_BOOT, 0x01).unwrap();
		// Bank-0 cartridge ROM (all zero in the empty() fixture) now shows through.
		assert_eq!(0x00, b.read(0x0000).unwrap());
	}

	#[test]
	fn test_audit_port_has_no_side_effects() {
		let rom = empty();
		let mut b = bus(&rom);
		b.load_boot_rom(&[0xAA; 256]);

		// Audit writes to the boot overlay and prohibited region are no-ops.
		b.audit_write(REGISTER_BOOT, 0x01).unwrap();
		assert_eq!(0xAA, b.audit_read(0x0000).unwrap());
	}
}
