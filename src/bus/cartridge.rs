// Copyright 2021 Nir H. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
//! The cartridge slot - a minimal ROM-only backing store for the address
//! ranges 0x0000-0x7FFF and 0xA000-0xBFFF.
//!
//! Bank-switching behavior (MBC1/2/3/5) is a collaborator's concern and is
//! deliberately not implemented here: any header byte is accepted and
//! treated as ROM-only, which is enough surface for the CPU/Bus/Timer/PPU
//! core this crate implements.

use crate::GameboyError;
use super::Memory;
use super::memory_range::*;

/// cartridge addresses-related constants.
#[allow(missing_docs)]
pub mod consts {
	use super::*;

	/// Game title.
	pub const ROM_GAME_TITLE: MemoryRange = make_range!(0x0134, 0x0142);

	/// Gameboy color indicator.
	/// 0x80 for GBC, otherwise not.
	pub const ROM_GAMEBOY_COLOR: usize = 0x0143;
	/// Cartridge type byte. Accepted but not interpreted - banking is a
	/// collaborator's concern.
	pub const ROM_CARTRIDGE_TYPE: usize = 0x0147;

	/// Size, in bytes, of the external (cartridge) RAM window.
	pub const EXTERNAL_RAM_SIZE: usize = 0x2000;
}

use consts::*;

/// The game's cartridge.
///
/// Owns the ROM image (0x0000-0x7FFF, read-only from the CPU's perspective)
/// and a flat external-RAM window (0xA000-0xBFFF). No bank switching: bank 0
/// is mirrored across both ROM halves if the image is smaller than 32KB.
pub struct Cartridge<'a> {
	rom: &'a [u8],
	ram: [u8; EXTERNAL_RAM_SIZE],
}

impl<'a> Cartridge<'a> {
	/// Initialize a new cartridge given its raw ROM data.
	pub fn new(rom: &'a [u8]) -> Self {
		Cartridge {
			rom,
			ram: [0_u8; EXTERNAL_RAM_SIZE],
		}
	}

	/// Get the title of the game, if the ROM is large enough to contain one.
	pub fn title(&self) -> &[u8] {
		if self.rom.len() > range_end!(ROM_GAME_TITLE) {
			&self.rom[memory_offset_range!(ROM_GAME_TITLE)]
		} else {
			&[]
		}
	}

	fn rom_byte(&self, address: u16) -> u8 {
		let offset = address as usize;
		if offset < self.rom.len() {
			self.rom[offset]
		} else {
			// Unbacked ROM addresses (e.g. a short test image) read as 0xFF,
			// matching an empty cartridge slot.
			0xFF
		}
	}
}

impl<'a> Memory for Cartridge<'a> {
	/// ROM is read-only; writes are silently ignored (real MBC hardware
	/// interprets these as bank-select writes, which is out of scope here).
	fn write(&mut self, address: u16, value: u8) -> Result<(), GameboyError> {
		match address {
			0x0000..=0x7FFF => Ok(()),
			0xA000..=0xBFFF => {
				self.ram[(address - 0xA000) as usize] = value;
				Ok(())
			}
			_ => Err(GameboyError::BadAddress(address)),
		}
	}

	fn read(&self, address: u16) -> Result<u8, GameboyError> {
		match address {
			0x0000..=0x7FFF => Ok(self.rom_byte(address)),
			0xA000..=0xBFFF => Ok(self.ram[(address - 0xA000) as usize]),
			_ => Err(GameboyError::BadAddress(address)),
		}
	}
}

#[cfg(test)]
pub mod tests {
	use super::*;

	const TEST_GAME_TITLE: &[u8] = b"TEST TITLE\0\0\0\0\0";

	/// Creates an empty rom for testing.
	pub fn empty() -> [u8; 0x8000] {
		let mut rom = [0_u8; 0x8000];
		rom[ROM_CARTRIDGE_TYPE] = 0;
		rom[memory_offset_range!(ROM_GAME_TITLE)].clone_from_slice(TEST_GAME_TITLE);
		rom
	}

	#[test]
	fn test_cartridge_loading() {
		let rom = empty();
		let cart = Cartridge::new(&rom);

		assert_eq!(TEST_GAME_TITLE, cart.title());
	}

	#[test]
	fn test_external_ram_rw() {
		let rom = empty();
		let mut cart = Cartridge::new(&rom);

		cart.write(0xA123, 0x42).unwrap();
		assert_eq!(0x42, cart.read(0xA123).unwrap());
	}
}
