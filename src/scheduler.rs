// Copyright 2021 Nir H. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
//! The master scheduler ("Gameboy"): the single driver of the CPU, Timer
//! and PPU clocks.
//!
//! `step()` is the only mutator of inter-component state; nothing else is
//! allowed to advance a peripheral's clock (see the crate's concurrency
//! notes). `run()`, available with the `std` feature, repeatedly calls
//! `step()` and optionally paces execution to the real hardware's
//! 1.048576 MHz master clock.

use crate::GameboyError;
use crate::config::Config;
use crate::cpu::Cpu;
use crate::bus::joypad::Controller;

#[cfg(feature = "std")]
use std::time::{Duration, Instant};

/// The real hardware's master clock frequency, in Hz.
#[cfg(feature = "std")]
const MASTER_CLOCK_HZ: f64 = 1_048_576.0;

/// Number of M-cycles between real-time pacing checks. Checking every tick
/// would dominate runtime in syscall overhead; batching amortizes it.
#[cfg(feature = "std")]
const PACING_BATCH_CYCLES: usize = 10_000;

/// Owns the cpu (which in turn owns the bus, and therefore the Timer and
/// PPU) and drives its clock one M-cycle at a time.
pub struct Gameboy<'a> {
	cpu: Cpu<'a>,
	#[cfg(feature = "std")]
	measured_hz: f64,
}

impl<'a> Gameboy<'a> {
	/// Initializes a new machine over the given ROM image.
	pub fn new(config: &'a Config, rom: &'a [u8]) -> Self {
		Gameboy {
			cpu: Cpu::new(config, rom),
			#[cfg(feature = "std")]
			measured_hz: 0.0,
		}
	}

	/// Immutable access to the underlying cpu, e.g. for an audit-port reader.
	pub fn cpu(&self) -> &Cpu<'a> {
		&self.cpu
	}

	/// Mutable access to the underlying cpu.
	pub fn cpu_mut(&mut self) -> &mut Cpu<'a> {
		&mut self.cpu
	}

	/// The display's current frame buffer, as 160x144 palette indices.
	pub fn frame_buffer(&self) -> &[u8] {
		self.cpu.frame_buffer()
	}

	/// Apply the given closure to the game controller.
	pub fn with_controller<F>(&mut self, closure: F)
		where F: FnOnce(&mut dyn Controller) -> () {
		self.cpu.with_controller(closure);
	}

	/// Advance every component by exactly one M-cycle, in the fixed order
	/// PPU (four dots), Timer, Joypad, CPU.
	pub fn step(&mut self) -> Result<(), GameboyError> {
		for _ in 0..4 {
			self.cpu.mmap.tick_ppu();
		}

		self.cpu.mmap.tick_timer();
		self.cpu.mmap.tick_joypad();

		self.cpu.tick()
	}

	/// Runs `step()` until `should_stop` returns true or a breakpoint is hit,
	/// pacing execution to the real hardware's master clock rate. Exits
	/// cleanly between M-cycles, never abandoning a mid-instruction wait.
	#[cfg(feature = "std")]
	pub fn run<F: Fn() -> bool>(&mut self, should_stop: F) -> Result<(), GameboyError> {
		let mut batch_cycles = 0usize;
		let mut batch_start = Instant::now();

		loop {
			if should_stop() {
				return Ok(());
			}

			#[cfg(feature = "alloc")]
			if self.cpu.take_breakpoint_hit() {
				log::debug!("scheduler stopped on breakpoint");
				return Ok(());
			}

			self.step()?;
			batch_cycles += 1;

			if batch_cycles >= PACING_BATCH_CYCLES {
				let target = Duration::from_secs_f64(batch_cycles as f64 / MASTER_CLOCK_HZ);
				let elapsed = batch_start.elapsed();

				if elapsed < target {
					spin_sleep::sleep(target - elapsed);
				}

				self.measured_hz = batch_cycles as f64 / batch_start.elapsed().as_secs_f64();

				batch_cycles = 0;
				batch_start = Instant::now();
			}
		}
	}

	/// The measured execution rate, in Hz, over the most recently completed
	/// pacing batch. Zero until the first batch completes.
	#[cfg(feature = "std")]
	pub fn measured_rate(&self) -> f64 {
		self.measured_hz
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::bus::cartridge;

	#[test]
	fn test_step_advances_ppu_line_with_timer_and_cpu() -> Result<(), GameboyError> {
		let config = Config::default();
		let rom = cartridge::tests::empty();
		let mut gb = Gameboy::new(&config, &rom[..]);

		// A full scanline is 456 dots; step() advances the PPU by 4 dots,
		// so 114 steps land us on the next line.
		for _ in 0..114 {
			gb.step()?;
		}

		Ok(())
	}
}
