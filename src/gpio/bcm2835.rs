/* BCM2835/BCM2836/BCM2837 (Raspberry Pi 1-3) GPIO block, as exposed by /dev/gpiomem */

use crate::bus::{
	Delay,
	Line,
	PinDriver,
	SpinDelay,
};

use super::mapped::{
	self,
	Mapped,
};

pub const DEFAULT_GPIOMEM: &str = "/dev/gpiomem";

const BLOCK_SIZE: usize = 0x1000;
const PIN_COUNT: u8 = 54;

// register offsets
const GPFSEL0: usize = 0x00; // function select, 3 bits per pin, 10 pins per register
const GPCLR0: usize = 0x28; // output clear
const GPLEV0: usize = 0x34; // pin level
const GPPUD: usize = 0x94; // pull-up/down control
const GPPUDCLK0: usize = 0x98; // pull-up/down clock

const FSEL_INPUT: u32 = 0b000;
const FSEL_OUTPUT: u32 = 0b001;
const FSEL_MASK: u32 = 0b111;

// "wait 150 cycles" for the pull-up/down control signal to settle
const PUD_SETUP_US: u32 = 5;

/// Open-drain emulation on two GPIO pins.
///
/// The output latch of both pins stays low; pulling a line low switches the
/// pin to output, releasing it switches the pin back to input. The lines need
/// external pull-up resistors.
pub struct Bcm2835Pins {
	regs: Mapped,
	scl: u8,
	sda: u8,
}

impl Bcm2835Pins {
	/// Map the GPIO block and configure both pins (no internal pulls, output
	/// latch low, released).
	pub fn open(path: &str, scl: u8, sda: u8) -> crate::AResult<Self> {
		ensure!(scl < PIN_COUNT, "invalid SCL pin: {} (too big)", scl);
		ensure!(sda < PIN_COUNT, "invalid SDA pin: {} (too big)", sda);
		ensure!(scl != sda, "SCL and SDA need different pins (both {})", scl);

		let regs = with_context!(("couldn't map GPIO registers from {}", path),
			Ok(mapped::inner_open(path, BLOCK_SIZE)?)
		)?;

		let mut pins = Bcm2835Pins { regs, scl, sda };
		for &pin in &[scl, sda] {
			pins.set_function(pin, FSEL_INPUT);
			pins.disable_pull(pin);
			pins.regs.write_dword(GPCLR0 + bank_offset(pin), bank_bit(pin));
		}
		info!("GPIO: SCL on pin {}, SDA on pin {}", scl, sda);

		Ok(pins)
	}

	fn pin(&self, line: Line) -> u8 {
		match line {
			Line::Scl => self.scl,
			Line::Sda => self.sda,
		}
	}

	fn set_function(&mut self, pin: u8, function: u32) {
		let offset = GPFSEL0 + (pin as usize / 10) * 4;
		let shift = (pin as u32 % 10) * 3;
		let value = self.regs.read_dword(offset);
		self.regs.write_dword(offset, (value & !(FSEL_MASK << shift)) | (function << shift));
	}

	fn disable_pull(&mut self, pin: u8) {
		let mut delay = SpinDelay;
		self.regs.write_dword(GPPUD, 0); // off
		delay.delay_us(PUD_SETUP_US);
		self.regs.write_dword(GPPUDCLK0 + bank_offset(pin), bank_bit(pin));
		delay.delay_us(PUD_SETUP_US);
		self.regs.write_dword(GPPUD, 0);
		self.regs.write_dword(GPPUDCLK0 + bank_offset(pin), 0);
	}
}

fn bank_offset(pin: u8) -> usize {
	(pin as usize / 32) * 4
}

fn bank_bit(pin: u8) -> u32 {
	1u32 << (pin % 32)
}

impl PinDriver for Bcm2835Pins {
	fn set_line(&mut self, line: Line, released: bool) {
		let pin = self.pin(line);
		self.set_function(pin, if released { FSEL_INPUT } else { FSEL_OUTPUT });
	}

	fn read_line(&mut self, line: Line) -> bool {
		let pin = self.pin(line);
		0 != self.regs.read_dword(GPLEV0 + bank_offset(pin)) & bank_bit(pin)
	}
}

impl Drop for Bcm2835Pins {
	fn drop(&mut self) {
		// leave the bus released
		for &pin in &[self.scl, self.sda] {
			self.set_function(pin, FSEL_INPUT);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn register_bank_layout() {
		assert_eq!(bank_offset(2), 0);
		assert_eq!(bank_bit(2), 0b100);
		assert_eq!(bank_offset(33), 4);
		assert_eq!(bank_bit(33), 0b10);
	}

	#[test]
	fn rejects_bad_pins() {
		assert!(Bcm2835Pins::open("/nonexistent/gpiomem", 54, 3).is_err());
		assert!(Bcm2835Pins::open("/nonexistent/gpiomem", 3, 3).is_err());
		assert!(Bcm2835Pins::open("/nonexistent/gpiomem", 2, 3).is_err());
	}
}
