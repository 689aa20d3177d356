use std::ops::{
	Deref,
	DerefMut,
};

use super::{
	Address,
	Direction,
	Hardware,
	Line,
};

/// A transaction between START and STOP; STOP is sent when dropped.
pub struct Transaction<'a, H: ?Sized + LowLevel + 'a>(&'a mut H);

impl<'a, H: ?Sized + LowLevel> Transaction<'a, H> {
	/// send the address byte; returns whether the slave acknowledged it
	pub fn send_address(&mut self, address: Address, direction: Direction) -> bool {
		let nack = self.write_byte(address.with_direction(direction));
		trace!("address {} ({:?}): {}", address, direction, if nack { "NACK" } else { "ACK" });
		!nack
	}

	/// START without a preceding STOP, keeping the bus
	pub fn restart(&mut self) {
		self.0.repeated_start();
	}
}

impl<'a, H: ?Sized + LowLevel> Drop for Transaction<'a, H> {
	fn drop(&mut self) {
		self.0.stop();
	}
}

impl<'a, H: ?Sized + LowLevel> Deref for Transaction<'a, H> {
	type Target = H;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl<'a, H: ?Sized + LowLevel> DerefMut for Transaction<'a, H> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut self.0
	}
}

pub trait LowLevel: Hardware {
	// both lines released: pull SDA low, wait, pull SCL low
	fn start(&mut self) {
		let timing = self.timing();
		self.set_line(Line::Sda, false);
		self.delay_us(timing.start_us);
		self.set_line(Line::Scl, false);
	}

	// SCL low: release SDA while SCL is low, release SCL, then a regular START
	fn repeated_start(&mut self) {
		let timing = self.timing();
		self.set_line(Line::Sda, true);
		self.delay_us(timing.scl_low_us);
		self.set_line(Line::Scl, true);
		self.delay_us(timing.scl_high_us);
		self.start();
	}

	// SCL low: force SDA low, release SCL, then release SDA
	fn stop(&mut self) {
		let timing = self.timing();
		self.set_line(Line::Sda, false);
		self.delay_us(timing.scl_low_us);
		self.set_line(Line::Scl, true);
		self.delay_us(timing.stop_us);
		self.set_line(Line::Sda, true);
	}

	// one clock cycle: data is set up during the low phase and is valid
	// while SCL is high
	fn clock_bit(&mut self, bit: bool) {
		let timing = self.timing();
		self.set_line(Line::Sda, bit);
		self.delay_us(timing.scl_low_us);
		self.set_line(Line::Scl, true);
		self.delay_us(timing.scl_high_us);
		self.set_line(Line::Scl, false);
	}

	/// Shift out a byte (MSB first) and clock in the ACK bit; SCL must be low.
	///
	/// Returns the sampled ACK level: `false` = acknowledged, `true` = not
	/// acknowledged.
	fn write_byte(&mut self, data: u8) -> bool {
		let timing = self.timing();
		for bit in (0..8).rev() {
			self.clock_bit(0 != data & (1 << bit));
		}

		// let the slave drive the ACK bit
		self.set_line(Line::Sda, true);
		self.delay_us(timing.scl_low_us);
		self.set_line(Line::Scl, true);
		let nack = self.read_line(Line::Sda);
		self.delay_us(timing.scl_high_us);
		self.set_line(Line::Scl, false);

		trace!("wrote 0x{:02x}: {}", data, if nack { "NACK" } else { "ACK" });
		nack
	}

	/// Shift in a byte (MSB first) and send `nack` as the ACK bit; SCL must
	/// be low.
	///
	/// `false` acknowledges the byte, `true` signals the slave to stop
	/// transmitting.
	fn read_byte(&mut self, nack: bool) -> u8 {
		let timing = self.timing();
		let mut data = 0u8;

		// slave is transmitting
		self.set_line(Line::Sda, true);
		for _ in 0..8 {
			self.delay_us(timing.scl_low_us);
			self.set_line(Line::Scl, true);
			data <<= 1;
			if self.read_line(Line::Sda) {
				data |= 1;
			}
			self.delay_us(timing.scl_high_us);
			self.set_line(Line::Scl, false);
		}

		self.clock_bit(nack);

		trace!("read 0x{:02x}: sent {}", data, if nack { "NACK" } else { "ACK" });
		data
	}

	fn start_transaction(&mut self) -> Transaction<Self> {
		self.start();
		Transaction(self)
	}
}

impl<H: Hardware + ?Sized> LowLevel for H {
}
