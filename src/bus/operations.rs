use std::fmt;
use std::str;

use failure::Fail;

use super::{
	LowLevel,
	Transaction,
};

/// lowest address that isn't reserved
pub const ADDRESS_MIN: u8 = 0x03;
/// highest address that isn't reserved
pub const ADDRESS_MAX: u8 = 0x77;

/// 7-bit slave address (without the direction bit)
///
/// Transactions don't validate the address; only the scanner skips the
/// reserved ranges.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub u8);

impl Address {
	pub fn is_valid(&self) -> bool {
		ADDRESS_MIN <= self.0 && self.0 <= ADDRESS_MAX
	}

	/// the address byte as sent on the wire
	pub fn with_direction(&self, direction: Direction) -> u8 {
		(self.0 << 1) | direction.bit()
	}
}

impl fmt::Debug for Address {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "Address(0x{:02x})", self.0)
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "0x{:02x}", self.0)
	}
}

impl str::FromStr for Address {
	type Err = ::failure::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		// "0x50" or "50", always hex
		let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
		ensure!(!digits.is_empty() && digits.len() <= 2, "invalid I2C address: {:?}", s);

		let address = with_context!(("invalid I2C address: {}", s),
			Ok(u8::from_str_radix(digits, 16)?)
		)?;
		ensure!(address <= 0x7f, "invalid I2C address: {} (not a 7-bit address)", s);

		Ok(Address(address))
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Direction {
	Write,
	Read,
}

impl Direction {
	pub fn bit(self) -> u8 {
		match self {
			Direction::Write => 0,
			Direction::Read => 1,
		}
	}
}

/// How the master acknowledges the bytes of a read phase
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ReadAck {
	/// acknowledge every byte except the last one, which gets a NACK so the
	/// slave releases SDA before the STOP
	NackLast,
	/// acknowledge every byte, including the last one.
	///
	/// A slave continues transmitting after the last ACK; if the next bit is
	/// 0 it holds SDA low and the STOP never reaches the bus.
	AckAll,
}

impl ReadAck {
	/// ACK level to send after byte `index` of `count`
	pub fn nack(self, index: usize, count: usize) -> bool {
		match self {
			ReadAck::NackLast => index + 1 == count,
			ReadAck::AckAll => false,
		}
	}
}

impl Default for ReadAck {
	fn default() -> Self {
		ReadAck::NackLast
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
pub struct TransferOptions {
	pub read_ack: ReadAck,
	/// fail on the first byte that isn't acknowledged; otherwise NACKs are
	/// only logged and the transfer runs to the end
	pub strict: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Fail)]
pub enum Nack {
	#[fail(display = "address {} not acknowledged ({:?})", address, direction)]
	Address {
		address: Address,
		direction: Direction,
	},
	#[fail(display = "data byte {} to {} not acknowledged", index, address)]
	Data {
		address: Address,
		index: usize,
	},
}

fn send_bytes<H>(tx: &mut Transaction<H>, address: Address, data: &[u8], options: &TransferOptions) -> crate::AResult<()>
where
	H: ?Sized + LowLevel,
{
	if !tx.send_address(address, Direction::Write) {
		debug!("{}: address not acknowledged for write", address);
		if options.strict {
			return Err(Nack::Address { address, direction: Direction::Write }.into());
		}
	}

	for (index, byte) in data.iter().enumerate() {
		if tx.write_byte(*byte) {
			debug!("{}: data byte {} (0x{:02x}) not acknowledged", address, index, byte);
			if options.strict {
				return Err(Nack::Data { address, index }.into());
			}
		}
	}

	Ok(())
}

fn receive_bytes<H>(tx: &mut Transaction<H>, address: Address, target: &mut [u8], options: &TransferOptions) -> crate::AResult<()>
where
	H: ?Sized + LowLevel,
{
	if !tx.send_address(address, Direction::Read) {
		debug!("{}: address not acknowledged for read", address);
		if options.strict {
			return Err(Nack::Address { address, direction: Direction::Read }.into());
		}
	}

	let count = target.len();
	for (index, t) in target.iter_mut().enumerate() {
		*t = tx.read_byte(options.read_ack.nack(index, count));
	}

	Ok(())
}

pub trait BusOperations: LowLevel {
	/// START, address with write bit, STOP; true if the address was
	/// acknowledged
	fn device_ready(&mut self, address: Address) -> bool {
		let ready = {
			let mut tx = self.start_transaction();
			tx.send_address(address, Direction::Write)
		};
		debug!("{}: {}", address, if ready { "present" } else { "no response" });
		ready
	}

	fn write_read(&mut self, address: Address, write: Option<&[u8]>, read: Option<&mut [u8]>) -> crate::AResult<()> {
		self.write_read_with(address, write, read, &TransferOptions::default())
	}

	/// Write `write`, then read into `read`, each phase in its own
	/// START/STOP bracket.
	///
	/// Devices which lose their register pointer on STOP need
	/// `write_read_combined_with` instead.
	fn write_read_with(&mut self, address: Address, write: Option<&[u8]>, read: Option<&mut [u8]>, options: &TransferOptions) -> crate::AResult<()> {
		if let Some(data) = write.filter(|w| !w.is_empty()) {
			debug!("{}: write {} bytes", address, data.len());
			let mut tx = self.start_transaction();
			send_bytes(&mut tx, address, data, options)?;
		}

		if let Some(target) = read.filter(|r| !r.is_empty()) {
			debug!("{}: read {} bytes", address, target.len());
			let mut tx = self.start_transaction();
			receive_bytes(&mut tx, address, target, options)?;
		}

		Ok(())
	}

	fn write_read_combined(&mut self, address: Address, write: Option<&[u8]>, read: Option<&mut [u8]>) -> crate::AResult<()> {
		self.write_read_combined_with(address, write, read, &TransferOptions::default())
	}

	/// Write `write`, then read into `read` after a repeated START; a single
	/// STOP ends the transaction.
	fn write_read_combined_with(&mut self, address: Address, write: Option<&[u8]>, read: Option<&mut [u8]>, options: &TransferOptions) -> crate::AResult<()> {
		let write = write.filter(|w| !w.is_empty());
		let read = read.filter(|r| !r.is_empty());
		if write.is_none() && read.is_none() {
			return Ok(());
		}

		let mut tx = self.start_transaction();
		if let Some(data) = write {
			debug!("{}: write {} bytes", address, data.len());
			send_bytes(&mut tx, address, data, options)?;
		}
		if let Some(target) = read {
			if write.is_some() {
				tx.restart();
			}
			debug!("{}: read {} bytes", address, target.len());
			receive_bytes(&mut tx, address, target, options)?;
		}

		Ok(())
	}
}

impl<H: ?Sized + LowLevel> BusOperations for H {
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::bus::{
		Hardware,
		Line,
	};
	use crate::sim::{
		SimBus,
		SimDevice,
	};

	fn bus_with(devices: &[SimDevice]) -> SimBus {
		let mut bus = SimBus::new();
		for d in devices {
			bus.attach(d.clone());
		}
		bus
	}

	// bytes clocked onto the wire: SDA at the first 8 rising SCL edges after
	// each START
	fn first_byte_on_wire(bus: &SimBus) -> u8 {
		let rises: Vec<bool> = bus.trace().windows(2)
			.filter(|w| !w[0].scl && w[1].scl)
			.map(|w| w[1].sda)
			.collect();
		rises[..8].iter().fold(0u8, |acc, &b| (acc << 1) | b as u8)
	}

	#[test]
	fn parse_address() {
		assert_eq!("0x50".parse::<Address>().unwrap(), Address(0x50));
		assert_eq!("68".parse::<Address>().unwrap(), Address(0x68));
		assert_eq!("7f".parse::<Address>().unwrap(), Address(0x7f));
		assert!("0x80".parse::<Address>().is_err());
		assert!("0x".parse::<Address>().is_err());
		assert!("zz".parse::<Address>().is_err());
		assert!("123".parse::<Address>().is_err());
		assert_eq!("0X3c".parse::<Address>().unwrap(), Address(0x3c));
		// only a single prefix is stripped
		assert!("0x0x50".parse::<Address>().is_err());
		assert!("0X0x50".parse::<Address>().is_err());
	}

	#[test]
	fn address_byte_and_range() {
		assert_eq!(Address(0x50).with_direction(Direction::Write), 0xa0);
		assert_eq!(Address(0x50).with_direction(Direction::Read), 0xa1);
		assert!(!Address(0x02).is_valid());
		assert!(Address(0x03).is_valid());
		assert!(Address(0x77).is_valid());
		assert!(!Address(0x78).is_valid());
	}

	#[test]
	fn read_ack_policy() {
		assert!(!ReadAck::NackLast.nack(0, 3));
		assert!(!ReadAck::NackLast.nack(1, 3));
		assert!(ReadAck::NackLast.nack(2, 3));
		assert!((0..3).all(|i| !ReadAck::AckAll.nack(i, 3)));
	}

	#[test]
	fn device_ready_only_for_acknowledging_slaves() {
		let mut bus = bus_with(&[SimDevice::new(0x50), SimDevice::new(0x68)]);
		for a in ADDRESS_MIN..=ADDRESS_MAX {
			assert_eq!(bus.device_ready(Address(a)), a == 0x50 || a == 0x68, "address 0x{:02x}", a);
		}
		assert!(bus.read_line(Line::Scl) && bus.read_line(Line::Sda));
	}

	#[test]
	fn write_stores_registers() {
		let mut bus = bus_with(&[SimDevice::new(0x50)]);
		bus.write_read(Address(0x50), Some(&[0x10u8, 0xaa, 0xbb][..]), None).unwrap();
		let device = bus.device(0x50).unwrap();
		assert_eq!(&device.registers()[0x10..0x12], &[0xaa, 0xbb]);
		assert_eq!(device.pointer(), 0x12);
		assert_eq!(bus.start_count(), 1);
		assert_eq!(bus.stop_count(), 1);
	}

	#[test]
	fn written_value_reads_back() {
		let mut bus = bus_with(&[SimDevice::new(0x68)]);
		for &value in &[0x00u8, 0x5a, 0xb2, 0xff] {
			bus.write_read(Address(0x68), Some(&[0x20u8, value][..]), None).unwrap();
			let mut buf = [0u8; 1];
			bus.write_read(Address(0x68), Some(&[0x20u8][..]), Some(&mut buf[..])).unwrap();
			assert_eq!(buf[0], value);
		}
	}

	#[test]
	fn multi_byte_read_in_order() {
		let mut bus = bus_with(&[SimDevice::new(0x50).with_registers(0x00, &[1, 2, 3, 4])]);
		let mut buf = [0u8; 4];
		bus.write_read(Address(0x50), Some(&[0x00u8][..]), Some(&mut buf[..])).unwrap();
		assert_eq!(buf, [1, 2, 3, 4]);
		assert!(bus.read_line(Line::Sda));
	}

	#[test]
	fn phases_are_bracketed_separately() {
		let mut bus = bus_with(&[SimDevice::new(0x50)]);
		let mut buf = [0u8; 2];
		bus.write_read(Address(0x50), Some(&[0x00u8][..]), Some(&mut buf[..])).unwrap();
		assert_eq!(bus.start_count(), 2);
		assert_eq!(bus.repeated_start_count(), 0);
		assert_eq!(bus.stop_count(), 2);
	}

	#[test]
	fn empty_phases_are_skipped() {
		let mut bus = bus_with(&[SimDevice::new(0x50)]);
		let mut empty = [0u8; 0];
		bus.write_read(Address(0x50), Some(&[0u8; 0][..]), Some(&mut empty[..])).unwrap();
		bus.write_read(Address(0x50), None, None).unwrap();
		bus.write_read_combined(Address(0x50), None, None).unwrap();
		assert_eq!(bus.start_count(), 0);
		assert_eq!(bus.trace().len(), 1);
	}

	#[test]
	fn combined_uses_repeated_start() {
		let mut bus = bus_with(&[SimDevice::new(0x50).with_registers(0x30, &[0xde, 0xad])]);
		let mut buf = [0u8; 2];
		bus.write_read_combined(Address(0x50), Some(&[0x30u8][..]), Some(&mut buf[..])).unwrap();
		assert_eq!(buf, [0xde, 0xad]);
		assert_eq!(bus.start_count(), 2);
		assert_eq!(bus.repeated_start_count(), 1);
		assert_eq!(bus.stop_count(), 1);
	}

	#[test]
	fn pointer_lost_on_stop_needs_combined() {
		let device = SimDevice::new(0x50)
			.with_registers(0x00, &[0x11])
			.with_registers(0x30, &[0x99])
			.forget_pointer_on_stop();
		let mut bus = bus_with(&[device]);

		let mut buf = [0u8; 1];
		bus.write_read(Address(0x50), Some(&[0x30u8][..]), Some(&mut buf[..])).unwrap();
		assert_eq!(buf[0], 0x11, "two separate transactions read from register 0");

		bus.write_read_combined(Address(0x50), Some(&[0x30u8][..]), Some(&mut buf[..])).unwrap();
		assert_eq!(buf[0], 0x99);
	}

	#[test]
	fn ack_all_leaves_slave_driving_sda() {
		// byte after the one read starts with a 0 bit
		let device = SimDevice::new(0x68).with_registers(0x00, &[0xff, 0x00]);
		let options = TransferOptions { read_ack: ReadAck::AckAll, strict: false };

		let mut bus = bus_with(&[device.clone()]);
		let mut buf = [0u8; 1];
		bus.write_read_with(Address(0x68), Some(&[0x00u8][..]), Some(&mut buf[..]), &options).unwrap();
		assert_eq!(buf[0], 0xff);
		// the STOP of the read phase never made it onto the bus
		assert_eq!(bus.stop_count(), 1);
		assert!(bus.read_line(Line::Scl));
		assert!(!bus.read_line(Line::Sda));

		let mut bus = bus_with(&[device]);
		bus.write_read(Address(0x68), Some(&[0x00u8][..]), Some(&mut buf[..])).unwrap();
		assert_eq!(buf[0], 0xff);
		assert_eq!(bus.stop_count(), 2);
		assert!(bus.read_line(Line::Sda));
	}

	#[test]
	fn ack_all_is_harmless_when_next_bit_is_one() {
		let device = SimDevice::new(0x68).with_registers(0x00, &[0x12, 0x80]);
		let options = TransferOptions { read_ack: ReadAck::AckAll, strict: false };
		let mut bus = bus_with(&[device]);
		let mut buf = [0u8; 1];
		bus.write_read_with(Address(0x68), Some(&[0x00u8][..]), Some(&mut buf[..]), &options).unwrap();
		assert_eq!(buf[0], 0x12);
		assert_eq!(bus.stop_count(), 2);
	}

	#[test]
	fn lenient_ignores_missing_device() {
		let mut bus = SimBus::new();
		let mut buf = [0u8; 2];
		bus.write_read(Address(0x42), Some(&[0x01u8, 0x02][..]), Some(&mut buf[..])).unwrap();
		// floating SDA reads as 0xff
		assert_eq!(buf, [0xff, 0xff]);
		assert_eq!(bus.stop_count(), 2);
	}

	#[test]
	fn strict_reports_address_nack() {
		let mut bus = SimBus::new();
		let options = TransferOptions { strict: true, ..TransferOptions::default() };
		let err = bus.write_read_with(Address(0x42), Some(&[0x01u8][..]), None, &options).unwrap_err();
		assert_eq!(
			err.downcast_ref::<Nack>(),
			Some(&Nack::Address { address: Address(0x42), direction: Direction::Write })
		);
		// STOP is still sent
		assert_eq!(bus.stop_count(), 1);
		assert!(bus.read_line(Line::Sda));

		let mut buf = [0u8; 1];
		let err = bus.write_read_with(Address(0x42), None, Some(&mut buf[..]), &options).unwrap_err();
		assert_eq!(
			err.downcast_ref::<Nack>(),
			Some(&Nack::Address { address: Address(0x42), direction: Direction::Read })
		);
	}

	#[test]
	fn strict_reports_data_nack() {
		let mut bus = bus_with(&[SimDevice::new(0x50).nack_data()]);
		let options = TransferOptions { strict: true, ..TransferOptions::default() };
		let err = bus.write_read_with(Address(0x50), Some(&[0x01u8, 0x02][..]), None, &options).unwrap_err();
		assert_eq!(err.downcast_ref::<Nack>(), Some(&Nack::Data { address: Address(0x50), index: 0 }));
		assert_eq!(bus.stop_count(), 1);

		// lenient: same transfer succeeds
		bus.write_read(Address(0x50), Some(&[0x01u8, 0x02][..]), None).unwrap();
	}

	#[test]
	fn out_of_range_addresses_are_sent_unchanged() {
		let mut bus = bus_with(&[SimDevice::new(0x00), SimDevice::new(0x78)]);
		assert!(bus.device_ready(Address(0x00)));
		assert_eq!(first_byte_on_wire(&bus), 0x00);

		bus.clear_trace();
		assert!(bus.device_ready(Address(0x78)));
		assert_eq!(first_byte_on_wire(&bus), 0xf0);

		bus.write_read(Address(0x78), Some(&[0x05u8, 0x42][..]), None).unwrap();
		assert_eq!(bus.device(0x78).unwrap().registers()[0x05], 0x42);
	}
}
