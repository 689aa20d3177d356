#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
	// not addressed; waits for the next START
	Idle,
	Address { shift: u8, bits: u8 },
	// pulling SDA low for the address ACK
	AddressAck { read: bool },
	Receive { shift: u8, bits: u8 },
	DataAck,
	Transmit { byte: u8, bits: u8 },
	// SDA released, the master drives the ACK bit
	MasterAck { acked: bool },
}

/// Simulated slave with a 256 byte register file.
///
/// The first byte of a write sets the register pointer, further bytes are
/// stored at the pointer; reads start at the pointer. The pointer
/// auto-increments (and wraps) after each byte.
#[derive(Clone, Debug)]
pub struct SimDevice {
	address: u8,
	registers: Vec<u8>,
	pointer: u8,
	forget_pointer_on_stop: bool,
	ack_data: bool,
	expect_pointer: bool,
	state: State,
	sda: bool,
}

impl SimDevice {
	pub fn new(address: u8) -> Self {
		SimDevice {
			address,
			registers: vec![0u8; 256],
			pointer: 0,
			forget_pointer_on_stop: false,
			ack_data: true,
			expect_pointer: false,
			state: State::Idle,
			sda: true,
		}
	}

	pub fn with_registers(mut self, offset: u8, data: &[u8]) -> Self {
		for (i, b) in data.iter().enumerate() {
			let r = (offset as usize + i) % self.registers.len();
			self.registers[r] = *b;
		}
		self
	}

	/// reset the register pointer on STOP; such a device only reads back
	/// the written register if a repeated START is used
	pub fn forget_pointer_on_stop(mut self) -> Self {
		self.forget_pointer_on_stop = true;
		self
	}

	/// acknowledge the address, but no data bytes (and ignore them)
	pub fn nack_data(mut self) -> Self {
		self.ack_data = false;
		self
	}

	pub fn address(&self) -> u8 {
		self.address
	}

	pub fn registers(&self) -> &[u8] {
		&self.registers
	}

	pub fn pointer(&self) -> u8 {
		self.pointer
	}

	// level the device drives onto SDA (true = released)
	pub(super) fn sda(&self) -> bool {
		self.sda
	}

	pub(super) fn start(&mut self) {
		self.state = State::Address { shift: 0, bits: 0 };
		self.sda = true;
	}

	pub(super) fn stop(&mut self) {
		self.state = State::Idle;
		self.sda = true;
		if self.forget_pointer_on_stop {
			self.pointer = 0;
		}
	}

	fn next_byte(&mut self) -> u8 {
		let byte = self.registers[self.pointer as usize];
		self.pointer = self.pointer.wrapping_add(1);
		byte
	}

	fn received(&mut self, byte: u8) {
		if !self.ack_data {
			return;
		}
		if self.expect_pointer {
			self.pointer = byte;
			self.expect_pointer = false;
		} else {
			self.registers[self.pointer as usize] = byte;
			self.pointer = self.pointer.wrapping_add(1);
		}
	}

	/// slaves sample on the rising edge
	pub(super) fn clock_rising(&mut self, sda: bool) {
		self.state = match self.state {
			State::Address { shift, bits } => State::Address { shift: (shift << 1) | sda as u8, bits: bits + 1 },
			State::Receive { shift, bits } => State::Receive { shift: (shift << 1) | sda as u8, bits: bits + 1 },
			State::Transmit { byte, bits } => State::Transmit { byte, bits: bits + 1 },
			State::MasterAck { .. } => State::MasterAck { acked: !sda },
			other => other,
		};
	}

	/// slaves change SDA on the falling edge
	pub(super) fn clock_falling(&mut self) {
		self.state = match self.state {
			State::Address { shift, bits: 8 } => {
				if shift >> 1 == self.address {
					self.sda = false;
					State::AddressAck { read: 0 != shift & 1 }
				} else {
					State::Idle
				}
			},
			State::AddressAck { read: true } => {
				let byte = self.next_byte();
				self.sda = 0 != byte & 0x80;
				State::Transmit { byte, bits: 0 }
			},
			State::AddressAck { read: false } => {
				self.sda = true;
				self.expect_pointer = true;
				State::Receive { shift: 0, bits: 0 }
			},
			State::Receive { shift, bits: 8 } => {
				self.received(shift);
				self.sda = !self.ack_data;
				State::DataAck
			},
			State::DataAck => {
				self.sda = true;
				State::Receive { shift: 0, bits: 0 }
			},
			State::Transmit { bits: 8, .. } => {
				self.sda = true;
				State::MasterAck { acked: false }
			},
			State::Transmit { byte, bits } => {
				self.sda = 0 != byte & (0x80 >> bits);
				State::Transmit { byte, bits }
			},
			State::MasterAck { acked: true } => {
				let byte = self.next_byte();
				self.sda = 0 != byte & 0x80;
				State::Transmit { byte, bits: 0 }
			},
			State::MasterAck { acked: false } => {
				self.sda = true;
				State::Idle
			},
			other => other,
		};
	}
}
