/// Bit-banged I2C bus master over two open-drain lines (SCL, SDA)
///
/// The master never drives a line high: `false` pulls a line low, `true`
/// releases it and the pull-up resistor (or a slave) decides its level.
///
/// Signal timing at the default 100 kHz:
/// - START: SDA falls while SCL is high, 5us later SCL falls
/// - data bits: SDA changes only while SCL is low (5us), the receiver samples
///   while SCL is high (5us); most significant bit first
/// - ACK: 9th clock; low = acknowledged, high = not acknowledged. The slave
///   drives it after bytes written by the master, the master drives it after
///   bytes read from the slave.
/// - STOP: SDA rises while SCL is high
///
/// Address byte: 7-bit address shifted left by one, low bit is the direction
/// (0 = write, 1 = read).
///
/// Not supported: clock stretching, arbitration, recovery of a stuck bus.

mod hardware;
mod low_level;
mod operations;

pub use self::hardware::{
	Bus,
	Delay,
	Hardware,
	Line,
	PinDriver,
	SpinDelay,
	Timing,
};

pub use self::low_level::{
	LowLevel,
	Transaction,
};

pub use self::operations::{
	ADDRESS_MAX,
	ADDRESS_MIN,
	Address,
	BusOperations,
	Direction,
	Nack,
	ReadAck,
	TransferOptions,
};
