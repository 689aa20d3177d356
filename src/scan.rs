use std::fmt;

use crate::bus::{
	ADDRESS_MAX,
	ADDRESS_MIN,
	Address,
	BusOperations,
};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Presence {
	Present,
	Absent,
	/// reserved address, not probed
	OutOfRange,
}

/// Result of probing all 128 addresses
#[derive(Clone, PartialEq, Eq)]
pub struct ScanMap {
	entries: [Presence; 128],
}

impl ScanMap {
	/// anything beyond 7 bits is `OutOfRange`
	pub fn get(&self, address: Address) -> Presence {
		self.entries.get(address.0 as usize).cloned().unwrap_or(Presence::OutOfRange)
	}

	pub fn present<'a>(&'a self) -> impl Iterator<Item = Address> + 'a {
		self.entries.iter()
			.enumerate()
			.filter(|(_, p)| **p == Presence::Present)
			.map(|(a, _)| Address(a as u8))
	}
}

/// Display like `i2cdetect`: header row with column indices, one row per 16
/// addresses
impl fmt::Display for ScanMap {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "    ")?;
		for column in 0..0x10 {
			write!(f, " {:X} ", column)?;
		}
		for (address, presence) in self.entries.iter().enumerate() {
			if 0 == address % 16 {
				write!(f, "\n{:02X}: ", address)?;
			}
			match presence {
				Presence::Present => write!(f, "{:02X} ", address)?,
				Presence::Absent => write!(f, "-- ")?,
				Presence::OutOfRange => write!(f, "   ")?,
			}
		}
		writeln!(f)
	}
}

impl fmt::Debug for ScanMap {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_list().entries(self.present()).finish()
	}
}

/// Probe every address in [`ADDRESS_MIN`, `ADDRESS_MAX`]; reserved addresses
/// are skipped. No retries.
pub fn scan<B>(bus: &mut B) -> ScanMap
where
	B: BusOperations + ?Sized,
{
	let mut entries = [Presence::OutOfRange; 128];
	for address in ADDRESS_MIN..=ADDRESS_MAX {
		entries[address as usize] = if bus.device_ready(Address(address)) {
			Presence::Present
		} else {
			Presence::Absent
		};
	}

	let map = ScanMap { entries };
	info!("scan found {} device(s): {:?}", map.present().count(), map);
	map
}
