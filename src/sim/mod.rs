/// In-memory I2C bus for tests and dry runs
///
/// Lines are wired-AND: a line is high only if the master and every device
/// release it. Time only advances through `delay_us`, every change of the
/// resolved line levels is recorded with its virtual timestamp.

use std::collections::VecDeque;

use crate::bus::{
	Hardware,
	Line,
	Timing,
};

mod device;

pub use self::device::SimDevice;

/// resolved line levels at a point in (virtual) time
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Sample {
	pub time_us: u64,
	pub scl: bool,
	pub sda: bool,
}

pub struct SimBus {
	now_us: u64,
	timing: Timing,
	master_scl: bool,
	master_sda: bool,
	scl: bool,
	sda: bool,
	devices: Vec<SimDevice>,
	// raw SDA levels driven on consecutive falling SCL edges
	script: VecDeque<bool>,
	script_sda: bool,
	trace: Vec<Sample>,
	busy: bool,
	starts: usize,
	repeated_starts: usize,
	stops: usize,
}

impl SimBus {
	pub fn new() -> Self {
		SimBus {
			now_us: 0,
			timing: Timing::STANDARD,
			master_scl: true,
			master_sda: true,
			scl: true,
			sda: true,
			devices: Vec::new(),
			script: VecDeque::new(),
			script_sda: true,
			trace: vec![Sample { time_us: 0, scl: true, sda: true }],
			busy: false,
			starts: 0,
			repeated_starts: 0,
			stops: 0,
		}
	}

	pub fn with_devices<I>(devices: I) -> Self
	where
		I: IntoIterator<Item = SimDevice>,
	{
		let mut bus = SimBus::new();
		for d in devices {
			bus.attach(d);
		}
		bus
	}

	pub fn attach(&mut self, device: SimDevice) {
		self.devices.push(device);
	}

	pub fn device(&self, address: u8) -> Option<&SimDevice> {
		self.devices.iter().find(|d| d.address() == address)
	}

	pub fn set_timing(&mut self, timing: Timing) {
		self.timing = timing;
	}

	pub fn now_us(&self) -> u64 {
		self.now_us
	}

	pub fn trace(&self) -> &[Sample] {
		&self.trace
	}

	/// drop the recorded trace, keeping the current levels as first sample
	pub fn clear_trace(&mut self) {
		self.trace.clear();
		self.record();
	}

	/// number of START conditions seen on the bus (including repeated ones)
	pub fn start_count(&self) -> usize {
		self.starts
	}

	pub fn repeated_start_count(&self) -> usize {
		self.repeated_starts
	}

	pub fn stop_count(&self) -> usize {
		self.stops
	}

	/// Drive raw SDA levels, one per clock: the first right away if SCL is
	/// low (otherwise on the next falling edge), the others on the following
	/// falling edges. SDA is released afterwards.
	pub fn script_read(&mut self, levels: &[bool]) {
		self.script.extend(levels.iter().cloned());
		if !self.scl {
			self.advance_script();
			self.settle();
		}
	}

	fn advance_script(&mut self) {
		self.script_sda = self.script.pop_front().unwrap_or(true);
	}

	fn record(&mut self) {
		self.trace.push(Sample {
			time_us: self.now_us,
			scl: self.scl,
			sda: self.sda,
		});
	}

	fn resolve_sda(&self) -> bool {
		self.master_sda && self.script_sda && self.devices.iter().all(|d| d.sda())
	}

	fn on_start(&mut self) {
		if self.busy {
			trace!("sim: repeated START @{}us", self.now_us);
			self.repeated_starts += 1;
		} else {
			trace!("sim: START @{}us", self.now_us);
		}
		self.starts += 1;
		self.busy = true;
		for d in &mut self.devices {
			d.start();
		}
	}

	fn on_stop(&mut self) {
		trace!("sim: STOP @{}us", self.now_us);
		self.stops += 1;
		self.busy = false;
		for d in &mut self.devices {
			d.stop();
		}
	}

	// propagate driver changes to the resolved lines and the devices
	fn settle(&mut self) {
		if self.master_scl != self.scl {
			self.scl = self.master_scl;
			self.record();

			if self.scl {
				let sda = self.sda;
				for d in &mut self.devices {
					d.clock_rising(sda);
				}
			} else {
				for d in &mut self.devices {
					d.clock_falling();
				}
				self.advance_script();
			}
		}

		let sda = self.resolve_sda();
		if sda != self.sda {
			self.sda = sda;
			self.record();
			if self.scl {
				if sda {
					self.on_stop();
				} else {
					self.on_start();
				}
			}
		}
	}
}

impl Default for SimBus {
	fn default() -> Self {
		SimBus::new()
	}
}

impl Hardware for SimBus {
	fn set_line(&mut self, line: Line, released: bool) {
		match line {
			Line::Scl => self.master_scl = released,
			Line::Sda => self.master_sda = released,
		}
		self.settle();
	}

	fn read_line(&mut self, line: Line) -> bool {
		match line {
			Line::Scl => self.scl,
			Line::Sda => self.sda,
		}
	}

	fn delay_us(&mut self, us: u32) {
		self.now_us += us as u64;
	}

	fn timing(&self) -> Timing {
		self.timing
	}
}
