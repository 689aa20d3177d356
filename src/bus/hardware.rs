use std::time::{
	Duration,
	Instant,
};

use crate::AResult;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Line {
	Scl,
	Sda,
}

/// Delays (in microseconds) of the bit-banged waveform
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Timing {
	/// SCL low phase; data is changed during this phase
	pub scl_low_us: u32,
	/// SCL high phase; data is sampled during this phase
	pub scl_high_us: u32,
	/// between SDA falling (START) and SCL falling
	pub start_us: u32,
	/// between SCL rising and SDA rising (STOP)
	pub stop_us: u32,
}

impl Timing {
	/// 100 kHz standard mode
	pub const STANDARD: Timing = Timing {
		scl_low_us: 5,
		scl_high_us: 5,
		start_us: 5,
		stop_us: 5,
	};

	/// `None` if the phases don't fit into a `u32`
	pub fn bit_period_us(&self) -> Option<u32> {
		self.scl_low_us.checked_add(self.scl_high_us)
	}

	/// Rejects timings without a usable clock; returns the bit period
	pub fn validate(&self) -> AResult<u32> {
		let period = self.bit_period_us().ok_or_else(|| format_err!(
			"SCL low ({}us) and high ({}us) phase too long", self.scl_low_us, self.scl_high_us
		))?;
		ensure!(period > 0, "SCL low and high phase can't both be zero");
		Ok(period)
	}
}

impl Default for Timing {
	fn default() -> Self {
		Timing::STANDARD
	}
}

pub trait PinDriver {
	/// `false` pulls the line low, `true` releases it
	fn set_line(&mut self, line: Line, released: bool);

	/// electrical level currently on the line
	fn read_line(&mut self, line: Line) -> bool;
}

pub trait Delay {
	/// block for at least `us` microseconds
	fn delay_us(&mut self, us: u32);
}

/// Busy-waits on the monotonic clock.
///
/// Only the elapsed time since the start of the wait is compared, so the
/// underlying counter may wrap.
#[derive(Clone, Copy, Default, Debug)]
pub struct SpinDelay;

impl Delay for SpinDelay {
	fn delay_us(&mut self, us: u32) {
		let duration = Duration::from_micros(us as u64);
		let start = Instant::now();
		while start.elapsed() < duration {
			std::hint::spin_loop();
		}
	}
}

/// Everything the protocol engine needs from the bus hardware
pub trait Hardware {
	fn set_line(&mut self, line: Line, released: bool);
	fn read_line(&mut self, line: Line) -> bool;
	fn delay_us(&mut self, us: u32);

	fn timing(&self) -> Timing {
		Timing::STANDARD
	}
}

impl<'a, H: ?Sized + Hardware> Hardware for &'a mut H {
	fn set_line(&mut self, line: Line, released: bool) {
		H::set_line(*self, line, released)
	}
	fn read_line(&mut self, line: Line) -> bool {
		H::read_line(*self, line)
	}
	fn delay_us(&mut self, us: u32) {
		H::delay_us(*self, us)
	}
	fn timing(&self) -> Timing {
		H::timing(*self)
	}
}

/// An owned two-line bus: a pin driver, a delay source and the timing
pub struct Bus<P: PinDriver, D: Delay = SpinDelay> {
	pins: P,
	delay: D,
	timing: Timing,
}

impl<P: PinDriver> Bus<P, SpinDelay> {
	pub fn new(pins: P) -> Self {
		Bus::with_delay(pins, SpinDelay, Timing::STANDARD)
	}
}

impl<P: PinDriver, D: Delay> Bus<P, D> {
	pub fn with_delay(mut pins: P, delay: D, timing: Timing) -> Self {
		// idle bus: both lines released
		pins.set_line(Line::Sda, true);
		pins.set_line(Line::Scl, true);
		Bus {
			pins,
			delay,
			timing,
		}
	}

	pub fn into_inner(self) -> (P, D) {
		(self.pins, self.delay)
	}
}

impl<P: PinDriver, D: Delay> Hardware for Bus<P, D> {
	fn set_line(&mut self, line: Line, released: bool) {
		self.pins.set_line(line, released)
	}

	fn read_line(&mut self, line: Line) -> bool {
		self.pins.read_line(line)
	}

	fn delay_us(&mut self, us: u32) {
		self.delay.delay_us(us)
	}

	fn timing(&self) -> Timing {
		self.timing
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Default)]
	struct RecordingPins {
		scl: bool,
		sda: bool,
		writes: Vec<(Line, bool)>,
	}

	impl PinDriver for RecordingPins {
		fn set_line(&mut self, line: Line, released: bool) {
			match line {
				Line::Scl => self.scl = released,
				Line::Sda => self.sda = released,
			}
			self.writes.push((line, released));
		}

		fn read_line(&mut self, line: Line) -> bool {
			match line {
				Line::Scl => self.scl,
				Line::Sda => self.sda,
			}
		}
	}

	#[derive(Default)]
	struct CountingDelay(u64);

	impl Delay for CountingDelay {
		fn delay_us(&mut self, us: u32) {
			self.0 += us as u64;
		}
	}

	#[test]
	fn new_bus_releases_both_lines() {
		let mut bus = Bus::with_delay(RecordingPins::default(), CountingDelay::default(), Timing::STANDARD);
		assert!(bus.read_line(Line::Scl));
		assert!(bus.read_line(Line::Sda));
		let (pins, _) = bus.into_inner();
		assert_eq!(pins.writes, vec![(Line::Sda, true), (Line::Scl, true)]);
	}

	#[test]
	fn forwards_delay_and_timing() {
		let timing = Timing { scl_low_us: 2, scl_high_us: 3, start_us: 4, stop_us: 4 };
		let mut bus = Bus::with_delay(RecordingPins::default(), CountingDelay::default(), timing);
		bus.delay_us(7);
		bus.delay_us(3);
		assert_eq!(bus.timing().bit_period_us(), Some(5));
		let (_, delay) = bus.into_inner();
		assert_eq!(delay.0, 10);
	}

	#[test]
	fn timing_validation() {
		assert_eq!(Timing::STANDARD.validate().unwrap(), 10);

		let zero = Timing { scl_low_us: 0, scl_high_us: 0, ..Timing::STANDARD };
		assert!(zero.validate().is_err());

		let huge = Timing { scl_low_us: u32::MAX, scl_high_us: 1, ..Timing::STANDARD };
		assert_eq!(huge.bit_period_us(), None);
		let err = huge.validate().unwrap_err();
		assert!(err.to_string().contains("too long"), "{}", err);

		let max = Timing { scl_low_us: u32::MAX - 1, scl_high_us: 1, ..Timing::STANDARD };
		assert_eq!(max.validate().unwrap(), u32::MAX);
	}

	#[test]
	fn spin_delay_waits_at_least_requested() {
		let start = Instant::now();
		SpinDelay.delay_us(200);
		assert!(start.elapsed() >= Duration::from_micros(200));
	}
}
