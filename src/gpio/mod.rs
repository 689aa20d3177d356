/// GPIO pin drivers for real hardware

mod bcm2835;
mod mapped;

pub use self::bcm2835::{
	Bcm2835Pins,
	DEFAULT_GPIOMEM,
};
