#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate softi2c;
use softi2c::*;

use std::process::exit;

use softi2c::bus::{
	ADDRESS_MAX,
	ADDRESS_MIN,
	SpinDelay,
};
use softi2c::sim::{
	SimBus,
	SimDevice,
};

// DS3231 RTC, used by the waveform capture commands
const DS3231_ADDRESS: Address = Address(0x68);

// Raspberry Pi header pins 5 (SCL) and 3 (SDA)
const DEFAULT_SCL_PIN: u8 = 3;
const DEFAULT_SDA_PIN: u8 = 2;

fn get_param<T>(matches: &clap::ArgMatches, name: &str) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	param.parse::<T>().map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid paramater {}: {}", name, e);
		e.context(msg).into()
	})
}

fn get_param_or<T>(matches: &clap::ArgMatches, name: &str, default: T) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	if matches.is_present(name) {
		get_param(matches, name)
	} else {
		Ok(default)
	}
}

fn parse_byte(s: &str) -> AResult<u8> {
	let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
	u8::from_str_radix(digits, 16).map_err(|e| format_err!("invalid data byte {:?}: {}", s, e))
}

fn parse_bytes(matches: &clap::ArgMatches, name: &str) -> AResult<Vec<u8>> {
	match matches.values_of(name) {
		None => Ok(Vec::new()),
		Some(values) => values.map(parse_byte).collect(),
	}
}

fn format_bytes(data: &[u8]) -> String {
	data.iter().map(|b| format!("0x{:02x}", b)).collect::<Vec<_>>().join(" ")
}

struct Settings {
	options: TransferOptions,
	combined: bool,
}

fn parse_timing(matches: &clap::ArgMatches) -> AResult<Timing> {
	let default = Timing::STANDARD;
	let timing = Timing {
		scl_low_us: get_param_or(matches, "low_us", default.scl_low_us)?,
		scl_high_us: get_param_or(matches, "high_us", default.scl_high_us)?,
		start_us: get_param_or(matches, "start_us", default.start_us)?,
		stop_us: get_param_or(matches, "stop_us", default.stop_us)?,
	};
	let period = timing.validate()?;
	debug!("timing: {:?} (~{} kHz)", timing, 1000 / period);
	Ok(timing)
}

fn transfer<B>(bus: &mut B, settings: &Settings, address: Address, write: Option<&[u8]>, read: Option<&mut [u8]>) -> AResult<()>
where
	B: BusOperations + ?Sized,
{
	if settings.combined {
		bus.write_read_combined_with(address, write, read, &settings.options)
	} else {
		bus.write_read_with(address, write, read, &settings.options)
	}
}

/// `Ok(false)`: the command ran, but the device didn't answer
fn run<B>(bus: &mut B, settings: &Settings, matches: &clap::ArgMatches) -> AResult<bool>
where
	B: BusOperations + ?Sized,
{
	match matches.subcommand() {
		("scan", _) => {
			println!("I2C Scan - scanning I2C addresses 0x{:02X} - 0x{:02X}", ADDRESS_MIN, ADDRESS_MAX);
			print!("{}", scan::scan(bus));
			Ok(true)
		}
		("probe", Some(sub_m)) => {
			let address: Address = get_param(sub_m, "ADDRESS")?;
			if !address.is_valid() {
				warn!("{} is a reserved address", address);
			}
			let present = bus.device_ready(address);
			println!("{}: {}", address, if present { "present" } else { "no response" });
			Ok(present)
		}
		("write", Some(sub_m)) => {
			let address: Address = get_param(sub_m, "ADDRESS")?;
			let data = parse_bytes(sub_m, "BYTES")?;
			transfer(bus, settings, address, Some(&data[..]), None)?;
			Ok(true)
		}
		("read", Some(sub_m)) => {
			let address: Address = get_param(sub_m, "ADDRESS")?;
			let count: usize = get_param(sub_m, "COUNT")?;
			let mut buf = vec![0u8; count];
			transfer(bus, settings, address, None, Some(&mut buf[..]))?;
			println!("{}", format_bytes(&buf));
			Ok(true)
		}
		("write_read", Some(sub_m)) => {
			let address: Address = get_param(sub_m, "ADDRESS")?;
			let count: usize = get_param(sub_m, "COUNT")?;
			let data = parse_bytes(sub_m, "BYTES")?;
			let mut buf = vec![0u8; count];
			transfer(bus, settings, address, Some(&data[..]), Some(&mut buf[..]))?;
			println!("{}", format_bytes(&buf));
			Ok(true)
		}
		("test_write", _) => {
			// register index 0
			transfer(bus, settings, DS3231_ADDRESS, Some(&[0x00u8][..]), None)?;
			Ok(true)
		}
		("test_read", _) => {
			let mut buf = [0xffu8; 1];
			transfer(bus, settings, DS3231_ADDRESS, None, Some(&mut buf[..]))?;
			println!("{}", format_bytes(&buf));
			Ok(true)
		}
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	}
}

fn app() -> clap::App<'static, 'static> {
	clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg gpiomem: --gpiomem +takes_value "GPIO register device (default: /dev/gpiomem)")
		(@arg scl: --scl +takes_value "GPIO pin used for SCL (default: 3)")
		(@arg sda: --sda +takes_value "GPIO pin used for SDA (default: 2)")
		(@arg low_us: --("low-us") +takes_value "SCL low phase in us (default: 5)")
		(@arg high_us: --("high-us") +takes_value "SCL high phase in us (default: 5)")
		(@arg start_us: --("start-us") +takes_value "START setup time in us (default: 5)")
		(@arg stop_us: --("stop-us") +takes_value "STOP setup time in us (default: 5)")
		(@arg strict: --strict "fail on bytes that aren't acknowledged")
		(@arg ack_all: --("ack-all") "acknowledge the last byte of a read too")
		(@arg combined: --combined "use a repeated START between write and read")
		(@arg simulate: --simulate +takes_value "simulate the bus with register devices at the given addresses (comma separated)")
		(@subcommand scan =>
			(about: "scan all I2C addresses")
		)
		(@subcommand probe =>
			(about: "check whether a device acknowledges its address")
			(@arg ADDRESS: +required "7-bit device address (hex)")
		)
		(@subcommand write =>
			(about: "write bytes to a device")
			(@arg ADDRESS: +required "7-bit device address (hex)")
			(@arg BYTES: +required +multiple "data bytes (hex)")
		)
		(@subcommand read =>
			(about: "read bytes from a device")
			(@arg ADDRESS: +required "7-bit device address (hex)")
			(@arg COUNT: +required "number of bytes to read")
		)
		(@subcommand write_read =>
			(about: "write bytes to a device, then read from it")
			(@arg ADDRESS: +required "7-bit device address (hex)")
			(@arg COUNT: +required "number of bytes to read")
			(@arg BYTES: +required +multiple "data bytes (hex)")
		)
		(@subcommand test_write =>
			(about: "waveform capture: write register index 0 to the DS3231 (0x68)")
		)
		(@subcommand test_read =>
			(about: "waveform capture: read one byte from the DS3231 (0x68)")
		)
	)
}

fn main_app() -> AResult<bool> {
	let matches = app().get_matches();

	let timing = parse_timing(&matches)?;
	let settings = Settings {
		options: TransferOptions {
			read_ack: if matches.is_present("ack_all") { ReadAck::AckAll } else { ReadAck::NackLast },
			strict: matches.is_present("strict"),
		},
		combined: matches.is_present("combined"),
	};

	if let Some(list) = matches.value_of("simulate") {
		let addresses = list.split(',')
			.filter(|s| !s.is_empty())
			.map(|s| s.trim().parse::<Address>())
			.collect::<AResult<Vec<_>>>()?;
		let mut bus = SimBus::with_devices(addresses.iter().map(|a| SimDevice::new(a.0)));
		bus.set_timing(timing);
		let success = run(&mut bus, &settings, &matches)?;
		info!("simulated {}us of bus time", bus.now_us());
		return Ok(success);
	}

	let scl: u8 = get_param_or(&matches, "scl", DEFAULT_SCL_PIN)?;
	let sda: u8 = get_param_or(&matches, "sda", DEFAULT_SDA_PIN)?;
	let path = matches.value_of("gpiomem").unwrap_or(gpio::DEFAULT_GPIOMEM);
	let pins = gpio::Bcm2835Pins::open(path, scl, sda)?;
	let mut bus = Bus::with_delay(pins, SpinDelay, timing);
	run(&mut bus, &settings, &matches)
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	match main_app() {
		Ok(true) => (),
		Ok(false) => exit(1),
		Err(e) => {
			error!("Error: {}", e);
			exit(1);
		}
	}
}
