//! Sensor pool reader - periodic acquisition and console reporting
//!
//! Scans the configured I2C bus for known sensors, then reports
//! grouped readings at a configurable frequency. Single-letter console
//! commands trigger one-shot reads, retune the report frequency, or
//! quit.

use std::cell::RefCell;
use std::io::{self, BufRead};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use clap::Parser;
use i2c_sensor_pool::{
    Command, FaultIndicator, LinuxBus, Scheduler, SensorPool, SharedBus, ACCELEROMETER_GROUP,
    BAROMETER_GROUP, TEMPERATURE_GROUP,
};

#[derive(Parser, Debug)]
#[command(name = "sensor-pool-reader")]
#[command(about = "Discover I2C sensors and report grouped readings", long_about = None)]
struct Args {
    /// I2C bus device node
    #[arg(short, long, default_value = "/dev/i2c-1")]
    bus: String,

    /// Periodic report frequency in Hz
    #[arg(short, long, default_value = "1.0")]
    frequency: f64,

    /// Restrict periodic reports to one group: "temperature",
    /// "barometer", or "accelerometer"
    #[arg(short, long)]
    group: Option<String>,
}

/// Console stand-in for the fault LED of a headless deployment.
struct ConsoleIndicator {
    faulted: bool,
}

impl FaultIndicator for ConsoleIndicator {
    fn raise(&mut self) {
        if !self.faulted {
            eprintln!("[{}] fault indicator raised", timestamp());
            self.faulted = true;
        }
    }

    fn clear(&mut self) {
        self.faulted = false;
    }
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S%.3f").to_string()
}

fn group_key(name: &str) -> Option<&'static str> {
    match name {
        "temperature" => Some(TEMPERATURE_GROUP),
        "barometer" => Some(BAROMETER_GROUP),
        "accelerometer" => Some(ACCELEROMETER_GROUP),
        _ => None,
    }
}

/// Read the pool (optionally one group) and print grouped report lines.
fn report(pool: &mut SensorPool, filter: Option<&str>) {
    let stamp = timestamp();
    let mut current_group = None;
    for outcome in pool.read_all(filter) {
        if current_group != Some(outcome.group) {
            println!("[{stamp}] {}:", outcome.group);
            current_group = Some(outcome.group);
        }
        match outcome.result {
            Ok(reading) => println!("  0x{:02X}: {}", outcome.address, reading),
            Err(e) => eprintln!("  0x{:02X}: read failed: {}", outcome.address, e),
        }
    }
    println!("{}", "-".repeat(10));
    pool.clear_fault();
}

/// Dispatch one console command. Returns false to shut down.
fn handle_command(
    command: Command,
    pool: &mut SensorPool,
    scheduler: &mut Scheduler<SensorPool>,
) -> bool {
    match command {
        Command::ReadAll => report(pool, None),
        Command::ReadTemperature => report(pool, Some(TEMPERATURE_GROUP)),
        Command::ReadBarometer => report(pool, Some(BAROMETER_GROUP)),
        Command::ReadAccelerometer => report(pool, Some(ACCELEROMETER_GROUP)),
        Command::SetFrequency(hz) => match scheduler.set_frequency("report", f64::from(hz)) {
            Ok(()) => println!("report frequency set to {hz} Hz"),
            Err(e) => eprintln!("{e}"),
        },
        Command::ShowConfig => println!("{}", pool.config_summary()),
        Command::Quit => return false,
    }
    true
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = match args.group.as_deref() {
        Some(name) => match group_key(name) {
            Some(key) => Some(key),
            None => {
                eprintln!(
                    "Error: unknown group {name:?} (expected temperature, barometer, \
                     or accelerometer)"
                );
                std::process::exit(1);
            }
        },
        None => None,
    };

    println!("I2C Sensor Pool Reader");
    println!("======================");
    println!("Opening {}...", args.bus);

    let bus: SharedBus = Rc::new(RefCell::new(LinuxBus::open(&args.bus)?));
    let mut pool =
        SensorPool::discover_with(bus, Some(Box::new(ConsoleIndicator { faulted: false })));
    println!("{}", pool.config_summary());

    if pool.is_empty() {
        eprintln!("No known sensors found on {}", args.bus);
        std::process::exit(1);
    }
    println!(
        "{} sensor(s) pooled, reporting at {} Hz",
        pool.len(),
        args.frequency
    );
    println!("Commands: r=read all, t/b/a=read one group, c=config, <hz>=retune, q=quit\n");

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        println!("\nReceived Ctrl+C, shutting down...");
        r.store(false, Ordering::SeqCst);
    })?;

    // Console lines arrive over a channel so only this thread ever
    // touches the bus.
    let (tx, rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let mut scheduler = Scheduler::new();
    scheduler.add("report", args.frequency, move |pool: &mut SensorPool| {
        report(pool, filter);
    })?;

    while running.load(Ordering::SeqCst) {
        scheduler.run_pending(Instant::now(), &mut pool);

        match rx.try_recv() {
            Ok(line) if !line.trim().is_empty() => match line.parse::<Command>() {
                Ok(command) => {
                    if !handle_command(command, &mut pool, &mut scheduler) {
                        break;
                    }
                }
                Err(e) => eprintln!("{e}"),
            },
            Ok(_) => {}
            Err(mpsc::TryRecvError::Empty) => {}
            Err(mpsc::TryRecvError::Disconnected) => {}
        }

        thread::sleep(Duration::from_millis(20));
    }

    scheduler.cancel("report");
    println!("Done.");
    Ok(())
}
