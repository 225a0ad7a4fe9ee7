//! Echo pad presses back as colours on a simulated Launchpad MK2.
//!
//! Run with:
//!   cargo run -p lpmk2 --example grid-echo --features sim,logging

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use lpmk2::device::{DeviceError, InterfaceDescriptor};
use lpmk2::frame::{HexDump, BUTTON};
use lpmk2::logging::{init_logging, LogFormat, LogLevel};
use lpmk2::transport::{SimTransport, Transport};
use lpmk2::Driver;

const NOTE_ON: u8 = 0x90;
const GREEN: u8 = 0x15;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(LogFormat::Text, LogLevel::Debug);

    let driver = Driver::new();
    let sim = Arc::new(SimTransport::new());
    let transport: Arc<dyn Transport> = sim.clone();
    let minor = driver.attach(&InterfaceDescriptor::mk2(64), transport)?;
    let handle = driver.open(minor)?;
    eprintln!("Attached {}", lpmk2::device::node_name(minor));

    // Play the device side: press the bottom row, one pad at a time.
    let presser = {
        let sim = Arc::clone(&sim);
        thread::spawn(move || {
            for pad in 11..=18u8 {
                sim.push_inbound(vec![BUTTON, NOTE_ON, pad, 0x7f]);
                thread::sleep(Duration::from_millis(10));
            }
        })
    };

    let mut event = [0u8; 3];
    for _ in 0..8 {
        let n = handle.read(&mut event)?;
        eprintln!("Pressed {}", HexDump(&event[..n]));
        if event[0] == NOTE_ON {
            handle.write(&[NOTE_ON, event[1], GREEN])?;
        }
    }
    presser.join().map_err(|_| "presser thread panicked")?;

    for frame in sim.written() {
        eprintln!("Sent {}", HexDump(&frame));
    }

    driver.detach(minor);
    match handle.write(&[NOTE_ON, 11, 0]) {
        Err(DeviceError::DeviceGone) => eprintln!("Device gone, as expected"),
        other => eprintln!("Unexpected result after detach: {other:?}"),
    }
    Ok(())
}
