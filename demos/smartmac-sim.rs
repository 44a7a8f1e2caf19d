//! smartMAC simulation, runs a set of duty-cycled nodes over a simulated aether
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use log::{debug, info, warn, error};

use structopt::StructOpt;
use humantime::Duration;
use rand::Rng;

use smartmac::prelude::*;
use smartmac::frame::{Frame, FrameType, HEADER_LEN};
use smartmac::phy::mock::{Aether, AetherPhy, MockError};

#[derive(Debug, StructOpt)]
struct Options {
    #[structopt(long, default_value = "3")]
    /// Number of simulated nodes
    pub nodes: u16,

    #[structopt(long, default_value = "2s")]
    /// Mean interval between transmissions per node
    pub tx_period: Duration,

    #[structopt(long, default_value = "5ms")]
    /// Simulated airtime per frame
    pub airtime: Duration,

    #[structopt(long)]
    /// Only send broadcast frames
    pub broadcast: bool,

    #[structopt(long, default_value = "info")]
    /// Configure log level
    pub log_level: simplelog::LevelFilter,
}

#[derive(Clone, Debug)]
pub struct SystemTimer {
    start: Instant,
}

impl SystemTimer {
    fn new() -> Self {
        Self {
            start: Instant::now()
        }
    }
}

impl MacTimer for SystemTimer {
    fn ticks_ms(&self) -> u64 {
        Instant::now().duration_since(self.start).as_millis() as u64
    }

    fn ticks_us(&self) -> u64 {
        Instant::now().duration_since(self.start).as_micros() as u64
    }
}

/// Blocking delay backed by the system clock
pub struct SystemDelay;

impl embedded_hal::delay::DelayNs for SystemDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(std::time::Duration::from_nanos(ns as u64));
    }
}

/// Aether PHY occupying the channel for a fixed airtime per frame
pub struct SimPhy {
    inner: AetherPhy,
    airtime: std::time::Duration,
}

impl Phy for SimPhy {
    type Error = MockError;

    fn on(&mut self) -> Result<(), CoreError<Self::Error>> {
        self.inner.on()
    }

    fn off(&mut self) -> Result<(), CoreError<Self::Error>> {
        self.inner.off()
    }

    fn send(&mut self, data: &[u8]) -> Result<(), CoreError<Self::Error>> {
        thread::sleep(self.airtime);
        self.inner.send(data)
    }
}

/// Upper layer printing received payloads
pub struct PrintDllc {
    addr: ShortAddress,
}

impl Dllc<MockError> for PrintDllc {
    fn recv(&mut self, data: &[u8]) -> Result<(), CoreError<MockError>> {
        let f = Frame::decode(data);
        let body = data.get(HEADER_LEN..).unwrap_or(&[]);

        info!("Node {:04x} RX from {:04x}: {}", self.addr.0, f.src_addr.0, String::from_utf8_lossy(body));

        Ok(())
    }
}

fn data_frame(seq: u8, src: ShortAddress, dest: ShortAddress, body: &[u8]) -> Vec<u8> {
    let header = Frame {
        frame_type: FrameType::Data,
        counter: seq,
        ack_required: false,
        pan_id: PanId(0xabcd),
        src_addr: src,
        dest_addr: dest,
    };

    let mut buff = vec![0u8; HEADER_LEN + body.len()];
    header.encode(&mut buff);
    buff[HEADER_LEN..].copy_from_slice(body);
    buff
}

fn run_node(id: u16, nodes: u16, aether: Aether, opts: Arc<Options>, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let addr = ShortAddress(id + 1);
    let timer = SystemTimer::new();

    let phy = SimPhy{ inner: aether.attach(addr), airtime: *opts.airtime };
    let config = SmartMacConfig{
        address: ExtendedAddress(addr.0 as u64),
        ..Default::default()
    };

    let mut mac = SmartMac::new(config, Netstack::new(phy, PrintDllc{ addr }), timer.clone(), SystemDelay)
        .map_err(|e| anyhow::anyhow!("Error initialising MAC: {:?}", e))?;

    mac.start().map_err(|e| anyhow::anyhow!("Error starting MAC: {:?}", e))?;

    let mut rng = rand::thread_rng();
    let tx_period = opts.tx_period.as_millis() as u64;
    let mut next_tx = rng.gen_range(0..tx_period.max(1) * 2);
    let mut seq = 0u8;

    debug!("Node {:04x} running", addr.0);

    while running.load(Ordering::SeqCst) {
        let now = timer.ticks_ms();

        if let Err(e) = mac.tick() {
            error!("Node {:04x} tick error: {:?}", addr.0, e);
        }

        while let Some(f) = mac.netstack_mut().phy.inner.receive() {
            if let Err(e) = mac.recv(&f) {
                warn!("Node {:04x} RX error: {:?}", addr.0, e);
            }
        }

        if now >= next_tx && mac.state() == MacState::Off {
            let dest = match opts.broadcast || nodes < 2 {
                true => None,
                false => {
                    let mut peer = rng.gen_range(1..=nodes);
                    if peer == addr.0 {
                        peer = peer % nodes + 1;
                    }
                    Some(ExtendedAddress(peer as u64))
                }
            };

            let dest_short = dest.map(|d| ShortAddress(d.0 as u16)).unwrap_or(ShortAddress(0xffff));
            let body = format!("hello {} from {:04x}", seq, addr.0);
            let data = data_frame(seq, addr, dest_short, body.as_bytes());

            let attrs = mac.attrs_mut();
            attrs.set_receiver(dest);
            attrs.set(Attr::MacSeqNo, seq as u32);

            let start = timer.ticks_ms();
            match mac.send(&data) {
                Ok(_) => info!("Node {:04x} TX {} to {:04x} in {} ms", addr.0, seq, dest_short.0, timer.ticks_ms() - start),
                Err(e) => warn!("Node {:04x} TX {} to {:04x} failed: {:?}", addr.0, seq, dest_short.0, e),
            }

            seq = seq.wrapping_add(1);
            next_tx = timer.ticks_ms() + rng.gen_range(tx_period / 2..tx_period.max(1) * 3 / 2 + 1);
        }

        thread::sleep(std::time::Duration::from_millis(1));
    }

    mac.stop().map_err(|e| anyhow::anyhow!("Error stopping MAC: {:?}", e))?;

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    // Bind exit handler
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    // Load options
    let opts = Arc::new(Options::from_args());

    // Initialise logging
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_ignore_str("smartmac::timer")
        .build();
    let _ = simplelog::SimpleLogger::init(opts.log_level, log_cfg);

    info!("Starting smartMAC simulation with {} nodes", opts.nodes);

    let aether = Aether::new();

    let handles: Vec<_> = (0..opts.nodes).map(|id| {
        let (aether, opts, running) = (aether.clone(), opts.clone(), running.clone());
        thread::spawn(move || run_node(id, opts.nodes, aether, opts, running))
    }).collect();

    for h in handles {
        match h.join() {
            Ok(r) => r?,
            Err(_) => return Err(anyhow::anyhow!("Node thread panicked")),
        }
    }

    info!("Simulation complete");

    Ok(())
}
