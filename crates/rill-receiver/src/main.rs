//! rill Receiver
//!
//! Binds a UDP port, accepts in-order segments, and writes them to the
//! output sink (a file, or nothing for `-`). Every counted datagram is
//! answered with the cumulative ACK, including ones consumed by the
//! simulated-loss policy; the process terminates after acknowledging a FIN.

use std::fs::File;
use std::io::{self, BufWriter, ErrorKind, Write};
use std::net::UdpSocket;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rill_transport::loss::{DropPolicy, ForcedDrop, NoLoss, RandomLoss};
use rill_transport::receiver::{ReceiverEvent, ReceiverMachine};
use rill_transport::wire::{DATA_HEADER_LEN, MAX_SEGMENT_LEN};

/// Congestion-controlled UDP file receiver.
#[derive(Parser, Debug)]
#[command(name = "rill-receiver", about = "Congestion-controlled UDP file receiver")]
struct Cli {
    /// UDP port to listen on.
    listen_port: u16,

    /// Output file path, or `-` to discard the payload.
    output_path: String,

    /// Probability of simulated datagram loss, clamped to [0.0, 1.0].
    #[arg(default_value_t = 0.0)]
    loss_probability: f64,

    /// Drop the first datagram whose starting offset equals this value
    /// (replaces probabilistic loss).
    forced_drop_seq: Option<u32>,
}

/// Where accepted payload bytes go.
enum Sink {
    File(BufWriter<File>),
    Null,
}

impl Sink {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Sink::File(w) => w.write_all(data),
            Sink::Null => Ok(()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::File(w) => w.flush(),
            Sink::Null => Ok(()),
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let drop_policy: Box<dyn DropPolicy> = match cli.forced_drop_seq {
        Some(seq) => {
            tracing::info!(seq, "forced drop armed");
            Box::new(ForcedDrop::new(seq))
        }
        None if cli.loss_probability > 0.0 => {
            let policy = RandomLoss::new(cli.loss_probability);
            tracing::info!(p = policy.probability(), "probabilistic loss enabled");
            Box::new(policy)
        }
        None => Box::new(NoLoss),
    };

    let mut sink = if cli.output_path == "-" {
        tracing::info!("output discarded (null sink)");
        Sink::Null
    } else {
        let file = File::create(&cli.output_path)
            .with_context(|| format!("creating output file {}", cli.output_path))?;
        tracing::info!(path = %cli.output_path, "writing output");
        Sink::File(BufWriter::new(file))
    };

    let socket =
        UdpSocket::bind(("0.0.0.0", cli.listen_port)).with_context(|| {
            format!("binding UDP port {}", cli.listen_port)
        })?;
    tracing::info!(port = cli.listen_port, "listening");

    let mut machine = ReceiverMachine::new(drop_policy);
    let mut buf = [0u8; DATA_HEADER_LEN + MAX_SEGMENT_LEN];
    let mut finished = false;

    while !finished {
        let (n, peer) = match socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("receiving datagram"),
        };

        machine.on_datagram(&buf[..n]);
        for event in machine.drain_events() {
            match event {
                ReceiverEvent::Deliver(payload) => {
                    sink.write_all(&payload).context("writing to output sink")?;
                }
                ReceiverEvent::Ack(ack) => {
                    socket
                        .send_to(&ack.encode(), peer)
                        .with_context(|| format!("sending ACK {}", ack.ack))?;
                }
                ReceiverEvent::Finished => finished = true,
            }
        }
    }

    sink.flush().context("flushing output sink")?;

    let stats = machine.stats();
    tracing::info!(
        bytes = stats.bytes_delivered,
        segments = stats.segments_delivered,
        datagrams = stats.datagrams_received,
        dropped = stats.dropped,
        out_of_order = stats.out_of_order,
        malformed = stats.malformed,
        "transfer finished"
    );

    Ok(())
}
