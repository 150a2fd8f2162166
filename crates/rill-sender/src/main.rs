//! rill Sender
//!
//! Reads a file, partitions it into MSS-sized segments, and transfers it
//! over UDP under Reno congestion control. All protocol logic lives in
//! `rill-transport`; this binary owns the socket, the clock, and the
//! RTO-bounded receive loop, and closes the stream with a best-effort FIN
//! once every byte is acknowledged.

use std::fs;
use std::io::ErrorKind;
use std::net::UdpSocket;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use quanta::Instant;
use tracing_subscriber::EnvFilter;

use rill_transport::sender::{SenderConfig, SenderMachine};
use rill_transport::stats::TransferReport;
use rill_transport::wire::{AckFrame, ACK_FRAME_LEN};

/// How long to wait for the ACK of the FIN before giving up on it.
const FIN_GRACE: Duration = Duration::from_millis(200);

/// Congestion-controlled UDP file sender.
#[derive(Parser, Debug)]
#[command(name = "rill-sender", about = "Congestion-controlled UDP file sender")]
struct Cli {
    /// Receiver IP address or hostname.
    receiver_addr: String,

    /// Receiver UDP port.
    receiver_port: u16,

    /// Input file to transfer.
    input_path: PathBuf,

    /// Maximum segment size in bytes. Out-of-range values fall back to 1400.
    mss_bytes: i64,

    /// Retransmission timeout in milliseconds (floor 50).
    #[arg(default_value_t = 200)]
    rto_ms: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = SenderConfig::new(
        usize::try_from(cli.mss_bytes).unwrap_or(0),
        Duration::from_millis(cli.rto_ms),
    );

    let data = fs::read(&cli.input_path)
        .with_context(|| format!("reading input file {}", cli.input_path.display()))?;
    let total_bytes = data.len() as u64;

    let socket = UdpSocket::bind("0.0.0.0:0").context("binding local UDP socket")?;
    socket
        .connect((cli.receiver_addr.as_str(), cli.receiver_port))
        .with_context(|| {
            format!(
                "connecting to receiver {}:{}",
                cli.receiver_addr, cli.receiver_port
            )
        })?;

    let mut machine = SenderMachine::new(Bytes::from(data), config.clone());
    let segments = machine.segment_count() as u64;
    let peer = format!("{}:{}", cli.receiver_addr, cli.receiver_port);

    tracing::info!(
        peer = %peer,
        bytes = total_bytes,
        segments,
        mss = config.mss,
        rto_ms = config.rto.as_millis() as u64,
        "starting transfer"
    );

    let started = Instant::now();
    let mut ack_buf = [0u8; ACK_FRAME_LEN];

    while !machine.is_complete() {
        machine.fill_window(Instant::now());
        for frame in machine.drain_output().collect::<Vec<_>>() {
            socket.send(&frame.data).with_context(|| {
                format!("sending data frame seq={} len={}", frame.seq, frame.len)
            })?;
            if frame.is_retransmit {
                tracing::debug!(seq = frame.seq, len = frame.len, "retransmitted");
            } else {
                tracing::debug!(seq = frame.seq, len = frame.len, "sent");
            }
        }

        // Block for an ACK, but never past the retransmission deadline.
        // The timer is armed whenever data is outstanding, which is always
        // the case here; the fallback only guards a spurious wakeup.
        let now = Instant::now();
        let deadline = machine.deadline().unwrap_or(now + config.rto);
        let remaining = deadline.duration_since(now);
        if remaining.is_zero() {
            machine.on_timeout(Instant::now());
            continue;
        }

        socket
            .set_read_timeout(Some(remaining))
            .context("setting socket read deadline")?;
        match socket.recv(&mut ack_buf) {
            Ok(n) => {
                if let Some(ack) = AckFrame::decode(&ack_buf[..n]) {
                    tracing::debug!(ack = ack.ack, "ACK received");
                    machine.on_ack(ack, Instant::now());
                }
                // Short datagrams are not ACKs; ignore them.
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                machine.on_timeout(Instant::now());
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("receiving ACK"),
        }
    }

    // Every byte acknowledged — close with a best-effort FIN. A lost final
    // ACK only costs the grace period; the FIN is not re-driven.
    socket.send(&machine.fin_frame()).context("sending FIN frame")?;
    tracing::debug!(seq = machine.total_bytes(), "FIN sent");
    socket
        .set_read_timeout(Some(FIN_GRACE))
        .context("setting FIN grace deadline")?;
    let _ = socket.recv(&mut ack_buf);

    let report = TransferReport::new(
        total_bytes,
        segments,
        started.elapsed(),
        machine.controller().cwnd(),
        machine.controller().ssthresh(),
        machine.stats().clone(),
    );
    tracing::info!(
        bytes = report.total_bytes,
        segments = report.segments,
        elapsed_secs = report.elapsed_secs,
        throughput_mib_s = report.throughput_mib_s,
        timeouts = report.stats.timeouts,
        fast_retransmits = report.stats.fast_retransmits,
        retransmissions = report.stats.retransmissions,
        final_cwnd = report.final_cwnd as u64,
        final_ssthresh = report.final_ssthresh as u64,
        "transfer complete"
    );

    Ok(())
}
