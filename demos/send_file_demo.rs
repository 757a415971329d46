use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use p2p_core::error::{Error, Result};
use p2p_core::{Handler, Peer};

#[derive(Parser)]
#[clap(name = "send_file_demo")]
struct Args {
    /// Address of the peer to connect to, e.g. 127.0.0.1:9000
    #[clap(long)]
    peer: String,

    /// Path of the file to send
    #[clap(long)]
    file: PathBuf,
}

struct TcpTransport {
    read_half: Mutex<OwnedReadHalf>,
    write_half: Mutex<OwnedWriteHalf>,
}

impl TcpTransport {
    fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        TcpTransport {
            read_half: Mutex::new(read_half),
            write_half: Mutex::new(write_half),
        }
    }
}

#[async_trait]
impl p2p_core::Transport for TcpTransport {
    async fn send(&self, bytes: &[u8]) -> Result<()> {
        let mut w = self.write_half.lock().await;
        w.write_all(bytes).await.map_err(Error::Transport)
    }

    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let mut r = self.read_half.lock().await;
        r.read(buf).await.map_err(Error::Transport)
    }
}

/// Sending side doesn't act on anything it receives; it only pushes one file.
struct SilentHandler;

#[async_trait]
impl Handler for SilentHandler {
    async fn on_reliable_message(&self, _message: Bytes) {}
    async fn on_unreliable_message(&self, _message: Bytes) {}
    async fn on_reliable_stream_message(&self, _message: Bytes, _stream_id: u32) {}
    async fn on_unreliable_stream_message(&self, _message: Bytes, _stream_id: u32) {}
    async fn on_file(&self, _filename: String, _file_data: Bytes) {}
}

fn init_logging() {
    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {} {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .filter(None, log::LevelFilter::Info)
        .init();
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_logging();
    let args = Args::parse();

    log::info!("connecting to {}", args.peer);
    let stream = TcpStream::connect(&args.peer).await?;
    let peer = Peer::new(TcpTransport::new(stream), SilentHandler);

    log::info!("sending {}", args.file.display());
    peer.send_file(&args.file)
        .await
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))?;

    // send_file hands the transfer off to a background task; give it a
    // chance to finish before the process exits.
    tokio::time::sleep(Duration::from_secs(5)).await;
    log::info!("done");
    Ok(())
}
