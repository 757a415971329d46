use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use p2p_core::error::{Error, Result};
use p2p_core::{Handler, Peer};

#[derive(Parser)]
#[clap(name = "recv_file_demo")]
struct Args {
    /// Address to listen on, e.g. 0.0.0.0:9000
    #[clap(long)]
    bind: String,

    /// Directory received files are written into
    #[clap(long, default_value = ".")]
    out_dir: PathBuf,
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

struct FileWritingHandler {
    out_dir: PathBuf,
}

#[async_trait]
impl Handler for FileWritingHandler {
    async fn on_reliable_message(&self, message: Bytes) {
        log::info!("reliable message ({} bytes)", message.len());
    }

    async fn on_unreliable_message(&self, message: Bytes) {
        log::info!("unreliable message ({} bytes)", message.len());
    }

    async fn on_reliable_stream_message(&self, message: Bytes, stream_id: u32) {
        log::info!("reliable stream {stream_id} message ({} bytes)", message.len());
    }

    async fn on_unreliable_stream_message(&self, message: Bytes, stream_id: u32) {
        log::info!("unreliable stream {stream_id} message ({} bytes)", message.len());
    }

    async fn on_file(&self, filename: String, file_data: Bytes) {
        let dest = self.out_dir.join(&filename);
        match tokio::fs::write(&dest, &file_data).await {
            Ok(()) => log::info!("wrote {} ({} bytes)", dest.display(), file_data.len()),
            Err(err) => log::warn!("failed to write {}: {err}", dest.display()),
        }
    }
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

    let listener = TcpListener::bind(&args.bind).await?;
    log::info!("listening on {}", args.bind);

    let (stream, addr) = listener.accept().await?;
    log::info!("accepted connection from {addr}");

    let handler = FileWritingHandler {
        out_dir: args.out_dir,
    };
    let _peer = Peer::new(TcpTransport::new(stream), handler);

    // the peer's listener task runs in the background; keep the process
    // alive to receive files until interrupted.
    std::future::pending::<()>().await;
    Ok(())
}
