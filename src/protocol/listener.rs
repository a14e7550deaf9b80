use std::sync::Arc;

use log::{debug, warn};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use crate::center::SignalCenter;

/// Each read is evaluated as one instruction document, mirroring the
/// message-per-write behavior of the external drivers.
const READ_BUFFER_SIZE: usize = 2048;

/// Spawns the accept loop on an already-bound listener. Returns the stop
/// handle; firing (or dropping) it shuts the loop down. In-flight
/// connections finish on their own.
pub fn spawn(center: Arc<SignalCenter>, listener: TcpListener) -> oneshot::Sender<()> {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("instruction connection from {}", peer);
                        tokio::spawn(handle_connection(Arc::clone(&center), stream));
                    }
                    Err(err) => warn!("instruction listener accept failed: {}", err),
                },
            }
        }
        debug!("instruction listener stopped");
    });
    stop_tx
}

async fn handle_connection(center: Arc<SignalCenter>, mut stream: TcpStream) {
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match stream.read(&mut buffer).await {
            Ok(0) => break,
            Ok(read) => {
                let text = String::from_utf8_lossy(&buffer[..read]);
                center.evaluate_instruction_string(text.trim());
            }
            Err(err) => {
                warn!("instruction connection dropped: {}", err);
                break;
            }
        }
    }
}
