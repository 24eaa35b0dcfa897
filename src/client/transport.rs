//! TCP transport for the tick driver

use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::info;

use crate::client::driver::{DriverError, SyncTransport};
use crate::net::framing::{read_frame, write_frame};
use crate::net::protocol::{ClientMessage, ServerMessage, SyncResponse};

/// One request in flight at a time over a single framed connection
pub struct TcpSyncTransport {
    stream: TcpStream,
}

impl TcpSyncTransport {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, DriverError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Connect and bind the connection to a save
    ///
    /// Returns the transport and the full initial view.
    pub async fn open(
        addr: impl ToSocketAddrs,
        player: &str,
        save: &str,
    ) -> Result<(Self, SyncResponse), DriverError> {
        let mut transport = Self::connect(addr).await?;
        let reply = transport
            .request(ClientMessage::Open {
                player: player.to_string(),
                save: save.to_string(),
            })
            .await?;
        match reply {
            ServerMessage::Opened(response) => {
                info!("Opened {}:{}", player, save);
                Ok((transport, response))
            }
            other => Err(DriverError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    /// Persist and unload the session, then drop the connection
    pub async fn close(mut self) -> Result<(), DriverError> {
        match self.request(ClientMessage::Close).await? {
            ServerMessage::Closed => Ok(()),
            other => Err(DriverError::UnexpectedResponse(format!("{:?}", other))),
        }
    }
}

impl SyncTransport for TcpSyncTransport {
    async fn request(&mut self, message: ClientMessage) -> Result<ServerMessage, DriverError> {
        write_frame(&mut self.stream, &message).await?;
        Ok(read_frame(&mut self.stream).await?)
    }
}
