use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use uuid::Uuid;

use crate::codec::FrameCodec;
use crate::frame::{Error, Frame};

/// One client connection. Bytes read from the socket are buffered by the codec until a whole
/// frame can be parsed, and frames that arrive in a single read are handed out one at a time.
pub struct Connection {
    pub id: Uuid,
    pub client_address: SocketAddr,
    framed: Framed<TcpStream, FrameCodec>,
}

impl Connection {
    pub fn new(stream: TcpStream, client_address: SocketAddr, codec: FrameCodec) -> Connection {
        Connection {
            id: Uuid::new_v4(),
            client_address,
            // Allocate the read buffer with 4kb of capacity.
            framed: Framed::with_capacity(stream, codec, 4096),
        }
    }

    /// Reads the next request frame. `None` means the client closed the connection between two
    /// frames.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, Error> {
        self.framed.next().await.transpose()
    }

    /// Encodes `frame` and flushes it to the socket.
    pub async fn write_frame(&mut self, frame: Frame) -> Result<(), Error> {
        self.framed.send(frame).await
    }
}
