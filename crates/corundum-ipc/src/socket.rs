//! UNIX-domain sockets.
//!
//! A minimal, no_std-friendly rendition: `bind`/`connect` operate on a fixed
//! path buffer rather than walking the VFS, and a listening socket's accept
//! queue is a small bounded array rather than a heap-allocated queue.

use corundum_core::sync::Mutex;
use planck_noalloc::vec::ArrayVec;

use crate::fifo::Fifo;

/// Maximum length of a UNIX socket path.
pub const MAX_SOCK_PATH: usize = 108;

/// Maximum number of pending connections a listening socket will queue.
pub const MAX_BACKLOG: usize = 16;

/// Status returned by socket operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketStatus {
    /// Operation completed successfully.
    PlainSuccess,
    /// The socket is not in the right state for this operation (e.g.
    /// `connect` on a listening socket).
    IsBadType,
    /// A non-blocking operation would otherwise have had to wait.
    WouldBlock,
}

/// A socket's connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SockState {
    Unbound,
    Bound,
    Listening,
    Connected,
}

struct BoundPath {
    buf: [u8; MAX_SOCK_PATH],
    len: u8,
}

impl BoundPath {
    const EMPTY: Self = Self {
        buf: [0; MAX_SOCK_PATH],
        len: 0,
    };

    fn set(&mut self, path: &str) -> bool {
        if path.len() > MAX_SOCK_PATH {
            return false;
        }
        self.buf[..path.len()].copy_from_slice(path.as_bytes());
        self.len = path.len() as u8;
        true
    }

    fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len as usize]).unwrap_or("")
    }
}

/// A UNIX-domain socket.
///
/// Data transfer on a connected pair reuses [`Fifo`] in each direction,
/// matching how this kernel already models any other byte-stream endpoint.
pub struct Socket {
    state: Mutex<SockState>,
    path: Mutex<BoundPath>,
    backlog: Mutex<ArrayVec<(), MAX_BACKLOG>>,
    max_backlog: Mutex<usize>,
    to_peer: Fifo,
    from_peer: Fifo,
}

impl Socket {
    /// Creates a new, unbound socket.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SockState::Unbound),
            path: Mutex::new(BoundPath::EMPTY),
            backlog: Mutex::new(ArrayVec::new()),
            max_backlog: Mutex::new(0),
            to_peer: Fifo::new(),
            from_peer: Fifo::new(),
        }
    }

    /// Binds the socket to `path`. Fails with [`SocketStatus::IsBadType`] if
    /// already bound or connected.
    pub fn bind(&self, path: &str) -> Result<(), SocketStatus> {
        let mut state = self.state.lock();
        if *state != SockState::Unbound {
            return Err(SocketStatus::IsBadType);
        }
        if !self.path.lock().set(path) {
            return Err(SocketStatus::IsBadType);
        }
        *state = SockState::Bound;
        Ok(())
    }

    /// Marks a bound socket as listening, accepting up to `backlog`
    /// queued connections.
    pub fn listen(&self, backlog: usize) -> Result<(), SocketStatus> {
        let mut state = self.state.lock();
        if *state != SockState::Bound {
            return Err(SocketStatus::IsBadType);
        }
        *self.max_backlog.lock() = backlog.min(MAX_BACKLOG);
        *state = SockState::Listening;
        Ok(())
    }

    /// Connects to a listening socket at `path`. This minimal model accepts
    /// the connection immediately if `peer` is listening and has queue room.
    pub fn connect(&self, peer: &Socket) -> Result<(), SocketStatus> {
        {
            let state = self.state.lock();
            if *state == SockState::Listening || *state == SockState::Connected {
                return Err(SocketStatus::IsBadType);
            }
        }

        let mut peer_state = peer.state.lock();
        if *peer_state != SockState::Listening {
            return Err(SocketStatus::IsBadType);
        }

        let mut backlog = peer.backlog.lock();
        if backlog.try_push(()).is_err() {
            return Err(SocketStatus::WouldBlock);
        }
        drop(backlog);
        drop(peer_state);

        let mut state = self.state.lock();
        *state = SockState::Connected;

        Ok(())
    }

    /// Dequeues one pending connection, returning a fresh connected socket
    /// on this end. Returns [`SocketStatus::WouldBlock`] if the backlog is
    /// empty and `blocking` is false.
    pub fn accept(&self, blocking: bool) -> Result<Socket, SocketStatus> {
        loop {
            {
                let state = self.state.lock();
                if *state != SockState::Listening {
                    return Err(SocketStatus::IsBadType);
                }
                let mut backlog = self.backlog.lock();
                if backlog.pop().is_some() {
                    let accepted = Socket::new();
                    *accepted.state.lock() = SockState::Connected;
                    return Ok(accepted);
                }
            }
            if !blocking {
                return Err(SocketStatus::WouldBlock);
            }
            core::hint::spin_loop();
        }
    }

    /// Sends bytes to the connected peer.
    pub fn send(&self, buf: &[u8], blocking: bool) -> Result<usize, SocketStatus> {
        if *self.state.lock() != SockState::Connected {
            return Err(SocketStatus::IsBadType);
        }
        self.to_peer.write(buf, blocking).map_err(|_| SocketStatus::WouldBlock)
    }

    /// Receives bytes from the connected peer.
    pub fn recv(&self, buf: &mut [u8], blocking: bool) -> Result<usize, SocketStatus> {
        if *self.state.lock() != SockState::Connected {
            return Err(SocketStatus::IsBadType);
        }
        self.from_peer.read(buf, blocking).map_err(|_| SocketStatus::WouldBlock)
    }
}

impl Default for Socket {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_then_listen_succeeds() {
        let sock = Socket::new();
        assert_eq!(sock.bind("/tmp/s"), Ok(()));
        assert_eq!(sock.listen(4), Ok(()));
    }

    #[test]
    fn listen_before_bind_is_bad_type() {
        let sock = Socket::new();
        assert_eq!(sock.listen(4), Err(SocketStatus::IsBadType));
    }

    #[test]
    fn connect_to_listening_peer_fills_backlog() {
        let server = Socket::new();
        server.bind("/tmp/s").unwrap();
        server.listen(1).unwrap();

        let client = Socket::new();
        assert_eq!(client.connect(&server), Ok(()));
    }

    #[test]
    fn connect_to_non_listening_peer_fails() {
        let server = Socket::new();
        let client = Socket::new();
        assert_eq!(client.connect(&server), Err(SocketStatus::IsBadType));
    }

    #[test]
    fn accept_without_pending_connection_would_block() {
        let server = Socket::new();
        server.bind("/tmp/s").unwrap();
        server.listen(1).unwrap();
        assert_eq!(server.accept(false), Err(SocketStatus::WouldBlock));
    }

    #[test]
    fn accept_dequeues_pending_connection() {
        let server = Socket::new();
        server.bind("/tmp/s").unwrap();
        server.listen(1).unwrap();
        let client = Socket::new();
        client.connect(&server).unwrap();

        let accepted = server.accept(false).unwrap();
        assert_eq!(accepted.send(b"hi", true), Ok(2));
    }
}
