//! Client-side session state.
//!
//! Two parties touch this state: the reader task writes it as acks and
//! disconnects arrive, the foreground reads it to gate commands. One
//! mutex guards the one shared value.

use std::sync::{Arc, Mutex};

use tokio::io::AsyncRead;
use tokio::task::JoinHandle;

use common::net::FrameReader;

use crate::ui;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
    Authenticated,
    Error,
}

#[derive(Debug)]
pub struct SessionInfo {
    pub state: ClientState,
    pub username: Option<String>,
}

pub type SharedSession = Arc<Mutex<SessionInfo>>;

pub fn new_shared() -> SharedSession {
    Arc::new(Mutex::new(SessionInfo {
        state: ClientState::Disconnected,
        username: None,
    }))
}

pub fn state_of(session: &SharedSession) -> ClientState {
    session.lock().unwrap().state
}

pub fn set_state(session: &SharedSession, state: ClientState) {
    session.lock().unwrap().state = state;
}

pub fn username_of(session: &SharedSession) -> Option<String> {
    session.lock().unwrap().username.clone()
}

/// Drain the receive socket: render every inbound frame and track the
/// session state. This is the connection's second task; the foreground
/// never reads the socket.
pub fn spawn_reader<R>(read_half: R, session: SharedSession) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = FrameReader::new(read_half);
        loop {
            match reader.read_frame().await {
                Ok(Some(frame)) => ui::render_frame(&frame, &session),
                Ok(None) => {
                    println!("*** server closed the connection");
                    set_state(&session, ClientState::Disconnected);
                    break;
                }
                Err(err) => {
                    eprintln!("!!! connection error: {err}");
                    set_state(&session, ClientState::Error);
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::time::timeout;

    #[test]
    fn fresh_session_is_disconnected() {
        let session = new_shared();
        assert_eq!(state_of(&session), ClientState::Disconnected);
        assert!(username_of(&session).is_none());
    }

    #[tokio::test]
    async fn reader_marks_session_disconnected_on_eof() {
        let session = new_shared();
        set_state(&session, ClientState::Connected);

        let (tx, rx) = tokio::io::duplex(64);
        let task = spawn_reader(rx, session.clone());
        drop(tx);

        timeout(Duration::from_secs(1), task)
            .await
            .expect("reader should stop at EOF")
            .expect("reader should not panic");
        assert_eq!(state_of(&session), ClientState::Disconnected);
    }

    #[tokio::test]
    async fn reader_tracks_login_ack() {
        let session = new_shared();
        set_state(&session, ClientState::Connected);
        session.lock().unwrap().username = Some("alice".into());

        let (mut tx, rx) = tokio::io::duplex(256);
        let task = spawn_reader(rx, session.clone());

        tx.write_all(b"OK|server|client|2024-01-15 10:30:00|0|Login successful\n")
            .await
            .unwrap();
        drop(tx);

        timeout(Duration::from_secs(1), task)
            .await
            .expect("reader should stop at EOF")
            .expect("reader should not panic");
        // EOF demotes the session again, but the ack must have promoted
        // it first; the username survives.
        assert_eq!(username_of(&session).as_deref(), Some("alice"));
        assert_eq!(state_of(&session), ClientState::Disconnected);
    }
}
