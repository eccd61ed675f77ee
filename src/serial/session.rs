use std::{
    io,
    sync::{Arc, Mutex, MutexGuard},
};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{ConnectionError, WriteError},
    notify::{emit, NotificationLevel, SharedNotifier},
};

use super::{
    decode::{ChunkDecoder, LineFramer},
    handles::{ReadCanceller, ReadHandle, WriteHandle},
    port::{DeviceInfo, OpenedPort, PortControl, PortProvider, BAUD_RATE},
    state::SessionState,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Callbacks offered to whoever owns a session. Called from the read loop, so
/// implementations must return quickly.
pub trait SessionObserver: Send + Sync {
    fn on_connect(&self, _device: &DeviceInfo) {}
    fn on_disconnect(&self) {}
    fn on_data(&self, _text: &str) {}
}

/// Observer for sessions nobody listens to (the send board is write-only).
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

enum TeardownReason {
    Requested,
    RemoteClosed,
    Fault(String),
}

struct Connection {
    generation: u64,
    stop: CancellationToken,
    read_canceller: ReadCanceller,
    writer: WriteHandle,
    control: Box<dyn PortControl>,
    read_task: JoinHandle<()>,
}

struct SessionInner {
    label: String,
    provider: Arc<dyn PortProvider>,
    observer: Arc<dyn SessionObserver>,
    notifier: SharedNotifier,
    state: Mutex<SessionState>,
    /// Generation whose read loop may still hand data to the observer.
    delivery: Mutex<Option<u64>>,
    /// Cancel signal of the connect attempt in flight, if any.
    pending_connect: Mutex<Option<CancellationToken>>,
    connection: tokio::sync::Mutex<Option<Connection>>,
}

/// One managed connection to one physical port.
///
/// Cloning yields another handle to the same session; the port and its
/// handles are never shared with a different session.
#[derive(Clone)]
pub struct SerialSession {
    inner: Arc<SessionInner>,
}

impl SerialSession {
    pub fn new(
        label: impl Into<String>,
        provider: Arc<dyn PortProvider>,
        observer: Arc<dyn SessionObserver>,
        notifier: SharedNotifier,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                label: label.into(),
                provider,
                observer,
                notifier,
                state: Mutex::new(SessionState::new()),
                delivery: Mutex::new(None),
                pending_connect: Mutex::new(None),
                connection: tokio::sync::Mutex::new(None),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn state(&self) -> SessionState {
        self.lock_state().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.lock_state().is_connected()
    }

    /// Open the port at the fixed baud rate and start the read loop.
    pub async fn connect(&self) -> Result<DeviceInfo, ConnectionError> {
        {
            let mut state = self.lock_state();
            if !state.is_idle() {
                log_warn!("{}: connect ignored, session is {:?}", self.label(), state.status);
                return Err(ConnectionError::AlreadyConnected);
            }
            state.begin_connect();
        }

        let cancel = CancellationToken::new();
        *self.lock_pending_connect() = Some(cancel.clone());
        let opened = self.open_connection(&cancel).await;
        self.lock_pending_connect().take();

        match opened {
            Ok(device) => {
                log_info!("{} connected to {}", self.label(), device.port_name);
                emit(
                    self.inner.notifier.as_ref(),
                    NotificationLevel::Success,
                    format!("{} connected: {device}", self.label()),
                );
                self.inner.observer.on_connect(&device);
                Ok(device)
            }
            Err(ConnectionError::Cancelled) => {
                self.lock_state().disconnected();
                log_info!("{}: connect cancelled before the port opened", self.label());
                emit(
                    self.inner.notifier.as_ref(),
                    NotificationLevel::Info,
                    format!("{} connect cancelled", self.label()),
                );
                self.inner.observer.on_disconnect();
                Err(ConnectionError::Cancelled)
            }
            Err(err) => {
                self.lock_state().disconnected();
                log_error!("{}: connect failed: {err}", self.label());
                emit(
                    self.inner.notifier.as_ref(),
                    NotificationLevel::Error,
                    format!("{} failed to connect: {err}", self.label()),
                );
                self.inner.observer.on_disconnect();
                Err(err)
            }
        }
    }

    /// Tear the connection down. Safe to call at any time, any number of times.
    /// While a connect is still opening the port, that attempt is cancelled
    /// and fails with [`ConnectionError::Cancelled`].
    pub async fn disconnect(&self) {
        self.teardown(None, TeardownReason::Requested).await;
    }

    /// Write one newline-terminated frame.
    pub async fn write(&self, payload: &[u8]) -> Result<(), WriteError> {
        let writer = {
            let guard = self.inner.connection.lock().await;
            guard
                .as_ref()
                .map(|connection| connection.writer.clone())
                .ok_or(WriteError::NotConnected)?
        };

        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.extend_from_slice(payload);
        frame.push(b'\n');

        writer.write(frame).await.map_err(|err| {
            log_error!("{}: write failed: {err}", self.label());
            err
        })
    }

    async fn open_connection(
        &self,
        cancel: &CancellationToken,
    ) -> Result<DeviceInfo, ConnectionError> {
        let provider = self.inner.provider.clone();
        let opened = tokio::task::spawn_blocking(move || provider.request_port(BAUD_RATE))
            .await
            .map_err(|err| ConnectionError::Open {
                port: self.label().to_string(),
                message: format!("port open worker failed: {err}"),
            })??;

        let OpenedPort {
            info,
            reader,
            writer,
            control,
        } = opened;

        let handle_error = |err: io::Error| ConnectionError::Open {
            port: info.port_name.clone(),
            message: err.to_string(),
        };

        let (read_handle, read_canceller) =
            ReadHandle::spawn(reader, self.label()).map_err(handle_error)?;
        let writer = match WriteHandle::spawn(writer, self.label()) {
            Ok(writer) => writer,
            Err(err) => {
                drop(read_handle);
                self.release_port(read_canceller, control).await;
                return Err(handle_error(err));
            }
        };

        let mut slot = self.inner.connection.lock().await;
        // Checked under the slot lock so a concurrent teardown either sees
        // the connection or has already cancelled it.
        if cancel.is_cancelled() {
            drop(slot);
            drop(read_handle);
            if let Err(err) = writer.close().await {
                log_error!("{}: error closing writer: {err}", self.label());
            }
            self.release_port(read_canceller, control).await;
            return Err(ConnectionError::Cancelled);
        }
        let generation = self.lock_state().connected(info.clone());
        *self.lock_delivery() = Some(generation);

        let stop = CancellationToken::new();
        let read_task = tokio::spawn(read_loop(
            self.clone(),
            generation,
            read_handle,
            stop.clone(),
        ));

        *slot = Some(Connection {
            generation,
            stop,
            read_canceller,
            writer,
            control,
            read_task,
        });

        Ok(info)
    }

    /// Hand decoded text to the observer unless the connection it came from
    /// has started tearing down.
    fn deliver(&self, generation: u64, text: &str) -> bool {
        let gate = self.lock_delivery();
        if *gate != Some(generation) {
            return false;
        }
        self.inner.observer.on_data(text);
        true
    }

    async fn teardown(&self, expected_generation: Option<u64>, reason: TeardownReason) {
        let connection = {
            let mut slot = self.inner.connection.lock().await;
            // A read loop may only tear down the connection it belongs to.
            let owned = slot.as_ref().is_some_and(|current| {
                expected_generation.map_or(true, |expected| expected == current.generation)
            });
            if owned {
                slot.take()
            } else {
                if expected_generation.is_none() {
                    if let Some(pending) = self.lock_pending_connect().as_ref() {
                        log_info!("{}: cancelling connect in progress", self.label());
                        pending.cancel();
                    }
                }
                None
            }
        };

        let Some(connection) = connection else {
            log_info!("{}: nothing to disconnect", self.label());
            return;
        };

        *self.lock_delivery() = None;
        connection.stop.cancel();
        connection.read_canceller.cancel();

        if let Err(err) = connection.writer.close().await {
            log_error!("{}: error closing writer: {err}", self.label());
        }

        self.release_port(connection.read_canceller, connection.control)
            .await;

        // The read loop exits on its own once the stop signal is observed.
        drop(connection.read_task);

        if !self.lock_state().disconnected() {
            return;
        }

        let (level, message) = match reason {
            TeardownReason::Requested => (
                NotificationLevel::Info,
                format!("{} disconnected", self.label()),
            ),
            TeardownReason::RemoteClosed => (
                NotificationLevel::Warning,
                format!("{} disconnected: device closed the stream", self.label()),
            ),
            TeardownReason::Fault(detail) => (
                NotificationLevel::Error,
                format!("{} disconnected after read error: {detail}", self.label()),
            ),
        };
        emit(self.inner.notifier.as_ref(), level, message);
        self.inner.observer.on_disconnect();
    }

    /// Wait for the reader thread to drop its handle, then close the port.
    /// The port is opened exclusively, so a reconnect only succeeds once
    /// every clone of the handle is gone.
    async fn release_port(&self, read_canceller: ReadCanceller, control: Box<dyn PortControl>) {
        let label = self.label().to_string();
        let released = tokio::task::spawn_blocking(move || {
            if !read_canceller.join() {
                log_warn!("{label}: reader thread panicked");
            }
            control.close()
        })
        .await;

        match released {
            Ok(Ok(())) => log_info!("{}: port closed", self.label()),
            Ok(Err(err)) => log_error!("{}: error closing port: {err}", self.label()),
            Err(err) => log_error!("{}: port close worker failed: {err}", self.label()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_delivery(&self) -> MutexGuard<'_, Option<u64>> {
        self.inner
            .delivery
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_pending_connect(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.inner
            .pending_connect
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn read_loop(
    session: SerialSession,
    generation: u64,
    mut reader: ReadHandle,
    stop: CancellationToken,
) {
    let mut decoder = ChunkDecoder::new();
    let mut framer = LineFramer::new();

    let ended = loop {
        let next = tokio::select! {
            biased;
            _ = stop.cancelled() => break None,
            next = reader.read() => next,
        };

        match next {
            Ok(Some(bytes)) => match decoder.decode(&bytes) {
                Ok(text) => {
                    let Some(lines) = framer.push(&text) else {
                        continue;
                    };
                    if !session.deliver(generation, &lines) {
                        break None;
                    }
                }
                Err(err) => break Some(TeardownReason::Fault(err.to_string())),
            },
            Ok(None) if stop.is_cancelled() => break None,
            Ok(None) => break Some(TeardownReason::RemoteClosed),
            Err(err) => break Some(TeardownReason::Fault(err.to_string())),
        }
    };

    if !framer.pending().is_empty() {
        log_warn!(
            "{}: dropping unterminated input {:?}",
            session.label(),
            framer.pending()
        );
    }
    // Teardown joins the reader thread, which may be parked on this channel.
    drop(reader);

    if let Some(reason) = ended {
        if let TeardownReason::Fault(detail) = &reason {
            log_error!("{}: read loop fault: {detail}", session.label());
        } else {
            log_info!("{}: stream ended by device", session.label());
        }
        session.teardown(Some(generation), reason).await;
    }

    log_info!("{}: read loop finished (generation {generation})", session.label());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use crate::serial::mock::MockProvider;
    use crate::serial::state::ConnectionStatus;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Debug, PartialEq)]
    enum Event {
        Connected(String),
        Disconnected,
        Data(String),
    }

    struct ChannelObserver(mpsc::UnboundedSender<Event>);

    impl SessionObserver for ChannelObserver {
        fn on_connect(&self, device: &DeviceInfo) {
            let _ = self.0.send(Event::Connected(device.port_name.clone()));
        }

        fn on_disconnect(&self) {
            let _ = self.0.send(Event::Disconnected);
        }

        fn on_data(&self, text: &str) {
            let _ = self.0.send(Event::Data(text.to_string()));
        }
    }

    fn session() -> (
        SerialSession,
        MockProvider,
        RecordingNotifier,
        mpsc::UnboundedReceiver<Event>,
    ) {
        let provider = MockProvider::new();
        let notifier = RecordingNotifier::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let session = SerialSession::new(
            "receive board",
            Arc::new(provider.clone()),
            Arc::new(ChannelObserver(tx)),
            Arc::new(notifier.clone()),
        );
        (session, provider, notifier, rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("observer channel closed")
    }

    #[tokio::test]
    async fn connect_reads_and_forwards_text() {
        let (session, provider, notifier, mut events) = session();

        let device = session.connect().await.unwrap();
        assert_eq!(device.port_name, "mock1");
        assert_eq!(session.state().status, ConnectionStatus::Connected);
        assert_eq!(next_event(&mut events).await, Event::Connected("mock1".into()));

        provider.push("RGB:255,0,0\n");
        assert_eq!(next_event(&mut events).await, Event::Data("RGB:255,0,0\n".into()));

        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, NotificationLevel::Success);
    }

    #[tokio::test]
    async fn second_connect_is_rejected() {
        let (session, _provider, _notifier, _events) = session();
        session.connect().await.unwrap();
        assert!(matches!(
            session.connect().await,
            Err(ConnectionError::AlreadyConnected)
        ));
    }

    #[tokio::test]
    async fn connect_failure_leaves_session_disconnected() {
        let (session, provider, notifier, mut events) = session();
        provider.fail_next(ConnectionError::PermissionDenied("cancelled".into()));

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, ConnectionError::PermissionDenied(_)));
        assert!(session.state().is_idle());
        assert_eq!(next_event(&mut events).await, Event::Disconnected);
        assert_eq!(notifier.messages()[0].0, NotificationLevel::Error);

        // The next attempt goes through.
        session.connect().await.unwrap();
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn write_frames_with_newline() {
        let (session, provider, _notifier, _events) = session();
        session.connect().await.unwrap();

        session.write(b"RGB:1,2,3").await.unwrap();
        session.write(b"ON").await.unwrap();

        assert_eq!(provider.written(), "RGB:1,2,3\nON\n");
    }

    #[tokio::test]
    async fn write_without_connection_fails_until_connected() {
        let (session, provider, _notifier, _events) = session();

        assert!(matches!(
            session.write(b"ON").await,
            Err(WriteError::NotConnected)
        ));

        session.connect().await.unwrap();
        session.write(b"ON").await.unwrap();
        assert_eq!(provider.written(), "ON\n");
    }

    #[tokio::test]
    async fn write_fault_keeps_session_open() {
        let (session, provider, _notifier, _events) = session();
        session.connect().await.unwrap();

        provider.fail_writes(true);
        assert!(matches!(session.write(b"ON").await, Err(WriteError::Io(_))));
        assert!(session.is_connected());

        provider.fail_writes(false);
        session.write(b"OFF").await.unwrap();
        assert_eq!(provider.written(), "OFF\n");
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (session, provider, notifier, mut events) = session();
        session.connect().await.unwrap();
        assert_eq!(next_event(&mut events).await, Event::Connected("mock1".into()));

        session.disconnect().await;
        assert!(session.state().is_idle());
        session.disconnect().await;
        assert!(session.state().is_idle());

        assert_eq!(next_event(&mut events).await, Event::Disconnected);
        assert_eq!(provider.closes(), 1);
        // One for connect, one for the single real disconnect.
        assert_eq!(notifier.messages().len(), 2);
        assert!(matches!(
            session.write(b"ON").await,
            Err(WriteError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn disconnect_without_connect_is_harmless() {
        let (session, provider, notifier, _events) = session();
        session.disconnect().await;
        assert!(session.state().is_idle());
        assert_eq!(provider.closes(), 0);
        assert!(notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn remote_hang_up_tears_session_down() {
        let (session, provider, notifier, mut events) = session();
        session.connect().await.unwrap();
        assert_eq!(next_event(&mut events).await, Event::Connected("mock1".into()));

        provider.hang_up();
        assert_eq!(next_event(&mut events).await, Event::Disconnected);
        assert!(session.state().is_idle());
        assert_eq!(provider.closes(), 1);
        assert_eq!(
            notifier.messages().last().map(|(level, _)| *level),
            Some(NotificationLevel::Warning)
        );
    }

    #[tokio::test]
    async fn invalid_utf8_is_a_read_fault() {
        let (session, provider, notifier, mut events) = session();
        session.connect().await.unwrap();
        assert_eq!(next_event(&mut events).await, Event::Connected("mock1".into()));

        provider.push_bytes(&[0xFF, 0xFE, b'\n']);
        assert_eq!(next_event(&mut events).await, Event::Disconnected);
        assert!(session.state().is_idle());
        assert_eq!(
            notifier.messages().last().map(|(level, _)| *level),
            Some(NotificationLevel::Error)
        );
    }

    #[tokio::test]
    async fn no_data_is_delivered_after_disconnect() {
        let (session, provider, _notifier, mut events) = session();
        session.connect().await.unwrap();
        assert_eq!(next_event(&mut events).await, Event::Connected("mock1".into()));

        session.disconnect().await;
        provider.push("RGB:1,1,1\n");
        assert_eq!(next_event(&mut events).await, Event::Disconnected);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn reconnect_uses_a_fresh_line() {
        let (session, provider, _notifier, mut events) = session();
        session.connect().await.unwrap();
        session.disconnect().await;
        let device = session.connect().await.unwrap();
        assert_eq!(device.port_name, "mock2");
        assert_eq!(provider.opens(), 2);

        // Drain the lifecycle events, then check data flows on the new line.
        assert_eq!(next_event(&mut events).await, Event::Connected("mock1".into()));
        assert_eq!(next_event(&mut events).await, Event::Disconnected);
        assert_eq!(next_event(&mut events).await, Event::Connected("mock2".into()));
        provider.push("hello\n");
        assert_eq!(next_event(&mut events).await, Event::Data("hello\n".into()));
    }

    #[tokio::test]
    async fn report_split_across_reads_is_delivered_whole() {
        let (session, provider, _notifier, mut events) = session();
        session.connect().await.unwrap();
        assert_eq!(next_event(&mut events).await, Event::Connected("mock1".into()));

        provider.push("RGB:25");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(events.try_recv().is_err());

        provider.push("5,0,0\n");
        assert_eq!(next_event(&mut events).await, Event::Data("RGB:255,0,0\n".into()));
    }

    #[tokio::test]
    async fn unterminated_input_does_not_survive_reconnect() {
        let (session, provider, _notifier, mut events) = session();
        session.connect().await.unwrap();
        provider.push("RGB:25");
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.disconnect().await;

        session.connect().await.unwrap();
        provider.push("RGB:0,0,255\n");

        assert_eq!(next_event(&mut events).await, Event::Connected("mock1".into()));
        assert_eq!(next_event(&mut events).await, Event::Disconnected);
        assert_eq!(next_event(&mut events).await, Event::Connected("mock2".into()));
        assert_eq!(next_event(&mut events).await, Event::Data("RGB:0,0,255\n".into()));
    }

    #[tokio::test]
    async fn disconnect_during_connect_cancels_it() {
        let (session, provider, notifier, mut events) = session();
        provider.delay_next_open(Duration::from_millis(200));

        let connecting = tokio::spawn({
            let session = session.clone();
            async move { session.connect().await }
        });
        while session.state().status != ConnectionStatus::Connecting {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        session.disconnect().await;
        let result = connecting.await.unwrap();

        assert!(matches!(result, Err(ConnectionError::Cancelled)));
        assert!(session.state().is_idle());
        assert_eq!(next_event(&mut events).await, Event::Disconnected);
        assert_eq!(provider.opens(), 1);
        assert_eq!(provider.closes(), 1);
        assert!(matches!(
            session.write(b"ON").await,
            Err(WriteError::NotConnected)
        ));
        assert_eq!(
            notifier.messages().last().map(|(level, _)| *level),
            Some(NotificationLevel::Info)
        );

        // The cancel does not linger into the next attempt.
        session.connect().await.unwrap();
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn port_closes_only_after_reader_is_released() {
        let (session, provider, _notifier, mut events) = session();
        session.connect().await.unwrap();
        session.disconnect().await;
        assert_eq!(provider.readers_open_at_close(), vec![0]);

        session.connect().await.unwrap();
        provider.hang_up();
        assert_eq!(next_event(&mut events).await, Event::Connected("mock1".into()));
        assert_eq!(next_event(&mut events).await, Event::Disconnected);
        assert_eq!(next_event(&mut events).await, Event::Connected("mock2".into()));
        assert_eq!(next_event(&mut events).await, Event::Disconnected);
        assert_eq!(provider.readers_open_at_close(), vec![0, 0]);
    }
}
