//! The lifecycle controller.
//!
//! `Idle → Connecting → Bootstrapped → Reading → Draining → Closed`
//!
//! [`StreamBridge`] owns the stream client and the active flag. `run` connects,
//! bootstraps the consumer group and launches the read loop; `close` clears the
//! flag, waits for the in-flight cycle, disconnects and releases the client.

use async_trait::async_trait;
use std::sync::Arc;
use streambot_core::adapter::{Adapter, BotRuntime};
use streambot_core::config::{BridgeConfig, BridgeOptions};
use streambot_core::error::BridgeError;
use streambot_core::event::{BridgeSignal, SignalBus};
use streambot_core::message::Envelope;
use streambot_core::stream::{NEW_ENTRIES_ONLY, StreamClient};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bootstrap;
use crate::cycle::ReadCycle;
use crate::outbox::{self, PublishMethod};
use crate::reader;

/// Where a bridge is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Idle,
    Connecting,
    Bootstrapped,
    Reading,
    Draining,
    Closed,
}

struct BridgeState {
    client: Option<Arc<dyn StreamClient>>,
    reader: Option<JoinHandle<()>>,
    phase: LifecyclePhase,
}

/// Bridges a bot runtime to an inbox/outbox pair of streams.
pub struct StreamBridge {
    config: BridgeConfig,
    options: BridgeOptions,
    runtime: Arc<dyn BotRuntime>,
    signals: Arc<SignalBus>,
    active: watch::Sender<bool>,
    state: Mutex<BridgeState>,
}

impl StreamBridge {
    pub fn new(
        runtime: Arc<dyn BotRuntime>,
        client: Arc<dyn StreamClient>,
        config: BridgeConfig,
    ) -> Self {
        let (active, _) = watch::channel(false);
        Self {
            config,
            options: BridgeOptions::default(),
            runtime,
            signals: Arc::new(SignalBus::default()),
            active,
            state: Mutex::new(BridgeState {
                client: Some(client),
                reader: None,
                phase: LifecyclePhase::Idle,
            }),
        }
    }

    /// Override loop timings and policies.
    pub fn with_options(mut self, options: BridgeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Observe `connected`, `warning`, `info` and `reply` signals.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BridgeSignal>> {
        self.signals.subscribe()
    }

    pub async fn phase(&self) -> LifecyclePhase {
        self.state.lock().await.phase
    }

    /// Whether the read loop has been asked to keep going.
    pub fn is_reading(&self) -> bool {
        *self.active.borrow()
    }

    async fn client(&self) -> Result<Arc<dyn StreamClient>, BridgeError> {
        let state = self.state.lock().await;
        match &state.client {
            Some(client) if client.is_open() => Ok(client.clone()),
            _ => Err(BridgeError::NotInitialized),
        }
    }

    async fn publish(
        &self,
        method: PublishMethod,
        envelope: &Envelope,
        strings: &[String],
    ) -> Result<(), BridgeError> {
        let client = self.client().await?;
        let entry = outbox::build_outbound(
            method,
            envelope,
            strings,
            &self.config,
            self.options.outbound_format,
            chrono::Utc::now(),
        )?;
        outbox::publish(client.as_ref(), &self.config, &entry).await?;
        Ok(())
    }
}

#[async_trait]
impl Adapter for StreamBridge {
    fn name(&self) -> &str {
        "redis-stream"
    }

    async fn run(&self) -> Result<(), BridgeError> {
        let mut state = self.state.lock().await;
        if state.reader.is_some() {
            debug!("Bridge already running");
            return Ok(());
        }
        let client = state.client.clone().ok_or(BridgeError::NotInitialized)?;

        state.phase = LifecyclePhase::Connecting;
        if !client.is_open() {
            if let Err(e) = client.connect().await {
                state.phase = LifecyclePhase::Idle;
                return Err(e.into());
            }
        }

        bootstrap::ensure_group(
            client.as_ref(),
            &self.signals,
            &self.config.stream_name,
            &self.config.group_name,
            NEW_ENTRIES_ONLY,
        )
        .await;
        bootstrap::trim_stream(
            client.as_ref(),
            &self.signals,
            &self.config.stream_name,
            self.options.trim_max_len,
        )
        .await;
        state.phase = LifecyclePhase::Bootstrapped;

        self.active.send_replace(true);
        let cycle = ReadCycle::new(
            client,
            self.runtime.clone(),
            self.signals.clone(),
            self.config.clone(),
            self.options.clone(),
            self.active.subscribe(),
        );
        state.reader = Some(tokio::spawn(reader::run(
            cycle,
            self.active.subscribe(),
            self.options.backoff,
        )));
        state.phase = LifecyclePhase::Reading;
        drop(state);

        info!(
            stream = %self.config.stream_name,
            group = %self.config.group_name,
            consumer = %self.config.consumer_name,
            "Stream bridge connected"
        );
        self.signals.publish(BridgeSignal::Connected {
            adapter: self.name().to_string(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), BridgeError> {
        // Clear the flag under the lock so a `run` in progress cannot re-arm it.
        // Join without holding the lock: a dispatch in flight may reply.
        let reader = {
            let mut state = self.state.lock().await;
            self.active.send_replace(false);
            if state.reader.is_some() {
                state.phase = LifecyclePhase::Draining;
            }
            state.reader.take()
        };
        if let Some(reader) = reader {
            if let Err(e) = reader.await {
                warn!(error = %e, "Read loop ended abnormally");
            }
        }

        let client = {
            let mut state = self.state.lock().await;
            state.phase = LifecyclePhase::Closed;
            state.client.take()
        };
        if let Some(client) = client {
            if client.is_open() {
                client.disconnect().await?;
            }
            info!("Stream bridge closed");
        }
        Ok(())
    }

    async fn send(&self, envelope: &Envelope, strings: &[String]) -> Result<(), BridgeError> {
        self.publish(PublishMethod::Send, envelope, strings).await
    }

    async fn reply(&self, envelope: &Envelope, strings: &[String]) -> Result<(), BridgeError> {
        self.publish(PublishMethod::Reply, envelope, strings).await?;
        self.signals.publish(BridgeSignal::Reply {
            envelope: envelope.clone(),
            strings: strings.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStreamClient;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use streambot_core::error::{RuntimeError, StreamError};
    use streambot_core::event::BridgeInfo;
    use streambot_core::message::{DomainMessage, User};
    use streambot_core::stream::{InboundEntry, StreamFields};

    #[derive(Default)]
    struct RecordingRuntime {
        seen: StdMutex<Vec<DomainMessage>>,
    }

    #[async_trait]
    impl BotRuntime for RecordingRuntime {
        async fn receive(&self, message: DomainMessage) -> Result<(), RuntimeError> {
            self.seen.lock().unwrap().push(message);
            Ok(())
        }
    }

    /// Memory broker that counts connects and group creations.
    #[derive(Default)]
    struct CountingClient {
        inner: MemoryStreamClient,
        group_creates: AtomicUsize,
        connects: AtomicUsize,
    }

    #[async_trait]
    impl StreamClient for CountingClient {
        async fn connect(&self) -> Result<(), StreamError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.inner.connect().await
        }
        async fn disconnect(&self) -> Result<(), StreamError> {
            self.inner.disconnect().await
        }
        fn is_open(&self) -> bool {
            self.inner.is_open()
        }
        async fn read_group(
            &self,
            key: &str,
            group: &str,
            consumer: &str,
            count: usize,
            block: Duration,
        ) -> Result<Vec<InboundEntry>, StreamError> {
            self.inner.read_group(key, group, consumer, count, block).await
        }
        async fn ack(&self, key: &str, group: &str, id: &str) -> Result<u64, StreamError> {
            self.inner.ack(key, group, id).await
        }
        async fn create_group(&self, key: &str, group: &str, start_id: &str) -> Result<(), StreamError> {
            self.group_creates.fetch_add(1, Ordering::SeqCst);
            self.inner.create_group(key, group, start_id).await
        }
        async fn trim(&self, key: &str, max_len: usize) -> Result<u64, StreamError> {
            self.inner.trim(key, max_len).await
        }
        async fn append(&self, key: &str, entry: &StreamFields) -> Result<String, StreamError> {
            self.inner.append(key, entry).await
        }
    }

    fn config() -> BridgeConfig {
        BridgeConfig {
            stream_name: "inbox".into(),
            outbox_stream_name: "outbox".into(),
            group_name: "g".into(),
            consumer_name: "c1".into(),
        }
    }

    fn fast() -> BridgeOptions {
        BridgeOptions {
            block: Duration::from_millis(20),
            backoff: Duration::from_millis(20),
            ..BridgeOptions::default()
        }
    }

    fn envelope() -> Envelope {
        Envelope::for_message(DomainMessage::text(
            User::new("user1").in_room("general"),
            "hey",
            None,
        ))
    }

    #[tokio::test]
    async fn close_without_run_is_fine() {
        let client = Arc::new(MemoryStreamClient::new());
        let bridge = StreamBridge::new(Arc::new(RecordingRuntime::default()), client.clone(), config());

        bridge.close().await.unwrap();
        bridge.close().await.unwrap();
        assert!(!client.is_open());
        assert_eq!(bridge.phase().await, LifecyclePhase::Closed);
    }

    #[tokio::test]
    async fn send_without_connection_fails_fast() {
        let client = Arc::new(MemoryStreamClient::new());
        let bridge = StreamBridge::new(Arc::new(RecordingRuntime::default()), client.clone(), config());

        let err = bridge.send(&envelope(), &["hi".into()]).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotInitialized));
        let err = bridge.reply(&envelope(), &["hi".into()]).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotInitialized));
        assert!(client.entries("outbox").is_empty());
    }

    #[tokio::test]
    async fn run_connects_bootstraps_and_signals() {
        let client = Arc::new(CountingClient::default());
        let bridge = StreamBridge::new(Arc::new(RecordingRuntime::default()), client.clone(), config())
            .with_options(fast());
        let mut rx = bridge.subscribe();

        bridge.run().await.unwrap();
        assert!(client.is_open());
        assert!(client.inner.has_group("inbox", "g"));
        assert_eq!(client.group_creates.load(Ordering::SeqCst), 1);
        assert_eq!(bridge.phase().await, LifecyclePhase::Reading);
        assert!(bridge.is_reading());
        assert!(matches!(rx.recv().await.unwrap().as_ref(), BridgeSignal::Connected { .. }));

        // Second run is a no-op
        bridge.run().await.unwrap();
        assert_eq!(client.group_creates.load(Ordering::SeqCst), 1);
        assert_eq!(client.connects.load(Ordering::SeqCst), 1);

        bridge.close().await.unwrap();
        assert!(!client.is_open());
        assert!(!bridge.is_reading());
        assert_eq!(bridge.phase().await, LifecyclePhase::Closed);
    }

    #[tokio::test]
    async fn preexisting_group_does_not_abort_startup() {
        let client = Arc::new(CountingClient::default());
        client.inner.connect().await.unwrap();
        client.inner.create_group("inbox", "g", NEW_ENTRIES_ONLY).await.unwrap();

        let bridge = StreamBridge::new(Arc::new(RecordingRuntime::default()), client.clone(), config())
            .with_options(fast());
        let mut rx = bridge.subscribe();

        bridge.run().await.unwrap();
        assert_eq!(client.group_creates.load(Ordering::SeqCst), 1);
        // Already open, so no reconnect
        assert_eq!(client.connects.load(Ordering::SeqCst), 0);

        match rx.recv().await.unwrap().as_ref() {
            BridgeSignal::Info(BridgeInfo::GroupCreateFailed { already_exists, .. }) => {
                assert!(*already_exists)
            }
            other => panic!("expected info first, got {other:?}"),
        }
        assert!(matches!(rx.recv().await.unwrap().as_ref(), BridgeSignal::Connected { .. }));
        bridge.close().await.unwrap();
    }

    #[tokio::test]
    async fn run_after_close_is_not_initialized() {
        let bridge = StreamBridge::new(
            Arc::new(RecordingRuntime::default()),
            Arc::new(MemoryStreamClient::new()),
            config(),
        )
        .with_options(fast());
        bridge.run().await.unwrap();
        bridge.close().await.unwrap();
        assert!(matches!(bridge.run().await, Err(BridgeError::NotInitialized)));
    }

    #[tokio::test]
    async fn send_appends_without_reply_signal() {
        let client = Arc::new(MemoryStreamClient::new());
        let bridge = StreamBridge::new(Arc::new(RecordingRuntime::default()), client.clone(), config())
            .with_options(fast());
        bridge.run().await.unwrap();
        let mut rx = bridge.subscribe();

        bridge.send(&envelope(), &["hi".into()]).await.unwrap();
        let out = client.entries("outbox");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].field("method"), Some("send"));
        assert_eq!(out[0].field("strings"), Some("hi"));
        assert!(rx.try_recv().is_err());

        bridge.reply(&envelope(), &["yo".into(), "there".into()]).await.unwrap();
        assert_eq!(client.entries("outbox")[1].field("method"), Some("reply"));
        match rx.try_recv().unwrap().as_ref() {
            BridgeSignal::Reply { strings, envelope } => {
                assert_eq!(strings.join(" "), "yo there");
                assert_eq!(envelope.room.as_deref(), Some("general"));
            }
            other => panic!("expected reply signal, got {other:?}"),
        }

        bridge.close().await.unwrap();
    }

    /// A runtime that takes a while per message.
    struct SlowRuntime {
        delay: Duration,
        finished: AtomicUsize,
    }

    #[async_trait]
    impl BotRuntime for SlowRuntime {
        async fn receive(&self, _message: DomainMessage) -> Result<(), RuntimeError> {
            tokio::time::sleep(self.delay).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn close_drains_in_flight_dispatch() {
        let client = Arc::new(MemoryStreamClient::new());
        let runtime = Arc::new(SlowRuntime {
            delay: Duration::from_millis(200),
            finished: AtomicUsize::new(0),
        });
        let bridge = StreamBridge::new(runtime.clone(), client.clone(), config()).with_options(fast());
        bridge.run().await.unwrap();

        let mut entry = StreamFields::default();
        entry.push("kind", "InboxEnvelope");
        entry.push("body", "slow one");
        client.append("inbox", &entry).await.unwrap();

        // Let the loop pick it up and enter dispatch
        tokio::time::sleep(Duration::from_millis(50)).await;
        bridge.close().await.unwrap();

        assert_eq!(runtime.finished.load(Ordering::SeqCst), 1);
        assert!(!client.is_open());
    }

    /// Memory broker whose connect takes a while.
    struct SlowConnectClient {
        inner: MemoryStreamClient,
        delay: Duration,
    }

    #[async_trait]
    impl StreamClient for SlowConnectClient {
        async fn connect(&self) -> Result<(), StreamError> {
            tokio::time::sleep(self.delay).await;
            self.inner.connect().await
        }
        async fn disconnect(&self) -> Result<(), StreamError> {
            self.inner.disconnect().await
        }
        fn is_open(&self) -> bool {
            self.inner.is_open()
        }
        async fn read_group(
            &self,
            key: &str,
            group: &str,
            consumer: &str,
            count: usize,
            block: Duration,
        ) -> Result<Vec<InboundEntry>, StreamError> {
            self.inner.read_group(key, group, consumer, count, block).await
        }
        async fn ack(&self, key: &str, group: &str, id: &str) -> Result<u64, StreamError> {
            self.inner.ack(key, group, id).await
        }
        async fn create_group(&self, key: &str, group: &str, start_id: &str) -> Result<(), StreamError> {
            self.inner.create_group(key, group, start_id).await
        }
        async fn trim(&self, key: &str, max_len: usize) -> Result<u64, StreamError> {
            self.inner.trim(key, max_len).await
        }
        async fn append(&self, key: &str, entry: &StreamFields) -> Result<String, StreamError> {
            self.inner.append(key, entry).await
        }
    }

    #[tokio::test]
    async fn close_during_connect_stops_the_loop() {
        let client = Arc::new(SlowConnectClient {
            inner: MemoryStreamClient::new(),
            delay: Duration::from_millis(200),
        });
        let bridge = Arc::new(
            StreamBridge::new(Arc::new(RecordingRuntime::default()), client.clone(), config())
                .with_options(fast()),
        );

        let starting = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.run().await }
        });
        // Close while run is still connecting
        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::time::timeout(Duration::from_secs(3), bridge.close())
            .await
            .expect("close returns while run is connecting")
            .unwrap();

        starting.await.unwrap().unwrap();
        assert!(!bridge.is_reading());
        assert_eq!(bridge.phase().await, LifecyclePhase::Closed);
        assert!(!client.is_open());

        // A closed bridge cannot be restarted
        let err = bridge.run().await.unwrap_err();
        assert!(matches!(err, BridgeError::NotInitialized));
    }

    #[tokio::test]
    async fn lost_connection_backs_off_and_close_still_returns() {
        let client = Arc::new(MemoryStreamClient::new());
        let bridge = StreamBridge::new(Arc::new(RecordingRuntime::default()), client.clone(), config())
            .with_options(fast());
        bridge.run().await.unwrap();

        client.disconnect().await.unwrap();
        // Single-threaded runtime: a loop that never yields would starve this sleep
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(bridge.is_reading());

        tokio::time::timeout(Duration::from_secs(3), bridge.close())
            .await
            .expect("close returns after the connection dropped")
            .unwrap();
        assert_eq!(bridge.phase().await, LifecyclePhase::Closed);
    }
}
