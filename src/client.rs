use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::PipelineConfig;
use crate::conflation::BackpressurePolicy;
use crate::error::{FeedError, TransportError};
use crate::network::{FeedSubscriber, Subscriber};
use crate::pipeline::{Pipeline, PipelineEvent};
use crate::sink::SinkRegistry;

enum Control {
    Reconnect(oneshot::Sender<Result<(), TransportError>>),
    DiscardBacklog(oneshot::Sender<usize>),
    Shutdown,
}

/// Handle to a running pipeline.
///
/// One background task owns the [`Pipeline`] and alternates between the
/// poll and flush schedules; this handle only talks to it through channels.
pub struct FeedClient {
    control: mpsc::Sender<Control>,
    policy: watch::Sender<BackpressurePolicy>,
    events: broadcast::Receiver<PipelineEvent>,
    task: Option<JoinHandle<()>>,
}

impl FeedClient {
    /// Connect to `config.feed_url` and start the scheduler.
    ///
    /// A feed that cannot be reached is not fatal: the pipeline starts
    /// disconnected and waits for [`reconnect`](Self::reconnect).
    pub async fn start(config: PipelineConfig, sinks: SinkRegistry) -> Result<Self, FeedError> {
        Url::parse(&config.feed_url)?;

        let subscriber = FeedSubscriber::new(config.feed_capacity)
            .with_connect_timeout(config.connect_timeout());
        let mut pipeline = Pipeline::new(&config, subscriber, sinks)?;
        let events = pipeline.subscribe();

        if let Err(e) = pipeline.connect(&config.feed_url).await {
            warn!("Starting disconnected: {}", e);
        }

        Ok(Self::spawn_with_events(&config, pipeline, events))
    }

    /// Start the scheduler around an already assembled pipeline.
    pub fn spawn<S>(config: &PipelineConfig, pipeline: Pipeline<S>) -> Self
    where
        S: Subscriber + 'static,
    {
        let events = pipeline.subscribe();
        Self::spawn_with_events(config, pipeline, events)
    }

    fn spawn_with_events<S>(
        config: &PipelineConfig,
        pipeline: Pipeline<S>,
        events: broadcast::Receiver<PipelineEvent>,
    ) -> Self
    where
        S: Subscriber + 'static,
    {
        let (control_tx, control_rx) = mpsc::channel(16);
        let (policy_tx, policy_rx) = watch::channel(config.backpressure);

        let task = tokio::spawn(run(
            pipeline,
            control_rx,
            policy_rx,
            config.poll_interval(),
            config.flush_interval(),
        ));
        info!(
            "Feed scheduler started (poll {:?}, flush {:?}, {})",
            config.poll_interval(),
            config.flush_interval(),
            config.backpressure
        );

        Self {
            control: control_tx,
            policy: policy_tx,
            events,
            task: Some(task),
        }
    }

    /// A new receiver for pipeline events.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.resubscribe()
    }

    pub fn policy(&self) -> BackpressurePolicy {
        *self.policy.borrow()
    }

    /// Swap the backpressure policy. Takes effect on the next poll tick.
    pub fn set_policy(&self, policy: BackpressurePolicy) -> Result<(), FeedError> {
        policy.validate()?;
        self.policy
            .send(policy)
            .map_err(|_| FeedError::ChannelClosed)?;
        info!("Backpressure policy set to {}", policy);
        Ok(())
    }

    pub async fn reconnect(&self) -> Result<(), FeedError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Control::Reconnect(reply_tx)).await?;
        reply_rx.await.map_err(|_| FeedError::ChannelClosed)??;
        Ok(())
    }

    /// Drop everything queued on the feed. Returns how many were dropped.
    pub async fn discard_backlog(&self) -> Result<usize, FeedError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Control::DiscardBacklog(reply_tx)).await?;
        reply_rx.await.map_err(|_| FeedError::ChannelClosed)
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the scheduler, close the subscriber and wait for the task.
    pub async fn shutdown(mut self) -> Result<(), FeedError> {
        // Already stopped is fine.
        let _ = self.control.send(Control::Shutdown).await;
        if let Some(task) = self.task.take() {
            task.await.map_err(|e| {
                warn!("Feed scheduler ended abnormally: {}", e);
                FeedError::ChannelClosed
            })?;
        }
        Ok(())
    }

    async fn send(&self, command: Control) -> Result<(), FeedError> {
        self.control
            .send(command)
            .await
            .map_err(|_| FeedError::ChannelClosed)
    }
}

impl Drop for FeedClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run<S: Subscriber>(
    mut pipeline: Pipeline<S>,
    mut control: mpsc::Receiver<Control>,
    policy: watch::Receiver<BackpressurePolicy>,
    poll_every: Duration,
    flush_every: Duration,
) {
    let mut poll = interval(poll_every);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut flush = interval(flush_every);
    flush.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            command = control.recv() => match command {
                Some(Control::Reconnect(reply)) => {
                    let _ = reply.send(pipeline.reconnect().await);
                }
                Some(Control::DiscardBacklog(reply)) => {
                    let _ = reply.send(pipeline.discard_backlog());
                }
                Some(Control::Shutdown) | None => break,
            },
            _ = poll.tick() => {
                let current = *policy.borrow();
                pipeline.poll_tick(&current);
            }
            _ = flush.tick() => {
                pipeline.flush_tick();
            }
        }
    }

    pipeline.close();
    debug!("Feed scheduler stopped: {:?}", pipeline.stats());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{ConnectionState, Frame};
    use crate::sink::{DisplaySink, SinkConfig};
    use futures::SinkExt;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;

    fn rpm_frame(rpm: u32) -> String {
        json!({
            "type": "decoded",
            "timestamp": 1.0,
            "id_hex": "0x100",
            "name": "Engine",
            "data": { "rpm": rpm, "coolant_temp": 85 },
        })
        .to_string()
    }

    fn registry() -> SinkRegistry {
        let sinks = [
            SinkConfig::gauge("RPM", 0.0, 8000.0, ["rpm"]),
            SinkConfig::gauge("Coolant", 0.0, 150.0, ["coolant_temp"]),
        ];
        SinkRegistry::from_configs(&sinks, Default::default(), |_: &DisplaySink| {}).unwrap()
    }

    async fn next_applied(
        events: &mut broadcast::Receiver<PipelineEvent>,
        signal: &str,
    ) -> Option<f64> {
        timeout(Duration::from_secs(5), async {
            loop {
                match events.recv().await {
                    Ok(PipelineEvent::SignalApplied { name, value, .. }) if name == signal => {
                        return Some(value)
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .await
        .ok()
        .flatten()
    }

    fn spawned(frames: &[String]) -> (mpsc::Sender<Frame>, FeedClient) {
        let config = PipelineConfig::default();
        let (tx, subscriber) = FeedSubscriber::from_channel(64);
        for f in frames {
            tx.try_send(Frame::Text(f.clone())).unwrap();
        }
        let pipeline = Pipeline::new(&config, subscriber, registry()).unwrap();
        (tx, FeedClient::spawn(&config, pipeline))
    }

    #[tokio::test]
    async fn test_scheduler_applies_immediate_and_buffered() {
        let frames: Vec<_> = [1000, 3000, 5000].into_iter().map(rpm_frame).collect();
        let (_tx, client) = spawned(&frames);
        let mut events = client.subscribe();

        assert_eq!(next_applied(&mut events, "rpm").await, Some(5000.0));
        // Buffered, applied on a flush tick.
        assert_eq!(next_applied(&mut events, "coolant_temp").await, Some(85.0));
        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_set_policy() {
        let (_tx, client) = spawned(&[]);
        let bounded = BackpressurePolicy::Bounded { max_per_tick: 5 };
        client.set_policy(bounded).unwrap();
        assert_eq!(client.policy(), bounded);

        assert!(client
            .set_policy(BackpressurePolicy::Bounded { max_per_tick: 0 })
            .is_err());
        assert_eq!(client.policy(), bounded);
        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnect_without_endpoint_reports_transport_error() {
        let (_tx, client) = spawned(&[]);
        assert!(matches!(
            client.reconnect().await,
            Err(FeedError::Transport(_))
        ));
        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_event_stream() {
        let (_tx, client) = spawned(&[]);
        let mut events = client.subscribe();
        assert!(client.is_running());
        client.shutdown().await.unwrap();

        let mut saw_closed = false;
        while let Ok(event) = events.try_recv() {
            if event == PipelineEvent::ConnectionChanged(ConnectionState::Closed) {
                saw_closed = true;
            }
        }
        assert!(saw_closed);
    }

    #[tokio::test]
    async fn test_start_rejects_bad_url() {
        let config = PipelineConfig::builder().feed_url("not a url").build();
        assert!(matches!(
            FeedClient::start(config, registry()).await,
            Err(FeedError::UrlParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_start_against_silent_feed_is_bounded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let config = PipelineConfig::builder()
            .feed_url(format!("ws://{}", addr))
            .connect_timeout_ms(200)
            .build();
        let client = timeout(Duration::from_secs(3), FeedClient::start(config, registry()))
            .await
            .expect("start must not hang")
            .unwrap();
        assert!(client.is_running());

        let reconnect = timeout(Duration::from_secs(3), client.reconnect())
            .await
            .expect("reconnect must not hang");
        assert!(matches!(reconnect, Err(FeedError::Transport(TransportError::Connect(_)))));
        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_over_websocket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(rpm_frame(2500).into())).await.unwrap();
            // Keep the feed open until the client goes away.
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let config = PipelineConfig::builder()
            .feed_url(format!("ws://{}", addr))
            .build();
        let client = FeedClient::start(config, registry()).await.unwrap();
        let mut events = client.subscribe();

        assert_eq!(next_applied(&mut events, "rpm").await, Some(2500.0));
        client.shutdown().await.unwrap();
    }
}
