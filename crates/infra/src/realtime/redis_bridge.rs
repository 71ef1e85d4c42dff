//! Redis pub/sub relay for realtime events (optional).
//!
//! Redis pub/sub is not durable: frames published while an instance is
//! disconnected are lost, which matches the best-effort contract of the
//! fanout channel.

use std::sync::mpsc;
use std::thread;

use redis::Commands;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use assistsync_events::{FanoutChannel, FanoutHub, RealtimeEvent, Room};

use super::{BridgeFrame, resubscribe_delay};

#[derive(Debug, Error)]
pub enum RedisBridgeError {
    #[error("redis: {0}")]
    Redis(String),

    #[error("failed to start relay thread: {0}")]
    Spawn(String),
}

/// Fanout channel that delivers locally and relays to other instances.
#[derive(Debug, Clone)]
pub struct RedisFanoutBridge {
    local: FanoutHub,
    outbound: mpsc::Sender<BridgeFrame>,
    origin: String,
}

impl RedisFanoutBridge {
    /// Start the publisher and subscriber threads.
    pub fn start(
        redis_url: impl AsRef<str>,
        channel: impl Into<String>,
        local: FanoutHub,
    ) -> Result<Self, RedisBridgeError> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(|e| RedisBridgeError::Redis(e.to_string()))?;
        let channel = channel.into();
        let origin = Uuid::now_v7().to_string();

        let (outbound, rx) = mpsc::channel::<BridgeFrame>();
        {
            let client = client.clone();
            let channel = channel.clone();
            thread::Builder::new()
                .name("realtime-relay-pub".to_string())
                .spawn(move || publish_loop(client, channel, rx))
                .map_err(|e| RedisBridgeError::Spawn(e.to_string()))?;
        }
        {
            let hub = local.clone();
            let origin = origin.clone();
            thread::Builder::new()
                .name("realtime-relay-sub".to_string())
                .spawn(move || subscribe_loop(client, channel, origin, hub))
                .map_err(|e| RedisBridgeError::Spawn(e.to_string()))?;
        }

        Ok(Self { local, outbound, origin })
    }

    pub fn local(&self) -> &FanoutHub {
        &self.local
    }
}

impl FanoutChannel for RedisFanoutBridge {
    fn publish_to(&self, rooms: &[Room], event: RealtimeEvent) -> usize {
        let delivered = self.local.publish_to(rooms, event.clone());

        let frame = BridgeFrame {
            origin: self.origin.clone(),
            rooms: rooms.to_vec(),
            event,
        };
        if self.outbound.send(frame).is_err() {
            warn!("realtime relay publisher stopped; event delivered locally only");
        }
        delivered
    }
}

fn publish_loop(client: redis::Client, channel: String, rx: mpsc::Receiver<BridgeFrame>) {
    let mut conn: Option<redis::Connection> = None;

    for frame in rx {
        let payload = match serde_json::to_string(&frame) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "realtime frame not serializable; dropped");
                continue;
            }
        };

        if conn.is_none() {
            conn = client.get_connection().ok();
        }
        let Some(c) = conn.as_mut() else {
            warn!("redis unreachable; realtime frame dropped");
            continue;
        };

        if let Err(e) = c.publish::<_, _, i64>(&channel, payload) {
            warn!(error = %e, "realtime relay publish failed; frame dropped");
            conn = None;
        }
    }
}

fn subscribe_loop(client: redis::Client, channel: String, origin: String, hub: FanoutHub) {
    let mut failures = 0u32;
    loop {
        let err = relay_subscription(&client, &channel, &origin, &hub, &mut failures);
        let delay = resubscribe_delay(failures);
        warn!(error = %err, failures, retry_in = ?delay, "realtime relay subscriber lost; reconnecting");
        failures = failures.saturating_add(1);
        thread::sleep(delay);
    }
}

/// Relay frames until the subscription fails. `failures` is reset once subscribed.
fn relay_subscription(
    client: &redis::Client,
    channel: &str,
    origin: &str,
    hub: &FanoutHub,
    failures: &mut u32,
) -> redis::RedisError {
    let mut conn = match client.get_connection() {
        Ok(c) => c,
        Err(e) => return e,
    };

    let mut pubsub = conn.as_pubsub();
    if let Err(e) = pubsub.subscribe(channel) {
        return e;
    }
    *failures = 0;
    debug!(channel, "realtime relay subscribed");

    loop {
        let msg = match pubsub.get_message() {
            Ok(m) => m,
            Err(e) => return e,
        };

        let payload: String = match msg.get_payload() {
            Ok(p) => p,
            Err(_) => continue,
        };

        let frame: BridgeFrame = match serde_json::from_str(&payload) {
            Ok(f) => f,
            Err(_) => continue,
        };

        if frame.is_foreign(origin) {
            let delivered = hub.publish_to(&frame.rooms, frame.event);
            debug!(delivered, "relayed realtime event");
        }
    }
}
