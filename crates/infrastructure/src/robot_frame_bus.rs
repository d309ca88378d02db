//! Cross-process delivery of orchestrator -> robot frames over Redis
//! pub/sub, grounded on `redis_lease_coordinator.rs`'s client handling.
//!
//! `casare-orchestrator-dispatcher` runs in its own process, separate from
//! `casare-orchestrator-api`, so a `JobAssign`/`JobCancel` frame it
//! produces when claiming work on a robot's behalf cannot reach that
//! robot's open websocket directly — the websocket task lives in a
//! different process's memory. This bus is the channel between the two:
//! the dispatcher publishes onto a robot-scoped channel, and the api
//! process's session task for that robot subscribes to it for the
//! lifetime of the connection.

use casare_application::RobotFrame;
use casare_core::{AppError, AppResult};
use casare_domain::RobotId;
use futures_util::StreamExt;
use redis::AsyncCommands;

/// Redis pub/sub implementation of the dispatcher-to-session frame relay.
#[derive(Clone)]
pub struct RedisRobotFrameBus {
    client: redis::Client,
    key_prefix: String,
}

impl RedisRobotFrameBus {
    /// Creates a bus with a configured Redis client and channel prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn channel_for(&self, robot_id: RobotId) -> String {
        format!("{}:{robot_id}", self.key_prefix)
    }

    /// Publishes `frame` onto `robot_id`'s channel. Delivery is
    /// best-effort: if no session is currently subscribed the message is
    /// simply dropped, matching at-least-once job assignment's existing
    /// reliance on lease expiry and reclaim rather than guaranteed frame
    /// delivery.
    pub async fn publish(&self, robot_id: RobotId, frame: &RobotFrame) -> AppResult<()> {
        let payload = serde_json::to_string(frame)
            .map_err(|error| AppError::Internal(format!("failed to encode robot frame: {error}")))?;

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::TransientIO(format!("failed to connect to redis: {error}")))?;

        let _: i64 = connection
            .publish(self.channel_for(robot_id), payload)
            .await
            .map_err(|error| AppError::TransientIO(format!("failed to publish robot frame: {error}")))?;

        Ok(())
    }

    /// Opens a dedicated subscription for `robot_id`. Call once per opened
    /// websocket session and hold the returned subscription for its
    /// lifetime.
    pub async fn subscribe(&self, robot_id: RobotId) -> AppResult<RobotFrameSubscription> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|error| AppError::TransientIO(format!("failed to connect to redis: {error}")))?;

        pubsub
            .subscribe(self.channel_for(robot_id))
            .await
            .map_err(|error| {
                AppError::TransientIO(format!("failed to subscribe to robot channel: {error}"))
            })?;

        Ok(RobotFrameSubscription { pubsub })
    }
}

/// An open subscription to one robot's frame channel.
pub struct RobotFrameSubscription {
    pubsub: redis::aio::PubSub,
}

impl RobotFrameSubscription {
    /// Waits for the next frame, silently skipping any payload that fails
    /// to decode (a peer running a newer/older frame vocabulary should not
    /// be able to kill a session by publishing garbage).
    pub async fn recv(&mut self) -> Option<RobotFrame> {
        loop {
            let message = self.pubsub.on_message().next().await?;
            let Ok(payload) = message.get_payload::<String>() else {
                continue;
            };
            if let Ok(frame) = serde_json::from_str(&payload) {
                return Some(frame);
            }
        }
    }
}
