//! `/ws/robot` — the long-lived duplex session a robot opens after
//! registering over REST. Authentication reuses the same Bearer API key
//! the rest of the control plane requires, applied as the upgrade route's
//! middleware layer: the spec's registration-issued `session_token` and
//! our tenant-scoped API key serve the same purpose here (see DESIGN.md),
//! so a second credential kind was not introduced.
//!
//! Grounded on the teacher's `action_dispatcher.rs` message loop, widened
//! from one-shot request/response to a bidirectional stream with a
//! forwarding task per connection.

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Extension;
use casare_application::RobotFrame;
use casare_core::Principal;
use casare_domain::JobId;
use casare_infrastructure::{decode_frame, encode_frame};
use serde_json::Value;
use tracing::{debug, warn};

use crate::state::AppState;

/// `GET /ws/robot` — upgrades the connection, deferring all protocol
/// handling to `run_session` once the handshake completes.
pub async fn robot_session_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| run_session(socket, state, principal))
}

/// Drives one robot's connection from `Register` through to disconnect.
/// Concurrently pumps three directions: frames pushed through the
/// in-process `RobotSessionRegistry` channel (same-process callers),
/// frames published by `casare-orchestrator-dispatcher` onto this robot's
/// Redis channel (the cross-process path, since the dispatcher is a
/// separate binary and cannot reach this process's memory), and frames
/// the robot itself sends in.
async fn run_session(mut socket: WebSocket, state: AppState, principal: Principal) {
    let robot_id = match await_registration(&mut socket, &state, &principal).await {
        Some(robot_id) => robot_id,
        None => return,
    };

    let mut outbound = state.robot_sessions.connect(robot_id, 64);
    let mut bus_subscription = match state.robot_frame_bus.subscribe(robot_id).await {
        Ok(subscription) => subscription,
        Err(error) => {
            warn!(%error, %robot_id, "failed to subscribe to robot frame bus");
            state.robot_sessions.disconnect(robot_id);
            return;
        }
    };

    // Tracks the lease token handed out with each in-flight `JobAssign`, so
    // a later `JobComplete`/`JobFailed` frame (which does not itself carry
    // the lease token) can still present it to the job queue.
    let mut leases: HashMap<JobId, String> = HashMap::new();

    loop {
        tokio::select! {
            outgoing = outbound.recv() => {
                let Some(frame) = outgoing else { break };
                if !forward_outbound_frame(&mut socket, frame, &mut leases).await {
                    break;
                }
            }
            outgoing = bus_subscription.recv() => {
                let Some(frame) = outgoing else { break };
                if !forward_outbound_frame(&mut socket, frame, &mut leases).await {
                    break;
                }
            }
            incoming = socket.recv() => {
                let Some(incoming) = incoming else { break };
                let Ok(message) = incoming else { break };

                if matches!(message, Message::Close(_)) {
                    break;
                }

                match decode_frame(&message) {
                    Ok(Some(frame)) => {
                        if !handle_inbound_frame(&state, &principal, robot_id, frame, &mut leases).await {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(error) => warn!(%error, "dropping malformed robot frame"),
                }
            }
        }
    }

    state.robot_sessions.disconnect(robot_id);
}

/// Encodes and sends one orchestrator -> robot frame, recording its lease
/// token if it is a `JobAssign`. Returns `false` if the socket should
/// close.
async fn forward_outbound_frame(
    socket: &mut WebSocket,
    frame: RobotFrame,
    leases: &mut HashMap<JobId, String>,
) -> bool {
    if let RobotFrame::JobAssign { job_id, ref lease_token, .. } = frame {
        leases.insert(job_id, lease_token.clone());
    }

    match encode_frame(&frame) {
        Ok(message) => socket.send(message).await.is_ok(),
        Err(error) => {
            warn!(%error, "failed to encode outbound robot frame");
            true
        }
    }
}

/// Waits for the opening `Register` frame, validating that the robot
/// belongs to the authenticated tenant, and acknowledges it. Returns
/// `None` if the socket closed, sent a malformed frame, or the robot does
/// not belong to this tenant, in which case the connection is already
/// terminated.
async fn await_registration(
    socket: &mut WebSocket,
    state: &AppState,
    principal: &Principal,
) -> Option<casare_domain::RobotId> {
    let message = socket.recv().await?.ok()?;
    let frame = decode_frame(&message).ok()??;

    let RobotFrame::Register { robot_id, .. } = frame else {
        let _ = socket
            .send(encode_frame(&RobotFrame::Error {
                message: "first frame on a session must be Register".to_owned(),
            }).ok()?)
            .await;
        return None;
    };

    let owned = state
        .robots
        .find(robot_id)
        .await
        .ok()
        .flatten()
        .filter(|robot| robot.tenant_id() == principal.tenant_id());

    if owned.is_none() {
        let _ = socket
            .send(encode_frame(&RobotFrame::Error {
                message: "robot is not registered for this tenant".to_owned(),
            }).ok()?)
            .await;
        return None;
    }

    let ack = encode_frame(&RobotFrame::RegisterAck { robot_id }).ok()?;
    socket.send(ack).await.ok()?;

    Some(robot_id)
}

/// Applies one inbound (robot -> orchestrator) frame. Returns `false` if
/// the session should close.
async fn handle_inbound_frame(
    state: &AppState,
    principal: &Principal,
    robot_id: casare_domain::RobotId,
    frame: RobotFrame,
    leases: &mut HashMap<JobId, String>,
) -> bool {
    match frame {
        RobotFrame::Heartbeat { job_id, progress_percent, current_node_id, .. } => {
            let heartbeat = casare_domain::Heartbeat::new(
                robot_id,
                job_id,
                progress_percent,
                current_node_id,
                0,
                0.0,
                chrono::Utc::now(),
            );
            match heartbeat {
                Ok(heartbeat) => {
                    if let Err(error) = state.robots.record_heartbeat(heartbeat).await {
                        warn!(%error, "failed to record heartbeat");
                    }
                }
                Err(error) => warn!(%error, "rejected malformed heartbeat"),
            }
        }
        RobotFrame::JobAccept { job_id, correlation_id } => {
            if state.robot_sessions.observe(job_id, correlation_id) {
                if let Some(lease_token) = leases.get(&job_id) {
                    if let Err(error) = state.job_queue.start(job_id, robot_id, lease_token).await {
                        warn!(%error, %job_id, "failed to start accepted job");
                    }
                }
            } else {
                debug!(%job_id, "ignoring replayed JobAccept");
            }
        }
        RobotFrame::JobReject { job_id, correlation_id, reason } => {
            if state.robot_sessions.observe(job_id, correlation_id) {
                leases.remove(&job_id);
                warn!(%job_id, %reason, "robot rejected assigned job");
            }
        }
        RobotFrame::JobProgress { .. } => {}
        RobotFrame::JobComplete { job_id, correlation_id, result } => {
            if state.robot_sessions.observe(job_id, correlation_id) {
                if let Some(lease_token) = leases.remove(&job_id) {
                    match state.job_queue.complete(job_id, robot_id, &lease_token, result).await {
                        Ok(job) => {
                            let _ = state
                                .audit_log
                                .record(
                                    chrono::Utc::now(),
                                    casare_domain::AuditAction::JobCompleted,
                                    casare_domain::ActorRef::Robot { id: robot_id.to_string() },
                                    casare_domain::ResourceRef {
                                        resource_type: "job".to_owned(),
                                        resource_id: job.id().to_string(),
                                    },
                                    Some(principal.tenant_id()),
                                    Value::Null,
                                    None,
                                    None,
                                )
                                .await;
                            state.robot_sessions.forget_job(job_id);
                        }
                        Err(error) => warn!(%error, %job_id, "failed to complete job"),
                    }
                }
            }
        }
        RobotFrame::JobFailed { job_id, correlation_id, error, category } => {
            if state.robot_sessions.observe(job_id, correlation_id) {
                if let Some(lease_token) = leases.remove(&job_id) {
                    match state
                        .job_queue
                        .fail(job_id, robot_id, &lease_token, error.as_str(), category)
                        .await
                    {
                        Ok((job, dlq)) => {
                            let action = if dlq.is_some() {
                                casare_domain::AuditAction::JobDeadLettered
                            } else {
                                casare_domain::AuditAction::JobFailed
                            };
                            let _ = state
                                .audit_log
                                .record(
                                    chrono::Utc::now(),
                                    action,
                                    casare_domain::ActorRef::Robot { id: robot_id.to_string() },
                                    casare_domain::ResourceRef {
                                        resource_type: "job".to_owned(),
                                        resource_id: job.id().to_string(),
                                    },
                                    Some(principal.tenant_id()),
                                    Value::Null,
                                    None,
                                    None,
                                )
                                .await;
                            state.robot_sessions.forget_job(job_id);
                        }
                        Err(error) => warn!(%error, %job_id, "failed to record job failure"),
                    }
                }
            }
        }
        RobotFrame::JobCancelled { job_id, correlation_id } => {
            if state.robot_sessions.observe(job_id, correlation_id) {
                leases.remove(&job_id);
                state.robot_sessions.forget_job(job_id);
            }
        }
        RobotFrame::LogEntry { .. } | RobotFrame::LogBatch { .. } => {}
        RobotFrame::StatusResponse { .. } => {}
        RobotFrame::Disconnect { reason } => {
            debug!(%robot_id, %reason, "robot disconnected gracefully");
            return false;
        }
        RobotFrame::Error { message } => {
            warn!(%robot_id, %message, "robot reported a protocol error");
        }
        // Orchestrator -> robot frames are never received on this side.
        RobotFrame::Register { .. }
        | RobotFrame::RegisterAck { .. }
        | RobotFrame::HeartbeatAck
        | RobotFrame::JobAssign { .. }
        | RobotFrame::JobCancel { .. }
        | RobotFrame::StatusRequest
        | RobotFrame::Pause
        | RobotFrame::Resume
        | RobotFrame::Shutdown { .. } => {
            warn!(%robot_id, "robot sent an orchestrator-originated frame, ignoring");
        }
    }

    true
}
