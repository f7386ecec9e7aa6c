//! SessionActor — single mailbox in front of the session engine.
//!
//! Every connect, submit and disconnect goes through this actor, so
//! coordinator state is only ever touched by one event at a time: two
//! near-simultaneous last submissions cannot double-advance a round.
//! WebSocket tasks cast events in; the actor performs the outbound
//! sends through the connection registry.

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use shared_types::{DecisionMessage, ParticipantId};
use tokio::sync::mpsc::UnboundedSender;

use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::session::{Outbound, Session, SubmitOutcome};

#[derive(Debug, Default)]
pub struct SessionActor;

pub struct SessionArguments {
    pub session: Session,
}

pub struct SessionActorState {
    session: Session,
    registry: ConnectionRegistry,
}

/// Messages handled by SessionActor.
pub enum SessionMsg {
    /// A WebSocket opened; register its outbound channel.
    Attach {
        connection: ConnectionId,
        sender: UnboundedSender<axum::extract::ws::Message>,
    },
    /// Inbound CONNECT frame.
    Connect {
        connection: ConnectionId,
        participant_id: Option<ParticipantId>,
    },
    /// Inbound SUBMIT_DECISION frame.
    Submit { message: DecisionMessage },
    /// The WebSocket closed.
    Disconnect { connection: ConnectionId },
    /// Decision-log export for the HTTP surface.
    ExportDecisions { reply: RpcReplyPort<String> },
}

impl SessionActorState {
    fn deliver(&self, outbound: Vec<Outbound>) {
        for frame in outbound {
            let Some(connection) = frame.connection else {
                // Participant offline: the frame stays cached as their
                // last payload and is replayed on reconnect.
                continue;
            };
            if !self.registry.send(&connection, frame.text) {
                tracing::debug!(%connection, "dropped frame for closed connection");
            }
        }
    }
}

#[async_trait]
impl Actor for SessionActor {
    type Msg = SessionMsg;
    type State = SessionActorState;
    type Arguments = SessionArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            actor_id = %myself.get_id(),
            capacity = args.session.capacity(),
            "SessionActor starting"
        );
        Ok(SessionActorState {
            session: args.session,
            registry: ConnectionRegistry::new(),
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SessionMsg::Attach { connection, sender } => {
                state.registry.register(connection, sender);
                tracing::debug!(%connection, live = state.registry.len(), "connection attached");
            }
            SessionMsg::Connect {
                connection,
                participant_id,
            } => {
                // A refused connect produces no outbound frames at all:
                // a non-participant must not learn anything.
                let result = state.session.connect(participant_id, connection);
                state.deliver(result.outbound);
            }
            SessionMsg::Submit { message } => {
                let result = state.session.submit(message);
                state.deliver(result.outbound);
                if let Some(text) = result.broadcast {
                    state.registry.broadcast(&text);
                }
                if result.outcome == SubmitOutcome::ExperimentComplete {
                    tracing::info!("experiment ended; END broadcast delivered");
                }
            }
            SessionMsg::Disconnect { connection } => {
                state.registry.unregister(&connection);
                state.session.detach_connection(&connection);
            }
            SessionMsg::ExportDecisions { reply } => {
                let _ = reply.send(state.session.export_decisions_jsonl());
            }
        }
        Ok(())
    }
}
