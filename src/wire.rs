//! Line-delimited JSON front end: one request object per line in, one
//! response object per line out.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::limits::*;
use crate::model::MeetingRequest;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    RegisterParticipant {
        name: String,
        timezone: String,
    },
    GetParticipant {
        id: Ulid,
    },
    ListParticipants {
        #[serde(default = "default_page")]
        page: usize,
        #[serde(default = "default_page_size")]
        page_size: usize,
    },
    CreateMeeting {
        title: String,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        participant_ids: Vec<Ulid>,
    },
    UpdateMeeting {
        id: Ulid,
        title: String,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        participant_ids: Vec<Ulid>,
    },
    DeleteMeeting {
        id: Ulid,
    },
    GetMeeting {
        id: Ulid,
    },
    ListMeetings {
        #[serde(default = "default_page")]
        page: usize,
        #[serde(default = "default_page_size")]
        page_size: usize,
    },
    ParticipantSchedule {
        participant_id: Ulid,
    },
}

fn default_page() -> usize {
    MIN_PAGE
}

fn default_page_size() -> usize {
    20
}

impl Request {
    fn op(&self) -> &'static str {
        match self {
            Request::RegisterParticipant { .. } => "register_participant",
            Request::GetParticipant { .. } => "get_participant",
            Request::ListParticipants { .. } => "list_participants",
            Request::CreateMeeting { .. } => "create_meeting",
            Request::UpdateMeeting { .. } => "update_meeting",
            Request::DeleteMeeting { .. } => "delete_meeting",
            Request::GetMeeting { .. } => "get_meeting",
            Request::ListMeetings { .. } => "list_meetings",
            Request::ParticipantSchedule { .. } => "participant_schedule",
        }
    }
}

fn ok(data: impl Serialize) -> Value {
    json!({ "ok": true, "data": data })
}

fn bad_request(message: impl std::fmt::Display) -> Value {
    json!({
        "ok": false,
        "error": { "code": "BadRequest", "message": message.to_string() },
    })
}

fn engine_err(e: &EngineError) -> Value {
    let mut error = json!({ "code": e.code(), "message": e.to_string() });
    if let Some(alternatives) = e.alternatives() {
        error["alternatives"] = json!(alternatives);
    }
    json!({ "ok": false, "error": error })
}

fn respond<T: Serialize>(result: Result<T, EngineError>) -> Value {
    match result {
        Ok(data) => ok(data),
        Err(e) => engine_err(&e),
    }
}

/// Run one request against the engine.
pub async fn execute(engine: &Engine, request: Request) -> Value {
    match request {
        Request::RegisterParticipant { name, timezone } => {
            respond(engine.register_participant(&name, &timezone).await)
        }
        Request::GetParticipant { id } => respond(engine.get_participant(id).await),
        Request::CreateMeeting {
            title,
            start,
            end,
            participant_ids,
        } => respond(
            engine
                .create_meeting(MeetingRequest {
                    title,
                    start,
                    end,
                    participant_ids,
                })
                .await,
        ),
        Request::UpdateMeeting {
            id,
            title,
            start,
            end,
            participant_ids,
        } => respond(
            engine
                .update_meeting(
                    id,
                    MeetingRequest {
                        title,
                        start,
                        end,
                        participant_ids,
                    },
                )
                .await,
        ),
        Request::DeleteMeeting { id } => respond(
            engine
                .delete_meeting(id)
                .await
                .map(|()| json!({ "deleted": id })),
        ),
        Request::GetMeeting { id } => respond(engine.get_meeting(id).await),
        Request::ListParticipants { page, page_size } => {
            respond(engine.list_participants(page, page_size).await)
        }
        Request::ListMeetings { page, page_size } => {
            respond(engine.list_meetings(page, page_size).await)
        }
        Request::ParticipantSchedule { participant_id } => {
            respond(engine.participant_schedule(participant_id).await)
        }
    }
}

/// Parse and execute one request line. Malformed input yields a
/// `BadRequest` response rather than an error.
pub async fn handle_line(engine: &Engine, line: &str) -> Value {
    let request: Request = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            debug!("bad request: {e}");
            return bad_request(e);
        }
    };
    let op = request.op();
    let response = execute(engine, request).await;
    debug!(op, ok = response["ok"].as_bool().unwrap_or(false), "handled request");
    response
}

pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut lines = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));

    while let Some(frame) = lines.next().await {
        let line = match frame {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!("request line over {MAX_LINE_LEN} bytes, closing connection");
                let reply = bad_request(format!("line exceeds {MAX_LINE_LEN} bytes"));
                lines.send(reply.to_string()).await?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if line.trim().is_empty() {
            continue;
        }
        let reply = handle_line(&engine, &line).await;
        lines.send(reply.to_string()).await?;
    }
    Ok(())
}
