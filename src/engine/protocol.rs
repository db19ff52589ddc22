use crate::model::session::SessionSnapshot;

/// What a model request was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Turn,
    AfterAction,
}

pub enum EngineCommand {
    UserInput(String),
    Restart,

    /// Ask for an after-action report and close the session.
    EndScenario,

    /// Sent back by a model worker. `outcome` is the raw reply text or an error description.
    ModelReplied {
        epoch: u64,
        message_id: String,
        kind: RequestKind,
        outcome: Result<String, String>,
    },

    /// Streamed fragment from a model worker.
    ReplyChunk {
        epoch: u64,
        message_id: String,
        text: String,
    },

    Shutdown,
}

#[derive(Debug, Clone)]
pub enum EngineResponse {
    SessionUpdated(SessionSnapshot),

    PartialReply { message_id: String, text: String },

    InputIgnored { reason: String },

    /// A reply issued before the last restart was dropped.
    ReplyDiscarded { epoch: u64 },
}
