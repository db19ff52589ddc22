use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::engine::fallback::{error_line, COACHED_APOLOGY};
use crate::engine::llm_client::{invoke, GenerationConfig, GenerationRequest, TextModel};
use crate::engine::prompt_builder::PromptBuilder;
use crate::engine::protocol::{EngineCommand, EngineResponse, RequestKind};
use crate::engine::response_parser::{parse_reply, parse_report, ParseContext, ParsedReply};
use crate::error::{Result, TrainerError};
use crate::model::message::Reply;
use crate::model::scenario::{ScenarioDefinition, Scoring};
use crate::model::session::Session;

#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOptions {
    /// Request JSON replies and try them before the text markers.
    pub structured: bool,
    /// Forward reply fragments as they arrive.
    pub streaming: bool,
}

pub struct Engine {
    rx: Receiver<EngineCommand>,
    tx: Sender<EngineResponse>,
    loopback: Sender<EngineCommand>,
    model: Arc<dyn TextModel>,
    options: EngineOptions,
    session: Session,
}

impl Engine {
    pub fn new(
        rx: Receiver<EngineCommand>,
        loopback: Sender<EngineCommand>,
        tx: Sender<EngineResponse>,
        model: Arc<dyn TextModel>,
        scenario: ScenarioDefinition,
        options: EngineOptions,
    ) -> Self {
        Self {
            rx,
            tx,
            loopback,
            model,
            options,
            session: Session::new(scenario),
        }
    }

    pub fn run(&mut self) {
        self.publish();

        while let Ok(cmd) = self.rx.recv() {
            match cmd {
                EngineCommand::UserInput(text) => self.handle_input(&text),

                EngineCommand::EndScenario => self.handle_end(),

                EngineCommand::Restart => {
                    self.session.restart();
                    tracing::info!(epoch = self.session.epoch(), "session restarted");
                    self.publish();
                }

                EngineCommand::ModelReplied {
                    epoch,
                    message_id,
                    kind: RequestKind::Turn,
                    outcome,
                } => self.handle_reply(epoch, &message_id, outcome),

                EngineCommand::ModelReplied {
                    epoch,
                    message_id,
                    kind: RequestKind::AfterAction,
                    outcome,
                } => self.handle_report(epoch, &message_id, outcome),

                EngineCommand::ReplyChunk {
                    epoch,
                    message_id,
                    text,
                } => {
                    if self.session.check_epoch(epoch).is_ok()
                        && self.session.pending() == Some(message_id.as_str())
                    {
                        let _ = self
                            .tx
                            .send(EngineResponse::PartialReply { message_id, text });
                    }
                }

                EngineCommand::Shutdown => break,
            }
        }

        tracing::debug!("engine loop stopped");
    }

    fn publish(&self) {
        let _ = self
            .tx
            .send(EngineResponse::SessionUpdated(self.session.snapshot()));
    }

    fn ignore(&self, reason: String) {
        tracing::warn!("input ignored: {reason}");
        let _ = self.tx.send(EngineResponse::InputIgnored { reason });
    }

    fn handle_input(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            self.ignore("empty input".into());
            return;
        }

        if let Err(e) = self.session.append_user_message(text) {
            self.ignore(e.to_string());
            return;
        }

        let scenario = self.session.scenario();
        let prompt = PromptBuilder::build(
            scenario,
            self.session.transcript_for_prompt(),
            text,
            self.session.gauge(),
            self.options.structured,
        );
        let config = match scenario.scoring {
            Scoring::Coached => GenerationConfig::coached(),
            Scoring::Stress => GenerationConfig::roleplay(),
        }
        .with_json(self.options.structured);

        let message_id = match self.session.append_placeholder_model_message() {
            Ok(id) => id,
            Err(e) => {
                self.ignore(e.to_string());
                return;
            }
        };

        tracing::info!(
            scenario = %self.session.scenario().id,
            epoch = self.session.epoch(),
            gauge = self.session.gauge(),
            history = self.session.transcript_for_prompt().len(),
            "sending turn to model"
        );

        self.spawn_request(
            GenerationRequest { prompt, config },
            RequestKind::Turn,
            message_id,
        );
        self.publish();
    }

    fn handle_end(&mut self) {
        let message_id = match self.session.append_placeholder_model_message() {
            Ok(id) => id,
            Err(e) => {
                self.ignore(e.to_string());
                return;
            }
        };

        let prompt = PromptBuilder::after_action(
            self.session.scenario(),
            self.session.transcript_for_prompt(),
        );
        let request = GenerationRequest {
            prompt,
            config: GenerationConfig::coached().with_json(true),
        };

        tracing::info!(
            scenario = %self.session.scenario().id,
            epoch = self.session.epoch(),
            "requesting after-action report"
        );
        self.spawn_request(request, RequestKind::AfterAction, message_id);
        self.publish();
    }

    /// One worker per request. The worker reports back through the command channel,
    /// tagged with the epoch it was issued under.
    fn spawn_request(&self, request: GenerationRequest, kind: RequestKind, message_id: String) {
        let model = Arc::clone(&self.model);
        let loopback = self.loopback.clone();
        let epoch = self.session.epoch();
        let streaming = self.options.streaming && kind == RequestKind::Turn;

        thread::spawn(move || {
            let result = if streaming {
                let chunk_tx = loopback.clone();
                let chunk_id = message_id.clone();
                model.generate_stream(&request, &mut |text: &str| {
                    let _ = chunk_tx.send(EngineCommand::ReplyChunk {
                        epoch,
                        message_id: chunk_id.clone(),
                        text: text.to_string(),
                    });
                })
            } else {
                invoke(model.as_ref(), &request)
            };

            let _ = loopback.send(EngineCommand::ModelReplied {
                epoch,
                message_id,
                kind,
                outcome: result.map_err(|e| e.to_string()),
            });
        });
    }

    /// False (and reported) when the reply predates the last restart.
    fn accept_epoch(&self, epoch: u64) -> bool {
        if let Err(e) = self.session.check_epoch(epoch) {
            tracing::warn!("discarding reply: {e}");
            let _ = self.tx.send(EngineResponse::ReplyDiscarded { epoch });
            return false;
        }
        true
    }

    fn handle_reply(&mut self, epoch: u64, message_id: &str, outcome: std::result::Result<String, String>) {
        if !self.accept_epoch(epoch) {
            return;
        }

        let applied = match outcome {
            Ok(text) => {
                let ctx = ParseContext::for_session(&self.session, self.options.structured);
                let parsed = parse_reply(&text, &ctx);
                tracing::debug!(tier = ?parsed.tier, "model reply parsed");

                match parsed.reply {
                    ParsedReply::Summary(summary) => {
                        tracing::info!(final_score = summary.final_score, "scenario complete");
                        self.session.apply_summary(message_id, summary)
                    }
                    ParsedReply::Turn(reply) => self.session.fill_model_message(message_id, reply),
                }
            }
            Err(e) => {
                tracing::error!(model = self.model.name(), "model invocation failed: {e}");
                let scenario = self.session.scenario();
                let apology = match scenario.scoring {
                    Scoring::Coached => COACHED_APOLOGY,
                    Scoring::Stress => error_line(scenario.scenario_type),
                };
                self.session
                    .fill_model_message(message_id, Reply::plain(apology))
            }
        };

        if let Err(e) = applied {
            tracing::warn!("reply not applied: {e}");
        }
        self.publish();
    }

    /// Any failure to get a usable report falls back to the locally tracked metrics.
    fn handle_report(&mut self, epoch: u64, message_id: &str, outcome: std::result::Result<String, String>) {
        if !self.accept_epoch(epoch) {
            return;
        }

        let report = match outcome {
            Ok(text) => parse_report(&text),
            Err(e) => {
                tracing::error!(model = self.model.name(), "after-action request failed: {e}");
                None
            }
        };
        let report = report.unwrap_or_else(|| {
            tracing::warn!("no usable after-action report; using local metrics");
            self.session.metrics_report()
        });

        tracing::info!(final_score = report.final_score, "scenario ended");
        if let Err(e) = self.session.apply_summary(message_id, report) {
            tracing::warn!("report not applied: {e}");
        }
        self.publish();
    }
}

/// Owns the engine thread and both ends of its channels.
pub struct EngineHandle {
    cmd_tx: Sender<EngineCommand>,
    resp_rx: Receiver<EngineResponse>,
    thread: Option<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn spawn(
        scenario: ScenarioDefinition,
        model: Arc<dyn TextModel>,
        options: EngineOptions,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (resp_tx, resp_rx) = mpsc::channel();

        let loopback = cmd_tx.clone();
        let thread = thread::spawn(move || {
            let mut engine = Engine::new(cmd_rx, loopback, resp_tx, model, scenario, options);
            engine.run();
        });

        Self {
            cmd_tx,
            resp_rx,
            thread: Some(thread),
        }
    }

    fn send(&self, cmd: EngineCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| TrainerError::EngineStopped)
    }

    pub fn send_input(&self, text: impl Into<String>) -> Result<()> {
        self.send(EngineCommand::UserInput(text.into()))
    }

    pub fn restart(&self) -> Result<()> {
        self.send(EngineCommand::Restart)
    }

    pub fn end_scenario(&self) -> Result<()> {
        self.send(EngineCommand::EndScenario)
    }

    pub fn recv(&self) -> Result<EngineResponse> {
        self.resp_rx.recv().map_err(|_| TrainerError::EngineStopped)
    }

    /// `Ok(None)` on timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<EngineResponse>> {
        match self.resp_rx.recv_timeout(timeout) {
            Ok(resp) => Ok(Some(resp)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TrainerError::EngineStopped),
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(EngineCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
