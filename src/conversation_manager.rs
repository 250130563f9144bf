//! Decides whether, when and what a bot says.
//!
//! A bot is either idle (it may reply) or busy composing and typing a
//! message. Replies to incoming messages and spontaneous messages after a
//! stretch of silence share the same typing path. Every delivered message
//! arms a background timer for the next spontaneous conversation; arming
//! bumps an epoch so an older timer that wakes up later finds it has been
//! superseded and does nothing.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::clock::{add_seconds, seconds_between, seconds_to_std, Clock};
use crate::communication_channel::{CommunicationChannel, TypingGuard};
use crate::config::{Configuration, SharedConfig};
use crate::error::{EngineError, GENERATION_FAILED_TEXT};
use crate::generator::TextGenerator;
use crate::punctuation::repair;
use crate::selection::select;
use crate::timing::{typing_duration, TimingModel};

/// Seconds a spontaneous timer may fire ahead of schedule and still count.
pub const TIME_TOLERANCE: f64 = 1.0;

type TimerTask = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationState {
    pub can_reply: bool,
    pub last_message_time: Option<DateTime<Utc>>,
    pub next_message_time: Option<DateTime<Utc>>,
    /// Incremented whenever a spontaneous-conversation timer is armed.
    pub epoch: u64,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            can_reply: true,
            last_message_time: None,
            next_message_time: None,
            epoch: 0,
        }
    }
}

pub struct ConversationScheduler {
    bot_name: String,
    config: Arc<SharedConfig>,
    generator: Arc<dyn TextGenerator>,
    clock: Arc<dyn Clock>,
    timing: Mutex<TimingModel>,
    conversation_state: Mutex<ConversationState>,
}

impl ConversationScheduler {
    pub fn new(
        bot_name: impl Into<String>,
        config: Arc<SharedConfig>,
        generator: Arc<dyn TextGenerator>,
        clock: Arc<dyn Clock>,
        timing: TimingModel,
    ) -> Self {
        Self {
            bot_name: bot_name.into(),
            config,
            generator,
            clock,
            timing: Mutex::new(timing),
            conversation_state: Mutex::new(ConversationState::default()),
        }
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    /// A copy of the current state.
    pub fn state(&self) -> ConversationState {
        self.lock_state().clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, ConversationState> {
        self.conversation_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn timing(&self) -> MutexGuard<'_, TimingModel> {
        self.timing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Puts the bot into its first idle state. Timers armed before this are
    /// invalidated.
    pub fn on_startup(&self) {
        let mut state = self.lock_state();
        let epoch = state.epoch + 1;
        *state = ConversationState {
            epoch,
            ..ConversationState::default()
        };
        info!(bot = %self.bot_name, "ready to chat");
    }

    /// Handles a message seen in a channel. Returns the delivered text, if
    /// the bot decided to reply.
    pub async fn on_incoming_message(
        self: &Arc<Self>,
        channel: Arc<dyn CommunicationChannel>,
        prompt: &str,
        author_is_self: bool,
        server_authorized: bool,
    ) -> Result<Option<String>, EngineError> {
        if author_is_self || !server_authorized {
            return Ok(None);
        }

        let config = self.config.snapshot();
        let hit = self.timing().chance(config.reply_probability);
        {
            let mut state = self.lock_state();
            if !state.can_reply || !hit {
                return Ok(None);
            }
            state.can_reply = false;
        }

        // Noticing delay before composing a reply
        let delay = self
            .timing()
            .draw(config.avg_delay, config.std_dev_delay, config.min_delay);
        debug!(bot = %self.bot_name, delay, "replying after delay");
        tokio::time::sleep(seconds_to_std(delay)).await;

        let config = self.config.snapshot();
        let mut text = self.compose_reply(prompt, &config);
        if config.quiet_mode {
            text = text.replace('@', "");
        }

        self.type_response(channel, &text).await?;
        Ok(Some(text))
    }

    /// Generates, repairs and selects a reply. Failures become visible text.
    fn compose_reply(&self, prompt: &str, config: &Configuration) -> String {
        let candidates: Vec<Option<String>> = (0..config.max_candidates)
            .map(|_| self.generate_sentence(config))
            .collect();

        match select(prompt, &candidates, config.selection_algorithm) {
            Ok(chosen) => {
                info!(
                    bot = %self.bot_name,
                    algorithm = %config.selection_algorithm,
                    score = chosen.score,
                    "selected reply"
                );
                chosen.text.unwrap_or_else(|| GENERATION_FAILED_TEXT.to_string())
            }
            Err(EngineError::NoCandidatesAvailable) => {
                warn!(
                    bot = %self.bot_name,
                    attempts = config.max_candidates,
                    "{}",
                    EngineError::GenerationFailed
                );
                EngineError::GenerationFailed.user_message()
            }
            Err(e) => e.user_message(),
        }
    }

    fn generate_sentence(&self, config: &Configuration) -> Option<String> {
        self.generator
            .generate(config.max_sentence_length)
            .map(|text| repair(&text))
    }

    /// Generates a message on request, skipping the reply probability gate.
    /// The bot counts as busy from the start, so incoming messages are
    /// ignored while it composes and types.
    pub async fn generate_on_demand(
        self: &Arc<Self>,
        channel: Arc<dyn CommunicationChannel>,
    ) -> Result<String, EngineError> {
        let config = self.config.snapshot();
        let could_reply = std::mem::replace(&mut self.lock_state().can_reply, false);

        let Some(text) = self.generate_sentence(&config) else {
            warn!(bot = %self.bot_name, "on-demand generation failed");
            self.lock_state().can_reply = could_reply;
            channel
                .send_message(&EngineError::GenerationFailed.user_message())
                .await?;
            return Err(EngineError::GenerationFailed);
        };

        let delay = self
            .timing()
            .draw(config.avg_delay, config.std_dev_delay, config.min_delay);
        tokio::time::sleep(seconds_to_std(delay)).await;

        self.type_response(channel, &text).await?;
        Ok(text)
    }

    /// Shows the typing indicator for as long as `text` takes to type, sends
    /// it, and schedules the next spontaneous conversation.
    async fn type_response(
        self: &Arc<Self>,
        channel: Arc<dyn CommunicationChannel>,
        text: &str,
    ) -> Result<(), EngineError> {
        let config = self.config.snapshot();
        let typing_speed = self.timing().draw(
            config.avg_typing_speed,
            config.std_dev_typing_speed,
            config.min_typing_speed,
        );
        let typing_time = typing_duration(text, typing_speed);
        info!(bot = %self.bot_name, typing_time, typing_speed, "typing");

        self.lock_state().can_reply = false;

        let typing = match channel.show_typing().await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(bot = %self.bot_name, error = %e, "typing indicator unavailable");
                TypingGuard::none()
            }
        };
        tokio::time::sleep(seconds_to_std(typing_time)).await;
        let sent = channel.send_message(text).await;
        drop(typing);

        if let Err(e) = &sent {
            warn!(bot = %self.bot_name, error = %e, "failed to deliver message");
        }

        let epoch = self.schedule_new_conversation(&config);
        tokio::spawn(Arc::clone(self).sleep_and_start_conversation(channel, epoch));

        sent.map_err(EngineError::from)
    }

    /// Records a delivery, picks the next conversation time and returns to
    /// idle. Supersedes any previously armed timer.
    fn schedule_new_conversation(&self, config: &Configuration) -> u64 {
        let wait = self.timing().uniform(
            config.new_conversation_min_wait,
            config.new_conversation_max_wait,
        );

        let mut state = self.lock_state();
        let now = self.clock.now();
        let next = add_seconds(now, wait);
        state.last_message_time = Some(now);
        state.next_message_time = Some(next);
        state.can_reply = true;
        state.epoch += 1;

        info!(
            bot = %self.bot_name,
            at = %next.format("%Y-%m-%d %H:%M:%S"),
            "new conversation scheduled"
        );
        state.epoch
    }

    /// Background task: sleep until the scheduled time, then try to start a
    /// conversation. Boxed so the typing path can spawn it.
    fn sleep_and_start_conversation(
        self: Arc<Self>,
        channel: Arc<dyn CommunicationChannel>,
        epoch: u64,
    ) -> TimerTask {
        Box::pin(async move {
            let remaining = {
                let state = self.lock_state();
                match state.next_message_time {
                    Some(next) => seconds_between(self.clock.now(), next),
                    None => 0.0,
                }
            };
            tokio::time::sleep(seconds_to_std(remaining)).await;

            if let Err(e) = self.start_conversation(channel, epoch).await {
                warn!(bot = %self.bot_name, error = %e, "spontaneous conversation failed");
            }
        })
    }

    /// Starts a new conversation if the timer for `epoch` is still current
    /// and its scheduled time has (nearly) arrived.
    pub(crate) async fn start_conversation(
        self: &Arc<Self>,
        channel: Arc<dyn CommunicationChannel>,
        epoch: u64,
    ) -> Result<Option<String>, EngineError> {
        let config = self.config.snapshot();
        {
            let mut state = self.lock_state();
            if state.epoch != epoch || !state.can_reply {
                debug!(bot = %self.bot_name, epoch, current = state.epoch, "stale conversation timer");
                return Ok(None);
            }

            let now = self.clock.now();
            let Some(next) = state.next_message_time else {
                return Ok(None);
            };
            let early_by = seconds_between(now, next);
            if early_by > TIME_TOLERANCE {
                info!(bot = %self.bot_name, early_by, "conversation started too early");
                return Ok(None);
            }
            state.can_reply = false;
        }

        let Some(text) = self.generate_sentence(&config) else {
            warn!(bot = %self.bot_name, "spontaneous generation failed");
            self.lock_state().can_reply = true;
            return Ok(None);
        };

        self.type_response(channel, &text).await?;
        Ok(Some(text))
    }
}
