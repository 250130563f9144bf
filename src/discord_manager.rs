use std::sync::Arc;

use serenity::async_trait;
use serenity::client::Client;
use serenity::http::Http;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::ChannelId;
use serenity::prelude::*;
use tracing::{debug, info, warn};

use crate::commands::{self, Invocation};
use crate::communication_channel::{ChannelError, CommunicationChannel, TypingGuard};
use crate::config::SharedConfig;
use crate::conversation_manager::ConversationScheduler;

/// A Discord text channel.
pub struct DiscordChannel {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl DiscordChannel {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self { http, channel_id }
    }
}

#[async_trait]
impl CommunicationChannel for DiscordChannel {
    async fn send_message(&self, message: &str) -> Result<(), ChannelError> {
        self.channel_id
            .say(&self.http, message)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::Send(e.to_string()))
    }

    async fn show_typing(&self) -> Result<TypingGuard, ChannelError> {
        // Discord keeps typing until the handle is dropped.
        self.channel_id
            .start_typing(&self.http)
            .map(TypingGuard::holding)
            .map_err(|e| ChannelError::Typing(e.to_string()))
    }
}

pub struct Handler {
    command_prefix: String,
    config: Arc<SharedConfig>,
    scheduler: Arc<ConversationScheduler>,
}

impl Handler {
    pub fn new(
        command_prefix: String,
        config: Arc<SharedConfig>,
        scheduler: Arc<ConversationScheduler>,
    ) -> Self {
        Self {
            command_prefix,
            config,
            scheduler,
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, context: Context, msg: Message) {
        let channel: Arc<dyn CommunicationChannel> =
            Arc::new(DiscordChannel::new(Arc::clone(&context.http), msg.channel_id));
        let author_is_self = msg.author.id == context.cache.current_user_id();
        let server_id = msg.guild_id.map(|id| id.0);

        if let Some(command) = commands::parse(&self.command_prefix, &msg.content) {
            if author_is_self {
                return;
            }
            let invocation = Invocation {
                author_id: msg.author.id.0,
                server_id,
            };
            if let Err(why) = commands::execute(
                command,
                invocation,
                &self.command_prefix,
                &self.config,
                &self.scheduler,
                channel,
            )
            .await
            {
                warn!(bot = %self.scheduler.bot_name(), error = %why, "command failed");
            }
            return;
        }

        let config = self.config.snapshot();
        let server_authorized = server_id.map_or(false, |id| config.is_server_allowed(id));
        let prompt = msg.content_safe(&context.cache);

        match self
            .scheduler
            .on_incoming_message(channel, &prompt, author_is_self, server_authorized)
            .await
        {
            Ok(Some(_)) => info!(bot = %self.scheduler.bot_name(), to = %msg.author.name, "replied"),
            Ok(None) => {}
            Err(why) => warn!(bot = %self.scheduler.bot_name(), error = %why, "reply failed"),
        }
    }

    async fn ready(&self, _: Context, ready: Ready) {
        info!(bot = %self.scheduler.bot_name(), user = %ready.user.name, id = %ready.user.id, "connected");
        debug!(bot = %self.scheduler.bot_name(), previous = ?self.scheduler.state(), "resetting conversation state");
        self.scheduler.on_startup();
    }
}

/// Builds a gateway client for one bot identity.
pub async fn build_client(token: &str, handler: Handler) -> Result<Client, SerenityError> {
    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;
    Client::builder(token, intents).event_handler(handler).await
}
