// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Update routing: long polling, command handling, and button presses.

use std::sync::Arc;

use metatron_config::model::TelegramConfig;
use metatron_core::{Identity, MessageId, MetatronError, OutboundMessage, ReplyTarget};
use metatron_jobs::spec::JobSpec;
use metatron_jobs::{ActionPress, Dispatcher as JobDispatcher, render};
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::{self, Command, HELP_TEXT};
use crate::{buttons, handler, media};

pub const NOT_ALLOWED_NOTICE: &str = "You are not allowed to do that.";
pub const NEEDS_SOURCE_NOTICE: &str = "Attach an image to /edit_gen or reply to one with it.";

/// What an incoming message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Command(Command),
    Chat(String),
    /// A malformed command; the text explains what went wrong.
    Invalid(String),
}

/// Classifies a message. `None` means the bot should stay quiet.
pub fn classify(msg: &Message, bot_username: &str) -> Option<Incoming> {
    let text = msg.text().or_else(|| msg.caption())?;
    match commands::parse(text, bot_username) {
        Ok(Some(command)) => Some(Incoming::Command(command)),
        Err(e) => Some(Incoming::Invalid(e.to_string())),
        Ok(None) => handler::chat_prompt(msg, bot_username).map(Incoming::Chat),
    }
}

/// Runs a parsed command on behalf of `owner`.
///
/// Every outcome is acknowledged in `target`. `source_image` must be present
/// for commands that edit an image.
pub async fn execute(
    dispatcher: &JobDispatcher,
    owner: Identity,
    target: ReplyTarget,
    command: Command,
    is_admin: bool,
    source_image: Option<Vec<u8>>,
) -> Result<(), MetatronError> {
    let channel = dispatcher.context().channel.clone();
    match command {
        Command::Help => {
            channel.send(OutboundMessage::text(target, HELP_TEXT)).await?;
        }
        Command::ToggleBan { user_id } => {
            if !is_admin {
                warn!(identity = %owner, user = %user_id, "ban toggle refused");
                return channel.acknowledge(&target, NOT_ALLOWED_NOTICE).await;
            }
            let banned = dispatcher.toggle_ban(&user_id).await?;
            channel
                .acknowledge(&target, &render::ban_toggled(&user_id, banned))
                .await?;
        }
        command => {
            if command.needs_source_image() && source_image.is_none() {
                return channel.acknowledge(&target, NEEDS_SOURCE_NOTICE).await;
            }
            let pack_size = dispatcher.context().settings.card_pack_size;
            let Some(spec) = command.into_spec(pack_size, source_image) else {
                return Ok(());
            };
            submit(dispatcher, owner, target, spec).await?;
        }
    }
    Ok(())
}

/// Submits `spec`, turning validation failures into an acknowledgement.
async fn submit(
    dispatcher: &JobDispatcher,
    owner: Identity,
    target: ReplyTarget,
    spec: JobSpec,
) -> Result<(), MetatronError> {
    match dispatcher
        .submit_and_acknowledge(owner, target.clone(), spec)
        .await
    {
        Ok(_) => Ok(()),
        Err(MetatronError::InvalidRequest(reason)) => {
            dispatcher
                .context()
                .channel
                .acknowledge(&target, &reason)
                .await
        }
        Err(e) => Err(e),
    }
}

struct BotState {
    dispatcher: JobDispatcher,
    admins: Vec<String>,
    username: String,
}

async fn on_message(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(user) = msg.from.as_ref() else {
        return respond(());
    };
    let Some(incoming) = classify(&msg, &state.username) else {
        return respond(());
    };
    let owner = handler::identity_of(user);
    let target = handler::reply_target(msg.chat.id);
    let channel = state.dispatcher.context().channel.clone();

    let result = match incoming {
        Incoming::Invalid(reason) => {
            debug!(identity = %owner, reason = %reason, "rejected command");
            channel.acknowledge(&target, &reason).await
        }
        Incoming::Chat(prompt) => {
            submit(&state.dispatcher, owner.clone(), target.clone(), JobSpec::Chat { prompt }).await
        }
        Incoming::Command(command) => {
            let source = if command.needs_source_image() {
                media::source_image(&bot, &msg).await
            } else {
                Ok(None)
            };
            match source {
                Ok(source) => {
                    let is_admin = handler::is_admin(user, &state.admins);
                    execute(
                        &state.dispatcher,
                        owner.clone(),
                        target.clone(),
                        command,
                        is_admin,
                        source,
                    )
                    .await
                }
                Err(MetatronError::InvalidRequest(reason)) => {
                    channel.acknowledge(&target, &reason).await
                }
                Err(e) => Err(e),
            }
        }
    };

    if let Err(e) = result {
        warn!(identity = %owner, chat_id = msg.chat.id.0, error = %e, "failed to handle message");
    }
    respond(())
}

async fn on_callback(bot: Bot, query: CallbackQuery, state: Arc<BotState>) -> ResponseResult<()> {
    let decoded = query.data.as_deref().and_then(buttons::decode);
    let message = query.message.as_ref();
    let text = match (decoded, message) {
        (Some((kind, token)), Some(message)) => {
            let press = ActionPress {
                token,
                kind,
                clicker: handler::identity_of(&query.from),
                message: MessageId(message.id().0.to_string()),
                target: handler::reply_target(message.chat().id),
                private_target: handler::private_target(&query.from),
            };
            state.dispatcher.press(press).await
        }
        _ => render::EXPIRED_ACTION_NOTICE.to_string(),
    };

    if let Err(e) = bot.answer_callback_query(query.id.clone()).text(text).await {
        warn!(error = %e, "failed to answer callback query");
    }
    respond(())
}

/// Long-polls Telegram until `cancel` fires.
pub async fn run(
    bot: Bot,
    dispatcher: JobDispatcher,
    config: &TelegramConfig,
    cancel: CancellationToken,
) -> Result<(), MetatronError> {
    let me = bot.get_me().await.map_err(|e| MetatronError::Channel {
        message: format!("failed to reach telegram: {e}"),
        source: Some(Box::new(e)),
    })?;
    let username = me.user.username.clone().unwrap_or_default();
    let state = Arc::new(BotState {
        dispatcher,
        admins: config.admin_users.clone(),
        username,
    });

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_callback_query().endpoint(on_callback));

    let mut updates = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state.clone()])
        .default_handler(|_| async {})
        .build();

    let token = updates.shutdown_token();
    tokio::spawn(async move {
        cancel.cancelled().await;
        match token.shutdown() {
            Ok(done) => done.await,
            Err(e) => debug!(error = %e, "telegram dispatcher was not running"),
        }
    });

    info!(bot = %state.username, "starting telegram long polling");
    updates.dispatch().await;
    info!("telegram long polling stopped");
    Ok(())
}
