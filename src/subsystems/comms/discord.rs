//! Discord comms channel — serenity gateway wired onto the router and the
//! voice lifecycle manager.
//!
//! The gateway token comes from `DISCORD_BOT_TOKEN`; a missing token makes
//! the channel exit cleanly so a bot without Discord credentials still
//! starts. [`DiscordPlatform`] adapts serenity's Http + Cache to the
//! [`Platform`] trait; everything below the trait stays gateway-agnostic.

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use serenity::all::{
    ChannelType, Client, Context, CreateChannel, CreateMessage, EditMember, EventHandler,
    GatewayIntents, GetMessages, Message, MessageReference, MessageUpdateEvent,
    PermissionOverwriteType, Permissions, Ready, VoiceState,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::platform::{
    CategoryId, ChannelId, CreateVoiceChannel, InboundMessage, MemberId, MessageId,
    OverwriteTarget, PermissionOverwrite, Platform, TenantId, VoiceStateChange,
};

use super::CommsDeps;

// ── run ──────────────────────────────────────────────────────────────────────

pub async fn run(
    channel_id: String,
    deps: Arc<CommsDeps>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let token = match env::var("DISCORD_BOT_TOKEN") {
        Ok(t) => t,
        Err(_) => {
            warn!(%channel_id, "DISCORD_BOT_TOKEN not set, discord channel exiting");
            return Ok(());
        }
    };

    info!(%channel_id, "discord channel starting");

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_VOICE_STATES;

    let mut client = Client::builder(&token, intents)
        .event_handler(Handler {
            channel_id: channel_id.clone(),
            deps,
        })
        .await
        .map_err(|e| AppError::Comms(format!("discord client init: {e}")))?;

    let shard_manager = client.shard_manager.clone();

    tokio::select! {
        biased;

        _ = shutdown.cancelled() => {
            info!(%channel_id, "shutdown signal received — closing discord channel");
            shard_manager.shutdown_all().await;
        }
        result = client.start() => {
            match result {
                Ok(()) => warn!(%channel_id, "discord gateway exited unexpectedly"),
                Err(e) => return Err(AppError::Comms(format!("discord gateway: {e}"))),
            }
        }
    }

    Ok(())
}

// ── Handler ──────────────────────────────────────────────────────────────────

struct Handler {
    channel_id: String,
    deps: Arc<CommsDeps>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(channel = %self.channel_id, user = %ready.user.name, "discord gateway ready");
    }

    async fn message(&self, ctx: Context, msg: Message) {
        // Direct messages have no tenant; the command store is guild-scoped.
        let Some(guild_id) = msg.guild_id else {
            return;
        };

        let inbound = InboundMessage {
            tenant: TenantId(guild_id.get()),
            channel: ChannelId(msg.channel_id.get()),
            id: MessageId(msg.id.get()),
            author_is_bot: msg.author.bot,
            content: msg.content.clone(),
        };

        let platform = DiscordPlatform::from_ctx(&ctx);
        self.deps.router.handle_message(&platform, &inbound).await;
    }

    async fn message_delete(
        &self,
        _ctx: Context,
        channel_id: serenity::all::ChannelId,
        deleted_message_id: serenity::all::MessageId,
        _guild_id: Option<serenity::all::GuildId>,
    ) {
        debug!(channel = %channel_id, message = %deleted_message_id, "message deleted");
    }

    async fn message_update(
        &self,
        _ctx: Context,
        _old_if_available: Option<Message>,
        _new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        debug!(channel = %event.channel_id, message = %event.id, "message edited");
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(voice) = &self.deps.voice else {
            return;
        };
        let Some(guild_id) = new.guild_id else {
            return;
        };

        let member_name = new
            .member
            .as_ref()
            .map(|m| m.user.name.clone())
            .unwrap_or_else(|| format!("member-{}", new.user_id));

        let change = VoiceStateChange {
            tenant: TenantId(guild_id.get()),
            member: MemberId(new.user_id.get()),
            member_name,
            old_channel: old
                .as_ref()
                .and_then(|state| state.channel_id)
                .map(|c| ChannelId(c.get())),
            new_channel: new.channel_id.map(|c| ChannelId(c.get())),
        };

        let platform = DiscordPlatform::from_ctx(&ctx);
        voice.handle(&platform, &change).await;
    }
}

// ── DiscordPlatform ──────────────────────────────────────────────────────────

/// [`Platform`] over serenity's Http (writes) and Cache (guild reads).
struct DiscordPlatform {
    http: Arc<serenity::http::Http>,
    cache: Arc<serenity::cache::Cache>,
}

impl DiscordPlatform {
    fn from_ctx(ctx: &Context) -> Self {
        Self {
            http: ctx.http.clone(),
            cache: ctx.cache.clone(),
        }
    }
}

fn api_err(what: &str, e: serenity::Error) -> AppError {
    AppError::Platform(format!("{what}: {e}"))
}

#[async_trait]
impl Platform for DiscordPlatform {
    async fn parent_category(
        &self,
        tenant: TenantId,
        channel: ChannelId,
    ) -> Result<Option<CategoryId>, AppError> {
        let guild = self
            .cache
            .guild(serenity::all::GuildId::new(tenant.0))
            .ok_or_else(|| AppError::Platform(format!("guild {tenant} not cached")))?;
        Ok(guild
            .channels
            .get(&serenity::all::ChannelId::new(channel.0))
            .and_then(|c| c.parent_id)
            .map(|id| CategoryId(id.get())))
    }

    async fn category_overwrites(
        &self,
        tenant: TenantId,
        category: CategoryId,
    ) -> Result<Vec<PermissionOverwrite>, AppError> {
        let guild = self
            .cache
            .guild(serenity::all::GuildId::new(tenant.0))
            .ok_or_else(|| AppError::Platform(format!("guild {tenant} not cached")))?;
        // Categories are channels in the guild channel map.
        let overwrites = guild
            .channels
            .get(&serenity::all::ChannelId::new(category.0))
            .map(|c| {
                c.permission_overwrites
                    .iter()
                    .filter_map(|po| {
                        let target = match po.kind {
                            PermissionOverwriteType::Member(user) => {
                                OverwriteTarget::Member(user.get())
                            }
                            PermissionOverwriteType::Role(role) => {
                                OverwriteTarget::Role(role.get())
                            }
                            _ => return None,
                        };
                        Some(PermissionOverwrite {
                            target,
                            allow: po.allow.bits(),
                            deny: po.deny.bits(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(overwrites)
    }

    async fn create_voice_channel(
        &self,
        tenant: TenantId,
        request: CreateVoiceChannel,
    ) -> Result<ChannelId, AppError> {
        let overwrites: Vec<serenity::all::PermissionOverwrite> = request
            .overwrites
            .iter()
            .map(|po| serenity::all::PermissionOverwrite {
                allow: Permissions::from_bits_truncate(po.allow),
                deny: Permissions::from_bits_truncate(po.deny),
                kind: match po.target {
                    OverwriteTarget::Member(user) => {
                        PermissionOverwriteType::Member(serenity::all::UserId::new(user))
                    }
                    OverwriteTarget::Role(role) => {
                        PermissionOverwriteType::Role(serenity::all::RoleId::new(role))
                    }
                },
            })
            .collect();

        let mut builder = CreateChannel::new(request.name)
            .kind(ChannelType::Voice)
            .permissions(overwrites);
        if let Some(parent) = request.parent {
            builder = builder.category(serenity::all::ChannelId::new(parent.0));
        }

        let created = serenity::all::GuildId::new(tenant.0)
            .create_channel(&self.http, builder)
            .await
            .map_err(|e| api_err("create channel", e))?;
        Ok(ChannelId(created.id.get()))
    }

    async fn move_member(
        &self,
        tenant: TenantId,
        member: MemberId,
        channel: ChannelId,
    ) -> Result<(), AppError> {
        serenity::all::GuildId::new(tenant.0)
            .edit_member(
                &self.http,
                serenity::all::UserId::new(member.0),
                EditMember::new().voice_channel(serenity::all::ChannelId::new(channel.0)),
            )
            .await
            .map_err(|e| api_err("move member", e))?;
        Ok(())
    }

    async fn delete_channel(
        &self,
        _tenant: TenantId,
        channel: ChannelId,
    ) -> Result<(), AppError> {
        serenity::all::ChannelId::new(channel.0)
            .delete(&self.http)
            .await
            .map_err(|e| api_err("delete channel", e))?;
        Ok(())
    }

    async fn occupant_count(
        &self,
        tenant: TenantId,
        channel: ChannelId,
    ) -> Result<usize, AppError> {
        let guild = self
            .cache
            .guild(serenity::all::GuildId::new(tenant.0))
            .ok_or_else(|| AppError::Platform(format!("guild {tenant} not cached")))?;
        let target = serenity::all::ChannelId::new(channel.0);
        Ok(guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(target))
            .count())
    }

    async fn recent_messages(
        &self,
        channel: ChannelId,
        limit: u8,
    ) -> Result<Vec<MessageId>, AppError> {
        let messages = serenity::all::ChannelId::new(channel.0)
            .messages(&self.http, GetMessages::new().limit(limit))
            .await
            .map_err(|e| api_err("fetch messages", e))?;
        Ok(messages.iter().map(|m| MessageId(m.id.get())).collect())
    }

    async fn bulk_delete_messages(
        &self,
        channel: ChannelId,
        ids: &[MessageId],
    ) -> Result<(), AppError> {
        let ids: Vec<serenity::all::MessageId> =
            ids.iter().map(|id| serenity::all::MessageId::new(id.0)).collect();
        serenity::all::ChannelId::new(channel.0)
            .delete_messages(&self.http, ids)
            .await
            .map_err(|e| api_err("bulk delete", e))?;
        Ok(())
    }

    async fn send_reply(
        &self,
        channel: ChannelId,
        to: MessageId,
        text: &str,
    ) -> Result<MessageId, AppError> {
        let target = serenity::all::ChannelId::new(channel.0);
        let reference =
            MessageReference::from((target, serenity::all::MessageId::new(to.0)));
        let sent = target
            .send_message(
                &self.http,
                CreateMessage::new().content(text).reference_message(reference),
            )
            .await
            .map_err(|e| api_err("send reply", e))?;
        Ok(MessageId(sent.id.get()))
    }
}
