//! Platform collaborator surface — everything the core asks of the chat
//! platform, behind one dyn-safe trait.
//!
//! The command router and voice lifecycle manager never talk to a gateway
//! crate directly; they receive a `&dyn Platform` per call. The Discord
//! adapter (feature `channel-discord`) implements this over serenity's
//! Http + Cache, and tests substitute a recording fake.

use async_trait::async_trait;

use crate::error::AppError;

// ── Identifiers ──────────────────────────────────────────────────────────────

macro_rules! snowflake_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

snowflake_id! {
    /// Guild/workspace ID — the partition key for all stored state.
    TenantId
}
snowflake_id! {
    /// Text or voice channel ID.
    ChannelId
}
snowflake_id! {
    /// Channel category ID.
    CategoryId
}
snowflake_id! {
    /// Guild member (user) ID.
    MemberId
}
snowflake_id! {
    /// Message ID.
    MessageId
}

// ── Permission snapshot ──────────────────────────────────────────────────────

/// Who a permission overwrite applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteTarget {
    Role(u64),
    Member(u64),
}

/// One entry of a channel/category permission overlay, as raw bit sets.
/// Captured from the lobby's parent category and replayed verbatim onto
/// newly provisioned voice channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionOverwrite {
    pub target: OverwriteTarget,
    pub allow: u64,
    pub deny: u64,
}

/// Creation request for an ephemeral voice channel.
#[derive(Debug, Clone)]
pub struct CreateVoiceChannel {
    pub name: String,
    pub parent: Option<CategoryId>,
    pub overwrites: Vec<PermissionOverwrite>,
}

// ── Inbound events ───────────────────────────────────────────────────────────

/// A chat message as seen by the router, already stripped of gateway detail.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub tenant: TenantId,
    pub channel: ChannelId,
    pub id: MessageId,
    pub author_is_bot: bool,
    pub content: String,
}

/// A member's voice location change. `old_channel`/`new_channel` are `None`
/// when the member was not connected / disconnected entirely.
#[derive(Debug, Clone)]
pub struct VoiceStateChange {
    pub tenant: TenantId,
    pub member: MemberId,
    /// Display name used when naming a provisioned channel.
    pub member_name: String,
    pub old_channel: Option<ChannelId>,
    pub new_channel: Option<ChannelId>,
}

// ── Platform trait ───────────────────────────────────────────────────────────

/// Calls the core issues against the chat platform.
///
/// Implementations are expected to be cheap to call concurrently; every
/// method is a single platform round-trip (or cache read) with whatever
/// timeout the underlying transport enforces.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Category a channel sits under, if any.
    async fn parent_category(
        &self,
        tenant: TenantId,
        channel: ChannelId,
    ) -> Result<Option<CategoryId>, AppError>;

    /// Permission overlay of a category, to be cloned onto new channels.
    async fn category_overwrites(
        &self,
        tenant: TenantId,
        category: CategoryId,
    ) -> Result<Vec<PermissionOverwrite>, AppError>;

    async fn create_voice_channel(
        &self,
        tenant: TenantId,
        request: CreateVoiceChannel,
    ) -> Result<ChannelId, AppError>;

    async fn move_member(
        &self,
        tenant: TenantId,
        member: MemberId,
        channel: ChannelId,
    ) -> Result<(), AppError>;

    async fn delete_channel(&self, tenant: TenantId, channel: ChannelId)
    -> Result<(), AppError>;

    /// Number of members currently connected to a voice channel. Always
    /// re-read at decision time, never cached by the caller.
    async fn occupant_count(
        &self,
        tenant: TenantId,
        channel: ChannelId,
    ) -> Result<usize, AppError>;

    /// Most recent messages of a channel, newest first, at most `limit`.
    async fn recent_messages(
        &self,
        channel: ChannelId,
        limit: u8,
    ) -> Result<Vec<MessageId>, AppError>;

    /// Delete a batch of messages in one request.
    async fn bulk_delete_messages(
        &self,
        channel: ChannelId,
        ids: &[MessageId],
    ) -> Result<(), AppError>;

    /// Reply to a message; returns the sent message's ID.
    async fn send_reply(
        &self,
        channel: ChannelId,
        to: MessageId,
        text: &str,
    ) -> Result<MessageId, AppError>;
}

// ── Test fake ────────────────────────────────────────────────────────────────

/// Recording in-memory platform used by unit tests across the crate.
#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[derive(Default)]
    pub struct FakePlatform {
        next_id: AtomicU64,
        pub calls: Mutex<Vec<String>>,
        /// Channel -> parent category.
        pub parents: Mutex<HashMap<ChannelId, CategoryId>>,
        /// Category -> overlay.
        pub overlays: Mutex<HashMap<CategoryId, Vec<PermissionOverwrite>>>,
        /// Voice channel -> occupant count returned by `occupant_count`.
        pub occupants: Mutex<HashMap<ChannelId, usize>>,
        /// History returned by `recent_messages`.
        pub history: Mutex<Vec<MessageId>>,
        /// When set, the named method fails with `AppError::Platform`.
        pub fail_on: Mutex<Option<&'static str>>,
        /// Replies sent, as `(channel, replied-to, text)`.
        pub replies: Mutex<Vec<(ChannelId, MessageId, String)>>,
        /// Every channel creation request, verbatim.
        pub created: Mutex<Vec<CreateVoiceChannel>>,
        /// IDs passed to `bulk_delete_messages`.
        pub bulk_deleted: Mutex<Vec<Vec<MessageId>>>,
    }

    impl FakePlatform {
        pub fn new() -> Self {
            Self {
                next_id: AtomicU64::new(9000),
                ..Default::default()
            }
        }

        pub fn fail_on(&self, method: &'static str) {
            *self.fail_on.lock().unwrap() = Some(method);
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self, method: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.starts_with(method))
                .count()
        }

        fn record(&self, method: &'static str, detail: String) -> Result<(), AppError> {
            self.calls.lock().unwrap().push(format!("{method}:{detail}"));
            if *self.fail_on.lock().unwrap() == Some(method) {
                return Err(AppError::Platform(format!("{method} forced failure")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Platform for FakePlatform {
        async fn parent_category(
            &self,
            _tenant: TenantId,
            channel: ChannelId,
        ) -> Result<Option<CategoryId>, AppError> {
            self.record("parent_category", channel.to_string())?;
            Ok(self.parents.lock().unwrap().get(&channel).copied())
        }

        async fn category_overwrites(
            &self,
            _tenant: TenantId,
            category: CategoryId,
        ) -> Result<Vec<PermissionOverwrite>, AppError> {
            self.record("category_overwrites", category.to_string())?;
            Ok(self
                .overlays
                .lock()
                .unwrap()
                .get(&category)
                .cloned()
                .unwrap_or_default())
        }

        async fn create_voice_channel(
            &self,
            _tenant: TenantId,
            request: CreateVoiceChannel,
        ) -> Result<ChannelId, AppError> {
            self.record("create_voice_channel", request.name.clone())?;
            let id = ChannelId(self.next_id.fetch_add(1, Ordering::SeqCst));
            // A freshly created channel is empty until someone is moved in.
            self.occupants.lock().unwrap().insert(id, 0);
            self.created.lock().unwrap().push(request);
            Ok(id)
        }

        async fn move_member(
            &self,
            _tenant: TenantId,
            member: MemberId,
            channel: ChannelId,
        ) -> Result<(), AppError> {
            self.record("move_member", format!("{member}->{channel}"))?;
            *self.occupants.lock().unwrap().entry(channel).or_insert(0) += 1;
            Ok(())
        }

        async fn delete_channel(
            &self,
            _tenant: TenantId,
            channel: ChannelId,
        ) -> Result<(), AppError> {
            self.record("delete_channel", channel.to_string())?;
            self.occupants.lock().unwrap().remove(&channel);
            Ok(())
        }

        async fn occupant_count(
            &self,
            _tenant: TenantId,
            channel: ChannelId,
        ) -> Result<usize, AppError> {
            self.record("occupant_count", channel.to_string())?;
            Ok(self.occupants.lock().unwrap().get(&channel).copied().unwrap_or(0))
        }

        async fn recent_messages(
            &self,
            channel: ChannelId,
            limit: u8,
        ) -> Result<Vec<MessageId>, AppError> {
            self.record("recent_messages", channel.to_string())?;
            let history = self.history.lock().unwrap();
            Ok(history.iter().rev().take(limit as usize).copied().collect())
        }

        async fn bulk_delete_messages(
            &self,
            channel: ChannelId,
            ids: &[MessageId],
        ) -> Result<(), AppError> {
            self.record("bulk_delete_messages", format!("{channel}:{}", ids.len()))?;
            self.bulk_deleted.lock().unwrap().push(ids.to_vec());
            Ok(())
        }

        async fn send_reply(
            &self,
            channel: ChannelId,
            to: MessageId,
            text: &str,
        ) -> Result<MessageId, AppError> {
            self.record("send_reply", text.to_string())?;
            let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst));
            self.replies.lock().unwrap().push((channel, to, text.to_string()));
            Ok(id)
        }
    }
}
