//! Voice subsystem — ephemeral personal voice channels.
//!
//! A member joining the configured lobby channel gets a voice channel of
//! their own, created under the lobby's parent category with the
//! category's permission overlay cloned onto it, and is moved into it.
//! When a tracked channel's last occupant leaves, the channel is deleted.
//!
//! Lifecycle per member: idle, provisioning (transient, inside
//! [`VoiceManager::handle`]), occupying, draining once the occupant count
//! reaches zero. The occupant count is re-read from the platform at every
//! drain decision; several members can leave within one burst of events
//! and a cached count would delete channels out from under them.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{info, warn};

use crate::error::AppError;
use crate::platform::{
    CategoryId, ChannelId, CreateVoiceChannel, MemberId, Platform, TenantId, VoiceStateChange,
};

/// A live provisioned channel, tracked until it drains empty.
#[derive(Debug, Clone)]
pub struct EphemeralChannel {
    pub channel: ChannelId,
    pub owner: MemberId,
    pub parent: Option<CategoryId>,
}

pub struct VoiceManager {
    lobby: ChannelId,
    live: Mutex<HashMap<ChannelId, EphemeralChannel>>,
}

impl VoiceManager {
    pub fn new(lobby: ChannelId) -> Self {
        Self {
            lobby,
            live: Mutex::new(HashMap::new()),
        }
    }

    /// IDs of currently tracked channels.
    pub fn live_channels(&self) -> Vec<ChannelId> {
        self.live.lock().expect("live map poisoned").keys().copied().collect()
    }

    fn is_live(&self, channel: ChannelId) -> bool {
        self.live.lock().expect("live map poisoned").contains_key(&channel)
    }

    /// Process one voice location change. Platform faults are logged and
    /// absorbed here; the live map always stays consistent with what the
    /// platform acknowledged.
    pub async fn handle(&self, platform: &dyn Platform, change: &VoiceStateChange) {
        // Lobby entry provisions a personal channel. There is deliberately
        // no check for an existing channel owned by the same member: a
        // re-entry while one is still live provisions a second one, and
        // the first drains like any other.
        if change.new_channel == Some(self.lobby) && change.old_channel != Some(self.lobby) {
            if let Err(e) = self.provision(platform, change).await {
                warn!(
                    tenant = %change.tenant,
                    member = %change.member,
                    error = %e,
                    "provisioning failed"
                );
            }
        }

        // Leaving a tracked channel may drain it.
        if let Some(old) = change.old_channel {
            if change.new_channel != Some(old) && self.is_live(old) {
                if let Err(e) = self.drain(platform, change.tenant, old).await {
                    warn!(tenant = %change.tenant, channel = %old, error = %e, "drain failed");
                }
            }
        }
    }

    async fn provision(
        &self,
        platform: &dyn Platform,
        change: &VoiceStateChange,
    ) -> Result<(), AppError> {
        let tenant = change.tenant;
        let parent = platform.parent_category(tenant, self.lobby).await?;
        let overwrites = match parent {
            Some(category) => platform.category_overwrites(tenant, category).await?,
            None => Vec::new(),
        };

        let request = CreateVoiceChannel {
            name: format!("{}'s Channel", change.member_name),
            parent,
            overwrites,
        };
        let channel = platform.create_voice_channel(tenant, request).await?;

        // Track before the move: if the move fails the channel already
        // exists, and only a tracked channel can ever be drained.
        self.live.lock().expect("live map poisoned").insert(
            channel,
            EphemeralChannel {
                channel,
                owner: change.member,
                parent,
            },
        );

        platform.move_member(tenant, change.member, channel).await?;

        info!(
            %tenant,
            member = %change.member,
            %channel,
            "provisioned ephemeral voice channel"
        );
        Ok(())
    }

    async fn drain(
        &self,
        platform: &dyn Platform,
        tenant: TenantId,
        channel: ChannelId,
    ) -> Result<(), AppError> {
        let occupants = platform.occupant_count(tenant, channel).await?;
        if occupants > 0 {
            return Ok(());
        }

        // Untrack only after the platform acknowledged the delete; a
        // failed delete leaves the channel tracked for the next
        // empty-check.
        platform.delete_channel(tenant, channel).await?;
        self.live.lock().expect("live map poisoned").remove(&channel);

        info!(%tenant, %channel, "drained ephemeral voice channel");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::FakePlatform;
    use crate::platform::{OverwriteTarget, PermissionOverwrite};

    const T: TenantId = TenantId(1);
    const LOBBY: ChannelId = ChannelId(500);
    const CATEGORY: CategoryId = CategoryId(600);
    const ALICE: MemberId = MemberId(7);

    fn platform_with_lobby() -> FakePlatform {
        let platform = FakePlatform::new();
        platform.parents.lock().unwrap().insert(LOBBY, CATEGORY);
        platform.overlays.lock().unwrap().insert(
            CATEGORY,
            vec![PermissionOverwrite {
                target: OverwriteTarget::Role(1111),
                allow: 0x400,
                deny: 0x800,
            }],
        );
        platform
    }

    fn change(
        old: Option<ChannelId>,
        new: Option<ChannelId>,
    ) -> VoiceStateChange {
        VoiceStateChange {
            tenant: T,
            member: ALICE,
            member_name: "alice".into(),
            old_channel: old,
            new_channel: new,
        }
    }

    #[tokio::test]
    async fn lobby_entry_provisions_and_moves() {
        let platform = platform_with_lobby();
        let manager = VoiceManager::new(LOBBY);

        manager.handle(&platform, &change(None, Some(LOBBY))).await;

        let live = manager.live_channels();
        assert_eq!(live.len(), 1);
        let created = platform.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, "alice's Channel");
        assert_eq!(created[0].parent, Some(CATEGORY));
        assert_eq!(created[0].overwrites.len(), 1);
        assert_eq!(platform.call_count("move_member"), 1);
        // The member now occupies the provisioned channel.
        assert_eq!(
            platform.occupants.lock().unwrap().get(&live[0]).copied(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn movement_within_lobby_or_between_plain_channels_is_ignored() {
        let platform = platform_with_lobby();
        let manager = VoiceManager::new(LOBBY);

        // Already in the lobby (e.g. mute toggles arrive as state updates).
        manager
            .handle(&platform, &change(Some(LOBBY), Some(LOBBY)))
            .await;
        // Moving between two untracked channels.
        manager
            .handle(&platform, &change(Some(ChannelId(1)), Some(ChannelId(2))))
            .await;

        assert!(manager.live_channels().is_empty());
        assert_eq!(platform.call_count("create_voice_channel"), 0);
        assert_eq!(platform.call_count("delete_channel"), 0);
    }

    #[tokio::test]
    async fn empty_tracked_channel_is_deleted_exactly_once() {
        let platform = platform_with_lobby();
        let manager = VoiceManager::new(LOBBY);

        manager.handle(&platform, &change(None, Some(LOBBY))).await;
        let own = manager.live_channels()[0];

        // Owner leaves for an untracked channel; their old channel is empty.
        platform.occupants.lock().unwrap().insert(own, 0);
        manager
            .handle(&platform, &change(Some(own), Some(ChannelId(2))))
            .await;

        assert!(manager.live_channels().is_empty());
        assert_eq!(platform.call_count("delete_channel"), 1);

        // A straggler event about the same channel does nothing further.
        manager
            .handle(&platform, &change(Some(own), None))
            .await;
        assert_eq!(platform.call_count("delete_channel"), 1);
    }

    #[tokio::test]
    async fn occupied_channel_survives_a_leave_event() {
        let platform = platform_with_lobby();
        let manager = VoiceManager::new(LOBBY);

        manager.handle(&platform, &change(None, Some(LOBBY))).await;
        let own = manager.live_channels()[0];

        // Someone is still inside when the owner leaves.
        platform.occupants.lock().unwrap().insert(own, 1);
        manager
            .handle(&platform, &change(Some(own), Some(ChannelId(2))))
            .await;

        assert_eq!(manager.live_channels(), vec![own]);
        assert_eq!(platform.call_count("delete_channel"), 0);
    }

    #[tokio::test]
    async fn create_failure_registers_nothing() {
        let platform = platform_with_lobby();
        platform.fail_on("create_voice_channel");
        let manager = VoiceManager::new(LOBBY);

        manager.handle(&platform, &change(None, Some(LOBBY))).await;

        assert!(manager.live_channels().is_empty());
        assert_eq!(platform.call_count("move_member"), 0);
    }

    #[tokio::test]
    async fn move_failure_keeps_channel_tracked_for_drain() {
        let platform = platform_with_lobby();
        platform.fail_on("move_member");
        let manager = VoiceManager::new(LOBBY);

        manager.handle(&platform, &change(None, Some(LOBBY))).await;

        // The channel exists on the platform, so it must stay tracked;
        // the next empty-check cleans it up.
        assert_eq!(manager.live_channels().len(), 1);
    }

    #[tokio::test]
    async fn delete_failure_keeps_channel_tracked_for_retry() {
        let platform = platform_with_lobby();
        let manager = VoiceManager::new(LOBBY);

        manager.handle(&platform, &change(None, Some(LOBBY))).await;
        let own = manager.live_channels()[0];
        platform.occupants.lock().unwrap().insert(own, 0);

        platform.fail_on("delete_channel");
        manager
            .handle(&platform, &change(Some(own), None))
            .await;
        assert_eq!(manager.live_channels(), vec![own]);

        // Once the platform recovers, the next event retries the delete.
        *platform.fail_on.lock().unwrap() = None;
        platform.occupants.lock().unwrap().insert(own, 0);
        manager
            .handle(&platform, &change(Some(own), None))
            .await;
        assert!(manager.live_channels().is_empty());
    }

    #[tokio::test]
    async fn lobby_reentry_provisions_a_second_channel() {
        // Documents the unguarded behaviour: re-entering the lobby while
        // already owning a live channel creates another one. The vacated
        // first channel then drains like any other.
        let platform = platform_with_lobby();
        let manager = VoiceManager::new(LOBBY);

        manager.handle(&platform, &change(None, Some(LOBBY))).await;
        let first = manager.live_channels()[0];

        // Owner pops back into the lobby; their first channel is now empty.
        platform.occupants.lock().unwrap().insert(first, 0);
        manager
            .handle(&platform, &change(Some(first), Some(LOBBY)))
            .await;

        assert_eq!(platform.call_count("create_voice_channel"), 2);
        let live = manager.live_channels();
        assert_eq!(live.len(), 1);
        assert_ne!(live[0], first, "first channel drained, second is live");
    }
}
