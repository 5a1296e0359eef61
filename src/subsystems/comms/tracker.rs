//! Message tracker — remembers which recent messages the bot may clean up.
//!
//! Two process-wide ID sets: messages the bot authored, and user messages
//! that invoked a command. `clear` sweeps one channel: it fetches the most
//! recent page of history, deletes the tracked subset in a single bulk
//! request, and forgets what it deleted. Anything that has scrolled past
//! the fetched window stays where it is — that bound is deliberate.
//!
//! The sets are unbounded for the process lifetime; bulk-clear is the only
//! thing that shrinks them. A scaling limit, not a correctness one.

use std::collections::HashSet;
use std::sync::Mutex;

use tracing::{debug, info};

use crate::error::AppError;
use crate::platform::{ChannelId, MessageId, Platform};

/// How much channel history one `clear` call can see.
const CLEAR_FETCH_LIMIT: u8 = 100;

#[derive(Default)]
struct TrackedSets {
    bot: HashSet<MessageId>,
    user_commands: HashSet<MessageId>,
}

#[derive(Default)]
pub struct MessageTracker {
    sets: Mutex<TrackedSets>,
}

impl MessageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a bot-authored message.
    pub fn track_bot(&self, id: MessageId) {
        self.sets.lock().expect("tracker mutex poisoned").bot.insert(id);
    }

    /// Remember a user message that carried a command.
    pub fn track_command(&self, id: MessageId) {
        self.sets
            .lock()
            .expect("tracker mutex poisoned")
            .user_commands
            .insert(id);
    }

    #[cfg(test)]
    fn tracked_total(&self) -> usize {
        let sets = self.sets.lock().unwrap();
        sets.bot.len() + sets.user_commands.len()
    }

    /// Bulk-delete every tracked message within the channel's most recent
    /// history page. Returns how many messages were deleted.
    pub async fn clear(
        &self,
        platform: &dyn Platform,
        channel: ChannelId,
    ) -> Result<usize, AppError> {
        let recent = platform.recent_messages(channel, CLEAR_FETCH_LIMIT).await?;

        let to_delete: Vec<MessageId> = {
            let sets = self.sets.lock().expect("tracker mutex poisoned");
            recent
                .into_iter()
                .filter(|id| sets.bot.contains(id) || sets.user_commands.contains(id))
                .collect()
        };

        if to_delete.is_empty() {
            debug!(%channel, "nothing tracked in the recent window");
            return Ok(0);
        }

        platform.bulk_delete_messages(channel, &to_delete).await?;

        // Only forget IDs once the platform acknowledged the delete.
        let mut sets = self.sets.lock().expect("tracker mutex poisoned");
        for id in &to_delete {
            sets.bot.remove(id);
            sets.user_commands.remove(id);
        }
        info!(%channel, deleted = to_delete.len(), "cleared tracked messages");
        Ok(to_delete.len())
    }
}
