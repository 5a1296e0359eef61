//! Command router — turns inbound chat messages into registry operations.
//!
//! Protocol: messages starting with the trigger character (default `!`)
//! are commands. The first token selects the operation (`add`, `edit`,
//! `remove`, `clear`, `help`) or, for any other word, a lookup of a custom
//! command. Reply text is everything after the name token, rejoined with
//! single spaces. Command words and names match case-insensitively.
//!
//! The router is also where recoverable [`CommandError`]s become reply
//! text. The registry reports *what* went wrong; how that is phrased to
//! the user is policy that lives here.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::platform::{InboundMessage, Platform};
use crate::subsystems::commands::{CommandError, CommandRegistry};

use super::tracker::MessageTracker;

/// A parsed command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Add { name: String, reply: String },
    Edit { name: String, reply: String },
    Remove { name: String },
    Clear,
    Help,
    Lookup { name: String },
}

/// Parse a raw message into an [`Invocation`]. `None` when the message is
/// not a command (no trigger prefix, or nothing after the trigger).
pub fn parse(content: &str, trigger: char) -> Option<Invocation> {
    let body = content.strip_prefix(trigger)?;
    let mut tokens = body.split_whitespace();
    let word = tokens.next()?.to_lowercase();

    let rest_name = |tokens: &mut std::str::SplitWhitespace<'_>| {
        tokens.next().unwrap_or_default().to_string()
    };

    Some(match word.as_str() {
        "add" => {
            let name = rest_name(&mut tokens);
            let reply = tokens.collect::<Vec<_>>().join(" ");
            Invocation::Add { name, reply }
        }
        "edit" => {
            let name = rest_name(&mut tokens);
            let reply = tokens.collect::<Vec<_>>().join(" ");
            Invocation::Edit { name, reply }
        }
        "remove" => Invocation::Remove { name: rest_name(&mut tokens) },
        "clear" => Invocation::Clear,
        "help" => Invocation::Help,
        // Anything else is a custom command; trailing tokens are ignored.
        _ => Invocation::Lookup { name: word },
    })
}

pub struct Router {
    registry: Arc<CommandRegistry>,
    tracker: Arc<MessageTracker>,
    trigger: char,
}

impl Router {
    pub fn new(
        registry: Arc<CommandRegistry>,
        tracker: Arc<MessageTracker>,
        trigger: char,
    ) -> Self {
        Self { registry, tracker, trigger }
    }

    pub fn tracker(&self) -> &Arc<MessageTracker> {
        &self.tracker
    }

    /// Handle one inbound message end to end: track it, run the command,
    /// send the reply, track the reply. Faults are logged, never raised —
    /// a broken command must not take the event loop with it.
    pub async fn handle_message(&self, platform: &dyn Platform, msg: &InboundMessage) {
        if msg.author_is_bot {
            // Track other bot traffic too so `clear` can sweep it.
            self.tracker.track_bot(msg.id);
            return;
        }

        let Some(invocation) = parse(&msg.content, self.trigger) else {
            return;
        };
        self.tracker.track_command(msg.id);
        debug!(tenant = %msg.tenant, ?invocation, "command received");

        let reply = self.dispatch(platform, msg, invocation).await;

        if let Some(text) = reply {
            match platform.send_reply(msg.channel, msg.id, &text).await {
                Ok(sent) => self.tracker.track_bot(sent),
                Err(e) => warn!(channel = %msg.channel, error = %e, "reply failed"),
            }
        }
    }

    async fn dispatch(
        &self,
        platform: &dyn Platform,
        msg: &InboundMessage,
        invocation: Invocation,
    ) -> Option<String> {
        let t = self.trigger;
        match invocation {
            Invocation::Add { name, reply } => {
                Some(match self.registry.add(msg.tenant, &name, &reply).await {
                    Ok(confirmation) => confirmation,
                    Err(e) => self.render_error(e, "add"),
                })
            }
            Invocation::Edit { name, reply } => {
                Some(match self.registry.edit(msg.tenant, &name, &reply).await {
                    Ok(confirmation) => confirmation,
                    Err(e) => self.render_error(e, "edit"),
                })
            }
            Invocation::Remove { name } => {
                Some(match self.registry.remove(msg.tenant, &name).await {
                    Ok(confirmation) => confirmation,
                    Err(e) => self.render_error(e, "remove"),
                })
            }
            Invocation::Clear => {
                // Sweeps are silent; a reply here would immediately become
                // new clutter to sweep.
                if let Err(e) = self.tracker.clear(platform, msg.channel).await {
                    warn!(channel = %msg.channel, error = %e, "clear failed");
                }
                None
            }
            Invocation::Help => {
                let names = self.registry.list(msg.tenant).await;
                Some(if names.is_empty() {
                    format!("No custom commands yet. Use {t}add <name> <reply> to create one.")
                } else {
                    let lines: Vec<String> =
                        names.into_iter().map(|n| format!("{t}{n}")).collect();
                    format!("Available commands:\n{}", lines.join("\n"))
                })
            }
            Invocation::Lookup { name } => {
                Some(match self.registry.lookup(msg.tenant, &name).await {
                    Some(reply) => reply,
                    None => format!(
                        "Unknown command. Use {t}add, {t}edit or {t}remove to manage commands."
                    ),
                })
            }
        }
    }

    fn render_error(&self, error: CommandError, verb: &str) -> String {
        let t = self.trigger;
        match error {
            CommandError::InvalidName(name) if name.is_empty() => {
                format!("Usage: {t}{verb} <name> <reply>")
            }
            CommandError::InvalidName(_) => {
                "Reserved keywords cannot be used as command names.".to_string()
            }
            CommandError::InvalidReply => format!("Usage: {t}{verb} <name> <reply>"),
            CommandError::NotFound(name) => {
                format!("Command \"{name}\" not found. Use {t}add to create it first.")
            }
            CommandError::Store(e) => {
                warn!(error = %e, "command mutation failed");
                "Something went wrong while handling that command.".to_string()
            }
        }
    }
}
