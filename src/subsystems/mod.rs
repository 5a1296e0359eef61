//! Subsystem modules for the Nelum bot.

pub mod commands;
pub mod comms;
pub mod voice;
