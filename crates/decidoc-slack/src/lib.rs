//! Decidoc Slack — the chat-provider client.
//!
//! One module: [`client::SlackClient`], a multi-tenant Slack Web API client
//! used for webhook enrichment (profiles, permalinks) and channel metadata.

pub mod client;

pub use client::{ChannelInfo, SlackClient, SlackUserProfile};
