//! # SubTrack Channels
//! Outbound notification channels. Every channel implements
//! [`subtrack_core::ChannelSender`] and reports failures as `Err`; the
//! dispatcher turns those into per-channel success flags.

pub mod bark;
pub mod email;
pub mod push_relay;
pub mod registry;
pub mod telegram;
pub mod webhook;
pub mod wechat;

pub use registry::build_senders;

use subtrack_core::{Result, SubTrackError};

const ERROR_BODY_LIMIT: usize = 200;

/// Read the response body, turning non-2xx statuses into channel errors.
pub(crate) async fn read_success(channel: &str, response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| SubTrackError::channel(format!("{channel}: reading response failed: {e}")))?;
    if !status.is_success() {
        let snippet: String = body.chars().take(ERROR_BODY_LIMIT).collect();
        return Err(SubTrackError::channel(format!("{channel}: HTTP {status}: {snippet}")));
    }
    Ok(body)
}

/// Map a transport error into a channel error.
pub(crate) fn transport(channel: &str) -> impl Fn(reqwest::Error) -> SubTrackError + '_ {
    move |e| SubTrackError::channel(format!("{channel}: request failed: {e}"))
}
