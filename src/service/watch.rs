use std::net::TcpStream;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use tungstenite::client::AutoStream;
use tungstenite::stream::Stream;
use tungstenite::{Message, WebSocket};

use crate::model::{SolutionId, VerdictMessage};
use crate::progress::{ProgressEvent, Report};
use crate::service::error::ServiceError;
use crate::{Error, Result};

/// The judge publishes per-solution progress through a hosted Pusher app.
static PUSHER_URL: &str = "wss://ws-ap1.pusher.com/app/a2cb611847131e062b32";
static UPDATE_EVENT: &str = "update";

/// Longest single blocking read; keeps the deadline responsive even when the
/// channel stays silent.
const RECV_TICK: Duration = Duration::from_millis(500);

/// A source of judge progress messages. `recv` blocks for at most `wait` and
/// returns nothing when no update arrived in that window.
pub trait ReceiveMessage {
    fn recv(&mut self, wait: Duration) -> Result<Option<VerdictMessage>>;
}

/// Opens a progress channel for one solution.
pub trait Subscribe {
    type Channel: ReceiveMessage;

    fn subscribe(&self, solution_id: &SolutionId) -> Result<Self::Channel>;
}

/// Consumes progress messages in arrival order until a terminal one arrives,
/// reporting every update. Fails with a timeout once `timeout` has elapsed
/// without a terminal verdict.
pub fn await_verdict<C: ReceiveMessage>(
    chan: &mut C,
    timeout: Duration,
    rep: &mut dyn Report,
) -> Result<VerdictMessage> {
    let deadline = Instant::now() + timeout;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::new(ServiceError::Timeout { waited: timeout })
                .context("Verdict was not reached in time"));
        }
        let wait = RECV_TICK.min(deadline.saturating_duration_since(now));
        if let Some(message) = chan.recv(wait)? {
            rep.event(ProgressEvent::VerdictUpdate(message.clone()))?;
            if message.status().is_terminal() {
                return Ok(message);
            }
        }
    }
}

#[derive(Deserialize, Debug)]
struct Envelope {
    event: String,
    // Pusher wraps the payload as a json-encoded string
    #[serde(default)]
    data: Option<String>,
}

fn parse_event(text: &str) -> Result<Option<VerdictMessage>> {
    let envelope: Envelope =
        serde_json::from_str(text).context("Could not decode channel message")?;
    if envelope.event != UPDATE_EVENT {
        return Ok(None);
    }
    let data = envelope
        .data
        .ok_or_else(|| Error::msg("Received update event without data"))?;
    let message =
        serde_json::from_str(&data).context("Could not decode progress update")?;
    Ok(Some(message))
}

/// Production channel : a Pusher-protocol WebSocket subscribed to the
/// solution's channel.
pub struct PusherChannel {
    ws: WebSocket<AutoStream>,
}

impl PusherChannel {
    fn set_read_timeout(&mut self, wait: Duration) -> Result<()> {
        let stream: &TcpStream = match self.ws.get_ref() {
            Stream::Plain(stream) => stream,
            Stream::Tls(stream) => stream.get_ref(),
        };
        stream
            .set_read_timeout(Some(wait.max(Duration::from_millis(10))))
            .context("Could not set read timeout on channel")?;
        Ok(())
    }
}

impl ReceiveMessage for PusherChannel {
    fn recv(&mut self, wait: Duration) -> Result<Option<VerdictMessage>> {
        self.set_read_timeout(wait)?;
        match self.ws.read_message() {
            Ok(Message::Text(text)) => parse_event(&text),
            Ok(Message::Ping(payload)) => {
                self.ws
                    .write_message(Message::Pong(payload))
                    .context("Could not answer channel ping")?;
                Ok(None)
            }
            Ok(_) => Ok(None),
            Err(tungstenite::Error::Io(err))
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(err) => Err(err).context("Lost connection to judge progress channel"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PusherSubscriber;

impl Subscribe for PusherSubscriber {
    type Channel = PusherChannel;

    fn subscribe(&self, solution_id: &SolutionId) -> Result<Self::Channel> {
        let url = Url::parse_with_params(
            PUSHER_URL,
            &[
                ("protocol", "7"),
                ("client", env!("CARGO_PKG_NAME")),
                ("version", env!("CARGO_PKG_VERSION")),
            ],
        )
        .context("Could not parse channel url")?;
        let (mut ws, _res) =
            tungstenite::connect(url).context("Could not connect to judge progress channel")?;
        let subscribe = json!({
            "event": "pusher:subscribe",
            "data": { "channel": format!("solution-{}", solution_id) },
        });
        ws.write_message(Message::Text(subscribe.to_string()))
            .context("Could not subscribe to solution channel")?;
        Ok(PusherChannel { ws })
    }
}
