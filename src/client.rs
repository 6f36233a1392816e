use std::{future::Future, io};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpStream, ToSocketAddrs},
};
use tracing::{debug, error, info};

use crate::{
    command::{tokenize, usage_listing, Command, CommandKind},
    error::ClientError,
    event_loop::BUFFER_SIZE,
    validator::validate,
    wire::{LoginPayload, PaymentHistoryPayload, Request, Response, StatusPayload},
};

pub const SUCCESS_MESSAGE: &str = "***Success***";
pub const COMMUNICATION_ERROR_MESSAGE: &str =
    "There was an error communicating with the server. Please try again later";
const NO_NOTIFICATIONS_MESSAGE: &str = "No new notifications to show";
const NO_BALANCES_MESSAGE: &str = "No one owes you and you do not owe anyone";
const NO_PAYMENTS_MESSAGE: &str = "No payments recorded";

/// Carries one encoded request to the server and brings back its response.
pub trait Transport {
    fn round_trip(&mut self, request: String) -> impl Future<Output = io::Result<String>>;
}

pub struct TcpTransport {
    stream: TcpStream,
    buffer: Vec<u8>,
}

impl TcpTransport {
    pub async fn connect(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        info!(server = %stream.peer_addr()?, "connected to the server");
        Ok(Self {
            stream,
            buffer: vec![0; BUFFER_SIZE],
        })
    }
}

impl Transport for TcpTransport {
    // Mirrors the server: one write, then a single read is the response.
    async fn round_trip(&mut self, request: String) -> io::Result<String> {
        self.stream.write_all(request.as_bytes()).await?;
        let n = self.stream.read(&mut self.buffer).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            ));
        }
        Ok(String::from_utf8_lossy(&self.buffer[..n]).into_owned())
    }
}

/// Turns console lines into requests and responses into console text.
///
/// Holds the auth token between calls: a successful `login` stores it and a
/// successful `logout` clears it.
pub struct ClientDispatcher<T> {
    transport: T,
    auth_token: Option<String>,
}

impl<T: Transport> ClientDispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            auth_token: None,
        }
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub async fn execute(&mut self, input: &str) -> String {
        let Some(command) = tokenize(input) else {
            return usage_listing();
        };
        let kind = match validate(&command) {
            Ok(CommandKind::Help) | Err(_) => return usage_listing(),
            Ok(kind) => kind,
        };

        match self.send(command).await {
            Ok(response) => self.render(kind, response).unwrap_or_else(|err| {
                error!(%err, "could not read server response");
                COMMUNICATION_ERROR_MESSAGE.to_owned()
            }),
            Err(err) => {
                error!(%err, "communication error");
                COMMUNICATION_ERROR_MESSAGE.to_owned()
            }
        }
    }

    async fn send(&mut self, command: Command) -> Result<Response, ClientError> {
        debug!(command = %command.name, "sending request");
        let request = serde_json::to_string(&Request {
            command,
            auth_token: self.auth_token.clone(),
        })?;
        let raw = self.transport.round_trip(request).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn render(&mut self, kind: CommandKind, response: Response) -> Result<String, ClientError> {
        if !response.was_successful {
            return Ok(response.error_message.unwrap_or_default());
        }
        let data = response.data.as_deref().unwrap_or("null");

        let rendered = match kind {
            CommandKind::Login => {
                let payload: LoginPayload = serde_json::from_str(data)?;
                self.auth_token = Some(payload.auth_token);
                render_notifications(&payload.notifications)
            }
            CommandKind::Logout => {
                self.auth_token = None;
                SUCCESS_MESSAGE.to_owned()
            }
            CommandKind::GetStatus => {
                let payload: StatusPayload = serde_json::from_str(data)?;
                render_status(&payload)
            }
            CommandKind::GetPaymentHistory => {
                let payload: PaymentHistoryPayload = serde_json::from_str(data)?;
                render_payments(&payload)
            }
            CommandKind::Help => usage_listing(),
            CommandKind::AddFriend
            | CommandKind::CreateGroup
            | CommandKind::Payed
            | CommandKind::Register
            | CommandKind::Split
            | CommandKind::SplitGroup => SUCCESS_MESSAGE.to_owned(),
        };
        Ok(rendered)
    }
}

fn render_notifications(notifications: &[String]) -> String {
    if notifications.is_empty() {
        return NO_NOTIFICATIONS_MESSAGE.to_owned();
    }
    notifications.join("\n")
}

fn render_status(payload: &StatusPayload) -> String {
    if payload.user_to_levs.is_empty() {
        return NO_BALANCES_MESSAGE.to_owned();
    }
    payload
        .user_to_levs
        .iter()
        .map(|(user, levs)| {
            if *levs > 0.0 {
                format!("User {user} owes you an amount of {levs:.2} levs")
            } else {
                format!("You owe {user} an amount of {:.2} levs", -levs)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_payments(payload: &PaymentHistoryPayload) -> String {
    if payload.payment_history.is_empty() {
        return NO_PAYMENTS_MESSAGE.to_owned();
    }
    payload
        .payment_history
        .iter()
        .map(|payment| {
            format!(
                "{} payed you {:.2} levs on {}",
                payment.payed_by,
                payment.levs,
                payment.payed_on.format("%Y-%m-%d")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
