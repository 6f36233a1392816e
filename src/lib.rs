pub mod auth;
pub mod balance;
pub mod client;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event_loop;
pub mod schemas;
pub mod service;
pub mod session;
pub mod store;
pub mod validator;
pub mod wire;

pub use client::{ClientDispatcher, TcpTransport, Transport};
pub use dispatcher::ServerDispatcher;
pub use event_loop::{EventLoop, RequestHandler};
pub use service::LedgerService;
