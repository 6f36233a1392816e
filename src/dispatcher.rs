use serde::Serialize;
use tracing::{debug, error};

use crate::{
    command::{usage_listing, Command, CommandKind},
    error::{LedgerError, LedgerResult},
    event_loop::RequestHandler,
    schemas::{Group, Payment, User},
    service::LedgerService,
    store::Store,
    validator::validate,
    wire::{LoginPayload, PaymentHistoryPayload, Request, Response, StatusPayload},
};

pub const INVALID_COMMAND_MESSAGE: &str = "This command is invalid!";
const STORAGE_FAILURE_MESSAGE: &str = "The operation could not be completed, please try again later";

/// Routes validated commands to the ledger and packages the outcome.
pub struct ServerDispatcher<U, G, P> {
    service: LedgerService<U, G, P>,
}

impl<U, G, P> ServerDispatcher<U, G, P>
where
    U: Store<User>,
    G: Store<Group>,
    P: Store<Payment>,
{
    pub fn new(service: LedgerService<U, G, P>) -> Self {
        Self { service }
    }

    /// Executes `command` on behalf of whoever holds `auth_token`.
    pub fn dispatch(&mut self, command: &Command, auth_token: &str) -> Response {
        let kind = match validate(command) {
            Ok(kind) => kind,
            Err(err) => {
                debug!(%err, "rejected command");
                return Response::error(INVALID_COMMAND_MESSAGE);
            }
        };
        debug!(command = kind.name(), owner = ?command.owner, "executing command");

        match self.execute(kind, &command.args, auth_token) {
            Ok(response) => response,
            Err(LedgerError::Storage(err)) => {
                error!(command = kind.name(), %err, "storage failure");
                Response::error(STORAGE_FAILURE_MESSAGE)
            }
            Err(err) => {
                debug!(command = kind.name(), %err, "command failed");
                Response::error(err.to_string())
            }
        }
    }

    fn execute(
        &mut self,
        kind: CommandKind,
        args: &[String],
        token: &str,
    ) -> LedgerResult<Response> {
        let service = &mut self.service;
        let response = match kind {
            CommandKind::AddFriend => {
                let [friend] = fixed::<1>(args)?;
                service.add_friend(token, friend)?;
                Response::ok()
            }
            CommandKind::CreateGroup => {
                let (group, members) = args.split_first().ok_or_else(malformed)?;
                service.create_group(token, group, members)?;
                Response::ok()
            }
            CommandKind::GetStatus => encode(&StatusPayload {
                user_to_levs: service.get_status(token)?,
            }),
            CommandKind::Login => {
                let [username, password] = fixed::<2>(args)?;
                let outcome = service.login(username, password)?;
                encode(&LoginPayload {
                    auth_token: outcome.token,
                    notifications: outcome.notifications,
                })
            }
            CommandKind::Logout => {
                service.logout(token);
                Response::ok()
            }
            CommandKind::Payed => {
                let [amount, friend] = fixed::<2>(args)?;
                service.payed(token, friend, parse_amount(amount)?)?;
                Response::ok()
            }
            CommandKind::Register => {
                let [username, password] = fixed::<2>(args)?;
                service.register(username, password)?;
                Response::ok()
            }
            CommandKind::Split => {
                let [amount, friend, reason] = fixed::<3>(args)?;
                service.split(token, friend, parse_amount(amount)?, reason)?;
                Response::ok()
            }
            CommandKind::SplitGroup => {
                let [amount, group, reason] = fixed::<3>(args)?;
                service.split_group(token, group, parse_amount(amount)?, reason)?;
                Response::ok()
            }
            CommandKind::GetPaymentHistory => encode(&PaymentHistoryPayload {
                payment_history: service
                    .get_payment_history(token)?
                    .into_iter()
                    .map(Into::into)
                    .collect(),
            }),
            CommandKind::Help => Response::ok_with(usage_listing()),
        };
        Ok(response)
    }
}

impl<U, G, P> RequestHandler for ServerDispatcher<U, G, P>
where
    U: Store<User>,
    G: Store<Group>,
    P: Store<Payment>,
{
    fn handle(&mut self, request: &str) -> String {
        let response = match serde_json::from_str::<Request>(request) {
            Ok(request) => {
                let token = request.auth_token.unwrap_or_default();
                let owner = self.service.resolve(&token).ok().map(str::to_owned);
                let command = request.command.with_owner(owner);
                self.dispatch(&command, &token)
            }
            Err(err) => {
                debug!(%err, "undecodable request");
                Response::error(INVALID_COMMAND_MESSAGE)
            }
        };

        serde_json::to_string(&response).unwrap_or_else(|err| {
            error!(%err, "could not encode response");
            format!(r#"{{"wasSuccessful":false,"errorMessage":"{STORAGE_FAILURE_MESSAGE}"}}"#)
        })
    }
}

// The validator has already checked arity and amount format, so these only
// fail if the registry and this dispatcher disagree.
fn fixed<const N: usize>(args: &[String]) -> LedgerResult<&[String; N]> {
    args.try_into().map_err(|_| malformed())
}

fn malformed() -> LedgerError {
    LedgerError::invalid_operation(INVALID_COMMAND_MESSAGE)
}

fn parse_amount(amount: &str) -> LedgerResult<f64> {
    amount.parse().map_err(|_| malformed())
}

fn encode<T: Serialize>(payload: &T) -> Response {
    match serde_json::to_string(payload) {
        Ok(data) => Response::ok_with(data),
        Err(err) => {
            error!(%err, "could not encode response payload");
            Response::error(STORAGE_FAILURE_MESSAGE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::TokenMinter, store::MemoryStore};
    use pretty_assertions::assert_eq;

    type TestDispatcher = ServerDispatcher<MemoryStore<User>, MemoryStore<Group>, MemoryStore<Payment>>;

    fn dispatcher() -> TestDispatcher {
        ServerDispatcher::new(LedgerService::new(
            MemoryStore::new(),
            MemoryStore::new(),
            MemoryStore::new(),
            TokenMinter::new("test"),
        ))
    }

    fn request(dispatcher: &mut TestDispatcher, line: &str, token: Option<&str>) -> Response {
        let request = Request {
            command: crate::command::tokenize(line).unwrap(),
            auth_token: token.map(str::to_owned),
        };
        let raw = dispatcher.handle(&serde_json::to_string(&request).unwrap());
        serde_json::from_str(&raw).unwrap()
    }

    fn login(dispatcher: &mut TestDispatcher, name: &str) -> LoginPayload {
        let response = request(dispatcher, &format!("login {name} pw"), None);
        assert!(response.was_successful, "{response:?}");
        serde_json::from_str(&response.data.unwrap()).unwrap()
    }

    #[test]
    fn invalid_commands_never_reach_the_ledger() {
        let mut dispatcher = dispatcher();

        for line in ["payed -1 bob", "help extra", "frobnicate", "register alice"] {
            assert_eq!(
                request(&mut dispatcher, line, None),
                Response::error(INVALID_COMMAND_MESSAGE)
            );
        }
    }

    #[test]
    fn undecodable_request_is_an_invalid_command() {
        let raw = dispatcher().handle("{not json");
        let response: Response = serde_json::from_str(&raw).unwrap();

        assert_eq!(response, Response::error(INVALID_COMMAND_MESSAGE));
    }

    #[test]
    fn ledger_failures_carry_their_message() {
        let mut dispatcher = dispatcher();
        assert!(request(&mut dispatcher, "register alice pw", None).was_successful);

        assert_eq!(
            request(&mut dispatcher, "register alice pw", None),
            Response::error("Username is already taken")
        );
        assert_eq!(
            request(&mut dispatcher, "get-status", Some("forged")),
            Response::error("The auth token is not valid")
        );
        assert_eq!(
            request(&mut dispatcher, "get-status", None),
            Response::error("The auth token is not valid")
        );
    }

    #[test]
    fn login_returns_token_and_pending_notifications() {
        let mut dispatcher = dispatcher();
        request(&mut dispatcher, "register alice pw", None);
        request(&mut dispatcher, "register bob pw", None);
        let alice = login(&mut dispatcher, "alice");
        request(&mut dispatcher, "add-friend bob", Some(&alice.auth_token));

        let bob = login(&mut dispatcher, "bob");

        assert_eq!(bob.notifications, vec!["alice added you as friend!"]);
        assert_eq!(login(&mut dispatcher, "bob").notifications, Vec::<String>::new());
    }

    #[test]
    fn status_and_history_payloads() {
        let mut dispatcher = dispatcher();
        request(&mut dispatcher, "register alice pw", None);
        request(&mut dispatcher, "register bob pw", None);
        let alice = login(&mut dispatcher, "alice").auth_token;
        request(&mut dispatcher, "add-friend bob", Some(&alice));
        request(&mut dispatcher, r#"split 30 bob "movie night""#, Some(&alice));
        request(&mut dispatcher, "payed 5.50 bob", Some(&alice));

        let status = request(&mut dispatcher, "get-status", Some(&alice));
        let status: StatusPayload = serde_json::from_str(&status.data.unwrap()).unwrap();
        assert_eq!(status.user_to_levs.get("bob"), Some(&9.5));

        let history = request(&mut dispatcher, "get-payment-history", Some(&alice));
        let history: PaymentHistoryPayload = serde_json::from_str(&history.data.unwrap()).unwrap();
        assert_eq!(history.payment_history.len(), 1);
        assert_eq!(history.payment_history[0].payed_by, "bob");
        assert_eq!(history.payment_history[0].levs, 5.5);
    }

    #[test]
    fn logout_revokes_the_token() {
        let mut dispatcher = dispatcher();
        request(&mut dispatcher, "register alice pw", None);
        let alice = login(&mut dispatcher, "alice").auth_token;

        assert_eq!(request(&mut dispatcher, "logout", Some(&alice)), Response::ok());
        assert!(!request(&mut dispatcher, "get-status", Some(&alice)).was_successful);
        assert_eq!(request(&mut dispatcher, "logout", Some(&alice)), Response::ok());
    }

    #[test]
    fn help_returns_usage() {
        let response = request(&mut dispatcher(), "help", None);

        assert_eq!(response.data.unwrap(), usage_listing());
    }
}
