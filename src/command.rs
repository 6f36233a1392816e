use serde::{Deserialize, Serialize};

use crate::schemas::UserNick;

/// A parsed request: a verb plus positional arguments.
///
/// `owner` is empty when a command comes straight out of [`tokenize`]; the
/// server fills it in once the request's auth token has been resolved.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Command {
    #[serde(default)]
    pub owner: Option<UserNick>,
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Command {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            owner: None,
            name: name.into(),
            args,
        }
    }

    pub fn with_owner(self, owner: Option<UserNick>) -> Self {
        Self { owner, ..self }
    }

    pub fn kind(&self) -> Option<CommandKind> {
        CommandKind::from_name(&self.name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exactly(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

/// The closed set of verbs the protocol understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    AddFriend,
    CreateGroup,
    GetStatus,
    Login,
    Logout,
    Payed,
    Register,
    Split,
    SplitGroup,
    GetPaymentHistory,
    Help,
}

impl CommandKind {
    pub const ALL: [CommandKind; 11] = [
        CommandKind::AddFriend,
        CommandKind::CreateGroup,
        CommandKind::GetStatus,
        CommandKind::Login,
        CommandKind::Logout,
        CommandKind::Payed,
        CommandKind::Register,
        CommandKind::Split,
        CommandKind::SplitGroup,
        CommandKind::GetPaymentHistory,
        CommandKind::Help,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            CommandKind::AddFriend => "add-friend",
            CommandKind::CreateGroup => "create-group",
            CommandKind::GetStatus => "get-status",
            CommandKind::Login => "login",
            CommandKind::Logout => "logout",
            CommandKind::Payed => "payed",
            CommandKind::Register => "register",
            CommandKind::Split => "split",
            CommandKind::SplitGroup => "split-group",
            CommandKind::GetPaymentHistory => "get-payment-history",
            CommandKind::Help => "help",
        }
    }

    pub fn usage(self) -> &'static str {
        match self {
            CommandKind::AddFriend => "add-friend <username>",
            CommandKind::CreateGroup => {
                "create-group <group_name> <username> <username> ... <username>"
            }
            CommandKind::GetStatus => "get-status",
            CommandKind::Login => "login <username> <password>",
            CommandKind::Logout => "logout",
            CommandKind::Payed => "payed <amount> <username>",
            CommandKind::Register => "register <username> <password>",
            CommandKind::Split => "split <amount> <username> <reason_for_payment>",
            CommandKind::SplitGroup => "split-group <amount> <group_name> <reason_for_payment>",
            CommandKind::GetPaymentHistory => "get-payment-history",
            CommandKind::Help => "help",
        }
    }

    pub fn arity(self) -> Arity {
        match self {
            CommandKind::AddFriend => Arity::Exactly(1),
            CommandKind::CreateGroup => Arity::AtLeast(3),
            CommandKind::GetStatus
            | CommandKind::Logout
            | CommandKind::GetPaymentHistory
            | CommandKind::Help => Arity::Exactly(0),
            CommandKind::Login | CommandKind::Register | CommandKind::Payed => Arity::Exactly(2),
            CommandKind::Split | CommandKind::SplitGroup => Arity::Exactly(3),
        }
    }

    /// Position of the argument that must be a decimal amount, if any.
    pub fn amount_index(self) -> Option<usize> {
        match self {
            CommandKind::Payed | CommandKind::Split | CommandKind::SplitGroup => Some(0),
            _ => None,
        }
    }
}

/// One usage line per verb.
pub fn usage_listing() -> String {
    CommandKind::ALL
        .iter()
        .map(|kind| kind.usage())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Splits `input` on whitespace, keeping double-quoted runs together with
/// the quotes stripped. Returns `None` when there is no verb.
pub fn tokenize(input: &str) -> Option<Command> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;

    for c in input.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(current.trim().to_owned());
                    current.clear();
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current.trim().to_owned());
    }

    let mut tokens = tokens.into_iter();
    let name = tokens.next()?;
    Some(Command::new(name, tokens.collect()))
}
