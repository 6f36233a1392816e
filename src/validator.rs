use thiserror::Error;

use crate::command::{Arity, Command, CommandKind};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidCommand {
    #[error("unknown command `{0}`")]
    UnknownVerb(String),

    #[error("`{verb}` expects {expected:?} arguments, got {actual}")]
    Arity {
        verb: &'static str,
        expected: Arity,
        actual: usize,
    },

    #[error("argument {index} is blank")]
    BlankArgument { index: usize },

    #[error("`{0}` is not a valid amount")]
    MalformedAmount(String),
}

/// Checks verb, argument count, blank arguments and amount format. Never
/// looks at the ledger.
pub fn validate(command: &Command) -> Result<CommandKind, InvalidCommand> {
    let kind = command
        .kind()
        .ok_or_else(|| InvalidCommand::UnknownVerb(command.name.clone()))?;

    if let Some(index) = command.args.iter().position(|arg| arg.trim().is_empty()) {
        return Err(InvalidCommand::BlankArgument { index });
    }

    let arity = kind.arity();
    if !arity.accepts(command.args.len()) {
        return Err(InvalidCommand::Arity {
            verb: kind.name(),
            expected: arity,
            actual: command.args.len(),
        });
    }

    if let Some(amount) = kind.amount_index().map(|index| &command.args[index]) {
        if !is_amount(amount) {
            return Err(InvalidCommand::MalformedAmount(amount.clone()));
        }
    }

    Ok(kind)
}

/// `digits` optionally followed by `.` and one or two digits.
pub fn is_amount(value: &str) -> bool {
    let (whole, fraction) = match value.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (value, None),
    };
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    all_digits(whole)
        && fraction.map_or(true, |fraction| fraction.len() <= 2 && all_digits(fraction))
}
