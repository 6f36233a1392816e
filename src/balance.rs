use std::collections::BTreeMap;

use crate::schemas::UserNick;

pub type Balances = BTreeMap<UserNick, f64>;

/// Adds `amount` to the entry for `peer`, rounding to cents. An entry that
/// lands on exactly zero is removed rather than stored.
pub fn apply_delta(balances: &mut Balances, peer: &str, amount: f64) {
    let updated = balances
        .entry(peer.to_owned())
        .and_modify(|balance| *balance = round_to_2_decimals(*balance + amount))
        .or_insert(round_to_2_decimals(amount));
    if *updated == 0.0 {
        balances.remove(peer);
    }
}

/// The value the entry for `peer` would hold after adding `amount`, or
/// `None` once it no longer fits a finite `f64` at cent precision.
pub fn next_balance(balances: &Balances, peer: &str, amount: f64) -> Option<f64> {
    let current = balances.get(peer).copied().unwrap_or(0.0);
    let next = round_to_2_decimals(current + amount);
    next.is_finite().then_some(next)
}

// f64::round rounds half away from zero, so round(-x) == -round(x) and the
// two sides of a pair stay mirrored.
pub fn round_to_2_decimals(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

/// Splits `amount` evenly between `participants` people.
pub fn share_of(amount: f64, participants: usize) -> f64 {
    amount / participants as f64
}
