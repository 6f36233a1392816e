use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::balance::{self, Balances};

pub type UserNick = String;
pub type GroupName = String;
pub type PaymentId = String;

/// A record the storage layer can key by a stable string id.
pub trait Entity: Clone + Serialize + DeserializeOwned {
    fn id(&self) -> &str;
}

/// A registered account.
///
/// Values are never mutated in place: every `with_*` method returns a new
/// `User` that the caller writes back through the store.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    username: UserNick,
    password: String,
    friend_ids: BTreeSet<UserNick>,
    group_names: BTreeSet<GroupName>,
    payment_ids: BTreeSet<PaymentId>,
    unread_notifications: Vec<String>,
    balances: Balances,
}

impl User {
    pub fn new(username: impl Into<UserNick>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            friend_ids: BTreeSet::new(),
            group_names: BTreeSet::new(),
            payment_ids: BTreeSet::new(),
            unread_notifications: Vec::new(),
            balances: BTreeMap::new(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    // Stored in clear text, compared by equality.
    pub fn password_matches(&self, password: &str) -> bool {
        self.password == password
    }

    pub fn friend_ids(&self) -> &BTreeSet<UserNick> {
        &self.friend_ids
    }

    pub fn is_friend_of(&self, id: &str) -> bool {
        self.friend_ids.contains(id)
    }

    pub fn group_names(&self) -> &BTreeSet<GroupName> {
        &self.group_names
    }

    pub fn payment_ids(&self) -> &BTreeSet<PaymentId> {
        &self.payment_ids
    }

    pub fn unread_notifications(&self) -> &[String] {
        &self.unread_notifications
    }

    /// Positive entries mean the peer owes this user, negative ones that
    /// this user owes the peer.
    pub fn balances(&self) -> &Balances {
        &self.balances
    }

    pub fn with_friend(&self, friend_id: &str) -> Self {
        let mut user = self.clone();
        user.friend_ids.insert(friend_id.to_owned());
        user
    }

    pub fn with_group(&self, group_name: &str) -> Self {
        let mut user = self.clone();
        user.group_names.insert(group_name.to_owned());
        user
    }

    pub fn with_payment(&self, payment_id: &str) -> Self {
        let mut user = self.clone();
        user.payment_ids.insert(payment_id.to_owned());
        user
    }

    pub fn with_notification(&self, notification: String) -> Self {
        let mut user = self.clone();
        user.unread_notifications.push(notification);
        user
    }

    pub fn without_notifications(&self) -> Self {
        let mut user = self.clone();
        user.unread_notifications.clear();
        user
    }

    /// Adds `amount` to what `peer_id` owes this user, dropping the entry
    /// once it nets to zero.
    pub fn with_balance_delta(&self, peer_id: &str, amount: f64) -> Self {
        let mut user = self.clone();
        balance::apply_delta(&mut user.balances, peer_id, amount);
        user
    }
}

impl Entity for User {
    fn id(&self) -> &str {
        &self.username
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub name: GroupName,
    pub participant_ids: BTreeSet<UserNick>,
}

impl Entity for Group {
    fn id(&self) -> &str {
        &self.name
    }
}

/// An acknowledged transfer: `from_id` paid `to_id` back.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: PaymentId,
    pub from_id: UserNick,
    pub to_id: UserNick,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
}

impl Entity for Payment {
    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_methods_leave_the_receiver_untouched() {
        let alice = User::new("alice", "secret");
        let updated = alice
            .with_friend("bob")
            .with_group("trip")
            .with_notification("hello".to_owned());

        assert!(alice.friend_ids().is_empty());
        assert!(alice.unread_notifications().is_empty());
        assert!(updated.is_friend_of("bob"));
        assert!(updated.group_names().contains("trip"));
        assert_eq!(updated.unread_notifications(), ["hello".to_owned()]);
    }

    #[test]
    fn draining_notifications_keeps_other_fields() {
        let alice = User::new("alice", "secret")
            .with_friend("bob")
            .with_notification("one".to_owned())
            .with_notification("two".to_owned());

        let drained = alice.without_notifications();

        assert!(drained.unread_notifications().is_empty());
        assert!(drained.is_friend_of("bob"));
    }

    #[test]
    fn user_serializes_with_camel_case_fields() {
        let json = serde_json::to_value(User::new("alice", "secret")).unwrap();

        assert!(json.get("friendIds").is_some());
        assert!(json.get("unreadNotifications").is_some());
    }

    #[test]
    fn password_is_compared_exactly() {
        let alice = User::new("alice", "secret");

        assert!(alice.password_matches("secret"));
        assert!(!alice.password_matches("Secret"));
    }
}
