use std::collections::BTreeSet;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    auth::TokenMinter,
    balance::{self, Balances},
    error::{LedgerError, LedgerResult, StoreError},
    schemas::{Group, Payment, User},
    session::SessionManager,
    store::Store,
};

const MIN_GROUP_SIZE: usize = 3;

/// What a successful login hands back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginOutcome {
    pub token: String,
    pub notifications: Vec<String>,
}

/// Session-authenticated operations over the shared ledger.
///
/// Every mutation reads the current entity, derives a new value and writes
/// it back whole. The service is driven from a single thread, so no two
/// calls ever observe each other half-way.
pub struct LedgerService<U, G, P> {
    users: U,
    groups: G,
    payments: P,
    sessions: SessionManager,
    minter: TokenMinter,
}

impl<U, G, P> LedgerService<U, G, P>
where
    U: Store<User>,
    G: Store<Group>,
    P: Store<Payment>,
{
    pub fn new(users: U, groups: G, payments: P, minter: TokenMinter) -> Self {
        Self {
            users,
            groups,
            payments,
            sessions: SessionManager::new(),
            minter,
        }
    }

    pub fn register(&mut self, username: &str, password: &str) -> LedgerResult<()> {
        require("username", username)?;
        require("password", password)?;

        if self.users.find(username).is_some() {
            return Err(LedgerError::UsernameAlreadyExists(
                "Username is already taken".to_owned(),
            ));
        }

        self.users.insert(User::new(username, password))?;
        info!(username, "registered user");
        Ok(())
    }

    pub fn login(&mut self, username: &str, password: &str) -> LedgerResult<LoginOutcome> {
        require("username", username)?;
        require("password", password)?;

        let user = match self.users.find(username) {
            Some(user) if user.password_matches(password) => user,
            _ => {
                return Err(LedgerError::UnsuccessfulLogin(
                    "Could not login with the provided credentials".to_owned(),
                ))
            }
        };

        let token = self.minter.mint(user.username());
        self.sessions.login(token.clone(), user.username());
        let notifications = self.get_and_delete_notifications(&token)?;
        debug!(username, pending = notifications.len(), "user logged in");

        Ok(LoginOutcome {
            token,
            notifications,
        })
    }

    pub fn logout(&mut self, token: &str) {
        self.sessions.logout(token);
    }

    /// Resolves a token to the user id it was issued for.
    pub fn resolve(&self, token: &str) -> LedgerResult<&str> {
        self.sessions.resolve(token)
    }

    pub fn add_friend(&mut self, token: &str, friend_username: &str) -> LedgerResult<()> {
        require("friend username", friend_username)?;
        let user = self.session_user(token)?;

        let Some(friend) = self.users.find(friend_username) else {
            return Err(LedgerError::username_not_found(
                "The username is not registered in the system",
            ));
        };

        if user.is_friend_of(friend.username()) {
            return Ok(());
        }
        if user.username() == friend.username() {
            return Err(LedgerError::invalid_operation(
                "You cannot add yourself as a friend",
            ));
        }

        self.users.update(user.with_friend(friend.username()))?;
        self.users.update(friend.with_friend(user.username()))?;
        self.notify(
            friend.username(),
            format!("{} added you as friend!", user.username()),
        )
    }

    pub fn create_group(
        &mut self,
        token: &str,
        group_name: &str,
        member_usernames: &[String],
    ) -> LedgerResult<()> {
        require("group name", group_name)?;
        for member in member_usernames {
            require("member username", member)?;
        }
        let owner = self.session_user(token)?;

        let requested: BTreeSet<&str> = member_usernames.iter().map(String::as_str).collect();
        if requested.len() < MIN_GROUP_SIZE - 1 {
            return Err(LedgerError::invalid_operation(format!(
                "Cannot create a group with less than {MIN_GROUP_SIZE} members"
            )));
        }

        if self.groups.find(group_name).is_some() {
            return Err(LedgerError::GroupAlreadyExists(
                "Group with that name already exists".to_owned(),
            ));
        }

        let mut members = Vec::with_capacity(requested.len());
        for username in requested {
            let Some(member) = self.users.find(username) else {
                return Err(LedgerError::username_not_found(format!(
                    "username {username} does not exist"
                )));
            };
            if !member.is_friend_of(owner.username()) {
                return Err(LedgerError::unauthorized(
                    "You can only add your friends to a group",
                ));
            }
            members.push(member);
        }

        let participant_ids = members
            .iter()
            .map(|member| member.username().to_owned())
            .chain(std::iter::once(owner.username().to_owned()))
            .collect();
        self.groups.insert(Group {
            name: group_name.to_owned(),
            participant_ids,
        })?;

        self.users.update(owner.with_group(group_name))?;
        for member in &members {
            self.users.update(member.with_group(group_name))?;
        }
        for member in &members {
            self.notify(
                member.username(),
                format!("{} added you to group {}!", owner.username(), group_name),
            )?;
        }

        info!(group = group_name, size = members.len() + 1, "created group");
        Ok(())
    }

    pub fn split(
        &mut self,
        token: &str,
        friend_username: &str,
        amount: f64,
        reason: &str,
    ) -> LedgerResult<()> {
        require("friend username", friend_username)?;
        require("reason", reason)?;
        validate_amount(amount)?;
        let owner = self.session_user(token)?;

        let Some(friend) = self.users.find(friend_username) else {
            return Err(LedgerError::username_not_found(
                "Friends username was not found in the system",
            ));
        };
        if !friend.is_friend_of(owner.username()) {
            return Err(LedgerError::unauthorized(
                "Cannot split money with people that are not on your friend list",
            ));
        }

        self.split_between(owner.username(), &[friend.username()], amount, reason)
    }

    pub fn split_group(
        &mut self,
        token: &str,
        group_name: &str,
        amount: f64,
        reason: &str,
    ) -> LedgerResult<()> {
        require("group name", group_name)?;
        require("reason", reason)?;
        validate_amount(amount)?;
        let owner = self.session_user(token)?;

        let Some(group) = self.groups.find(group_name) else {
            return Err(LedgerError::GroupNotFound("Group does not exist".to_owned()));
        };
        let debtors: Vec<&str> = group
            .participant_ids
            .iter()
            .map(String::as_str)
            .filter(|id| *id != owner.username())
            .collect();
        self.split_between(owner.username(), &debtors, amount, reason)
    }

    pub fn payed(&mut self, token: &str, friend_username: &str, amount: f64) -> LedgerResult<()> {
        require("friend username", friend_username)?;
        validate_amount(amount)?;
        let owner = self.session_user(token)?;

        let Some(friend) = self.users.find(friend_username) else {
            return Err(LedgerError::username_not_found(
                "Friends username was not found in the system",
            ));
        };
        if !friend.is_friend_of(owner.username()) {
            return Err(LedgerError::unauthorized(
                "You can only acknowledge payments from friends",
            ));
        }

        self.ensure_recordable(owner.username(), friend.username(), amount)?;

        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            from_id: friend.username().to_owned(),
            to_id: owner.username().to_owned(),
            amount,
            timestamp: Utc::now(),
        };
        let payment_id = payment.id.clone();
        self.payments.insert(payment)?;
        self.users.update(owner.with_payment(&payment_id))?;

        // The acknowledger now "owes" the payer the amount, which cancels
        // the payer's outstanding debt.
        self.record_debt(owner.username(), friend.username(), amount)?;
        self.notify(
            friend.username(),
            format!(
                "{} approved your payment of amount: {:.2} levs",
                owner.username(),
                amount
            ),
        )
    }

    pub fn get_status(&self, token: &str) -> LedgerResult<Balances> {
        Ok(self.session_user(token)?.balances().clone())
    }

    pub fn get_payment_history(&self, token: &str) -> LedgerResult<Vec<Payment>> {
        let user = self.session_user(token)?;
        Ok(user
            .payment_ids()
            .iter()
            .filter_map(|id| {
                let payment = self.payments.find(id);
                if payment.is_none() {
                    warn!(payment_id = %id, user = user.username(), "dangling payment id");
                }
                payment
            })
            .collect())
    }

    /// Returns and clears the caller's pending notifications in one step.
    pub fn get_and_delete_notifications(&mut self, token: &str) -> LedgerResult<Vec<String>> {
        let user = self.session_user(token)?;
        let notifications = user.unread_notifications().to_vec();
        if !notifications.is_empty() {
            self.users.update(user.without_notifications())?;
        }
        Ok(notifications)
    }

    fn split_between(
        &mut self,
        owner_id: &str,
        debtor_ids: &[&str],
        amount: f64,
        reason: &str,
    ) -> LedgerResult<()> {
        let share = balance::share_of(amount, debtor_ids.len() + 1);
        for debtor_id in debtor_ids {
            self.ensure_recordable(debtor_id, owner_id, share)?;
        }
        for debtor_id in debtor_ids {
            self.record_debt(debtor_id, owner_id, share)?;
            self.notify(
                debtor_id,
                format!("{owner_id} made a payment and you owe {share:.2} levs. Reason: {reason}"),
            )?;
        }
        Ok(())
    }

    /// `debtor_id` owes `creditor_id` a further `amount`, mirrored on both
    /// sides of the pair.
    fn record_debt(&mut self, debtor_id: &str, creditor_id: &str, amount: f64) -> LedgerResult<()> {
        let creditor = self.user(creditor_id)?;
        self.users.update(creditor.with_balance_delta(debtor_id, amount))?;
        let debtor = self.user(debtor_id)?;
        self.users.update(debtor.with_balance_delta(creditor_id, -amount))?;
        Ok(())
    }

    /// Fails if mirroring `amount` onto the pair would push either side out
    /// of finite cent precision. Runs before anything is written.
    fn ensure_recordable(&self, debtor_id: &str, creditor_id: &str, amount: f64) -> LedgerResult<()> {
        let creditor = self.user(creditor_id)?;
        let debtor = self.user(debtor_id)?;
        let fits = balance::next_balance(creditor.balances(), debtor_id, amount).is_some()
            && balance::next_balance(debtor.balances(), creditor_id, -amount).is_some();
        if !fits {
            warn!(debtor_id, creditor_id, amount, "rejected balance overflow");
            return Err(LedgerError::invalid_operation("Amount is too large"));
        }
        Ok(())
    }

    fn notify(&mut self, user_id: &str, message: String) -> LedgerResult<()> {
        let user = self.user(user_id)?;
        self.users.update(user.with_notification(message))?;
        Ok(())
    }

    fn session_user(&self, token: &str) -> LedgerResult<User> {
        let id = self.sessions.resolve(token)?;
        self.user(id)
    }

    fn user(&self, id: &str) -> LedgerResult<User> {
        self.users
            .find(id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_owned() }.into())
    }
}

fn require(name: &'static str, value: &str) -> LedgerResult<()> {
    if value.trim().is_empty() {
        return Err(LedgerError::InvalidArgument { name });
    }
    Ok(())
}

fn validate_amount(amount: f64) -> LedgerResult<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(LedgerError::invalid_operation("Amount must be positive"));
    }
    Ok(())
}
