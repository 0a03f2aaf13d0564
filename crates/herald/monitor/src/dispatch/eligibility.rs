//! Recipient eligibility.

use std::collections::HashMap;

use herald_types::Subscriber;

use crate::config::NotificationTypeConfig;

/// What is being delivered, as far as eligibility is concerned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EligibilityRequest<'a> {
    /// Notification type id, if the notifier declares one.
    pub type_id: Option<&'a str>,

    /// Contact channel the notifier requires.
    pub required_channel: Option<&'a str>,
}

/// Decides whether a known subscriber may receive a notification.
pub trait EligibilityPolicy: Send + Sync {
    fn is_eligible(&self, subscriber: &Subscriber, request: &EligibilityRequest<'_>) -> bool;
}

/// Every known subscriber is eligible.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl EligibilityPolicy for AllowAll {
    fn is_eligible(&self, _subscriber: &Subscriber, _request: &EligibilityRequest<'_>) -> bool {
        true
    }
}

/// Checks notification-type subscriptions and required contact channels.
///
/// A subscriber's own subscription entry decides when present; otherwise the
/// type's `default_enabled` applies, and unknown types are allowed. The
/// required channel comes from the notifier, falling back to the type's
/// metadata.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionEligibility {
    types: HashMap<String, NotificationTypeConfig>,
}

impl SubscriptionEligibility {
    pub fn new(types: HashMap<String, NotificationTypeConfig>) -> Self {
        Self { types }
    }
}

impl EligibilityPolicy for SubscriptionEligibility {
    fn is_eligible(&self, subscriber: &Subscriber, request: &EligibilityRequest<'_>) -> bool {
        let meta = request.type_id.and_then(|t| self.types.get(t));

        let channel = request
            .required_channel
            .or_else(|| meta.and_then(|m| m.required_channel.as_deref()));
        if let Some(channel) = channel {
            if subscriber.contact(channel).is_none() {
                return false;
            }
        }

        match request.type_id {
            Some(type_id) => match subscriber.subscription(type_id) {
                Some(subscription) => subscription.enabled,
                None => meta.map_or(true, |m| m.default_enabled),
            },
            None => true,
        }
    }
}
