//! String-tagged identifiers shared across the engine.
//!
//! States, events, action types and flow types are all open-ended string
//! tags: the transition table gives them meaning, the engine only
//! compares them.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_tag {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Cow<'static, str>);

        impl $name {
            /// Construct from a static string, usable in `const` contexts.
            pub const fn from_static(s: &'static str) -> Self {
                Self(Cow::Borrowed(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl From<&'static str> for $name {
            fn from(s: &'static str) -> Self {
                Self(Cow::Borrowed(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(Cow::Owned(s))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_tag! {
    /// A name for one state in the machine.
    State
}

string_tag! {
    /// The output of an action handler; selects the next state through
    /// the transition table.
    Event
}

string_tag! {
    /// Identifies the kind of an [`Action`](crate::Action); the router
    /// keys its dispatch on this.
    ActionType
}

string_tag! {
    /// Identifies a family of flows. Snapshots carry it so a flow can be
    /// restored against the right transition table and data shape.
    FlowType
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_equality_and_display() {
        let a = State::from("AwaitingPayment");
        let b = State::from("AwaitingPayment".to_string());
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "AwaitingPayment");
    }

    #[test]
    fn test_tag_serde_is_transparent() {
        let event = Event::from_static("OrderPaid");
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, "\"OrderPaid\"");
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
