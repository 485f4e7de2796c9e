use std::fmt;

/// Generic store-assigned id newtype, used where the entity kind is generic over `Id`
/// (e.g. audit logging that references "some row in some table").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(pub i64);

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Id> for i64 {
    fn from(value: Id) -> Self {
        value.0
    }
}

/// Broker-native order identifier. Opaque to the core; only the broker
/// client crate interprets its structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrokerOrderId(pub String);

impl fmt::Display for BrokerOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_round_trips_through_i64() {
        let id = Id(42);
        assert_eq!(i64::from(id), 42);
        assert_eq!(Id::from(42i64), id);
        assert_eq!(id.to_string(), "42");
    }
}
