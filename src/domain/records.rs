//! Identity records as served by the STNS listing endpoints.
//!
//! Only `id` and `name` are interpreted; every other attribute is kept
//! verbatim so a re-encoded record matches what the origin sent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry of the `/users` listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// One entry of the `/groups` listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// A record from either listing.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Individual(User),
    Group(Group),
}

impl Record {
    pub fn name(&self) -> &str {
        match self {
            Record::Individual(user) => &user.name,
            Record::Group(group) => &group.name,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Record::Individual(user) => user.id,
            Record::Group(group) => group.id,
        }
    }

    /// Encode as the single-element array the lookup endpoints answer with.
    pub fn to_lookup_body(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            Record::Individual(user) => serde_json::to_vec(&[user]),
            Record::Group(group) => serde_json::to_vec(&[group]),
        }
    }
}

/// A listing resource on the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Users,
    Groups,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Users, Collection::Groups];

    /// Path segment of the listing, relative to the endpoint base.
    pub fn resource(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Groups => "groups",
        }
    }

    /// Decode a full listing body into records of this collection.
    pub fn decode(self, body: &[u8]) -> serde_json::Result<Vec<Record>> {
        match self {
            Collection::Users => Ok(serde_json::from_slice::<Vec<User>>(body)?
                .into_iter()
                .map(Record::Individual)
                .collect()),
            Collection::Groups => Ok(serde_json::from_slice::<Vec<Group>>(body)?
                .into_iter()
                .map(Record::Group)
                .collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_users_and_keeps_unknown_attributes() {
        let body = json!([
            {"id": 1, "name": "alice", "group_id": 1, "directory": "/home/alice", "keys": ["ssh-ed25519 AAAA"]},
            {"id": 2, "name": "bob", "shell": "/bin/zsh"}
        ])
        .to_string();

        let records = Collection::Users.decode(body.as_bytes()).expect("decode");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name(), "alice");
        assert_eq!(records[0].id(), 1);
        assert!(matches!(records[1], Record::Individual(_)));

        let encoded: Value =
            serde_json::from_slice(&records[0].to_lookup_body().expect("encode")).expect("json");
        assert_eq!(
            encoded,
            json!([{"id": 1, "name": "alice", "group_id": 1, "directory": "/home/alice", "keys": ["ssh-ed25519 AAAA"]}])
        );
    }

    #[test]
    fn decodes_groups() {
        let body = json!([{"id": 10, "name": "admins", "users": ["alice"]}]).to_string();
        let records = Collection::Groups.decode(body.as_bytes()).expect("decode");

        assert_eq!(records.len(), 1);
        assert!(matches!(records[0], Record::Group(_)));
        assert_eq!(records[0].name(), "admins");
        assert_eq!(records[0].id(), 10);
    }

    #[test]
    fn rejects_malformed_listing() {
        assert!(Collection::Users.decode(b"{\"not\": \"a list\"}").is_err());
        assert!(Collection::Groups.decode(b"[{\"name\": \"no-id\"}]").is_err());
    }
}
