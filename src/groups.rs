/// Upstream station groups served as wide CSV matrices
/// (`/data/group/group_{id}.csv`).
///
/// Ids run from 1 to 28. Group 7 is not published, so requesting it yields an
/// upstream 404 rather than a local error.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const MIN_GROUP_ID: u8 = 1;
pub const MAX_GROUP_ID: u8 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct GroupId(u8);

impl GroupId {
    /// Returns `None` for ids outside `1..=28`.
    pub fn new(id: u8) -> Option<Self> {
        (MIN_GROUP_ID..=MAX_GROUP_ID).contains(&id).then_some(GroupId(id))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Registry name for the group, if it has one.
    pub fn name(self) -> Option<&'static str> {
        GROUP_REGISTRY
            .iter()
            .find(|(id, _)| *id == self.0)
            .map(|(_, name)| *name)
    }
}

impl TryFrom<u8> for GroupId {
    type Error = String;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        GroupId::new(id).ok_or_else(|| {
            format!("group id {} outside {}..={}", id, MIN_GROUP_ID, MAX_GROUP_ID)
        })
    }
}

/// Accepts a numeric id or a registry name (`"22"`, `"Foyle"`).
impl std::str::FromStr for GroupId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<u8>() {
            Ok(id) => GroupId::try_from(id),
            Err(_) => group_by_name(s).ok_or_else(|| format!("unknown group {:?}", s)),
        }
    }
}

impl From<GroupId> for u8 {
    fn from(id: GroupId) -> u8 {
        id.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Known groups, by catchment. Ordered by id.
pub const GROUP_REGISTRY: &[(u8, &str)] = &[
    (1, "Nore"),
    (2, "Shannon"),
    (3, "Turlough"),
    (4, "Barrow"),
    (5, "Munster Blackwater"),
    (6, "Suir (back-up)"),
    (8, "Erne"),
    (9, "Corrib"),
    (10, "Moy"),
    (11, "Fergus"),
    (12, "Maigue"),
    (13, "Slaney"),
    (14, "Shannon (L. Ree)"),
    (15, "Suck"),
    (16, "Tidal"),
    (17, "Boyne"),
    (18, "Munster Blackwater (Mallow)"),
    (19, "Munster Blackwater (Fermoy)"),
    (20, "Inny"),
    (21, "Brosna"),
    (22, "Foyle"),
    (23, "Bandon"),
    (24, "Laune"),
    (25, "Ballysadare"),
    (26, "Suir"),
    (27, "Waterford City"),
    (28, "South Galway"),
];

/// Looks a group up by registry name, ignoring case and surrounding
/// whitespace.
pub fn group_by_name(name: &str) -> Option<GroupId> {
    let wanted = name.trim();
    GROUP_REGISTRY
        .iter()
        .find(|(_, n)| n.eq_ignore_ascii_case(wanted))
        .and_then(|(id, _)| GroupId::new(*id))
}
