//! Identity record model shared by the source, the sinks and the engine.
//!
//! Records are immutable snapshots fetched fresh on every run. All types are
//! serializable via serde (YAML fixtures, JSON cache payloads).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Identifier of one logical identity during a replication pass.
///
/// Source records are keyed by [`Key::Local`]. A sink record that cannot be
/// bound to any source record keeps its native identifier under
/// [`Key::Remote`], so it never collides with a source key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Key {
    Local(String),
    Remote(String),
}

impl Key {
    pub fn local(id: impl Into<String>) -> Self {
        Self::Local(id.into())
    }

    pub fn remote(id: impl Into<String>) -> Self {
        Self::Remote(id.into())
    }

    /// The bare identifier, without the local/remote tag.
    pub fn id(&self) -> &str {
        match self {
            Key::Local(id) | Key::Remote(id) => id,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Key::Local(_))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Local(id) => id.fmt(f),
            Key::Remote(id) => write!(f, "remote:{id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The kinds of objects replicated from the source, in processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Account,
    Group,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 2] = [ObjectKind::Account, ObjectKind::Group];

    /// Candidate unique-identifier fields, highest matching priority first.
    pub fn uid_fields(self) -> &'static [UidField] {
        match self {
            ObjectKind::Account => &[
                UidField::Hrid,
                UidField::Uuid,
                UidField::Username,
                UidField::Email,
            ],
            ObjectKind::Group => &[UidField::Hrid, UidField::Uuid, UidField::Name],
        }
    }

    /// Plural label used for file names and log lines.
    pub fn plural(self) -> &'static str {
        match self {
            ObjectKind::Account => "accounts",
            ObjectKind::Group => "groups",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Account => write!(f, "account"),
            ObjectKind::Group => write!(f, "group"),
        }
    }
}

/// A unique-identifier attribute usable for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UidField {
    /// Source-side human readable ID; may change.
    Hrid,
    /// Stable UUID; never changes.
    Uuid,
    Username,
    Email,
    /// Group name.
    Name,
}

impl fmt::Display for UidField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UidField::Hrid => "hrid",
            UidField::Uuid => "uuid",
            UidField::Username => "username",
            UidField::Email => "email",
            UidField::Name => "name",
        };
        f.write_str(s)
    }
}

/// External services an account may hold a foreign identifier in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Github,
    Gsuite,
    Lastpass,
    Slack,
    Trello,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    Internal,
    Contractor,
    External,
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "internal" => Ok(Self::Internal),
            "contractor" => Ok(Self::Contractor),
            "external" => Ok(Self::External),
            other => Err(format!(
                "unknown account type '{other}'; expected: internal, contractor, external"
            )),
        }
    }
}

/// The authorized blast radius of a replication run.
///
/// Ordered: `DryRun < Additive < Full`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum ReplicationMode {
    /// Compute and report, never apply.
    #[default]
    DryRun,
    /// Apply creations and updates.
    Additive,
    /// Apply creations, updates and deletions.
    Full,
}

impl ReplicationMode {
    pub const ALL: [ReplicationMode; 3] = [
        ReplicationMode::DryRun,
        ReplicationMode::Additive,
        ReplicationMode::Full,
    ];

    /// Numeric code shown in prompts (`0`, `1`, `2`).
    pub fn code(self) -> u8 {
        match self {
            ReplicationMode::DryRun => 0,
            ReplicationMode::Additive => 1,
            ReplicationMode::Full => 2,
        }
    }

    /// One step down; `DryRun` is a fixed point.
    pub fn downgrade(self) -> Self {
        match self {
            ReplicationMode::Full => ReplicationMode::Additive,
            ReplicationMode::Additive | ReplicationMode::DryRun => ReplicationMode::DryRun,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ReplicationMode::DryRun => "DRY_RUN",
            ReplicationMode::Additive => "ADDITIVE",
            ReplicationMode::Full => "FULL",
        }
    }
}

impl fmt::Display for ReplicationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts the numeric code or the mode name (`dry-run`, `dry_run`, `additive`, `full`).
impl FromStr for ReplicationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "0" | "dry-run" | "dryrun" => Ok(Self::DryRun),
            "1" | "additive" => Ok(Self::Additive),
            "2" | "full" => Ok(Self::Full),
            other => Err(format!(
                "unknown replication mode '{other}'; expected: dry-run, additive, full"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Unique identifiers of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUids {
    pub hrid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub uids: AccountUids,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deactivation_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub account_type: AccountType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firstname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displayname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_line: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub external_uids: BTreeMap<Service, String>,
}

impl Account {
    /// Minimal account carrying only its HRID; used by fixtures and tests.
    pub fn new(hrid: impl Into<String>) -> Self {
        Self {
            uids: AccountUids {
                hrid: hrid.into(),
                uuid: None,
                username: None,
                email: None,
            },
            creation_date: None,
            deactivation_date: None,
            account_type: AccountType::default(),
            firstname: None,
            lastname: None,
            displayname: None,
            fixed_line: None,
            mobile_line: None,
            external_uids: BTreeMap::new(),
        }
    }

    /// Whether the account is deactivated at `now`.
    pub fn is_deactivated(&self, now: DateTime<Utc>) -> bool {
        self.deactivation_date.is_some_and(|d| d <= now)
    }
}

/// Unique identifiers of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupUids {
    pub hrid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub uids: GroupUids,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deactivation_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// HRIDs of the owning accounts.
    #[serde(default)]
    pub owners: Vec<String>,
    /// HRIDs of the member accounts.
    #[serde(default)]
    pub members: Vec<String>,
}

impl Group {
    pub fn new(hrid: impl Into<String>) -> Self {
        Self {
            uids: GroupUids {
                hrid: hrid.into(),
                uuid: None,
                name: None,
            },
            creation_date: None,
            deactivation_date: None,
            description: None,
            owners: vec![],
            members: vec![],
        }
    }
}

/// A source-side identity snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    Account(Account),
    Group(Group),
}

impl Record {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Record::Account(_) => ObjectKind::Account,
            Record::Group(_) => ObjectKind::Group,
        }
    }

    pub fn hrid(&self) -> &str {
        match self {
            Record::Account(a) => &a.uids.hrid,
            Record::Group(g) => &g.uids.hrid,
        }
    }

    /// Value of a unique-identifier field, if the record kind has it and it is set.
    pub fn uid(&self, field: UidField) -> Option<&str> {
        match (self, field) {
            (Record::Account(a), UidField::Hrid) => Some(a.uids.hrid.as_str()),
            (Record::Account(a), UidField::Uuid) => a.uids.uuid.as_deref(),
            (Record::Account(a), UidField::Username) => a.uids.username.as_deref(),
            (Record::Account(a), UidField::Email) => a.uids.email.as_deref(),
            (Record::Group(g), UidField::Hrid) => Some(g.uids.hrid.as_str()),
            (Record::Group(g), UidField::Uuid) => g.uids.uuid.as_deref(),
            (Record::Group(g), UidField::Name) => g.uids.name.as_deref(),
            _ => None,
        }
    }

    /// All unique identifiers this record carries.
    pub fn uids(&self) -> BTreeMap<UidField, String> {
        self.kind()
            .uid_fields()
            .iter()
            .filter_map(|field| self.uid(*field).map(|v| (*field, v.to_owned())))
            .collect()
    }
}

impl From<Account> for Record {
    fn from(a: Account) -> Self {
        Record::Account(a)
    }
}

impl From<Group> for Record {
    fn from(g: Group) -> Self {
        Record::Group(g)
    }
}

/// A sink-side raw record.
///
/// `uids` holds whichever identifiers the sink knows about (possibly none of
/// the source's); `attrs` is the sink's own representation and is opaque to
/// the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Sink-native identifier.
    pub id: String,
    #[serde(default)]
    pub uids: BTreeMap<UidField, String>,
    #[serde(default)]
    pub attrs: serde_json::Value,
}

impl RemoteRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uids: BTreeMap::new(),
            attrs: serde_json::Value::Null,
        }
    }

    pub fn with_uid(mut self, field: UidField, value: impl Into<String>) -> Self {
        self.uids.insert(field, value.into());
        self
    }

    pub fn with_attrs(mut self, attrs: serde_json::Value) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn uid(&self, field: UidField) -> Option<&str> {
        self.uids.get(&field).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_display_tags_remote_keys() {
        assert_eq!(Key::local("jdoe").to_string(), "jdoe");
        assert_eq!(Key::remote("u-42").to_string(), "remote:u-42");
        assert_eq!(Key::remote("u-42").id(), "u-42");
    }

    #[test]
    fn local_and_remote_keys_never_collide() {
        assert_ne!(Key::local("x"), Key::remote("x"));
    }

    #[test]
    fn account_uid_lookup_follows_kind() {
        let mut account = Account::new("jdoe");
        account.uids.email = Some("jdoe@example.org".into());
        let record = Record::from(account);

        assert_eq!(record.uid(UidField::Hrid), Some("jdoe"));
        assert_eq!(record.uid(UidField::Email), Some("jdoe@example.org"));
        assert_eq!(record.uid(UidField::Uuid), None);
        assert_eq!(record.uid(UidField::Name), None, "accounts have no group name");
    }

    #[test]
    fn uids_collects_only_set_fields() {
        let mut group = Group::new("ops");
        group.uids.name = Some("Operations".into());
        let uids = Record::from(group).uids();
        assert_eq!(uids.len(), 2);
        assert_eq!(uids.get(&UidField::Name).map(String::as_str), Some("Operations"));
    }

    #[test]
    fn record_yaml_roundtrip_keeps_kind_tag() {
        let record = Record::from(Account::new("jdoe"));
        let yaml = serde_yaml::to_string(&record).expect("serialize");
        assert!(yaml.contains("kind: account"));
        let back: Record = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(back, record);
    }

    #[test]
    fn mode_ordering_and_downgrade() {
        assert!(ReplicationMode::DryRun < ReplicationMode::Additive);
        assert!(ReplicationMode::Additive < ReplicationMode::Full);
        assert_eq!(ReplicationMode::Full.downgrade(), ReplicationMode::Additive);
        assert_eq!(ReplicationMode::Additive.downgrade(), ReplicationMode::DryRun);
        assert_eq!(ReplicationMode::DryRun.downgrade(), ReplicationMode::DryRun);
    }

    #[test]
    fn mode_parses_codes_and_names() {
        assert_eq!("0".parse::<ReplicationMode>(), Ok(ReplicationMode::DryRun));
        assert_eq!("DRY_RUN".parse::<ReplicationMode>(), Ok(ReplicationMode::DryRun));
        assert_eq!("additive".parse::<ReplicationMode>(), Ok(ReplicationMode::Additive));
        assert_eq!("2".parse::<ReplicationMode>(), Ok(ReplicationMode::Full));
        assert!("42".parse::<ReplicationMode>().is_err());
        assert!("".parse::<ReplicationMode>().is_err());
    }

    #[test]
    fn deactivation_is_inclusive_of_now() {
        let now = Utc::now();
        let mut account = Account::new("gone");
        assert!(!account.is_deactivated(now));
        account.deactivation_date = Some(now);
        assert!(account.is_deactivated(now));
    }
}
