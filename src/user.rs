use std::{fs, path::Path};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Permissions an embed user can be granted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    AccessData,
    SeeLookmlDashboards,
    SeeLooks,
    SeeUserDashboards,
    Explore,
    CreateTableCalculations,
    CreateCustomFields,
    CanCreateForecast,
    SaveContent,
    SendOutgoingWebhook,
    SendToS3,
    SendToSftp,
    ScheduleLookEmails,
    ScheduleExternalLookEmails,
    SendToIntegration,
    CreateAlerts,
    DownloadWithLimit,
    DownloadWithoutLimit,
    SeeSql,
    ClearCacheRefresh,
    SeeDrillOverlay,
    EmbedBrowseSpaces,
    EmbedSaveSharedSpace,
}

/// Group ids show up as numbers in some user files and strings in others.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupId {
    Number(u64),
    Text(String),
}

/// Identity of the embed user the host vouches for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub external_user_id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub session_length: Option<u32>,
    #[serde(default = "default_force_logout_login")]
    pub force_logout_login: bool,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub group_ids: Vec<GroupId>,
    #[serde(default)]
    pub external_group_id: Option<String>,
    #[serde(default)]
    pub user_attributes: Map<String, Value>,
    #[serde(default)]
    pub access_filters: Map<String, Value>,
    #[serde(default)]
    pub user_timezone: Option<String>,
}

fn default_force_logout_login() -> bool {
    true
}

impl User {
    /// A user with only an id; every other field takes its default.
    pub fn new(external_user_id: impl Into<String>) -> Self {
        Self {
            external_user_id: external_user_id.into(),
            first_name: None,
            last_name: None,
            session_length: None,
            force_logout_login: default_force_logout_login(),
            permissions: Vec::new(),
            models: Vec::new(),
            group_ids: Vec::new(),
            external_group_id: None,
            user_attributes: Map::new(),
            access_filters: Map::new(),
            user_timezone: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UserFile {
    Many(Vec<User>),
    One(Box<User>),
}

/// Parses a demo user file holding either one user object or an array.
pub fn parse_users(json: &str) -> anyhow::Result<Vec<User>> {
    let users = match serde_json::from_str::<UserFile>(json)? {
        UserFile::Many(users) => users,
        UserFile::One(user) => vec![*user],
    };
    if users.is_empty() {
        bail!("user file lists no users");
    }
    if let Some(i) = users.iter().position(|u| u.external_user_id.trim().is_empty()) {
        bail!("user #{i} has an empty external_user_id");
    }
    Ok(users)
}

pub fn load_users(path: &Path) -> anyhow::Result<Vec<User>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading demo users from {}", path.display()))?;
    parse_users(&raw).with_context(|| format!("parsing demo users from {}", path.display()))
}

/// Picks the user named by `user_id`, falling back to the first one.
pub fn select_user<'a>(users: &'a [User], user_id: Option<&str>) -> Option<&'a User> {
    user_id
        .and_then(|id| users.iter().find(|u| u.external_user_id == id))
        .or_else(|| users.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEMO_USER: &str = r#"{
        "external_user_id": "user1",
        "first_name": "Pat",
        "last_name": "Embed",
        "session_length": 3600,
        "force_logout_login": true,
        "external_group_id": "group1",
        "group_ids": [1, 2, "3"],
        "permissions": ["access_data", "see_looks", "see_user_dashboards"],
        "models": ["powered_by", "thelook"],
        "user_attributes": {"locale": "en_US"},
        "access_filters": {"powered_by": {"products.brand": "Allegra K"}},
        "user_timezone": "America/Los_Angeles"
    }"#;

    #[test]
    fn test_should_parse_single_user_object() {
        let users = parse_users(DEMO_USER).unwrap();
        assert_eq!(users.len(), 1);
        let u = &users[0];
        assert_eq!(u.external_user_id, "user1");
        assert_eq!(u.session_length, Some(3600));
        assert_eq!(
            u.group_ids,
            vec![GroupId::Number(1), GroupId::Number(2), GroupId::Text("3".into())]
        );
        assert_eq!(u.permissions[0], Permission::AccessData);
        assert_eq!(u.user_timezone.as_deref(), Some("America/Los_Angeles"));
    }

    #[test]
    fn test_should_fill_defaults_for_minimal_user() {
        let users = parse_users(r#"[{"external_user_id": "u1"}]"#).unwrap();
        assert_eq!(users[0], User::new("u1"));
        assert!(users[0].force_logout_login);
    }

    #[test]
    fn test_should_reject_unknown_permission() {
        let err = parse_users(r#"{"external_user_id": "u1", "permissions": ["fly"]}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_should_reject_empty_user_list_and_empty_id() {
        assert!(parse_users("[]").is_err());
        assert!(parse_users(r#"{"external_user_id": " "}"#).is_err());
    }

    #[test]
    fn test_should_select_user_by_id_or_fall_back_to_first() {
        let users = vec![User::new("a"), User::new("b")];
        assert_eq!(select_user(&users, Some("b")).unwrap().external_user_id, "b");
        assert_eq!(select_user(&users, Some("zzz")).unwrap().external_user_id, "a");
        assert_eq!(select_user(&users, None).unwrap().external_user_id, "a");
        assert!(select_user(&[], None).is_none());
    }

    #[test]
    fn test_should_report_path_when_file_is_missing() {
        let err = load_users(Path::new("/nonexistent/demo_user.json")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/demo_user.json"));
    }
}
