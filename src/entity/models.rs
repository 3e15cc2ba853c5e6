use crate::core::EntityKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub impressions: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub impressions: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub impressions: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opening {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub impressions: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(default)]
    pub impressions: i64,
}

impression_entity!(Post, post, EntityKind::Post);
impression_entity!(Project, project, EntityKind::Project);
impression_entity!(Event, event, EntityKind::Event);
impression_entity!(Opening, opening, EntityKind::Opening);
impression_entity!(User, user, EntityKind::User);
