//! Database Models - structs representing database tables (used by sqlx/serde).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// User model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: String,
    pub avatar: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin.as_str()
    }
}

/// New user for insertion
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryStatus {
    Ongoing,
    Completed,
    Dropped,
}

impl StoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryStatus::Ongoing => "ongoing",
            StoryStatus::Completed => "completed",
            StoryStatus::Dropped => "dropped",
        }
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ongoing" => Ok(StoryStatus::Ongoing),
            "completed" => Ok(StoryStatus::Completed),
            "dropped" => Ok(StoryStatus::Dropped),
            other => Err(format!("unknown story status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterStatus {
    Published,
    Draft,
}

impl ChapterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChapterStatus::Published => "published",
            ChapterStatus::Draft => "draft",
        }
    }
}

/// Story model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub author_id: Option<Uuid>,
    pub description: String,
    pub cover_image: String,
    pub status: String,
    pub views: i64,
    pub total_chapters: i32,
    pub rating_total: i64,
    pub rating_count: i32,
    pub rating_average: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Story joined with its author's username, used by every listing.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryCard {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub story: Story,
    pub author_username: Option<String>,
}

/// Minimal story reference offered when a lookup fails.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorySuggestion {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
}

/// New story for insertion
#[derive(Debug, Clone)]
pub struct NewStory {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub author_id: Uuid,
    pub description: String,
    pub cover_image: Option<String>,
    pub status: StoryStatus,
    pub category_ids: Vec<Uuid>,
}

/// Story update; `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct StoryChanges {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub status: Option<StoryStatus>,
    pub category_ids: Option<Vec<Uuid>>,
}

/// Chapter model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: Uuid,
    pub story_id: Uuid,
    pub title: String,
    pub content: String,
    pub chapter_number: i32,
    pub views: i64,
    pub status: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Chapter without its content, for tables of contents.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterSummary {
    pub id: Uuid,
    pub story_id: Uuid,
    pub title: String,
    pub chapter_number: i32,
    pub views: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Previous/next chapter pointer.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChapterLink {
    pub id: Uuid,
    pub chapter_number: i32,
    pub title: String,
}

/// New chapter for insertion
#[derive(Debug, Clone)]
pub struct NewChapter {
    pub story_id: Uuid,
    pub title: String,
    pub content: String,
    pub chapter_number: i32,
    pub status: ChapterStatus,
    pub created_by: Uuid,
}

/// Chapter update; `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct ChapterChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub chapter_number: Option<i32>,
    pub status: Option<ChapterStatus>,
}

/// Category model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

/// Bookmark joined with the bookmarked story.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkEntry {
    pub story_id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub cover_image: String,
    pub added_at: DateTime<Utc>,
}

/// Reading history entry joined with story and chapter titles.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub story_id: Uuid,
    pub story_title: String,
    pub story_slug: String,
    pub chapter_id: Uuid,
    pub chapter_title: String,
    pub chapter_number: i32,
    pub last_read: DateTime<Utc>,
}

/// Back-office totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SiteStats {
    pub total_stories: i64,
    pub total_users: i64,
    pub total_chapters: i64,
    pub total_views: i64,
}
