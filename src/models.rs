use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    #[schema(skip)]
    pub password_hash: String, // argon2 PHC string, never leaves the server
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Group {
    pub id: Id,
    pub title: String,
    pub slug: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewGroup {
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
}

/// A post as read back from storage, with the author's username joined in.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Post {
    pub id: Id,
    pub text: String,
    pub pub_date: DateTime<Utc>,
    #[serde(skip_serializing, default)]
    #[schema(skip)]
    pub author_id: Id,
    pub author: String, // username
    #[serde(rename = "group")]
    pub group_id: Option<Id>,
    pub image: Option<String>, // path relative to the media root
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: Id,
    pub text: String,
    pub group_id: Option<Id>,
    pub image: Option<String>,
}

/// Field-wise post update; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct UpdatePost {
    pub text: Option<String>,
    pub group_id: Option<Option<Id>>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Comment {
    pub id: Id,
    #[serde(rename = "post")]
    pub post_id: Id,
    #[serde(skip_serializing, default)]
    #[schema(skip)]
    pub author_id: Id,
    pub author: String, // username
    pub text: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: Id,
    pub author_id: Id,
    pub text: String,
}

/// Directed edge: `user` receives `author`'s posts in their feed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Follow {
    pub id: Id,
    #[serde(skip_serializing, default)]
    #[schema(skip)]
    pub user_id: Id,
    #[serde(skip_serializing, default)]
    #[schema(skip)]
    pub author_id: Id,
    pub user: String,   // follower username
    pub author: String, // followed username
}

/// Which slice of posts a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostFilter {
    All,
    Group(Id),
    Author(Id),
    /// Posts by every author the given user follows.
    FollowedBy(Id),
}

impl PostFilter {
    pub fn matches(&self, post: &Post, follows: &[(Id, Id)]) -> bool {
        match *self {
            PostFilter::All => true,
            PostFilter::Group(g) => post.group_id == Some(g),
            PostFilter::Author(a) => post.author_id == a,
            PostFilter::FollowedBy(u) => follows
                .iter()
                .any(|&(user, author)| user == u && author == post.author_id),
        }
    }
}
