use tracing::info;

use crate::models::{Follow, Id};
use crate::repo::{Repo, RepoError, RepoResult};

#[derive(Debug, Clone)]
pub enum FollowOutcome {
    Created(Follow),
    AlreadyFollowing,
    /// `user == author`; nothing is stored.
    SelfFollow,
}

impl FollowOutcome {
    pub fn created(&self) -> bool {
        matches!(self, FollowOutcome::Created(_))
    }
}

/// Makes `user_id` follow `author_id`. Calling it again, or with both ids
/// equal, leaves the store untouched.
pub async fn follow(repo: &dyn Repo, user_id: Id, author_id: Id) -> RepoResult<FollowOutcome> {
    if user_id == author_id {
        return Ok(FollowOutcome::SelfFollow);
    }
    if repo.find_follow(user_id, author_id).await?.is_some() {
        return Ok(FollowOutcome::AlreadyFollowing);
    }
    match repo.create_follow(user_id, author_id).await {
        Ok(edge) => {
            info!(follow_id = edge.id, user = %edge.user, author = %edge.author, "follow created");
            Ok(FollowOutcome::Created(edge))
        }
        // lost a race with a concurrent identical request
        Err(RepoError::Conflict) => Ok(FollowOutcome::AlreadyFollowing),
        Err(RepoError::SelfFollow) => Ok(FollowOutcome::SelfFollow),
        Err(e) => Err(e),
    }
}

/// Drops the edge if present. Returns whether anything was removed.
pub async fn unfollow(repo: &dyn Repo, user_id: Id, author_id: Id) -> RepoResult<bool> {
    let Some(edge) = repo.find_follow(user_id, author_id).await? else {
        return Ok(false);
    };
    match repo.delete_follow(edge.id).await {
        Ok(()) => {
            info!(follow_id = edge.id, user = %edge.user, author = %edge.author, "follow removed");
            Ok(true)
        }
        Err(RepoError::NotFound) => Ok(false),
        Err(e) => Err(e),
    }
}
