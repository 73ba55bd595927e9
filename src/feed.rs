//! Visible post sets: the global index, group and author listings, the
//! followed-authors feed, and the per-author counters shown next to them.

use serde::Serialize;

use crate::models::{Comment, Group, Id, Post, PostFilter, User};
use crate::pagination::{
    Page, Paginator, FOLLOW_PAGE_SIZE, GROUP_PAGE_SIZE, INDEX_PAGE_SIZE, PROFILE_PAGE_SIZE,
};
use crate::repo::{Repo, RepoResult};

/// Whether the viewer of a profile follows its author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowState {
    NotFollowing,
    Following,
    /// The viewer is looking at their own profile.
    #[serde(rename = "self")]
    SelfProfile,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AuthorStats {
    pub posts_count: usize,
    /// Users following this author.
    pub followers_count: usize,
    /// Authors this user follows.
    pub following_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupFeed {
    pub group: Group,
    pub page: Page<Post>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub author: User,
    pub stats: AuthorStats,
    pub following: FollowState,
    pub page: Page<Post>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    pub author: User,
    pub stats: AuthorStats,
    pub post: Post,
    pub comments: Vec<Comment>,
}

/// Counts first, then loads only the requested slice.
pub async fn paginate_posts(
    repo: &dyn Repo,
    filter: PostFilter,
    per_page: usize,
    page: Option<&str>,
) -> RepoResult<Page<Post>> {
    let paginator = Paginator::new(repo.count_posts(filter).await?, per_page);
    let number = paginator.page_number(page);
    let (offset, limit) = paginator.bounds(number);
    let posts = repo.list_posts(filter, limit, offset).await?;
    Ok(Page::new(posts, number, &paginator))
}

/// The index page a raw `?page=` value resolves to.
pub async fn index_page_number(repo: &dyn Repo, page: Option<&str>) -> RepoResult<usize> {
    let paginator = Paginator::new(repo.count_posts(PostFilter::All).await?, INDEX_PAGE_SIZE);
    Ok(paginator.page_number(page))
}

pub async fn index(repo: &dyn Repo, page: Option<&str>) -> RepoResult<Page<Post>> {
    paginate_posts(repo, PostFilter::All, INDEX_PAGE_SIZE, page).await
}

pub async fn group_feed(repo: &dyn Repo, slug: &str, page: Option<&str>) -> RepoResult<GroupFeed> {
    let group = repo.get_group_by_slug(slug).await?;
    let page = paginate_posts(repo, PostFilter::Group(group.id), GROUP_PAGE_SIZE, page).await?;
    Ok(GroupFeed { group, page })
}

/// Posts by every author `user_id` follows.
pub async fn follow_feed(repo: &dyn Repo, user_id: Id, page: Option<&str>) -> RepoResult<Page<Post>> {
    paginate_posts(repo, PostFilter::FollowedBy(user_id), FOLLOW_PAGE_SIZE, page).await
}

pub async fn author_stats(repo: &dyn Repo, author_id: Id) -> RepoResult<AuthorStats> {
    Ok(AuthorStats {
        posts_count: repo.count_posts(PostFilter::Author(author_id)).await?,
        followers_count: repo.count_followers(author_id).await?,
        following_count: repo.count_following(author_id).await?,
    })
}

pub async fn follow_state(repo: &dyn Repo, viewer: Option<Id>, author_id: Id) -> RepoResult<FollowState> {
    let Some(viewer) = viewer else { return Ok(FollowState::NotFollowing) };
    if viewer == author_id {
        return Ok(FollowState::SelfProfile);
    }
    Ok(match repo.find_follow(viewer, author_id).await? {
        Some(_) => FollowState::Following,
        None => FollowState::NotFollowing,
    })
}

pub async fn profile(
    repo: &dyn Repo,
    username: &str,
    viewer: Option<Id>,
    page: Option<&str>,
) -> RepoResult<Profile> {
    let author = repo.get_user_by_username(username).await?;
    let stats = author_stats(repo, author.id).await?;
    let following = follow_state(repo, viewer, author.id).await?;
    let page = paginate_posts(repo, PostFilter::Author(author.id), PROFILE_PAGE_SIZE, page).await?;
    Ok(Profile { author, stats, following, page })
}

/// A single post addressed as `/<username>/<post_id>/`; the post must belong to that user.
pub async fn post_detail(repo: &dyn Repo, username: &str, post_id: Id) -> RepoResult<PostDetail> {
    let author = repo.get_user_by_username(username).await?;
    let post = repo.get_post(post_id).await?;
    if post.author_id != author.id {
        return Err(crate::repo::RepoError::NotFound);
    }
    let comments = repo.list_comments(post.id).await?;
    let stats = author_stats(repo, author.id).await?;
    Ok(PostDetail { author, stats, post, comments })
}
