#![cfg(feature = "postgres-store")]

use yatube::models::{NewComment, NewGroup, NewPost, NewUser, PostFilter, User};
use yatube::repo::pg::PgRepo;
use yatube::repo::{CommentRepo, FollowRepo, GroupRepo, PostRepo, RepoError, UserRepo};

async fn pg_repo() -> Option<PgRepo> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await
        .ok()?;
    let repo = PgRepo::new(pool);
    repo.migrate().await.ok()?;
    Some(repo)
}

// rows persist between runs, so names carry a per-run suffix
fn unique(name: &str) -> String {
    format!("{name}_{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

async fn user(repo: &PgRepo, name: &str) -> User {
    repo.create_user(NewUser { username: unique(name), email: String::new(), password_hash: String::new() })
        .await
        .unwrap()
}

#[tokio::test]
async fn follow_constraints_hold_in_postgres() {
    let Some(repo) = pg_repo().await else { eprintln!("skip: no DATABASE_URL"); return; };
    let leo = user(&repo, "leo").await;
    let ann = user(&repo, "ann").await;

    assert!(matches!(repo.create_follow(leo.id, leo.id).await.unwrap_err(), RepoError::SelfFollow));
    let edge = repo.create_follow(leo.id, ann.id).await.unwrap();
    assert_eq!(edge.author, ann.username);
    assert!(matches!(repo.create_follow(leo.id, ann.id).await.unwrap_err(), RepoError::Conflict));
    assert_eq!(repo.count_followers(ann.id).await.unwrap(), 1);

    repo.create_post(NewPost { author_id: ann.id, text: "hi".into(), group_id: None, image: None })
        .await
        .unwrap();
    assert_eq!(repo.count_posts(PostFilter::FollowedBy(leo.id)).await.unwrap(), 1);

    repo.delete_follow(edge.id).await.unwrap();
    assert_eq!(repo.count_posts(PostFilter::FollowedBy(leo.id)).await.unwrap(), 0);
}

#[tokio::test]
async fn group_delete_cascades_in_postgres() {
    let Some(repo) = pg_repo().await else { eprintln!("skip: no DATABASE_URL"); return; };
    let leo = user(&repo, "leo").await;
    let slug = unique("cats");
    let group = repo
        .create_group(NewGroup { title: "Cats".into(), slug: slug.clone(), description: String::new() })
        .await
        .unwrap();
    let dup = NewGroup { title: "Again".into(), slug, description: String::new() };
    assert!(matches!(repo.create_group(dup).await.unwrap_err(), RepoError::Conflict));

    let post = repo
        .create_post(NewPost { author_id: leo.id, text: "meow".into(), group_id: Some(group.id), image: None })
        .await
        .unwrap();
    let comment = repo
        .create_comment(NewComment { post_id: post.id, author_id: leo.id, text: "purr".into() })
        .await
        .unwrap();

    repo.delete_group(group.id).await.unwrap();
    assert!(matches!(repo.get_post(post.id).await.unwrap_err(), RepoError::NotFound));
    assert!(matches!(repo.get_comment(comment.id).await.unwrap_err(), RepoError::NotFound));
}

#[tokio::test]
async fn user_delete_cascades_in_postgres() {
    let Some(repo) = pg_repo().await else { eprintln!("skip: no DATABASE_URL"); return; };
    let leo = user(&repo, "leo").await;
    let ann = user(&repo, "ann").await;
    let post = repo
        .create_post(NewPost { author_id: leo.id, text: "bye".into(), group_id: None, image: None })
        .await
        .unwrap();
    let edge = repo.create_follow(ann.id, leo.id).await.unwrap();

    repo.delete_user(leo.id).await.unwrap();
    assert!(matches!(repo.get_post(post.id).await.unwrap_err(), RepoError::NotFound));
    assert!(matches!(repo.get_follow(edge.id).await.unwrap_err(), RepoError::NotFound));
    assert_eq!(repo.count_following(ann.id).await.unwrap(), 0);
}
