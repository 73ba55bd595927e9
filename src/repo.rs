use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("a user cannot follow themselves")] SelfFollow,
    #[error("storage error: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn get_user_by_username(&self, username: &str) -> RepoResult<User>;
    /// Removes the user, their posts and comments, and every follow edge touching them.
    async fn delete_user(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait GroupRepo: Send + Sync {
    async fn list_groups(&self) -> RepoResult<Vec<Group>>;
    async fn create_group(&self, new: NewGroup) -> RepoResult<Group>;
    async fn get_group(&self, id: Id) -> RepoResult<Group>;
    async fn get_group_by_slug(&self, slug: &str) -> RepoResult<Group>;
    /// Removes the group together with its posts and their comments.
    async fn delete_group(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn create_post(&self, new: NewPost) -> RepoResult<Post>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post>;
    /// Removes the post together with its comments.
    async fn delete_post(&self, id: Id) -> RepoResult<()>;
    async fn count_posts(&self, filter: PostFilter) -> RepoResult<usize>;
    /// Newest first.
    async fn list_posts(&self, filter: PostFilter, limit: usize, offset: usize) -> RepoResult<Vec<Post>>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// Oldest first.
    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>>;
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment>;
    async fn get_comment(&self, id: Id) -> RepoResult<Comment>;
    async fn update_comment(&self, id: Id, text: String) -> RepoResult<Comment>;
    async fn delete_comment(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait FollowRepo: Send + Sync {
    /// Fails with `Conflict` when the edge exists and `SelfFollow` when both ends match.
    async fn create_follow(&self, user_id: Id, author_id: Id) -> RepoResult<Follow>;
    async fn get_follow(&self, id: Id) -> RepoResult<Follow>;
    async fn find_follow(&self, user_id: Id, author_id: Id) -> RepoResult<Option<Follow>>;
    async fn delete_follow(&self, id: Id) -> RepoResult<()>;
    /// `search` matches the follower or the author username exactly.
    async fn list_follows(&self, search: Option<&str>) -> RepoResult<Vec<Follow>>;
    async fn count_followers(&self, author_id: Id) -> RepoResult<usize>;
    async fn count_following(&self, user_id: Id) -> RepoResult<usize>;
}

pub trait Repo: UserRepo + GroupRepo + PostRepo + CommentRepo + FollowRepo {}

impl<T> Repo for T where T: UserRepo + GroupRepo + PostRepo + CommentRepo + FollowRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

    #[derive(Default)]
    struct State {
        users: HashMap<Id, User>,
        groups: HashMap<Id, Group>,
        posts: HashMap<Id, Post>,
        comments: HashMap<Id, Comment>,
        follows: HashMap<Id, Follow>,
        next_id: Id,
    }

    impl State {
        fn next_id(&mut self) -> Id {
            self.next_id += 1;
            self.next_id
        }

        fn follow_pairs(&self) -> Vec<(Id, Id)> {
            self.follows.values().map(|f| (f.user_id, f.author_id)).collect()
        }

        fn username(&self, id: Id) -> RepoResult<String> {
            self.users.get(&id).map(|u| u.username.clone()).ok_or(RepoError::NotFound)
        }

        fn remove_post_cascade(&mut self, id: Id) {
            self.posts.remove(&id);
            self.comments.retain(|_, c| c.post_id != id);
        }
    }

    /// Process-local store; state lives as long as the value (and its clones).
    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
    }

    impl InMemRepo {
        pub fn new() -> Self {
            Self::default()
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.write()?;
            if s.users.values().any(|u| u.username == new.username) {
                return Err(RepoError::Conflict);
            }
            let id = s.next_id();
            let user = User { id, username: new.username, email: new.email, password_hash: new.password_hash };
            s.users.insert(id, user.clone());
            Ok(user)
        }
        async fn get_user(&self, id: Id) -> RepoResult<User> {
            self.read()?.users.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn get_user_by_username(&self, username: &str) -> RepoResult<User> {
            self.read()?
                .users
                .values()
                .find(|u| u.username == username)
                .cloned()
                .ok_or(RepoError::NotFound)
        }
        async fn delete_user(&self, id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            s.users.remove(&id).ok_or(RepoError::NotFound)?;
            let doomed: Vec<Id> = s.posts.values().filter(|p| p.author_id == id).map(|p| p.id).collect();
            for post_id in doomed {
                s.remove_post_cascade(post_id);
            }
            s.comments.retain(|_, c| c.author_id != id);
            s.follows.retain(|_, f| f.user_id != id && f.author_id != id);
            Ok(())
        }
    }

    #[async_trait]
    impl GroupRepo for InMemRepo {
        async fn list_groups(&self) -> RepoResult<Vec<Group>> {
            let mut v: Vec<_> = self.read()?.groups.values().cloned().collect();
            v.sort_by_key(|g| g.id);
            Ok(v)
        }
        async fn create_group(&self, new: NewGroup) -> RepoResult<Group> {
            let mut s = self.write()?;
            if s.groups.values().any(|g| g.slug == new.slug) {
                return Err(RepoError::Conflict);
            }
            let id = s.next_id();
            let group = Group { id, title: new.title, slug: new.slug, description: new.description };
            s.groups.insert(id, group.clone());
            Ok(group)
        }
        async fn get_group(&self, id: Id) -> RepoResult<Group> {
            self.read()?.groups.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn get_group_by_slug(&self, slug: &str) -> RepoResult<Group> {
            self.read()?
                .groups
                .values()
                .find(|g| g.slug == slug)
                .cloned()
                .ok_or(RepoError::NotFound)
        }
        async fn delete_group(&self, id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            s.groups.remove(&id).ok_or(RepoError::NotFound)?;
            let doomed: Vec<Id> = s.posts.values().filter(|p| p.group_id == Some(id)).map(|p| p.id).collect();
            for post_id in doomed {
                s.remove_post_cascade(post_id);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let mut s = self.write()?;
            let author = s.username(new.author_id)?;
            if let Some(g) = new.group_id {
                if !s.groups.contains_key(&g) { return Err(RepoError::NotFound); }
            }
            let id = s.next_id();
            let post = Post {
                id,
                text: new.text,
                pub_date: Utc::now(),
                author_id: new.author_id,
                author,
                group_id: new.group_id,
                image: new.image,
            };
            s.posts.insert(id, post.clone());
            Ok(post)
        }
        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            self.read()?.posts.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            let mut s = self.write()?;
            if let Some(Some(g)) = upd.group_id {
                if !s.groups.contains_key(&g) { return Err(RepoError::NotFound); }
            }
            let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(text) = upd.text { post.text = text; }
            if let Some(group_id) = upd.group_id { post.group_id = group_id; }
            if let Some(image) = upd.image { post.image = Some(image); }
            Ok(post.clone())
        }
        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            if !s.posts.contains_key(&id) { return Err(RepoError::NotFound); }
            s.remove_post_cascade(id);
            Ok(())
        }
        async fn count_posts(&self, filter: PostFilter) -> RepoResult<usize> {
            let s = self.read()?;
            let follows = s.follow_pairs();
            Ok(s.posts.values().filter(|p| filter.matches(p, &follows)).count())
        }
        async fn list_posts(&self, filter: PostFilter, limit: usize, offset: usize) -> RepoResult<Vec<Post>> {
            let s = self.read()?;
            let follows = s.follow_pairs();
            let mut v: Vec<_> = s.posts.values().filter(|p| filter.matches(p, &follows)).cloned().collect();
            v.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id))); // latest first
            Ok(v.into_iter().skip(offset).take(limit).collect())
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
            let s = self.read()?;
            if !s.posts.contains_key(&post_id) { return Err(RepoError::NotFound); }
            let mut v: Vec<_> = s.comments.values().filter(|c| c.post_id == post_id).cloned().collect();
            v.sort_by(|a, b| a.created.cmp(&b.created).then(a.id.cmp(&b.id))); // ascending
            Ok(v)
        }
        async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
            let mut s = self.write()?;
            if !s.posts.contains_key(&new.post_id) { return Err(RepoError::NotFound); }
            let author = s.username(new.author_id)?;
            let id = s.next_id();
            let comment = Comment {
                id,
                post_id: new.post_id,
                author_id: new.author_id,
                author,
                text: new.text,
                created: Utc::now(),
            };
            s.comments.insert(id, comment.clone());
            Ok(comment)
        }
        async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
            self.read()?.comments.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn update_comment(&self, id: Id, text: String) -> RepoResult<Comment> {
            let mut s = self.write()?;
            let comment = s.comments.get_mut(&id).ok_or(RepoError::NotFound)?;
            comment.text = text;
            Ok(comment.clone())
        }
        async fn delete_comment(&self, id: Id) -> RepoResult<()> {
            self.write()?.comments.remove(&id).map(|_| ()).ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl FollowRepo for InMemRepo {
        async fn create_follow(&self, user_id: Id, author_id: Id) -> RepoResult<Follow> {
            if user_id == author_id { return Err(RepoError::SelfFollow); }
            // check and insert under one write lock so the pair stays unique
            let mut s = self.write()?;
            if s.follows.values().any(|f| f.user_id == user_id && f.author_id == author_id) {
                return Err(RepoError::Conflict);
            }
            let user = s.username(user_id)?;
            let author = s.username(author_id)?;
            let id = s.next_id();
            let follow = Follow { id, user_id, author_id, user, author };
            s.follows.insert(id, follow.clone());
            Ok(follow)
        }
        async fn get_follow(&self, id: Id) -> RepoResult<Follow> {
            self.read()?.follows.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn find_follow(&self, user_id: Id, author_id: Id) -> RepoResult<Option<Follow>> {
            Ok(self
                .read()?
                .follows
                .values()
                .find(|f| f.user_id == user_id && f.author_id == author_id)
                .cloned())
        }
        async fn delete_follow(&self, id: Id) -> RepoResult<()> {
            self.write()?.follows.remove(&id).map(|_| ()).ok_or(RepoError::NotFound)
        }
        async fn list_follows(&self, search: Option<&str>) -> RepoResult<Vec<Follow>> {
            let s = self.read()?;
            let mut v: Vec<_> = s
                .follows
                .values()
                .filter(|f| search.map_or(true, |q| f.user == q || f.author == q))
                .cloned()
                .collect();
            v.sort_by_key(|f| f.id);
            Ok(v)
        }
        async fn count_followers(&self, author_id: Id) -> RepoResult<usize> {
            Ok(self.read()?.follows.values().filter(|f| f.author_id == author_id).count())
        }
        async fn count_following(&self, user_id: Id) -> RepoResult<usize> {
            Ok(self.read()?.follows.values().filter(|f| f.user_id == user_id).count())
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    const POST_SELECT: &str = r#"
        SELECT p.id, p.text, p.pub_date, p.author_id, u.username AS author, p.group_id, p.image
        FROM posts p
        JOIN users u ON u.id = p.author_id
    "#;

    const COMMENT_SELECT: &str = r#"
        SELECT c.id, c.post_id, c.author_id, u.username AS author, c.text, c.created
        FROM comments c
        JOIN users u ON u.id = c.author_id
    "#;

    const FOLLOW_SELECT: &str = r#"
        SELECT f.id, f.user_id, f.author_id, fu.username AS "user", au.username AS author
        FROM follows f
        JOIN users fu ON fu.id = f.user_id
        JOIN users au ON au.id = f.author_id
    "#;

    fn map_err(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Conflict,
            sqlx::Error::Database(db) if db.constraint() == Some("follows_not_self") => RepoError::SelfFollow,
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => RepoError::NotFound,
            other => RepoError::Internal(other.to_string()),
        }
    }

    fn filter_clause(filter: PostFilter) -> Option<(&'static str, Id)> {
        match filter {
            PostFilter::All => None,
            PostFilter::Group(g) => Some(("p.group_id = $1", g)),
            PostFilter::Author(a) => Some(("p.author_id = $1", a)),
            PostFilter::FollowedBy(u) => Some(("p.author_id IN (SELECT author_id FROM follows WHERE user_id = $1)", u)),
        }
    }

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        /// Applies the bundled schema migrations.
        pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
            sqlx::migrate!("./migrations").run(&self.pool).await
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "INSERT INTO users (username, email, password_hash) VALUES ($1,$2,$3) RETURNING id, username, email, password_hash",
            )
            .bind(&new.username).bind(&new.email).bind(&new.password_hash)
            .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn get_user(&self, id: Id) -> RepoResult<User> {
            sqlx::query_as::<_, User>("SELECT id, username, email, password_hash FROM users WHERE id=$1")
                .bind(id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn get_user_by_username(&self, username: &str) -> RepoResult<User> {
            sqlx::query_as::<_, User>("SELECT id, username, email, password_hash FROM users WHERE username=$1")
                .bind(username)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn delete_user(&self, id: Id) -> RepoResult<()> {
            // posts, comments and follows reference users ON DELETE CASCADE
            let res = sqlx::query("DELETE FROM users WHERE id=$1")
                .bind(id)
                .execute(&self.pool).await.map_err(map_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }
    }

    #[async_trait]
    impl GroupRepo for PgRepo {
        async fn list_groups(&self) -> RepoResult<Vec<Group>> {
            sqlx::query_as::<_, Group>("SELECT id, title, slug, description FROM groups ORDER BY id")
                .fetch_all(&self.pool).await.map_err(map_err)
        }
        async fn create_group(&self, new: NewGroup) -> RepoResult<Group> {
            sqlx::query_as::<_, Group>(
                "INSERT INTO groups (title, slug, description) VALUES ($1,$2,$3) RETURNING id, title, slug, description",
            )
            .bind(&new.title).bind(&new.slug).bind(&new.description)
            .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn get_group(&self, id: Id) -> RepoResult<Group> {
            sqlx::query_as::<_, Group>("SELECT id, title, slug, description FROM groups WHERE id=$1")
                .bind(id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn get_group_by_slug(&self, slug: &str) -> RepoResult<Group> {
            sqlx::query_as::<_, Group>("SELECT id, title, slug, description FROM groups WHERE slug=$1")
                .bind(slug)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn delete_group(&self, id: Id) -> RepoResult<()> {
            // posts and comments go with it (ON DELETE CASCADE)
            let res = sqlx::query("DELETE FROM groups WHERE id=$1")
                .bind(id)
                .execute(&self.pool).await.map_err(map_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            let (id,): (Id,) = sqlx::query_as(
                "INSERT INTO posts (text, author_id, group_id, image) VALUES ($1,$2,$3,$4) RETURNING id",
            )
            .bind(&new.text).bind(new.author_id).bind(new.group_id).bind(new.image.as_ref())
            .fetch_one(&mut *tx).await.map_err(map_err)?;
            let post = sqlx::query_as::<_, Post>(&format!("{POST_SELECT} WHERE p.id = $1"))
                .bind(id)
                .fetch_one(&mut *tx).await.map_err(map_err)?;
            tx.commit().await.map_err(map_err)?;
            Ok(post)
        }
        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!("{POST_SELECT} WHERE p.id = $1"))
                .bind(id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            let (set_group, group_id) = match upd.group_id {
                Some(g) => (true, g),
                None => (false, None),
            };
            let res = sqlx::query(
                "UPDATE posts SET text = COALESCE($2, text), group_id = CASE WHEN $3 THEN $4 ELSE group_id END, image = COALESCE($5, image) WHERE id=$1",
            )
            .bind(id)
            .bind(upd.text.as_ref())
            .bind(set_group)
            .bind(group_id)
            .bind(upd.image.as_ref())
            .execute(&mut *tx).await.map_err(map_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            let post = sqlx::query_as::<_, Post>(&format!("{POST_SELECT} WHERE p.id = $1"))
                .bind(id)
                .fetch_one(&mut *tx).await.map_err(map_err)?;
            tx.commit().await.map_err(map_err)?;
            Ok(post)
        }
        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM posts WHERE id=$1")
                .bind(id)
                .execute(&self.pool).await.map_err(map_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }
        async fn count_posts(&self, filter: PostFilter) -> RepoResult<usize> {
            let (n,): (i64,) = match filter_clause(filter) {
                Some((clause, arg)) => sqlx::query_as(&format!("SELECT COUNT(*) FROM posts p WHERE {clause}"))
                    .bind(arg)
                    .fetch_one(&self.pool).await,
                None => sqlx::query_as("SELECT COUNT(*) FROM posts p")
                    .fetch_one(&self.pool).await,
            }
            .map_err(map_err)?;
            Ok(n.max(0) as usize)
        }
        async fn list_posts(&self, filter: PostFilter, limit: usize, offset: usize) -> RepoResult<Vec<Post>> {
            let (limit, offset) = (limit as i64, offset as i64);
            match filter_clause(filter) {
                Some((clause, arg)) => sqlx::query_as::<_, Post>(&format!(
                    "{POST_SELECT} WHERE {clause} ORDER BY p.pub_date DESC, p.id DESC LIMIT $2 OFFSET $3"
                ))
                .bind(arg).bind(limit).bind(offset)
                .fetch_all(&self.pool).await,
                None => sqlx::query_as::<_, Post>(&format!(
                    "{POST_SELECT} ORDER BY p.pub_date DESC, p.id DESC LIMIT $1 OFFSET $2"
                ))
                .bind(limit).bind(offset)
                .fetch_all(&self.pool).await,
            }
            .map_err(map_err)
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
            self.get_post(post_id).await?;
            sqlx::query_as::<_, Comment>(&format!("{COMMENT_SELECT} WHERE c.post_id = $1 ORDER BY c.created ASC, c.id ASC"))
                .bind(post_id)
                .fetch_all(&self.pool).await.map_err(map_err)
        }
        async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            let (id,): (Id,) = sqlx::query_as(
                "INSERT INTO comments (post_id, author_id, text) VALUES ($1,$2,$3) RETURNING id",
            )
            .bind(new.post_id).bind(new.author_id).bind(&new.text)
            .fetch_one(&mut *tx).await.map_err(map_err)?;
            let comment = sqlx::query_as::<_, Comment>(&format!("{COMMENT_SELECT} WHERE c.id = $1"))
                .bind(id)
                .fetch_one(&mut *tx).await.map_err(map_err)?;
            tx.commit().await.map_err(map_err)?;
            Ok(comment)
        }
        async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
            sqlx::query_as::<_, Comment>(&format!("{COMMENT_SELECT} WHERE c.id = $1"))
                .bind(id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn update_comment(&self, id: Id, text: String) -> RepoResult<Comment> {
            let res = sqlx::query("UPDATE comments SET text=$2 WHERE id=$1")
                .bind(id).bind(&text)
                .execute(&self.pool).await.map_err(map_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            self.get_comment(id).await
        }
        async fn delete_comment(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM comments WHERE id=$1")
                .bind(id)
                .execute(&self.pool).await.map_err(map_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }
    }

    #[async_trait]
    impl FollowRepo for PgRepo {
        async fn create_follow(&self, user_id: Id, author_id: Id) -> RepoResult<Follow> {
            if user_id == author_id { return Err(RepoError::SelfFollow); }
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            // unique (user_id, author_id) makes a racing duplicate fail here
            let (id,): (Id,) = sqlx::query_as(
                "INSERT INTO follows (user_id, author_id) VALUES ($1,$2) RETURNING id",
            )
            .bind(user_id).bind(author_id)
            .fetch_one(&mut *tx).await.map_err(map_err)?;
            let follow = sqlx::query_as::<_, Follow>(&format!("{FOLLOW_SELECT} WHERE f.id = $1"))
                .bind(id)
                .fetch_one(&mut *tx).await.map_err(map_err)?;
            tx.commit().await.map_err(map_err)?;
            Ok(follow)
        }
        async fn get_follow(&self, id: Id) -> RepoResult<Follow> {
            sqlx::query_as::<_, Follow>(&format!("{FOLLOW_SELECT} WHERE f.id = $1"))
                .bind(id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn find_follow(&self, user_id: Id, author_id: Id) -> RepoResult<Option<Follow>> {
            sqlx::query_as::<_, Follow>(&format!("{FOLLOW_SELECT} WHERE f.user_id = $1 AND f.author_id = $2"))
                .bind(user_id).bind(author_id)
                .fetch_optional(&self.pool).await.map_err(map_err)
        }
        async fn delete_follow(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM follows WHERE id=$1")
                .bind(id)
                .execute(&self.pool).await.map_err(map_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }
        async fn list_follows(&self, search: Option<&str>) -> RepoResult<Vec<Follow>> {
            sqlx::query_as::<_, Follow>(&format!(
                "{FOLLOW_SELECT} WHERE $1::TEXT IS NULL OR fu.username = $1 OR au.username = $1 ORDER BY f.id"
            ))
            .bind(search)
            .fetch_all(&self.pool).await.map_err(map_err)
        }
        async fn count_followers(&self, author_id: Id) -> RepoResult<usize> {
            let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM follows WHERE author_id=$1")
                .bind(author_id)
                .fetch_one(&self.pool).await.map_err(map_err)?;
            Ok(n.max(0) as usize)
        }
        async fn count_following(&self, user_id: Id) -> RepoResult<usize> {
            let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM follows WHERE user_id=$1")
                .bind(user_id)
                .fetch_one(&self.pool).await.map_err(map_err)?;
            Ok(n.max(0) as usize)
        }
    }
}
