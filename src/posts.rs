//! Writes on posts and comments. Only the author of a post or comment may
//! change or remove it.

use tracing::{info, warn};

use crate::forms::{required_text, CleanPost, CommentForm, FormErrors, PostForm, ValidImage, INVALID_GROUP};
use crate::models::{Comment, Id, NewComment, NewPost, Post, UpdatePost};
use crate::repo::{Repo, RepoError};
use crate::storage::{ImageStore, ImageStoreError};

#[derive(thiserror::Error, Debug)]
pub enum PostError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("invalid input: {0}")]
    Invalid(FormErrors),
    #[error("only the author may change this")]
    NotAuthor,
    #[error("image storage failed: {0}")]
    Image(#[from] ImageStoreError),
}

pub type PostResult<T> = Result<T, PostError>;

/// Field-wise post change from the JSON API; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct PostPatch {
    pub text: Option<String>,
    pub group: Option<Option<Id>>,
}

/// An image written for the current request; `fresh` unless an identical file already existed.
struct StoredImage {
    name: String,
    fresh: bool,
}

async fn store_image(images: &dyn ImageStore, image: Option<ValidImage>) -> PostResult<Option<StoredImage>> {
    let Some(image) = image else { return Ok(None) };
    match images.save(&image.name, &image.bytes).await {
        Ok(()) => Ok(Some(StoredImage { name: image.name, fresh: true })),
        // names are content hashes, so an existing file is the same image
        Err(ImageStoreError::Duplicate) => Ok(Some(StoredImage { name: image.name, fresh: false })),
        Err(e) => Err(e.into()),
    }
}

/// Removes an image this request wrote when the row pointing at it was not saved.
async fn discard_image(images: &dyn ImageStore, stored: Option<StoredImage>) {
    let Some(stored) = stored.filter(|s| s.fresh) else { return };
    if let Err(e) = images.delete(&stored.name).await {
        warn!(image = %stored.name, "could not remove orphaned image: {e}");
    }
}

async fn owned_post(repo: &dyn Repo, editor_id: Id, post_id: Id) -> PostResult<Post> {
    let post = repo.get_post(post_id).await?;
    if post.author_id != editor_id {
        return Err(PostError::NotAuthor);
    }
    Ok(post)
}

pub async fn create_post(
    repo: &dyn Repo,
    images: &dyn ImageStore,
    author_id: Id,
    form: PostForm,
) -> PostResult<Post> {
    let CleanPost { text, group_id, image } = form.validate(repo).await.map_err(PostError::Invalid)?;
    let stored = store_image(images, image).await?;
    let image = stored.as_ref().map(|s| s.name.clone());
    let post = match repo.create_post(NewPost { author_id, text, group_id, image }).await {
        Ok(post) => post,
        Err(e) => {
            discard_image(images, stored).await;
            return Err(e.into());
        }
    };
    info!(post_id = post.id, author = %post.author, "post created");
    Ok(post)
}

/// Full-form edit: text and group are replaced, the image only when a new one is uploaded.
pub async fn edit_post(
    repo: &dyn Repo,
    images: &dyn ImageStore,
    editor_id: Id,
    post_id: Id,
    form: PostForm,
) -> PostResult<Post> {
    owned_post(repo, editor_id, post_id).await?;
    let CleanPost { text, group_id, image } = form.validate(repo).await.map_err(PostError::Invalid)?;
    let stored = store_image(images, image).await?;
    let image = stored.as_ref().map(|s| s.name.clone());
    let upd = UpdatePost { text: Some(text), group_id: Some(group_id), image };
    let post = match repo.update_post(post_id, upd).await {
        Ok(post) => post,
        Err(e) => {
            discard_image(images, stored).await;
            return Err(e.into());
        }
    };
    info!(post_id, "post edited");
    Ok(post)
}

pub async fn patch_post(repo: &dyn Repo, editor_id: Id, post_id: Id, patch: PostPatch) -> PostResult<Post> {
    owned_post(repo, editor_id, post_id).await?;
    let mut errors = FormErrors::new();
    let text = match patch.text {
        Some(raw) => required_text(&mut errors, "text", Some(&raw)),
        None => None,
    };
    if let Some(Some(group_id)) = patch.group {
        match repo.get_group(group_id).await {
            Ok(_) => {}
            Err(RepoError::NotFound) => errors.add("group", INVALID_GROUP),
            Err(e) => return Err(e.into()),
        }
    }
    if !errors.is_empty() {
        return Err(PostError::Invalid(errors));
    }
    let post = repo.update_post(post_id, UpdatePost { text, group_id: patch.group, image: None }).await?;
    info!(post_id, "post edited");
    Ok(post)
}

/// Removes the post (and its comments); returns what was removed.
pub async fn delete_post(repo: &dyn Repo, editor_id: Id, post_id: Id) -> PostResult<Post> {
    let post = owned_post(repo, editor_id, post_id).await?;
    repo.delete_post(post_id).await?;
    info!(post_id, author = %post.author, "post deleted");
    Ok(post)
}

/// Attaches a comment by `author_id` to the post; nothing is written when the text is empty.
pub async fn add_comment(repo: &dyn Repo, post_id: Id, author_id: Id, form: &CommentForm) -> PostResult<Comment> {
    let text = form.validate().map_err(PostError::Invalid)?;
    let comment = repo.create_comment(NewComment { post_id, author_id, text }).await?;
    info!(comment_id = comment.id, post_id, author = %comment.author, "comment added");
    Ok(comment)
}

/// Loads a comment and checks it hangs off `post_id`.
pub async fn comment_of_post(repo: &dyn Repo, post_id: Id, comment_id: Id) -> PostResult<Comment> {
    let comment = repo.get_comment(comment_id).await?;
    if comment.post_id != post_id {
        return Err(RepoError::NotFound.into());
    }
    Ok(comment)
}

pub async fn edit_comment(
    repo: &dyn Repo,
    editor_id: Id,
    post_id: Id,
    comment_id: Id,
    form: &CommentForm,
) -> PostResult<Comment> {
    let comment = comment_of_post(repo, post_id, comment_id).await?;
    if comment.author_id != editor_id {
        return Err(PostError::NotAuthor);
    }
    let text = form.validate().map_err(PostError::Invalid)?;
    Ok(repo.update_comment(comment_id, text).await?)
}

pub async fn delete_comment(repo: &dyn Repo, editor_id: Id, post_id: Id, comment_id: Id) -> PostResult<()> {
    let comment = comment_of_post(repo, post_id, comment_id).await?;
    if comment.author_id != editor_id {
        return Err(PostError::NotAuthor);
    }
    repo.delete_comment(comment_id).await?;
    info!(comment_id, post_id, "comment deleted");
    Ok(())
}

#[cfg(all(test, feature = "inmem-store"))]
mod tests {
    use super::*;
    use crate::forms::UploadedImage;
    use crate::repo::inmem::InMemRepo;
    use crate::storage::{image_name, FsImageStore};

    const GIF: &[u8] = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;";

    fn form_with_gif() -> PostForm {
        PostForm {
            text: "pixel".into(),
            image: Some(UploadedImage { filename: "p.gif".into(), bytes: GIF.to_vec(), oversized: false }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn failed_insert_leaves_no_image_behind() {
        let repo = InMemRepo::new();
        let dir = tempfile::tempdir().unwrap();
        let images = FsImageStore::new(dir.path());

        // no such author, so the row is refused after the image was written
        let err = create_post(&repo, &images, 9999, form_with_gif()).await.unwrap_err();
        assert!(matches!(err, PostError::Repo(RepoError::NotFound)));
        let name = image_name(GIF, "gif");
        assert!(matches!(images.load(&name).await, Err(ImageStoreError::NotFound)));
    }

    #[tokio::test]
    async fn failed_insert_keeps_an_image_already_in_use() {
        let repo = InMemRepo::new();
        let dir = tempfile::tempdir().unwrap();
        let images = FsImageStore::new(dir.path());
        let name = image_name(GIF, "gif");
        images.save(&name, GIF).await.unwrap();

        assert!(create_post(&repo, &images, 9999, form_with_gif()).await.is_err());
        assert!(images.load(&name).await.is_ok());
    }
}
