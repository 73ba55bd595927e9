use std::sync::Arc;

use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Deserializer, Serialize};
use tera::Tera;
use utoipa::{IntoParams, ToSchema};

use crate::auth::{verify_password, Auth, JwtKeys, TokenKind};
use crate::cache::PageCache;
use crate::config::Settings;
use crate::error::{ApiError, WebError};
use crate::feed;
use crate::follow::{self, FollowOutcome};
use crate::forms::{validate_group, CommentForm, PostForm, REQUIRED};
use crate::models::*;
use crate::pagination::{Page, PageQuery};
use crate::posts::{self, PostPatch};
use crate::render;
use crate::repo::{Repo, RepoError};
use crate::storage::{ImageStore, ImageStoreError};
use crate::views;

pub const ALREADY_FOLLOWING: &str = "You already follow this author.";
pub const CANNOT_FOLLOW_SELF: &str = "You cannot follow yourself.";
pub const DUPLICATE_SLUG: &str = "group with this slug already exists.";

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .app_data(web::JsonConfig::default().error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()))
            .app_data(web::PathConfig::default().error_handler(|_err, _req| ApiError::NotFound.into()))
            .service(web::resource("/token/").route(web::post().to(obtain_token)))
            .service(web::resource("/token/refresh/").route(web::post().to(refresh_token)))
            .service(
                web::resource("/posts/")
                    .route(web::get().to(list_posts))
                    .route(web::post().to(create_post)),
            )
            .service(
                web::resource("/posts/{id}/")
                    .route(web::get().to(get_post))
                    .route(web::put().to(update_post))
                    .route(web::patch().to(partial_update_post))
                    .route(web::delete().to(delete_post)),
            )
            .service(
                web::resource("/posts/{post_id}/comments/")
                    .route(web::get().to(list_comments))
                    .route(web::post().to(create_comment)),
            )
            .service(
                web::resource("/posts/{post_id}/comments/{id}/")
                    .route(web::get().to(get_comment))
                    .route(web::put().to(update_comment))
                    .route(web::patch().to(update_comment))
                    .route(web::delete().to(delete_comment)),
            )
            .service(
                web::resource("/group/")
                    .route(web::get().to(list_groups))
                    .route(web::post().to(create_group)),
            )
            .service(
                web::resource("/group/{id}/")
                    .route(web::get().to(get_group))
                    .route(web::delete().to(delete_group)),
            )
            .service(
                web::resource("/follow/")
                    .route(web::get().to(list_follows))
                    .route(web::post().to(create_follow)),
            )
            .service(
                web::resource("/follow/{id}/")
                    .route(web::get().to(get_follow))
                    .route(web::delete().to(delete_follow)),
            )
            .default_service(web::to(api_not_found)),
    );
    // outside the API scope so <img src="/media/..."> works
    cfg.route("/media/{path:.*}", web::get().to(media));
    views::config(cfg);
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub image_store: Arc<dyn ImageStore>,
    pub templates: Arc<Tera>,
    pub index_cache: PageCache,
    pub keys: JwtKeys,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repo>, image_store: Arc<dyn ImageStore>, settings: Settings) -> anyhow::Result<Self> {
        let templates = render::build_templates()?;
        Ok(Self {
            repo,
            image_store,
            templates: Arc::new(templates),
            index_cache: PageCache::new(settings.index_cache_ttl),
            keys: JwtKeys::from_settings(&settings),
            settings: Arc::new(settings),
        })
    }
}

/// Paginated list body: `{count, next, previous, results}`.
#[derive(Debug, Serialize, ToSchema)]
#[aliases(PostPage = ApiPage<Post>, CommentPage = ApiPage<Comment>, GroupPage = ApiPage<Group>, FollowPage = ApiPage<Follow>)]
pub struct ApiPage<T> {
    pub count: usize,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> ApiPage<T> {
    fn from_page(page: Page<T>, req: &HttpRequest) -> Self {
        Self {
            count: page.count,
            next: page.next_page_number.map(|n| page_link(req, n)),
            previous: page.previous_page_number.map(|n| page_link(req, n)),
            results: page.object_list,
        }
    }
}

/// Absolute URL of another page of the current listing, other filters kept.
fn page_link(req: &HttpRequest, number: usize) -> String {
    let info = req.connection_info();
    let page_param = format!("page={number}");
    let mut query: Vec<&str> = req
        .query_string()
        .split('&')
        .filter(|p| !p.is_empty() && !p.starts_with("page="))
        .collect();
    if number > 1 {
        query.push(&page_param);
    }
    let base = format!("{}://{}{}", info.scheme(), info.host(), req.path());
    if query.is_empty() { base } else { format!("{base}?{}", query.join("&")) }
}

/// Maps a present JSON key (even `null`) to `Some`, so PATCH can tell "unset" from "clear".
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

pub async fn api_not_found() -> Result<HttpResponse, ApiError> {
    Err(ApiError::NotFound)
}

// ---------------------------------------------------------------- tokens

#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AccessToken {
    pub access: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/token/",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Access and refresh tokens", body = TokenPair),
        (status = 401, description = "Unknown user or wrong password")
    )
)]
pub async fn obtain_token(data: web::Data<AppState>, payload: web::Json<TokenRequest>) -> Result<HttpResponse, ApiError> {
    let TokenRequest { username, password } = payload.into_inner();
    let user = match data.repo.get_user_by_username(&username).await {
        Ok(user) => user,
        Err(RepoError::NotFound) => return Err(ApiError::Unauthorized),
        Err(e) => return Err(e.into()),
    };
    if !verify_password(&password, &user.password_hash) {
        return Err(ApiError::Unauthorized);
    }
    let access = data.keys.issue(&user, TokenKind::Access).map_err(|_| ApiError::Internal)?;
    let refresh = data.keys.issue(&user, TokenKind::Refresh).map_err(|_| ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(TokenPair { access, refresh }))
}

#[utoipa::path(
    post,
    path = "/api/v1/token/refresh/",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Fresh access token", body = AccessToken),
        (status = 401, description = "Invalid or expired refresh token")
    )
)]
pub async fn refresh_token(data: web::Data<AppState>, payload: web::Json<RefreshRequest>) -> Result<HttpResponse, ApiError> {
    let claims = data
        .keys
        .verify(&payload.refresh, TokenKind::Refresh)
        .map_err(|_| ApiError::Unauthorized)?;
    let user = match data.repo.get_user(claims.uid).await {
        Ok(user) => user,
        Err(RepoError::NotFound) => return Err(ApiError::Unauthorized),
        Err(e) => return Err(e.into()),
    };
    let access = data.keys.issue(&user, TokenKind::Access).map_err(|_| ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(AccessToken { access }))
}

// ---------------------------------------------------------------- posts

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PostListQuery {
    /// Only posts of this group.
    pub group: Option<Id>,
    pub page: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PostPayload {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<i64>)]
    pub group: Option<Option<Id>>,
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/",
    params(PostListQuery),
    responses((status = 200, description = "Posts, newest first", body = PostPage))
)]
pub async fn list_posts(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<PostListQuery>,
) -> Result<HttpResponse, ApiError> {
    let filter = query.group.map_or(PostFilter::All, PostFilter::Group);
    let page = feed::paginate_posts(data.repo.as_ref(), filter, data.settings.api_page_size, query.page.as_deref()).await?;
    Ok(HttpResponse::Ok().json(ApiPage::from_page(page, &req)))
}

#[utoipa::path(
    post,
    path = "/api/v1/posts/",
    request_body = PostPayload,
    responses(
        (status = 201, description = "Post created", body = Post),
        (status = 400, description = "Invalid fields"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn create_post(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<PostPayload>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    let form = PostForm {
        text: payload.text.unwrap_or_default(),
        group: payload.group.flatten().map(|g| g.to_string()),
        ..Default::default()
    };
    let post = posts::create_post(data.repo.as_ref(), data.image_store.as_ref(), auth.user_id(), form).await?;
    Ok(HttpResponse::Created().json(post))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}/",
    params(("id" = i64, Path, description = "Post id")),
    responses(
        (status = 200, description = "The post", body = Post),
        (status = 404, description = "No such post")
    )
)]
pub async fn get_post(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    put,
    path = "/api/v1/posts/{id}/",
    request_body = PostPayload,
    params(("id" = i64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post replaced", body = Post),
        (status = 400, description = "Invalid fields"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "No such post")
    )
)]
pub async fn update_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<PostPayload>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    let patch = PostPatch {
        text: Some(payload.text.unwrap_or_default()),
        group: Some(payload.group.flatten()),
    };
    let post = posts::patch_post(data.repo.as_ref(), auth.user_id(), path.into_inner(), patch).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    patch,
    path = "/api/v1/posts/{id}/",
    request_body = PostPayload,
    params(("id" = i64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post updated", body = Post),
        (status = 400, description = "Invalid fields"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "No such post")
    )
)]
pub async fn partial_update_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<PostPayload>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    let patch = PostPatch { text: payload.text, group: payload.group };
    let post = posts::patch_post(data.repo.as_ref(), auth.user_id(), path.into_inner(), patch).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    delete,
    path = "/api/v1/posts/{id}/",
    params(("id" = i64, Path, description = "Post id")),
    responses(
        (status = 204, description = "Post and its comments deleted"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "No such post")
    )
)]
pub async fn delete_post(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    posts::delete_post(data.repo.as_ref(), auth.user_id(), path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------------------------------------------------------- comments

#[utoipa::path(
    get,
    path = "/api/v1/posts/{post_id}/comments/",
    params(("post_id" = i64, Path, description = "Post id"), ("page" = Option<String>, Query, description = "Page number")),
    responses(
        (status = 200, description = "Comments, oldest first", body = CommentPage),
        (status = 404, description = "No such post")
    )
)]
pub async fn list_comments(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let comments = data.repo.list_comments(path.into_inner()).await?;
    let page = Page::from_vec(comments, data.settings.api_page_size, query.page.as_deref());
    Ok(HttpResponse::Ok().json(ApiPage::from_page(page, &req)))
}

#[utoipa::path(
    post,
    path = "/api/v1/posts/{post_id}/comments/",
    request_body = CommentForm,
    params(("post_id" = i64, Path, description = "Post id")),
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 400, description = "Empty text"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "No such post")
    )
)]
pub async fn create_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<CommentForm>,
) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    let comment = posts::add_comment(data.repo.as_ref(), post.id, auth.user_id(), &payload).await?;
    Ok(HttpResponse::Created().json(comment))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{post_id}/comments/{id}/",
    params(("post_id" = i64, Path, description = "Post id"), ("id" = i64, Path, description = "Comment id")),
    responses(
        (status = 200, description = "The comment", body = Comment),
        (status = 404, description = "No such comment on this post")
    )
)]
pub async fn get_comment(data: web::Data<AppState>, path: web::Path<(Id, Id)>) -> Result<HttpResponse, ApiError> {
    let (post_id, id) = path.into_inner();
    let comment = posts::comment_of_post(data.repo.as_ref(), post_id, id).await?;
    Ok(HttpResponse::Ok().json(comment))
}

/// Serves both PUT and PATCH; text is the only writable field.
#[utoipa::path(
    put,
    path = "/api/v1/posts/{post_id}/comments/{id}/",
    request_body = CommentForm,
    params(("post_id" = i64, Path, description = "Post id"), ("id" = i64, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Comment updated", body = Comment),
        (status = 400, description = "Empty text"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "No such comment on this post")
    )
)]
pub async fn update_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id)>,
    payload: web::Json<CommentForm>,
) -> Result<HttpResponse, ApiError> {
    let (post_id, id) = path.into_inner();
    let comment = posts::edit_comment(data.repo.as_ref(), auth.user_id(), post_id, id, &payload).await?;
    Ok(HttpResponse::Ok().json(comment))
}

#[utoipa::path(
    delete,
    path = "/api/v1/posts/{post_id}/comments/{id}/",
    params(("post_id" = i64, Path, description = "Post id"), ("id" = i64, Path, description = "Comment id")),
    responses(
        (status = 204, description = "Comment deleted"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "No such comment on this post")
    )
)]
pub async fn delete_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id)>,
) -> Result<HttpResponse, ApiError> {
    let (post_id, id) = path.into_inner();
    posts::delete_comment(data.repo.as_ref(), auth.user_id(), post_id, id).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------------------------------------------------------- groups

#[utoipa::path(
    get,
    path = "/api/v1/group/",
    params(("page" = Option<String>, Query, description = "Page number")),
    responses((status = 200, description = "Groups", body = GroupPage))
)]
pub async fn list_groups(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let groups = data.repo.list_groups().await?;
    let page = Page::from_vec(groups, data.settings.api_page_size, query.page.as_deref());
    Ok(HttpResponse::Ok().json(ApiPage::from_page(page, &req)))
}

#[utoipa::path(
    post,
    path = "/api/v1/group/",
    request_body = NewGroup,
    responses(
        (status = 201, description = "Group created", body = Group),
        (status = 400, description = "Invalid fields or duplicate slug"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn create_group(
    _auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewGroup>,
) -> Result<HttpResponse, ApiError> {
    let new = validate_group(payload.into_inner()).map_err(ApiError::Validation)?;
    match data.repo.create_group(new).await {
        Ok(group) => {
            tracing::info!(group_id = group.id, slug = %group.slug, "group created");
            Ok(HttpResponse::Created().json(group))
        }
        Err(RepoError::Conflict) => Err(ApiError::field("slug", DUPLICATE_SLUG)),
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/group/{id}/",
    params(("id" = i64, Path, description = "Group id")),
    responses(
        (status = 200, description = "The group", body = Group),
        (status = 404, description = "No such group")
    )
)]
pub async fn get_group(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let group = data.repo.get_group(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(group))
}

#[utoipa::path(
    delete,
    path = "/api/v1/group/{id}/",
    params(("id" = i64, Path, description = "Group id")),
    responses(
        (status = 204, description = "Group and its posts deleted"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "No such group")
    )
)]
pub async fn delete_group(_auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    data.repo.delete_group(id).await?;
    tracing::info!(group_id = id, "group deleted");
    Ok(HttpResponse::NoContent().finish())
}

// ---------------------------------------------------------------- follows

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FollowListQuery {
    /// Exact username of either side of the edge.
    pub search: Option<String>,
    pub page: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FollowPayload {
    /// Username to follow.
    #[serde(default)]
    pub author: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/follow/",
    params(FollowListQuery),
    responses((status = 200, description = "Follow edges", body = FollowPage))
)]
pub async fn list_follows(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<FollowListQuery>,
) -> Result<HttpResponse, ApiError> {
    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let follows = data.repo.list_follows(search).await?;
    let page = Page::from_vec(follows, data.settings.api_page_size, query.page.as_deref());
    Ok(HttpResponse::Ok().json(ApiPage::from_page(page, &req)))
}

#[utoipa::path(
    post,
    path = "/api/v1/follow/",
    request_body = FollowPayload,
    responses(
        (status = 201, description = "Now following", body = Follow),
        (status = 400, description = "Unknown author, self-follow or already following"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn create_follow(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<FollowPayload>,
) -> Result<HttpResponse, ApiError> {
    let name = payload.author.trim();
    if name.is_empty() {
        return Err(ApiError::field("author", REQUIRED));
    }
    let author = match data.repo.get_user_by_username(name).await {
        Ok(author) => author,
        Err(RepoError::NotFound) => {
            return Err(ApiError::field("author", format!("Object with username={name} does not exist.")))
        }
        Err(e) => return Err(e.into()),
    };
    match follow::follow(data.repo.as_ref(), auth.user_id(), author.id).await? {
        FollowOutcome::Created(edge) => Ok(HttpResponse::Created().json(edge)),
        FollowOutcome::AlreadyFollowing => Err(ApiError::field("author", ALREADY_FOLLOWING)),
        FollowOutcome::SelfFollow => Err(ApiError::field("author", CANNOT_FOLLOW_SELF)),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/follow/{id}/",
    params(("id" = i64, Path, description = "Follow id")),
    responses(
        (status = 200, description = "The follow edge", body = Follow),
        (status = 404, description = "No such follow")
    )
)]
pub async fn get_follow(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let edge = data.repo.get_follow(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(edge))
}

#[utoipa::path(
    delete,
    path = "/api/v1/follow/{id}/",
    params(("id" = i64, Path, description = "Follow id")),
    responses(
        (status = 204, description = "Unfollowed"),
        (status = 403, description = "Edge belongs to another user"),
        (status = 404, description = "No such follow")
    )
)]
pub async fn delete_follow(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let edge = data.repo.get_follow(path.into_inner()).await?;
    if edge.user_id != auth.user_id() {
        return Err(ApiError::Forbidden);
    }
    data.repo.delete_follow(edge.id).await?;
    tracing::info!(follow_id = edge.id, user = %edge.user, author = %edge.author, "follow removed");
    Ok(HttpResponse::NoContent().finish())
}

// ---------------------------------------------------------------- media

/// Serves an uploaded image by its storage name.
pub async fn media(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, WebError> {
    match data.image_store.load(&path).await {
        Ok((bytes, mime)) => Ok(HttpResponse::Ok()
            .insert_header((header::CONTENT_TYPE, mime))
            // names are content hashes
            .insert_header((header::CACHE_CONTROL, "public, max-age=31536000, immutable"))
            .body(bytes)),
        Err(ImageStoreError::NotFound | ImageStoreError::InvalidName) => Err(WebError::NotFound),
        Err(e) => {
            log::error!("image_store load error: {e}");
            Err(WebError::Internal)
        }
    }
}
