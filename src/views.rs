//! HTML pages: feeds, profiles, post and comment forms, follow links and
//! the cookie-based sign-in flow.

use actix_multipart::Multipart;
use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use tracing::info;

use crate::auth::{hash_password, verify_password, Auth, TokenKind, AUTH_COOKIE};
use crate::cache::PageCache;
use crate::error::WebError;
use crate::feed::{self, PostDetail};
use crate::follow;
use crate::forms::{CommentForm, FormErrors, PostForm, SignupForm};
use crate::models::{Id, NewUser, Post};
use crate::pagination::PageQuery;
use crate::posts::{self, PostError};
use crate::render::{self, redirect};
use crate::repo::RepoError;
use crate::routes::AppState;

pub const BAD_CREDENTIALS: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";
pub const USERNAME_TAKEN: &str = "A user with that username already exists.";

pub fn config(cfg: &mut web::ServiceConfig) {
    // `/leo/abc/` is a missing page, not a bad request
    cfg.app_data(web::PathConfig::default().error_handler(|_err, _req| WebError::NotFound.into()));
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(
            web::scope("/auth")
                .service(
                    web::resource("/signup/")
                        .route(web::get().to(signup_form))
                        .route(web::post().to(signup)),
                )
                .service(
                    web::resource("/login/")
                        .route(web::get().to(login_form))
                        .route(web::post().to(login)),
                )
                .service(web::resource("/logout/").route(web::get().to(logout))),
        )
        .service(
            web::resource("/new/")
                .route(web::get().to(new_post_form))
                .route(web::post().to(new_post)),
        )
        .service(web::resource("/follow/").route(web::get().to(follow_index)))
        .service(web::resource("/group/{slug}/").route(web::get().to(group_posts)))
        // per-user pages last: `{username}` would shadow the fixed prefixes above
        .service(web::resource("/{username}/").route(web::get().to(profile)))
        .service(web::resource("/{username}/follow").route(web::get().to(profile_follow)))
        .service(web::resource("/{username}/unfollow").route(web::get().to(profile_unfollow)))
        .service(web::resource("/{username}/{post_id}/").route(web::get().to(post_view)))
        .service(
            web::resource("/{username}/{post_id}/edit/")
                .route(web::get().to(post_edit_form))
                .route(web::post().to(post_edit)),
        )
        .service(web::resource("/{username}/{post_id}/delete/").route(web::post().to(post_delete)))
        .service(
            web::resource("/{username}/{post_id}/comment")
                .route(web::get().to(comment_redirect))
                .route(web::post().to(add_comment)),
        )
        .default_service(web::to(not_found));
}

fn login_redirect(req: &HttpRequest) -> HttpResponse {
    redirect(&format!("/auth/login/?next={}", req.path()))
}

/// Only same-site absolute paths are followed after login.
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") && !n.contains('\\') => n,
        _ => "/",
    }
}

fn post_url(post: &Post) -> String {
    format!("/{}/{}/", post.author, post.id)
}

fn viewer(auth: &Option<Auth>) -> Option<&str> {
    auth.as_ref().map(Auth::username)
}

/// The post addressed by `/<username>/<post_id>/`; 404 unless it belongs to that user.
async fn post_of(data: &AppState, username: &str, post_id: Id) -> Result<Post, WebError> {
    let author = data.repo.get_user_by_username(username).await?;
    let post = data.repo.get_post(post_id).await?;
    if post.author_id != author.id {
        return Err(WebError::NotFound);
    }
    Ok(post)
}

pub async fn not_found() -> Result<HttpResponse, WebError> {
    Err(WebError::NotFound)
}

// ---------------------------------------------------------------- listings

pub async fn index(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, WebError> {
    let viewer = viewer(&auth);
    let number = feed::index_page_number(data.repo.as_ref(), query.page.as_deref()).await?;
    let key = PageCache::key(viewer, number);
    if let Some(body) = data.index_cache.get(&key) {
        return Ok(render::html(body));
    }
    let page = feed::index(data.repo.as_ref(), Some(&number.to_string())).await?;
    let mut ctx = render::context(viewer);
    ctx.insert("page", &page);
    ctx.insert("groups", &data.repo.list_groups().await?);
    let body = render::render(&data.templates, "index.html", &ctx)?;
    data.index_cache.put(key, body.clone());
    Ok(render::html(body))
}

pub async fn group_posts(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, WebError> {
    let feed = feed::group_feed(data.repo.as_ref(), &path, query.page.as_deref()).await?;
    let mut ctx = render::context(viewer(&auth));
    ctx.insert("group", &feed.group);
    ctx.insert("page", &feed.page);
    ctx.insert("groups", &data.repo.list_groups().await?);
    render::page(&data.templates, "group.html", &ctx)
}

pub async fn follow_index(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, WebError> {
    let Some(auth) = auth else { return Ok(login_redirect(&req)) };
    let page = feed::follow_feed(data.repo.as_ref(), auth.user_id(), query.page.as_deref()).await?;
    let mut ctx = render::context(Some(auth.username()));
    ctx.insert("page", &page);
    ctx.insert("groups", &data.repo.list_groups().await?);
    render::page(&data.templates, "follow.html", &ctx)
}

pub async fn profile(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, WebError> {
    let viewer_id = auth.as_ref().map(Auth::user_id);
    let profile = feed::profile(data.repo.as_ref(), &path, viewer_id, query.page.as_deref()).await?;
    let mut ctx = render::context(viewer(&auth));
    ctx.insert("author", &profile.author);
    ctx.insert("stats", &profile.stats);
    ctx.insert("following", &profile.following);
    ctx.insert("page", &profile.page);
    ctx.insert("groups", &data.repo.list_groups().await?);
    render::page(&data.templates, "profile.html", &ctx)
}

// ---------------------------------------------------------------- single post

async fn render_post_page(
    data: &AppState,
    viewer: Option<&str>,
    detail: &PostDetail,
    comment_text: &str,
    errors: &FormErrors,
) -> Result<HttpResponse, WebError> {
    let mut ctx = render::context(viewer);
    ctx.insert("author", &detail.author);
    ctx.insert("stats", &detail.stats);
    ctx.insert("post", &detail.post);
    ctx.insert("comments", &detail.comments);
    ctx.insert("groups", &data.repo.list_groups().await?);
    ctx.insert("comment_text", comment_text);
    ctx.insert("errors", errors);
    render::page(&data.templates, "post.html", &ctx)
}

pub async fn post_view(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<(String, Id)>,
) -> Result<HttpResponse, WebError> {
    let (username, post_id) = path.into_inner();
    let detail = feed::post_detail(data.repo.as_ref(), &username, post_id).await?;
    render_post_page(&data, viewer(&auth), &detail, "", &FormErrors::new()).await
}

pub async fn comment_redirect(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<(String, Id)>,
) -> Result<HttpResponse, WebError> {
    if auth.is_none() {
        return Ok(login_redirect(&req));
    }
    let (username, post_id) = path.into_inner();
    let post = post_of(&data, &username, post_id).await?;
    Ok(redirect(&post_url(&post)))
}

pub async fn add_comment(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<(String, Id)>,
    form: web::Form<CommentForm>,
) -> Result<HttpResponse, WebError> {
    let Some(auth) = auth else { return Ok(login_redirect(&req)) };
    let (username, post_id) = path.into_inner();
    let post = post_of(&data, &username, post_id).await?;
    match posts::add_comment(data.repo.as_ref(), post.id, auth.user_id(), &form).await {
        Ok(_) => Ok(redirect(&post_url(&post))),
        Err(PostError::Invalid(errors)) => {
            let detail = feed::post_detail(data.repo.as_ref(), &username, post_id).await?;
            render_post_page(&data, Some(auth.username()), &detail, &form.text, &errors).await
        }
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------- post forms

async fn render_post_form(
    data: &AppState,
    auth: &Auth,
    form: &PostForm,
    errors: &FormErrors,
    editing: Option<&Post>,
) -> Result<HttpResponse, WebError> {
    let mut ctx = render::context(Some(auth.username()));
    ctx.insert("form", form);
    ctx.insert("errors", errors);
    ctx.insert("groups", &data.repo.list_groups().await?);
    let selected: Option<Id> = form.group.as_deref().and_then(|g| g.parse().ok());
    ctx.insert("selected_group", &selected);
    ctx.insert("editing", &editing.is_some());
    let action = match editing {
        Some(post) => format!("/{}/{}/edit/", post.author, post.id),
        None => "/new/".to_string(),
    };
    ctx.insert("action", &action);
    render::page(&data.templates, "new.html", &ctx)
}

/// What a rejected form shows again; uploads are never echoed back.
fn redisplay(form: &PostForm) -> PostForm {
    PostForm { text: form.text.clone(), group: form.group.clone(), ..Default::default() }
}

pub async fn new_post_form(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, WebError> {
    let Some(auth) = auth else { return Ok(login_redirect(&req)) };
    render_post_form(&data, &auth, &PostForm::default(), &FormErrors::new(), None).await
}

pub async fn new_post(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, WebError> {
    let Some(auth) = auth else { return Ok(login_redirect(&req)) };
    let form = PostForm::from_multipart(payload).await?;
    let shown = redisplay(&form);
    match posts::create_post(data.repo.as_ref(), data.image_store.as_ref(), auth.user_id(), form).await {
        Ok(_) => Ok(redirect("/")),
        Err(PostError::Invalid(errors)) => render_post_form(&data, &auth, &shown, &errors, None).await,
        Err(e) => Err(e.into()),
    }
}

pub async fn post_edit_form(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<(String, Id)>,
) -> Result<HttpResponse, WebError> {
    let Some(auth) = auth else { return Ok(login_redirect(&req)) };
    let (username, post_id) = path.into_inner();
    let post = post_of(&data, &username, post_id).await?;
    if post.author_id != auth.user_id() {
        return Ok(redirect(&post_url(&post)));
    }
    let form = PostForm {
        text: post.text.clone(),
        group: post.group_id.map(|g| g.to_string()),
        ..Default::default()
    };
    render_post_form(&data, &auth, &form, &FormErrors::new(), Some(&post)).await
}

pub async fn post_edit(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<(String, Id)>,
    payload: Multipart,
) -> Result<HttpResponse, WebError> {
    let Some(auth) = auth else { return Ok(login_redirect(&req)) };
    let (username, post_id) = path.into_inner();
    let post = post_of(&data, &username, post_id).await?;
    if post.author_id != auth.user_id() {
        return Ok(redirect(&post_url(&post)));
    }
    let form = PostForm::from_multipart(payload).await?;
    let shown = redisplay(&form);
    match posts::edit_post(data.repo.as_ref(), data.image_store.as_ref(), auth.user_id(), post.id, form).await {
        Ok(updated) => Ok(redirect(&post_url(&updated))),
        Err(PostError::Invalid(errors)) => render_post_form(&data, &auth, &shown, &errors, Some(&post)).await,
        Err(PostError::NotAuthor) => Ok(redirect(&post_url(&post))),
        Err(e) => Err(e.into()),
    }
}

pub async fn post_delete(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<(String, Id)>,
) -> Result<HttpResponse, WebError> {
    let Some(auth) = auth else { return Ok(login_redirect(&req)) };
    let (username, post_id) = path.into_inner();
    let post = post_of(&data, &username, post_id).await?;
    match posts::delete_post(data.repo.as_ref(), auth.user_id(), post.id).await {
        Ok(removed) => Ok(redirect(&format!("/{}/", removed.author))),
        Err(PostError::NotAuthor) => Ok(redirect(&post_url(&post))),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------- follows

pub async fn profile_follow(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, WebError> {
    let Some(auth) = auth else { return Ok(login_redirect(&req)) };
    let author = data.repo.get_user_by_username(&path).await?;
    follow::follow(data.repo.as_ref(), auth.user_id(), author.id).await?;
    Ok(redirect("/"))
}

pub async fn profile_unfollow(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, WebError> {
    let Some(auth) = auth else { return Ok(login_redirect(&req)) };
    let author = data.repo.get_user_by_username(&path).await?;
    follow::unfollow(data.repo.as_ref(), auth.user_id(), author.id).await?;
    Ok(redirect("/"))
}

// ---------------------------------------------------------------- accounts

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub next: Option<String>,
}

fn render_login(data: &AppState, username: &str, next: &str, error: Option<&str>) -> Result<HttpResponse, WebError> {
    let mut ctx = render::context(None);
    ctx.insert("username", username);
    ctx.insert("next", next);
    ctx.insert("error", &error);
    render::page(&data.templates, "login.html", &ctx)
}

pub async fn login_form(data: web::Data<AppState>, query: web::Query<NextQuery>) -> Result<HttpResponse, WebError> {
    render_login(&data, "", safe_next(query.next.as_deref()), None)
}

pub async fn login(data: web::Data<AppState>, form: web::Form<LoginForm>) -> Result<HttpResponse, WebError> {
    let next = safe_next(form.next.as_deref());
    let user = match data.repo.get_user_by_username(form.username.trim()).await {
        Ok(user) if verify_password(&form.password, &user.password_hash) => user,
        Ok(_) | Err(RepoError::NotFound) => {
            return render_login(&data, &form.username, next, Some(BAD_CREDENTIALS));
        }
        Err(e) => return Err(e.into()),
    };
    let token = data.keys.issue(&user, TokenKind::Access).map_err(|e| {
        tracing::error!("token issue failed: {e}");
        WebError::Internal
    })?;
    let max_age = time::Duration::seconds(data.keys.access_ttl().as_secs() as i64);
    let cookie = Cookie::build(AUTH_COOKIE, token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .finish();
    info!(user = %user.username, "signed in");
    Ok(HttpResponse::Found()
        .insert_header(("Location", next))
        .cookie(cookie)
        .finish())
}

pub async fn logout() -> HttpResponse {
    let cookie = Cookie::build(AUTH_COOKIE, "")
        .path("/")
        .max_age(time::Duration::ZERO)
        .finish();
    HttpResponse::Found().insert_header(("Location", "/")).cookie(cookie).finish()
}

fn render_signup(data: &AppState, form: &SignupForm, errors: &FormErrors) -> Result<HttpResponse, WebError> {
    let mut ctx = render::context(None);
    ctx.insert("form", form);
    ctx.insert("errors", errors);
    render::page(&data.templates, "signup.html", &ctx)
}

pub async fn signup_form(data: web::Data<AppState>) -> Result<HttpResponse, WebError> {
    render_signup(&data, &SignupForm::default(), &FormErrors::new())
}

pub async fn signup(data: web::Data<AppState>, form: web::Form<SignupForm>) -> Result<HttpResponse, WebError> {
    let (username, email) = match form.validate() {
        Ok(clean) => clean,
        Err(errors) => return render_signup(&data, &form, &errors),
    };
    let password_hash = hash_password(&form.password).map_err(|e| {
        tracing::error!("{e}");
        WebError::Internal
    })?;
    match data.repo.create_user(NewUser { username, email, password_hash }).await {
        Ok(user) => {
            info!(user_id = user.id, user = %user.username, "user registered");
            Ok(redirect("/auth/login/"))
        }
        Err(RepoError::Conflict) => render_signup(&data, &form, &FormErrors::single("username", USERNAME_TAKEN)),
        Err(e) => Err(e.into()),
    }
}
