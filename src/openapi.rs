use crate::forms::CommentForm;
use crate::models::{Comment, Follow, Group, NewGroup, Post, User};
use crate::routes::{
    AccessToken, CommentPage, FollowPage, FollowPayload, GroupPage, PostPage, PostPayload, RefreshRequest,
    TokenPair, TokenRequest,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::obtain_token,
        crate::routes::refresh_token,
        crate::routes::list_posts,
        crate::routes::create_post,
        crate::routes::get_post,
        crate::routes::update_post,
        crate::routes::partial_update_post,
        crate::routes::delete_post,
        crate::routes::list_comments,
        crate::routes::create_comment,
        crate::routes::get_comment,
        crate::routes::update_comment,
        crate::routes::delete_comment,
        crate::routes::list_groups,
        crate::routes::create_group,
        crate::routes::get_group,
        crate::routes::delete_group,
        crate::routes::list_follows,
        crate::routes::create_follow,
        crate::routes::get_follow,
        crate::routes::delete_follow,
    ),
    components(schemas(
        User, Group, NewGroup, Post, PostPayload, Comment, CommentForm, Follow, FollowPayload,
        PostPage, CommentPage, GroupPage, FollowPage,
        TokenRequest, TokenPair, RefreshRequest, AccessToken
    )),
    tags((name = "yatube", description = "Posts, groups, comments and follows"))
)]
pub struct ApiDoc;
