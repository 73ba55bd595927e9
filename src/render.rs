use actix_web::HttpResponse;
use tera::{Context, Tera};

use crate::error::WebError;

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("includes/post_card.html", include_str!("../templates/includes/post_card.html")),
    ("includes/paginator.html", include_str!("../templates/includes/paginator.html")),
    ("includes/author_card.html", include_str!("../templates/includes/author_card.html")),
    ("index.html", include_str!("../templates/index.html")),
    ("group.html", include_str!("../templates/group.html")),
    ("follow.html", include_str!("../templates/follow.html")),
    ("profile.html", include_str!("../templates/profile.html")),
    ("post.html", include_str!("../templates/post.html")),
    ("new.html", include_str!("../templates/new.html")),
    ("login.html", include_str!("../templates/login.html")),
    ("signup.html", include_str!("../templates/signup.html")),
];

/// Compiles the bundled templates; fails on any syntax error.
pub fn build_templates() -> Result<Tera, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_templates(TEMPLATES.iter().copied())?;
    Ok(tera)
}

/// Template context: the signed-in username (if any) plus view data.
pub fn context(viewer: Option<&str>) -> Context {
    let mut ctx = Context::new();
    ctx.insert("viewer", &viewer);
    ctx
}

pub fn render(tera: &Tera, template: &str, ctx: &Context) -> Result<String, WebError> {
    Ok(tera.render(template, ctx)?)
}

pub fn html(body: String) -> HttpResponse {
    HttpResponse::Ok().content_type("text/html; charset=utf-8").body(body)
}

pub fn page(tera: &Tera, template: &str, ctx: &Context) -> Result<HttpResponse, WebError> {
    render(tera, template, ctx).map(html)
}

pub fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found().insert_header(("Location", location)).finish()
}
