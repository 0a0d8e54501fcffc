//! Markup for posts resolved from the cache or the network.

use crate::cache::CacheTier;
use crate::dom::escape_html;
use crate::model::{Media, Post};
use chrono::SecondsFormat;
use std::fmt::Write;

pub const RENDERED_POST_CLASS: &str = "archlink-post";

/// Render a post as a self-contained block. `body_html` is already sanitized
/// and is inserted verbatim; every other field is escaped.
pub fn render_post(post: &Post) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        r#"<div class="post {}" data-post-id="{}" data-board="{}">"#,
        RENDERED_POST_CLASS,
        escape_html(&post.id),
        escape_html(&post.board)
    );

    out.push_str(r#"<div class="post-info">"#);
    if let Some(subject) = &post.subject {
        let _ = write!(out, r#"<span class="subject">{}</span> "#, escape_html(subject));
    }
    let _ = write!(out, r#"<span class="name">{}</span>"#, escape_html(&post.author));
    if let Some(trip) = &post.tripcode {
        let _ = write!(out, r#" <span class="trip">{}</span>"#, escape_html(trip));
    }
    if let Some(at) = post.posted_at() {
        let _ = write!(
            out,
            r#" <time datetime="{}">{}</time>"#,
            at.to_rfc3339_opts(SecondsFormat::Secs, true),
            at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    let _ = write!(
        out,
        r#" <span class="post-number">No.{}</span></div>"#,
        escape_html(&post.id)
    );

    if let Some(media) = &post.media {
        render_media(media, &mut out);
    }

    let _ = write!(
        out,
        r#"<blockquote class="post-message">{}</blockquote></div>"#,
        post.body_html
    );
    out
}

fn render_media(media: &Media, out: &mut String) {
    let thumb = media.thumbnail_url.as_deref().unwrap_or(&media.url);
    let alt = media.filename.as_deref().unwrap_or("");
    let _ = write!(
        out,
        r#"<div class="post-file"><a href="{}" target="_blank" rel="noopener"><img src="{}" alt="{}" loading="lazy"></a>"#,
        escape_html(&media.url),
        escape_html(thumb),
        escape_html(alt)
    );
    let mut info = String::new();
    if let Some(name) = &media.filename {
        info.push_str(name);
    }
    if let (Some(w), Some(h)) = (media.width, media.height) {
        if !info.is_empty() {
            info.push(' ');
        }
        let _ = write!(info, "({}x{})", w, h);
    }
    if !info.is_empty() {
        let _ = write!(out, r#"<span class="file-info">{}</span>"#, escape_html(&info));
    }
    out.push_str("</div>");
}

/// Render through the rendered-HTML shelf of `cache`.
pub fn render_cached(cache: &CacheTier, post: &Post) -> String {
    let key = post.key();
    if let Some(html) = cache.get_rendered(&key) {
        return html;
    }
    let html = render_post(post);
    cache.put_rendered(key, html.clone());
    html
}
