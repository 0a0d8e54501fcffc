//! Response normalization per source family.
//!
//! Every parser produces the canonical [`Post`]/[`Thread`] shape: timestamps in
//! epoch milliseconds, a missing name becomes [`DEFAULT_AUTHOR`], bodies are
//! sanitized, and absent media is `None`.

use crate::dom::{escape_html, sanitize_html, Page};
use crate::error::FetchError;
use crate::model::{Media, Post, SourceFamily, Thread, DEFAULT_AUTHOR};
use crate::site::SiteSchema;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

fn author_or_default(name: Option<String>) -> String {
    name.map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_AUTHOR.to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ----------------------------------------------------------------------
// 4chan native API
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChanThread {
    posts: Vec<ChanPost>,
}

#[derive(Debug, Deserialize)]
struct ChanPost {
    no: u64,
    time: i64,
    name: Option<String>,
    trip: Option<String>,
    sub: Option<String>,
    com: Option<String>,
    filename: Option<String>,
    ext: Option<String>,
    tim: Option<u64>,
    w: Option<u32>,
    h: Option<u32>,
}

/// Parse `https://a.4cdn.org/<board>/thread/<n>.json`.
pub fn parse_fourchan_thread(body: &str, board: &str) -> Result<Thread, FetchError> {
    let thread: ChanThread =
        serde_json::from_str(body).map_err(|e| FetchError::parse("4chan", e.to_string()))?;
    let thread_id = thread
        .posts
        .first()
        .map(|p| p.no.to_string())
        .ok_or_else(|| FetchError::parse("4chan", "thread has no posts"))?;

    let posts = thread
        .posts
        .into_iter()
        .map(|p| {
            let media = match (&p.filename, p.tim) {
                (Some(filename), Some(tim)) => {
                    let ext = p.ext.clone().unwrap_or_default();
                    Some(Media {
                        url: format!("https://i.4cdn.org/{}/{}{}", board, tim, ext),
                        thumbnail_url: Some(format!("https://i.4cdn.org/{}/{}s.jpg", board, tim)),
                        filename: Some(format!("{}{}", filename, ext)),
                        width: p.w,
                        height: p.h,
                    })
                }
                _ => None,
            };
            Post {
                id: p.no.to_string(),
                board: board.to_string(),
                thread_id: thread_id.clone(),
                timestamp: p.time.saturating_mul(1000),
                author: author_or_default(p.name),
                tripcode: non_empty(p.trip),
                subject: non_empty(p.sub),
                body_html: sanitize_html(p.com.as_deref().unwrap_or("")),
                media,
                source: SourceFamily::FourChan,
            }
        })
        .collect();

    Ok(Thread {
        id: thread_id,
        board: board.to_string(),
        posts,
        source: SourceFamily::FourChan,
    })
}

// ----------------------------------------------------------------------
// FoolFuuka and 4plebs
// ----------------------------------------------------------------------

/// Numbers arrive either as JSON numbers or as strings.
fn field_str(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field_i64(obj: &Map<String, Value>, key: &str) -> Option<i64> {
    match obj.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn field_u32(obj: &Map<String, Value>, key: &str) -> Option<u32> {
    field_i64(obj, key).and_then(|v| u32::try_from(v).ok())
}

fn board_of(obj: &Map<String, Value>, fallback: &str) -> String {
    match obj.get("board") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Object(b)) => field_str(b, "shortname").unwrap_or_else(|| fallback.to_string()),
        _ => fallback.to_string(),
    }
}

/// Plain comment text to HTML: escaped, newlines as `<br>`.
fn plain_comment_html(text: &str) -> String {
    escape_html(text).replace("\r\n", "\n").replace('\n', "<br>")
}

fn foolfuuka_media(obj: &Map<String, Value>, family: SourceFamily) -> Option<Media> {
    let media = obj.get("media")?.as_object()?;
    let link = field_str(media, "media_link").or_else(|| field_str(media, "remote_media_link"));
    let url = match family {
        SourceFamily::FourPlebs => link?,
        _ => link.or_else(|| field_str(media, "thumb_link"))?,
    };
    Some(Media {
        url,
        thumbnail_url: field_str(media, "thumb_link"),
        filename: field_str(media, "media_filename"),
        width: field_u32(media, "media_w"),
        height: field_u32(media, "media_h"),
    })
}

fn family_label(family: SourceFamily) -> &'static str {
    family.as_str()
}

/// Normalize one FoolFuuka post object.
pub fn foolfuuka_post(
    value: &Value,
    board: &str,
    family: SourceFamily,
) -> Result<Post, FetchError> {
    let obj = value
        .as_object()
        .ok_or_else(|| FetchError::parse(family_label(family), "post is not an object"))?;
    let id = field_str(obj, "num")
        .ok_or_else(|| FetchError::parse(family_label(family), "post without num"))?;
    let thread_id = field_str(obj, "thread_num").unwrap_or_else(|| id.clone());
    let timestamp = field_i64(obj, "timestamp")
        .ok_or_else(|| FetchError::parse(family_label(family), "post without timestamp"))?;

    let body = match field_str(obj, "comment_processed") {
        Some(html) => html,
        None => plain_comment_html(&field_str(obj, "comment").unwrap_or_default()),
    };

    Ok(Post {
        id,
        board: board_of(obj, board),
        thread_id,
        timestamp: timestamp.saturating_mul(1000),
        author: author_or_default(field_str(obj, "name")),
        tripcode: non_empty(field_str(obj, "trip")),
        subject: non_empty(field_str(obj, "title")),
        body_html: sanitize_html(&body),
        media: foolfuuka_media(obj, family),
        source: family,
    })
}

fn not_found(board: &str, id: &str) -> FetchError {
    FetchError::NotFound {
        board: board.to_string(),
        id: id.to_string(),
    }
}

fn error_field(value: &Value) -> Option<&Value> {
    value.as_object()?.get("error").filter(|e| !e.is_null())
}

/// Parse the FoolFuuka post endpoint. Accepts a bare post object,
/// `{posts: {num: post}}` and `{posts: [post]}`.
pub fn parse_foolfuuka_post(
    body: &str,
    board: &str,
    id: &str,
    family: SourceFamily,
) -> Result<Post, FetchError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::parse(family_label(family), e.to_string()))?;
    if let Some(error) = error_field(&value) {
        debug!(board, id, error = %error, "Archive reported missing post");
        return Err(not_found(board, id));
    }

    let candidate = match value.get("posts") {
        Some(Value::Object(posts)) => posts.get(id).or_else(|| {
            posts
                .values()
                .find(|p| p.get("num").map(value_as_id).as_deref() == Some(id))
        }),
        Some(Value::Array(posts)) => posts
            .iter()
            .find(|p| p.get("num").map(value_as_id).as_deref() == Some(id)),
        Some(_) => {
            return Err(FetchError::parse(
                family_label(family),
                "posts is neither an object nor an array",
            ))
        }
        None if value.get("num").is_some() => Some(&value),
        None => {
            return Err(FetchError::parse(
                family_label(family),
                "response has neither posts nor num",
            ))
        }
    };

    let post = candidate.ok_or_else(|| not_found(board, id))?;
    foolfuuka_post(post, board, family)
}

fn value_as_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn posts_from(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Object(map)) => map.values().collect(),
        Some(Value::Array(list)) => list.iter().collect(),
        _ => Vec::new(),
    }
}

/// Parse the FoolFuuka thread endpoint: `{"<thread>": {op, posts}}` or `{posts: …}`.
pub fn parse_foolfuuka_thread(
    body: &str,
    board: &str,
    thread_id: &str,
    family: SourceFamily,
) -> Result<Thread, FetchError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::parse(family_label(family), e.to_string()))?;
    if error_field(&value).is_some() {
        return Err(not_found(board, thread_id));
    }
    let root = value
        .as_object()
        .ok_or_else(|| FetchError::parse(family_label(family), "thread is not an object"))?;

    let container = root.get(thread_id).unwrap_or(&value);
    let mut raw: Vec<&Value> = Vec::new();
    if let Some(op) = container.get("op").filter(|op| op.is_object()) {
        raw.push(op);
    }
    raw.extend(posts_from(container.get("posts")));
    if raw.is_empty() {
        return Err(not_found(board, thread_id));
    }

    let mut posts: Vec<Post> = Vec::with_capacity(raw.len());
    for item in raw {
        match foolfuuka_post(item, board, family) {
            Ok(post) if posts.iter().any(|p| p.id == post.id) => {}
            Ok(post) => posts.push(post),
            Err(e) => warn!(error = %e, thread = thread_id, "Skipping malformed post"),
        }
    }
    if posts.is_empty() {
        return Err(FetchError::parse(
            family_label(family),
            "thread contained no usable posts",
        ));
    }

    Ok(Thread {
        id: thread_id.to_string(),
        board: board.to_string(),
        posts,
        source: family,
    })
}

/// Parse the FoolFuuka backlinks endpoint into reply post numbers.
///
/// An `error` member is reported as [`FetchError::Archive`] so the caller
/// can retry it.
pub fn parse_replies(body: &str) -> Result<Vec<String>, FetchError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| FetchError::parse("backlinks", e.to_string()))?;
    if let Some(error) = error_field(&value) {
        let message = error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(FetchError::Archive { message });
    }
    let mut replies = Vec::new();
    if let Some(Value::Array(items)) = value.get("backlinks") {
        for item in items {
            if let Some(num) = item.as_object().and_then(|o| field_str(o, "num")) {
                if !replies.contains(&num) {
                    replies.push(num);
                }
            }
        }
    }
    Ok(replies)
}

// ----------------------------------------------------------------------
// HTML-only archives
// ----------------------------------------------------------------------

/// Best-effort scrape of a thread page using the schema's own locators.
pub fn parse_html_thread(
    markup: &str,
    schema: &dyn SiteSchema,
    board: &str,
    thread_id: &str,
) -> Result<Thread, FetchError> {
    let page = Page::parse(markup);
    let selector = schema.post_selector(&page);
    let elements = page
        .query(page.root(), selector)
        .map_err(|e| FetchError::parse(schema.name(), e.to_string()))?;

    let mut posts: Vec<Post> = Vec::new();
    for element in elements {
        let Some(id) = schema.extract_post_id(&page, element) else {
            debug!(element, "Post element without id skipped");
            continue;
        };
        if posts.iter().any(|p| p.id == id) {
            continue;
        }
        let body_html = schema
            .message_element(&page, element)
            .map(|m| sanitize_html(&page.inner_html(m)))
            .unwrap_or_default();
        let author = schema
            .author_element(&page, element)
            .map(|a| page.text_content(a));
        let media = schema.media_element(&page, element).and_then(|img| {
            let url = page
                .parent_element(img)
                .filter(|&p| page.tag(p) == Some("a"))
                .and_then(|a| page.attr(a, "href"))
                .or_else(|| page.attr(img, "src"))?
                .to_string();
            Some(Media {
                url,
                thumbnail_url: page.attr(img, "src").map(str::to_string),
                filename: None,
                width: None,
                height: None,
            })
        });
        let timestamp = page
            .query_first(element, "time[datetime]")
            .ok()
            .flatten()
            .and_then(|t| page.attr(t, "datetime"))
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|d| d.timestamp_millis())
            .unwrap_or(0);

        posts.push(Post {
            id,
            board: board.to_string(),
            thread_id: thread_id.to_string(),
            timestamp,
            author: author_or_default(author),
            tripcode: None,
            subject: None,
            body_html,
            media,
            source: SourceFamily::HtmlOnly,
        });
    }

    if posts.is_empty() {
        return Err(not_found(board, thread_id));
    }
    Ok(Thread {
        id: thread_id.to_string(),
        board: board.to_string(),
        posts,
        source: SourceFamily::HtmlOnly,
    })
}
