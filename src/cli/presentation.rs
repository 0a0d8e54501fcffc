//! CLI presentation: text and json formatters per command.

use crate::error::ArchlinkError;
use crate::model::{Post, PostKey, Thread};
use crate::session::{DiscoveryReport, PassReport};
use crate::site::SiteSchema;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, ArchlinkError> {
    serde_json::to_string_pretty(value).map_err(|e| ArchlinkError::Serialization(e.to_string()))
}

pub fn format_resolve(host: &str, schema: &dyn SiteSchema, format: &str) -> Result<String, ArchlinkError> {
    if format == "json" {
        return to_json(&json!({
            "host": host,
            "schema": schema.name(),
            "family": schema.family().as_str(),
        }));
    }
    Ok(format!(
        "{} {} ({})",
        host,
        schema.name().bold(),
        schema.family()
    ))
}

fn post_block(post: &Post) -> String {
    let mut out = String::new();
    let mut header = format!("{} No.{}", post.author.bold(), post.id);
    if let Some(trip) = &post.tripcode {
        header.push(' ');
        header.push_str(trip);
    }
    if let Some(at) = post.posted_at() {
        header.push_str(&format!("  {}", at.format("%Y-%m-%d %H:%M:%S UTC").dimmed()));
    }
    out.push_str(&header);
    out.push('\n');
    if let Some(subject) = &post.subject {
        out.push_str(&format!("{}\n", subject.cyan()));
    }
    if let Some(media) = &post.media {
        let name = media.filename.as_deref().unwrap_or(media.url.as_str());
        out.push_str(&format!("[file] {}\n", name));
    }
    out.push_str(&html_to_text(&post.body_html));
    out
}

pub fn format_post(post: &Post, format: &str) -> Result<String, ArchlinkError> {
    if format == "json" {
        return to_json(post);
    }
    Ok(format!(
        "/{}/ thread {} [{}]\n{}",
        post.board,
        post.thread_id,
        post.source,
        post_block(post)
    ))
}

pub fn format_thread(thread: &Thread, format: &str) -> Result<String, ArchlinkError> {
    if format == "json" {
        return to_json(thread);
    }
    let mut out = format!(
        "{} /{}/{} ({} posts, {})\n",
        "Thread".bold(),
        thread.board,
        thread.id,
        thread.posts.len(),
        thread.source
    );
    for post in &thread.posts {
        out.push('\n');
        out.push_str(&post_block(post));
        out.push('\n');
    }
    Ok(out)
}

pub fn format_replies(id: &str, replies: &[String], format: &str) -> Result<String, ArchlinkError> {
    if format == "json" {
        return to_json(&json!({ "post": id, "replies": replies }));
    }
    if replies.is_empty() {
        return Ok(format!("No replies to >>{}", id));
    }
    let list: Vec<String> = replies.iter().map(|r| format!(">>{}", r)).collect();
    Ok(format!("Replies to >>{}: {}", id, list.join(" ")))
}

/// Backlink table for an indexed page: one row per quoted post.
pub fn format_backlinks(
    rows: &[(String, Vec<String>)],
    pass: &PassReport,
    discovery: Option<&DiscoveryReport>,
    format: &str,
) -> Result<String, ArchlinkError> {
    if format == "json" {
        let backlinks: serde_json::Map<String, serde_json::Value> = rows
            .iter()
            .map(|(post, sources)| (post.clone(), json!(sources)))
            .collect();
        return to_json(&json!({
            "scan": pass,
            "discovery": discovery,
            "backlinks": backlinks,
        }));
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Post", "Replies", "Count"]);
    for (post, sources) in rows {
        let list: Vec<String> = sources.iter().map(|s| format!(">>{}", s)).collect();
        table.add_row(vec![post.clone(), list.join(" "), sources.len().to_string()]);
    }

    let mut out = format!(
        "{} {} posts, {} quote links, {} backlinks rendered\n",
        "Scanned".bold(),
        pass.posts,
        pass.links_indexed,
        pass.backlinks_rendered
    );
    if let Some(d) = discovery {
        out.push_str(&format!(
            "{} {} requests over {} passes, {} new edges\n",
            "Discovery".bold(),
            d.requests,
            d.passes,
            d.edges_added
        ));
        if !d.failed.is_empty() {
            out.push_str(&format!("{} {}\n", "Gave up on:".yellow(), d.failed.join(", ")));
        }
    }
    out.push_str(&table.to_string());
    Ok(out)
}

pub fn format_own_posts(posts: &BTreeSet<PostKey>, format: &str) -> Result<String, ArchlinkError> {
    if format == "json" {
        let keys: Vec<String> = posts.iter().map(PostKey::to_string).collect();
        return to_json(&keys);
    }
    if posts.is_empty() {
        return Ok("No posts marked as your own".to_string());
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Board", "Post"]);
    for key in posts {
        table.add_row(vec![key.board.clone(), key.id.clone()]);
    }
    Ok(table.to_string())
}

/// Flatten a post body to plain text for terminal output.
fn html_to_text(html: &str) -> String {
    let page = crate::dom::Page::parse(&html.replace("<br>", "\n").replace("<br/>", "\n"));
    page.text_content(page.body()).trim().to_string()
}
