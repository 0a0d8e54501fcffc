//! CLI domain: parse, route, output, and presentation only.
//! No domain orchestration; a single route table dispatches to library services.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands, ConfigCommands, LookupArgs, OwnCommands};
pub use presentation::{
    format_backlinks, format_own_posts, format_post, format_replies, format_resolve,
    format_thread,
};
pub use route::RunContext;
